//! Cost engines and the evaluation record they produce.
//!
//! The numeric formulas are deliberately simple, deterministic proxies;
//! the surrounding machinery (dispatch by processing-element class, the
//! shared parameter set, the validation of mapping/layer/hardware
//! consistency) is the interface the exploration pipeline depends on.

pub mod general;
pub mod imc;

pub use general::GeneralPurposeEngine;
pub use imc::InMemoryComputeEngine;

use enum_dispatch::enum_dispatch;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::hardware::{Accelerator, Core, CoreId, PeClass};
use crate::mapping::{SpatialMapping, TemporalMapping};
use crate::utils::join_into_string;
use crate::workload::LayerNode;

/// Engines default to suppressing a read of data still resident from the
/// previous access.
pub const COUNT_REPEATED_ACCESS_DEFAULT: bool = false;

/// Marker of which engine produced an evaluation.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, strum::Display,
)]
#[strum(serialize_all = "snake_case")]
pub enum EngineKind {
    GeneralPurpose,
    InMemoryCompute,
}

#[derive(thiserror::Error, Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub enum EngineError {
    #[error(
        "mapped dimension {dimension:?} does not appear in layer {layer:?}; layer dimensions: {}",
        join_into_string(.available, ", ")
    )]
    UnknownDimension {
        dimension: String,
        layer: String,
        available: Vec<String>,
    },
    #[error(
        "spatial unrolling over {requested} units exceeds the {available}-unit array of core {core}"
    )]
    ArrayExceeded {
        requested: u64,
        available: u64,
        core: CoreId,
    },
}

/// The parameter set both engines receive, identically, for one candidate.
pub struct EvaluationInput<'a> {
    pub accelerator: &'a Accelerator,
    pub core: &'a Core,
    pub layer: &'a LayerNode,
    /// Idealized (possibly fractional) spatial mapping.
    pub spatial_mapping: &'a SpatialMapping,
    /// Integer-realizable spatial mapping actually laid onto the array.
    pub spatial_mapping_int: &'a SpatialMapping,
    pub temporal_mapping: &'a TemporalMapping,
    /// Count a read of data still resident from the previous access as a
    /// fresh access.
    pub count_repeated_access: bool,
}

/// The immutable outcome of scoring one (layer, mapping) candidate.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct CostModelEvaluation {
    pub engine: EngineKind,
    pub mac_count: u64,
    /// Cycles if the idealized spatial mapping were realizable.
    pub ideal_cycles: u64,
    /// Cycles of the integer-realizable mapping.
    pub latency_cycles: u64,
    pub spatial_utilization: f64,
    /// Word accesses charged to the innermost memory.
    pub memory_accesses: u64,
    /// Energy proxy, in pJ.
    pub energy: f64,
}

impl CostModelEvaluation {
    /// Energy-delay product, the usual single-number ranking metric.
    pub fn edp(&self) -> f64 {
        self.energy * self.latency_cycles as f64
    }
}

impl fmt::Display for CostModelEvaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} MACs in {} cycles, {} accesses, {:.1} pJ",
            self.engine, self.mac_count, self.latency_cycles, self.memory_accesses, self.energy,
        )
    }
}

#[enum_dispatch]
pub trait CostEngine {
    /// Scores one fully specified (layer, mapping, hardware) combination.
    fn evaluate(&self, input: &EvaluationInput) -> Result<CostModelEvaluation, EngineError>;
}

/// The engine variants, selected per core by capability tag.
#[enum_dispatch(CostEngine)]
#[derive(Clone, Copy, Debug)]
pub enum Engine {
    GeneralPurpose(GeneralPurposeEngine),
    InMemoryCompute(InMemoryComputeEngine),
}

impl Engine {
    /// In-SRAM computing cores get the specialized engine; any other tag,
    /// or none, the general-purpose one.
    pub fn for_core(core: &Core) -> Engine {
        match core.operational_array.pe_class {
            Some(PeClass::InSramComputing) => InMemoryComputeEngine.into(),
            _ => GeneralPurposeEngine.into(),
        }
    }

    pub fn kind(&self) -> EngineKind {
        match self {
            Engine::GeneralPurpose(_) => EngineKind::GeneralPurpose,
            Engine::InMemoryCompute(_) => EngineKind::InMemoryCompute,
        }
    }
}

/// Mapping/layer/hardware consistency checks shared by the engines.
pub(crate) fn validate_input(input: &EvaluationInput) -> Result<(), EngineError> {
    let layer = input.layer;
    let temporal_dims = input.temporal_mapping.loops().iter().map(|l| l.dimension());
    let spatial_dims = input
        .spatial_mapping_int
        .unrolls()
        .iter()
        .map(|u| u.dimension.as_str());
    for dim in temporal_dims.chain(spatial_dims) {
        if !layer.has_dimension(dim) {
            return Err(EngineError::UnknownDimension {
                dimension: dim.to_owned(),
                layer: layer.name.clone(),
                available: layer.dimensions().map(str::to_owned).collect(),
            });
        }
    }
    let requested = input.spatial_mapping_int.unit_count();
    let available = input.core.operational_array.unit_count();
    if requested > available {
        return Err(EngineError::ArrayExceeded {
            requested,
            available,
            core: input.core.id,
        });
    }
    Ok(())
}

/// Word accesses charged to the innermost memory, at `words_per_mac`
/// words touched per multiply-accumulate. With repeated-access counting
/// off, reads within the innermost temporal loop hit resident data and
/// are suppressed.
pub(crate) fn memory_accesses(input: &EvaluationInput, words_per_mac: u64) -> u64 {
    let base = input.layer.mac_count().saturating_mul(words_per_mac);
    if input.count_repeated_access {
        base
    } else {
        let resident = input
            .temporal_mapping
            .innermost()
            .map_or(1, |l| l.size().get());
        (base + resident - 1) / resident
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::hardware::OperationalArray;
    use crate::loops::Loop;
    use crate::mapping::Unroll;
    use indexmap::IndexMap;
    use nonzero::nonzero as nz;

    pub(crate) fn core(pe_class: Option<PeClass>) -> Core {
        Core {
            id: 1,
            operational_array: OperationalArray {
                dims: IndexMap::from([("D1".to_owned(), 16), ("D2".to_owned(), 4)]),
                pe_class,
            },
            mac_energy: 1.0,
            word_access_energy: 4.0,
        }
    }

    pub(crate) fn accelerator(pe_class: Option<PeClass>) -> Accelerator {
        Accelerator::new("test_accelerator", vec![core(pe_class)])
    }

    /// A 4x8x2 matmul-shaped layer allocated to core 1.
    pub(crate) fn layer() -> LayerNode {
        LayerNode {
            id: 0,
            name: "fc0".to_owned(),
            op_type: "Gemm".to_owned(),
            loop_dim_sizes: IndexMap::from([
                ("B".to_owned(), 4),
                ("C".to_owned(), 8),
                ("K".to_owned(), 2),
            ]),
            input_shape: vec![4, 8],
            output_shape: vec![4, 2],
            act_precision: 8,
            weight_precision: 8,
            core_allocation: 1,
        }
    }

    pub(crate) fn spatial() -> SpatialMapping {
        SpatialMapping::new(vec![Unroll {
            array_dim: "D1".to_owned(),
            dimension: "K".to_owned(),
            factor: 2.0,
        }])
    }

    /// for B in 0..4 { for C in 0..8 }, K unrolled spatially.
    pub(crate) fn temporal() -> TemporalMapping {
        TemporalMapping::new(vec![
            Loop::temporal("B", nz!(4u64)),
            Loop::temporal("C", nz!(8u64)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_engine_selection_by_pe_class() {
        let imc = core(Some(PeClass::InSramComputing));
        let tagged_digital = core(Some(PeClass::DigitalMac));
        let untagged = core(None);
        assert_eq!(Engine::for_core(&imc).kind(), EngineKind::InMemoryCompute);
        assert_eq!(
            Engine::for_core(&tagged_digital).kind(),
            EngineKind::GeneralPurpose,
        );
        assert_eq!(Engine::for_core(&untagged).kind(), EngineKind::GeneralPurpose);
    }

    #[test]
    fn test_unknown_mapped_dimension_rejected() {
        let accelerator = accelerator(None);
        let core = core(None);
        let layer = layer();
        let bad = SpatialMapping::new(vec![crate::mapping::Unroll {
            array_dim: "D1".to_owned(),
            dimension: "OX".to_owned(),
            factor: 2.0,
        }]);
        let input = EvaluationInput {
            accelerator: &accelerator,
            core: &core,
            layer: &layer,
            spatial_mapping: &bad,
            spatial_mapping_int: &bad.rounded(),
            temporal_mapping: &temporal(),
            count_repeated_access: COUNT_REPEATED_ACCESS_DEFAULT,
        };
        let err = GeneralPurposeEngine.evaluate(&input).unwrap_err();
        match err {
            EngineError::UnknownDimension { dimension, available, .. } => {
                assert_eq!(dimension, "OX");
                assert_eq!(available, vec!["B", "C", "K"]);
            }
            other => panic!("expected UnknownDimension, got {other:?}"),
        }
    }

    #[test]
    fn test_oversized_spatial_unrolling_rejected() {
        let accelerator = accelerator(None);
        let core = core(None);
        let layer = layer();
        let oversized = SpatialMapping::new(vec![crate::mapping::Unroll {
            array_dim: "D1".to_owned(),
            dimension: "K".to_owned(),
            factor: 128.0,
        }]);
        let input = EvaluationInput {
            accelerator: &accelerator,
            core: &core,
            layer: &layer,
            spatial_mapping: &oversized,
            spatial_mapping_int: &oversized.rounded(),
            temporal_mapping: &temporal(),
            count_repeated_access: COUNT_REPEATED_ACCESS_DEFAULT,
        };
        assert_eq!(
            GeneralPurposeEngine.evaluate(&input).unwrap_err(),
            EngineError::ArrayExceeded {
                requested: 128,
                available: 64,
                core: 1,
            },
        );
    }
}
