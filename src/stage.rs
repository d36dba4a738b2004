//! The terminal exploration-pipeline stage: score one bound mapping
//! candidate with the engine matching its core's capability tag.

use log::debug;

use crate::cost::{
    CostEngine, CostModelEvaluation, Engine, EngineError, EvaluationInput,
    COUNT_REPEATED_ACCESS_DEFAULT,
};
use crate::hardware::{Accelerator, CoreId};
use crate::mapping::{SpatialMapping, TemporalMapping};
use crate::utils::join_into_string;
use crate::workload::LayerNode;

/// Extra payload a stage may attach to each result for the stages below
/// it. The cost stage, being terminal, never attaches one.
pub type StageAux = serde_json::Value;

pub type StageYield = (CostModelEvaluation, Option<StageAux>);

#[derive(thiserror::Error, Debug)]
pub enum StageError {
    #[error(
        "layer {layer:?} is allocated to core {requested}, which accelerator {accelerator:?} \
         does not have; cores: [{}]",
        join_into_string(.available, ", ")
    )]
    UnknownCore {
        layer: String,
        requested: CoreId,
        accelerator: String,
        available: Vec<CoreId>,
    },
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// One stage of an exploration pipeline, run to completion in one call.
pub trait Stage {
    fn run(self: Box<Self>) -> Result<Vec<StageYield>, StageError>;

    /// A leaf stage terminates the pipeline; it invokes no further
    /// stages.
    fn is_leaf(&self) -> bool {
        false
    }
}

/// Scores one (accelerator, layer, spatial mapping, temporal mapping)
/// tuple, bound at construction.
///
/// [CostModelStage::evaluate] consumes the stage, so a bound tuple is
/// scored at most once; re-scoring means constructing a new stage. Stage
/// instances are single-owner, while the bound references stay shareable
/// across concurrently evaluating workers.
pub struct CostModelStage<'a> {
    accelerator: &'a Accelerator,
    layer: &'a LayerNode,
    spatial_mapping: &'a SpatialMapping,
    spatial_mapping_int: &'a SpatialMapping,
    temporal_mapping: &'a TemporalMapping,
    count_repeated_access: bool,
}

impl<'a> CostModelStage<'a> {
    pub fn new(
        accelerator: &'a Accelerator,
        layer: &'a LayerNode,
        spatial_mapping: &'a SpatialMapping,
        spatial_mapping_int: &'a SpatialMapping,
        temporal_mapping: &'a TemporalMapping,
    ) -> Self {
        CostModelStage {
            accelerator,
            layer,
            spatial_mapping,
            spatial_mapping_int,
            temporal_mapping,
            count_repeated_access: COUNT_REPEATED_ACCESS_DEFAULT,
        }
    }

    /// Overrides the engines' default handling of reads that hit data
    /// already resident from a prior access.
    pub fn count_repeated_access(mut self, count: bool) -> Self {
        self.count_repeated_access = count;
        self
    }

    /// Resolves the layer's allocated core, selects the engine matching
    /// its capability tag, and scores the bound candidate.
    ///
    /// Engine rejections propagate unchanged; evaluation is deterministic
    /// in its inputs, so there is nothing to retry.
    pub fn evaluate(self) -> Result<StageYield, StageError> {
        let requested = self.layer.core_allocation;
        let core = self
            .accelerator
            .core(requested)
            .ok_or_else(|| StageError::UnknownCore {
                layer: self.layer.name.clone(),
                requested,
                accelerator: self.accelerator.name.clone(),
                available: self.accelerator.core_ids().collect(),
            })?;
        let engine = Engine::for_core(core);
        debug!(
            "scoring layer {:?} on core {} with the {} engine",
            self.layer.name,
            core.id,
            engine.kind(),
        );
        let cme = engine.evaluate(&EvaluationInput {
            accelerator: self.accelerator,
            core,
            layer: self.layer,
            spatial_mapping: self.spatial_mapping,
            spatial_mapping_int: self.spatial_mapping_int,
            temporal_mapping: self.temporal_mapping,
            count_repeated_access: self.count_repeated_access,
        })?;
        Ok((cme, None))
    }
}

impl Stage for CostModelStage<'_> {
    fn run(self: Box<Self>) -> Result<Vec<StageYield>, StageError> {
        Ok(vec![(*self).evaluate()?])
    }

    fn is_leaf(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::{testing, EngineKind};
    use crate::hardware::PeClass;

    #[test]
    fn test_imc_tag_selects_the_specialized_engine() {
        let accelerator = testing::accelerator(Some(PeClass::InSramComputing));
        let layer = testing::layer();
        let spatial = testing::spatial();
        let spatial_int = spatial.rounded();
        let temporal = testing::temporal();
        let (cme, aux) =
            CostModelStage::new(&accelerator, &layer, &spatial, &spatial_int, &temporal)
                .evaluate()
                .unwrap();
        assert_eq!(cme.engine, EngineKind::InMemoryCompute);
        assert!(aux.is_none());
    }

    #[test]
    fn test_other_or_absent_tag_selects_the_general_engine() {
        for pe_class in [Some(PeClass::DigitalMac), None] {
            let accelerator = testing::accelerator(pe_class);
            let layer = testing::layer();
            let spatial = testing::spatial();
            let spatial_int = spatial.rounded();
            let temporal = testing::temporal();
            let (cme, _) =
                CostModelStage::new(&accelerator, &layer, &spatial, &spatial_int, &temporal)
                    .evaluate()
                    .unwrap();
            assert_eq!(cme.engine, EngineKind::GeneralPurpose);
        }
    }

    #[test]
    fn test_unknown_core_allocation() {
        let accelerator = testing::accelerator(None);
        let mut layer = testing::layer();
        layer.core_allocation = 9;
        let spatial = testing::spatial();
        let spatial_int = spatial.rounded();
        let temporal = testing::temporal();
        let err = CostModelStage::new(&accelerator, &layer, &spatial, &spatial_int, &temporal)
            .evaluate()
            .unwrap_err();
        match err {
            StageError::UnknownCore {
                requested,
                available,
                ..
            } => {
                assert_eq!(requested, 9);
                assert_eq!(available, vec![1]);
            }
            other => panic!("expected UnknownCore, got {other:?}"),
        }
    }

    #[test]
    fn test_stage_runs_as_a_leaf_yielding_one_result() {
        let accelerator = testing::accelerator(None);
        let layer = testing::layer();
        let spatial = testing::spatial();
        let spatial_int = spatial.rounded();
        let temporal = testing::temporal();
        let stage = Box::new(CostModelStage::new(
            &accelerator,
            &layer,
            &spatial,
            &spatial_int,
            &temporal,
        ));
        assert!(stage.is_leaf());
        let yields = stage.run().unwrap();
        assert_eq!(yields.len(), 1);
    }

    #[test]
    fn test_flag_override_reaches_the_engine() {
        let accelerator = testing::accelerator(None);
        let layer = testing::layer();
        let spatial = testing::spatial();
        let spatial_int = spatial.rounded();
        let temporal = testing::temporal();
        let (with_default, _) =
            CostModelStage::new(&accelerator, &layer, &spatial, &spatial_int, &temporal)
                .evaluate()
                .unwrap();
        let (counted, _) =
            CostModelStage::new(&accelerator, &layer, &spatial, &spatial_int, &temporal)
                .count_repeated_access(true)
                .evaluate()
                .unwrap();
        assert!(counted.memory_accesses > with_default.memory_accesses);
    }
}
