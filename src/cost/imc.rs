use serde::{Deserialize, Serialize};

use super::{
    memory_accesses, validate_input, CostEngine, CostModelEvaluation, EngineError, EngineKind,
    EvaluationInput,
};

/// Cost proxy for in-SRAM computing arrays.
///
/// Multiply-accumulates happen during the array read itself: weights stay
/// resident in the macro and feed the computation bit-serially, so the
/// temporal nest stretches by the weight precision, and compute energy is
/// charged per activated row rather than per MAC.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct InMemoryComputeEngine;

impl CostEngine for InMemoryComputeEngine {
    fn evaluate(&self, input: &EvaluationInput) -> Result<CostModelEvaluation, EngineError> {
        validate_input(input)?;
        let core = input.core;
        let mac_count = input.layer.mac_count();
        let weight_bits = u64::from(input.layer.weight_precision.max(1));
        let latency_cycles = input
            .temporal_mapping
            .cycle_count()
            .saturating_mul(weight_bits);
        let spatial_utilization = input.spatial_mapping.utilization();
        let ideal_cycles = (latency_cycles as f64 * spatial_utilization).ceil() as u64;
        // One row activation fires every unit in the array at once.
        let units = input.core.operational_array.unit_count().max(1);
        let row_activations = (mac_count + units - 1) / units;
        // Weights never leave the array; only activation streaming and
        // output writeback hit the memory separately.
        let accesses = memory_accesses(input, 2);
        let energy = row_activations as f64 * weight_bits as f64 * core.word_access_energy
            + accesses as f64 * core.word_access_energy;
        Ok(CostModelEvaluation {
            engine: EngineKind::InMemoryCompute,
            mac_count,
            ideal_cycles,
            latency_cycles,
            spatial_utilization,
            memory_accesses: accesses,
            energy,
        })
    }
}
