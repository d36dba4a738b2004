use serde::{Deserialize, Serialize};

use super::{
    memory_accesses, validate_input, CostEngine, CostModelEvaluation, EngineError, EngineKind,
    EvaluationInput,
};

/// Cost proxy for conventional digital MAC arrays.
///
/// Latency follows the temporal nest; energy charges every MAC and every
/// innermost-memory word access at the core's per-operation energies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct GeneralPurposeEngine;

impl CostEngine for GeneralPurposeEngine {
    fn evaluate(&self, input: &EvaluationInput) -> Result<CostModelEvaluation, EngineError> {
        validate_input(input)?;
        let core = input.core;
        let mac_count = input.layer.mac_count();
        let latency_cycles = input.temporal_mapping.cycle_count();
        let spatial_utilization = input.spatial_mapping.utilization();
        let ideal_cycles = (latency_cycles as f64 * spatial_utilization).ceil() as u64;
        // Each MAC touches its two operands and a partial sum.
        let accesses = memory_accesses(input, 3);
        let energy =
            mac_count as f64 * core.mac_energy + accesses as f64 * core.word_access_energy;
        Ok(CostModelEvaluation {
            engine: EngineKind::GeneralPurpose,
            mac_count,
            ideal_cycles,
            latency_cycles,
            spatial_utilization,
            memory_accesses: accesses,
            energy,
        })
    }
}
