use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Identifier of a compute core within an accelerator.
pub type CoreId = u32;

/// Capability tag of a core's processing elements.
///
/// Cores without a tag are treated as generic arithmetic arrays. New
/// compute styles add a variant here and an engine variant in
/// [crate::cost::Engine]; the dispatch sites stay unchanged.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, strum::Display,
)]
#[strum(serialize_all = "snake_case")]
pub enum PeClass {
    /// Multiply-accumulate folded into the SRAM macro itself.
    InSramComputing,
    /// Conventional digital MAC array beside the memory hierarchy.
    DigitalMac,
}

/// The compute array of one core: named hardware dimensions with their
/// unit counts, plus an optional processing-element capability tag.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct OperationalArray {
    /// Unit counts per array dimension (e.g. "D1" -> 32), outermost first.
    pub dims: IndexMap<String, u64>,
    #[serde(default)]
    pub pe_class: Option<PeClass>,
}

impl OperationalArray {
    /// Total parallel unit count.
    pub fn unit_count(&self) -> u64 {
        self.dims.values().product()
    }
}

/// One allocatable compute core and the per-operation energies the cost
/// proxies charge against it.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Core {
    pub id: CoreId,
    pub operational_array: OperationalArray,
    /// Energy of one multiply-accumulate, in pJ.
    pub mac_energy: f64,
    /// Energy of one word read or write at the innermost memory, in pJ.
    pub word_access_energy: f64,
}

/// A named accelerator: an ordered set of cores addressable by id.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Accelerator {
    pub name: String,
    cores: Vec<Core>,
}

impl Accelerator {
    pub fn new(name: impl Into<String>, cores: Vec<Core>) -> Self {
        Accelerator {
            name: name.into(),
            cores,
        }
    }

    /// Core lookup by allocation id.
    pub fn core(&self, id: CoreId) -> Option<&Core> {
        self.cores.iter().find(|c| c.id == id)
    }

    pub fn core_ids(&self) -> impl Iterator<Item = CoreId> + '_ {
        self.cores.iter().map(|c| c.id)
    }
}
