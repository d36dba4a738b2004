/// A resolved tensor dimension extent. Zero marks a dimension that shape
/// inference left symbolic.
pub type DimSize = u64;

/// Dimension extents of a tensor, outermost first.
pub type Shape = Vec<DimSize>;

/// Operand word width, in bits, assumed by the cost proxies when the
/// workload does not carry explicit quantization information.
pub const DEFAULT_PRECISION: u32 = 8;
