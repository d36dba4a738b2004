use serde::{Deserialize, Serialize};
use std::fmt;

use crate::loops::{Loop, LoopKind};
use crate::utils::join_into_string;

/// The sequential half of a mapping: an ordered loop nest, outermost
/// first. The order is semantically significant; it encodes nesting
/// order and therefore the reuse pattern of each operand.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct TemporalMapping {
    loops: Vec<Loop>,
}

impl TemporalMapping {
    /// Panics if a spatial loop is passed; parallel dimensions belong to
    /// [crate::mapping::SpatialMapping].
    pub fn new(loops: Vec<Loop>) -> Self {
        if let Some(l) = loops.iter().find(|l| l.kind() != LoopKind::Temporal) {
            panic!("temporal mapping given a non-temporal loop: {l}");
        }
        TemporalMapping { loops }
    }

    pub fn loops(&self) -> &[Loop] {
        &self.loops
    }

    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// The innermost loop, if any.
    pub fn innermost(&self) -> Option<&Loop> {
        self.loops.last()
    }

    /// Sequential iteration count of the whole nest.
    pub fn cycle_count(&self) -> u64 {
        self.loops.iter().map(|l| l.size().get()).product()
    }
}

impl fmt::Display for TemporalMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", join_into_string(&self.loops, ", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nonzero::nonzero as nz;

    fn nest() -> TemporalMapping {
        TemporalMapping::new(vec![
            Loop::temporal("OY", nz!(14u64)),
            Loop::temporal("OX", nz!(14u64)),
            Loop::temporal("C", nz!(3u64)),
        ])
    }

    #[test]
    fn test_cycle_count_is_trip_count_product() {
        assert_eq!(nest().cycle_count(), 14 * 14 * 3);
        assert_eq!(TemporalMapping::default().cycle_count(), 1);
    }

    #[test]
    fn test_order_is_preserved() {
        let nest = nest();
        assert_eq!(nest.loops()[0].dimension(), "OY");
        assert_eq!(nest.innermost().unwrap().dimension(), "C");
        assert_eq!(
            nest.to_string(),
            "[TemporalLoop(OY,14), TemporalLoop(OX,14), TemporalLoop(C,3)]",
        );
    }

    #[test]
    #[should_panic(expected = "non-temporal loop")]
    fn test_rejects_spatial_loops() {
        TemporalMapping::new(vec![Loop::spatial("K", nz!(4u64))]);
    }
}
