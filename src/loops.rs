use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU64;

/// Which hardware resource carries a loop's iterations.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize, strum::Display,
)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum LoopKind {
    /// Iterations run one after another on the same unit.
    #[default]
    Temporal,
    /// Iterations run at once across parallel units.
    Spatial,
}

/// One nesting level of a loop nest.
///
/// A mapping owns an ordered sequence of these; the order encodes loop
/// nesting order. Loops are immutable once constructed.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Loop {
    dimension: String,
    size: NonZeroU64,
    kind: LoopKind,
}

impl Loop {
    pub fn new(dimension: impl Into<String>, size: NonZeroU64, kind: LoopKind) -> Self {
        Loop {
            dimension: dimension.into(),
            size,
            kind,
        }
    }

    /// Shorthand for the conventional kind.
    pub fn temporal(dimension: impl Into<String>, size: NonZeroU64) -> Self {
        Loop::new(dimension, size, LoopKind::Temporal)
    }

    pub fn spatial(dimension: impl Into<String>, size: NonZeroU64) -> Self {
        Loop::new(dimension, size, LoopKind::Spatial)
    }

    pub fn dimension(&self) -> &str {
        &self.dimension
    }

    /// Trip count. Always at least one.
    pub fn size(&self) -> NonZeroU64 {
        self.size
    }

    pub fn kind(&self) -> LoopKind {
        self.kind
    }
}

impl fmt::Display for Loop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Loop({},{})", self.kind, self.dimension, self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nonzero::nonzero as nz;
    use proptest::prelude::*;

    #[test]
    fn test_spatial_loop_rendering() {
        assert_eq!(Loop::spatial("K", nz!(4u64)).to_string(), "SpatialLoop(K,4)");
    }

    #[test]
    fn test_temporal_is_default_kind() {
        let l = Loop::temporal("OX", nz!(13u64));
        assert_eq!(l.kind(), LoopKind::default());
        assert_eq!(l.to_string(), "TemporalLoop(OX,13)");
    }

    #[test]
    fn test_accessors() {
        let l = Loop::new("C", nz!(64u64), LoopKind::Spatial);
        assert_eq!(l.dimension(), "C");
        assert_eq!(l.size().get(), 64);
        assert_eq!(l.kind(), LoopKind::Spatial);
    }

    proptest! {
        #[test]
        fn test_rendering_is_kind_dim_size(
            kind in any::<LoopKind>(),
            dim in "[A-Z][A-Z0-9]{0,2}",
            size in 1u64..1_000_000,
        ) {
            let l = Loop::new(dim.clone(), NonZeroU64::new(size).unwrap(), kind);
            prop_assert_eq!(l.to_string(), format!("{kind}Loop({dim},{size})"));
        }
    }
}
