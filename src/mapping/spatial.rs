use serde::{Deserialize, Serialize};
use std::num::NonZeroU64;

use crate::loops::Loop;

/// Assignment of one loop dimension onto one hardware array dimension.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Unroll {
    /// Array dimension carrying the iterations (e.g. "D1").
    pub array_dim: String,
    /// Loop dimension being unrolled (e.g. "K").
    pub dimension: String,
    /// Unroll factor. Idealized mappings may be fractional; the
    /// integer-realizable variant rounds up.
    pub factor: f64,
}

/// Loop dimensions assigned to parallel compute units, outermost array
/// dimension first.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct SpatialMapping {
    unrolls: Vec<Unroll>,
}

impl SpatialMapping {
    pub fn new(unrolls: Vec<Unroll>) -> Self {
        SpatialMapping { unrolls }
    }

    pub fn unrolls(&self) -> &[Unroll] {
        &self.unrolls
    }

    /// Integer-realizable variant: every factor raised to the next whole
    /// iteration count.
    pub fn rounded(&self) -> SpatialMapping {
        SpatialMapping {
            unrolls: self
                .unrolls
                .iter()
                .map(|u| Unroll {
                    factor: u.factor.max(1.0).ceil(),
                    ..u.clone()
                })
                .collect(),
        }
    }

    /// Parallel units occupied by the integer-realizable variant.
    pub fn unit_count(&self) -> u64 {
        self.unrolls
            .iter()
            .map(|u| u.factor.max(1.0).ceil() as u64)
            .product()
    }

    /// Fraction of the occupied units doing useful work. 1.0 for an
    /// already-integral (or empty) mapping.
    pub fn utilization(&self) -> f64 {
        let ideal: f64 = self.unrolls.iter().map(|u| u.factor.max(1.0)).product();
        ideal / self.unit_count() as f64
    }

    /// The integer-realizable variant as spatial loop descriptors, in
    /// array-dimension order.
    pub fn loops(&self) -> Vec<Loop> {
        self.unrolls
            .iter()
            .map(|u| {
                let size = NonZeroU64::new(u.factor.max(1.0).ceil() as u64)
                    .unwrap_or(NonZeroU64::MIN);
                Loop::spatial(u.dimension.clone(), size)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fractional() -> SpatialMapping {
        SpatialMapping::new(vec![
            Unroll {
                array_dim: "D1".to_owned(),
                dimension: "K".to_owned(),
                factor: 32.0,
            },
            Unroll {
                array_dim: "D2".to_owned(),
                dimension: "C".to_owned(),
                factor: 2.5,
            },
        ])
    }

    #[test]
    fn test_rounded_ceils_fractional_factors() {
        let rounded = fractional().rounded();
        assert_eq!(rounded.unrolls()[0].factor, 32.0);
        assert_eq!(rounded.unrolls()[1].factor, 3.0);
        assert_eq!(rounded.unit_count(), 96);
    }

    #[test]
    fn test_utilization_relates_ideal_to_rounded() {
        let m = fractional();
        let expected = (32.0 * 2.5) / 96.0;
        assert!((m.utilization() - expected).abs() < 1e-12);
        assert_eq!(m.rounded().utilization(), 1.0);
        assert_eq!(SpatialMapping::default().utilization(), 1.0);
    }

    #[test]
    fn test_loops_render_integer_variant() {
        let loops = fractional().loops();
        assert_eq!(loops.len(), 2);
        assert_eq!(loops[0].to_string(), "SpatialLoop(K,32)");
        assert_eq!(loops[1].to_string(), "SpatialLoop(C,3)");
    }

    proptest! {
        #[test]
        fn test_utilization_never_exceeds_one(factors in proptest::collection::vec(0.1f64..64.0, 0..4)) {
            let m = SpatialMapping::new(
                factors
                    .iter()
                    .enumerate()
                    .map(|(i, &factor)| Unroll {
                        array_dim: format!("D{i}"),
                        dimension: "K".to_owned(),
                        factor,
                    })
                    .collect(),
            );
            prop_assert!(m.utilization() <= 1.0 + 1e-12);
            prop_assert!(m.utilization() > 0.0);
        }
    }
}
