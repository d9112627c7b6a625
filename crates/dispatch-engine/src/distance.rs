use dispatch_models::Location;

/// Cost model used by the allocator. Swappable so a real routing cost can
/// replace the placeholder without touching the matching logic.
pub trait DistanceEstimator: Send + Sync {
    /// Non-negative cost of travelling between two points.
    fn estimate(&self, from: Location, to: Location) -> f64;
}

/// Placeholder cost: a fixed offset plus the absolute latitude and longitude
/// deltas. Not a great-circle distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlatOffsetEstimator {
    base_offset: f64,
}

impl FlatOffsetEstimator {
    pub const DEFAULT_BASE_OFFSET: f64 = 2.0;

    pub fn new(base_offset: f64) -> Self {
        Self {
            base_offset: base_offset.max(0.0),
        }
    }

    pub fn base_offset(&self) -> f64 {
        self.base_offset
    }
}

impl Default for FlatOffsetEstimator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE_OFFSET)
    }
}

impl DistanceEstimator for FlatOffsetEstimator {
    fn estimate(&self, from: Location, to: Location) -> f64 {
        self.base_offset + (from.lat - to.lat).abs() + (from.lng - to.lng).abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_point_costs_the_offset() {
        let est = FlatOffsetEstimator::default();
        let p = Location::new(12.97, 77.59);
        assert_eq!(est.estimate(p, p), 2.0);
    }

    #[test]
    fn sums_absolute_deltas() {
        let est = FlatOffsetEstimator::default();
        let cost = est.estimate(Location::new(3.0, -4.0), Location::new(0.0, 0.0));
        assert_eq!(cost, 9.0);
    }

    #[test]
    fn symmetric() {
        let est = FlatOffsetEstimator::new(1.0);
        let a = Location::new(10.5, 20.25);
        let b = Location::new(-3.0, 7.75);
        assert_eq!(est.estimate(a, b), est.estimate(b, a));
    }

    #[test]
    fn negative_offset_clamps_to_zero() {
        let est = FlatOffsetEstimator::new(-5.0);
        assert_eq!(est.base_offset(), 0.0);
        assert!(est.estimate(Location::default(), Location::default()) >= 0.0);
    }

    #[test]
    fn usable_as_trait_object() {
        let est: Box<dyn DistanceEstimator> = Box::new(FlatOffsetEstimator::default());
        assert_eq!(est.estimate(Location::new(1.0, 1.0), Location::default()), 4.0);
    }
}
