pub mod allocator;
pub mod distance;
pub mod error;
pub mod reporting;

pub mod test_support;

pub use allocator::Allocator;
pub use distance::{DistanceEstimator, FlatOffsetEstimator};
pub use error::EngineError;
pub use reporting::Reporter;
