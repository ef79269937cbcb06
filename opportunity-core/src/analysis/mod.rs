//! Statistics over ward accessibility: composite index and spatial patterns

pub mod autocorrelation;
pub mod index;
pub mod weights;

pub use autocorrelation::{GlobalMoran, LocalMoran, NOT_SIGNIFICANT, Quadrant, global_moran, local_moran};
pub use index::{CompositeIndex, Indicator, composite_index};
pub use weights::SpatialWeights;
