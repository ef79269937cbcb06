//! Ward accessibility analysis: road network routing from ward centroids to
//! services, a composite opportunity index and its spatial patterns.

pub mod analysis;
pub mod config;
pub mod enrichment;
mod error;
pub mod loading;
pub mod model;
pub mod pipeline;
pub mod prelude;
pub mod projection;
pub mod routing;
pub mod store;

pub use error::Error;
