//! Data model for ward accessibility analysis
//!
//! Contains facility points, ward polygons and the road network used for routing.

pub mod facility;
pub mod streets;
pub mod ward;

pub use facility::{Facility, ServiceCategory};
pub use streets::network::RoadNetwork;
pub use streets::{RoadEdge, RoadNode};
pub use ward::Ward;

/// Free-form feature attributes carried between layers
pub type Attributes = serde_json::Map<String, serde_json::Value>;
