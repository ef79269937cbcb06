pub use crate::Error;

// Configuration
pub use crate::config::{AccessConfig, AnalysisConfig, CategoryAccess, SpeedConfig};

// Core data model
pub use crate::model::{Facility, RoadEdge, RoadNetwork, RoadNode, ServiceCategory, Ward};
pub use crate::projection::UtmZone;
pub use crate::store::{LayerStore, names};

// Stage building blocks
pub use crate::analysis::{CompositeIndex, SpatialWeights, composite_index};
pub use crate::enrichment::enrich_network;
pub use crate::routing::{AccessMeasure, TravelCost, measure_category, nearest_facility_costs};
