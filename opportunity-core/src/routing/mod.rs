//! Network routing: Dijkstra searches and ward accessibility

pub mod accessibility;
pub mod dijkstra;

use serde::{Deserialize, Serialize};

pub use accessibility::{AccessMeasure, measure_category, nearest_facility_costs};

/// Edge weight a search minimises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TravelCost {
    /// Network length in meters
    Distance,
    /// Congested driving time in seconds
    DriveTime,
    /// Walking time in seconds
    WalkTime,
}

impl TravelCost {
    pub const fn is_time(self) -> bool {
        matches!(self, Self::DriveTime | Self::WalkTime)
    }
}
