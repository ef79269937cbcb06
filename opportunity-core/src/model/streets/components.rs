//! Road network components - nodes and edges

use geo::{LineString, Point};

use crate::routing::TravelCost;

/// Road graph node (intersection or dead end)
#[derive(Debug, Clone)]
pub struct RoadNode {
    /// OSM ID of the node
    pub osm_id: i64,
    /// Node coordinates in planar meters
    pub geometry: Point<f64>,
}

/// Road graph edge (one direction of a street segment)
#[derive(Debug, Clone)]
pub struct RoadEdge {
    /// OSM ID of the way this segment was cut from
    pub osm_way_id: Option<i64>,
    /// Planar length in meters
    pub length: f64,
    /// `highway` tag values; multi-tagged segments carry several
    pub highway: Vec<String>,
    /// Raw `maxspeed` tag
    pub maxspeed: Option<String>,
    /// Driving time in seconds, set by speed enrichment
    pub drive_time: Option<f64>,
    /// Walking time in seconds, set by speed enrichment
    pub walk_time: Option<f64>,
    pub geometry: LineString<f64>,
}

impl RoadEdge {
    pub fn new(length: f64, highway: &str, geometry: LineString<f64>) -> Self {
        Self {
            osm_way_id: None,
            length,
            highway: vec![highway.to_string()],
            maxspeed: None,
            drive_time: None,
            walk_time: None,
            geometry,
        }
    }

    /// Road class used for speed lookup (first tag of multi-tagged segments)
    pub fn road_class(&self) -> Option<&str> {
        self.highway.first().map(String::as_str)
    }

    /// Edge weight under the given cost strategy
    pub const fn cost(&self, cost: TravelCost) -> Option<f64> {
        match cost {
            TravelCost::Distance => Some(self.length),
            TravelCost::DriveTime => self.drive_time,
            TravelCost::WalkTime => self.walk_time,
        }
    }
}
