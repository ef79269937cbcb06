//! Overpass API JSON elements and the drivable-way filter.

use hashbrown::HashMap;

use geo::Rect;
use serde::Deserialize;

/// `[out:json]` response body
#[derive(Debug, Clone, Deserialize)]
pub struct OverpassResponse {
    #[serde(default)]
    pub elements: Vec<Element>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Element {
    Node {
        id: i64,
        lat: f64,
        lon: f64,
    },
    Way {
        id: i64,
        #[serde(default)]
        nodes: Vec<i64>,
        #[serde(default)]
        tags: HashMap<String, String>,
    },
    #[serde(other)]
    Other,
}

/// Direction(s) in which a way may be driven
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Both,
    Forward,
    Backward,
}

const EXCLUDED_HIGHWAYS: [&str; 18] = [
    "footway",
    "path",
    "cycleway",
    "steps",
    "pedestrian",
    "track",
    "bridleway",
    "construction",
    "proposed",
    "abandoned",
    "platform",
    "raceway",
    "corridor",
    "elevator",
    "escalator",
    "planned",
    "bus_guideway",
    "busway",
];

const EXCLUDED_SERVICES: [&str; 5] = [
    "parking",
    "parking_aisle",
    "driveway",
    "private",
    "emergency_access",
];

/// Query for every highway way in `bbox` (lon/lat) plus its nodes
pub fn build_query(bbox: &Rect<f64>, timeout_secs: u64) -> String {
    format!(
        "[out:json][timeout:{timeout_secs}];\
         (way[\"highway\"]({south},{west},{north},{east}););\
         (._;>;);\
         out body;",
        south = bbox.min().y,
        west = bbox.min().x,
        north = bbox.max().y,
        east = bbox.max().x,
    )
}

/// Whether a way belongs to the drivable network
pub fn is_drivable(tags: &HashMap<String, String>) -> bool {
    let Some(highway) = tags.get("highway") else {
        return false;
    };
    let tag_is = |key: &str, values: &[&str]| {
        tags.get(key)
            .is_some_and(|value| values.contains(&value.as_str()))
    };

    !EXCLUDED_HIGHWAYS.contains(&highway.as_str())
        && !tag_is("area", &["yes"])
        && !tag_is("access", &["private", "no"])
        && !tag_is("motor_vehicle", &["no"])
        && !tag_is("motorcar", &["no"])
        && !tag_is("service", &EXCLUDED_SERVICES)
}

pub fn direction(tags: &HashMap<String, String>) -> Direction {
    match tags.get("oneway").map(String::as_str) {
        Some("yes" | "true" | "1") => return Direction::Forward,
        Some("-1" | "reverse") => return Direction::Backward,
        Some("no" | "false" | "0") => return Direction::Both,
        _ => {}
    }
    if tags.get("junction").is_some_and(|j| j == "roundabout")
        || tags.get("highway").is_some_and(|h| h == "motorway")
    {
        Direction::Forward
    } else {
        Direction::Both
    }
}
