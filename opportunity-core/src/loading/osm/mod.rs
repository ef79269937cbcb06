//! OSM road network loading via the Overpass API

mod fetch;
mod graph;
pub mod overpass;

pub use fetch::{download_overpass, parse_overpass, read_overpass_file};
pub use graph::create_road_network;
