//! This module is responsible for loading raw inputs (ward boundaries,
//! facility CSVs, OSM road data) and persisting the road network.

pub mod layers;
pub mod network_io;
pub mod osm;

pub use layers::{ProjectedLayers, build_layers, read_facility_csv, wards_lon_lat_bbox};
pub use network_io::{load_network, roads_layer, save_network};
pub use osm::{create_road_network, download_overpass, parse_overpass, read_overpass_file};
