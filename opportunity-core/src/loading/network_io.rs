//! Persistence of the road network between stages.

use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

use geo::{LineString, Point};
use geojson::{FeatureCollection, Geometry, GeometryValue};
use log::info;
use petgraph::{
    graph::{DiGraph, NodeIndex},
    visit::EdgeRef,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    Error,
    model::{Attributes, RoadEdge, RoadNetwork, RoadNode},
    store::{feature_collection, make_feature},
};

#[derive(Debug, Serialize, Deserialize)]
struct NetworkFile {
    crs: String,
    nodes: Vec<NodeRecord>,
    edges: Vec<EdgeRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct NodeRecord {
    osm_id: i64,
    x: f64,
    y: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct EdgeRecord {
    source: usize,
    target: usize,
    osm_way_id: Option<i64>,
    length: f64,
    highway: Vec<String>,
    maxspeed: Option<String>,
    drive_time: Option<f64>,
    walk_time: Option<f64>,
    geometry: Vec<[f64; 2]>,
}

/// Writes nodes and edges in index order so a reload reproduces the same
/// graph indices
pub fn save_network(network: &RoadNetwork, path: &Path) -> Result<(), Error> {
    let nodes = network
        .graph
        .node_weights()
        .map(|node| NodeRecord {
            osm_id: node.osm_id,
            x: node.geometry.x(),
            y: node.geometry.y(),
        })
        .collect();
    let edges = network
        .edge_references()
        .map(|edge| {
            let weight = edge.weight();
            EdgeRecord {
                source: edge.source().index(),
                target: edge.target().index(),
                osm_way_id: weight.osm_way_id,
                length: weight.length,
                highway: weight.highway.clone(),
                maxspeed: weight.maxspeed.clone(),
                drive_time: weight.drive_time,
                walk_time: weight.walk_time,
                geometry: weight.geometry.coords().map(|c| [c.x, c.y]).collect(),
            }
        })
        .collect();

    let file = NetworkFile {
        crs: network.crs().to_string(),
        nodes,
        edges,
    };
    serde_json::to_writer(BufWriter::new(File::create(path)?), &file)?;
    info!(
        "Saved road network ({} nodes, {} edges) to {}",
        network.node_count(),
        network.edge_count(),
        path.display()
    );
    Ok(())
}

/// # Errors
///
/// Returns [`Error::InvalidNodeIndex`] when an edge refers to a node the
/// file does not contain.
pub fn load_network(path: &Path) -> Result<RoadNetwork, Error> {
    let file: NetworkFile = serde_json::from_reader(BufReader::new(File::open(path)?))?;

    let mut graph = DiGraph::with_capacity(file.nodes.len(), file.edges.len());
    for node in file.nodes {
        graph.add_node(RoadNode {
            osm_id: node.osm_id,
            geometry: Point::new(node.x, node.y),
        });
    }
    for edge in file.edges {
        if edge.source >= graph.node_count() || edge.target >= graph.node_count() {
            return Err(Error::InvalidNodeIndex);
        }
        graph.add_edge(
            NodeIndex::new(edge.source),
            NodeIndex::new(edge.target),
            RoadEdge {
                osm_way_id: edge.osm_way_id,
                length: edge.length,
                highway: edge.highway,
                maxspeed: edge.maxspeed,
                drive_time: edge.drive_time,
                walk_time: edge.walk_time,
                geometry: LineString::from(edge.geometry),
            },
        );
    }

    let network = RoadNetwork::from_graph(graph, file.crs);
    info!(
        "Loaded road network ({} nodes, {} edges) from {}",
        network.node_count(),
        network.edge_count(),
        path.display()
    );
    Ok(network)
}

/// Edge lines with their attributes, for mapping
pub fn roads_layer(network: &RoadNetwork) -> FeatureCollection {
    let features = network
        .edge_references()
        .map(|edge| {
            let weight = edge.weight();
            let properties: Attributes = [
                ("u", json!(network.graph[edge.source()].osm_id)),
                ("v", json!(network.graph[edge.target()].osm_id)),
                ("osmid", json!(weight.osm_way_id)),
                ("highway", json!(weight.road_class())),
                ("maxspeed", json!(weight.maxspeed)),
                ("length", json!(weight.length)),
                ("travel_time_drive", json!(weight.drive_time)),
                ("travel_time_walk", json!(weight.walk_time)),
            ]
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect();
            make_feature(
                Geometry::new(GeometryValue::from(&weight.geometry)),
                properties,
            )
        })
        .collect();
    feature_collection(features)
}
