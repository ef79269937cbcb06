use geo::{Coord, LineString, Point};
use hashbrown::HashMap;
use log::{debug, info, warn};
use petgraph::graph::{DiGraph, NodeIndex};

use super::overpass::{Direction, Element, OverpassResponse, direction, is_drivable};
use crate::{
    Error,
    model::{RoadEdge, RoadNetwork, RoadNode},
    projection::UtmZone,
};

struct Way<'a> {
    id: i64,
    nodes: Vec<i64>,
    tags: &'a HashMap<String, String>,
}

/// Builds the drivable road network from an Overpass response.
///
/// Ways are split into edges at every node shared with another way (or
/// repeated within the same way) and at their ends. Node positions and
/// edge geometries are projected to `zone`.
///
/// # Errors
///
/// Returns [`Error::NetworkError`] when no drivable way survives filtering.
pub fn create_road_network(
    response: &OverpassResponse,
    zone: &UtmZone,
) -> Result<RoadNetwork, Error> {
    let mut positions: HashMap<i64, Coord<f64>> = HashMap::new();
    for element in &response.elements {
        if let Element::Node { id, lat, lon } = element {
            positions.insert(*id, zone.project(Coord { x: *lon, y: *lat }));
        }
    }

    let mut ways = Vec::new();
    let mut dangling = 0;
    for element in &response.elements {
        let Element::Way { id, nodes, tags } = element else {
            continue;
        };
        if !is_drivable(tags) {
            continue;
        }
        let known: Vec<i64> = nodes
            .iter()
            .copied()
            .filter(|node| positions.contains_key(node))
            .collect();
        dangling += nodes.len() - known.len();
        if known.len() >= 2 {
            ways.push(Way {
                id: *id,
                nodes: known,
                tags,
            });
        }
    }
    if dangling > 0 {
        warn!("Dropped {dangling} way node references without coordinates");
    }

    let mut usage: HashMap<i64, usize> = HashMap::new();
    for way in &ways {
        for node in &way.nodes {
            *usage.entry(*node).or_default() += 1;
        }
    }

    let mut graph = DiGraph::new();
    let mut node_ids: HashMap<i64, NodeIndex> = HashMap::new();
    let mut node_for = |osm_id: i64, graph: &mut DiGraph<RoadNode, RoadEdge>| {
        *node_ids.entry(osm_id).or_insert_with(|| {
            graph.add_node(RoadNode {
                osm_id,
                geometry: Point::from(positions[&osm_id]),
            })
        })
    };

    for way in &ways {
        let last = way.nodes.len() - 1;
        let mut start = 0;
        for i in 1..=last {
            if i != last && usage[&way.nodes[i]] < 2 {
                continue;
            }
            let segment = &way.nodes[start..=i];
            let geometry: LineString<f64> =
                segment.iter().map(|node| positions[node]).collect();
            let source = node_for(segment[0], &mut graph);
            let target = node_for(segment[segment.len() - 1], &mut graph);
            add_way_edges(&mut graph, way, source, target, geometry);
            start = i;
        }
    }

    if graph.node_count() == 0 {
        return Err(Error::NetworkError(
            "No drivable ways found in the Overpass data".to_string(),
        ));
    }

    let network = RoadNetwork::from_graph(graph, zone.crs_name());
    info!(
        "Built road network with {} nodes and {} edges from {} ways",
        network.node_count(),
        network.edge_count(),
        ways.len()
    );
    Ok(network)
}

fn add_way_edges(
    graph: &mut DiGraph<RoadNode, RoadEdge>,
    way: &Way<'_>,
    source: NodeIndex,
    target: NodeIndex,
    geometry: LineString<f64>,
) {
    let length = planar_length(&geometry);
    let highway: Vec<String> = way
        .tags
        .get("highway")
        .map(|value| value.split(';').map(|v| v.trim().to_string()).collect())
        .unwrap_or_default();
    let edge = |geometry: LineString<f64>, directional: &str| RoadEdge {
        osm_way_id: Some(way.id),
        length,
        highway: highway.clone(),
        maxspeed: way
            .tags
            .get(directional)
            .or_else(|| way.tags.get("maxspeed"))
            .cloned(),
        drive_time: None,
        walk_time: None,
        geometry,
    };

    let dir = direction(way.tags);
    if matches!(dir, Direction::Both | Direction::Forward) {
        graph.add_edge(source, target, edge(geometry.clone(), "maxspeed:forward"));
    }
    if matches!(dir, Direction::Both | Direction::Backward) {
        let mut reversed = geometry;
        reversed.0.reverse();
        graph.add_edge(target, source, edge(reversed, "maxspeed:backward"));
    }
    debug!("Way {} segment added ({dir:?}, {length:.1} m)", way.id);
}

/// Sum of segment lengths in projected units
fn planar_length(line: &LineString<f64>) -> f64 {
    line.lines().map(|segment| segment.dx().hypot(segment.dy())).sum()
}
