use geo::Point;
use petgraph::{
    Directed,
    graph::{DiGraph, EdgeReference, Edges, NodeIndex},
};
use rstar::{RTree, primitives::GeomWithData};

use super::{RoadEdge, RoadNode};
use crate::Error;

/// Node position in the snapping index, tagged with its graph index
pub type IndexedPoint = GeomWithData<[f64; 2], NodeIndex>;

/// Directed road multigraph with a spatial index over its nodes.
///
/// Parallel edges between the same node pair are kept as separate edges.
#[derive(Debug, Clone)]
pub struct RoadNetwork {
    pub graph: DiGraph<RoadNode, RoadEdge>,
    rtree: RTree<IndexedPoint>,
    crs: String,
}

impl RoadNetwork {
    /// Wraps a graph and bulk-loads the node index
    pub fn from_graph(graph: DiGraph<RoadNode, RoadEdge>, crs: impl Into<String>) -> Self {
        let points = graph
            .node_indices()
            .map(|idx| {
                let geometry = graph[idx].geometry;
                IndexedPoint::new([geometry.x(), geometry.y()], idx)
            })
            .collect();

        Self {
            graph,
            rtree: RTree::bulk_load(points),
            crs: crs.into(),
        }
    }

    pub fn crs(&self) -> &str {
        &self.crs
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Outgoing edges of a node
    pub fn edges(&self, node: NodeIndex) -> Edges<'_, RoadEdge, Directed> {
        self.graph.edges(node)
    }

    pub fn edge_references(&self) -> impl Iterator<Item = EdgeReference<'_, RoadEdge>> {
        self.graph.edge_references()
    }

    /// True when every edge carries both travel times
    pub fn is_enriched(&self) -> bool {
        self.graph
            .edge_weights()
            .all(|edge| edge.drive_time.is_some() && edge.walk_time.is_some())
    }

    /// Nearest node to a planar point and its Euclidean distance.
    ///
    /// Equidistant candidates resolve to the lowest node index so repeated
    /// snapping always yields the same assignment.
    pub fn nearest_node(&self, point: &Point<f64>) -> Option<(NodeIndex, f64)> {
        let mut candidates = self
            .rtree
            .nearest_neighbor_iter_with_distance_2(&[point.x(), point.y()]);
        let (first, best_distance_2) = candidates.next()?;

        let mut best = first.data;
        for (candidate, distance_2) in candidates {
            if distance_2 > best_distance_2 {
                break;
            }
            best = best.min(candidate.data);
        }

        Some((best, best_distance_2.sqrt()))
    }

    /// Snaps every point to its nearest node
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoPointsFound`] when the network has no nodes.
    pub fn snap_points(&self, points: &[Point<f64>]) -> Result<Vec<NodeIndex>, Error> {
        points
            .iter()
            .map(|point| {
                self.nearest_node(point)
                    .map(|(node, distance)| {
                        log::trace!("Snapped {point:?} to node {} ({distance:.1} m)", node.index());
                        node
                    })
                    .ok_or(Error::NoPointsFound)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use geo::line_string;

    use super::*;

    fn node(osm_id: i64, x: f64, y: f64) -> RoadNode {
        RoadNode {
            osm_id,
            geometry: Point::new(x, y),
        }
    }

    fn line_network() -> RoadNetwork {
        let mut graph = DiGraph::new();
        let a = graph.add_node(node(1, 0.0, 0.0));
        let b = graph.add_node(node(2, 100.0, 0.0));
        let c = graph.add_node(node(3, 200.0, 0.0));
        for (from, to) in [(a, b), (b, c)] {
            let geometry = line_string![graph[from].geometry.0, graph[to].geometry.0];
            graph.add_edge(from, to, RoadEdge::new(100.0, "tertiary", geometry));
        }
        RoadNetwork::from_graph(graph, "EPSG:32643")
    }

    #[test]
    fn snaps_to_nearest_node() {
        let network = line_network();
        let (node, distance) = network.nearest_node(&Point::new(120.0, 5.0)).unwrap();
        assert_eq!(node.index(), 1);
        assert!((distance - (20.0_f64.powi(2) + 25.0).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn equidistant_points_snap_to_lowest_index() {
        let network = line_network();
        let midpoint = Point::new(50.0, 10.0);
        let first = network.snap_points(&[midpoint; 4]).unwrap();
        assert!(first.iter().all(|node| node.index() == 0));
        let again = network.snap_points(&[midpoint; 4]).unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn empty_network_cannot_snap() {
        let network = RoadNetwork::from_graph(DiGraph::new(), "EPSG:32643");
        assert!(matches!(
            network.snap_points(&[Point::new(0.0, 0.0)]),
            Err(Error::NoPointsFound)
        ));
    }

    #[test]
    fn parallel_edges_are_kept() {
        let mut network = line_network();
        let a = NodeIndex::new(0);
        let b = NodeIndex::new(1);
        let geometry = line_string![(x: 0.0, y: 0.0), (x: 50.0, y: 40.0), (x: 100.0, y: 0.0)];
        network
            .graph
            .add_edge(a, b, RoadEdge::new(128.0, "residential", geometry));
        assert_eq!(network.edge_count(), 3);
        assert_eq!(network.edges(a).count(), 2);
        assert!(!network.is_enriched());
    }
}
