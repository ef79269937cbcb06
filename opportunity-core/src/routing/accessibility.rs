//! Minimum network cost from ward centroids to the nearest facility of a category.

use geo::Point;
use log::{info, warn};
use rayon::prelude::*;

use super::{
    TravelCost,
    dijkstra::{TargetSet, dijkstra_nearest_target},
};
use crate::{Error, config::CategoryAccess, model::RoadNetwork};

/// Accessibility of one ward to one service category.
///
/// `None` means the ward's node has no path to any facility node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccessMeasure {
    pub cost: TravelCost,
    /// Meters for distance costs, seconds for time costs
    pub raw: Option<f64>,
    pub minutes: Option<f64>,
}

impl AccessMeasure {
    fn from_raw(raw: Option<f64>, access: CategoryAccess) -> Self {
        let minutes = raw.map(|value| match access.cost {
            TravelCost::DriveTime | TravelCost::WalkTime => value / 60.0,
            // km/h -> m/min
            TravelCost::Distance => value / (access.flat_speed * 1000.0 / 60.0),
        });
        Self {
            cost: access.cost,
            raw,
            minutes,
        }
    }

    /// Measure for a category whose facilities could not be loaded
    pub const fn unavailable(cost: TravelCost) -> Self {
        Self {
            cost,
            raw: None,
            minutes: None,
        }
    }
}

/// Cost from every origin to its nearest destination over `network`.
///
/// Origins and destinations are snapped to their nearest nodes; each origin
/// then runs one search that stops at the first settled destination node.
/// Searches are independent, so they run in parallel; the output keeps the
/// order of `origins`.
///
/// # Errors
///
/// Returns [`Error::NotEnriched`] for time costs on a network without
/// travel times, and [`Error::NoPointsFound`] when the network is empty.
pub fn nearest_facility_costs(
    network: &RoadNetwork,
    origins: &[Point<f64>],
    destinations: &[Point<f64>],
    cost: TravelCost,
) -> Result<Vec<Option<f64>>, Error> {
    if cost.is_time() && !network.is_enriched() {
        return Err(Error::NotEnriched);
    }
    if destinations.is_empty() {
        warn!("No destinations given; every origin is unreachable");
        return Ok(vec![None; origins.len()]);
    }

    let origin_nodes = network.snap_points(origins)?;
    let destination_nodes = network.snap_points(destinations)?;
    let targets = TargetSet::new(network, &destination_nodes);

    info!(
        "Routing {} origins to {} destinations ({} distinct nodes)",
        origin_nodes.len(),
        destination_nodes.len(),
        targets.len()
    );

    let costs: Vec<Option<f64>> = origin_nodes
        .par_iter()
        .map(|&origin| dijkstra_nearest_target(network, origin, &targets, cost))
        .collect();

    let unreachable = costs.iter().filter(|cost| cost.is_none()).count();
    if unreachable > 0 {
        warn!(
            "{unreachable} of {} origins have no network path to any destination",
            costs.len()
        );
    }

    Ok(costs)
}

/// Accessibility of every origin to one category under its access plan
///
/// # Errors
///
/// Propagates the errors of [`nearest_facility_costs`].
pub fn measure_category(
    network: &RoadNetwork,
    origins: &[Point<f64>],
    facilities: &[Point<f64>],
    access: CategoryAccess,
) -> Result<Vec<AccessMeasure>, Error> {
    let costs = nearest_facility_costs(network, origins, facilities, access.cost)?;
    Ok(costs
        .into_iter()
        .map(|raw| AccessMeasure::from_raw(raw, access))
        .collect())
}

#[cfg(test)]
mod tests {
    use geo::line_string;
    use petgraph::graph::{DiGraph, NodeIndex};

    use super::*;
    use crate::{
        config::SpeedConfig,
        enrichment::enrich_network,
        model::{RoadEdge, RoadNode},
        routing::dijkstra::dijkstra_path_weights,
    };

    /// Square lattice of `size` x `size` nodes, `spacing` meters apart, with
    /// two-way edges, plus an isolated pair of nodes far to the east.
    fn lattice(size: usize, spacing: f64) -> RoadNetwork {
        let mut graph = DiGraph::new();
        let mut ids = Vec::new();
        for row in 0..size {
            for col in 0..size {
                let id = graph.add_node(RoadNode {
                    osm_id: (row * size + col) as i64,
                    geometry: Point::new(col as f64 * spacing, row as f64 * spacing),
                });
                ids.push(id);
            }
        }
        let connect = |a: NodeIndex, b: NodeIndex, graph: &mut DiGraph<RoadNode, RoadEdge>| {
            let geometry = line_string![graph[a].geometry.0, graph[b].geometry.0];
            graph.add_edge(a, b, RoadEdge::new(spacing, "tertiary", geometry.clone()));
            graph.add_edge(b, a, RoadEdge::new(spacing, "tertiary", geometry));
        };
        for row in 0..size {
            for col in 0..size {
                let here = ids[row * size + col];
                if col + 1 < size {
                    connect(here, ids[row * size + col + 1], &mut graph);
                }
                if row + 1 < size {
                    connect(here, ids[(row + 1) * size + col], &mut graph);
                }
            }
        }
        let far = spacing * (size as f64 + 10.0);
        let island_a = graph.add_node(RoadNode {
            osm_id: -1,
            geometry: Point::new(far, 0.0),
        });
        let island_b = graph.add_node(RoadNode {
            osm_id: -2,
            geometry: Point::new(far + spacing, 0.0),
        });
        connect(island_a, island_b, &mut graph);

        let mut network = RoadNetwork::from_graph(graph, "EPSG:32643");
        enrich_network(&mut network, &SpeedConfig::default()).unwrap();
        network
    }

    #[test]
    fn matches_brute_force_minimum() {
        let network = lattice(6, 100.0);
        let origins: Vec<Point<f64>> = (0..6)
            .map(|i| Point::new(i as f64 * 90.0 + 7.0, i as f64 * 80.0 + 3.0))
            .collect();
        let facilities = vec![Point::new(480.0, 20.0), Point::new(110.0, 390.0)];

        for cost in [TravelCost::Distance, TravelCost::DriveTime, TravelCost::WalkTime] {
            let fast = nearest_facility_costs(&network, &origins, &facilities, cost).unwrap();

            let origin_nodes = network.snap_points(&origins).unwrap();
            let facility_nodes = network.snap_points(&facilities).unwrap();
            for (origin, result) in origin_nodes.iter().zip(&fast) {
                let all = dijkstra_path_weights(&network, *origin, cost, None);
                let brute = facility_nodes
                    .iter()
                    .filter_map(|node| all.get(node).copied())
                    .fold(None, |best: Option<f64>, d| Some(best.map_or(d, |b| b.min(d))));
                match (result, brute) {
                    (Some(a), Some(b)) => assert!((a - b).abs() < 1e-9, "{a} != {b}"),
                    (None, None) => {}
                    other => panic!("mismatch: {other:?}"),
                }
            }
        }
    }

    #[test]
    fn disconnected_origin_is_none_not_zero() {
        let network = lattice(4, 100.0);
        let origins = vec![Point::new(1400.0, 0.0), Point::new(0.0, 0.0)];
        let facilities = vec![Point::new(300.0, 300.0)];
        let costs =
            nearest_facility_costs(&network, &origins, &facilities, TravelCost::Distance).unwrap();
        assert_eq!(costs[0], None);
        assert!((costs[1].unwrap() - 600.0).abs() < 1e-9);
    }

    #[test]
    fn origin_on_facility_node_costs_zero() {
        let network = lattice(3, 100.0);
        let here = vec![Point::new(100.0, 100.0)];
        let costs = nearest_facility_costs(&network, &here, &here, TravelCost::WalkTime).unwrap();
        assert_eq!(costs, vec![Some(0.0)]);
    }

    #[test]
    fn time_costs_require_enrichment() {
        let mut graph = DiGraph::new();
        graph.add_node(RoadNode {
            osm_id: 1,
            geometry: Point::new(0.0, 0.0),
        });
        let b = graph.add_node(RoadNode {
            osm_id: 2,
            geometry: Point::new(10.0, 0.0),
        });
        graph.add_edge(
            NodeIndex::new(0),
            b,
            RoadEdge::new(10.0, "primary", line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0)]),
        );
        let network = RoadNetwork::from_graph(graph, "EPSG:32643");
        let points = vec![Point::new(0.0, 0.0)];
        assert!(matches!(
            nearest_facility_costs(&network, &points, &points, TravelCost::DriveTime),
            Err(Error::NotEnriched)
        ));
        assert!(nearest_facility_costs(&network, &points, &points, TravelCost::Distance).is_ok());
    }

    #[test]
    fn drive_minutes_follow_congested_speed() {
        let network = lattice(5, 100.0);
        let access = CategoryAccess {
            cost: TravelCost::DriveTime,
            flat_speed: 30.0,
        };
        let measures = measure_category(
            &network,
            &[Point::new(0.0, 0.0)],
            &[Point::new(300.0, 0.0)],
            access,
        )
        .unwrap();
        let speed = 30.0 * 0.7 / 3.6;
        let expected_seconds = 300.0 / speed;
        let measure = measures[0];
        assert!((measure.raw.unwrap() - expected_seconds).abs() < 1e-9);
        assert!((measure.minutes.unwrap() - expected_seconds / 60.0).abs() < 1e-9);
    }

    #[test]
    fn distance_minutes_use_flat_speed() {
        let network = lattice(5, 100.0);
        let access = CategoryAccess {
            cost: TravelCost::Distance,
            flat_speed: 4.5,
        };
        let measures = measure_category(
            &network,
            &[Point::new(0.0, 0.0)],
            &[Point::new(200.0, 100.0)],
            access,
        )
        .unwrap();
        assert!((measures[0].raw.unwrap() - 300.0).abs() < 1e-9);
        assert!((measures[0].minutes.unwrap() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn empty_category_is_unreachable() {
        let network = lattice(3, 100.0);
        let costs =
            nearest_facility_costs(&network, &[Point::new(0.0, 0.0)], &[], TravelCost::WalkTime)
                .unwrap();
        assert_eq!(costs, vec![None]);
    }
}
