use std::collections::BinaryHeap;

use hashbrown::HashMap;
use petgraph::{graph::NodeIndex, visit::EdgeRef};

use super::state::State;
use crate::{model::RoadNetwork, routing::TravelCost};

/// Dijkstra's algorithm over the road network.
/// Returns a map of reachable node indices to their cost from `start`
/// (meters or seconds depending on `cost`).
///
/// Edges without a weight for the requested cost are not traversable.
pub fn dijkstra_path_weights(
    network: &RoadNetwork,
    start: NodeIndex,
    cost: TravelCost,
    max_cost: Option<f64>,
) -> HashMap<NodeIndex, f64> {
    let mut distances: HashMap<NodeIndex, f64> = HashMap::new();
    let mut heap = BinaryHeap::new();

    // Start node has distance 0
    heap.push(State {
        cost: 0.0,
        node: start,
    });
    distances.insert(start, 0.0);

    while let Some(State {
        cost: current,
        node,
    }) = heap.pop()
    {
        // Skip if we've found a better path
        if let Some(&best) = distances.get(&node)
            && current > best
        {
            continue;
        }

        // Check max cost constraint
        if let Some(max) = max_cost
            && current > max
        {
            continue;
        }

        // Examine neighbors
        for edge in network.edges(node) {
            let Some(weight) = edge.weight().cost(cost) else {
                continue;
            };
            let next = edge.target();
            let next_cost = current + weight;

            match distances.entry(next) {
                hashbrown::hash_map::Entry::Vacant(entry) => {
                    entry.insert(next_cost);
                    heap.push(State {
                        cost: next_cost,
                        node: next,
                    });
                }
                hashbrown::hash_map::Entry::Occupied(mut entry) => {
                    if next_cost < *entry.get() {
                        *entry.get_mut() = next_cost;
                        heap.push(State {
                            cost: next_cost,
                            node: next,
                        });
                    }
                }
            }
        }
    }

    if let Some(max) = max_cost {
        distances.retain(|_, reached| *reached <= max);
    }

    distances
}
