use std::collections::BinaryHeap;

use fixedbitset::FixedBitSet;
use hashbrown::HashMap;
use petgraph::{graph::NodeIndex, visit::EdgeRef};

use super::state::State;
use crate::{model::RoadNetwork, routing::TravelCost};

/// Set of facility nodes a search stops at
#[derive(Debug, Clone)]
pub struct TargetSet {
    members: FixedBitSet,
    len: usize,
}

impl TargetSet {
    pub fn new(network: &RoadNetwork, targets: &[NodeIndex]) -> Self {
        let mut members = FixedBitSet::with_capacity(network.node_count());
        for target in targets {
            members.insert(target.index());
        }
        let len = members.count_ones(..);
        Self { members, len }
    }

    pub fn contains(&self, node: NodeIndex) -> bool {
        self.members.contains(node.index())
    }

    /// Number of distinct target nodes
    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Cost from `start` to the cheapest node of `targets`, or `None` when no
/// target is reachable.
///
/// Nodes leave the heap in non-decreasing cost order, so the first settled
/// target is the minimum over all targets and the search stops there.
pub fn dijkstra_nearest_target(
    network: &RoadNetwork,
    start: NodeIndex,
    targets: &TargetSet,
    cost: TravelCost,
) -> Option<f64> {
    if targets.is_empty() {
        return None;
    }

    let mut distances: HashMap<NodeIndex, f64> = HashMap::new();
    let mut heap = BinaryHeap::new();

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
        if let Some(&best) = distances.get(&node)
            && current > best
        {
            continue;
        }

        if targets.contains(node) {
            return Some(current);
        }

        for edge in network.edges(node) {
            let Some(weight) = edge.weight().cost(cost) else {
                continue;
            };
            let next = edge.target();
            let next_cost = current + weight;

            let improved = distances
                .get(&next)
                .is_none_or(|&known| next_cost < known);
            if improved {
                distances.insert(next, next_cost);
                heap.push(State {
                    cost: next_cost,
                    node: next,
                });
            }
        }
    }

    None
}
