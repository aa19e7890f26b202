// This file is part of Byway.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Recursive bisection of the symmetrized road graph.
//!
//! Every node ends up with a 32-bit bisection id. The component index
//! occupies the high bits; below it, each recursion depth contributes one
//! bit recording which side of the cut the node fell on. Small connected
//! components are not bisected: they are packed into shared id slots and
//! keep their suffix bits at zero.

use hashbrown::HashMap;
use log::{debug, log_enabled, Level};
use serde::{Deserialize, Serialize};

use super::inertial_flow::{compute_cut, FlowGraph};
use crate::graph::{EdgeBasedGraph, Graph};
use crate::types::{Coordinate, NodeId};

/// Tuning knobs of the recursive bisection.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BisectionConfig {
    /// Recursion stops once a subgraph has at most this many nodes.
    pub maximum_cell_size: usize,
    /// A cut is accepted when its larger side holds at most
    /// `balance * n / 2` nodes.
    pub balance: f64,
    /// Fraction of the projection order seeded as flow sources and sinks.
    pub boundary_factor: f64,
    /// Number of projection slopes evaluated per cut.
    pub num_optimizing_cuts: usize,
    /// Connected components below this size are not bisected.
    pub small_component_size: usize,
}

impl Default for BisectionConfig {
    fn default() -> Self {
        BisectionConfig {
            maximum_cell_size: 128,
            balance: 1.2,
            boundary_factor: 0.25,
            num_optimizing_cuts: 10,
            small_component_size: 1000,
        }
    }
}

/// The undirected bisection graph: the road graph symmetrized, with one
/// coordinate per node for the inertial projections.
#[derive(Clone, Debug)]
pub struct BisectionGraph {
    coordinates: Vec<Coordinate>,
    first: Vec<u32>,
    neighbors: Vec<NodeId>,
}

impl BisectionGraph {
    pub fn new(coordinates: Vec<Coordinate>, edges: &[(NodeId, NodeId)]) -> Self {
        let num_nodes = coordinates.len();
        let mut lists: Vec<Vec<NodeId>> = vec![Vec::new(); num_nodes];
        for &(u, v) in edges {
            if u == v {
                continue;
            }
            lists[u as usize].push(v);
            lists[v as usize].push(u);
        }
        let mut first = Vec::with_capacity(num_nodes + 1);
        let mut neighbors = Vec::new();
        first.push(0);
        for mut list in lists {
            list.sort_unstable();
            list.dedup();
            neighbors.extend(list);
            first.push(neighbors.len() as u32);
        }
        BisectionGraph {
            coordinates,
            first,
            neighbors,
        }
    }

    /// Symmetrizes an edge-based graph.
    pub fn from_edge_based(graph: &EdgeBasedGraph, coordinates: Vec<Coordinate>) -> Self {
        let mut edges = Vec::with_capacity(graph.num_edges());
        for node in 0..graph.num_nodes() as NodeId {
            for edge in graph.edge_range(node) {
                edges.push((node, graph.target(edge)));
            }
        }
        BisectionGraph::new(coordinates, &edges)
    }

    pub fn num_nodes(&self) -> usize {
        self.coordinates.len()
    }

    fn neighbors(&self, node: NodeId) -> &[NodeId] {
        &self.neighbors[self.first[node as usize] as usize..self.first[node as usize + 1] as usize]
    }
}

/// Runs the recursive bisection and returns one bisection id per node.
pub fn run_bisection(graph: &BisectionGraph, config: &BisectionConfig) -> Vec<u32> {
    let components = connected_components(graph);
    let slots = assign_component_slots(&components, config);
    let num_slots = slots.iter().map(|&slot| slot + 1).max().unwrap_or(1);
    let prefix_bits = if num_slots > 1 {
        32 - (num_slots - 1).leading_zeros()
    } else {
        0
    };
    debug!(
        "bisecting {} nodes in {} component slot(s), {} prefix bit(s)",
        graph.num_nodes(),
        num_slots,
        prefix_bits
    );

    let mut ids = vec![0u32; graph.num_nodes()];
    for (node, &slot) in slots.iter().enumerate() {
        ids[node] = if prefix_bits > 0 {
            slot << (32 - prefix_bits)
        } else {
            0
        };
    }

    // Group the nodes of each slot; only slots holding one large component
    // are bisected further.
    let mut slot_nodes: Vec<Vec<NodeId>> = vec![Vec::new(); num_slots as usize];
    for (node, &slot) in slots.iter().enumerate() {
        slot_nodes[slot as usize].push(node as NodeId);
    }
    let mut component_sizes = HashMap::new();
    for &component in &components {
        *component_sizes.entry(component).or_insert(0usize) += 1;
    }

    for mut nodes in slot_nodes {
        if nodes.is_empty() {
            continue;
        }
        let size = component_sizes[&components[nodes[0] as usize]];
        if size < config.small_component_size {
            continue;
        }
        let mut node_ids = vec![0u32; nodes.len()];
        bisect_range(graph, config, &mut nodes, &mut node_ids, prefix_bits, 0);
        for (&node, &bits) in nodes.iter().zip(node_ids.iter()) {
            ids[node as usize] |= bits;
        }
    }
    ids
}

fn bisect_range(
    graph: &BisectionGraph,
    config: &BisectionConfig,
    nodes: &mut [NodeId],
    ids: &mut [u32],
    prefix_bits: u32,
    depth: u32,
) {
    if nodes.len() <= config.maximum_cell_size || prefix_bits + depth >= 32 {
        return;
    }

    let mut local: HashMap<NodeId, u32> = HashMap::with_capacity(nodes.len());
    for (index, &node) in nodes.iter().enumerate() {
        local.insert(node, index as u32);
    }
    let mut first = Vec::with_capacity(nodes.len() + 1);
    let mut neighbors = Vec::new();
    let mut coordinates = Vec::with_capacity(nodes.len());
    first.push(0);
    for &node in nodes.iter() {
        for &neighbor in graph.neighbors(node) {
            if let Some(&other) = local.get(&neighbor) {
                neighbors.push(other);
            }
        }
        first.push(neighbors.len() as u32);
        coordinates.push(graph.coordinates[node as usize]);
    }
    let view = FlowGraph { first, neighbors };

    let cut = match compute_cut(
        &coordinates,
        &view,
        config.balance,
        config.boundary_factor,
        config.num_optimizing_cuts,
    ) {
        Some(cut) => cut,
        // No balanced cut exists; the subgraph becomes a leaf cell.
        None => return,
    };
    if log_enabled!(Level::Debug) {
        debug!(
            "depth {}: cut {} nodes with {} edge(s)",
            depth,
            nodes.len(),
            cut.num_edges
        );
    }

    let bit = 1u32 << (31 - prefix_bits - depth);
    let mut left = Vec::new();
    let mut right = Vec::new();
    for (index, (&node, &id)) in nodes.iter().zip(ids.iter()).enumerate() {
        if cut.side[index] {
            left.push((node, id));
        } else {
            right.push((node, id | bit));
        }
    }
    let split = left.len();
    for (slot, (node, id)) in left.into_iter().chain(right).enumerate() {
        nodes[slot] = node;
        ids[slot] = id;
    }

    let (left_nodes, right_nodes) = nodes.split_at_mut(split);
    let (left_ids, right_ids) = ids.split_at_mut(split);
    rayon::join(
        || bisect_range(graph, config, left_nodes, left_ids, prefix_bits, depth + 1),
        || bisect_range(graph, config, right_nodes, right_ids, prefix_bits, depth + 1),
    );
}

fn connected_components(graph: &BisectionGraph) -> Vec<u32> {
    let mut components = vec![u32::MAX; graph.num_nodes()];
    let mut queue = std::collections::VecDeque::new();
    let mut next = 0;
    for start in 0..graph.num_nodes() as NodeId {
        if components[start as usize] != u32::MAX {
            continue;
        }
        components[start as usize] = next;
        queue.push_back(start);
        while let Some(node) = queue.pop_front() {
            for &neighbor in graph.neighbors(node) {
                if components[neighbor as usize] == u32::MAX {
                    components[neighbor as usize] = next;
                    queue.push_back(neighbor);
                }
            }
        }
        next += 1;
    }
    components
}

/// Maps every node to an id slot: large components get a slot of their
/// own, small components are packed together until a slot reaches the
/// maximum cell size.
fn assign_component_slots(components: &[u32], config: &BisectionConfig) -> Vec<u32> {
    let num_components = components.iter().map(|&c| c as usize + 1).max().unwrap_or(0);
    let mut sizes = vec![0usize; num_components];
    for &component in components {
        sizes[component as usize] += 1;
    }
    let mut by_size: Vec<usize> = (0..num_components).collect();
    by_size.sort_unstable_by_key(|&component| std::cmp::Reverse(sizes[component]));

    let mut slot_of_component = vec![0u32; num_components];
    let mut next_slot = 0u32;
    let mut bucket_fill = usize::MAX;
    for component in by_size {
        if sizes[component] >= config.small_component_size {
            slot_of_component[component] = next_slot;
            next_slot += 1;
        } else if bucket_fill != usize::MAX
            && bucket_fill + sizes[component] <= config.maximum_cell_size
        {
            slot_of_component[component] = next_slot - 1;
            bucket_fill += sizes[component];
        } else {
            slot_of_component[component] = next_slot;
            next_slot += 1;
            bucket_fill = sizes[component];
        }
    }
    components
        .iter()
        .map(|&component| slot_of_component[component as usize])
        .collect()
}
