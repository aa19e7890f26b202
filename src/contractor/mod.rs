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

//! The contraction hierarchy preprocessor.
//!
//! Nodes are contracted in order of a lazily re-evaluated priority; each
//! contraction inserts shortcut edges that preserve all shortest-path
//! distances among the remaining nodes. The edges removed together with a
//! node become the node's adjacency in the query graph, so every stored
//! edge points from a lower-ranked node to a higher-ranked one and the
//! bidirectional query only ever moves upward.

use std::cmp::Reverse;

use fixedbitset::FixedBitSet;
use hashbrown::HashSet;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, log_enabled, Level};
use object_pool::Pool;
use ordered_float::OrderedFloat;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use priority_queue::PriorityQueue;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::graph::{EdgeBasedGraph, Graph, NodeEntry};
use crate::heap::QueryHeap;
use crate::types::{EdgeDuration, EdgeId, EdgeWeight, NodeId, INVALID_WEIGHT};

mod query_graph;

pub use query_graph::{ChEdgeData, ChEdgeEntry, ContractedGraph};

/// Parameters of the node ordering.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ContractionConfig {
    /// Weight of the shortcuts-added over edges-removed quotient.
    pub edge_quotient_weight: f64,
    /// Weight of the original-edges-represented quotient.
    pub original_edges_weight: f64,
    /// Weight of the hierarchy depth term.
    pub depth_weight: f64,
    /// Fraction of the nodes to contract; the remainder forms the core.
    pub core_factor: f64,
    /// Settled-node cap of a witness search during contraction.
    pub witness_search_limit: usize,
    /// Settled-node cap of a witness search during priority simulation.
    pub simulation_search_limit: usize,
}

impl Default for ContractionConfig {
    fn default() -> Self {
        ContractionConfig {
            edge_quotient_weight: 2.0,
            original_edges_weight: 4.0,
            depth_weight: 1.0,
            core_factor: 1.0,
            witness_search_limit: 2000,
            simulation_search_limit: 1000,
        }
    }
}

/// An edge of the working graph. The entry lives at one endpoint and
/// carries flags for both traversal directions; its mirror entry at the
/// other endpoint has the flags swapped.
#[derive(Clone, Copy, Debug)]
struct ContractorEdge {
    weight: EdgeWeight,
    duration: EdgeDuration,
    /// Number of base-graph edges this edge represents.
    originals: u32,
    forward: bool,
    backward: bool,
    /// Middle node for shortcuts, otherwise `None`.
    middle: Option<NodeId>,
    /// Base-graph edge id for original edges.
    id: EdgeId,
}

#[derive(Default)]
struct ContractionStats {
    edges_added: usize,
    edges_deleted: usize,
    original_edges_added: usize,
    original_edges_deleted: usize,
}

type WitnessHeap = QueryHeap<EdgeWeight, ()>;

/// Outcome of the preprocessing: the rank-ordered query graph and the set
/// of uncontracted core nodes (empty when `core_factor` is 1).
pub struct ContractionResult {
    pub graph: ContractedGraph,
    pub core: FixedBitSet,
}

pub struct GraphContractor {
    graph: StableDiGraph<(), ContractorEdge>,
    config: ContractionConfig,
    depths: Vec<u32>,
    order: Vec<u32>,
    next_order: u32,
    /// Harvested query-graph edges: `(source, target, edge)`.
    edges: Vec<(NodeId, NodeId, ContractorEdge)>,
}

impl GraphContractor {
    pub fn new(input: &EdgeBasedGraph, config: ContractionConfig) -> Self {
        let mut graph = StableDiGraph::with_capacity(input.num_nodes(), input.num_edges() * 2);
        for _ in 0..input.num_nodes() {
            graph.add_node(());
        }
        // Every real directed edge gets an entry at both endpoints with the
        // direction flags swapped, so a node's adjacency describes all its
        // incident edges.
        for node in 0..input.num_nodes() as NodeId {
            for edge in input.edge_range(node) {
                let data = input.edge_data(edge);
                if !data.forward || data.weight == INVALID_WEIGHT {
                    continue;
                }
                let target = input.target(edge);
                if target == node {
                    continue;
                }
                let entry = ContractorEdge {
                    weight: data.weight.max(1),
                    duration: data.duration,
                    originals: 1,
                    forward: true,
                    backward: false,
                    middle: None,
                    id: edge,
                };
                let mut mirror = entry;
                mirror.forward = false;
                mirror.backward = true;
                graph.add_edge(NodeIndex::new(node as usize), NodeIndex::new(target as usize), entry);
                graph.add_edge(NodeIndex::new(target as usize), NodeIndex::new(node as usize), mirror);
            }
        }
        let num_nodes = input.num_nodes();
        GraphContractor {
            graph,
            config,
            depths: vec![0; num_nodes],
            order: vec![0; num_nodes],
            next_order: 1,
            edges: Vec::new(),
        }
    }

    /// Contracts the graph and returns the query graph plus the core
    /// marker set.
    pub fn run(mut self) -> ContractionResult {
        let num_nodes = self.depths.len();
        let target_count = (num_nodes as f64 * self.config.core_factor).ceil() as usize;

        info!("initializing elimination queue for {} nodes", num_nodes);
        let pool = Pool::new(rayon::current_num_threads(), || {
            WitnessHeap::new(num_nodes)
        });
        let priorities: Vec<(NodeId, f64)> = (0..num_nodes)
            .into_par_iter()
            .map_init(
                || pool.pull(|| WitnessHeap::new(num_nodes)),
                |heap, node| {
                    let priority = self.evaluate_priority(NodeIndex::new(node), heap);
                    (node as NodeId, priority)
                },
            )
            .collect();
        let mut queue: PriorityQueue<NodeId, Reverse<OrderedFloat<f64>>> =
            priorities
                .into_iter()
                .map(|(node, priority)| (node, Reverse(OrderedFloat(priority))))
                .collect();

        let progress = if log_enabled!(Level::Debug) {
            ProgressBar::new(target_count as u64)
        } else {
            ProgressBar::hidden()
        };
        progress.set_style(ProgressStyle::default_bar().template("{bar:60} ETA: {eta}").unwrap());

        let mut heap = WitnessHeap::new(num_nodes);
        let mut contracted = 0usize;
        while contracted < target_count {
            let Some((node, _)) = queue.pop() else {
                break;
            };
            // Lazy re-evaluation: the priority may be stale, so it is
            // recomputed and the node reinserted if it lost its place.
            let priority = self.evaluate_priority(NodeIndex::new(node as usize), &mut heap);
            if let Some((_, &Reverse(OrderedFloat(best)))) = queue.peek() {
                if priority > best {
                    queue.push(node, Reverse(OrderedFloat(priority)));
                    continue;
                }
            }
            self.contract_node(NodeIndex::new(node as usize), &mut heap);
            contracted += 1;
            progress.inc(1);

            let index = NodeIndex::new(node as usize);
            let neighbors: HashSet<NodeIndex> = self
                .graph
                .neighbors_undirected(index)
                .filter(|&n| n != index)
                .collect();
            let depth = self.depths[node as usize];
            self.order[node as usize] = self.next_order;
            self.next_order += 1;

            let harvested: Vec<_> = self
                .graph
                .edges(index)
                .map(|entry| (entry.target().index() as NodeId, *entry.weight()))
                .collect();
            for (target, edge) in harvested {
                self.edges.push((node, target, edge));
            }
            self.graph.remove_node(index);

            for neighbor in neighbors {
                let slot = &mut self.depths[neighbor.index()];
                *slot = (*slot).max(depth + 1);
                let priority = self.evaluate_priority(neighbor, &mut heap);
                queue.change_priority(
                    &(neighbor.index() as NodeId),
                    Reverse(OrderedFloat(priority)),
                );
            }
        }
        progress.finish_and_clear();
        debug!(
            "contracted {} of {} nodes, {} core node(s) remain",
            contracted,
            num_nodes,
            self.graph.node_count()
        );

        // Whatever survives the main loop is the core: those nodes keep
        // their mutual edges and rank above everything contracted.
        let mut core = FixedBitSet::with_capacity(num_nodes);
        let core_nodes: Vec<NodeIndex> = self.graph.node_indices().collect();
        if contracted < num_nodes {
            for &node in &core_nodes {
                core.insert(node.index());
                self.order[node.index()] = self.next_order;
                self.next_order += 1;
            }
            for &node in &core_nodes {
                for entry in self.graph.edges(node) {
                    self.edges.push((
                        node.index() as NodeId,
                        entry.target().index() as NodeId,
                        *entry.weight(),
                    ));
                }
            }
        }

        info!(
            "hierarchy complete: {} query edge(s), {} core node(s)",
            self.edges.len(),
            core.count_ones(..)
        );
        let graph = query_graph::build(num_nodes, self.order, self.edges);
        ContractionResult { graph, core }
    }

    /// Simulates the contraction of `node` and evaluates the priority
    /// heuristic.
    fn evaluate_priority(&self, node: NodeIndex, heap: &mut WitnessHeap) -> f64 {
        let mut stats = ContractionStats::default();
        self.find_shortcuts(
            node,
            heap,
            self.config.simulation_search_limit,
            |_, _, _, stats| {
                stats.edges_added += 2;
            },
            &mut stats,
        );
        for entry in self.graph.edges(node) {
            stats.edges_deleted += 1;
            stats.original_edges_deleted += entry.weight().originals as usize;
        }
        if stats.edges_deleted == 0 || stats.original_edges_deleted == 0 {
            return self.config.depth_weight * self.depths[node.index()] as f64;
        }
        self.config.edge_quotient_weight * stats.edges_added as f64 / stats.edges_deleted as f64
            + self.config.original_edges_weight * stats.original_edges_added as f64
                / stats.original_edges_deleted as f64
            + self.config.depth_weight * self.depths[node.index()] as f64
    }

    fn contract_node(&mut self, node: NodeIndex, heap: &mut WitnessHeap) {
        let mut shortcuts: Vec<(NodeIndex, NodeIndex, ContractorEdge)> = Vec::new();
        self.find_shortcuts(
            node,
            heap,
            self.config.witness_search_limit,
            |source, target, edge, _| {
                shortcuts.push((source, target, edge));
            },
            &mut ContractionStats::default(),
        );
        for (source, target, edge) in shortcuts {
            let mut mirror = edge;
            mirror.forward = false;
            mirror.backward = true;
            self.insert_shortcut(source, target, edge);
            self.insert_shortcut(target, source, mirror);
        }
    }

    /// Enumerates the shortcut edges the contraction of `node` requires.
    /// `emit` receives each forward shortcut once; mirrors are the caller's
    /// business.
    fn find_shortcuts<F>(
        &self,
        node: NodeIndex,
        heap: &mut WitnessHeap,
        search_limit: usize,
        mut emit: F,
        stats: &mut ContractionStats,
    ) where
        F: FnMut(NodeIndex, NodeIndex, ContractorEdge, &mut ContractionStats),
    {
        let incoming: Vec<_> = self
            .graph
            .edges(node)
            .filter(|entry| entry.weight().backward && entry.target() != node)
            .map(|entry| (entry.target(), *entry.weight()))
            .collect();
        let outgoing: Vec<_> = self
            .graph
            .edges(node)
            .filter(|entry| entry.weight().forward && entry.target() != node)
            .map(|entry| (entry.target(), *entry.weight()))
            .collect();

        for &(source, in_edge) in &incoming {
            let mut max_weight = 0;
            let mut targets = HashSet::new();
            for &(target, out_edge) in &outgoing {
                if target == source {
                    continue;
                }
                max_weight = max_weight.max(in_edge.weight + out_edge.weight);
                targets.insert(target);
            }
            if targets.is_empty() {
                continue;
            }
            self.witness_search(source, node, max_weight, &targets, search_limit, heap);

            for &(target, out_edge) in &outgoing {
                if target == source {
                    continue;
                }
                let path_weight = in_edge.weight + out_edge.weight;
                let witness_weight = if heap.was_inserted(target.index() as NodeId) {
                    heap.get_key(target.index() as NodeId)
                } else {
                    INVALID_WEIGHT
                };
                if path_weight < witness_weight {
                    stats.original_edges_added +=
                        2 * (in_edge.originals + out_edge.originals) as usize;
                    let shortcut = ContractorEdge {
                        weight: path_weight,
                        duration: in_edge.duration + out_edge.duration,
                        originals: in_edge.originals + out_edge.originals,
                        forward: true,
                        backward: false,
                        middle: Some(node.index() as NodeId),
                        id: EdgeId::MAX,
                    };
                    emit(source, target, shortcut, stats);
                }
            }
        }
    }

    /// A bounded Dijkstra from `source` that must not touch `excluded`.
    /// Settled keys answer whether a witness path at most as good as the
    /// potential shortcut exists.
    fn witness_search(
        &self,
        source: NodeIndex,
        excluded: NodeIndex,
        max_weight: EdgeWeight,
        targets: &HashSet<NodeIndex>,
        search_limit: usize,
        heap: &mut WitnessHeap,
    ) {
        heap.clear();
        heap.insert(source.index() as NodeId, 0, ());
        let mut remaining = targets.len();
        let mut settled = 0usize;
        while let Some(min_key) = heap.min_key() {
            if min_key > max_weight || remaining == 0 || settled >= search_limit {
                break;
            }
            let node = heap.delete_min().expect("heap is non-empty");
            settled += 1;
            if targets.contains(&NodeIndex::new(node as usize)) {
                remaining -= 1;
            }
            for entry in self.graph.edges(NodeIndex::new(node as usize)) {
                let data = entry.weight();
                if !data.forward || entry.target() == excluded {
                    continue;
                }
                let to = entry.target().index() as NodeId;
                let weight = min_key + data.weight;
                if !heap.was_inserted(to) {
                    heap.insert(to, weight, ());
                } else if weight < heap.get_key(to) {
                    heap.decrease_key(to, weight);
                }
            }
        }
    }

    /// Inserts a shortcut, merging it with an existing shortcut between the
    /// same endpoints and the same direction flags when one exists.
    fn insert_shortcut(&mut self, source: NodeIndex, target: NodeIndex, edge: ContractorEdge) {
        let existing = self
            .graph
            .edges_connecting(source, target)
            .find(|entry| {
                let data = entry.weight();
                data.middle.is_some()
                    && data.forward == edge.forward
                    && data.backward == edge.backward
            })
            .map(|entry| entry.id());
        match existing {
            Some(id) => {
                let data = self.graph.edge_weight_mut(id).expect("edge exists");
                if edge.weight < data.weight {
                    *data = edge;
                }
            }
            None => {
                self.graph.add_edge(source, target, edge);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::edge;

    fn line_graph() -> EdgeBasedGraph {
        // A -> B -> C -> D with weights 1, 1, 1.
        EdgeBasedGraph::from_edges(4, vec![edge(0, 1, 1), edge(1, 2, 1), edge(2, 3, 1)])
    }

    #[test]
    fn contract_line_test() {
        let input = line_graph();
        let result = GraphContractor::new(&input, ContractionConfig::default()).run();
        assert!(result.core.count_ones(..) == 0);
        // All distances must be preserved by some up-down path; at minimum
        // every original edge survives somewhere in the query graph.
        let graph = &result.graph;
        let total_weight: u64 = (0..graph.num_nodes() as NodeId)
            .flat_map(|n| graph.edge_range(n))
            .map(|e| graph.edge_data(e).weight as u64)
            .sum();
        assert!(total_weight >= 3);
    }

    #[test]
    fn shortcut_over_middle_test() {
        // Contracting B on A -> B -> C must create the shortcut A -> C with
        // weight 2 and middle B, since no witness path exists.
        let input = EdgeBasedGraph::from_edges(3, vec![edge(0, 1, 1), edge(1, 2, 1)]);
        let mut contractor = GraphContractor::new(&input, ContractionConfig::default());
        let mut heap = WitnessHeap::new(3);
        contractor.contract_node(NodeIndex::new(1), &mut heap);
        let shortcut = contractor
            .graph
            .edges_connecting(NodeIndex::new(0), NodeIndex::new(2))
            .find(|entry| entry.weight().forward)
            .expect("shortcut inserted");
        assert_eq!(shortcut.weight().weight, 2);
        assert_eq!(shortcut.weight().middle, Some(1));
    }

    #[test]
    fn witness_suppresses_shortcut_test() {
        // A -> B -> C with weights 2, 2 and a direct A -> C with weight 3:
        // the witness path makes the shortcut unnecessary.
        let input =
            EdgeBasedGraph::from_edges(3, vec![edge(0, 1, 2), edge(1, 2, 2), edge(0, 2, 3)]);
        let mut contractor = GraphContractor::new(&input, ContractionConfig::default());
        let mut heap = WitnessHeap::new(3);
        contractor.contract_node(NodeIndex::new(1), &mut heap);
        let shortcut = contractor
            .graph
            .edges_connecting(NodeIndex::new(0), NodeIndex::new(2))
            .filter(|entry| entry.weight().middle.is_some())
            .count();
        assert_eq!(shortcut, 0);
    }

    #[test]
    fn core_contraction_test() {
        let input = line_graph();
        let config = ContractionConfig {
            core_factor: 0.5,
            ..Default::default()
        };
        let result = GraphContractor::new(&input, config).run();
        assert_eq!(result.core.count_ones(..), 2);
    }
}
