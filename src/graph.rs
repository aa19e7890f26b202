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

//! Forward-star packed graphs.
//!
//! All graphs in the engine share the same storage scheme: an array of
//! nodes, each holding the offset of its first edge and an edge count, and
//! an edge array sorted by source node and then by target. Graphs are
//! immutable once built; the only mutation ever applied is the turn-penalty
//! refresh that runs before customization and contraction.

use std::collections::VecDeque;
use std::ops::Range;

use fixedbitset::FixedBitSet;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use crate::partition::MultiLevelPartition;
use crate::types::{EdgeDuration, EdgeId, EdgeWeight, LevelId, NodeId};

/// Per-edge attributes of the edge-based graph.
///
/// An edge describes a legal turn from one directed road segment onto
/// another. The `backward` flag marks edges that the reverse search may
/// traverse against their direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct EdgeData {
    pub weight: EdgeWeight,
    pub duration: EdgeDuration,
    pub forward: bool,
    pub backward: bool,
    /// Index into the turn-penalty and turn-instruction tables.
    pub turn_id: u32,
}

/// An edge of the graph before it has been packed into forward-star form.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct InputEdge {
    pub source: NodeId,
    pub target: NodeId,
    pub data: EdgeData,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
pub struct NodeEntry {
    pub first_edge: u32,
    pub edge_count: u16,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct EdgeEntry {
    pub target: NodeId,
    pub data: EdgeData,
}

/// Interface shared by all packed graphs, so that searches can be written
/// once and instantiated for the base graph, the contracted hierarchy or
/// the multi-level overlay.
pub trait Graph {
    type EdgeData;

    fn num_nodes(&self) -> usize;
    fn edge_range(&self, node: NodeId) -> Range<EdgeId>;
    fn target(&self, edge: EdgeId) -> NodeId;
    fn edge_data(&self, edge: EdgeId) -> &Self::EdgeData;
}

/// The edge-expanded road graph: nodes are directed road segments, edges
/// are turns.
#[derive(Clone, Debug)]
pub struct EdgeBasedGraph {
    nodes: Vec<NodeEntry>,
    edges: Vec<EdgeEntry>,
    /// Strongly-connected-component id per node, used to tell "no route"
    /// from "impossible route".
    components: Vec<u32>,
}

impl EdgeBasedGraph {
    /// Builds the packed graph from an unsorted edge list.
    pub fn from_edges(num_nodes: usize, mut input: Vec<InputEdge>) -> Self {
        input.sort_unstable_by_key(|edge| (edge.source, edge.target));
        let mut nodes = vec![NodeEntry::default(); num_nodes];
        let mut edges = Vec::with_capacity(input.len());
        for edge in input {
            let entry = &mut nodes[edge.source as usize];
            if entry.edge_count == 0 {
                entry.first_edge = edges.len() as u32;
            }
            entry.edge_count += 1;
            edges.push(EdgeEntry {
                target: edge.target,
                data: edge.data,
            });
        }
        Self::from_parts(nodes, edges)
    }

    /// Rebuilds a graph from its packed arrays, recomputing the component
    /// ids. This is the path taken when loading an `.ebg` artifact.
    pub fn from_parts(nodes: Vec<NodeEntry>, edges: Vec<EdgeEntry>) -> Self {
        let components = compute_components(&nodes, &edges);
        EdgeBasedGraph {
            nodes,
            edges,
            components,
        }
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn nodes(&self) -> &[NodeEntry] {
        &self.nodes
    }

    pub fn edges(&self) -> &[EdgeEntry] {
        &self.edges
    }

    /// The strongly connected component the node belongs to.
    pub fn component(&self, node: NodeId) -> u32 {
        self.components[node as usize]
    }

    pub fn edge_data_mut(&mut self, edge: EdgeId) -> &mut EdgeData {
        &mut self.edges[edge as usize].data
    }

    /// The cheapest edge from `from` to `to` that satisfies `filter`.
    pub fn find_smallest_edge<F>(&self, from: NodeId, to: NodeId, filter: F) -> Option<EdgeId>
    where
        F: Fn(&EdgeData) -> bool,
    {
        self.edge_range(from)
            .filter(|&edge| self.target(edge) == to && filter(self.edge_data(edge)))
            .min_by_key(|&edge| self.edge_data(edge).weight)
    }

    /// Whether any node of `targets` can be reached from any node of
    /// `sources` over forward-traversable edges. One-way reachability is
    /// weaker than component equality, which demands a path back as well.
    pub fn is_reachable(&self, sources: &[NodeId], targets: &[NodeId]) -> bool {
        let mut visited = FixedBitSet::with_capacity(self.nodes.len());
        let mut queue = VecDeque::new();
        for &source in sources {
            if !visited.put(source as usize) {
                queue.push_back(source);
            }
        }
        while let Some(node) = queue.pop_front() {
            if targets.contains(&node) {
                return true;
            }
            for edge in self.edge_range(node) {
                if !self.edge_data(edge).forward {
                    continue;
                }
                let to = self.target(edge);
                if !visited.put(to as usize) {
                    queue.push_back(to);
                }
            }
        }
        false
    }
}

impl Graph for EdgeBasedGraph {
    type EdgeData = EdgeData;

    fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    fn edge_range(&self, node: NodeId) -> Range<EdgeId> {
        let entry = &self.nodes[node as usize];
        entry.first_edge..entry.first_edge + entry.edge_count as u32
    }

    fn target(&self, edge: EdgeId) -> NodeId {
        self.edges[edge as usize].target
    }

    fn edge_data(&self, edge: EdgeId) -> &EdgeData {
        &self.edges[edge as usize].data
    }
}

fn compute_components(nodes: &[NodeEntry], edges: &[EdgeEntry]) -> Vec<u32> {
    let mut graph = DiGraph::<(), ()>::with_capacity(nodes.len(), edges.len());
    for _ in 0..nodes.len() {
        graph.add_node(());
    }
    for (source, entry) in nodes.iter().enumerate() {
        let range = entry.first_edge..entry.first_edge + entry.edge_count as u32;
        for edge in range {
            let edge = &edges[edge as usize];
            let u = NodeIndex::new(source);
            let v = NodeIndex::new(edge.target as usize);
            if edge.data.forward {
                graph.add_edge(u, v, ());
            }
            if edge.data.backward {
                graph.add_edge(v, u, ());
            }
        }
    }
    let mut components = vec![0u32; nodes.len()];
    for (id, scc) in tarjan_scc(&graph).into_iter().enumerate() {
        for node in scc {
            components[node.index()] = id as u32;
        }
    }
    components
}

/// An edge of the multi-level overlay graph. `id` points back at the
/// underlying edge of the base graph.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct MultiLevelEdgeEntry {
    pub target: NodeId,
    pub data: EdgeData,
    pub id: EdgeId,
}

/// The edge-based graph re-packed for multi-level queries.
///
/// The adjacency of every node is sorted by descending boundary level, so
/// the edges that cross a cell boundary at level `l` or above form a prefix
/// of the node's edge range. A node-to-level offset map gives the length of
/// that prefix for every level.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MultiLevelGraph {
    nodes: Vec<NodeEntry>,
    edges: Vec<MultiLevelEdgeEntry>,
    /// Flattened `(node, level)` table: entry `node * (num_levels + 1) + l`
    /// holds the number of the node's edges with boundary level `>= l`.
    level_offsets: Vec<u32>,
    num_levels: LevelId,
}

impl MultiLevelGraph {
    pub fn new(graph: &EdgeBasedGraph, partition: &MultiLevelPartition) -> Self {
        let num_levels = partition.num_levels();
        let stride = num_levels as usize + 1;
        let mut nodes = Vec::with_capacity(graph.num_nodes());
        let mut edges = Vec::with_capacity(graph.num_edges());
        let mut level_offsets = vec![0u32; graph.num_nodes() * stride];

        let mut adjacency = Vec::new();
        for node in 0..graph.num_nodes() as NodeId {
            adjacency.clear();
            for edge in graph.edge_range(node) {
                let target = graph.target(edge);
                let level = partition.highest_different_level(node, target);
                adjacency.push((level, target, edge));
            }
            adjacency.sort_unstable_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

            nodes.push(NodeEntry {
                first_edge: edges.len() as u32,
                edge_count: adjacency.len() as u16,
            });
            let offsets = &mut level_offsets[node as usize * stride..(node as usize + 1) * stride];
            for &(level, target, edge) in &adjacency {
                for entry in offsets.iter_mut().take(level as usize + 1) {
                    *entry += 1;
                }
                edges.push(MultiLevelEdgeEntry {
                    target,
                    data: *graph.edge_data(edge),
                    id: edge,
                });
            }
        }
        MultiLevelGraph {
            nodes,
            edges,
            level_offsets,
            num_levels,
        }
    }

    pub fn from_parts(
        nodes: Vec<NodeEntry>,
        edges: Vec<MultiLevelEdgeEntry>,
        level_offsets: Vec<u32>,
        num_levels: LevelId,
    ) -> Self {
        MultiLevelGraph {
            nodes,
            edges,
            level_offsets,
            num_levels,
        }
    }

    pub fn num_levels(&self) -> LevelId {
        self.num_levels
    }

    pub fn nodes(&self) -> &[NodeEntry] {
        &self.nodes
    }

    pub fn edges(&self) -> &[MultiLevelEdgeEntry] {
        &self.edges
    }

    pub fn level_offsets(&self) -> &[u32] {
        &self.level_offsets
    }

    fn border_count(&self, level: LevelId, node: NodeId) -> u32 {
        let stride = self.num_levels as usize + 1;
        self.level_offsets[node as usize * stride + level as usize]
    }

    /// Edges of `node` that cross a cell boundary at `level` or above.
    pub fn border_edge_range(&self, level: LevelId, node: NodeId) -> Range<EdgeId> {
        let first = self.nodes[node as usize].first_edge;
        first..first + self.border_count(level, node)
    }

    /// Edges of `node` whose endpoints share a cell at `level`.
    pub fn internal_edge_range(&self, level: LevelId, node: NodeId) -> Range<EdgeId> {
        let entry = &self.nodes[node as usize];
        entry.first_edge + self.border_count(level, node)
            ..entry.first_edge + entry.edge_count as u32
    }

    /// The base-graph edge id behind an overlay edge.
    pub fn original_edge(&self, edge: EdgeId) -> EdgeId {
        self.edges[edge as usize].id
    }

    /// The cheapest edge from `from` to `to` that satisfies `filter`.
    pub fn find_smallest_edge<F>(&self, from: NodeId, to: NodeId, filter: F) -> Option<EdgeId>
    where
        F: Fn(&EdgeData) -> bool,
    {
        self.edge_range(from)
            .filter(|&edge| self.target(edge) == to && filter(self.edge_data(edge)))
            .min_by_key(|&edge| self.edge_data(edge).weight)
    }
}

impl Graph for MultiLevelGraph {
    type EdgeData = EdgeData;

    fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    fn edge_range(&self, node: NodeId) -> Range<EdgeId> {
        let entry = &self.nodes[node as usize];
        entry.first_edge..entry.first_edge + entry.edge_count as u32
    }

    fn target(&self, edge: EdgeId) -> NodeId {
        self.edges[edge as usize].target
    }

    fn edge_data(&self, edge: EdgeId) -> &EdgeData {
        &self.edges[edge as usize].data
    }
}

/// Convenience constructor for a forward-only stored edge.
pub fn edge(source: NodeId, target: NodeId, weight: EdgeWeight) -> InputEdge {
    InputEdge {
        source,
        target,
        data: EdgeData {
            weight,
            duration: weight * 10,
            forward: true,
            backward: false,
            turn_id: 0,
        },
    }
}

/// The two stored entries describing one real directed edge `source ->
/// target`: a forward entry at the source and a reverse-discoverable entry
/// at the target. Every well-formed input graph stores both, so that the
/// reverse search and the boundary enumeration see incoming edges.
pub fn directed_edge_pair(
    source: NodeId,
    target: NodeId,
    weight: EdgeWeight,
) -> [InputEdge; 2] {
    let mut forward = edge(source, target, weight);
    forward.data.duration = weight * 10;
    let mut reverse = InputEdge {
        source: target,
        target: source,
        data: forward.data,
    };
    reverse.data.forward = false;
    reverse.data.backward = true;
    [forward, reverse]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_star_test() {
        let graph = EdgeBasedGraph::from_edges(
            4,
            vec![edge(2, 3, 3), edge(0, 1, 1), edge(0, 2, 2), edge(1, 2, 1)],
        );
        assert_eq!(graph.num_nodes(), 4);
        assert_eq!(graph.num_edges(), 4);
        assert_eq!(graph.edge_range(0), 0..2);
        assert_eq!(graph.target(0), 1);
        assert_eq!(graph.target(1), 2);
        assert_eq!(graph.edge_range(1), 2..3);
        assert_eq!(graph.edge_range(3), 0..0);
        assert_eq!(graph.edge_data(1).weight, 2);
    }

    #[test]
    fn find_smallest_edge_test() {
        let mut edges = vec![edge(0, 1, 5), edge(0, 1, 3)];
        edges[0].data.backward = true;
        let graph = EdgeBasedGraph::from_edges(2, edges);
        let smallest = graph.find_smallest_edge(0, 1, |data| data.forward);
        assert_eq!(smallest.map(|e| graph.edge_data(e).weight), Some(3));
        let backward = graph.find_smallest_edge(0, 1, |data| data.backward);
        assert_eq!(backward.map(|e| graph.edge_data(e).weight), Some(5));
        assert_eq!(graph.find_smallest_edge(1, 0, |data| data.forward), None);
    }

    #[test]
    fn component_test() {
        // Two disjoint directed cycles.
        let edges = vec![
            edge(0, 1, 1),
            edge(1, 0, 1),
            edge(2, 3, 1),
            edge(3, 2, 1),
        ];
        let graph = EdgeBasedGraph::from_edges(4, edges);
        assert_eq!(graph.component(0), graph.component(1));
        assert_eq!(graph.component(2), graph.component(3));
        assert_ne!(graph.component(0), graph.component(2));
    }

    #[test]
    fn reachability_test() {
        // A one-way line: every node sits in its own component, yet the
        // downstream nodes stay reachable.
        let graph =
            EdgeBasedGraph::from_edges(4, vec![edge(0, 1, 1), edge(1, 2, 1), edge(2, 3, 1)]);
        assert_ne!(graph.component(0), graph.component(3));
        assert!(graph.is_reachable(&[0], &[3]));
        assert!(graph.is_reachable(&[0], &[0]));
        assert!(!graph.is_reachable(&[3], &[0]));
        assert!(!graph.is_reachable(&[], &[0]));
        // Either seed may provide the path.
        assert!(graph.is_reachable(&[3, 1], &[2]));
    }
}
