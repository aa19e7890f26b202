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

//! The packed hierarchy graph the CH query runs on.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use super::ContractorEdge;
use crate::graph::{Graph, NodeEntry};
use crate::types::{EdgeDuration, EdgeId, EdgeWeight, NodeId};

/// Attributes of one hierarchy edge.
///
/// `id` is the middle node for shortcuts and the base-graph edge id for
/// original edges. Every stored edge points from a lower-ranked node to a
/// higher-ranked one; `forward`/`backward` state which of the two
/// traversal directions exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChEdgeData {
    pub weight: EdgeWeight,
    pub duration: EdgeDuration,
    pub forward: bool,
    pub backward: bool,
    pub shortcut: bool,
    pub id: u32,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct ChEdgeEntry {
    pub target: NodeId,
    pub data: ChEdgeData,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ContractedGraph {
    nodes: Vec<NodeEntry>,
    edges: Vec<ChEdgeEntry>,
    /// Contraction rank per node; higher means contracted later.
    order: Vec<u32>,
}

/// Packs the harvested contraction edges into forward-star form, merging
/// mirrored entries of equal weight into one bidirectional edge.
pub(super) fn build(
    num_nodes: usize,
    order: Vec<u32>,
    harvested: Vec<(NodeId, NodeId, ContractorEdge)>,
) -> ContractedGraph {
    let mut list: Vec<(NodeId, ChEdgeEntry)> = harvested
        .into_iter()
        .map(|(source, target, edge)| {
            (
                source,
                ChEdgeEntry {
                    target,
                    data: ChEdgeData {
                        weight: edge.weight,
                        duration: edge.duration,
                        forward: edge.forward,
                        backward: edge.backward,
                        shortcut: edge.middle.is_some(),
                        id: edge.middle.unwrap_or(edge.id),
                    },
                },
            )
        })
        .collect();
    list.sort_unstable_by_key(|(source, entry)| {
        (
            *source,
            entry.target,
            entry.data.weight,
            entry.data.shortcut,
            entry.data.id,
        )
    });

    let mut merged: Vec<(NodeId, ChEdgeEntry)> = Vec::with_capacity(list.len());
    for (source, entry) in list {
        if let Some((last_source, last)) = merged.last_mut() {
            if *last_source == source
                && last.target == entry.target
                && last.data.weight == entry.data.weight
                && last.data.shortcut == entry.data.shortcut
                && last.data.id == entry.data.id
            {
                last.data.forward |= entry.data.forward;
                last.data.backward |= entry.data.backward;
                continue;
            }
        }
        merged.push((source, entry));
    }

    let mut nodes = vec![NodeEntry::default(); num_nodes];
    let mut edges = Vec::with_capacity(merged.len());
    for (source, entry) in merged {
        let node = &mut nodes[source as usize];
        if node.edge_count == 0 {
            node.first_edge = edges.len() as u32;
        }
        node.edge_count += 1;
        edges.push(entry);
    }
    ContractedGraph {
        nodes,
        edges,
        order,
    }
}

impl ContractedGraph {
    pub fn from_parts(nodes: Vec<NodeEntry>, edges: Vec<ChEdgeEntry>, order: Vec<u32>) -> Self {
        ContractedGraph {
            nodes,
            edges,
            order,
        }
    }

    pub fn nodes(&self) -> &[NodeEntry] {
        &self.nodes
    }

    pub fn edges(&self) -> &[ChEdgeEntry] {
        &self.edges
    }

    pub fn order(&self) -> &[u32] {
        &self.order
    }

    pub fn rank(&self, node: NodeId) -> u32 {
        self.order[node as usize]
    }

    /// The cheapest stored edge `from -> to` satisfying `filter`.
    pub fn find_smallest_edge<F>(&self, from: NodeId, to: NodeId, filter: F) -> Option<EdgeId>
    where
        F: Fn(&ChEdgeData) -> bool,
    {
        self.edge_range(from)
            .filter(|&edge| self.edges[edge as usize].target == to && filter(self.edge_data(edge)))
            .min_by_key(|&edge| self.edge_data(edge).weight)
    }
}

impl Graph for ContractedGraph {
    type EdgeData = ChEdgeData;

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

    fn edge_data(&self, edge: EdgeId) -> &ChEdgeData {
        &self.edges[edge as usize].data
    }
}
