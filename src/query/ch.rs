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

//! The bidirectional contraction-hierarchy search.
//!
//! Both directions relax only stored edges, which all point upward in the
//! hierarchy. Stall-on-demand suppresses expansion of nodes that are
//! provably reachable more cheaply through a higher-ranked neighbor. When
//! a core is present the hierarchy search collects core entry points and
//! a plain bidirectional Dijkstra finishes the job on the core subgraph.

use fixedbitset::FixedBitSet;

use super::{insert_in_heaps, ChOverlay, InternalRoute, PhantomNodes, SearchData, SearchHeap};
use crate::contractor::{ChEdgeData, ContractedGraph};
use crate::error::EngineError;
use crate::graph::Graph;
use crate::types::{EdgeId, NodeId, SearchWeight, INVALID_NODE, INVALID_SEARCH_WEIGHT};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    /// Flag of edges this search direction may traverse away from a node.
    fn out_flag(self, data: &ChEdgeData) -> bool {
        match self {
            Direction::Forward => data.forward,
            Direction::Reverse => data.backward,
        }
    }

    /// Flag of edges usable to reach the node from above, for stalling.
    fn in_flag(self, data: &ChEdgeData) -> bool {
        match self {
            Direction::Forward => data.backward,
            Direction::Reverse => data.forward,
        }
    }
}

pub fn route(
    overlay: &ChOverlay,
    scratch: &mut super::SearchScratch,
    phantoms: &PhantomNodes,
) -> Result<InternalRoute, EngineError> {
    scratch.clear();
    insert_in_heaps(phantoms, &mut scratch.forward, &mut scratch.reverse);

    let force_forward = phantoms.force_loop_forward();
    let force_reverse = phantoms.force_loop_reverse();
    let result = match &overlay.core {
        Some(core) if core.count_ones(..) > 0 => search_core(
            &overlay.graph,
            core,
            scratch,
            force_forward,
            force_reverse,
        ),
        _ => search(
            &overlay.graph,
            &mut scratch.forward,
            &mut scratch.reverse,
            force_forward,
            force_reverse,
        ),
    };
    let (weight, packed) = result.ok_or(EngineError::NoRoute)?;
    let (nodes, edges) = unpack_path(&overlay.graph, &packed);
    Ok(InternalRoute {
        weight: weight.max(0) as u32,
        nodes,
        edges,
    })
}

/// The plain hierarchy search. Assumes seeded heaps; returns the meeting
/// weight and the packed node path, still containing shortcuts.
pub fn search(
    graph: &ContractedGraph,
    forward: &mut SearchHeap,
    reverse: &mut SearchHeap,
    force_loop_forward: bool,
    force_loop_reverse: bool,
) -> Option<(SearchWeight, Vec<NodeId>)> {
    if forward.is_empty() || reverse.is_empty() {
        return None;
    }
    let mut middle = INVALID_NODE;
    let mut upper = INVALID_SEARCH_WEIGHT;
    // Phantom offsets enter the forward heap negated; the margin keeps the
    // pruning sound in their presence.
    let min_edge_offset = forward.min_key().unwrap_or(0).min(0);

    while forward.size() + reverse.size() > 0 {
        if !forward.is_empty() {
            routing_step(
                graph,
                forward,
                reverse,
                &mut middle,
                &mut upper,
                min_edge_offset,
                force_loop_forward,
                force_loop_reverse,
                Direction::Forward,
                true,
            );
        }
        if !reverse.is_empty() {
            routing_step(
                graph,
                reverse,
                forward,
                &mut middle,
                &mut upper,
                min_edge_offset,
                force_loop_reverse,
                force_loop_forward,
                Direction::Reverse,
                true,
            );
        }
    }

    if middle == INVALID_NODE || upper == INVALID_SEARCH_WEIGHT {
        return None;
    }
    Some((upper, retrieve_packed_path(forward, reverse, middle)))
}

/// Hierarchy search that stops at the core boundary, followed by a plain
/// bidirectional Dijkstra over the collected core entry points.
fn search_core(
    graph: &ContractedGraph,
    core: &FixedBitSet,
    scratch: &mut super::SearchScratch,
    force_loop_forward: bool,
    force_loop_reverse: bool,
) -> Option<(SearchWeight, Vec<NodeId>)> {
    let mut middle = INVALID_NODE;
    let mut upper = INVALID_SEARCH_WEIGHT;
    let min_edge_offset = scratch.forward.min_key().unwrap_or(0).min(0);

    let mut forward_entry_points = Vec::new();
    let mut reverse_entry_points = Vec::new();
    while scratch.forward.size() + scratch.reverse.size() > 0 {
        if let Some(node) = scratch.forward.min() {
            if core.contains(node as usize) {
                scratch.forward.delete_min();
                forward_entry_points.push((
                    node,
                    scratch.forward.get_key(node),
                    scratch.forward.get_data(node).parent,
                ));
            } else {
                routing_step(
                    graph,
                    &mut scratch.forward,
                    &mut scratch.reverse,
                    &mut middle,
                    &mut upper,
                    min_edge_offset,
                    force_loop_forward,
                    force_loop_reverse,
                    Direction::Forward,
                    true,
                );
            }
        }
        if let Some(node) = scratch.reverse.min() {
            if core.contains(node as usize) {
                scratch.reverse.delete_min();
                reverse_entry_points.push((
                    node,
                    scratch.reverse.get_key(node),
                    scratch.reverse.get_data(node).parent,
                ));
            } else {
                routing_step(
                    graph,
                    &mut scratch.reverse,
                    &mut scratch.forward,
                    &mut middle,
                    &mut upper,
                    min_edge_offset,
                    force_loop_reverse,
                    force_loop_forward,
                    Direction::Reverse,
                    true,
                );
            }
        }
    }

    for (node, weight, parent) in forward_entry_points {
        scratch.forward_core.insert(
            node,
            weight,
            SearchData {
                parent,
                from_clique: false,
            },
        );
    }
    for (node, weight, parent) in reverse_entry_points {
        scratch.reverse_core.insert(
            node,
            weight,
            SearchData {
                parent,
                from_clique: false,
            },
        );
    }

    let mut core_offset = 0;
    core_offset = core_offset.min(scratch.forward_core.min_key().unwrap_or(0));
    core_offset = core_offset.min(scratch.reverse_core.min_key().unwrap_or(0));

    // Stalling is unsound on the core: no shortcuts were built over it.
    while !scratch.forward_core.is_empty()
        && !scratch.reverse_core.is_empty()
        && upper
            > scratch.forward_core.min_key().unwrap_or(INVALID_SEARCH_WEIGHT)
                + scratch.reverse_core.min_key().unwrap_or(INVALID_SEARCH_WEIGHT)
    {
        routing_step(
            graph,
            &mut scratch.forward_core,
            &mut scratch.reverse_core,
            &mut middle,
            &mut upper,
            core_offset,
            force_loop_forward,
            force_loop_reverse,
            Direction::Forward,
            false,
        );
        routing_step(
            graph,
            &mut scratch.reverse_core,
            &mut scratch.forward_core,
            &mut middle,
            &mut upper,
            core_offset,
            force_loop_reverse,
            force_loop_forward,
            Direction::Reverse,
            false,
        );
    }

    if middle == INVALID_NODE || upper == INVALID_SEARCH_WEIGHT {
        return None;
    }

    let packed = if core.contains(middle as usize) {
        let mut packed_core = Vec::new();
        retrieve_single_heap(&scratch.forward_core, middle, &mut packed_core);
        packed_core.reverse();
        packed_core.push(middle);
        retrieve_single_heap(&scratch.reverse_core, middle, &mut packed_core);

        let mut packed = Vec::new();
        retrieve_single_heap(&scratch.forward, packed_core[0], &mut packed);
        packed.reverse();
        packed.extend_from_slice(&packed_core);
        retrieve_single_heap(
            &scratch.reverse,
            *packed_core.last().expect("core leg is non-empty"),
            &mut packed,
        );
        packed
    } else {
        retrieve_packed_path(&scratch.forward, &scratch.reverse, middle)
    };
    Some((upper, packed))
}

#[allow(clippy::too_many_arguments)]
fn routing_step(
    graph: &ContractedGraph,
    this_heap: &mut SearchHeap,
    other_heap: &mut SearchHeap,
    middle: &mut NodeId,
    upper: &mut SearchWeight,
    min_edge_offset: SearchWeight,
    force_loop_this: bool,
    force_loop_other: bool,
    direction: Direction,
    stalling: bool,
) {
    let Some(node) = this_heap.delete_min() else {
        return;
    };
    let weight = this_heap.get_key(node);
    if weight + min_edge_offset > *upper {
        this_heap.delete_all();
        return;
    }

    if other_heap.was_inserted(node) {
        let path_weight = weight + other_heap.get_key(node);
        // A meeting at a seed of a forced-loop side is the degenerate
        // zero-progress route and must be rejected.
        if !(force_loop_this && this_heap.get_data(node).parent == node)
            && !(force_loop_other && other_heap.get_data(node).parent == node)
            && path_weight >= 0
            && path_weight < *upper
        {
            *middle = node;
            *upper = path_weight;
        }
    }

    if stalling {
        for edge in graph.edge_range(node) {
            let data = graph.edge_data(edge);
            if !direction.in_flag(data) {
                continue;
            }
            let to = graph.target(edge);
            if this_heap.was_inserted(to)
                && this_heap.get_key(to) + data.weight as SearchWeight <= weight
            {
                return;
            }
        }
    }

    for edge in graph.edge_range(node) {
        let data = graph.edge_data(edge);
        if !direction.out_flag(data) {
            continue;
        }
        let to = graph.target(edge);
        let to_weight = weight + data.weight as SearchWeight;
        if !this_heap.was_inserted(to) {
            this_heap.insert(
                to,
                to_weight,
                SearchData {
                    parent: node,
                    from_clique: false,
                },
            );
        } else if to_weight < this_heap.get_key(to) {
            this_heap.decrease_key(to, to_weight);
            this_heap.get_data_mut(to).parent = node;
        }
    }
}

fn retrieve_single_heap(heap: &SearchHeap, start: NodeId, packed: &mut Vec<NodeId>) {
    let mut current = start;
    // Seeds point at themselves; core entry points carry a parent that
    // only exists in the other heap pair.
    loop {
        let parent = heap.get_data(current).parent;
        if parent == current || !heap.was_inserted(parent) {
            break;
        }
        current = parent;
        packed.push(current);
    }
}

fn retrieve_packed_path(
    forward: &SearchHeap,
    reverse: &SearchHeap,
    middle: NodeId,
) -> Vec<NodeId> {
    let mut packed = Vec::new();
    retrieve_single_heap(forward, middle, &mut packed);
    packed.reverse();
    packed.push(middle);
    retrieve_single_heap(reverse, middle, &mut packed);
    packed
}

/// Expands every shortcut on the packed path until only base-graph edges
/// remain, with an explicit stack. A missing child edge means the
/// hierarchy is corrupt, which is fatal.
pub fn unpack_path(graph: &ContractedGraph, packed: &[NodeId]) -> (Vec<NodeId>, Vec<EdgeId>) {
    let mut nodes = Vec::with_capacity(packed.len());
    let mut edges = Vec::with_capacity(packed.len().saturating_sub(1));
    if let Some(&first) = packed.first() {
        nodes.push(first);
    }
    for pair in packed.windows(2) {
        unpack_edge(graph, pair[0], pair[1], &mut nodes, &mut edges);
    }
    (nodes, edges)
}

fn unpack_edge(
    graph: &ContractedGraph,
    from: NodeId,
    to: NodeId,
    nodes: &mut Vec<NodeId>,
    edges: &mut Vec<EdgeId>,
) {
    let mut stack = vec![(from, to)];
    while let Some((u, w)) = stack.pop() {
        let edge = graph
            .find_smallest_edge(u, w, |data| data.forward)
            .or_else(|| graph.find_smallest_edge(w, u, |data| data.backward))
            .unwrap_or_else(|| {
                panic!("hierarchy is corrupt: no edge between {} and {}", u, w)
            });
        let data = *graph.edge_data(edge);
        if data.shortcut {
            let middle = data.id;
            stack.push((middle, w));
            stack.push((u, middle));
        } else {
            nodes.push(w);
            edges.push(data.id);
        }
    }
}
