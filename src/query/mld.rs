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

//! The multi-level Dijkstra search.
//!
//! At every settled node the search works at the node's effective level:
//! the coarsest level whose cell contains neither endpoint. Within that
//! level it jumps across the cell through the clique overlay and relaxes
//! only the edges that cross a boundary at that level or above. Clique
//! jumps on the final path are unpacked by restricted sub-searches one
//! level further down.

use super::{insert_in_heaps, InternalRoute, MldOverlay, PhantomNodes, SearchData, SearchHeap};
use crate::error::EngineError;
use crate::graph::Graph;
use crate::partition::MultiLevelPartition;
use crate::types::{
    CellId, EdgeId, LevelId, NodeId, SearchWeight, INVALID_NODE, INVALID_SEARCH_WEIGHT,
    INVALID_WEIGHT,
};

#[derive(Clone, Copy, Debug)]
enum QueryArgs<'a> {
    /// Unrestricted point-to-point query between two phantom endpoints.
    Phantoms(&'a PhantomNodes),
    /// Restricted sub-search during unpacking: a fixed level inside a
    /// fixed parent cell.
    Cell { level: LevelId, parent: CellId },
}

impl QueryArgs<'_> {
    fn query_level(&self, partition: &MultiLevelPartition, node: NodeId) -> LevelId {
        match *self {
            QueryArgs::Phantoms(phantoms) => {
                let sources = [
                    phantoms.source.forward_segment,
                    phantoms.source.reverse_segment,
                ];
                let targets = [
                    phantoms.target.forward_segment,
                    phantoms.target.reverse_segment,
                ];
                let mut level = LevelId::MAX;
                for source in sources.iter().flatten() {
                    for target in targets.iter().flatten() {
                        level = level.min(partition.query_level(*source, *target, node));
                    }
                }
                if level == LevelId::MAX {
                    0
                } else {
                    level
                }
            }
            QueryArgs::Cell { level, .. } => level,
        }
    }

    fn permits(&self, partition: &MultiLevelPartition, level: LevelId, to: NodeId) -> bool {
        match *self {
            QueryArgs::Phantoms(_) => true,
            QueryArgs::Cell { parent, .. } => partition.cell(level + 1, to) == parent,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Forward,
    Reverse,
}

pub fn route(
    overlay: &MldOverlay,
    scratch: &mut super::SearchScratch,
    phantoms: &PhantomNodes,
) -> Result<InternalRoute, EngineError> {
    scratch.clear();
    insert_in_heaps(phantoms, &mut scratch.forward, &mut scratch.reverse);
    let (weight, nodes, edges) = search(
        overlay,
        &mut scratch.forward,
        &mut scratch.reverse,
        phantoms.force_loop_forward(),
        phantoms.force_loop_reverse(),
        INVALID_SEARCH_WEIGHT,
        QueryArgs::Phantoms(phantoms),
    )
    .ok_or(EngineError::NoRoute)?;
    Ok(InternalRoute {
        weight: weight.max(0) as u32,
        nodes,
        edges,
    })
}

/// Runs one bidirectional search over seeded heaps and unpacks the result
/// down to base-graph edges. Returns `None` when the searches never meet.
fn search(
    overlay: &MldOverlay,
    forward: &mut SearchHeap,
    reverse: &mut SearchHeap,
    force_loop_forward: bool,
    force_loop_reverse: bool,
    weight_upper_bound: SearchWeight,
    args: QueryArgs<'_>,
) -> Option<(SearchWeight, Vec<NodeId>, Vec<EdgeId>)> {
    if forward.is_empty() || reverse.is_empty() {
        return None;
    }

    let mut middle = INVALID_NODE;
    let mut weight = weight_upper_bound;
    let mut forward_min = forward.min_key().expect("forward heap is seeded");
    let mut reverse_min = reverse.min_key().expect("reverse heap is seeded");
    while forward.size() + reverse.size() > 0 && forward_min + reverse_min < weight {
        if !forward.is_empty() {
            routing_step(
                overlay,
                forward,
                reverse,
                &mut middle,
                &mut weight,
                force_loop_forward,
                force_loop_reverse,
                Direction::Forward,
                args,
            );
            if let Some(min) = forward.min_key() {
                forward_min = min;
            }
        }
        if !reverse.is_empty() {
            routing_step(
                overlay,
                reverse,
                forward,
                &mut middle,
                &mut weight,
                force_loop_reverse,
                force_loop_forward,
                Direction::Reverse,
                args,
            );
            if let Some(min) = reverse.min_key() {
                reverse_min = min;
            }
        }
    }

    if weight >= weight_upper_bound || middle == INVALID_NODE {
        return None;
    }

    // Packed path of (source, target, via_clique) triples around the
    // meeting node.
    let mut packed: Vec<(NodeId, NodeId, bool)> = Vec::new();
    let mut current = middle;
    let mut parent = forward.get_data(middle).parent;
    while parent != current {
        let data = *forward.get_data(current);
        packed.push((parent, current, data.from_clique));
        current = parent;
        parent = forward.get_data(parent).parent;
    }
    packed.reverse();
    let source_node = current;

    current = middle;
    parent = reverse.get_data(middle).parent;
    while parent != current {
        let data = *reverse.get_data(current);
        packed.push((current, parent, data.from_clique));
        current = parent;
        parent = reverse.get_data(parent).parent;
    }

    let mut unpacked_nodes = vec![source_node];
    let mut unpacked_edges = Vec::with_capacity(packed.len());
    for (source, target, via_clique) in packed {
        if !via_clique {
            let edge = overlay
                .graph
                .find_smallest_edge(source, target, |data| data.forward)
                .unwrap_or_else(|| {
                    panic!(
                        "cell overlay is corrupt: no edge between {} and {}",
                        source, target
                    )
                });
            unpacked_nodes.push(target);
            unpacked_edges.push(overlay.graph.original_edge(edge));
        } else {
            // A clique jump: go one level down, restricted to the cell the
            // jump crossed. The heaps can be reused, the packed path has
            // already been extracted.
            let level = args.query_level(&overlay.partition, source);
            let parent_cell = overlay.partition.cell(level, source);
            debug_assert_eq!(parent_cell, overlay.partition.cell(level, target));

            forward.clear();
            reverse.clear();
            forward.insert(
                source,
                0,
                SearchData {
                    parent: source,
                    from_clique: false,
                },
            );
            reverse.insert(
                target,
                0,
                SearchData {
                    parent: target,
                    from_clique: false,
                },
            );
            let (_, sub_nodes, sub_edges) = search(
                overlay,
                forward,
                reverse,
                false,
                false,
                INVALID_SEARCH_WEIGHT,
                QueryArgs::Cell {
                    level: level - 1,
                    parent: parent_cell,
                },
            )
            .unwrap_or_else(|| {
                panic!(
                    "cell overlay is corrupt: no path from {} to {} inside cell {}",
                    source, target, parent_cell
                )
            });
            debug_assert_eq!(sub_nodes.first(), Some(&source));
            debug_assert_eq!(sub_nodes.last(), Some(&target));
            unpacked_nodes.extend_from_slice(&sub_nodes[1..]);
            unpacked_edges.extend_from_slice(&sub_edges);
        }
    }

    Some((weight, unpacked_nodes, unpacked_edges))
}

#[allow(clippy::too_many_arguments)]
fn routing_step(
    overlay: &MldOverlay,
    this_heap: &mut SearchHeap,
    other_heap: &mut SearchHeap,
    middle: &mut NodeId,
    upper: &mut SearchWeight,
    force_loop_this: bool,
    force_loop_other: bool,
    direction: Direction,
    args: QueryArgs<'_>,
) {
    let partition = &overlay.partition;
    let Some(node) = this_heap.delete_min() else {
        return;
    };
    let weight = this_heap.get_key(node);

    if other_heap.was_inserted(node) {
        let path_weight = weight + other_heap.get_key(node);
        if !(force_loop_this && this_heap.get_data(node).parent == node)
            && !(force_loop_other && other_heap.get_data(node).parent == node)
            && path_weight >= 0
            && path_weight < *upper
        {
            *middle = node;
            *upper = path_weight;
        }
    }

    let level = args.query_level(partition, node);

    // Clique edges, unless the node itself was reached over one: the
    // triangle inequality makes a second consecutive jump redundant.
    if level >= 1 && !this_heap.get_data(node).from_clique {
        let cell = overlay.cells.cell(level, partition.cell(level, node));
        match direction {
            Direction::Forward => {
                for (to, clique_weight, _) in cell.outgoing(node) {
                    relax_clique(this_heap, node, weight, to, clique_weight);
                }
            }
            Direction::Reverse => {
                for (to, clique_weight, _) in cell.incoming(node) {
                    relax_clique(this_heap, node, weight, to, clique_weight);
                }
            }
        }
    }

    relax_border_edges(
        overlay, this_heap, node, weight, level, direction, args, partition,
    );
}

fn relax_clique(
    this_heap: &mut SearchHeap,
    node: NodeId,
    weight: SearchWeight,
    to: NodeId,
    clique_weight: u32,
) {
    if clique_weight == INVALID_WEIGHT || to == node {
        return;
    }
    let to_weight = weight + clique_weight as SearchWeight;
    if !this_heap.was_inserted(to) {
        this_heap.insert(
            to,
            to_weight,
            SearchData {
                parent: node,
                from_clique: true,
            },
        );
    } else if to_weight < this_heap.get_key(to) {
        this_heap.decrease_key(to, to_weight);
        *this_heap.get_data_mut(to) = SearchData {
            parent: node,
            from_clique: true,
        };
    }
}

#[allow(clippy::too_many_arguments)]
fn relax_border_edges(
    overlay: &MldOverlay,
    this_heap: &mut SearchHeap,
    node: NodeId,
    weight: SearchWeight,
    level: LevelId,
    direction: Direction,
    args: QueryArgs<'_>,
    partition: &MultiLevelPartition,
) {
    // Boundary edges at the effective level or above.
    for edge in overlay.graph.border_edge_range(level, node) {
        let data = overlay.graph.edge_data(edge);
        let traversable = match direction {
            Direction::Forward => data.forward,
            Direction::Reverse => data.backward,
        };
        if !traversable {
            continue;
        }
        let to = overlay.graph.target(edge);
        if !args.permits(partition, level, to) {
            continue;
        }
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
            *this_heap.get_data_mut(to) = SearchData {
                parent: node,
                from_clique: false,
            };
        }
    }
}
