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

//! Fills the clique tables of the cell storage.
//!
//! For every cell a Dijkstra search runs from each source boundary node,
//! restricted to the cell. At levels above the first the search crosses
//! the cliques of the level below instead of scanning cell interiors.

use hashbrown::HashSet;
use log::{debug, info, warn};
use object_pool::Pool;
use rayon::prelude::*;

use super::{CellChunk, CellStorage, CellStorageView};
use crate::graph::{EdgeBasedGraph, Graph, MultiLevelGraph};
use crate::heap::QueryHeap;
use crate::partition::MultiLevelPartition;
use crate::types::{EdgeDuration, EdgeWeight, LevelId, NodeId, INVALID_WEIGHT, MAX_DURATION};

#[derive(Clone, Copy, Debug, Default)]
struct HeapData {
    from_clique: bool,
    duration: EdgeDuration,
}

type Heap = QueryHeap<EdgeWeight, HeapData>;

pub struct CellCustomizer<'a> {
    partition: &'a MultiLevelPartition,
}

impl<'a> CellCustomizer<'a> {
    pub fn new(partition: &'a MultiLevelPartition) -> Self {
        CellCustomizer { partition }
    }

    /// Runs the customization level by level. Levels are sequential since
    /// each one reads the cliques of the level below; the cells of one
    /// level are processed in parallel with per-thread heaps.
    pub fn customize(&self, graph: &MultiLevelGraph, cells: &mut CellStorage) {
        let pool = Pool::new(rayon::current_num_threads(), || Heap::new(graph.num_nodes()));
        for level in 1..=self.partition.num_levels() {
            let (view, chunks) = cells.split_level_mut(level);
            let num_cells = chunks.len();
            chunks.into_par_iter().for_each_init(
                || pool.pull(|| Heap::new(graph.num_nodes())),
                |heap, chunk| {
                    self.customize_cell(graph, &view, level, chunk, heap);
                },
            );
            debug!("customized {} cell(s) at level {}", num_cells, level);
        }
        info!("cell metrics filled for {} level(s)", self.partition.num_levels());
    }

    fn customize_cell(
        &self,
        graph: &MultiLevelGraph,
        view: &CellStorageView<'_>,
        level: LevelId,
        mut chunk: CellChunk<'_>,
        heap: &mut Heap,
    ) {
        let width = chunk.destinations.len();
        for (row, &source) in chunk.sources.iter().enumerate() {
            heap.clear();
            heap.insert(source, 0, HeapData::default());
            let mut unsettled: HashSet<NodeId> = chunk.destinations.iter().copied().collect();

            while !heap.is_empty() && !unsettled.is_empty() {
                let node = heap.delete_min().expect("heap is non-empty");
                let weight = heap.get_key(node);
                let duration = heap.get_data(node).duration;
                self.relax_node(graph, view, heap, level, node, weight, duration);
                unsettled.remove(&node);
            }

            for (column, &destination) in chunk.destinations.iter().enumerate() {
                let slot = row * width + column;
                if heap.was_inserted(destination) {
                    chunk.weights[slot] = heap.get_key(destination);
                    chunk.durations[slot] = heap.get_data(destination).duration;
                } else {
                    chunk.weights[slot] = INVALID_WEIGHT;
                    chunk.durations[slot] = MAX_DURATION;
                }
            }
        }
    }

    fn relax_node(
        &self,
        graph: &MultiLevelGraph,
        view: &CellStorageView<'_>,
        heap: &mut Heap,
        level: LevelId,
        node: NodeId,
        weight: EdgeWeight,
        duration: EdgeDuration,
    ) {
        let first_level = level == 1;

        // Once a node has been reached over a clique edge, scanning the
        // sub-cell clique again cannot improve any distance: the triangle
        // inequality guarantees d(parent, node) + d(node, v) >= d(parent, v)
        // and (parent, v) is itself a clique entry.
        if !first_level && !heap.get_data(node).from_clique {
            let subcell_id = self.partition.cell(level - 1, node);
            let subcell = view.cell(level - 1, subcell_id);
            for (to, clique_weight, clique_duration) in subcell.outgoing(node) {
                if clique_weight == INVALID_WEIGHT {
                    continue;
                }
                let to_weight = weight + clique_weight;
                let to_data = HeapData {
                    from_clique: true,
                    duration: duration + clique_duration,
                };
                if !heap.was_inserted(to) {
                    heap.insert(to, to_weight, to_data);
                } else if to_weight < heap.get_key(to) {
                    heap.decrease_key(to, to_weight);
                    *heap.get_data_mut(to) = to_data;
                }
            }
        }

        // Original edges stay relevant only while they cross sub-cells (or
        // at the first level, where there are no sub-cells).
        for edge in graph.internal_edge_range(level, node) {
            let to = graph.target(edge);
            let data = graph.edge_data(edge);
            if !data.forward {
                continue;
            }
            if !first_level && self.partition.cell(level - 1, node) == self.partition.cell(level - 1, to)
            {
                continue;
            }
            let to_weight = weight + data.weight;
            let to_data = HeapData {
                from_clique: false,
                duration: duration + data.duration,
            };
            if !heap.was_inserted(to) {
                heap.insert(to, to_weight, to_data);
            } else if to_weight < heap.get_key(to) {
                heap.decrease_key(to, to_weight);
                *heap.get_data_mut(to) = to_data;
            }
        }
    }
}

/// Applies the turn-penalty vectors to the raw edge weights and durations.
///
/// Negative penalties would let the search construct negative cycles, so
/// they are clamped to zero. Upstream producers should never emit them;
/// a summary warning is surfaced because clamping can mask such bugs.
pub fn apply_turn_penalties(
    graph: &mut EdgeBasedGraph,
    weight_penalties: &[i32],
    duration_penalties: &[i32],
) {
    let mut clamped = 0usize;
    let mut first_offender = None;
    for edge in 0..graph.num_edges() as u32 {
        let data = graph.edge_data_mut(edge);
        let turn = data.turn_id as usize;
        if let Some(&penalty) = weight_penalties.get(turn) {
            if penalty < 0 {
                clamped += 1;
                first_offender.get_or_insert(data.turn_id);
            }
            data.weight = data.weight.saturating_add(penalty.max(0) as u32);
        }
        if let Some(&penalty) = duration_penalties.get(turn) {
            data.duration = data.duration.saturating_add(penalty.max(0) as u32);
        }
    }
    if clamped > 0 {
        warn!(
            "clamped {} negative turn weight penalt(ies) to zero (first offending turn id {})",
            clamped,
            first_offender.unwrap_or_default()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{directed_edge_pair, EdgeBasedGraph};
    use crate::partition::{bisection_to_partition, MultiLevelPartition};

    fn one_way_cycle(weights: [EdgeWeight; 6]) -> EdgeBasedGraph {
        let edges = (0..6)
            .flat_map(|i| directed_edge_pair(i, (i + 1) % 6, weights[i as usize]))
            .collect();
        EdgeBasedGraph::from_edges(6, edges)
    }

    fn two_cell_partition() -> MultiLevelPartition {
        let ids: Vec<u32> = (0..6).map(|i| (i / 3) << 31).collect();
        let (partitions, num_cells) = bisection_to_partition(&ids, &[3]);
        MultiLevelPartition::pack(&partitions, &num_cells)
    }

    #[test]
    fn cycle_clique_test() {
        let graph = one_way_cycle([1, 2, 3, 4, 5, 6]);
        let partition = two_cell_partition();
        let mld = MultiLevelGraph::new(&graph, &partition);
        let mut cells = CellStorage::new(&partition, &graph);
        CellCustomizer::new(&partition).customize(&mld, &mut cells);

        // Cell {0, 1, 2}: the search enters at 0, leaves at 2, and the
        // interior path 0 -> 1 -> 2 weighs 1 + 2 = 3.
        let left = cells.cell(1, 0);
        assert_eq!(left.out_weights(0), &[3]);
        let entries: Vec<_> = left.outgoing(0).collect();
        assert_eq!(entries, vec![(2, 3, 30)]);
        let incoming: Vec<_> = left.incoming(2).collect();
        assert_eq!(incoming, vec![(0, 3, 30)]);

        // Cell {3, 4, 5}: entry 3, exit 5, interior path 3 -> 4 -> 5.
        let right = cells.cell(1, 1);
        assert_eq!(right.source_nodes(), &[3]);
        assert_eq!(right.destination_nodes(), &[5]);
        assert_eq!(right.out_weights(3), &[4 + 5]);
    }

    #[test]
    fn two_way_clique_test() {
        // Both directions open on every street, unit weights.
        let edges = (0..6)
            .flat_map(|i| {
                let mut pair = directed_edge_pair(i, (i + 1) % 6, 1);
                for entry in &mut pair {
                    entry.data.forward = true;
                    entry.data.backward = true;
                }
                pair
            })
            .collect();
        let graph = EdgeBasedGraph::from_edges(6, edges);
        let partition = two_cell_partition();
        let mld = MultiLevelGraph::new(&graph, &partition);
        let mut cells = CellStorage::new(&partition, &graph);
        CellCustomizer::new(&partition).customize(&mld, &mut cells);

        let left = cells.cell(1, 0);
        assert_eq!(left.source_nodes(), &[0, 2]);
        assert_eq!(left.destination_nodes(), &[0, 2]);
        // Diagonal entries are zero, the 0 <-> 2 paths go through node 1.
        assert_eq!(left.out_weights(0), &[0, 2]);
        assert_eq!(left.out_weights(2), &[2, 0]);
    }

    #[test]
    fn negative_penalties_are_clamped_test() {
        let mut graph = one_way_cycle([1; 6]);
        apply_turn_penalties(&mut graph, &[-5], &[20]);
        for edge in 0..graph.num_edges() as u32 {
            assert_eq!(graph.edge_data(edge).weight, 1);
            assert_eq!(graph.edge_data(edge).duration, 30);
        }
    }
}
