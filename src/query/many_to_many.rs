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

//! Many-to-many tables over the contraction hierarchy.
//!
//! One backward search per target fills a shared bucket table keyed by
//! node; one forward search per source scans the buckets of every node it
//! settles. Sources run in parallel with pooled heaps.

use object_pool::Pool;
use rayon::prelude::*;

use super::{ChOverlay, PhantomNode};
use crate::contractor::ContractedGraph;
use crate::graph::Graph;
use crate::heap::QueryHeap;
use crate::types::{
    EdgeDuration, EdgeWeight, NodeId, SearchWeight, INVALID_WEIGHT, MAX_DURATION,
};

/// The `|sources| x |targets|` result matrices, row-major by source.
#[derive(Clone, Debug)]
pub struct DistanceTable {
    pub num_sources: usize,
    pub num_targets: usize,
    pub weights: Vec<EdgeWeight>,
    pub durations: Vec<EdgeDuration>,
}

impl DistanceTable {
    pub fn weight(&self, source: usize, target: usize) -> EdgeWeight {
        self.weights[source * self.num_targets + target]
    }

    pub fn duration(&self, source: usize, target: usize) -> EdgeDuration {
        self.durations[source * self.num_targets + target]
    }
}

/// The label a backward search leaves at a settled node.
#[derive(Clone, Copy, Debug)]
struct BucketEntry {
    node: NodeId,
    column: u32,
    weight: SearchWeight,
    duration: EdgeDuration,
}

type TableHeap = QueryHeap<SearchWeight, EdgeDuration>;

pub fn many_to_many(
    overlay: &ChOverlay,
    sources: &[PhantomNode],
    targets: &[PhantomNode],
) -> DistanceTable {
    let graph = &overlay.graph;
    let pool = Pool::new(rayon::current_num_threads(), || {
        TableHeap::new(graph.num_nodes())
    });

    // Backward phase: label the search space of every target.
    let mut buckets: Vec<BucketEntry> = targets
        .par_iter()
        .enumerate()
        .map_init(
            || pool.pull(|| TableHeap::new(graph.num_nodes())),
            |heap, (column, target)| {
                heap.clear();
                if let Some(node) = target.forward_segment {
                    heap.insert(node, target.forward_weight as SearchWeight, target.forward_duration);
                }
                if let Some(node) = target.reverse_segment {
                    if !heap.was_inserted(node) {
                        heap.insert(node, target.reverse_weight as SearchWeight, target.reverse_duration);
                    }
                }
                let mut entries = Vec::new();
                while let Some(node) = heap.delete_min() {
                    let weight = heap.get_key(node);
                    let duration = heap.get_data(node);
                    entries.push(BucketEntry {
                        node,
                        column: column as u32,
                        weight,
                        duration: *duration,
                    });
                    relax_upward(graph, heap, node, weight, false);
                }
                entries
            },
        )
        .flatten()
        .collect();
    buckets.sort_unstable_by_key(|entry| entry.node);

    // Forward phase: each source search scans the buckets of its settled
    // nodes.
    let num_targets = targets.len();
    let rows: Vec<(Vec<EdgeWeight>, Vec<EdgeDuration>)> = sources
        .par_iter()
        .map_init(
            || pool.pull(|| TableHeap::new(graph.num_nodes())),
            |heap, source| {
                let mut weights = vec![INVALID_WEIGHT; num_targets];
                let mut durations = vec![MAX_DURATION; num_targets];
                let mut best: Vec<SearchWeight> = vec![SearchWeight::MAX; num_targets];
                heap.clear();
                if let Some(node) = source.forward_segment {
                    heap.insert(
                        node,
                        -(source.forward_weight as SearchWeight),
                        source.forward_duration,
                    );
                }
                if let Some(node) = source.reverse_segment {
                    if !heap.was_inserted(node) {
                        heap.insert(
                            node,
                            -(source.reverse_weight as SearchWeight),
                            source.reverse_duration,
                        );
                    }
                }
                while let Some(node) = heap.delete_min() {
                    let weight = heap.get_key(node);
                    let duration = *heap.get_data(node);
                    let first = buckets.partition_point(|entry| entry.node < node);
                    for entry in buckets[first..].iter().take_while(|entry| entry.node == node) {
                        let column = entry.column as usize;
                        let path_weight = weight + entry.weight;
                        if path_weight >= 0 && path_weight < best[column] {
                            best[column] = path_weight;
                            weights[column] = path_weight as EdgeWeight;
                            durations[column] = duration + entry.duration;
                        }
                    }
                    relax_upward(graph, heap, node, weight, true);
                }
                (weights, durations)
            },
        )
        .collect();

    let mut weights = Vec::with_capacity(sources.len() * num_targets);
    let mut durations = Vec::with_capacity(sources.len() * num_targets);
    for (row_weights, row_durations) in rows {
        weights.extend(row_weights);
        durations.extend(row_durations);
    }
    DistanceTable {
        num_sources: sources.len(),
        num_targets,
        weights,
        durations,
    }
}

fn relax_upward(
    graph: &ContractedGraph,
    heap: &mut TableHeap,
    node: NodeId,
    weight: SearchWeight,
    forward: bool,
) {
    for edge in graph.edge_range(node) {
        let data = graph.edge_data(edge);
        let traversable = if forward { data.forward } else { data.backward };
        if !traversable {
            continue;
        }
        let to = graph.target(edge);
        let to_weight = weight + data.weight as SearchWeight;
        let to_duration = *heap.get_data(node) + data.duration;
        if !heap.was_inserted(to) {
            heap.insert(to, to_weight, to_duration);
        } else if to_weight < heap.get_key(to) {
            heap.decrease_key(to, to_weight);
            *heap.get_data_mut(to) = to_duration;
        }
    }
}
