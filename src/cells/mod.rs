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

//! Per-cell boundary nodes and clique tables.
//!
//! For every cell at every level the storage keeps the source and
//! destination boundary nodes plus a row-major `|sources| x |destinations|`
//! matrix of shortest-path weights and durations through the cell. All
//! cells of all levels share four flat arrays; per-cell offsets give O(1)
//! access by `(level, cell)`.

pub mod customizer;

use serde::{Deserialize, Serialize};

use crate::graph::{EdgeBasedGraph, Graph};
use crate::partition::MultiLevelPartition;
use crate::types::{
    CellId, EdgeDuration, EdgeWeight, LevelId, NodeId, INVALID_WEIGHT, MAX_DURATION,
};

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
pub struct CellData {
    weight_offset: u32,
    source_boundary_offset: u32,
    destination_boundary_offset: u32,
    num_source_nodes: u32,
    num_destination_nodes: u32,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CellStorage {
    weights: Vec<EdgeWeight>,
    durations: Vec<EdgeDuration>,
    source_boundary: Vec<NodeId>,
    destination_boundary: Vec<NodeId>,
    cells: Vec<CellData>,
    /// Index of the first cell of each level, with a trailing total.
    level_to_cell_offset: Vec<u32>,
}

/// Read-only view of one cell.
#[derive(Clone, Copy, Debug)]
pub struct Cell<'a> {
    data: CellData,
    weights: &'a [EdgeWeight],
    durations: &'a [EdgeDuration],
    source_boundary: &'a [NodeId],
    destination_boundary: &'a [NodeId],
}

impl<'a> Cell<'a> {
    pub fn source_nodes(&self) -> &'a [NodeId] {
        let offset = self.data.source_boundary_offset as usize;
        &self.source_boundary[offset..offset + self.data.num_source_nodes as usize]
    }

    pub fn destination_nodes(&self) -> &'a [NodeId] {
        let offset = self.data.destination_boundary_offset as usize;
        &self.destination_boundary[offset..offset + self.data.num_destination_nodes as usize]
    }

    fn source_index(&self, node: NodeId) -> Option<usize> {
        self.source_nodes().iter().position(|&n| n == node)
    }

    fn destination_index(&self, node: NodeId) -> Option<usize> {
        self.destination_nodes().iter().position(|&n| n == node)
    }

    fn row(&self, source_index: usize) -> (&'a [EdgeWeight], &'a [EdgeDuration]) {
        let width = self.data.num_destination_nodes as usize;
        let begin = self.data.weight_offset as usize + width * source_index;
        (
            &self.weights[begin..begin + width],
            &self.durations[begin..begin + width],
        )
    }

    /// Weight row of a source boundary node; empty if the node is not a
    /// source boundary of this cell.
    pub fn out_weights(&self, node: NodeId) -> &'a [EdgeWeight] {
        match self.source_index(node) {
            Some(index) => self.row(index).0,
            None => &[],
        }
    }

    /// The clique edges leaving `node`: `(destination, weight, duration)`.
    pub fn outgoing(
        &self,
        node: NodeId,
    ) -> impl Iterator<Item = (NodeId, EdgeWeight, EdgeDuration)> + 'a {
        let (weights, durations, destinations) = match self.source_index(node) {
            Some(index) => {
                let (weights, durations) = self.row(index);
                (weights, durations, self.destination_nodes())
            }
            None => (&[][..], &[][..], &[][..]),
        };
        destinations
            .iter()
            .zip(weights.iter().zip(durations.iter()))
            .map(|(&destination, (&weight, &duration))| (destination, weight, duration))
    }

    /// The clique edges entering `node`: `(source, weight, duration)`.
    pub fn incoming(
        &self,
        node: NodeId,
    ) -> impl Iterator<Item = (NodeId, EdgeWeight, EdgeDuration)> + 'a {
        let data = self.data;
        let column = self.destination_index(node);
        let weights = self.weights;
        let durations = self.durations;
        let sources = self.source_nodes();
        (0..column.map_or(0, |_| data.num_source_nodes as usize)).map(move |row| {
            let index = data.weight_offset as usize
                + row * data.num_destination_nodes as usize
                + column.expect("column exists when the iterator is non-empty");
            (sources[row], weights[index], durations[index])
        })
    }
}

/// Writable clique matrix of one cell, handed to the customizer.
#[derive(Debug)]
pub struct CellChunk<'a> {
    pub cell: CellId,
    pub sources: &'a [NodeId],
    pub destinations: &'a [NodeId],
    pub weights: &'a mut [EdgeWeight],
    pub durations: &'a mut [EdgeDuration],
}

/// Read-only view of every level strictly below a split level.
#[derive(Clone, Copy, Debug)]
pub struct CellStorageView<'a> {
    weights: &'a [EdgeWeight],
    durations: &'a [EdgeDuration],
    source_boundary: &'a [NodeId],
    destination_boundary: &'a [NodeId],
    cells: &'a [CellData],
    level_to_cell_offset: &'a [u32],
}

impl<'a> CellStorageView<'a> {
    pub fn cell(&self, level: LevelId, id: CellId) -> Cell<'a> {
        let index = self.level_to_cell_offset[level as usize - 1] as usize + id as usize;
        Cell {
            data: self.cells[index],
            weights: self.weights,
            durations: self.durations,
            source_boundary: self.source_boundary,
            destination_boundary: self.destination_boundary,
        }
    }
}

impl CellStorage {
    /// Enumerates the boundary nodes of every cell at every level and lays
    /// out the (still unfilled) clique tables.
    pub fn new(partition: &MultiLevelPartition, graph: &EdgeBasedGraph) -> Self {
        let num_levels = partition.num_levels();
        let mut level_to_cell_offset = Vec::with_capacity(num_levels as usize + 1);
        let mut number_of_cells = 0u32;
        for level in 1..=num_levels {
            level_to_cell_offset.push(number_of_cells);
            number_of_cells += partition.num_cells(level);
        }
        level_to_cell_offset.push(number_of_cells);
        let mut cells = vec![CellData::default(); number_of_cells as usize];

        let mut source_boundary = Vec::new();
        let mut destination_boundary = Vec::new();
        for level in 1..=num_levels {
            let level_offset = level_to_cell_offset[level as usize - 1];
            let mut level_sources: Vec<(CellId, NodeId)> = Vec::new();
            let mut level_destinations: Vec<(CellId, NodeId)> = Vec::new();
            for node in 0..graph.num_nodes() as NodeId {
                let cell_id = partition.cell(level, node);
                let mut is_boundary = false;
                let mut is_source = false;
                let mut is_destination = false;
                for edge in graph.edge_range(node) {
                    let other = graph.target(edge);
                    let data = graph.edge_data(edge);
                    let same_cell = partition.cell(level, other) == cell_id;
                    is_boundary |= !same_cell;
                    // A source can continue into the cell interior, a
                    // destination is reachable from it.
                    is_source |= same_cell && data.forward;
                    is_destination |= same_cell && data.backward;
                }
                if !is_boundary {
                    continue;
                }
                if is_source {
                    level_sources.push((cell_id, node));
                }
                if is_destination {
                    level_destinations.push((cell_id, node));
                }
            }
            level_sources.sort_unstable();
            level_destinations.sort_unstable();

            for group in chunk_by_cell(&level_sources) {
                let cell = &mut cells[(level_offset + group[0].0) as usize];
                cell.num_source_nodes = group.len() as u32;
                cell.source_boundary_offset = source_boundary.len() as u32;
                source_boundary.extend(group.iter().map(|&(_, node)| node));
            }
            for group in chunk_by_cell(&level_destinations) {
                let cell = &mut cells[(level_offset + group[0].0) as usize];
                cell.num_destination_nodes = group.len() as u32;
                cell.destination_boundary_offset = destination_boundary.len() as u32;
                destination_boundary.extend(group.iter().map(|&(_, node)| node));
            }
        }

        let mut weight_offset = 0u32;
        for cell in &mut cells {
            cell.weight_offset = weight_offset;
            weight_offset += cell.num_source_nodes * cell.num_destination_nodes;
        }

        CellStorage {
            weights: vec![INVALID_WEIGHT; weight_offset as usize],
            durations: vec![MAX_DURATION; weight_offset as usize],
            source_boundary,
            destination_boundary,
            cells,
            level_to_cell_offset,
        }
    }

    pub fn num_levels(&self) -> LevelId {
        self.level_to_cell_offset.len() as LevelId - 1
    }

    pub fn cell(&self, level: LevelId, id: CellId) -> Cell<'_> {
        let index = self.level_to_cell_offset[level as usize - 1] as usize + id as usize;
        Cell {
            data: self.cells[index],
            weights: &self.weights,
            durations: &self.durations,
            source_boundary: &self.source_boundary,
            destination_boundary: &self.destination_boundary,
        }
    }

    /// Splits the storage into a read-only view of all levels below
    /// `level` and one writable chunk per cell of `level`. The split is
    /// what lets the customizer fill a level in parallel while reading the
    /// cliques of the level below.
    pub fn split_level_mut(&mut self, level: LevelId) -> (CellStorageView<'_>, Vec<CellChunk<'_>>) {
        let first_cell = self.level_to_cell_offset[level as usize - 1] as usize;
        let end_cell = self.level_to_cell_offset[level as usize] as usize;
        let weight_split = self.cells[first_cell].weight_offset as usize;

        let (read_weights, mut write_weights) = self.weights.split_at_mut(weight_split);
        let (read_durations, mut write_durations) = self.durations.split_at_mut(weight_split);

        let view = CellStorageView {
            weights: read_weights,
            durations: read_durations,
            source_boundary: &self.source_boundary,
            destination_boundary: &self.destination_boundary,
            cells: &self.cells,
            level_to_cell_offset: &self.level_to_cell_offset,
        };

        let mut chunks = Vec::with_capacity(end_cell - first_cell);
        for (id, data) in self.cells[first_cell..end_cell].iter().enumerate() {
            let size = (data.num_source_nodes * data.num_destination_nodes) as usize;
            let (weights, rest_weights) = std::mem::take(&mut write_weights).split_at_mut(size);
            let (durations, rest_durations) =
                std::mem::take(&mut write_durations).split_at_mut(size);
            write_weights = rest_weights;
            write_durations = rest_durations;
            let source_offset = data.source_boundary_offset as usize;
            let destination_offset = data.destination_boundary_offset as usize;
            chunks.push(CellChunk {
                cell: id as CellId,
                sources: &self.source_boundary
                    [source_offset..source_offset + data.num_source_nodes as usize],
                destinations: &self.destination_boundary
                    [destination_offset..destination_offset + data.num_destination_nodes as usize],
                weights,
                durations,
            });
        }
        (view, chunks)
    }

    pub fn into_parts(
        self,
    ) -> (
        Vec<EdgeWeight>,
        Vec<EdgeDuration>,
        Vec<NodeId>,
        Vec<NodeId>,
        Vec<CellData>,
        Vec<u32>,
    ) {
        (
            self.weights,
            self.durations,
            self.source_boundary,
            self.destination_boundary,
            self.cells,
            self.level_to_cell_offset,
        )
    }

    pub fn from_parts(
        weights: Vec<EdgeWeight>,
        durations: Vec<EdgeDuration>,
        source_boundary: Vec<NodeId>,
        destination_boundary: Vec<NodeId>,
        cells: Vec<CellData>,
        level_to_cell_offset: Vec<u32>,
    ) -> Self {
        CellStorage {
            weights,
            durations,
            source_boundary,
            destination_boundary,
            cells,
            level_to_cell_offset,
        }
    }
}

fn chunk_by_cell(entries: &[(CellId, NodeId)]) -> impl Iterator<Item = &[(CellId, NodeId)]> {
    let mut rest = entries;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let cell = rest[0].0;
        let len = rest.iter().take_while(|&&(c, _)| c == cell).count();
        let (group, tail) = rest.split_at(len);
        rest = tail;
        Some(group)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{directed_edge_pair, EdgeBasedGraph};
    use crate::partition::{bisection_to_partition, MultiLevelPartition};

    /// A one-way 6-cycle split into two 3-node cells: {0, 1, 2} and
    /// {3, 4, 5}.
    fn cycle_fixture() -> (EdgeBasedGraph, MultiLevelPartition) {
        let edges = (0..6)
            .flat_map(|i| directed_edge_pair(i, (i + 1) % 6, 1))
            .collect();
        let graph = EdgeBasedGraph::from_edges(6, edges);
        let ids: Vec<u32> = (0..6).map(|i| (i / 3) << 31).collect();
        let (partitions, num_cells) = bisection_to_partition(&ids, &[3]);
        (graph, MultiLevelPartition::pack(&partitions, &num_cells))
    }

    #[test]
    fn boundary_enumeration_test() {
        let (graph, partition) = cycle_fixture();
        let storage = CellStorage::new(&partition, &graph);
        let left = storage.cell(1, 0);
        // The search enters {0, 1, 2} at node 0 and can traverse the cell
        // from there; node 2 is where the interior path surfaces again.
        assert_eq!(left.source_nodes(), &[0]);
        assert_eq!(left.destination_nodes(), &[2]);
        let right = storage.cell(1, 1);
        assert_eq!(right.source_nodes(), &[3]);
        assert_eq!(right.destination_nodes(), &[5]);
    }

    #[test]
    fn two_way_boundary_test() {
        // The same cycle with both directions open: the nodes adjacent to
        // the two cut edges are sources and destinations at once.
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
        let ids: Vec<u32> = (0..6).map(|i| (i / 3) << 31).collect();
        let (partitions, num_cells) = bisection_to_partition(&ids, &[3]);
        let partition = MultiLevelPartition::pack(&partitions, &num_cells);
        let storage = CellStorage::new(&partition, &graph);
        let left = storage.cell(1, 0);
        assert_eq!(left.source_nodes(), &[0, 2]);
        assert_eq!(left.destination_nodes(), &[0, 2]);
    }

    #[test]
    fn chunk_layout_test() {
        let (graph, partition) = cycle_fixture();
        let mut storage = CellStorage::new(&partition, &graph);
        let (_, chunks) = storage.split_level_mut(1);
        assert_eq!(chunks.len(), 2);
        for chunk in &chunks {
            assert_eq!(
                chunk.weights.len(),
                chunk.sources.len() * chunk.destinations.len()
            );
        }
    }
}
