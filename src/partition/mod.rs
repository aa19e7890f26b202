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

//! The multi-level cell partition.
//!
//! A recursive bisection assigns every node a bisection id whose bits
//! record the sequence of cuts (see [bisection]). [bisection_to_partition]
//! groups bit prefixes of those ids into levels, and
//! [MultiLevelPartition] packs the per-level cell ids of a node into a
//! single 64-bit integer, sliced by a per-level offset table.

pub mod bisection;
pub mod inertial_flow;

use serde::{Deserialize, Serialize};

use crate::types::{CellId, LevelId, NodeId};

/// Bit layout of one level inside the packed partition ids.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct LevelInfo {
    pub offset: u8,
    pub bits: u8,
    pub num_cells: u32,
}

/// Per-node cell ids for all levels, packed into one `u64` per node.
///
/// Level `l`'s cell id occupies the bit range
/// `[offset(l), offset(l) + bits(l))`; finer levels sit in lower bits.
/// Because cells are strictly nested, two nodes that share a cell at some
/// level agree on all bits from that level's offset upward, which makes
/// [highest_different_level](Self::highest_different_level) a single XOR
/// plus a leading-zero count.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MultiLevelPartition {
    partition: Vec<u64>,
    levels: Vec<LevelInfo>,
    /// For every level `l >= 2`, the first child cell id (at level `l - 1`)
    /// of each cell, with one trailing sentinel entry.
    children: Vec<Vec<CellId>>,
}

impl MultiLevelPartition {
    /// Packs per-level dense cell ids. `partitions[l - 1]` holds the cell id
    /// of every node at level `l`; levels are ordered finest first.
    pub fn pack(partitions: &[Vec<CellId>], num_cells: &[u32]) -> Self {
        assert_eq!(partitions.len(), num_cells.len());
        let num_nodes = partitions.first().map_or(0, Vec::len);

        let mut levels = Vec::with_capacity(partitions.len());
        let mut offset = 0u8;
        for &cells in num_cells {
            let bits = if cells > 1 {
                (32 - (cells - 1).leading_zeros()) as u8
            } else {
                0
            };
            levels.push(LevelInfo {
                offset,
                bits,
                num_cells: cells,
            });
            offset += bits;
        }
        assert!(offset <= 64, "partition does not fit into 64 bits");

        let mut partition = vec![0u64; num_nodes];
        for (cells, info) in partitions.iter().zip(levels.iter()) {
            for (node, &cell) in cells.iter().enumerate() {
                debug_assert!(cell < info.num_cells);
                partition[node] |= (cell as u64) << info.offset;
            }
        }

        let children = build_children(partitions, num_cells);
        MultiLevelPartition {
            partition,
            levels,
            children,
        }
    }

    pub fn from_parts(
        partition: Vec<u64>,
        levels: Vec<LevelInfo>,
        children: Vec<Vec<CellId>>,
    ) -> Self {
        MultiLevelPartition {
            partition,
            levels,
            children,
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.partition.len()
    }

    /// The number of partition levels. Valid levels are `1..=num_levels()`;
    /// level 0 refers to the base graph.
    pub fn num_levels(&self) -> LevelId {
        self.levels.len() as LevelId
    }

    pub fn num_cells(&self, level: LevelId) -> u32 {
        self.levels[level as usize - 1].num_cells
    }

    pub fn levels(&self) -> &[LevelInfo] {
        &self.levels
    }

    pub fn partition_ids(&self) -> &[u64] {
        &self.partition
    }

    pub fn children_map(&self) -> &[Vec<CellId>] {
        &self.children
    }

    /// The cell containing `node` at `level`.
    pub fn cell(&self, level: LevelId, node: NodeId) -> CellId {
        let info = &self.levels[level as usize - 1];
        let mask = if info.bits == 64 {
            u64::MAX
        } else {
            (1u64 << info.bits) - 1
        };
        ((self.partition[node as usize] >> info.offset) & mask) as CellId
    }

    /// The coarsest level at which `u` and `v` lie in different cells, or 0
    /// if they share the finest cell.
    pub fn highest_different_level(&self, u: NodeId, v: NodeId) -> LevelId {
        let diff = self.partition[u as usize] ^ self.partition[v as usize];
        if diff == 0 {
            return 0;
        }
        let msb = 63 - diff.leading_zeros() as u8;
        for (index, info) in self.levels.iter().enumerate().rev() {
            if msb >= info.offset {
                return index as LevelId + 1;
            }
        }
        0
    }

    /// The highest level usable at `node` during a query between `source`
    /// and `target`: the coarsest level at which `node`'s cell contains
    /// neither endpoint.
    pub fn query_level(&self, source: NodeId, target: NodeId, node: NodeId) -> LevelId {
        self.highest_different_level(source, node)
            .min(self.highest_different_level(target, node))
    }

    /// The child cells (at `level - 1`) of a cell at `level >= 2`.
    pub fn children(&self, level: LevelId, cell: CellId) -> std::ops::Range<CellId> {
        let map = &self.children[level as usize - 2];
        map[cell as usize]..map[cell as usize + 1]
    }
}

fn build_children(partitions: &[Vec<CellId>], num_cells: &[u32]) -> Vec<Vec<CellId>> {
    let mut children = Vec::new();
    for level in 1..partitions.len() {
        let fine = &partitions[level - 1];
        let coarse = &partitions[level];
        let mut parent = vec![0; num_cells[level - 1] as usize];
        for node in 0..fine.len() {
            parent[fine[node] as usize] = coarse[node];
        }
        let mut offsets = vec![0; num_cells[level] as usize + 1];
        for (child, &cell) in parent.iter().enumerate() {
            // Child ids within a parent are contiguous by construction, so
            // recording the first suffices.
            let slot = &mut offsets[cell as usize + 1];
            *slot = (*slot).max(child as CellId + 1);
        }
        for i in 1..offsets.len() {
            offsets[i] = offsets[i].max(offsets[i - 1]);
        }
        children.push(offsets);
    }
    children
}

/// Groups the bit prefixes of the bisection ids into levels.
///
/// For every entry of `max_cell_sizes` (finest first) the shortest prefix
/// whose groups all stay below the size cap becomes one level. A final
/// level with a single cell covering the whole graph is always appended.
/// Returns the per-level dense cell ids and the per-level cell counts.
pub fn bisection_to_partition(
    bisection_ids: &[u32],
    max_cell_sizes: &[usize],
) -> (Vec<Vec<CellId>>, Vec<u32>) {
    let num_nodes = bisection_ids.len();
    let mut order: Vec<u32> = (0..num_nodes as u32).collect();
    order.sort_unstable_by_key(|&node| bisection_ids[node as usize]);

    let prefix = |id: u32, depth: u32| -> u32 {
        if depth == 0 {
            0
        } else {
            id >> (32 - depth)
        }
    };
    let max_group_size = |depth: u32| -> usize {
        let mut max = 0;
        let mut current = 0;
        let mut last = None;
        for &node in &order {
            let key = prefix(bisection_ids[node as usize], depth);
            if last == Some(key) {
                current += 1;
            } else {
                last = Some(key);
                current = 1;
            }
            max = max.max(current);
        }
        max
    };

    let mut partitions = Vec::new();
    let mut num_cells = Vec::new();
    let mut previous_depth = 32;
    for &max_size in max_cell_sizes {
        let mut depth = (0..=previous_depth)
            .find(|&d| max_group_size(d) <= max_size)
            .unwrap_or(previous_depth);
        depth = depth.min(previous_depth);
        previous_depth = depth;

        let mut cells = vec![0 as CellId; num_nodes];
        let mut next_cell = 0;
        let mut last = None;
        for &node in &order {
            let key = prefix(bisection_ids[node as usize], depth);
            if last != Some(key) {
                if last.is_some() {
                    next_cell += 1;
                }
                last = Some(key);
            }
            cells[node as usize] = next_cell;
        }
        partitions.push(cells);
        num_cells.push(next_cell + 1);
    }

    // The coarsest level always holds a single cell spanning the graph.
    partitions.push(vec![0; num_nodes]);
    num_cells.push(1);

    (partitions, num_cells)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_partition() -> MultiLevelPartition {
        // Eight nodes, bisected three times.
        let ids: Vec<u32> = (0..8).map(|i| i << 29).collect();
        let (partitions, num_cells) = bisection_to_partition(&ids, &[2, 4]);
        MultiLevelPartition::pack(&partitions, &num_cells)
    }

    #[test]
    fn bisection_to_partition_test() {
        let ids: Vec<u32> = (0..8).map(|i| i << 29).collect();
        let (partitions, num_cells) = bisection_to_partition(&ids, &[2, 4]);
        assert_eq!(num_cells, vec![4, 2, 1]);
        assert_eq!(partitions[0], vec![0, 0, 1, 1, 2, 2, 3, 3]);
        assert_eq!(partitions[1], vec![0, 0, 0, 0, 1, 1, 1, 1]);
        assert_eq!(partitions[2], vec![0; 8]);
    }

    #[test]
    fn cell_lookup_test() {
        let mlp = small_partition();
        assert_eq!(mlp.num_levels(), 3);
        assert_eq!(mlp.num_cells(1), 4);
        assert_eq!(mlp.num_cells(2), 2);
        assert_eq!(mlp.num_cells(3), 1);
        assert_eq!(mlp.cell(1, 0), 0);
        assert_eq!(mlp.cell(1, 5), 2);
        assert_eq!(mlp.cell(2, 5), 1);
        assert_eq!(mlp.cell(3, 5), 0);
    }

    #[test]
    fn nesting_invariant_test() {
        let mlp = small_partition();
        for level in 2..=mlp.num_levels() {
            for u in 0..8 {
                for v in 0..8 {
                    if mlp.cell(level - 1, u) == mlp.cell(level - 1, v) {
                        assert_eq!(mlp.cell(level, u), mlp.cell(level, v));
                    }
                }
            }
        }
    }

    #[test]
    fn highest_different_level_test() {
        let mlp = small_partition();
        assert_eq!(mlp.highest_different_level(0, 0), 0);
        assert_eq!(mlp.highest_different_level(0, 1), 0);
        assert_eq!(mlp.highest_different_level(0, 2), 1);
        assert_eq!(mlp.highest_different_level(0, 4), 2);
        // Node 4 shares the level-2 cell with node 7, so level 1 wins.
        assert_eq!(mlp.query_level(0, 7, 4), 1);
        assert_eq!(mlp.query_level(0, 7, 1), 0);
        assert_eq!(mlp.query_level(0, 7, 2), 1);
    }

    #[test]
    fn children_test() {
        let mlp = small_partition();
        assert_eq!(mlp.children(2, 0), 0..2);
        assert_eq!(mlp.children(2, 1), 2..4);
        assert_eq!(mlp.children(3, 0), 0..2);
    }
}
