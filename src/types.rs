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

//! Identifier and weight types shared by every component.

use serde::{Deserialize, Serialize};

/// Identifier of a node in the edge-based graph (a directed road segment).
pub type NodeId = u32;
/// Identifier of an edge in the edge-based graph (a turn between two segments).
pub type EdgeId = u32;
/// Identifier of a partition cell within one level.
pub type CellId = u32;
/// Identifier of a partition level. Level 0 is the base graph, level 1 the
/// finest cell level.
pub type LevelId = u8;

/// Edge weight in an arbitrary cost unit.
pub type EdgeWeight = u32;
/// Edge duration in deciseconds.
pub type EdgeDuration = u32;

pub const INVALID_NODE: NodeId = NodeId::MAX;
pub const INVALID_EDGE: EdgeId = EdgeId::MAX;
pub const INVALID_CELL: CellId = CellId::MAX;
pub const INVALID_LEVEL: LevelId = LevelId::MAX;
/// Marks an unreachable entry in a weight table.
pub const INVALID_WEIGHT: EdgeWeight = EdgeWeight::MAX;
pub const MAX_DURATION: EdgeDuration = EdgeDuration::MAX;

/// Key type used by the query-time searches.
///
/// Stored weights are unsigned, but the heaps of a point-to-point query are
/// seeded with negated phantom-node offsets, so the search works on a wider
/// signed type and converts back once a route has been found.
pub type SearchWeight = i64;

/// Sentinel for an unreachable search key.
pub const INVALID_SEARCH_WEIGHT: SearchWeight = SearchWeight::MAX;

/// Accumulated segment portions at a snapped phantom point: how much of
/// the forward segment lies before the point, and how much of the
/// opposite traversal lies behind it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PhantomOffsets {
    pub forward_weight: EdgeWeight,
    pub forward_duration: EdgeDuration,
    pub reverse_weight: EdgeWeight,
    pub reverse_duration: EdgeDuration,
}

/// A map coordinate in fixed-point representation (degrees times 10^6).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Coordinate {
    pub lon: i32,
    pub lat: i32,
}

impl Coordinate {
    pub fn new(lon: i32, lat: i32) -> Self {
        Coordinate { lon, lat }
    }

    /// Compass bearing from `self` to `other` in degrees, 0 = north.
    pub fn bearing_to(&self, other: &Coordinate) -> u16 {
        let dx = (other.lon - self.lon) as f64;
        let dy = (other.lat - self.lat) as f64;
        if dx == 0.0 && dy == 0.0 {
            return 0;
        }
        let degrees = dx.atan2(dy).to_degrees();
        let degrees = if degrees < 0.0 { degrees + 360.0 } else { degrees };
        (degrees.round() as u32 % 360) as u16
    }
}
