//! Per-segment polyline geometry.
//!
//! Every node of the edge-based graph is a directed road segment with a
//! polyline decomposition. Forward and reverse traversals are stored
//! separately because their weights may differ (grades, one-way ramps with
//! penalties). Entry `i` of a weight array is the cost of the piece ending
//! at point `i`; entry 0 is always zero.

use serde::{Deserialize, Serialize};

use crate::types::{Coordinate, EdgeDuration, EdgeWeight, NodeId};

/// One point of a traversed polyline with the cost of the piece that ends
/// there.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GeometryPoint {
    pub node: NodeId,
    pub coordinate: Coordinate,
    pub weight: EdgeWeight,
    pub duration: EdgeDuration,
    pub datasource: u8,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct GeometryTable {
    /// Range of segment `i` in the flat arrays: `index[i]..index[i + 1]`.
    index: Vec<u32>,
    nodes: Vec<NodeId>,
    coordinates: Vec<Coordinate>,
    forward_weights: Vec<EdgeWeight>,
    reverse_weights: Vec<EdgeWeight>,
    forward_durations: Vec<EdgeDuration>,
    reverse_durations: Vec<EdgeDuration>,
    forward_datasources: Vec<u8>,
    reverse_datasources: Vec<u8>,
}

impl GeometryTable {
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        index: Vec<u32>,
        nodes: Vec<NodeId>,
        coordinates: Vec<Coordinate>,
        forward_weights: Vec<EdgeWeight>,
        reverse_weights: Vec<EdgeWeight>,
        forward_durations: Vec<EdgeDuration>,
        reverse_durations: Vec<EdgeDuration>,
        forward_datasources: Vec<u8>,
        reverse_datasources: Vec<u8>,
    ) -> Self {
        GeometryTable {
            index,
            nodes,
            coordinates,
            forward_weights,
            reverse_weights,
            forward_durations,
            reverse_durations,
            forward_datasources,
            reverse_datasources,
        }
    }

    /// Builds a table from one polyline per segment. Each entry of
    /// `segments` lists `(node, coordinate, forward piece cost, reverse
    /// piece cost)` tuples; piece costs are `(weight, duration)`.
    pub fn from_polylines(
        segments: Vec<Vec<(NodeId, Coordinate, (EdgeWeight, EdgeDuration), (EdgeWeight, EdgeDuration))>>,
    ) -> Self {
        let mut table = GeometryTable::default();
        table.index.push(0);
        for polyline in segments {
            for (node, coordinate, forward, reverse) in polyline {
                table.nodes.push(node);
                table.coordinates.push(coordinate);
                table.forward_weights.push(forward.0);
                table.forward_durations.push(forward.1);
                table.reverse_weights.push(reverse.0);
                table.reverse_durations.push(reverse.1);
                table.forward_datasources.push(0);
                table.reverse_datasources.push(0);
            }
            table.index.push(table.nodes.len() as u32);
        }
        table
    }

    pub fn num_segments(&self) -> usize {
        self.index.len().saturating_sub(1)
    }

    fn range(&self, segment: NodeId) -> std::ops::Range<usize> {
        self.index[segment as usize] as usize..self.index[segment as usize + 1] as usize
    }

    /// The polyline of a segment in traversal order.
    pub fn forward(&self, segment: NodeId) -> impl Iterator<Item = GeometryPoint> + '_ {
        self.range(segment).map(move |i| GeometryPoint {
            node: self.nodes[i],
            coordinate: self.coordinates[i],
            weight: self.forward_weights[i],
            duration: self.forward_durations[i],
            datasource: self.forward_datasources[i],
        })
    }

    /// The polyline of a segment traversed against its direction.
    pub fn reverse(&self, segment: NodeId) -> impl Iterator<Item = GeometryPoint> + '_ {
        self.range(segment).rev().map(move |i| GeometryPoint {
            node: self.nodes[i],
            coordinate: self.coordinates[i],
            weight: self.reverse_weights[i],
            duration: self.reverse_durations[i],
            datasource: self.reverse_datasources[i],
        })
    }

    /// Total forward weight and duration of a segment.
    pub fn forward_cost(&self, segment: NodeId) -> (EdgeWeight, EdgeDuration) {
        self.forward(segment).fold((0, 0), |acc, point| {
            (acc.0 + point.weight, acc.1 + point.duration)
        })
    }

    /// First coordinate of a segment, used as the node's location by the
    /// bisection.
    pub fn representative_coordinate(&self, segment: NodeId) -> Coordinate {
        let range = self.range(segment);
        if range.is_empty() {
            Coordinate::default()
        } else {
            self.coordinates[range.start]
        }
    }

    /// Bearing when entering the segment.
    pub fn entry_bearing(&self, segment: NodeId) -> u16 {
        let range = self.range(segment);
        if range.len() < 2 {
            return 0;
        }
        self.coordinates[range.start].bearing_to(&self.coordinates[range.start + 1])
    }

    /// Bearing when leaving the segment.
    pub fn exit_bearing(&self, segment: NodeId) -> u16 {
        let range = self.range(segment);
        if range.len() < 2 {
            return 0;
        }
        self.coordinates[range.end - 2].bearing_to(&self.coordinates[range.end - 1])
    }

    #[allow(clippy::type_complexity)]
    pub fn into_parts(
        self,
    ) -> (
        Vec<u32>,
        Vec<NodeId>,
        Vec<Coordinate>,
        Vec<EdgeWeight>,
        Vec<EdgeWeight>,
        Vec<EdgeDuration>,
        Vec<EdgeDuration>,
        Vec<u8>,
        Vec<u8>,
    ) {
        (
            self.index,
            self.nodes,
            self.coordinates,
            self.forward_weights,
            self.reverse_weights,
            self.forward_durations,
            self.reverse_durations,
            self.forward_datasources,
            self.reverse_datasources,
        )
    }
}
