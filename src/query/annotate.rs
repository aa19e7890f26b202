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

//! Turns an unpacked node sequence into user-facing path steps.

use serde::{Deserialize, Serialize};

use super::{InternalRoute, PhantomNodes, RouteData};
use crate::geometry::GeometryTable;
use crate::graph::Graph;
use crate::types::{EdgeDuration, EdgeWeight, NodeId, PhantomOffsets};

/// Street names and per-segment annotations, loaded from the `.names`
/// artifact.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct NameTable {
    names: Vec<String>,
    node_name_ids: Vec<u32>,
    travel_modes: Vec<u8>,
}

impl NameTable {
    pub fn new(names: Vec<String>, node_name_ids: Vec<u32>, travel_modes: Vec<u8>) -> Self {
        NameTable {
            names,
            node_name_ids,
            travel_modes,
        }
    }

    /// A table without any names, for graphs built from bare edge lists.
    pub fn unnamed(num_nodes: usize) -> Self {
        NameTable {
            names: vec![String::new()],
            node_name_ids: vec![0; num_nodes],
            travel_modes: vec![0; num_nodes],
        }
    }

    pub fn name_id(&self, node: NodeId) -> u32 {
        self.node_name_ids.get(node as usize).copied().unwrap_or(0)
    }

    pub fn travel_mode(&self, node: NodeId) -> u8 {
        self.travel_modes.get(node as usize).copied().unwrap_or(0)
    }

    pub fn name(&self, name_id: u32) -> &str {
        self.names.get(name_id as usize).map_or("", String::as_str)
    }
}

/// One traversed road segment with its annotation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathStep {
    pub node: NodeId,
    pub name_id: u32,
    pub weight: EdgeWeight,
    pub duration: EdgeDuration,
    pub turn_instruction: u8,
    pub travel_mode: u8,
    pub datasource: u8,
    pub pre_turn_bearing: u16,
    pub post_turn_bearing: u16,
}

/// A fully annotated route.
#[derive(Clone, Debug, Default)]
pub struct Route {
    pub weight: EdgeWeight,
    pub duration: EdgeDuration,
    pub steps: Vec<PathStep>,
    pub nodes: Vec<NodeId>,
}

impl Route {
    pub(crate) fn append(&mut self, leg: Route) {
        self.weight += leg.weight;
        self.duration += leg.duration;
        self.steps.extend(leg.steps);
        self.nodes.extend(leg.nodes);
    }
}

/// Annotates one leg. The first step is reduced by the portion of the
/// source segment that lies before the phantom point; negative results
/// clamp to zero.
pub fn annotate_leg(data: &RouteData, phantoms: &PhantomNodes, leg: &InternalRoute) -> Route {
    let mut steps = Vec::with_capacity(leg.nodes.len());
    for (index, &node) in leg.nodes.iter().enumerate() {
        let next = leg.nodes.get(index + 1);
        let (weight, duration, turn_id) = match leg.edges.get(index) {
            Some(&edge) => {
                let edge_data = data.graph.edge_data(edge);
                (edge_data.weight, edge_data.duration, edge_data.turn_id)
            }
            // The final segment is only traversed up to the target
            // phantom.
            None => {
                let (weight, duration) = target_portion(&phantoms.target, node);
                (weight, duration, u32::MAX)
            }
        };
        let turn_instruction = data
            .turn_instructions
            .get(turn_id as usize)
            .copied()
            .unwrap_or(0);
        let datasource = data
            .geometry
            .forward(node)
            .next()
            .map_or(0, |point| point.datasource);
        steps.push(PathStep {
            node,
            name_id: data.names.name_id(node),
            weight,
            duration,
            turn_instruction,
            travel_mode: data.names.travel_mode(node),
            datasource,
            pre_turn_bearing: data.geometry.exit_bearing(node),
            post_turn_bearing: next.map_or(0, |&n| data.geometry.entry_bearing(n)),
        });
    }

    if let Some(first) = steps.first_mut() {
        let (weight, duration) = source_portion(&phantoms.source, first.node);
        first.weight = first.weight.saturating_sub(weight);
        first.duration = first.duration.saturating_sub(duration);
    }

    Route {
        weight: leg.weight,
        duration: steps.iter().map(|step| step.duration).sum(),
        steps,
        nodes: leg.nodes.clone(),
    }
}

fn source_portion(
    phantom: &super::PhantomNode,
    node: NodeId,
) -> (EdgeWeight, EdgeDuration) {
    if phantom.forward_segment == Some(node) {
        (phantom.forward_weight, phantom.forward_duration)
    } else if phantom.reverse_segment == Some(node) {
        (phantom.reverse_weight, phantom.reverse_duration)
    } else {
        (0, 0)
    }
}

fn target_portion(
    phantom: &super::PhantomNode,
    node: NodeId,
) -> (EdgeWeight, EdgeDuration) {
    if phantom.forward_segment == Some(node) {
        (phantom.forward_weight, phantom.forward_duration)
    } else if phantom.reverse_segment == Some(node) {
        (phantom.reverse_weight, phantom.reverse_duration)
    } else {
        (0, 0)
    }
}

/// Builds a phantom snapped to the polyline point `point_index` of a
/// directed segment and (optionally) its opposite twin. The forward
/// offsets accumulate the forward piece costs before the point; the
/// reverse offsets accumulate the reverse piece costs behind it.
pub fn phantom_offsets(
    geometry: &GeometryTable,
    segment: NodeId,
    point_index: usize,
) -> PhantomOffsets {
    let mut offsets = PhantomOffsets::default();
    let num_points = geometry.forward(segment).count();
    for (index, point) in geometry.forward(segment).enumerate() {
        if index <= point_index {
            offsets.forward_weight += point.weight;
            offsets.forward_duration += point.duration;
        }
    }
    // The reverse iterator walks from the segment end backwards; pieces
    // behind the snapped point are the ones already traversed on the
    // opposite segment.
    for (index, point) in geometry.reverse(segment).enumerate() {
        if num_points - 1 - index > point_index {
            offsets.reverse_weight += point.weight;
            offsets.reverse_duration += point.duration;
        }
    }
    offsets
}
