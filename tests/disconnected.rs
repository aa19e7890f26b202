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

//! Queries across disconnected components are impossible, not merely
//! unrouted.
use std::sync::Arc;

use byway::contractor::{ContractionConfig, GraphContractor};
use byway::geometry::GeometryTable;
use byway::graph::{directed_edge_pair, EdgeBasedGraph};
use byway::query::{ChOverlay, Engine, NameTable, PhantomNode, RouteData};
use byway::types::Coordinate;
use byway::EngineError;

/// Two separate two-way node pairs: {0, 1} and {2, 3}.
fn islands() -> EdgeBasedGraph {
    let mut edges = Vec::new();
    for (a, b) in [(0, 1), (2, 3)] {
        edges.extend(directed_edge_pair(a, b, 5));
        edges.extend(directed_edge_pair(b, a, 5));
    }
    EdgeBasedGraph::from_edges(4, edges)
}

fn engine() -> Engine {
    let graph = islands();
    let result = GraphContractor::new(&graph, ContractionConfig::default()).run();
    let geometry = GeometryTable::from_polylines(
        (0..4)
            .map(|n| vec![(n, Coordinate::new(n as i32, 0), (0, 0), (0, 0))])
            .collect(),
    );
    Engine::new(Arc::new(RouteData {
        geometry,
        names: NameTable::unnamed(4),
        turn_instructions: Vec::new(),
        ch: Some(ChOverlay {
            graph: result.graph,
            core: None,
        }),
        mld: None,
        graph,
    }))
}

#[test]
fn impossible_across_components_test() {
    let engine = engine();
    let error = engine
        .route(&[PhantomNode::at_node(0), PhantomNode::at_node(2)])
        .unwrap_err();
    assert_eq!(error, EngineError::Impossible);
}

#[test]
fn finite_within_component_test() {
    let engine = engine();
    let route = engine
        .route(&[PhantomNode::at_node(0), PhantomNode::at_node(1)])
        .unwrap();
    assert_eq!(route.weight, 5);
    let route = engine
        .route(&[PhantomNode::at_node(2), PhantomNode::at_node(3)])
        .unwrap();
    assert_eq!(route.weight, 5);
}
