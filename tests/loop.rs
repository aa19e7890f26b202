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

//! Loop forcing: source and target on the same segment with the source
//! ahead of the target must route around the block.
use std::sync::Arc;

use byway::cells::customizer::CellCustomizer;
use byway::cells::CellStorage;
use byway::contractor::{ContractionConfig, GraphContractor};
use byway::geometry::GeometryTable;
use byway::graph::{directed_edge_pair, EdgeBasedGraph, MultiLevelGraph};
use byway::partition::{bisection_to_partition, MultiLevelPartition};
use byway::query::{ChOverlay, Engine, MldOverlay, NameTable, PhantomNode, RouteData};
use byway::types::Coordinate;
use byway::Graph;

const SEGMENT_LENGTH: u32 = 10;

/// A one-way city block: four segments of length 10 forming a loop.
fn block() -> EdgeBasedGraph {
    let edges = (0..4)
        .flat_map(|i| directed_edge_pair(i, (i + 1) % 4, SEGMENT_LENGTH))
        .collect();
    EdgeBasedGraph::from_edges(4, edges)
}

fn geometry() -> GeometryTable {
    GeometryTable::from_polylines(
        (0..4)
            .map(|n| vec![(n, Coordinate::new(n as i32 * 100, 0), (0, 0), (0, 0))])
            .collect(),
    )
}

fn route_data(graph: EdgeBasedGraph) -> RouteData {
    let num_nodes = graph.num_nodes();
    RouteData {
        geometry: geometry(),
        names: NameTable::unnamed(num_nodes),
        turn_instructions: Vec::new(),
        ch: None,
        mld: None,
        graph,
    }
}

fn same_segment_phantoms() -> [PhantomNode; 2] {
    // Source at 6/10 of segment 0, target at 2/10 of the same segment.
    let source = PhantomNode {
        forward_segment: Some(0),
        reverse_segment: None,
        forward_weight: 6,
        forward_duration: 60,
        ..Default::default()
    };
    let target = PhantomNode {
        forward_segment: Some(0),
        reverse_segment: None,
        forward_weight: 2,
        forward_duration: 20,
        ..Default::default()
    };
    [source, target]
}

fn assert_loop_forced(engine: &Engine) {
    let route = engine.route(&same_segment_phantoms()).unwrap();
    // Remainder of segment 0 (4), the three other block sides (30), plus
    // the target portion (2): strictly longer than twice the segment.
    assert_eq!(route.weight, 36);
    assert!(route.weight > 2 * SEGMENT_LENGTH);
    assert_eq!(route.nodes.first(), Some(&0));
    assert_eq!(route.nodes.last(), Some(&0));
    assert!(route.nodes.len() >= 5, "route must travel around the block");
}

#[test]
fn ch_loop_test() {
    let graph = block();
    let result = GraphContractor::new(&graph, ContractionConfig::default()).run();
    let mut data = route_data(graph);
    data.ch = Some(ChOverlay {
        graph: result.graph,
        core: None,
    });
    assert_loop_forced(&Engine::new(Arc::new(data)));
}

#[test]
fn mld_loop_test() {
    let graph = block();
    let ids: Vec<u32> = (0..4).map(|i| i << 30).collect();
    let (partitions, num_cells) = bisection_to_partition(&ids, &[2]);
    let partition = MultiLevelPartition::pack(&partitions, &num_cells);
    let mld_graph = MultiLevelGraph::new(&graph, &partition);
    let mut cells = CellStorage::new(&partition, &graph);
    CellCustomizer::new(&partition).customize(&mld_graph, &mut cells);
    let mut data = route_data(graph);
    data.mld = Some(MldOverlay {
        partition,
        cells,
        graph: mld_graph,
    });
    assert_loop_forced(&Engine::new(Arc::new(data)));
}

#[test]
fn no_loop_when_source_behind_target_test() {
    // Source at 2/10, target at 6/10: the direct continuation along the
    // segment wins and weighs exactly the distance between the points.
    let graph = block();
    let result = GraphContractor::new(&graph, ContractionConfig::default()).run();
    let mut data = route_data(graph);
    data.ch = Some(ChOverlay {
        graph: result.graph,
        core: None,
    });
    let engine = Engine::new(Arc::new(data));
    let [mut source, mut target] = same_segment_phantoms();
    std::mem::swap(&mut source, &mut target);
    let route = engine.route(&[source, target]).unwrap();
    assert_eq!(route.weight, 4);
    assert_eq!(route.nodes, vec![0]);
}
