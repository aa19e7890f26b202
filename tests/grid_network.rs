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

//! All-pairs comparison of the preprocessed algorithms against plain
//! Dijkstra on a 4x4 grid with uneven weights.
use std::sync::Arc;

use byway::cells::customizer::CellCustomizer;
use byway::cells::CellStorage;
use byway::contractor::{ContractionConfig, GraphContractor};
use byway::geometry::GeometryTable;
use byway::graph::{directed_edge_pair, EdgeBasedGraph, InputEdge, MultiLevelGraph};
use byway::partition::{bisection_to_partition, MultiLevelPartition};
use byway::query::dijkstra;
use byway::query::{ChOverlay, Engine, MldOverlay, NameTable, PhantomNode, RouteData};
use byway::types::{CellId, Coordinate, EdgeWeight, LevelId, NodeId, INVALID_WEIGHT};
use byway::Graph;
use hashbrown::HashMap;

const WIDTH: u32 = 4;

fn node(x: u32, y: u32) -> NodeId {
    y * WIDTH + x
}

/// Two-way streets with direction-dependent, position-dependent weights.
fn grid_edges() -> Vec<InputEdge> {
    let mut edges = Vec::new();
    let weight = |a: NodeId, b: NodeId| 1 + (a * 7 + b * 13) % 5;
    for y in 0..WIDTH {
        for x in 0..WIDTH {
            let here = node(x, y);
            if x + 1 < WIDTH {
                let right = node(x + 1, y);
                edges.extend(directed_edge_pair(here, right, weight(here, right)));
                edges.extend(directed_edge_pair(right, here, weight(right, here)));
            }
            if y + 1 < WIDTH {
                let down = node(x, y + 1);
                edges.extend(directed_edge_pair(here, down, weight(here, down)));
                edges.extend(directed_edge_pair(down, here, weight(down, here)));
            }
        }
    }
    edges
}

fn grid_graph() -> EdgeBasedGraph {
    EdgeBasedGraph::from_edges((WIDTH * WIDTH) as usize, grid_edges())
}

/// Quadrant-nested bisection ids: one bit per halving, row-major.
fn grid_partition() -> MultiLevelPartition {
    let ids: Vec<u32> = (0..WIDTH * WIDTH)
        .map(|n| {
            let (x, y) = (n % WIDTH, n / WIDTH);
            let mut id = 0u32;
            id |= (y / 2) << 31;
            id |= (x / 2) << 30;
            id |= (y % 2) << 29;
            id |= (x % 2) << 28;
            id
        })
        .collect();
    let (partitions, num_cells) = bisection_to_partition(&ids, &[4, 8]);
    MultiLevelPartition::pack(&partitions, &num_cells)
}

fn point_geometry(num_nodes: u32) -> GeometryTable {
    GeometryTable::from_polylines(
        (0..num_nodes)
            .map(|n| {
                vec![(
                    n,
                    Coordinate::new((n % WIDTH) as i32 * 100, (n / WIDTH) as i32 * 100),
                    (0, 0),
                    (0, 0),
                )]
            })
            .collect(),
    )
}

fn route_data(graph: EdgeBasedGraph) -> RouteData {
    let num_nodes = graph.num_nodes() as u32;
    RouteData {
        geometry: point_geometry(num_nodes),
        names: NameTable::unnamed(num_nodes as usize),
        turn_instructions: Vec::new(),
        ch: None,
        mld: None,
        graph,
    }
}

fn ch_engine() -> Engine {
    let graph = grid_graph();
    let result = GraphContractor::new(&graph, ContractionConfig::default()).run();
    let mut data = route_data(graph);
    data.ch = Some(ChOverlay {
        graph: result.graph,
        core: None,
    });
    Engine::new(Arc::new(data))
}

fn mld_engine() -> Engine {
    let graph = grid_graph();
    let partition = grid_partition();
    let mld_graph = MultiLevelGraph::new(&graph, &partition);
    let mut cells = CellStorage::new(&partition, &graph);
    CellCustomizer::new(&partition).customize(&mld_graph, &mut cells);
    let mut data = route_data(graph);
    data.mld = Some(MldOverlay {
        partition,
        cells,
        graph: mld_graph,
    });
    Engine::new(Arc::new(data))
}

fn all_pairs_match(engine: &Engine) {
    let oracle_graph = grid_graph();
    for source in 0..WIDTH * WIDTH {
        for target in 0..WIDTH * WIDTH {
            if source == target {
                continue;
            }
            let expected =
                dijkstra::shortest_path(&oracle_graph, source, target).expect("grid is connected");
            let route = engine
                .route(&[PhantomNode::at_node(source), PhantomNode::at_node(target)])
                .unwrap_or_else(|e| panic!("{} -> {}: {}", source, target, e));
            assert_eq!(route.weight, expected.0, "{} -> {}", source, target);
            // The unpacked path must itself be a valid path of that weight.
            let mut sum = 0;
            for pair in route.nodes.windows(2) {
                let edge = oracle_graph
                    .find_smallest_edge(pair[0], pair[1], |data| data.forward)
                    .unwrap_or_else(|| panic!("missing edge {} -> {}", pair[0], pair[1]));
                sum += oracle_graph.edge_data(edge).weight;
            }
            assert_eq!(sum, expected.0, "{} -> {}", source, target);
        }
    }
}

#[test]
fn ch_matches_dijkstra_test() {
    all_pairs_match(&ch_engine());
}

#[test]
fn mld_matches_dijkstra_test() {
    all_pairs_match(&mld_engine());
}

/// Shortest path restricted to the nodes of one cell.
fn restricted_shortest_path(
    graph: &EdgeBasedGraph,
    partition: &MultiLevelPartition,
    level: LevelId,
    cell: CellId,
    source: NodeId,
    target: NodeId,
) -> Option<EdgeWeight> {
    let mut best: HashMap<NodeId, EdgeWeight> = HashMap::new();
    let mut queue = std::collections::BinaryHeap::new();
    best.insert(source, 0);
    queue.push(std::cmp::Reverse((0u32, source)));
    while let Some(std::cmp::Reverse((weight, node))) = queue.pop() {
        if best.get(&node) != Some(&weight) {
            continue;
        }
        for edge in graph.edge_range(node) {
            let data = graph.edge_data(edge);
            if !data.forward {
                continue;
            }
            let to = graph.target(edge);
            if partition.cell(level, to) != cell {
                continue;
            }
            let to_weight = weight + data.weight;
            if best.get(&to).map_or(true, |&old| to_weight < old) {
                best.insert(to, to_weight);
                queue.push(std::cmp::Reverse((to_weight, to)));
            }
        }
    }
    best.get(&target).copied()
}

#[test]
fn clique_equals_restricted_dijkstra_test() {
    let graph = grid_graph();
    let partition = grid_partition();
    let mld_graph = MultiLevelGraph::new(&graph, &partition);
    let mut cells = CellStorage::new(&partition, &graph);
    CellCustomizer::new(&partition).customize(&mld_graph, &mut cells);

    for cell_id in 0..partition.num_cells(1) {
        let cell = cells.cell(1, cell_id);
        for &source in cell.source_nodes() {
            for (destination, weight, _) in cell.outgoing(source) {
                let expected =
                    restricted_shortest_path(&graph, &partition, 1, cell_id, source, destination);
                match expected {
                    Some(expected) => assert_eq!(
                        weight, expected,
                        "cell {} entry {} -> {}",
                        cell_id, source, destination
                    ),
                    None => assert_eq!(
                        weight, INVALID_WEIGHT,
                        "cell {} entry {} -> {}",
                        cell_id, source, destination
                    ),
                }
            }
        }
    }
}

#[test]
fn partition_nesting_test() {
    let partition = grid_partition();
    let num_nodes = (WIDTH * WIDTH) as NodeId;
    for level in 2..=partition.num_levels() {
        for u in 0..num_nodes {
            for v in 0..num_nodes {
                if partition.cell(level - 1, u) == partition.cell(level - 1, v) {
                    assert_eq!(partition.cell(level, u), partition.cell(level, v));
                }
            }
        }
    }
}
