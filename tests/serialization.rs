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

//! Artifact round trips and customization determinism.
use std::path::PathBuf;

use byway::cells::customizer::CellCustomizer;
use byway::cells::CellStorage;
use byway::contractor::{ContractionConfig, GraphContractor};
use byway::graph::{directed_edge_pair, EdgeBasedGraph, MultiLevelGraph};
use byway::partition::{bisection_to_partition, MultiLevelPartition};
use byway::storage;

fn scratch_path(name: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("byway-serialization-{}-{}", std::process::id(), name));
    path
}

fn ring_graph() -> EdgeBasedGraph {
    let edges = (0..8)
        .flat_map(|i| directed_edge_pair(i, (i + 1) % 8, 1 + i % 3))
        .collect();
    EdgeBasedGraph::from_edges(8, edges)
}

fn ring_partition() -> MultiLevelPartition {
    let ids: Vec<u32> = (0..8).map(|i| i << 29).collect();
    let (partitions, num_cells) = bisection_to_partition(&ids, &[2, 4]);
    MultiLevelPartition::pack(&partitions, &num_cells)
}

#[test]
fn graph_round_trip_is_byte_identical_test() {
    let first = scratch_path("graph-first");
    let second = scratch_path("graph-second");
    let graph = ring_graph();
    storage::write_edge_based_graph(&first, &graph).unwrap();
    let loaded = storage::read_edge_based_graph(&first).unwrap();
    storage::write_edge_based_graph(&second, &loaded).unwrap();
    assert_eq!(
        std::fs::read(&first).unwrap(),
        std::fs::read(&second).unwrap()
    );
    std::fs::remove_file(&first).unwrap();
    std::fs::remove_file(&second).unwrap();
}

#[test]
fn partition_round_trip_is_byte_identical_test() {
    let first = scratch_path("partition-first");
    let second = scratch_path("partition-second");
    let partition = ring_partition();
    storage::write_artifact(&first, &partition).unwrap();
    let loaded: MultiLevelPartition = storage::read_artifact(&first).unwrap();
    storage::write_artifact(&second, &loaded).unwrap();
    assert_eq!(
        std::fs::read(&first).unwrap(),
        std::fs::read(&second).unwrap()
    );
    std::fs::remove_file(&first).unwrap();
    std::fs::remove_file(&second).unwrap();
}

#[test]
fn hierarchy_round_trip_test() {
    let path = scratch_path("hierarchy");
    let graph = ring_graph();
    let checksum = storage::graph_checksum(&graph);
    let result = GraphContractor::new(&graph, ContractionConfig::default()).run();
    storage::write_hierarchy(&path, checksum, &result.graph).unwrap();
    let loaded = storage::read_hierarchy(&path, checksum).unwrap();
    assert_eq!(loaded.order(), result.graph.order());
    assert_eq!(loaded.edges().len(), result.graph.edges().len());
    // A checksum from a different graph is rejected.
    assert!(storage::read_hierarchy(&path, checksum ^ 1).is_err());
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn customization_is_deterministic_test() {
    let graph = ring_graph();
    let partition = ring_partition();
    let mld_graph = MultiLevelGraph::new(&graph, &partition);

    let customize = || {
        let mut cells = CellStorage::new(&partition, &graph);
        CellCustomizer::new(&partition).customize(&mld_graph, &mut cells);
        bincode::serialize(&cells).unwrap()
    };
    // Cells are filled in parallel; the resulting bytes must not depend on
    // scheduling.
    assert_eq!(customize(), customize());
}

#[test]
fn cells_round_trip_is_byte_identical_test() {
    let first = scratch_path("cells-first");
    let second = scratch_path("cells-second");
    let graph = ring_graph();
    let partition = ring_partition();
    let mld_graph = MultiLevelGraph::new(&graph, &partition);
    let mut cells = CellStorage::new(&partition, &graph);
    CellCustomizer::new(&partition).customize(&mld_graph, &mut cells);

    storage::write_artifact(&first, &cells).unwrap();
    let loaded: CellStorage = storage::read_artifact(&first).unwrap();
    storage::write_artifact(&second, &loaded).unwrap();
    assert_eq!(
        std::fs::read(&first).unwrap(),
        std::fs::read(&second).unwrap()
    );
    std::fs::remove_file(&first).unwrap();
    std::fs::remove_file(&second).unwrap();
}
