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

//! Shared plumbing of the command-line tools.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use log::{info, LevelFilter};
use simplelog::{
    ColorChoice, CombinedLogger, Config, SharedLogger, TermLogger, TerminalMode, WriteLogger,
};

use crate::cells::customizer::{apply_turn_penalties, CellCustomizer};
use crate::cells::CellStorage;
use crate::contractor::{ContractionConfig, GraphContractor};
use crate::graph::{EdgeBasedGraph, Graph, MultiLevelGraph};
use crate::partition::bisection::{run_bisection, BisectionConfig, BisectionGraph};
use crate::partition::{bisection_to_partition, MultiLevelPartition};
use crate::storage::datastore::{Datastore, FileLock};
use crate::storage::{self, ArtifactPaths};
use crate::types::NodeId;

/// Initializes terminal plus file logging next to the artifacts.
pub fn initialize_logging(base: &Path) -> Result<()> {
    let log_file = File::create(format!("{}.log", base.display()))
        .context("Failed to create log file")?;
    let loggers: Vec<Box<dyn SharedLogger>> = vec![
        TermLogger::new(
            LevelFilter::Info,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(LevelFilter::Debug, Config::default(), log_file),
    ];
    CombinedLogger::init(loggers).context("Failed to initialize logging")
}

/// Builds `.ebg`, `.geometry`, `.names` and `.properties` from CSV input,
/// standing in for the OSM extraction pipeline.
pub fn run_import(base: &Path, edges_csv: &Path, nodes_csv: Option<&Path>) -> Result<()> {
    let paths = ArtifactPaths::new(base);
    let (graph, geometry, names) = crate::io::import_graph(edges_csv, nodes_csv)?;
    storage::write_edge_based_graph(&paths.edge_based_graph(), &graph)?;
    storage::write_artifact(&paths.geometry(), &geometry)?;
    storage::write_artifact(&paths.names(), &names)?;
    storage::write_artifact(&paths.properties(), &storage::Properties::default())?;
    Ok(())
}

fn load_graph_with_penalties(paths: &ArtifactPaths) -> Result<EdgeBasedGraph> {
    let mut graph = storage::read_edge_based_graph(&paths.edge_based_graph())?;
    let weight_penalties: Vec<i32> =
        storage::read_optional_artifact(&paths.turn_weight_penalties())?.unwrap_or_default();
    let duration_penalties: Vec<i32> =
        storage::read_optional_artifact(&paths.turn_duration_penalties())?.unwrap_or_default();
    apply_turn_penalties(&mut graph, &weight_penalties, &duration_penalties);
    Ok(graph)
}

/// `contract <base>`: writes `.hsgr` and, for a partial contraction,
/// `.core`.
pub fn run_contract(base: &Path, config: ContractionConfig) -> Result<()> {
    let paths = ArtifactPaths::new(base);
    let graph = load_graph_with_penalties(&paths)?;
    let checksum = storage::graph_checksum(&graph);
    info!(
        "contracting {} nodes, core factor {}",
        graph.num_nodes(),
        config.core_factor
    );
    let result = GraphContractor::new(&graph, config).run();
    storage::write_hierarchy(&paths.hierarchy(), checksum, &result.graph)?;
    if result.core.count_ones(..) > 0 {
        storage::write_core(&paths.core(), &result.core)?;
    } else if paths.core().exists() {
        // A stale core marker would silently route through the slow path.
        std::fs::remove_file(paths.core())
            .with_context(|| format!("Cannot remove stale `{}`", paths.core().display()))?;
    }
    Ok(())
}

/// `partition <base>`: writes `.partition`.
pub fn run_partition(base: &Path, config: BisectionConfig) -> Result<()> {
    let paths = ArtifactPaths::new(base);
    let graph = storage::read_edge_based_graph(&paths.edge_based_graph())?;
    let geometry: crate::geometry::GeometryTable = storage::read_artifact(&paths.geometry())?;
    let coordinates = (0..graph.num_nodes() as NodeId)
        .map(|node| geometry.representative_coordinate(node))
        .collect();

    let bisection_graph = BisectionGraph::from_edge_based(&graph, coordinates);
    let bisection_ids = run_bisection(&bisection_graph, &config);

    // Each level may hold 32 times more nodes per cell than the previous
    // one; the single-cell top level is appended automatically.
    let max_cell_sizes: Vec<usize> = (0..4)
        .map(|level| config.maximum_cell_size * 32usize.pow(level))
        .collect();
    let (partitions, num_cells) = bisection_to_partition(&bisection_ids, &max_cell_sizes);
    let partition = MultiLevelPartition::pack(&partitions, &num_cells);
    info!(
        "partitioned {} nodes into {} level(s); finest level has {} cell(s)",
        graph.num_nodes(),
        partition.num_levels(),
        partition.num_cells(1)
    );
    storage::write_artifact(&paths.partition(), &partition)?;
    Ok(())
}

/// `customize <base>`: writes `.cells` and `.mldgr`.
pub fn run_customize(base: &Path) -> Result<()> {
    let paths = ArtifactPaths::new(base);
    let graph = load_graph_with_penalties(&paths)?;
    let partition: MultiLevelPartition = storage::read_artifact(&paths.partition())?;
    let multi_level_graph = MultiLevelGraph::new(&graph, &partition);
    let mut cells = CellStorage::new(&partition, &graph);
    CellCustomizer::new(&partition).customize(&multi_level_graph, &mut cells);
    storage::write_artifact(&paths.cells(), &cells)?;
    storage::write_artifact(&paths.multi_level_graph(), &multi_level_graph)?;
    Ok(())
}

/// `datastore <base>`: loads all overlays, publishes them and records the
/// publication timestamp.
pub fn run_datastore(base: &Path) -> Result<()> {
    let paths = ArtifactPaths::new(base);
    let _lock = FileLock::acquire(&paths.lock())?;
    let data = storage::load_route_data(&paths)?;

    let store = Datastore::new();
    store.publish(data);
    let (data, published) = store.attach().expect("dataset was just published");
    let _engine = crate::query::Engine::new(data);

    let timestamp = storage::read_timestamp(&paths.timestamp()).unwrap_or(0) + 1;
    storage::write_timestamp(&paths.timestamp(), timestamp)?;
    info!(
        "dataset validated and published into region {} (timestamp {})",
        published.region + 1,
        timestamp
    );
    Ok(())
}
