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

//! On-disk artifacts.
//!
//! Every file starts with a four-byte fingerprint and a version tuple
//! `(major, minor, patch, checksum)`; the checksum covers the payload
//! bytes. Payloads are bincode-encoded with fixed-size little-endian
//! integers, so vectors are stored as a `u64` length followed by packed
//! elements.

pub mod datastore;

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fixedbitset::FixedBitSet;
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::cells::CellStorage;
use crate::contractor::ContractedGraph;
use crate::error::EngineError;
use crate::geometry::GeometryTable;
use crate::graph::{EdgeBasedGraph, EdgeEntry, Graph, MultiLevelGraph, NodeEntry};
use crate::partition::MultiLevelPartition;
use crate::query::{ChOverlay, MldOverlay, NameTable, RouteData};

pub const FINGERPRINT: [u8; 4] = *b"BYWY";
pub const VERSION: (u16, u16, u16) = (0, 3, 1);

/// Profile-level settings that ride along with the graph.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Properties {
    pub weight_name: String,
    /// Turn instruction codes indexed by turn id.
    pub turn_instructions: Vec<u8>,
}

impl Default for Properties {
    fn default() -> Self {
        Properties {
            weight_name: "duration".to_string(),
            turn_instructions: Vec::new(),
        }
    }
}

/// Paths of all artifacts derived from one base path.
#[derive(Clone, Debug)]
pub struct ArtifactPaths {
    base: PathBuf,
}

impl ArtifactPaths {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        ArtifactPaths { base: base.into() }
    }

    fn with(&self, extension: &str) -> PathBuf {
        PathBuf::from(format!("{}.{}", self.base.display(), extension))
    }

    pub fn edge_based_graph(&self) -> PathBuf {
        self.with("ebg")
    }

    pub fn hierarchy(&self) -> PathBuf {
        self.with("hsgr")
    }

    pub fn core(&self) -> PathBuf {
        self.with("core")
    }

    pub fn partition(&self) -> PathBuf {
        self.with("partition")
    }

    pub fn cells(&self) -> PathBuf {
        self.with("cells")
    }

    pub fn multi_level_graph(&self) -> PathBuf {
        self.with("mldgr")
    }

    pub fn geometry(&self) -> PathBuf {
        self.with("geometry")
    }

    pub fn turn_weight_penalties(&self) -> PathBuf {
        self.with("turn_weight_penalties")
    }

    pub fn turn_duration_penalties(&self) -> PathBuf {
        self.with("turn_duration_penalties")
    }

    pub fn names(&self) -> PathBuf {
        self.with("names")
    }

    pub fn properties(&self) -> PathBuf {
        self.with("properties")
    }

    pub fn timestamp(&self) -> PathBuf {
        self.with("timestamp")
    }

    pub fn lock(&self) -> PathBuf {
        self.with("lock")
    }
}

fn payload_checksum(bytes: &[u8]) -> u32 {
    // FNV-1a.
    let mut hash = 0x811c_9dc5u32;
    for &byte in bytes {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Writes a fingerprinted artifact.
pub fn write_artifact<T: Serialize + ?Sized>(path: &Path, payload: &T) -> Result<()> {
    let bytes = bincode::serialize(payload)
        .with_context(|| format!("Cannot encode artifact `{}`", path.display()))?;
    let mut file = File::create(path)
        .with_context(|| format!("Cannot create artifact `{}`", path.display()))?;
    file.write_all(&FINGERPRINT)?;
    file.write_all(&VERSION.0.to_le_bytes())?;
    file.write_all(&VERSION.1.to_le_bytes())?;
    file.write_all(&VERSION.2.to_le_bytes())?;
    file.write_all(&payload_checksum(&bytes).to_le_bytes())?;
    file.write_all(&bytes)?;
    debug!("wrote `{}` ({} payload bytes)", path.display(), bytes.len());
    Ok(())
}

/// Reads a fingerprinted artifact, rejecting fingerprint, major-version
/// and checksum mismatches.
pub fn read_artifact<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let mut file =
        File::open(path).with_context(|| format!("Cannot open artifact `{}`", path.display()))?;
    let mut header = [0u8; 14];
    file.read_exact(&mut header)
        .with_context(|| format!("Artifact `{}` is truncated", path.display()))?;
    if header[0..4] != FINGERPRINT {
        return Err(EngineError::InvalidInput(format!(
            "`{}` is not a routing artifact (bad fingerprint)",
            path.display()
        ))
        .into());
    }
    let major = u16::from_le_bytes([header[4], header[5]]);
    if major != VERSION.0 {
        return Err(EngineError::InvalidInput(format!(
            "`{}` was written by an incompatible version (found {}, need {})",
            path.display(),
            major,
            VERSION.0
        ))
        .into());
    }
    let expected = u32::from_le_bytes([header[10], header[11], header[12], header[13]]);
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    if payload_checksum(&bytes) != expected {
        return Err(EngineError::InvalidInput(format!(
            "`{}` is corrupt (checksum mismatch)",
            path.display()
        ))
        .into());
    }
    bincode::deserialize(&bytes)
        .with_context(|| format!("Cannot decode artifact `{}`", path.display()))
}

/// Reads an artifact that may legitimately be absent.
pub fn read_optional_artifact<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if path.exists() {
        read_artifact(path).map(Some)
    } else {
        Ok(None)
    }
}

/// A cheap identity of a graph, stored in the hierarchy artifact so stale
/// overlays are rejected.
pub fn graph_checksum(graph: &EdgeBasedGraph) -> u32 {
    let mut bytes = Vec::with_capacity(16);
    bytes.extend((graph.num_nodes() as u64).to_le_bytes());
    bytes.extend((graph.num_edges() as u64).to_le_bytes());
    payload_checksum(&bytes)
}

pub fn write_edge_based_graph(path: &Path, graph: &EdgeBasedGraph) -> Result<()> {
    write_artifact(path, &(graph.nodes(), graph.edges()))
}

pub fn read_edge_based_graph(path: &Path) -> Result<EdgeBasedGraph> {
    let (nodes, edges): (Vec<NodeEntry>, Vec<EdgeEntry>) = read_artifact(path)?;
    Ok(EdgeBasedGraph::from_parts(nodes, edges))
}

#[derive(Deserialize, Serialize)]
struct HierarchyFile {
    checksum: u32,
    nodes: Vec<NodeEntry>,
    edges: Vec<crate::contractor::ChEdgeEntry>,
    order: Vec<u32>,
}

pub fn write_hierarchy(path: &Path, checksum: u32, graph: &ContractedGraph) -> Result<()> {
    write_artifact(
        path,
        &HierarchyFile {
            checksum,
            nodes: graph.nodes().to_vec(),
            edges: graph.edges().to_vec(),
            order: graph.order().to_vec(),
        },
    )
}

pub fn read_hierarchy(path: &Path, expected_checksum: u32) -> Result<ContractedGraph> {
    let file: HierarchyFile = read_artifact(path)?;
    if file.checksum != expected_checksum {
        return Err(EngineError::InvalidInput(format!(
            "`{}` belongs to a different graph (checksum mismatch)",
            path.display()
        ))
        .into());
    }
    Ok(ContractedGraph::from_parts(file.nodes, file.edges, file.order))
}

pub fn write_core(path: &Path, core: &FixedBitSet) -> Result<()> {
    write_artifact(path, &(core.len() as u64, core.as_slice()))
}

pub fn read_core(path: &Path) -> Result<FixedBitSet> {
    let (bits, blocks): (u64, Vec<u32>) = read_artifact(path)?;
    Ok(FixedBitSet::with_capacity_and_blocks(bits as usize, blocks))
}

pub fn write_timestamp(path: &Path, timestamp: u64) -> Result<()> {
    write_artifact(path, &timestamp)
}

pub fn read_timestamp(path: &Path) -> Result<u64> {
    read_artifact(path)
}

/// Loads everything the query engine needs from a base path. The CH and
/// MLD overlays are each optional; a missing artifact merely disables the
/// algorithm that needs it.
pub fn load_route_data(paths: &ArtifactPaths) -> Result<RouteData> {
    let mut graph = read_edge_based_graph(&paths.edge_based_graph())?;
    let geometry: GeometryTable = read_artifact(&paths.geometry())?;
    let names: Option<NameTable> = read_optional_artifact(&paths.names())?;
    let properties: Properties =
        read_optional_artifact(&paths.properties())?.unwrap_or_default();

    let weight_penalties: Vec<i32> =
        read_optional_artifact(&paths.turn_weight_penalties())?.unwrap_or_default();
    let duration_penalties: Vec<i32> =
        read_optional_artifact(&paths.turn_duration_penalties())?.unwrap_or_default();
    let checksum = graph_checksum(&graph);
    crate::cells::customizer::apply_turn_penalties(
        &mut graph,
        &weight_penalties,
        &duration_penalties,
    );

    let ch = match read_optional_artifact::<HierarchyFile>(&paths.hierarchy())? {
        Some(file) => {
            if file.checksum != checksum {
                return Err(EngineError::InvalidInput(format!(
                    "`{}` belongs to a different graph (checksum mismatch)",
                    paths.hierarchy().display()
                ))
                .into());
            }
            let core = if paths.core().exists() {
                Some(read_core(&paths.core())?)
            } else {
                None
            };
            Some(ChOverlay {
                graph: ContractedGraph::from_parts(file.nodes, file.edges, file.order),
                core,
            })
        }
        None => None,
    };

    let partition: Option<MultiLevelPartition> = read_optional_artifact(&paths.partition())?;
    let cells: Option<CellStorage> = read_optional_artifact(&paths.cells())?;
    let mld_graph: Option<MultiLevelGraph> =
        read_optional_artifact(&paths.multi_level_graph())?;
    let mld = match (partition, cells, mld_graph) {
        (Some(partition), Some(cells), Some(graph)) => Some(MldOverlay {
            partition,
            cells,
            graph,
        }),
        _ => None,
    };

    info!(
        "loaded `{}`: {} nodes, {} edges, ch: {}, mld: {}",
        paths.edge_based_graph().display(),
        graph.num_nodes(),
        graph.num_edges(),
        ch.is_some(),
        mld.is_some()
    );
    let num_nodes = graph.num_nodes();
    Ok(RouteData {
        graph,
        geometry,
        names: names.unwrap_or_else(|| NameTable::unnamed(num_nodes)),
        turn_instructions: properties.turn_instructions,
        ch,
        mld,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::edge;

    fn scratch_path(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("byway-storage-{}-{}", std::process::id(), name));
        path
    }

    #[test]
    fn round_trip_test() {
        let path = scratch_path("roundtrip.ebg");
        let graph = EdgeBasedGraph::from_edges(3, vec![edge(0, 1, 4), edge(1, 2, 5)]);
        write_edge_based_graph(&path, &graph).unwrap();
        let loaded = read_edge_based_graph(&path).unwrap();
        assert_eq!(loaded.num_nodes(), 3);
        assert_eq!(loaded.num_edges(), 2);
        assert_eq!(loaded.edge_data(1).weight, 5);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn fingerprint_rejected_test() {
        let path = scratch_path("bad-fingerprint");
        std::fs::write(&path, b"NOPE00000000000000").unwrap();
        let result = read_edge_based_graph(&path);
        let error = result.unwrap_err();
        assert!(matches!(
            error.downcast_ref::<EngineError>(),
            Some(EngineError::InvalidInput(_))
        ));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn checksum_rejected_test() {
        let path = scratch_path("bad-checksum");
        let graph = EdgeBasedGraph::from_edges(2, vec![edge(0, 1, 1)]);
        write_edge_based_graph(&path, &graph).unwrap();
        // Flip one payload byte.
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        std::fs::write(&path, bytes).unwrap();
        assert!(read_edge_based_graph(&path).is_err());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn deterministic_bytes_test() {
        let a = scratch_path("determinism-a");
        let b = scratch_path("determinism-b");
        let graph = EdgeBasedGraph::from_edges(3, vec![edge(0, 1, 4), edge(1, 2, 5)]);
        write_edge_based_graph(&a, &graph).unwrap();
        write_edge_based_graph(&b, &graph).unwrap();
        assert_eq!(std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());
        std::fs::remove_file(&a).unwrap();
        std::fs::remove_file(&b).unwrap();
    }
}
