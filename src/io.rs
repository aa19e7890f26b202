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

//! CSV import of edge lists.
//!
//! The OSM extraction pipeline is a separate tool; this importer builds
//! the same artifacts from plain CSV files, which is how test fixtures
//! and benchmark graphs enter the system.
//!
//! `edges.csv` columns: `source,target,weight,duration,forward,backward,
//! turn_id`. `nodes.csv` columns: `node,lon,lat,name`; the file is
//! optional and supplies coordinates and street names.

use std::path::Path;

use anyhow::{Context, Result};
use hashbrown::HashMap;
use log::info;
use serde::Deserialize;

use crate::geometry::GeometryTable;
use crate::graph::{EdgeBasedGraph, EdgeData, InputEdge};
use crate::query::NameTable;
use crate::types::{Coordinate, NodeId};

#[derive(Debug, Deserialize)]
struct EdgeRecord {
    source: NodeId,
    target: NodeId,
    weight: u32,
    duration: u32,
    forward: bool,
    backward: bool,
    #[serde(default)]
    turn_id: u32,
}

#[derive(Debug, Deserialize)]
struct NodeRecord {
    node: NodeId,
    lon: f64,
    lat: f64,
    #[serde(default)]
    name: String,
}

/// Reads an edge list and the optional node annotations, producing the
/// graph, a one-point-per-segment geometry table and the name table.
pub fn import_graph(
    edges_path: &Path,
    nodes_path: Option<&Path>,
) -> Result<(EdgeBasedGraph, GeometryTable, NameTable)> {
    let mut reader = csv::Reader::from_path(edges_path)
        .with_context(|| format!("Cannot open edge list `{}`", edges_path.display()))?;
    let mut edges = Vec::new();
    let mut num_nodes = 0usize;
    for record in reader.deserialize() {
        let record: EdgeRecord =
            record.with_context(|| format!("Bad edge record in `{}`", edges_path.display()))?;
        num_nodes = num_nodes
            .max(record.source as usize + 1)
            .max(record.target as usize + 1);
        // Each edge is stored at both endpoints with the direction flags
        // swapped, so the reverse search and the boundary enumeration see
        // incoming edges in their adjacency.
        let data = EdgeData {
            weight: record.weight,
            duration: record.duration,
            forward: record.forward,
            backward: record.backward,
            turn_id: record.turn_id,
        };
        edges.push(InputEdge {
            source: record.source,
            target: record.target,
            data,
        });
        edges.push(InputEdge {
            source: record.target,
            target: record.source,
            data: EdgeData {
                forward: record.backward,
                backward: record.forward,
                ..data
            },
        });
    }

    let mut coordinates = vec![Coordinate::default(); num_nodes];
    let mut names = vec![String::new(); num_nodes];
    if let Some(path) = nodes_path {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Cannot open node list `{}`", path.display()))?;
        for record in reader.deserialize() {
            let record: NodeRecord =
                record.with_context(|| format!("Bad node record in `{}`", path.display()))?;
            let node = record.node as usize;
            if node >= num_nodes {
                num_nodes = node + 1;
                coordinates.resize(num_nodes, Coordinate::default());
                names.resize(num_nodes, String::new());
            }
            coordinates[node] = Coordinate::new(
                (record.lon * 1e6).round() as i32,
                (record.lat * 1e6).round() as i32,
            );
            names[node] = record.name;
        }
    }

    let graph = EdgeBasedGraph::from_edges(num_nodes, edges);
    let geometry = GeometryTable::from_polylines(
        (0..num_nodes as NodeId)
            .map(|node| vec![(node, coordinates[node as usize], (0, 0), (0, 0))])
            .collect(),
    );

    let mut name_ids = HashMap::new();
    name_ids.insert(String::new(), 0u32);
    let mut name_table = vec![String::new()];
    let node_name_ids = names
        .into_iter()
        .map(|name| {
            *name_ids.entry(name.clone()).or_insert_with(|| {
                name_table.push(name);
                name_table.len() as u32 - 1
            })
        })
        .collect();
    let names = NameTable::new(name_table, node_name_ids, vec![0; num_nodes]);

    info!(
        "imported {} node(s) and {} edge(s) from `{}`",
        num_nodes,
        graph.num_edges(),
        edges_path.display()
    );
    Ok((graph, geometry, names))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use std::io::Write;

    fn scratch_file(name: &str, contents: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("byway-io-{}-{}", std::process::id(), name));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn import_test() {
        let edges = scratch_file(
            "edges.csv",
            "source,target,weight,duration,forward,backward,turn_id\n\
             0,1,10,100,true,false,0\n\
             1,2,20,200,true,true,1\n",
        );
        let nodes = scratch_file(
            "nodes.csv",
            "node,lon,lat,name\n0,13.4,52.5,Unter den Linden\n1,13.5,52.5,\n2,13.6,52.6,Karl-Marx-Allee\n",
        );
        let (graph, geometry, names) = import_graph(&edges, Some(&nodes)).unwrap();
        assert_eq!(graph.num_nodes(), 3);
        // Each row yields a stored entry at both endpoints.
        assert_eq!(graph.num_edges(), 4);
        assert_eq!(graph.edge_data(0).weight, 10);
        assert!(graph.edge_data(0).forward);
        // The mirror of 0 -> 1 is reverse-only.
        let mirror = graph.find_smallest_edge(1, 0, |data| data.backward).unwrap();
        assert!(!graph.edge_data(mirror).forward);
        let two_way = graph.find_smallest_edge(1, 2, |data| data.forward).unwrap();
        assert!(graph.edge_data(two_way).backward);
        assert_eq!(geometry.num_segments(), 3);
        assert_eq!(
            geometry.representative_coordinate(0),
            Coordinate::new(13_400_000, 52_500_000)
        );
        assert_eq!(names.name(names.name_id(0)), "Unter den Linden");
        assert_eq!(names.name(names.name_id(1)), "");
        std::fs::remove_file(&edges).unwrap();
        std::fs::remove_file(&nodes).unwrap();
    }
}
