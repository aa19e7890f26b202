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

//! The query engine: phantom nodes, per-thread search scratch and the
//! engine facade that picks an algorithm per loaded overlay.

pub mod annotate;
pub mod ch;
pub mod dijkstra;
pub mod many_to_many;
pub mod mld;

use std::sync::Arc;

use fixedbitset::FixedBitSet;
use object_pool::Pool;

use crate::cells::CellStorage;
use crate::contractor::ContractedGraph;
use crate::error::EngineError;
use crate::geometry::GeometryTable;
use crate::graph::{EdgeBasedGraph, MultiLevelGraph};
use crate::heap::QueryHeap;
use crate::partition::MultiLevelPartition;
use crate::types::{EdgeDuration, EdgeWeight, NodeId, SearchWeight};

pub use annotate::{NameTable, PathStep, Route};

/// Heap payload of the point-to-point searches: the parent pointer for
/// path retrieval, plus the clique marker used by the multi-level search.
#[derive(Clone, Copy, Debug)]
pub struct SearchData {
    pub parent: NodeId,
    pub from_clique: bool,
}

pub type SearchHeap = QueryHeap<SearchWeight, SearchData>;

/// Per-search mutable state: two heaps for the main bidirectional search
/// and a second pair for the core phase. Allocated once per thread and
/// cleared between queries.
pub struct SearchScratch {
    pub forward: SearchHeap,
    pub reverse: SearchHeap,
    pub forward_core: SearchHeap,
    pub reverse_core: SearchHeap,
}

impl SearchScratch {
    pub fn new(num_nodes: usize) -> Self {
        SearchScratch {
            forward: SearchHeap::new(num_nodes),
            reverse: SearchHeap::new(num_nodes),
            forward_core: SearchHeap::new(num_nodes),
            reverse_core: SearchHeap::new(num_nodes),
        }
    }

    pub fn clear(&mut self) {
        self.forward.clear();
        self.reverse.clear();
        self.forward_core.clear();
        self.reverse_core.clear();
    }
}

/// A point on the map snapped onto a road segment. The weights are the
/// portion of the segment already traversed at the snapped point, for the
/// forward and the opposite directed segment.
#[derive(Clone, Copy, Debug, Default)]
pub struct PhantomNode {
    pub forward_segment: Option<NodeId>,
    pub reverse_segment: Option<NodeId>,
    pub forward_weight: EdgeWeight,
    pub reverse_weight: EdgeWeight,
    pub forward_duration: EdgeDuration,
    pub reverse_duration: EdgeDuration,
}

impl PhantomNode {
    /// A phantom sitting exactly at the start of a segment.
    pub fn at_node(node: NodeId) -> Self {
        PhantomNode {
            forward_segment: Some(node),
            ..Default::default()
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PhantomNodes {
    pub source: PhantomNode,
    pub target: PhantomNode,
}

impl PhantomNodes {
    /// Source and target share the forward segment with the source ahead
    /// of the target: the route must leave the segment and come back.
    pub fn force_loop_forward(&self) -> bool {
        match (self.source.forward_segment, self.target.forward_segment) {
            (Some(s), Some(t)) => s == t && self.source.forward_weight > self.target.forward_weight,
            _ => false,
        }
    }

    pub fn force_loop_reverse(&self) -> bool {
        match (self.source.reverse_segment, self.target.reverse_segment) {
            (Some(s), Some(t)) => s == t && self.source.reverse_weight > self.target.reverse_weight,
            _ => false,
        }
    }
}

/// Seeds the two heaps with the phantom endpoints. The forward heap takes
/// negated offsets so that relaxing the full first edge nets exactly the
/// untraversed remainder of the segment.
pub fn insert_in_heaps(phantoms: &PhantomNodes, forward: &mut SearchHeap, reverse: &mut SearchHeap) {
    if let Some(node) = phantoms.source.forward_segment {
        forward.insert(
            node,
            -(phantoms.source.forward_weight as SearchWeight),
            SearchData {
                parent: node,
                from_clique: false,
            },
        );
    }
    if let Some(node) = phantoms.source.reverse_segment {
        if !forward.was_inserted(node) {
            forward.insert(
                node,
                -(phantoms.source.reverse_weight as SearchWeight),
                SearchData {
                    parent: node,
                    from_clique: false,
                },
            );
        }
    }
    if let Some(node) = phantoms.target.forward_segment {
        reverse.insert(
            node,
            phantoms.target.forward_weight as SearchWeight,
            SearchData {
                parent: node,
                from_clique: false,
            },
        );
    }
    if let Some(node) = phantoms.target.reverse_segment {
        if !reverse.was_inserted(node) {
            reverse.insert(
                node,
                phantoms.target.reverse_weight as SearchWeight,
                SearchData {
                    parent: node,
                    from_clique: false,
                },
            );
        }
    }
}

/// A route leg before annotation: total weight plus the unpacked node and
/// base-edge sequences.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InternalRoute {
    pub weight: EdgeWeight,
    pub nodes: Vec<NodeId>,
    pub edges: Vec<crate::types::EdgeId>,
}

/// The contraction hierarchy artifacts.
pub struct ChOverlay {
    pub graph: ContractedGraph,
    pub core: Option<FixedBitSet>,
}

/// The multi-level Dijkstra artifacts.
pub struct MldOverlay {
    pub partition: MultiLevelPartition,
    pub cells: CellStorage,
    pub graph: MultiLevelGraph,
}

/// Everything the query engine reads. Immutable once published.
pub struct RouteData {
    pub graph: EdgeBasedGraph,
    pub geometry: GeometryTable,
    pub names: NameTable,
    /// Turn instruction codes indexed by turn id.
    pub turn_instructions: Vec<u8>,
    pub ch: Option<ChOverlay>,
    pub mld: Option<MldOverlay>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Algorithm {
    ContractionHierarchy,
    CoreContractionHierarchy,
    MultiLevelDijkstra,
}

/// The engine facade: picks an algorithm from the loaded overlays and
/// owns the pooled per-thread scratch.
pub struct Engine {
    data: Arc<RouteData>,
    scratch: Pool<SearchScratch>,
}

impl Engine {
    pub fn new(data: Arc<RouteData>) -> Self {
        let num_nodes = crate::graph::Graph::num_nodes(&data.graph);
        let scratch = Pool::new(rayon::current_num_threads(), || {
            SearchScratch::new(num_nodes)
        });
        Engine { data, scratch }
    }

    pub fn data(&self) -> &RouteData {
        &self.data
    }

    /// The algorithm the engine will use, multi-level Dijkstra first.
    pub fn algorithm(&self) -> Result<Algorithm, EngineError> {
        if self.data.mld.is_some() {
            return Ok(Algorithm::MultiLevelDijkstra);
        }
        match &self.data.ch {
            Some(overlay) => {
                if overlay.core.as_ref().is_some_and(|core| core.count_ones(..) > 0) {
                    Ok(Algorithm::CoreContractionHierarchy)
                } else {
                    Ok(Algorithm::ContractionHierarchy)
                }
            }
            None => Err(EngineError::InvalidInput(
                "no routing overlay loaded".to_string(),
            )),
        }
    }

    /// Answers a via-point query: consecutive waypoint pairs become legs,
    /// searched independently and concatenated.
    pub fn route(&self, waypoints: &[PhantomNode]) -> Result<Route, EngineError> {
        if waypoints.len() < 2 {
            return Err(EngineError::InvalidInput(
                "a route needs at least two waypoints".to_string(),
            ));
        }
        let algorithm = self.algorithm()?;
        let mut scratch = self.scratch.pull(|| {
            SearchScratch::new(crate::graph::Graph::num_nodes(&self.data.graph))
        });
        let mut route = Route::default();
        for pair in waypoints.windows(2) {
            let phantoms = PhantomNodes {
                source: pair[0],
                target: pair[1],
            };
            let result = match algorithm {
                Algorithm::MultiLevelDijkstra => {
                    let overlay = self.data.mld.as_ref().expect("mld overlay is loaded");
                    mld::route(overlay, &mut scratch, &phantoms)
                }
                Algorithm::ContractionHierarchy | Algorithm::CoreContractionHierarchy => {
                    let overlay = self.data.ch.as_ref().expect("ch overlay is loaded");
                    ch::route(overlay, &mut scratch, &phantoms)
                }
            };
            let leg = match result {
                Ok(leg) => leg,
                Err(EngineError::NoRoute) => return Err(self.classify_failure(&phantoms)),
                Err(error) => return Err(error),
            };
            let annotated = annotate::annotate_leg(&self.data, &phantoms, &leg);
            route.append(annotated);
        }
        Ok(route)
    }

    /// Computes the `|sources| x |targets|` weight and duration matrices.
    /// Tables always run on the hierarchy, whatever the route algorithm.
    pub fn table(
        &self,
        sources: &[PhantomNode],
        targets: &[PhantomNode],
    ) -> Result<many_to_many::DistanceTable, EngineError> {
        match (&self.data.ch, self.algorithm()?) {
            (Some(overlay), _) => Ok(many_to_many::many_to_many(overlay, sources, targets)),
            (None, Algorithm::MultiLevelDijkstra) => Err(EngineError::NotImplemented(
                "many-to-many tables require the contraction hierarchy overlay",
            )),
            (None, _) => Err(EngineError::InvalidInput(
                "no routing overlay loaded".to_string(),
            )),
        }
    }

    /// Labels a search that found nothing: when no directed path connects
    /// the endpoints at all the route is impossible, otherwise it is
    /// merely not found. Endpoints sharing a strongly connected component
    /// are mutually reachable and skip the reachability sweep.
    fn classify_failure(&self, phantoms: &PhantomNodes) -> EngineError {
        let graph = &self.data.graph;
        let sources: Vec<NodeId> = [
            phantoms.source.forward_segment,
            phantoms.source.reverse_segment,
        ]
        .into_iter()
        .flatten()
        .collect();
        let targets: Vec<NodeId> = [
            phantoms.target.forward_segment,
            phantoms.target.reverse_segment,
        ]
        .into_iter()
        .flatten()
        .collect();
        let connected = sources.iter().any(|&s| {
            targets
                .iter()
                .any(|&t| graph.component(s) == graph.component(t))
        }) || graph.is_reachable(&sources, &targets);
        if connected {
            EngineError::NoRoute
        } else {
            EngineError::Impossible
        }
    }
}
