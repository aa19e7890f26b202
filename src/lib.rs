//! Route planning over continent-scale road networks.
//!
//! The crate implements the preprocessing-and-query core of a road
//! routing engine: recursive bisection into nested cells with customized
//! clique overlays (multi-level Dijkstra), contraction hierarchies, and
//! the bidirectional query engine that runs on either overlay and unpacks
//! the result into annotated road segments.
#![warn(
    elided_lifetimes_in_paths,
    explicit_outlives_requirements,
    macro_use_extern_crate,
    non_ascii_idents,
    noop_method_call,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_lifetimes,
    unused_qualifications
)]
#![warn(clippy::all)]

pub mod cells;
pub mod contractor;
pub mod error;
pub mod geometry;
pub mod graph;
pub mod heap;
pub mod io;
pub mod partition;
pub mod query;
pub mod storage;
pub mod tools;
pub mod types;

pub use error::EngineError;
pub use graph::{EdgeBasedGraph, Graph, MultiLevelGraph};
pub use heap::QueryHeap;
pub use query::{Engine, PhantomNode, PhantomNodes, Route, RouteData};
