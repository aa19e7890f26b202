//! Plain Dijkstra on the edge-based graph.
//!
//! This is the reference the preprocessed algorithms are checked against,
//! and the slow path for graphs without any overlay.

use crate::graph::{EdgeBasedGraph, Graph};
use crate::heap::QueryHeap;
use crate::types::{EdgeWeight, NodeId};

/// Single-pair shortest path using forward edges only. Returns the weight
/// and the node sequence, or `None` when the target is unreachable.
pub fn shortest_path(
    graph: &EdgeBasedGraph,
    source: NodeId,
    target: NodeId,
) -> Option<(EdgeWeight, Vec<NodeId>)> {
    let mut heap: QueryHeap<EdgeWeight, NodeId> = QueryHeap::new(graph.num_nodes());
    heap.insert(source, 0, source);
    while let Some(node) = heap.delete_min() {
        let weight = heap.get_key(node);
        if node == target {
            let mut path = vec![node];
            let mut current = node;
            while *heap.get_data(current) != current {
                current = *heap.get_data(current);
                path.push(current);
            }
            path.reverse();
            return Some((weight, path));
        }
        for edge in graph.edge_range(node) {
            let data = graph.edge_data(edge);
            if !data.forward {
                continue;
            }
            let to = graph.target(edge);
            let to_weight = weight + data.weight;
            if !heap.was_inserted(to) {
                heap.insert(to, to_weight, node);
            } else if to_weight < heap.get_key(to) {
                heap.decrease_key(to, to_weight);
                *heap.get_data_mut(to) = node;
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::edge;

    #[test]
    fn line_test() {
        let graph =
            EdgeBasedGraph::from_edges(4, vec![edge(0, 1, 1), edge(1, 2, 1), edge(2, 3, 1)]);
        let (weight, path) = shortest_path(&graph, 0, 3).expect("path exists");
        assert_eq!(weight, 3);
        assert_eq!(path, vec![0, 1, 2, 3]);
    }

    #[test]
    fn detour_test() {
        let graph = EdgeBasedGraph::from_edges(
            4,
            vec![edge(0, 1, 10), edge(0, 2, 1), edge(2, 1, 2), edge(1, 3, 1)],
        );
        let (weight, path) = shortest_path(&graph, 0, 3).expect("path exists");
        assert_eq!(weight, 4);
        assert_eq!(path, vec![0, 2, 1, 3]);
    }

    #[test]
    fn unreachable_test() {
        let graph = EdgeBasedGraph::from_edges(3, vec![edge(0, 1, 1)]);
        assert_eq!(shortest_path(&graph, 0, 2), None);
        assert_eq!(shortest_path(&graph, 1, 0), None);
    }
}
