//! Inertial-flow minimum cuts.
//!
//! A candidate cut projects the nodes of the current subgraph onto a
//! slope, seeds the first fraction of the projection order as flow sources
//! and the last fraction as sinks, and computes a unit-capacity maximum
//! flow between them. The residual reachability of the sources gives the
//! cut. Several slopes are evaluated in parallel and the smallest balanced
//! cut wins.

use rayon::prelude::*;

use crate::types::Coordinate;

/// Undirected graph over the local node ids `0..n` of one bisection view,
/// in packed adjacency form.
#[derive(Clone, Debug, Default)]
pub struct FlowGraph {
    pub first: Vec<u32>,
    pub neighbors: Vec<u32>,
}

impl FlowGraph {
    pub fn num_nodes(&self) -> usize {
        self.first.len().saturating_sub(1)
    }

    fn neighbors(&self, node: u32) -> &[u32] {
        &self.neighbors[self.first[node as usize] as usize..self.first[node as usize + 1] as usize]
    }
}

/// The result of one bisection step: which side each local node landed on
/// and how many edges the cut severed.
#[derive(Clone, Debug)]
pub struct Cut {
    pub side: Vec<bool>,
    pub num_edges: usize,
}

/// Computes the best inertial-flow cut of `graph`, trying `num_cuts`
/// slopes. Returns `None` when no candidate satisfies the balance factor,
/// which makes the caller treat the subgraph as a leaf.
pub fn compute_cut(
    coordinates: &[Coordinate],
    graph: &FlowGraph,
    balance: f64,
    boundary_fraction: f64,
    num_cuts: usize,
) -> Option<Cut> {
    let n = graph.num_nodes();
    debug_assert_eq!(coordinates.len(), n);
    let num_seeds = ((n as f64 * boundary_fraction).ceil() as usize).max(1);
    if n < 2 || 2 * num_seeds > n {
        return None;
    }

    let candidates: Vec<Cut> = (0..num_cuts.max(1))
        .into_par_iter()
        .filter_map(|slope_index| {
            let angle = std::f64::consts::PI * slope_index as f64 / num_cuts.max(1) as f64;
            let (sin, cos) = angle.sin_cos();
            let mut order: Vec<u32> = (0..n as u32).collect();
            order.sort_unstable_by(|&a, &b| {
                let pa = coordinates[a as usize].lon as f64 * cos
                    + coordinates[a as usize].lat as f64 * sin;
                let pb = coordinates[b as usize].lon as f64 * cos
                    + coordinates[b as usize].lat as f64 * sin;
                pa.partial_cmp(&pb).unwrap().then(a.cmp(&b))
            });
            let sources = &order[..num_seeds];
            let sinks = &order[n - num_seeds..];
            let cut = max_flow_cut(graph, sources, sinks);
            let left = cut.side.iter().filter(|&&s| s).count();
            let largest = left.max(n - left) as f64;
            if largest <= balance * (n as f64) / 2.0 {
                Some(cut)
            } else {
                None
            }
        })
        .collect();

    candidates.into_iter().min_by_key(|cut| {
        let left = cut.side.iter().filter(|&&s| s).count();
        let imbalance = left.max(n - left) - left.min(n - left);
        (cut.num_edges, imbalance)
    })
}

struct Arc {
    to: u32,
    capacity: u32,
}

/// Dinic-style unit-capacity maximum flow between two seed sets, returning
/// the source-side residual reachability as the cut.
fn max_flow_cut(graph: &FlowGraph, sources: &[u32], sinks: &[u32]) -> Cut {
    let n = graph.num_nodes();
    let source = n as u32;
    let sink = n as u32 + 1;

    let mut adjacency: Vec<Vec<u32>> = vec![Vec::new(); n + 2];
    let mut arcs: Vec<Arc> = Vec::new();
    let add_arc = |adjacency: &mut Vec<Vec<u32>>,
                       arcs: &mut Vec<Arc>,
                       from: u32,
                       to: u32,
                       capacity: u32| {
        adjacency[from as usize].push(arcs.len() as u32);
        arcs.push(Arc { to, capacity });
        adjacency[to as usize].push(arcs.len() as u32);
        arcs.push(Arc {
            to: from,
            capacity: 0,
        });
    };

    for node in 0..n as u32 {
        for &neighbor in graph.neighbors(node) {
            // Each undirected edge is added once, from its smaller endpoint,
            // as a unit-capacity arc in both directions.
            if node < neighbor {
                add_arc(&mut adjacency, &mut arcs, node, neighbor, 1);
                add_arc(&mut adjacency, &mut arcs, neighbor, node, 1);
            }
        }
    }
    for &seed in sources {
        add_arc(&mut adjacency, &mut arcs, source, seed, u32::MAX / 2);
    }
    for &seed in sinks {
        add_arc(&mut adjacency, &mut arcs, seed, sink, u32::MAX / 2);
    }

    let mut levels = vec![u32::MAX; n + 2];
    let mut iters = vec![0usize; n + 2];
    let mut queue = std::collections::VecDeque::new();
    let mut flow = 0usize;
    loop {
        // BFS phase: level graph over residual arcs.
        levels.fill(u32::MAX);
        levels[source as usize] = 0;
        queue.clear();
        queue.push_back(source);
        while let Some(node) = queue.pop_front() {
            for &arc_id in &adjacency[node as usize] {
                let arc = &arcs[arc_id as usize];
                if arc.capacity > 0 && levels[arc.to as usize] == u32::MAX {
                    levels[arc.to as usize] = levels[node as usize] + 1;
                    queue.push_back(arc.to);
                }
            }
        }
        if levels[sink as usize] == u32::MAX {
            break;
        }
        // DFS phase: augment unit paths along the level graph.
        iters.fill(0);
        while augment(&adjacency, &mut arcs, &levels, &mut iters, source, sink) {
            flow += 1;
        }
    }

    // The cut follows the residual reachability of the source side.
    let mut reachable = vec![false; n + 2];
    reachable[source as usize] = true;
    queue.clear();
    queue.push_back(source);
    while let Some(node) = queue.pop_front() {
        for &arc_id in &adjacency[node as usize] {
            let arc = &arcs[arc_id as usize];
            if arc.capacity > 0 && !reachable[arc.to as usize] {
                reachable[arc.to as usize] = true;
                queue.push_back(arc.to);
            }
        }
    }

    Cut {
        side: reachable[..n].to_vec(),
        num_edges: flow,
    }
}

fn augment(
    adjacency: &[Vec<u32>],
    arcs: &mut [Arc],
    levels: &[u32],
    iters: &mut [usize],
    node: u32,
    sink: u32,
) -> bool {
    if node == sink {
        return true;
    }
    while iters[node as usize] < adjacency[node as usize].len() {
        let arc_id = adjacency[node as usize][iters[node as usize]];
        let (to, capacity) = {
            let arc = &arcs[arc_id as usize];
            (arc.to, arc.capacity)
        };
        if capacity > 0 && levels[to as usize] == levels[node as usize] + 1 {
            if augment(adjacency, arcs, levels, iters, to, sink) {
                arcs[arc_id as usize].capacity -= 1;
                arcs[(arc_id ^ 1) as usize].capacity += 1;
                return true;
            }
        }
        iters[node as usize] += 1;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two 3-cliques joined by a single edge; coordinates put one clique to
    /// the west and the other to the east.
    fn dumbbell() -> (Vec<Coordinate>, FlowGraph) {
        let coordinates = vec![
            Coordinate::new(0, 0),
            Coordinate::new(0, 100),
            Coordinate::new(100, 50),
            Coordinate::new(900, 50),
            Coordinate::new(1_000, 0),
            Coordinate::new(1_000, 100),
        ];
        let edges: &[(u32, u32)] = &[(0, 1), (0, 2), (1, 2), (2, 3), (3, 4), (3, 5), (4, 5)];
        let mut lists: Vec<Vec<u32>> = vec![Vec::new(); 6];
        for &(u, v) in edges {
            lists[u as usize].push(v);
            lists[v as usize].push(u);
        }
        let mut first = vec![0u32];
        let mut neighbors = Vec::new();
        for list in lists {
            neighbors.extend(list);
            first.push(neighbors.len() as u32);
        }
        (coordinates, FlowGraph { first, neighbors })
    }

    #[test]
    fn bridge_cut_test() {
        let (coordinates, graph) = dumbbell();
        let cut = compute_cut(&coordinates, &graph, 1.2, 0.25, 4).unwrap();
        assert_eq!(cut.num_edges, 1);
        let left: Vec<_> = (0..6).filter(|&i| cut.side[i]).collect();
        let right: Vec<_> = (0..6).filter(|&i| !cut.side[i]).collect();
        assert_eq!(left.len(), 3);
        assert_eq!(right.len(), 3);
        assert!(left == vec![0, 1, 2] || left == vec![3, 4, 5]);
        assert!(right == vec![0, 1, 2] || right == vec![3, 4, 5]);
    }

    #[test]
    fn too_small_test() {
        let graph = FlowGraph {
            first: vec![0, 0],
            neighbors: vec![],
        };
        assert!(compute_cut(&[Coordinate::new(0, 0)], &graph, 1.2, 0.25, 4).is_none());
    }
}
