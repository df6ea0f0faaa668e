//! Graph centrality over the materialized topology.
//!
//! The interface is deliberately narrow: callers hand in vertex ids and
//! edges, and get centrality maps back. Nothing else in the crate
//! touches the graph library.

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, VecDeque};

/// Centrality measures for one materialized topology.
///
/// Node maps are keyed by the caller's vertex ids; `edge_betweenness`
/// is positionally aligned with the input edge slice (edges whose
/// endpoints are unknown vertices stay at 0).
#[derive(Debug, Default)]
pub struct Centrality {
    pub degree: HashMap<i64, i64>,
    pub node_betweenness: HashMap<i64, f64>,
    pub node_closeness: HashMap<i64, f64>,
    pub edge_betweenness: Vec<f64>,
}

/// Unweighted Brandes' betweenness (nodes and edges) plus standard
/// closeness. Betweenness is the fraction of shortest paths over all
/// unordered vertex pairs that pass through the node/edge; closeness is
/// the reciprocal of the mean shortest-path distance to reachable
/// vertices. Parallel edges each count as a distinct path.
pub fn compute(vertices: &[i64], edges: &[(i64, i64)]) -> Centrality {
    let mut graph: UnGraph<i64, usize> = UnGraph::new_undirected();
    let mut index: HashMap<i64, NodeIndex> = HashMap::new();
    for &v in vertices {
        index.entry(v).or_insert_with(|| graph.add_node(v));
    }
    for (position, &(a, b)) in edges.iter().enumerate() {
        if let (Some(&na), Some(&nb)) = (index.get(&a), index.get(&b)) {
            graph.add_edge(na, nb, position);
        }
    }

    let n = graph.node_count();
    let mut node_b = vec![0.0f64; n];
    let mut edge_b = vec![0.0f64; graph.edge_count()];
    let mut closeness = vec![0.0f64; n];

    for source in graph.node_indices() {
        // BFS shortest-path counting
        let mut order: Vec<NodeIndex> = Vec::new();
        let mut preds: Vec<Vec<(NodeIndex, usize)>> = vec![Vec::new(); n];
        let mut sigma = vec![0.0f64; n];
        let mut dist = vec![-1i64; n];
        sigma[source.index()] = 1.0;
        dist[source.index()] = 0;

        let mut queue = VecDeque::new();
        queue.push_back(source);
        while let Some(v) = queue.pop_front() {
            order.push(v);
            for edge in graph.edges(v) {
                let w = if edge.source() == v {
                    edge.target()
                } else {
                    edge.source()
                };
                if dist[w.index()] < 0 {
                    dist[w.index()] = dist[v.index()] + 1;
                    queue.push_back(w);
                }
                if dist[w.index()] == dist[v.index()] + 1 {
                    sigma[w.index()] += sigma[v.index()];
                    preds[w.index()].push((v, edge.id().index()));
                }
            }
        }

        // dependency accumulation, reverse BFS order
        let mut delta = vec![0.0f64; n];
        while let Some(w) = order.pop() {
            for &(v, edge_idx) in &preds[w.index()] {
                let share = sigma[v.index()] / sigma[w.index()] * (1.0 + delta[w.index()]);
                delta[v.index()] += share;
                edge_b[edge_idx] += share;
            }
            if w != source {
                node_b[w.index()] += delta[w.index()];
            }
        }

        // closeness from the same BFS distances
        let mut sum = 0i64;
        let mut reachable = 0i64;
        for d in &dist {
            if *d > 0 {
                sum += d;
                reachable += 1;
            }
        }
        closeness[source.index()] = if sum > 0 {
            reachable as f64 / sum as f64
        } else {
            0.0
        };
    }

    // each unordered pair was accumulated from both endpoints
    let nf = n as f64;
    let node_norm = if n > 2 {
        1.0 / ((nf - 1.0) * (nf - 2.0))
    } else {
        0.0
    };
    let edge_norm = if n > 1 { 1.0 / (nf * (nf - 1.0)) } else { 0.0 };

    let mut result = Centrality {
        edge_betweenness: vec![0.0; edges.len()],
        ..Centrality::default()
    };
    for v in graph.node_indices() {
        let id = graph[v];
        result.degree.insert(id, graph.edges(v).count() as i64);
        result
            .node_betweenness
            .insert(id, node_b[v.index()] * node_norm);
        result.node_closeness.insert(id, closeness[v.index()]);
    }
    for edge in graph.edge_indices() {
        if let Some(&position) = graph.edge_weight(edge) {
            result.edge_betweenness[position] = edge_b[edge.index()] * edge_norm;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn path_graph_centrality() {
        // 1 - 2 - 3
        let c = compute(&[1, 2, 3], &[(1, 2), (2, 3)]);

        assert_eq!(c.degree[&1], 1);
        assert_eq!(c.degree[&2], 2);

        // the only pair not involving 2 is (1,3), whose single shortest
        // path runs through 2
        assert!(close(c.node_betweenness[&2], 1.0));
        assert!(close(c.node_betweenness[&1], 0.0));

        // each edge lies on 2 of the 3 shortest paths
        assert!(close(c.edge_betweenness[0], 2.0 / 3.0));
        assert!(close(c.edge_betweenness[1], 2.0 / 3.0));

        // closeness: mean distance from 2 is 1, from 1 is 1.5
        assert!(close(c.node_closeness[&2], 1.0));
        assert!(close(c.node_closeness[&1], 2.0 / 3.0));
    }

    #[test]
    fn isolated_vertex_has_zero_measures() {
        let c = compute(&[1, 2, 3], &[(1, 2)]);
        assert_eq!(c.degree[&3], 0);
        assert!(close(c.node_closeness[&3], 0.0));
        assert!(close(c.node_betweenness[&3], 0.0));
    }

    #[test]
    fn parallel_edges_split_betweenness() {
        // two parallel links between 1 and 2, then 2 - 3
        let c = compute(&[1, 2, 3], &[(1, 2), (1, 2), (2, 3)]);

        assert_eq!(c.degree[&1], 2);
        assert_eq!(c.degree[&2], 3);

        // pairs (1,2) and (1,3) each have two shortest paths, one per
        // parallel edge; each parallel edge carries half of both
        assert!(close(c.edge_betweenness[0], c.edge_betweenness[1]));
        assert!(close(c.edge_betweenness[0] + c.edge_betweenness[1], 2.0 / 3.0));
        // node 2 still mediates the single (1,3) pair
        assert!(close(c.node_betweenness[&2], 1.0));
    }

    #[test]
    fn unknown_edge_endpoints_are_ignored() {
        let c = compute(&[1, 2], &[(1, 2), (1, 99)]);
        assert_eq!(c.degree[&1], 1);
        assert!(close(c.edge_betweenness[1], 0.0));
    }

    #[test]
    fn empty_graph() {
        let c = compute(&[], &[]);
        assert!(c.degree.is_empty());
        assert!(c.edge_betweenness.is_empty());
    }
}
