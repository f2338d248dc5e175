//! Graph algorithms for analysis

use petgraph::graphmap::UnGraphMap;

use crate::graph::NodeId;

/// Build a simple undirected graph from edge endpoints.
///
/// Self-loops are dropped and parallel edges collapse into one.
pub fn simple_graph<I>(edges: I) -> UnGraphMap<NodeId, ()>
where
    I: IntoIterator<Item = (NodeId, NodeId)>,
{
    let mut graph = UnGraphMap::new();
    for (a, b) in edges {
        if a != b {
            graph.add_edge(a, b, ());
        }
    }
    graph
}

/// Number of triangles in a simple undirected graph
pub fn triangle_count(graph: &UnGraphMap<NodeId, ()>) -> usize {
    closed_triples(graph) / 3
}

/// Global transitivity: `3 * triangles / connected triples`.
///
/// Returns 0 when the graph has no triangles.
pub fn transitivity<I>(edges: I) -> f64
where
    I: IntoIterator<Item = (NodeId, NodeId)>,
{
    let graph = simple_graph(edges);

    let closed = closed_triples(&graph);
    if closed == 0 {
        return 0.0;
    }

    // Connected triples centred on each node: d * (d - 1) / 2
    let triples: usize = graph
        .nodes()
        .map(|node| {
            let degree = graph.neighbors(node).count();
            degree * degree.saturating_sub(1) / 2
        })
        .sum();

    closed as f64 / triples as f64
}

/// Sum over nodes of the neighbour pairs that are themselves adjacent.
/// Each triangle is counted once at each of its three corners.
fn closed_triples(graph: &UnGraphMap<NodeId, ()>) -> usize {
    let mut closed = 0;
    for node in graph.nodes() {
        let neighbors: Vec<NodeId> = graph.neighbors(node).collect();
        for (i, &a) in neighbors.iter().enumerate() {
            for &b in &neighbors[i + 1..] {
                if graph.contains_edge(a, b) {
                    closed += 1;
                }
            }
        }
    }
    closed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triangle_is_fully_transitive() {
        assert!((transitivity(vec![(0, 1), (1, 2), (0, 2)]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_path_has_zero_transitivity() {
        assert_eq!(transitivity(vec![(0, 1), (1, 2), (2, 3)]), 0.0);
        assert_eq!(transitivity(Vec::new()), 0.0);
    }

    #[test]
    fn test_triangle_with_tail() {
        // one triangle, triples: node 0 -> 1, node 1 -> 1, node 2 -> 3, node 3 -> 0
        let edges = vec![(0, 1), (1, 2), (0, 2), (2, 3)];
        assert!((transitivity(edges.clone()) - 0.6).abs() < 1e-12);
        assert_eq!(triangle_count(&simple_graph(edges)), 1);
    }

    #[test]
    fn test_self_loops_and_duplicates_ignored() {
        let edges = vec![(0, 1), (1, 0), (1, 2), (0, 2), (2, 2)];
        assert!((transitivity(edges) - 1.0).abs() < 1e-12);
    }
}
