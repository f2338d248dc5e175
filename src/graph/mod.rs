//! Graph representation and derived graph properties

pub mod algorithms;
pub mod builder;

pub use builder::GraphBuilder;

use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::cache::PropertyCache;
use crate::error::{Error, Result};

/// Node identifier as it appears in the edge and assignment tables
pub type NodeId = u64;

const NODES: &str = "nodes";
const UNWEIGHTED_DEGREES: &str = "unweighted_degrees";
const WEIGHTED_DEGREES: &str = "weighted_degrees";
const TOTAL_WEIGHT: &str = "total_weight";

/// A single row of the edge table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub src: NodeId,
    pub dest: NodeId,
    /// Always 1.0 on unweighted graphs
    pub weight: f64,
}

impl Edge {
    pub fn new(src: NodeId, dest: NodeId, weight: f64) -> Self {
        Self { src, dest, weight }
    }

    pub fn is_self_loop(&self) -> bool {
        self.src == self.dest
    }
}

/// Immutable edge table with lazily computed degree and weight aggregates.
///
/// Undirected edges are held in canonical orientation (`src <= dest`). On an
/// unweighted graph every weight is 1.0, so weight-based metrics apply to both
/// kinds of graph.
#[derive(Debug)]
pub struct GraphView {
    name: String,
    directed: bool,
    weighted: bool,
    edges: Vec<Edge>,
    cache: PropertyCache,
}

impl GraphView {
    /// Wrap an edge table. Weights must be finite and non-negative.
    pub fn new(directed: bool, weighted: bool, mut edges: Vec<Edge>) -> Result<Self> {
        for edge in &mut edges {
            if weighted {
                if !edge.weight.is_finite() || edge.weight < 0.0 {
                    return Err(Error::InvalidGraph(format!(
                        "edge ({}, {}) has invalid weight {}",
                        edge.src, edge.dest, edge.weight
                    )));
                }
            } else {
                edge.weight = 1.0;
            }

            if !directed && edge.src > edge.dest {
                std::mem::swap(&mut edge.src, &mut edge.dest);
            }
        }

        Ok(Self {
            name: String::from("graph"),
            directed,
            weighted,
            edges,
            cache: PropertyCache::new(),
        })
    }

    /// Unweighted graph from `(src, dest)` rows
    pub fn from_rows<I>(directed: bool, rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = (NodeId, NodeId)>,
    {
        let edges = rows
            .into_iter()
            .map(|(src, dest)| Edge::new(src, dest, 1.0))
            .collect();
        Self::new(directed, false, edges)
    }

    /// Weighted graph from `(src, dest, weight)` rows
    pub fn from_weighted_rows<I>(directed: bool, rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = (NodeId, NodeId, f64)>,
    {
        let edges = rows
            .into_iter()
            .map(|(src, dest, weight)| Edge::new(src, dest, weight))
            .collect();
        Self::new(directed, true, edges)
    }

    /// Attach a dataset name used in log lines and snapshot file names
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_directed(&self) -> bool {
        self.directed
    }

    pub fn is_weighted(&self) -> bool {
        self.weighted
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Weight of `edge` as seen by this graph: 1.0 unless the graph is weighted
    pub fn weight(&self, edge: &Edge) -> f64 {
        if self.weighted {
            edge.weight
        } else {
            1.0
        }
    }

    /// Distinct node ids across both edge columns, sorted
    pub fn nodes(&self) -> Rc<Vec<NodeId>> {
        self.cache.get_or_compute(NODES, || {
            let nodes: BTreeSet<NodeId> = self
                .edges
                .iter()
                .flat_map(|e| [e.src, e.dest])
                .collect();
            nodes.into_iter().collect()
        })
    }

    pub fn num_vertices(&self) -> usize {
        self.nodes().len()
    }

    /// Number of incident edge endpoints per node (self-loops count twice)
    pub fn unweighted_degrees(&self) -> Rc<HashMap<NodeId, usize>> {
        self.cache.get_or_compute(UNWEIGHTED_DEGREES, || {
            let mut degrees = HashMap::with_capacity(self.edges.len());
            for node in self.endpoints().map(|(node, _)| node) {
                *degrees.entry(node).or_insert(0) += 1;
            }
            degrees
        })
    }

    /// Sum of incident edge weights per node (self-loops count twice)
    pub fn weighted_degrees(&self) -> Rc<HashMap<NodeId, f64>> {
        self.cache.get_or_compute(WEIGHTED_DEGREES, || {
            let mut degrees = HashMap::with_capacity(self.edges.len());
            for (node, weight) in self.endpoints() {
                *degrees.entry(node).or_insert(0.0) += weight;
            }
            degrees
        })
    }

    /// Sum of edge weights (edge count on unweighted graphs)
    pub fn total_weight(&self) -> f64 {
        *self
            .cache
            .get_or_compute(TOTAL_WEIGHT, || self.edges.iter().map(|e| e.weight).sum::<f64>())
    }

    /// Sum of weighted degrees over all nodes, i.e. twice the total weight
    pub fn total_weighted_degree(&self) -> f64 {
        2.0 * self.total_weight()
    }

    /// `2E / (N(N-1))`, using the undirected formula for every graph
    pub fn density(&self) -> Result<f64> {
        let n = self.require_vertices("density")? as f64;
        if self.directed {
            log::warn!(
                "[{}] density of a directed graph computed with the undirected formula",
                self.name
            );
        }
        Ok(2.0 * self.num_edges() as f64 / (n * (n - 1.0)))
    }

    /// Vertex count, failing when it is too small to divide by `N - 1`
    pub(crate) fn require_vertices(&self, metric: &str) -> Result<usize> {
        let n = self.num_vertices();
        if n <= 1 {
            return Err(Error::InvalidGraph(format!(
                "{} needs at least 2 vertices, graph {} has {}",
                metric, self.name, n
            )));
        }
        Ok(n)
    }

    /// `(src, weight)` projection followed by the `(dest, weight)` projection
    fn endpoints(&self) -> impl Iterator<Item = (NodeId, f64)> + '_ {
        self.edges
            .iter()
            .map(|e| (e.src, e.weight))
            .chain(self.edges.iter().map(|e| (e.dest, e.weight)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_triangles() -> GraphView {
        GraphView::from_rows(false, vec![(0, 1), (1, 2), (0, 2), (3, 4), (4, 5), (3, 5)]).unwrap()
    }

    #[test]
    fn test_counts_and_density() {
        let graph = two_triangles();
        assert_eq!(graph.num_edges(), 6);
        assert_eq!(graph.num_vertices(), 6);
        assert!((graph.density().unwrap() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_degrees() {
        let graph = GraphView::from_weighted_rows(false, vec![(0, 1, 2.0), (1, 2, 0.5), (2, 2, 1.0)]).unwrap();

        let unweighted = graph.unweighted_degrees();
        assert_eq!(unweighted[&0], 1);
        assert_eq!(unweighted[&1], 2);
        assert_eq!(unweighted[&2], 3);

        let weighted = graph.weighted_degrees();
        assert!((weighted[&1] - 2.5).abs() < 1e-12);
        assert!((weighted[&2] - 2.5).abs() < 1e-12);

        let degree_sum: f64 = weighted.values().sum();
        assert!((degree_sum - graph.total_weighted_degree()).abs() < 1e-12);
    }

    #[test]
    fn test_unweighted_graph_reads_unit_weights() {
        let edges = vec![Edge::new(2, 1, 7.0)];
        let graph = GraphView::new(false, false, edges).unwrap();
        assert_eq!(graph.edges()[0], Edge::new(1, 2, 1.0));
        assert_eq!(graph.total_weight(), 1.0);
        assert_eq!(graph.weight(&Edge::new(1, 2, 7.0)), 1.0);
    }

    #[test]
    fn test_directed_edges_keep_orientation() {
        let graph = GraphView::from_rows(true, vec![(5, 1)]).unwrap();
        assert_eq!(graph.edges()[0].src, 5);
        // still computed, with a warning
        assert!((graph.density().unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_density_needs_two_vertices() {
        let graph = GraphView::from_rows(false, vec![(3, 3)]).unwrap();
        assert!(matches!(graph.density(), Err(Error::InvalidGraph(_))));

        let empty = GraphView::from_rows(false, Vec::new()).unwrap();
        assert!(matches!(empty.density(), Err(Error::InvalidGraph(_))));
    }

    #[test]
    fn test_invalid_weight_rejected() {
        let result = GraphView::from_weighted_rows(false, vec![(0, 1, f64::NAN)]);
        assert!(matches!(result, Err(Error::InvalidGraph(_))));

        let result = GraphView::from_weighted_rows(false, vec![(0, 1, -1.0)]);
        assert!(matches!(result, Err(Error::InvalidGraph(_))));
    }

    #[test]
    fn test_degrees_are_cached() {
        let graph = two_triangles();
        let first = graph.weighted_degrees();
        let second = graph.weighted_degrees();
        assert!(Rc::ptr_eq(&first, &second));
    }
}
