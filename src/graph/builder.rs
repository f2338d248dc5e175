//! Graph construction module

use crate::error::Result;
use crate::graph::{Edge, GraphView, NodeId};

/// Builder for incrementally constructing a [`GraphView`]
pub struct GraphBuilder {
    /// Dataset name
    name: String,

    /// Whether edges are directed
    directed: bool,

    /// Whether edge weights are meaningful
    weighted: bool,

    /// Both orientations of every undirected edge are present
    mirrored: bool,

    /// Edge rows in insertion order
    edges: Vec<Edge>,
}

impl GraphBuilder {
    /// Create a new graph builder
    pub fn new(directed: bool, weighted: bool) -> Self {
        Self::with_capacity(directed, weighted, 0)
    }

    /// Create a new graph builder with the given edge capacity
    pub fn with_capacity(directed: bool, weighted: bool, capacity: usize) -> Self {
        Self {
            name: String::from("graph"),
            directed,
            weighted,
            mirrored: false,
            edges: Vec::with_capacity(capacity),
        }
    }

    /// Set the dataset name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Declare that the input lists each undirected edge in both orientations
    pub fn mirrored(mut self, mirrored: bool) -> Self {
        self.mirrored = mirrored;
        self
    }

    /// Add an unweighted edge
    pub fn add_edge(&mut self, src: NodeId, dest: NodeId) {
        self.edges.push(Edge::new(src, dest, 1.0));
    }

    /// Add a weighted edge
    pub fn add_weighted_edge(&mut self, src: NodeId, dest: NodeId, weight: f64) {
        self.edges.push(Edge::new(src, dest, weight));
    }

    /// Number of edges added so far
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Build the graph view
    pub fn build(mut self) -> Result<GraphView> {
        if self.mirrored {
            if self.directed {
                log::warn!("[{}] mirrored flag ignored on a directed graph", self.name);
            } else {
                self.collapse_mirrored();
            }
        }

        log::debug!(
            "[{}] building graph with {} edges (directed: {}, weighted: {})",
            self.name,
            self.edges.len(),
            self.directed,
            self.weighted
        );

        Ok(GraphView::new(self.directed, self.weighted, self.edges)?.with_name(self.name))
    }

    /// Keep one row per pair of opposite orientations.
    ///
    /// Rows are canonicalized to `src <= dest` first, so an edge listed in one
    /// orientation only is kept too; such rows are counted and reported.
    /// Self-loops are listed once and kept as they are.
    fn collapse_mirrored(&mut self) {
        let before = self.edges.len();
        for edge in &mut self.edges {
            if edge.src > edge.dest {
                std::mem::swap(&mut edge.src, &mut edge.dest);
            }
        }
        self.edges.sort_by_key(|e| (e.src, e.dest));

        let mut collapsed = Vec::with_capacity(before / 2 + 1);
        let mut unpaired = 0;
        for rows in self.edges.chunk_by(|a, b| (a.src, a.dest) == (b.src, b.dest)) {
            if rows[0].is_self_loop() {
                collapsed.extend_from_slice(rows);
            } else {
                unpaired += rows.len() % 2;
                collapsed.extend_from_slice(&rows[..(rows.len() + 1) / 2]);
            }
        }

        if unpaired > 0 {
            log::warn!(
                "[{}] {} edges of a mirrored table appear in one orientation only",
                self.name,
                unpaired
            );
        }
        log::debug!(
            "[{}] collapsed mirrored edges: {} -> {}",
            self.name,
            before,
            collapsed.len()
        );
        self.edges = collapsed;
    }
}
