//! Cluster quality metrics over a graph and a clustering
//!
//! An edge is *internal* to a cluster when both endpoints belong to it and
//! *cut* for a cluster when exactly one endpoint does. An unassigned endpoint
//! lies outside every cluster, so edges towards it count in the cut. Internal
//! edges add `2w` to the cluster's intra weight (one `w` per endpoint degree)
//! and cut edges add `w` to its out weight, which keeps
//! `intra_c + out_c == Σ_{v in c} weighted_degree(v)` for every cluster.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::cache::PropertyCache;
use crate::cluster::{ClusterId, ClusterView};
use crate::error::{Error, Result};
use crate::graph::{algorithms, GraphView, NodeId};

/// Per-cluster metric values, ordered by cluster id
pub type ClusterScores = BTreeMap<ClusterId, f64>;

const EDGE_AGGREGATES: &str = "edge_aggregates";
const SUM_WEIGHTED_DEGREES: &str = "cluster_sum_weighted_degrees";
const MODULARITY: &str = "modularity";
const MODULARITY_EDGE_FORM: &str = "modularity_edge_form";
const CONDUCTANCE: &str = "conductance";
const NORMALIZED_CUT: &str = "normalized_cut";
const EXPANSION: &str = "expansion";
const CUT_RATIO: &str = "cut_ratio";
const INTRA_DENSITY: &str = "intra_cluster_density";
const INTER_DENSITY: &str = "inter_cluster_density";
const SEPARABILITY: &str = "separability";
const OUT_DEGREE_FRACTION: &str = "out_degree_fraction";
const CLUSTERING_COEFFICIENT: &str = "clustering_coefficient";

/// Out-degree fraction summary of one cluster
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OdfStats {
    /// Largest member ODF
    pub max: f64,
    /// Mean member ODF
    pub avg: f64,
    /// Fraction of members with more weight leaving the cluster than staying
    pub flake: f64,
}

/// Scalar summary of every quality metric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub graph: String,
    pub clustering: String,
    pub num_vertices: usize,
    pub num_edges: usize,
    pub num_clusters: usize,
    pub is_overlap: bool,
    pub density: f64,
    pub modularity: f64,
    pub conductance: f64,
    pub normalized_cut: f64,
    /// `None` on weighted graphs
    pub expansion: Option<f64>,
    /// `None` on weighted graphs
    pub cut_ratio: Option<f64>,
    pub intra_cluster_density: f64,
    pub inter_cluster_density: f64,
    pub separability: f64,
    pub max_odf: f64,
    pub avg_odf: f64,
    pub flake_odf: f64,
    pub clustering_coefficient: f64,
}

/// One-pass edge accumulators shared by most metrics
#[derive(Debug, Default)]
struct EdgeAggregates {
    /// `2w` per internal edge
    intra_weights: Rc<ClusterScores>,
    /// `w` per cut edge
    out_weights: Rc<ClusterScores>,
    /// `w` per internal edge
    internal_weights: ClusterScores,
    /// Internal edges excluding self-loops
    intra_edges: BTreeMap<ClusterId, usize>,
    /// Edges whose endpoints share no cluster, excluding self-loops
    inter_edges: usize,
}

/// Quality metrics of one clustering on one graph.
///
/// Every value is computed on first use and kept for the lifetime of the
/// instance. Both views must outlive it.
pub struct GraphClusterMetrics<'a> {
    graph: &'a GraphView,
    clustering: &'a ClusterView,
    cache: PropertyCache,
}

impl<'a> GraphClusterMetrics<'a> {
    pub fn new(graph: &'a GraphView, clustering: &'a ClusterView) -> Self {
        Self {
            graph,
            clustering,
            cache: PropertyCache::new(),
        }
    }

    pub fn graph(&self) -> &GraphView {
        self.graph
    }

    pub fn clustering(&self) -> &ClusterView {
        self.clustering
    }

    /// Member count per cluster
    pub fn cluster_sizes(&self) -> Result<Rc<BTreeMap<ClusterId, usize>>> {
        self.clustering.cluster_sizes()
    }

    /// Twice the weight of each cluster's internal edges
    pub fn cluster_sum_intra_weights(&self) -> Result<Rc<ClusterScores>> {
        Ok(Rc::clone(&self.edge_aggregates()?.intra_weights))
    }

    /// Weight of the edges crossing each cluster's boundary
    pub fn cluster_out_sum_weights(&self) -> Result<Rc<ClusterScores>> {
        Ok(Rc::clone(&self.edge_aggregates()?.out_weights))
    }

    /// Sum of member weighted degrees per cluster
    pub fn cluster_sum_weighted_degrees(&self) -> Result<Rc<ClusterScores>> {
        let members = self.clustering.members()?;
        let degrees = self.graph.weighted_degrees();
        Ok(self.cache.get_or_compute(SUM_WEIGHTED_DEGREES, || {
            members
                .iter()
                .map(|(cluster, nodes)| {
                    let total = nodes.iter().filter_map(|node| degrees.get(node)).sum::<f64>();
                    (cluster.clone(), total)
                })
                .collect()
        }))
    }

    /// Weighted modularity `Σ_c intra_c / W - Σ_c (deg_c / W)²`
    pub fn modularity(&self) -> Result<f64> {
        let q = self.cache.try_get_or_compute(MODULARITY, || {
            let total = self.require_weight("modularity")?;
            let intra = self.cluster_sum_intra_weights()?;
            let degrees = self.cluster_sum_weighted_degrees()?;

            let covered: f64 = intra.values().sum::<f64>() / total;
            let expected: f64 = degrees.values().map(|d| (d / total).powi(2)).sum();
            Ok::<f64, Error>(covered - expected)
        })?;
        Ok(*q)
    }

    /// Modularity from edge weights counted once: `Σ_c [L_c/m - (deg_c/2m)²]`.
    ///
    /// Agrees with [`modularity`](Self::modularity); kept as an independent
    /// derivation of the same quantity.
    pub fn modularity_edge_form(&self) -> Result<f64> {
        let q = self.cache.try_get_or_compute(MODULARITY_EDGE_FORM, || {
            self.require_weight("modularity")?;
            let m = self.graph.total_weight();
            let aggregates = self.edge_aggregates()?;
            let degrees = self.cluster_sum_weighted_degrees()?;

            let q = degrees
                .iter()
                .map(|(cluster, degree)| {
                    let internal = aggregates.internal_weights.get(cluster).copied().unwrap_or(0.0);
                    internal / m - (degree / (2.0 * m)).powi(2)
                })
                .sum::<f64>();
            Ok::<f64, Error>(q)
        })?;
        Ok(*q)
    }

    /// `cut_c / (cut_c + intra_c)`, 0 for clusters without incident weight
    pub fn conductance(&self) -> Result<Rc<ClusterScores>> {
        let aggregates = self.edge_aggregates()?;
        Ok(self.cache.get_or_compute(CONDUCTANCE, || {
            zip_scores(&aggregates.out_weights, &aggregates.intra_weights, |cut, intra| {
                ratio_or_zero(cut, cut + intra)
            })
        }))
    }

    /// `cut_c/(cut_c+intra_c) + cut_c/(cut_c+W-intra_c)`
    pub fn normalized_cut(&self) -> Result<Rc<ClusterScores>> {
        let aggregates = self.edge_aggregates()?;
        let total = self.graph.total_weighted_degree();
        Ok(self.cache.get_or_compute(NORMALIZED_CUT, || {
            zip_scores(&aggregates.out_weights, &aggregates.intra_weights, |cut, intra| {
                ratio_or_zero(cut, cut + intra) + ratio_or_zero(cut, cut + total - intra)
            })
        }))
    }

    /// Cut edges per member node (unweighted graphs only)
    pub fn expansion(&self) -> Result<Rc<ClusterScores>> {
        self.require_unweighted("expansion")?;
        let aggregates = self.edge_aggregates()?;
        let sizes = self.clustering.cluster_sizes()?;
        Ok(self.cache.get_or_compute(EXPANSION, || {
            sizes
                .iter()
                .map(|(cluster, &size)| {
                    let cut = aggregates.out_weights.get(cluster).copied().unwrap_or(0.0);
                    (cluster.clone(), cut / size as f64)
                })
                .collect()
        }))
    }

    /// Cut edges over possible boundary pairs `size_c * (N - size_c)`
    /// (unweighted graphs only)
    pub fn cut_ratio(&self) -> Result<Rc<ClusterScores>> {
        self.require_unweighted("cut_ratio")?;
        let n = self.graph.require_vertices("cut_ratio")? as f64;
        let aggregates = self.edge_aggregates()?;
        let sizes = self.clustering.cluster_sizes()?;
        Ok(self.cache.get_or_compute(CUT_RATIO, || {
            sizes
                .iter()
                .map(|(cluster, &size)| {
                    let size = size as f64;
                    let cut = aggregates.out_weights.get(cluster).copied().unwrap_or(0.0);
                    (cluster.clone(), ratio_or_zero(cut, size * (n - size)))
                })
                .collect()
        }))
    }

    /// `2 * edges_c / (size_c * (size_c - 1))`, exactly 0 for clusters of size <= 1
    pub fn intra_cluster_density(&self) -> Result<Rc<ClusterScores>> {
        let aggregates = self.edge_aggregates()?;
        let sizes = self.clustering.cluster_sizes()?;
        Ok(self.cache.get_or_compute(INTRA_DENSITY, || {
            sizes
                .iter()
                .map(|(cluster, &size)| {
                    let edges = aggregates.intra_edges.get(cluster).copied().unwrap_or(0) as f64;
                    let density = if size <= 1 {
                        0.0
                    } else {
                        2.0 * edges / (size as f64 * (size as f64 - 1.0))
                    };
                    (cluster.clone(), density)
                })
                .collect()
        }))
    }

    /// Mean of [`intra_cluster_density`](Self::intra_cluster_density) over clusters
    pub fn mean_intra_cluster_density(&self) -> Result<f64> {
        Ok(nan_safe_mean(self.intra_cluster_density()?.values()))
    }

    /// Inter-cluster edges over node pairs not inside a common cluster
    pub fn inter_cluster_density(&self) -> Result<f64> {
        let density = self.cache.try_get_or_compute(INTER_DENSITY, || {
            let n = self.graph.require_vertices("inter_cluster_density")? as f64;
            let aggregates = self.edge_aggregates()?;
            let sizes = self.clustering.cluster_sizes()?;

            let intra_pairs: f64 = sizes
                .values()
                .map(|&size| size as f64 * (size as f64 - 1.0) / 2.0)
                .sum();
            let pairs = n * (n - 1.0) / 2.0 - intra_pairs;
            let density = if pairs > 0.0 {
                aggregates.inter_edges as f64 / pairs
            } else {
                0.0
            };
            Ok::<f64, Error>(density)
        })?;
        Ok(*density)
    }

    /// `intra_c / cut_c`: infinite for isolated clusters, NaN without any incident weight
    pub fn separability(&self) -> Result<Rc<ClusterScores>> {
        let aggregates = self.edge_aggregates()?;
        Ok(self.cache.get_or_compute(SEPARABILITY, || {
            zip_scores(&aggregates.out_weights, &aggregates.intra_weights, |cut, intra| {
                if cut == 0.0 {
                    if intra > 0.0 {
                        f64::INFINITY
                    } else {
                        f64::NAN
                    }
                } else {
                    intra / cut
                }
            })
        }))
    }

    /// Max, mean and flake out-degree fraction per cluster.
    ///
    /// A member's ODF is the share of its incident weight leaving the cluster.
    /// Members without incident weight are left out of max and mean and never
    /// count as flake.
    pub fn out_degree_fraction(&self) -> Result<Rc<BTreeMap<ClusterId, OdfStats>>> {
        let members = self.clustering.members()?;
        let memberships = self.clustering.node_clusters()?;
        Ok(self.cache.get_or_compute(OUT_DEGREE_FRACTION, || {
            log::debug!("[{}] computing out-degree fractions", self.clustering.name());

            // (intra, inter) incident weight per member, per cluster
            let mut tallies: BTreeMap<ClusterId, HashMap<NodeId, (f64, f64)>> = members
                .iter()
                .map(|(cluster, nodes)| {
                    (cluster.clone(), nodes.iter().map(|&node| (node, (0.0, 0.0))).collect())
                })
                .collect();

            for edge in self.graph.edges() {
                for (node, other) in [(edge.src, edge.dest), (edge.dest, edge.src)] {
                    let Some(clusters) = memberships.get(&node) else {
                        continue;
                    };
                    let other_clusters = memberships.get(&other);
                    for cluster in clusters {
                        let inside = other_clusters
                            .map_or(false, |others| others.binary_search(cluster).is_ok());
                        if let Some(tally) = tallies.get_mut(cluster).and_then(|t| t.get_mut(&node)) {
                            if inside {
                                tally.0 += edge.weight;
                            } else {
                                tally.1 += edge.weight;
                            }
                        }
                    }
                }
            }

            tallies
                .into_iter()
                .map(|(cluster, nodes)| {
                    let odfs: Vec<f64> = nodes
                        .values()
                        .filter(|(intra, inter)| intra + inter > 0.0)
                        .map(|(intra, inter)| inter / (intra + inter))
                        .collect();
                    let flakes = nodes.values().filter(|(intra, inter)| inter > intra).count();

                    let stats = OdfStats {
                        max: odfs.iter().copied().reduce(f64::max).unwrap_or(f64::NAN),
                        avg: nan_safe_mean(&odfs),
                        flake: flakes as f64 / nodes.len() as f64,
                    };
                    (cluster, stats)
                })
                .collect()
        }))
    }

    /// Transitivity of each cluster's internal edges
    pub fn clustering_coefficient(&self) -> Result<Rc<ClusterScores>> {
        let members = self.clustering.members()?;
        let memberships = self.clustering.node_clusters()?;
        Ok(self.cache.get_or_compute(CLUSTERING_COEFFICIENT, || {
            let mut internal: BTreeMap<&ClusterId, Vec<(NodeId, NodeId)>> =
                members.keys().map(|cluster| (cluster, Vec::new())).collect();

            for edge in self.graph.edges().iter().filter(|e| !e.is_self_loop()) {
                let (Some(src), Some(dest)) = (memberships.get(&edge.src), memberships.get(&edge.dest)) else {
                    continue;
                };
                for cluster in src.iter().filter(|c| dest.binary_search(c).is_ok()) {
                    if let Some(edges) = internal.get_mut(cluster) {
                        edges.push((edge.src, edge.dest));
                    }
                }
            }

            internal
                .into_iter()
                .map(|(cluster, edges)| (cluster.clone(), algorithms::transitivity(edges)))
                .collect()
        }))
    }

    /// Scalar summary: modularity plus the NaN-safe mean of every per-cluster metric
    pub fn quality_report(&self) -> Result<QualityReport> {
        log::info!(
            "Evaluating clustering {} on graph {}",
            self.clustering.name(),
            self.graph.name()
        );

        let odf = self.out_degree_fraction()?;
        let report = QualityReport {
            graph: self.graph.name().to_string(),
            clustering: self.clustering.name().to_string(),
            num_vertices: self.graph.num_vertices(),
            num_edges: self.graph.num_edges(),
            num_clusters: self.clustering.num_clusters()?,
            is_overlap: self.clustering.is_overlap()?,
            density: self.graph.density()?,
            modularity: self.modularity()?,
            conductance: nan_safe_mean(self.conductance()?.values()),
            normalized_cut: nan_safe_mean(self.normalized_cut()?.values()),
            expansion: unless_unsupported(self.expansion())?.map(|s| nan_safe_mean(s.values())),
            cut_ratio: unless_unsupported(self.cut_ratio())?.map(|s| nan_safe_mean(s.values())),
            intra_cluster_density: self.mean_intra_cluster_density()?,
            inter_cluster_density: self.inter_cluster_density()?,
            separability: nan_safe_mean(self.separability()?.values()),
            max_odf: nan_safe_mean(odf.values().map(|s| &s.max)),
            avg_odf: nan_safe_mean(odf.values().map(|s| &s.avg)),
            flake_odf: nan_safe_mean(odf.values().map(|s| &s.flake)),
            clustering_coefficient: nan_safe_mean(self.clustering_coefficient()?.values()),
        };

        log::info!("Modularity {:.4}, mean conductance {:.4}", report.modularity, report.conductance);
        Ok(report)
    }

    fn edge_aggregates(&self) -> Result<Rc<EdgeAggregates>> {
        let sizes = self.clustering.cluster_sizes()?;
        let memberships = self.clustering.node_clusters()?;
        Ok(self.cache.get_or_compute(EDGE_AGGREGATES, || {
            log::debug!(
                "[{}] aggregating {} edges over {} clusters",
                self.clustering.name(),
                self.graph.num_edges(),
                sizes.len()
            );

            let zeros: ClusterScores = sizes.keys().map(|c| (c.clone(), 0.0)).collect();
            let mut intra_weights = zeros.clone();
            let mut out_weights = zeros.clone();
            let mut internal_weights = zeros;
            let mut intra_edges: BTreeMap<ClusterId, usize> = sizes.keys().map(|c| (c.clone(), 0)).collect();
            let mut inter_edges = 0;

            let unassigned: Vec<ClusterId> = Vec::new();
            for edge in self.graph.edges() {
                let src = memberships.get(&edge.src).unwrap_or(&unassigned);
                let dest = memberships.get(&edge.dest).unwrap_or(&unassigned);
                let mut shared = false;

                for cluster in src {
                    if dest.binary_search(cluster).is_ok() {
                        shared = true;
                        add(&mut intra_weights, cluster, 2.0 * edge.weight);
                        add(&mut internal_weights, cluster, edge.weight);
                        if !edge.is_self_loop() {
                            if let Some(count) = intra_edges.get_mut(cluster) {
                                *count += 1;
                            }
                        }
                    } else {
                        add(&mut out_weights, cluster, edge.weight);
                    }
                }
                for cluster in dest.iter().filter(|c| src.binary_search(c).is_err()) {
                    add(&mut out_weights, cluster, edge.weight);
                }

                if !shared && !edge.is_self_loop() {
                    inter_edges += 1;
                }
            }

            EdgeAggregates {
                intra_weights: Rc::new(intra_weights),
                out_weights: Rc::new(out_weights),
                internal_weights,
                intra_edges,
                inter_edges,
            }
        }))
    }

    /// Total weighted degree, failing when there is none to normalize by
    fn require_weight(&self, metric: &str) -> Result<f64> {
        let total = self.graph.total_weighted_degree();
        if total <= 0.0 {
            return Err(Error::InvalidGraph(format!(
                "{} needs positive total edge weight, graph {} has {}",
                metric,
                self.graph.name(),
                total
            )));
        }
        Ok(total)
    }

    fn require_unweighted(&self, metric: &'static str) -> Result<()> {
        if self.graph.is_weighted() {
            return Err(Error::unsupported(metric, "defined for unweighted graphs only"));
        }
        Ok(())
    }
}

/// Arithmetic mean of the finite values; NaN when there are none
pub fn nan_safe_mean<'v, I>(values: I) -> f64
where
    I: IntoIterator<Item = &'v f64>,
{
    let (sum, count) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

fn add(scores: &mut ClusterScores, cluster: &ClusterId, value: f64) {
    if let Some(score) = scores.get_mut(cluster) {
        *score += value;
    }
}

fn ratio_or_zero(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

fn zip_scores<F>(cut: &ClusterScores, intra: &ClusterScores, f: F) -> ClusterScores
where
    F: Fn(f64, f64) -> f64,
{
    cut.iter()
        .map(|(cluster, &cut)| {
            let intra = intra.get(cluster).copied().unwrap_or(0.0);
            (cluster.clone(), f(cut, intra))
        })
        .collect()
}

fn unless_unsupported<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(Error::UnsupportedMetric { .. }) => Ok(None),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn two_triangles() -> GraphView {
        GraphView::from_rows(false, vec![(0, 1), (1, 2), (0, 2), (3, 4), (4, 5), (3, 5)]).unwrap()
    }

    fn bridged_triangles() -> GraphView {
        GraphView::from_rows(false, vec![(0, 1), (1, 2), (0, 2), (2, 3), (3, 4), (4, 5), (3, 5)]).unwrap()
    }

    fn halves() -> ClusterView {
        ClusterView::from_rows(vec![(0, 0), (1, 0), (2, 0), (3, 1), (4, 1), (5, 1)])
    }

    fn score(scores: &ClusterScores, cluster: i64) -> f64 {
        scores[&ClusterId::Int(cluster)]
    }

    #[test]
    fn test_two_triangles_scenario() {
        let graph = two_triangles();
        let clustering = halves();
        let metrics = GraphClusterMetrics::new(&graph, &clustering);

        assert!((metrics.modularity().unwrap() - 0.5).abs() < EPS);

        let conductance = metrics.conductance().unwrap();
        assert_eq!(score(&conductance, 0), 0.0);
        assert_eq!(score(&conductance, 1), 0.0);

        let density = metrics.intra_cluster_density().unwrap();
        assert!((score(&density, 0) - 1.0).abs() < EPS);
        assert!((score(&density, 1) - 1.0).abs() < EPS);

        let cc = metrics.clustering_coefficient().unwrap();
        assert!((score(&cc, 0) - 1.0).abs() < EPS);
        assert!((score(&cc, 1) - 1.0).abs() < EPS);

        assert_eq!(metrics.inter_cluster_density().unwrap(), 0.0);
    }

    #[test]
    fn test_single_cluster_has_zero_modularity() {
        let graph = two_triangles();
        let clustering = ClusterView::from_rows((0..6).map(|node| (node, 0)));
        let metrics = GraphClusterMetrics::new(&graph, &clustering);

        assert!(metrics.modularity().unwrap().abs() < EPS);
        assert!(metrics.conductance().unwrap().values().all(|&c| c == 0.0));
    }

    #[test]
    fn test_bridged_triangles() {
        let graph = bridged_triangles();
        let clustering = halves();
        let metrics = GraphClusterMetrics::new(&graph, &clustering);

        assert!((metrics.modularity().unwrap() - 5.0 / 14.0).abs() < EPS);

        let conductance = metrics.conductance().unwrap();
        assert!((score(&conductance, 0) - 1.0 / 7.0).abs() < EPS);

        let ncut = metrics.normalized_cut().unwrap();
        assert!((score(&ncut, 1) - (1.0 / 7.0 + 1.0 / 9.0)).abs() < EPS);

        assert!((score(&metrics.expansion().unwrap(), 0) - 1.0 / 3.0).abs() < EPS);
        assert!((score(&metrics.cut_ratio().unwrap(), 0) - 1.0 / 9.0).abs() < EPS);
        assert!((score(&metrics.separability().unwrap(), 0) - 6.0).abs() < EPS);
        assert!((metrics.inter_cluster_density().unwrap() - 1.0 / 9.0).abs() < EPS);

        let odf = metrics.out_degree_fraction().unwrap();
        let left = odf[&ClusterId::Int(0)];
        assert!((left.max - 1.0 / 3.0).abs() < EPS);
        assert!((left.avg - 1.0 / 9.0).abs() < EPS);
        assert_eq!(left.flake, 0.0);
    }

    #[test]
    fn test_weight_conservation() {
        let graph = GraphView::from_weighted_rows(
            false,
            vec![(0, 1, 2.0), (1, 2, 1.0), (0, 2, 0.5), (2, 3, 3.0), (3, 4, 1.5), (4, 5, 2.5), (5, 5, 0.7)],
        )
        .unwrap();
        let clustering = ClusterView::from_rows(vec![(0, 0), (1, 0), (2, 1), (3, 1), (4, 2), (5, 2)]);
        let metrics = GraphClusterMetrics::new(&graph, &clustering);

        let intra: f64 = metrics.cluster_sum_intra_weights().unwrap().values().sum();
        let out: f64 = metrics.cluster_out_sum_weights().unwrap().values().sum();
        let degrees: f64 = graph.weighted_degrees().values().sum();
        assert!((intra + out - degrees).abs() < EPS);

        let per_cluster = metrics.cluster_sum_weighted_degrees().unwrap();
        let intra = metrics.cluster_sum_intra_weights().unwrap();
        let out = metrics.cluster_out_sum_weights().unwrap();
        for (cluster, degree) in per_cluster.iter() {
            assert!((intra[cluster] + out[cluster] - degree).abs() < EPS);
        }
    }

    #[test]
    fn test_modularity_forms_agree() {
        let graph = GraphView::from_weighted_rows(
            false,
            vec![
                (0, 1, 2.0),
                (1, 2, 1.0),
                (2, 0, 0.5),
                (2, 3, 3.0),
                (3, 4, 1.5),
                (4, 5, 2.5),
                (3, 5, 1.0),
                (5, 5, 0.7),
                (6, 0, 1.0),
            ],
        )
        .unwrap();
        let clustering = ClusterView::from_rows(vec![(0, 0), (1, 0), (2, 0), (3, 1), (4, 1), (5, 1)]);
        let metrics = GraphClusterMetrics::new(&graph, &clustering);

        let q = metrics.modularity().unwrap();
        assert!((q - metrics.modularity_edge_form().unwrap()).abs() < EPS);
    }

    #[test]
    fn test_modularity_relabel_invariant() {
        let graph = bridged_triangles();
        let original = halves();
        let relabelled = ClusterView::from_rows(vec![(0, "b"), (1, "b"), (2, "b"), (3, "a"), (4, "a"), (5, "a")]);

        let q1 = GraphClusterMetrics::new(&graph, &original).modularity().unwrap();
        let q2 = GraphClusterMetrics::new(&graph, &relabelled).modularity().unwrap();
        assert!((q1 - q2).abs() < EPS);
    }

    #[test]
    fn test_unassigned_nodes_lower_modularity() {
        let graph = two_triangles();
        let partial = ClusterView::from_rows(vec![(0, 0), (1, 0), (2, 0)]);
        let q = GraphClusterMetrics::new(&graph, &partial).modularity().unwrap();
        // 6/12 - (6/12)^2
        assert!((q - 0.25).abs() < EPS);
    }

    #[test]
    fn test_singleton_cluster_density_is_zero() {
        let graph = bridged_triangles();
        let clustering = ClusterView::from_rows(vec![(0, 0), (1, 0), (2, 0), (3, 1), (4, 2), (5, 2)]);
        let metrics = GraphClusterMetrics::new(&graph, &clustering);

        let density = metrics.intra_cluster_density().unwrap();
        assert_eq!(score(&density, 1), 0.0);
        assert!((score(&density, 2) - 1.0).abs() < EPS);

        for &c in metrics.conductance().unwrap().values() {
            assert!((0.0..=1.0).contains(&c));
        }
    }

    #[test]
    fn test_overlapping_clusters() {
        let graph = GraphView::from_rows(false, vec![(0, 1), (1, 2)]).unwrap();
        let clustering = ClusterView::from_rows(vec![(0, "a"), (1, "a"), (1, "b"), (2, "b")]);
        let metrics = GraphClusterMetrics::new(&graph, &clustering);

        let intra = metrics.cluster_sum_intra_weights().unwrap();
        let out = metrics.cluster_out_sum_weights().unwrap();
        let a = ClusterId::from("a");
        assert_eq!(intra[&a], 2.0);
        assert_eq!(out[&a], 1.0);
        assert_eq!(metrics.cluster_sum_weighted_degrees().unwrap()[&a], 3.0);
    }

    #[test]
    fn test_weighted_graph_rejects_cut_ratio() {
        let graph = GraphView::from_weighted_rows(false, vec![(0, 1, 1.0), (1, 2, 2.0)]).unwrap();
        let clustering = ClusterView::from_rows(vec![(0, 0), (1, 0), (2, 1)]);
        let metrics = GraphClusterMetrics::new(&graph, &clustering);

        assert!(matches!(metrics.cut_ratio(), Err(Error::UnsupportedMetric { .. })));
        assert!(matches!(metrics.expansion(), Err(Error::UnsupportedMetric { .. })));

        let report = metrics.quality_report().unwrap();
        assert!(report.cut_ratio.is_none());
        assert!(report.expansion.is_none());
    }

    #[test]
    fn test_isolated_cluster_separability() {
        let graph = two_triangles();
        let clustering = halves();
        let metrics = GraphClusterMetrics::new(&graph, &clustering);

        let separability = metrics.separability().unwrap();
        assert!(score(&separability, 0).is_infinite());
        assert!(nan_safe_mean(separability.values()).is_nan());
    }

    #[test]
    fn test_empty_graph_modularity_fails() {
        let graph = GraphView::from_rows(false, Vec::new()).unwrap();
        let clustering = ClusterView::from_rows(vec![(0, 0)]);
        let metrics = GraphClusterMetrics::new(&graph, &clustering);
        assert!(matches!(metrics.modularity(), Err(Error::InvalidGraph(_))));
    }

    #[test]
    fn test_quality_report() {
        let graph = bridged_triangles().with_name("bridge");
        let clustering = halves().with_name("halves");
        let report = GraphClusterMetrics::new(&graph, &clustering).quality_report().unwrap();

        assert_eq!(report.graph, "bridge");
        assert_eq!(report.num_clusters, 2);
        assert!(!report.is_overlap);
        assert!((report.conductance - 1.0 / 7.0).abs() < EPS);
        assert!((report.clustering_coefficient - 1.0).abs() < EPS);
        assert_eq!(report.expansion.map(|e| (e * 3.0).round()), Some(1.0));
    }

    #[test]
    fn test_nan_safe_mean() {
        assert_eq!(nan_safe_mean(&[1.0, f64::NAN, 3.0]), 2.0);
        assert!(nan_safe_mean(&[f64::NAN]).is_nan());
        assert!(nan_safe_mean(&Vec::<f64>::new()).is_nan());
    }
}
