//! Pairwise comparison of two clusterings of the same nodes
//!
//! The first clustering is the ground truth. Partition measures (NMI, AMI,
//! ARS, completeness, ...) need a disjoint assignment over a common node set:
//! both sides are restricted to the nodes they share, and an overlapping
//! clustering is rejected instead of being forced into one label per node.
//! Overlap-aware measures go through external tools fed with CNL files.

pub mod external;
pub mod partition;

pub use external::ExternalTool;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::cache::PropertyCache;
use crate::cluster::{ClusterId, ClusterView};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::graph::NodeId;

const COMMON_NODES: &str = "common_nodes";
const CLEAN_TRUTH: &str = "clean_truth";
const CLEAN_PREDICTION: &str = "clean_prediction";
const ALIGNED_LABELS: &str = "aligned_labels";
const NMI: &str = "nmi";
const AMI: &str = "ami";
const ARS: &str = "ars";
const COMPLETENESS: &str = "completeness";
const HOMOGENEITY: &str = "homogeneity";
const V_MEASURE: &str = "v_measure";

/// Dense labels of both clusterings over their common nodes
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedLabels {
    pub nodes: Vec<NodeId>,
    pub truth: Vec<usize>,
    pub prediction: Vec<usize>,
}

/// Agreement between two clusterings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub truth: String,
    pub prediction: String,
    pub is_overlap: bool,
    pub common_nodes: usize,
    /// Partition measures are `None` when either side overlaps
    pub nmi: Option<f64>,
    pub ami: Option<f64>,
    pub ars: Option<f64>,
    pub completeness: Option<f64>,
    pub homogeneity: Option<f64>,
    pub v_measure: Option<f64>,
    /// Scores of external tools, by tool name
    pub external: BTreeMap<String, f64>,
}

/// Comparison of a ground-truth clustering with a predicted one
pub struct ClusterComparator<'a> {
    truth: &'a ClusterView,
    prediction: &'a ClusterView,
    config: Config,
    cache: PropertyCache,
}

impl<'a> ClusterComparator<'a> {
    pub fn new(truth: &'a ClusterView, prediction: &'a ClusterView) -> Self {
        Self {
            truth,
            prediction,
            config: Config::default(),
            cache: PropertyCache::new(),
        }
    }

    /// Use `config` for the CNL directory and external tool locations
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn truth(&self) -> &ClusterView {
        self.truth
    }

    pub fn prediction(&self) -> &ClusterView {
        self.prediction
    }

    /// Whether either clustering assigns a node to several clusters
    pub fn is_overlap(&self) -> Result<bool> {
        Ok(self.truth.is_overlap()? || self.prediction.is_overlap()?)
    }

    /// Nodes assigned on both sides, sorted
    pub fn common_nodes(&self) -> Result<Rc<Vec<NodeId>>> {
        let truth = self.truth.node_clusters()?;
        let prediction = self.prediction.node_clusters()?;
        Ok(self.cache.get_or_compute(COMMON_NODES, || {
            let mut common: Vec<NodeId> = truth
                .keys()
                .filter(|node| prediction.contains_key(node))
                .copied()
                .collect();
            common.sort_unstable();

            log::debug!(
                "{} common nodes ({} only in {}, {} only in {})",
                common.len(),
                truth.len() - common.len(),
                self.truth.name(),
                prediction.len() - common.len(),
                self.prediction.name()
            );
            common
        }))
    }

    /// Ground truth restricted to the common nodes
    pub fn clean_truth(&self) -> Result<Rc<ClusterView>> {
        self.cache
            .try_get_or_compute(CLEAN_TRUTH, || self.restrict(self.truth))
    }

    /// Prediction restricted to the common nodes
    pub fn clean_prediction(&self) -> Result<Rc<ClusterView>> {
        self.cache
            .try_get_or_compute(CLEAN_PREDICTION, || self.restrict(self.prediction))
    }

    /// One dense label per common node on each side.
    ///
    /// Fails with [`Error::UnsupportedMetric`] naming `metric` when either
    /// clustering overlaps.
    pub fn aligned_labels(&self, metric: &'static str) -> Result<Rc<AlignedLabels>> {
        if self.is_overlap()? {
            log::warn!(
                "{} requires disjoint clusterings; {} or {} overlaps",
                metric,
                self.truth.name(),
                self.prediction.name()
            );
            return Err(Error::unsupported(
                metric,
                "clusterings overlap; use an overlap-aware comparison",
            ));
        }

        self.cache.try_get_or_compute(ALIGNED_LABELS, || {
            let nodes = self.common_nodes()?;
            let clean_truth = self.clean_truth()?;
            let clean_prediction = self.clean_prediction()?;
            let truth = dense_labels(&clean_truth, &nodes)?;
            let prediction = dense_labels(&clean_prediction, &nodes)?;
            Ok::<AlignedLabels, Error>(AlignedLabels {
                nodes: nodes.to_vec(),
                truth,
                prediction,
            })
        })
    }

    /// Normalized mutual information over the common nodes
    pub fn sklearn_nmi(&self) -> Result<f64> {
        self.partition_score(NMI, partition::nmi)
    }

    /// Adjusted mutual information over the common nodes
    pub fn sklearn_ami(&self) -> Result<f64> {
        self.partition_score(AMI, partition::ami)
    }

    /// Adjusted Rand score over the common nodes
    pub fn sklearn_ars(&self) -> Result<f64> {
        self.partition_score(ARS, partition::ars)
    }

    /// Completeness of the prediction with respect to the ground truth
    pub fn sklearn_completeness(&self) -> Result<f64> {
        self.partition_score(COMPLETENESS, partition::completeness)
    }

    pub fn homogeneity(&self) -> Result<f64> {
        self.partition_score(HOMOGENEITY, partition::homogeneity)
    }

    pub fn v_measure(&self) -> Result<f64> {
        self.partition_score(V_MEASURE, partition::v_measure)
    }

    /// Generalized conventional NMI via `gecmi`
    pub fn gen_conv_nmi(&self) -> Result<f64> {
        self.external_score(&ExternalTool::gen_conv_nmi(&self.config))
    }

    /// Overlapping NMI via `onmi`
    pub fn ovp_nmi(&self) -> Result<f64> {
        self.external_score(&ExternalTool::ovp_nmi(&self.config))
    }

    /// Omega index via `xmeasures`
    pub fn omega_index(&self) -> Result<f64> {
        self.external_score(&ExternalTool::omega_index(&self.config))
    }

    /// F1 score via `xmeasures`
    pub fn f1_score(&self) -> Result<f64> {
        self.external_score(&ExternalTool::f1_score(&self.config))
    }

    /// Run `tool` on the CNL files of both clusterings (unaligned, overlap allowed)
    pub fn external_score(&self, tool: &ExternalTool) -> Result<f64> {
        if self.truth.name() == self.prediction.name() && !std::ptr::eq(self.truth, self.prediction) {
            return Err(Error::ExternalTool {
                tool: tool.name.clone(),
                status: String::from("not started"),
                stderr: format!(
                    "both clusterings are named {:?}; their CNL files would collide",
                    self.truth.name()
                ),
            });
        }

        let dir = self.config.cnl_dir();
        let force = self.config.force_overwrite;
        let truth = self.truth.persistent_cnl(&dir, force)?;
        let prediction = self.prediction.persistent_cnl(&dir, force)?;
        tool.run(&truth, &prediction)
    }

    /// Every partition measure (when the clusterings are disjoint) plus the
    /// scores of `tools`
    pub fn comparison_report(&self, tools: &[ExternalTool]) -> Result<ComparisonReport> {
        log::info!(
            "Comparing {} against ground truth {}",
            self.prediction.name(),
            self.truth.name()
        );

        let is_overlap = self.is_overlap()?;
        if is_overlap {
            log::warn!("Overlapping clusterings: partition measures left out of the report");
        }
        let disjoint = |score: fn(&Self) -> Result<f64>| -> Result<Option<f64>> {
            if is_overlap {
                Ok(None)
            } else {
                score(self).map(Some)
            }
        };

        let mut external = BTreeMap::new();
        for tool in tools {
            external.insert(tool.name.clone(), self.external_score(tool)?);
        }

        Ok(ComparisonReport {
            truth: self.truth.name().to_string(),
            prediction: self.prediction.name().to_string(),
            is_overlap,
            common_nodes: self.common_nodes()?.len(),
            nmi: disjoint(Self::sklearn_nmi)?,
            ami: disjoint(Self::sklearn_ami)?,
            ars: disjoint(Self::sklearn_ars)?,
            completeness: disjoint(Self::sklearn_completeness)?,
            homogeneity: disjoint(Self::homogeneity)?,
            v_measure: disjoint(Self::v_measure)?,
            external,
        })
    }

    fn partition_score(&self, metric: &'static str, score: fn(&[usize], &[usize]) -> f64) -> Result<f64> {
        let value = self.cache.try_get_or_compute(metric, || {
            let labels = self.aligned_labels(metric)?;
            Ok::<f64, Error>(score(&labels.truth, &labels.prediction))
        })?;
        Ok(*value)
    }

    fn restrict(&self, view: &ClusterView) -> Result<ClusterView> {
        let common: HashSet<NodeId> = self.common_nodes()?.iter().copied().collect();
        let rows = view
            .value()?
            .iter()
            .filter(|row| common.contains(&row.node))
            .cloned()
            .collect();
        Ok(ClusterView::from_assignments(rows).with_name(format!("{}.clean", view.name())))
    }
}

/// Dense label per node, numbering clusters by first appearance
fn dense_labels(view: &ClusterView, nodes: &[NodeId]) -> Result<Vec<usize>> {
    let node_clusters = view.node_clusters()?;
    let mut index: HashMap<&ClusterId, usize> = HashMap::new();

    let mut labels = Vec::with_capacity(nodes.len());
    for node in nodes {
        let Some(cluster) = node_clusters.get(node).and_then(|clusters| clusters.first()) else {
            continue;
        };
        let next = index.len();
        labels.push(*index.entry(cluster).or_insert(next));
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_comparison() {
        let truth = ClusterView::from_labels(&[0, 0, 1, 1, 2, 2]);
        let comparator = ClusterComparator::new(&truth, &truth);

        assert!((comparator.sklearn_nmi().unwrap() - 1.0).abs() < 1e-9);
        assert!((comparator.sklearn_ars().unwrap() - 1.0).abs() < 1e-9);
        assert!((comparator.sklearn_completeness().unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_permuted_labels() {
        let truth = ClusterView::from_labels(&[0, 0, 0, 1, 1, 2, 2, 2]);
        let prediction = ClusterView::from_labels(&["z", "z", "z", "x", "x", "y", "y", "y"]);
        let comparator = ClusterComparator::new(&truth, &prediction);

        assert!((comparator.sklearn_nmi().unwrap() - 1.0).abs() < 1e-9);
        assert!((comparator.sklearn_ami().unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_alignment_drops_unshared_nodes() {
        let truth = ClusterView::from_rows(vec![(0, 0), (1, 0), (2, 1), (3, 1), (9, 1)]);
        let prediction = ClusterView::from_rows(vec![(0, 5), (1, 5), (2, 6), (3, 6), (7, 6)]);
        let comparator = ClusterComparator::new(&truth, &prediction);

        assert_eq!(*comparator.common_nodes().unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(comparator.clean_truth().unwrap().num_rows().unwrap(), 4);

        let labels = comparator.aligned_labels("nmi").unwrap();
        assert_eq!(labels.truth, vec![0, 0, 1, 1]);
        assert_eq!(labels.prediction, vec![0, 0, 1, 1]);
        assert!((comparator.sklearn_nmi().unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_overlap_rejected_for_partition_metrics() {
        let truth = ClusterView::from_rows(vec![(0, 0), (1, 0), (1, 1), (2, 1)]);
        let prediction = ClusterView::from_labels(&[0, 0, 1]);
        let comparator = ClusterComparator::new(&truth, &prediction);

        assert!(comparator.is_overlap().unwrap());
        assert!(matches!(
            comparator.sklearn_nmi(),
            Err(Error::UnsupportedMetric { metric: "nmi", .. })
        ));

        let report = comparator.comparison_report(&[]).unwrap();
        assert!(report.is_overlap);
        assert!(report.nmi.is_none());
        assert_eq!(report.common_nodes, 3);
    }

    #[test]
    fn test_report_for_disjoint_clusterings() {
        let truth = ClusterView::from_labels(&[0, 0, 1, 1]).with_name("truth");
        let prediction = ClusterView::from_labels(&[0, 0, 1, 2]).with_name("prediction");
        let report = ClusterComparator::new(&truth, &prediction)
            .comparison_report(&[])
            .unwrap();

        assert_eq!(report.truth, "truth");
        assert!((report.ars.unwrap() - 4.0 / 7.0).abs() < 1e-9);
        assert!((report.homogeneity.unwrap() - 1.0).abs() < 1e-9);
        assert!(report.external.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_external_tool_gets_cnl_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path(), false, None);
        let truth = ClusterView::from_rows(vec![(0, 0), (1, 0), (1, 1)]).with_name("gt");
        let prediction = ClusterView::from_labels(&[0, 1]).with_name("pred");
        let comparator = ClusterComparator::new(&truth, &prediction).with_config(config.clone());

        let tool = ExternalTool::new("echo", "echo").arg("OI: 0.25").result_key("OI");
        assert_eq!(comparator.external_score(&tool).unwrap(), 0.25);
        assert!(config.cnl_dir().join("gt.cnl").exists());
        assert!(config.cnl_dir().join("pred.cnl").exists());

        let report = comparator.comparison_report(&[tool]).unwrap();
        assert_eq!(report.external["echo"], 0.25);
    }

    #[cfg(unix)]
    #[test]
    fn test_changed_clustering_with_same_name_is_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path(), true, None);
        let tool = ExternalTool::new("echo", "echo").arg("OI: 1");
        let prediction = ClusterView::from_labels(&[0, 1]).with_name("pred");

        let old = ClusterView::from_labels(&[0, 0]).with_name("gt");
        ClusterComparator::new(&old, &prediction)
            .with_config(config.clone())
            .external_score(&tool)
            .unwrap();

        let new = ClusterView::from_labels(&[0, 1, 1, 1]).with_name("gt");
        ClusterComparator::new(&new, &prediction)
            .with_config(config.clone())
            .external_score(&tool)
            .unwrap();

        let text = std::fs::read_to_string(config.cnl_dir().join("gt.cnl")).unwrap();
        assert_eq!(text, "0\n1 2 3\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_unnamed_predictions_share_cache_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path(), false, None);
        let tool = ExternalTool::new("echo", "echo").arg("OI: 1");
        let truth = ClusterView::from_labels(&[0, 0, 1]).with_name("gt");
        let shared = config.cnl_dir().join("clustering.cnl");

        let first = ClusterView::from_labels(&[0, 1, 1]);
        let first_comparator = ClusterComparator::new(&truth, &first).with_config(config.clone());
        first_comparator.external_score(&tool).unwrap();
        assert_eq!(std::fs::read_to_string(&shared).unwrap(), "0\n1 2\n");

        let second = ClusterView::from_labels(&[5, 5, 5]);
        ClusterComparator::new(&truth, &second)
            .with_config(config.clone())
            .external_score(&tool)
            .unwrap();
        assert_eq!(std::fs::read_to_string(&shared).unwrap(), "0 1 2\n");

        first_comparator.external_score(&tool).unwrap();
        assert_eq!(std::fs::read_to_string(&shared).unwrap(), "0\n1 2\n");
    }

    #[test]
    fn test_external_tool_name_collision() {
        let truth = ClusterView::from_labels(&[0, 1]);
        let prediction = ClusterView::from_labels(&[1, 0]);
        let comparator = ClusterComparator::new(&truth, &prediction);

        let tool = ExternalTool::new("echo", "echo");
        assert!(matches!(comparator.external_score(&tool), Err(Error::ExternalTool { .. })));
    }
}
