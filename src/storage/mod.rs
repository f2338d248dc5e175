//! Results persistence module

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::to_writer_pretty;

use crate::cluster::metrics::QualityReport;
use crate::compare::ComparisonReport;
use crate::error::Result;

pub const QUALITY_FILE: &str = "quality.json";
pub const COMPARISON_FILE: &str = "comparison.json";

/// Save a clustering quality report to `output_dir/quality.json`
pub fn save_quality_report(report: &QualityReport, output_dir: &Path) -> Result<PathBuf> {
    log::info!(
        "Saving quality report for {} on {} to {}",
        report.clustering,
        report.graph,
        output_dir.display()
    );
    save_json(report, &output_dir.join(QUALITY_FILE))
}

/// Save a clustering comparison report to `output_dir/comparison.json`
pub fn save_comparison_report(report: &ComparisonReport, output_dir: &Path) -> Result<PathBuf> {
    log::info!(
        "Saving comparison of {} against {} to {}",
        report.prediction,
        report.truth,
        output_dir.display()
    );
    save_json(report, &output_dir.join(COMPARISON_FILE))
}

/// Non-finite scores (undefined separability, empty ODF) are written as `null`
fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<PathBuf> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }

    let mut writer = BufWriter::new(File::create(path)?);
    to_writer_pretty(&mut writer, value).map_err(io::Error::from)?;
    writer.write_all(b"\n")?;
    writer.flush()?;

    log::debug!("Wrote {}", path.display());
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::metrics::GraphClusterMetrics;
    use crate::cluster::ClusterView;
    use crate::compare::ClusterComparator;
    use crate::graph::GraphView;

    #[test]
    fn test_save_quality_report() {
        let dir = tempfile::tempdir().unwrap();
        let graph = GraphView::from_rows(false, vec![(0, 1), (1, 2), (0, 2), (3, 4), (4, 5), (3, 5)])
            .unwrap()
            .with_name("triangles");
        let clustering = ClusterView::from_labels(&[0, 0, 0, 1, 1, 1]);
        let report = GraphClusterMetrics::new(&graph, &clustering).quality_report().unwrap();

        let path = save_quality_report(&report, &dir.path().join("out")).unwrap();
        assert_eq!(path, dir.path().join("out").join(QUALITY_FILE));

        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["graph"], "triangles");
        assert_eq!(json["num_clusters"], 2);
        assert!((json["modularity"].as_f64().unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_save_comparison_report() {
        let dir = tempfile::tempdir().unwrap();
        let truth = ClusterView::from_labels(&[0, 0, 1, 1]).with_name("truth");
        let prediction = ClusterView::from_labels(&[1, 1, 0, 0]).with_name("prediction");
        let report = ClusterComparator::new(&truth, &prediction)
            .comparison_report(&[])
            .unwrap();

        let path = save_comparison_report(&report, dir.path()).unwrap();
        let saved: ComparisonReport = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(saved.truth, "truth");
        assert_eq!(saved.common_nodes, 4);
        assert!((saved.nmi.unwrap() - 1.0).abs() < 1e-9);
    }
}
