//! Parquet snapshots of edge and assignment tables

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use polars::prelude::*;

use crate::cluster::{Assignment, ClusterId, ClusterView};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::graph::{Edge, GraphView, NodeId};

const SRC: &str = "src";
const DEST: &str = "dest";
const WEIGHT: &str = "weight";
const NODE: &str = "node";
const CLUSTER: &str = "cluster";

/// Directory of snapshots, one file per dataset or clustering name.
///
/// A snapshot is written the first time its name is stored and left alone
/// afterwards unless the store was opened with `force`.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
    force: bool,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>, force: bool) -> Self {
        Self {
            root: root.into(),
            force,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.cache_dir, config.force_overwrite)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn edges_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.edges.parquet", name))
    }

    pub fn assignment_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.clusters.parquet", name))
    }

    /// Persist the graph's edge table under its name
    pub fn store_edges(&self, graph: &GraphView) -> Result<PathBuf> {
        let path = self.edges_path(graph.name());
        if self.should_write(&path)? {
            write_edges(&path, graph)?;
        }
        Ok(path)
    }

    /// Persist the clustering's assignment table under its name
    pub fn store_assignment(&self, clustering: &ClusterView) -> Result<PathBuf> {
        let path = self.assignment_path(clustering.name());
        if self.should_write(&path)? {
            let rows = clustering.value()?;
            write_assignment(&path, &rows)?;
        }
        Ok(path)
    }

    /// Load a stored edge table; the flags are supplied, not inferred
    pub fn load_edges(&self, name: &str, directed: bool, weighted: bool) -> Result<GraphView> {
        read_edges(&self.edges_path(name), directed, weighted)
    }

    /// File-backed view of a stored clustering (read lazily)
    pub fn load_assignment(&self, name: &str) -> ClusterView {
        ClusterView::from_file(self.assignment_path(name)).with_name(name)
    }

    fn should_write(&self, path: &Path) -> Result<bool> {
        if path.exists() && !self.force {
            log::debug!("Snapshot exists, keeping {}", path.display());
            return Ok(false);
        }
        fs::create_dir_all(&self.root)?;
        Ok(true)
    }
}

/// Write `src`, `dest` and, on weighted graphs, `weight` columns
pub fn write_edges(path: &Path, graph: &GraphView) -> Result<()> {
    log::info!("Writing {} edges to {}", graph.num_edges(), path.display());

    let edges = graph.edges();
    let mut columns = vec![
        Column::new(SRC.into(), edges.iter().map(|e| e.src).collect::<Vec<u64>>()),
        Column::new(DEST.into(), edges.iter().map(|e| e.dest).collect::<Vec<u64>>()),
    ];
    if graph.is_weighted() {
        columns.push(Column::new(
            WEIGHT.into(),
            edges.iter().map(|e| e.weight).collect::<Vec<f64>>(),
        ));
    }

    let mut df = DataFrame::new(columns)?;
    ParquetWriter::new(File::create(path)?).finish(&mut df)?;
    Ok(())
}

/// Load an edge table snapshot
pub fn read_edges(path: &Path, directed: bool, weighted: bool) -> Result<GraphView> {
    let df = scan(path)?;
    log::info!("Loaded {} edge rows from {}", df.height(), path.display());

    let src = node_column(&df, SRC)?;
    let dest = node_column(&df, DEST)?;
    let weights = if weighted {
        weight_column(&df)?
    } else {
        vec![1.0; df.height()]
    };

    let edges = src
        .into_iter()
        .zip(dest)
        .zip(weights)
        .map(|((src, dest), weight)| Edge::new(src, dest, weight))
        .collect();

    let name = snapshot_name(path, ".edges");
    Ok(GraphView::new(directed, weighted, edges)?.with_name(name))
}

/// Write `node` and `cluster` columns. The cluster column is Int64 for integer
/// labels and String for string labels; a clustering mixing both is rejected,
/// since its labels could not be read back with their original types.
pub fn write_assignment(path: &Path, rows: &[Assignment]) -> Result<()> {
    log::info!("Writing {} assignment rows to {}", rows.len(), path.display());

    let nodes = Column::new(NODE.into(), rows.iter().map(|r| r.node).collect::<Vec<u64>>());
    let (ints, strings): (Vec<&ClusterId>, Vec<&ClusterId>) = rows
        .iter()
        .map(|r| &r.cluster)
        .partition(|cluster| matches!(cluster, ClusterId::Int(_)));

    let clusters = match (ints.is_empty(), strings.is_empty()) {
        (false, false) => {
            return Err(Error::Schema(format!(
                "cluster labels mix integers ({}) and strings ({}); relabel before storing",
                ints[0], strings[0]
            )))
        }
        (_, true) => Column::new(
            CLUSTER.into(),
            rows.iter()
                .filter_map(|r| match r.cluster {
                    ClusterId::Int(value) => Some(value),
                    ClusterId::Str(_) => None,
                })
                .collect::<Vec<i64>>(),
        ),
        (true, false) => Column::new(
            CLUSTER.into(),
            rows.iter().map(|r| r.cluster.to_string()).collect::<Vec<String>>(),
        ),
    };

    let mut df = DataFrame::new(vec![nodes, clusters])?;
    ParquetWriter::new(File::create(path)?).finish(&mut df)?;
    Ok(())
}

/// Load assignment rows from a snapshot (duplicates are kept)
pub fn read_assignment(path: &Path) -> Result<Vec<Assignment>> {
    let df = scan(path)?;
    log::info!("Loaded {} assignment rows from {}", df.height(), path.display());

    let nodes = node_column(&df, NODE)?;
    let clusters = cluster_column(&df)?;

    Ok(nodes
        .into_iter()
        .zip(clusters)
        .map(|(node, cluster)| Assignment { node, cluster })
        .collect())
}

fn scan(path: &Path) -> Result<DataFrame> {
    if !path.exists() {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("File not found: {}", path.display()),
        )));
    }

    let path = path.to_string_lossy();
    let df = LazyFrame::scan_parquet(path.as_ref(), Default::default())?.collect()?;
    log::debug!("File schema: {:?}", df.schema());
    Ok(df)
}

fn column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Column> {
    df.column(name)
        .map_err(|_| Error::Schema(format!("missing column {:?}", name)))
}

fn node_column(df: &DataFrame, name: &str) -> Result<Vec<NodeId>> {
    let column = column(df, name)?;
    if !column.dtype().is_integer() {
        return Err(Error::Schema(format!(
            "column {:?} must hold integer node ids, found {}",
            name,
            column.dtype()
        )));
    }

    // negative ids turn into nulls on the cast
    let ids = column.cast(&DataType::UInt64)?;
    if ids.null_count() > 0 {
        return Err(Error::Schema(format!(
            "column {:?} contains null or negative node ids",
            name
        )));
    }
    Ok(ids.u64()?.into_no_null_iter().collect())
}

fn weight_column(df: &DataFrame) -> Result<Vec<f64>> {
    let column = column(df, WEIGHT)?;
    let dtype = column.dtype();
    if !(dtype.is_float() || dtype.is_integer()) {
        return Err(Error::Schema(format!("column \"weight\" must be numeric, found {}", dtype)));
    }

    let weights = column.cast(&DataType::Float64)?;
    if weights.null_count() > 0 {
        return Err(Error::Schema("column \"weight\" contains nulls".to_string()));
    }
    Ok(weights.f64()?.into_no_null_iter().collect())
}

fn cluster_column(df: &DataFrame) -> Result<Vec<ClusterId>> {
    let column = column(df, CLUSTER)?;
    if column.null_count() > 0 {
        return Err(Error::Schema("column \"cluster\" contains nulls".to_string()));
    }

    match column.dtype() {
        DataType::String => Ok(column
            .str()?
            .into_no_null_iter()
            .map(|label| ClusterId::Str(label.to_string()))
            .collect()),
        dtype if dtype.is_integer() => {
            let labels = column.cast(&DataType::Int64)?;
            Ok(labels.i64()?.into_no_null_iter().map(ClusterId::Int).collect())
        }
        dtype => Err(Error::Schema(format!(
            "column \"cluster\" must hold integer or string labels, found {}",
            dtype
        ))),
    }
}

fn snapshot_name(path: &Path, suffix: &str) -> String {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(|stem| stem.trim_end_matches(suffix).to_string())
        .unwrap_or_else(|| String::from("graph"))
}
