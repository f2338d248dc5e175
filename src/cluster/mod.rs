//! Node clustering representation and derived cluster properties

pub mod cnl;
pub mod metrics;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::cache::PropertyCache;
use crate::data::parquet;
use crate::error::{Error, Result};
use crate::graph::NodeId;

const VALUE: &str = "value";
const CLUSTER_INDEXES: &str = "cluster_indexes";
const CLUSTER_SIZES: &str = "cluster_sizes";
const MEMBERS: &str = "members";
const NODE_CLUSTERS: &str = "node_clusters";
const NODE_OVERLAPS: &str = "node_overlaps";
const CNL_TEXT: &str = "cnl_text";

/// Cluster label: integer or string, as produced by the clustering tool
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClusterId {
    Int(i64),
    Str(String),
}

impl ClusterId {
    /// Integer label when the text is an integer, string label otherwise
    pub fn parse(text: &str) -> Self {
        match text.parse::<i64>() {
            Ok(value) => ClusterId::Int(value),
            Err(_) => ClusterId::Str(text.to_string()),
        }
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterId::Int(value) => write!(f, "{}", value),
            ClusterId::Str(value) => f.write_str(value),
        }
    }
}

impl From<i64> for ClusterId {
    fn from(value: i64) -> Self {
        ClusterId::Int(value)
    }
}

impl From<i32> for ClusterId {
    fn from(value: i32) -> Self {
        ClusterId::Int(value as i64)
    }
}

impl From<u32> for ClusterId {
    fn from(value: u32) -> Self {
        ClusterId::Int(value as i64)
    }
}

impl From<&str> for ClusterId {
    fn from(value: &str) -> Self {
        ClusterId::Str(value.to_string())
    }
}

impl From<String> for ClusterId {
    fn from(value: String) -> Self {
        ClusterId::Str(value)
    }
}

/// One `(node, cluster)` row of an assignment table.
///
/// Labels of one clustering may mix integers and strings in memory, but a
/// parquet snapshot holds a single label type and refuses such a mix.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Assignment {
    pub node: NodeId,
    pub cluster: ClusterId,
}

impl Assignment {
    pub fn new(node: NodeId, cluster: impl Into<ClusterId>) -> Self {
        Self {
            node,
            cluster: cluster.into(),
        }
    }
}

/// Where the assignment rows live
#[derive(Debug)]
enum Source {
    Memory(Rc<Vec<Assignment>>),
    File(PathBuf),
}

/// Immutable node→cluster assignment, possibly overlapping.
///
/// Duplicate rows are removed. A file-backed view reads its snapshot on the
/// first call to [`value`](Self::value) and keeps the loaded rows.
#[derive(Debug)]
pub struct ClusterView {
    name: String,
    source: Source,
    cache: PropertyCache,
}

impl ClusterView {
    /// In-memory view from `(node, cluster)` rows
    pub fn from_rows<I, C>(rows: I) -> Self
    where
        I: IntoIterator<Item = (NodeId, C)>,
        C: Into<ClusterId>,
    {
        Self::from_assignments(
            rows.into_iter()
                .map(|(node, cluster)| Assignment::new(node, cluster))
                .collect(),
        )
    }

    /// In-memory view where node `i` belongs to cluster `labels[i]`
    pub fn from_labels<C>(labels: &[C]) -> Self
    where
        C: Clone + Into<ClusterId>,
    {
        Self::from_rows(
            labels
                .iter()
                .enumerate()
                .map(|(node, label)| (node as NodeId, label.clone())),
        )
    }

    pub fn from_assignments(rows: Vec<Assignment>) -> Self {
        Self {
            name: String::from("clustering"),
            source: Source::Memory(Rc::new(normalize(rows))),
            cache: PropertyCache::new(),
        }
    }

    /// View backed by a parquet snapshot with `node` and `cluster` columns.
    /// Nothing is read until the rows are first needed.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(|stem| stem.trim_end_matches(".clusters").to_string())
            .unwrap_or_else(|| String::from("clustering"));

        Self {
            name,
            source: Source::File(path),
            cache: PropertyCache::new(),
        }
    }

    /// Eagerly parse a CNL file (one cluster per line)
    pub fn from_cnl(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("Reading CNL clustering: {}", path.display());
        let rows = cnl::read_cnl(BufReader::new(File::open(path)?))?;
        let view = Self::from_assignments(rows);

        Ok(match path.file_stem().and_then(|stem| stem.to_str()) {
            Some(stem) => view.with_name(stem),
            None => view,
        })
    }

    /// Attach the clustering identity used in log lines and cache file names
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deduplicated assignment rows, sorted by `(node, cluster)`
    pub fn value(&self) -> Result<Rc<Vec<Assignment>>> {
        match &self.source {
            Source::Memory(rows) => Ok(Rc::clone(rows)),
            Source::File(path) => self.cache.try_get_or_compute(VALUE, || {
                log::info!("[{}] loading assignment snapshot {}", self.name, path.display());
                parquet::read_assignment(path).map(normalize)
            }),
        }
    }

    /// Number of assignment rows
    pub fn num_rows(&self) -> Result<usize> {
        Ok(self.value()?.len())
    }

    /// Distinct cluster ids, sorted
    pub fn cluster_indexes(&self) -> Result<Rc<Vec<ClusterId>>> {
        let rows = self.value()?;
        Ok(self.cache.get_or_compute(CLUSTER_INDEXES, || {
            rows.iter().map(|row| row.cluster.clone()).sorted().dedup().collect()
        }))
    }

    pub fn num_clusters(&self) -> Result<usize> {
        Ok(self.cluster_indexes()?.len())
    }

    /// Member count per cluster
    pub fn cluster_sizes(&self) -> Result<Rc<BTreeMap<ClusterId, usize>>> {
        let members = self.members()?;
        Ok(self.cache.get_or_compute(CLUSTER_SIZES, || {
            members
                .iter()
                .map(|(cluster, nodes)| (cluster.clone(), nodes.len()))
                .collect()
        }))
    }

    /// Sorted member nodes per cluster
    pub fn members(&self) -> Result<Rc<BTreeMap<ClusterId, Vec<NodeId>>>> {
        let rows = self.value()?;
        Ok(self.cache.get_or_compute(MEMBERS, || {
            let mut members: BTreeMap<ClusterId, Vec<NodeId>> = BTreeMap::new();
            for row in rows.iter() {
                members.entry(row.cluster.clone()).or_default().push(row.node);
            }
            for nodes in members.values_mut() {
                nodes.sort_unstable();
            }
            members
        }))
    }

    /// Clusters of each assigned node, sorted
    pub fn node_clusters(&self) -> Result<Rc<HashMap<NodeId, Vec<ClusterId>>>> {
        let rows = self.value()?;
        Ok(self.cache.get_or_compute(NODE_CLUSTERS, || {
            // rows are sorted by node, then cluster
            let mut node_clusters: HashMap<NodeId, Vec<ClusterId>> = HashMap::new();
            for row in rows.iter() {
                node_clusters.entry(row.node).or_default().push(row.cluster.clone());
            }
            node_clusters
        }))
    }

    /// Membership count per assigned node
    pub fn node_overlaps(&self) -> Result<Rc<HashMap<NodeId, usize>>> {
        let node_clusters = self.node_clusters()?;
        Ok(self.cache.get_or_compute(NODE_OVERLAPS, || {
            node_clusters
                .iter()
                .map(|(&node, clusters)| (node, clusters.len()))
                .collect()
        }))
    }

    /// Number of distinct assigned nodes
    pub fn num_nodes(&self) -> Result<usize> {
        Ok(self.node_clusters()?.len())
    }

    /// True iff some node belongs to more than one cluster
    pub fn is_overlap(&self) -> Result<bool> {
        Ok(self.node_overlaps()?.values().any(|&count| count > 1))
    }

    /// Write the clustering in CNL form
    pub fn write_cnl<W: Write>(&self, writer: W) -> Result<()> {
        let members = self.members()?;
        cnl::write_cnl(&members, writer)
    }

    /// CNL rendering of the clustering
    pub fn cnl_text(&self) -> Result<Rc<Vec<u8>>> {
        let members = self.members()?;
        self.cache.try_get_or_compute(CNL_TEXT, || {
            let mut buffer = Vec::new();
            cnl::write_cnl(&members, &mut buffer)?;
            Ok::<Vec<u8>, Error>(buffer)
        })
    }

    /// Path of this clustering's CNL file under `dir`.
    ///
    /// The file is named after the clustering. An existing file is reused only
    /// when it holds exactly this clustering; otherwise, or with `force`, it is
    /// rewritten. The check runs on every call, since another clustering with
    /// the same name may have replaced the file in the meantime.
    pub fn persistent_cnl(&self, dir: &Path, force: bool) -> Result<PathBuf> {
        let path = dir.join(format!("{}.cnl", self.name));
        let text = self.cnl_text()?;

        if path.exists() && !force {
            if fs::read(&path)? == *text {
                log::debug!("[{}] reusing CNL file {}", self.name, path.display());
                return Ok(path);
            }
            log::warn!(
                "[{}] CNL file {} holds a different clustering, rewriting it",
                self.name,
                path.display()
            );
        }

        fs::create_dir_all(dir)?;
        log::info!("[{}] writing CNL file {}", self.name, path.display());
        fs::write(&path, text.as_slice())?;
        Ok(path)
    }
}

fn normalize(mut rows: Vec<Assignment>) -> Vec<Assignment> {
    rows.sort_unstable();
    rows.dedup();
    rows
}
