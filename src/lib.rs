//! Core library functions for graph clustering evaluation
//!
//! A [`GraphView`] and a [`ClusterView`] wrap immutable edge and assignment
//! tables and memoize everything derived from them. [`GraphClusterMetrics`]
//! scores a clustering on its graph; [`ClusterComparator`] measures the
//! agreement of two clusterings.

pub mod cache;
pub mod cluster;
pub mod compare;
pub mod config;
pub mod data;
pub mod error;
pub mod graph;
pub mod storage;

pub use cache::PropertyCache;
pub use cluster::metrics::{GraphClusterMetrics, QualityReport};
pub use cluster::{Assignment, ClusterId, ClusterView};
pub use compare::{ClusterComparator, ComparisonReport, ExternalTool};
pub use config::Config;
pub use data::SnapshotStore;
pub use error::{Error, Result};
pub use graph::{Edge, GraphBuilder, GraphView, NodeId};
