//! Columnar snapshots of edge lists and cluster assignments

pub mod parquet;

pub use parquet::SnapshotStore;
