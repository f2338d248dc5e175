//! Configuration management for graph cluster evaluation

use std::path::PathBuf;

/// Default configuration for snapshots and external comparison tools
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding parquet snapshots and CNL files
    pub cache_dir: PathBuf,

    /// Rewrite snapshots that already exist
    pub force_overwrite: bool,

    /// Directory of external comparison binaries (PATH lookup when unset)
    pub tool_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("cluster_cache"),
            force_overwrite: false,
            tool_dir: None,
        }
    }
}

impl Config {
    /// Create a new configuration with custom values
    pub fn new(cache_dir: impl Into<PathBuf>, force_overwrite: bool, tool_dir: Option<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            force_overwrite,
            tool_dir,
        }
    }

    /// Resolve an external binary against `tool_dir`
    pub fn tool_program(&self, binary: &str) -> PathBuf {
        match &self.tool_dir {
            Some(dir) => dir.join(binary),
            None => PathBuf::from(binary),
        }
    }

    /// Directory for CNL files handed to external tools
    pub fn cnl_dir(&self) -> PathBuf {
        self.cache_dir.join("cnl")
    }
}
