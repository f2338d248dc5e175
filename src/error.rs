//! Error types for graph and clustering evaluation

use thiserror::Error;

/// Errors raised while building views or computing metrics
#[derive(Debug, Error)]
pub enum Error {
    /// Graph too small for the requested metric, or malformed edges
    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    /// Metric invoked on data that violates its precondition
    #[error("unsupported metric {metric}: {reason}")]
    UnsupportedMetric {
        /// Metric name
        metric: &'static str,
        /// Violated precondition
        reason: String,
    },

    /// Delegated comparison tool failed to run or exited non-zero
    #[error("external tool {tool} failed ({status}): {stderr}")]
    ExternalTool {
        /// Tool name
        tool: String,
        /// Exit status description
        status: String,
        /// Captured standard error
        stderr: String,
    },

    /// Input table missing columns or carrying values of the wrong type
    #[error("schema error: {0}")]
    Schema(String),

    /// I/O error wrapper
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Columnar storage error wrapper
    #[error("polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),
}

impl Error {
    pub(crate) fn unsupported(metric: &'static str, reason: impl Into<String>) -> Self {
        Error::UnsupportedMetric {
            metric,
            reason: reason.into(),
        }
    }
}

/// Result alias for this crate
pub type Result<T> = std::result::Result<T, Error>;
