//! Error type for Parallel Tempering runs.

use thiserror::Error;

/// Errors returned by configuration, graph construction, and execution.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum PtError {
    /// A configuration parameter is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The problem returned a NaN or infinite cost.
    #[error("replica {replica} evaluated a non-finite cost ({cost}) in cycle {cycle}")]
    NonFiniteCost {
        replica: usize,
        cycle: usize,
        cost: f64,
    },

    /// The worker threads could not be spawned.
    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),

    /// A node panicked while executing a cycle.
    #[error("node {node} panicked: {message}")]
    NodePanicked { node: usize, message: String },
}
