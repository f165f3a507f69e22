//! Error types for the meshcast simulation

use std::path::PathBuf;

use thiserror::Error;

use crate::types::NodeIndex;

/// Top-level error type for meshcast
#[derive(Debug, Error)]
pub enum MeshcastError {
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Broadcast precondition failed: {0}")]
    Precondition(#[from] PrecondFailed),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised while building a topology
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("Invalid generation parameters: {0}")]
    InvalidParameters(String),

    #[error("Minimum degree {min} exceeds maximum degree {max}")]
    InvertedDegreeBounds { min: usize, max: usize },

    #[error("Degree target unreachable: node {node} stuck at degree {degree}, minimum is {min}")]
    DegreeTargetUnreachable {
        node: NodeIndex,
        degree: usize,
        min: usize,
    },
}

/// Reasons a broadcast cannot be initiated
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrecondFailed {
    #[error("Origin and destination must be two distinct nodes, got {0} twice")]
    SameEndpoints(NodeIndex),

    #[error("Node {0} does not exist in the topology")]
    UnknownNode(NodeIndex),

    #[error("Origin {0} has no neighbors, destination is unreachable")]
    IsolatedOrigin(NodeIndex),
}

/// Errors related to loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Result type alias for meshcast operations
pub type MeshcastResult<T> = Result<T, MeshcastError>;
