//! Error Types for ipk-core
//!
//! Provides unified error handling across all build-pipeline stages.

use thiserror::Error;

/// Root error type for the phylo-k-mer build pipeline.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Bad configuration: k, omega, mu, unknown algorithm or filter.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Malformed Newick, FASTA, or PP matrix input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Extended tree and AR tree disagree in node count or topology.
    #[error("inconsistent tree: {0}")]
    InconsistentTree(String),

    /// Requested feature not compiled/available (e.g. positions without the
    /// positional entry layout).
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Invariant violation; a bug rather than a user-facing fault.
    #[error("internal error: {0}")]
    Internal(String),

    /// File not found, shard write failed, etc.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// Create an `InvalidConfig` error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create an `InvalidInput` error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an `InconsistentTree` error.
    pub fn inconsistent_tree(msg: impl Into<String>) -> Self {
        Self::InconsistentTree(msg.into())
    }

    /// Create an `Unsupported` error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create an `Internal` error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error class should abort the whole run (all of them do;
    /// the build pipeline never attempts per-k-mer recovery).
    pub fn is_fatal(&self) -> bool {
        true
    }

    /// Stable string code, useful for log correlation.
    pub fn error_code(&self) -> &'static str {
        match self {
            BuildError::InvalidConfig(_) => "INVALID_CONFIG",
            BuildError::InvalidInput(_) => "INVALID_INPUT",
            BuildError::InconsistentTree(_) => "INCONSISTENT_TREE",
            BuildError::Unsupported(_) => "UNSUPPORTED",
            BuildError::Internal(_) => "INTERNAL_ERROR",
            BuildError::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type alias using `BuildError`.
pub type Result<T> = std::result::Result<T, BuildError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = BuildError::invalid_config("omega must be positive");
        assert!(err.to_string().contains("omega must be positive"));
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_all_fatal() {
        assert!(BuildError::internal("bug").is_fatal());
        assert!(BuildError::invalid_input("bad newick").is_fatal());
    }
}
