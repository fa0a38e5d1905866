//! Cost-governance error types.

use std::io;

/// Cost-governance errors.
#[derive(Debug, thiserror::Error)]
pub enum GovernanceError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error during store operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Dry-run or pricing lookup failed; the operation cost is unknown.
    #[error("cost estimation failed: {0}")]
    EstimationFailed(String),

    /// Budget rule not found.
    #[error("budget rule not found: {0}")]
    RuleNotFound(String),

    /// Budget violation not found.
    #[error("budget violation not found: {0}")]
    ViolationNotFound(String),

    /// Rule rejected at creation or update time.
    #[error("invalid budget rule: {0}")]
    InvalidRule(String),

    /// Store serialization or round-trip error.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Configuration validation error.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for cost-governance operations.
pub type Result<T> = std::result::Result<T, GovernanceError>;
