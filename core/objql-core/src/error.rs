//! Error types for the objql query optimizer.
//!
//! All public APIs return `PlannerResult<T>`.

use thiserror::Error;

/// Unified error type for all planning operations.
#[derive(Debug, Error)]
pub enum PlannerError {
    /// Planner invariant violation. Indicates an upstream defect, never retried.
    #[error("internal planner error: {message}")]
    Internal { message: String },

    /// Malformed user hint (join order or index hint)
    #[error("invalid hint: {0}")]
    InvalidHint(String),

    /// Index catalog construction error
    #[error("invalid index definition '{index}': {reason}")]
    InvalidIndexDefinition { index: String, reason: String },

    /// Requested type does not exist in the catalog
    #[error("type '{0}' not found")]
    TypeNotFound(String),

    /// Optimizer configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl PlannerError {
    /// Shorthand for [`PlannerError::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        PlannerError::Internal {
            message: message.into(),
        }
    }

    /// True for invariant violations that surface as a query compilation failure.
    pub fn is_internal(&self) -> bool {
        matches!(self, PlannerError::Internal { .. })
    }
}

/// Result type alias for all planning operations.
pub type PlannerResult<T> = Result<T, PlannerError>;

impl From<serde_json::Error> for PlannerError {
    fn from(err: serde_json::Error) -> Self {
        PlannerError::Config(err.to_string())
    }
}
