//! Error types for the core module.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur during core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The metrics provider could not produce a snapshot. This is fatal to the
    /// evaluation that requested it: a gate must never be derived from missing
    /// data as if the repository were clean.
    #[error("Metrics unavailable for repository '{repository}': {reason}")]
    MetricsUnavailable { repository: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Convenience constructor for provider failures.
    pub fn metrics_unavailable(repository: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MetricsUnavailable {
            repository: repository.into(),
            reason: reason.into(),
        }
    }
}
