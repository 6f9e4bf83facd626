//! Error types for the policy engine.

use thiserror::Error;

/// Result type alias for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Errors that can occur during policy and gate operations.
///
/// Configuration problems discovered at evaluation time (unknown metric key,
/// malformed pattern) are deliberately *not* represented here: a single bad
/// rule is skipped and logged rather than failing the whole evaluation.
/// Missing metrics data, by contrast, is fatal to the evaluation — an
/// unknown posture must read as "blocked", never as "clean".
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Policy not found: {0}")]
    PolicyNotFound(String),

    #[error("Exemption '{exemption_id}' not found on policy '{policy_id}'")]
    ExemptionNotFound {
        policy_id: String,
        exemption_id: String,
    },

    #[error("No deployment gate for repository '{repository_id}' at commit '{commit_sha}'")]
    GateNotFound {
        repository_id: String,
        commit_sha: String,
    },

    #[error("Gate for '{repository_id}' at '{commit_sha}' is {status}, expected PENDING")]
    InvalidGateState {
        repository_id: String,
        commit_sha: String,
        status: String,
    },

    #[error("Invalid rule '{rule_id}': {message}")]
    InvalidRule { rule_id: String, message: String },

    #[error("Policy validation failed: {0}")]
    ValidationFailed(String),

    #[error(transparent)]
    Metrics(#[from] vigil_core::CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl PolicyError {
    /// Convenience constructor for rule construction failures.
    pub fn invalid_rule(rule_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRule {
            rule_id: rule_id.into(),
            message: message.into(),
        }
    }
}
