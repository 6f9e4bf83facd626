//! Error types for notification dispatch.

use thiserror::Error;

/// Result type alias for notification operations.
pub type NotifyResult<T> = Result<T, NotifyError>;

/// Errors that can occur while dispatching notifications.
///
/// Dispatch failures are always non-fatal to the caller: the dispatcher logs
/// them and reports counts, it never propagates them into a gate evaluation.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Unknown notification channel: {0}")]
    ChannelNotFound(String),

    #[error("Delivery failed on channel '{channel}': {reason}")]
    DeliveryFailed { channel: String, reason: String },
}

impl NotifyError {
    /// Convenience constructor for transport failures.
    pub fn delivery_failed(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DeliveryFailed {
            channel: channel.into(),
            reason: reason.into(),
        }
    }
}
