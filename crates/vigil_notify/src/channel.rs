//! Notification channel trait and message model.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::NotifyResult;

/// A notification about a policy violation.
///
/// The engine decides *what* to send and *to whom*; channel identifiers are
/// opaque strings resolved by the dispatcher. Transport details (SMTP, chat
/// webhooks) live behind [`NotificationChannel`] implementations registered
/// by the embedding service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Repository the violation was detected in
    pub repository_id: String,
    /// Commit under evaluation, when the notification comes from a gate
    pub commit_sha: Option<String>,
    /// Policy that was violated
    pub policy_id: String,
    /// Human-readable policy name
    pub policy_name: String,
    /// Severity label copied from the owning policy
    pub severity: String,
    /// One-line summary
    pub subject: String,
    /// Full violation description
    pub body: String,
    /// When the violation was detected
    pub detected_at: DateTime<Utc>,
}

impl Notification {
    /// Create a notification with the required routing fields.
    pub fn new(
        repository_id: impl Into<String>,
        policy_id: impl Into<String>,
        policy_name: impl Into<String>,
    ) -> Self {
        Self {
            repository_id: repository_id.into(),
            commit_sha: None,
            policy_id: policy_id.into(),
            policy_name: policy_name.into(),
            severity: String::new(),
            subject: String::new(),
            body: String::new(),
            detected_at: Utc::now(),
        }
    }

    /// Set the commit under evaluation.
    pub fn with_commit(mut self, sha: impl Into<String>) -> Self {
        self.commit_sha = Some(sha.into());
        self
    }

    /// Set the severity label.
    pub fn with_severity(mut self, severity: impl Into<String>) -> Self {
        self.severity = severity.into();
        self
    }

    /// Set subject and body.
    pub fn with_message(mut self, subject: impl Into<String>, body: impl Into<String>) -> Self {
        self.subject = subject.into();
        self.body = body.into();
        self
    }
}

/// A transport for violation notifications.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Identifier the channel is registered under (e.g. `email`, `slack`).
    fn name(&self) -> &str;

    /// Deliver one notification.
    async fn send(&self, notification: &Notification) -> NotifyResult<()>;
}

/// Channel that writes notifications to the log.
///
/// Default sink for deployments that have not wired a real transport yet.
pub struct LogChannel {
    name: String,
}

impl LogChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl NotificationChannel for LogChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, notification: &Notification) -> NotifyResult<()> {
        info!(
            channel = %self.name,
            repository = %notification.repository_id,
            policy = %notification.policy_id,
            severity = %notification.severity,
            "{}",
            notification.subject
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_builder() {
        let notification = Notification::new("repo-1", "critical-vulnerabilities", "Critical Vulnerabilities")
            .with_commit("abc123")
            .with_severity("CRITICAL")
            .with_message("Policy violated", "2 critical vulnerabilities found");

        assert_eq!(notification.commit_sha.as_deref(), Some("abc123"));
        assert_eq!(notification.severity, "CRITICAL");
        assert_eq!(notification.subject, "Policy violated");
    }

    #[tokio::test]
    async fn test_log_channel_send() {
        let channel = LogChannel::new("log");
        let notification = Notification::new("repo-1", "p1", "Policy One");

        assert!(channel.send(&notification).await.is_ok());
        assert_eq!(channel.name(), "log");
    }
}
