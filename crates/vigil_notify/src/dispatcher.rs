//! Best-effort fan-out of notifications to registered channels.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::channel::{Notification, NotificationChannel};

/// Outcome of one dispatch call.
///
/// Dispatch never fails the caller; this report is for logging and metrics.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// Notifications delivered successfully
    pub delivered: usize,
    /// Deliveries that failed (already logged)
    pub failed: usize,
    /// Channel names that were requested but not registered
    pub missing_channels: Vec<String>,
}

impl DispatchReport {
    /// Whether every requested delivery succeeded.
    pub fn all_delivered(&self) -> bool {
        self.failed == 0 && self.missing_channels.is_empty()
    }
}

/// Routes notifications to channels by name.
///
/// The dispatcher is fire-and-forget from the engine's point of view: a
/// failing transport is logged and counted, never surfaced as an evaluation
/// error. Retries belong to the transport, not here.
#[derive(Default)]
pub struct NotificationDispatcher {
    channels: HashMap<String, Arc<dyn NotificationChannel>>,
}

impl NotificationDispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
        }
    }

    /// Register a channel under its `name()` identifier.
    ///
    /// A channel registered under an existing name replaces it.
    pub fn register(&mut self, channel: Arc<dyn NotificationChannel>) {
        let name = channel.name().to_string();
        debug!("Registering notification channel: {}", name);
        self.channels.insert(name, channel);
    }

    /// Check if a channel is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    /// Registered channel names.
    pub fn names(&self) -> Vec<&str> {
        self.channels.keys().map(|s| s.as_str()).collect()
    }

    /// Send one notification to each of the named channels, best effort.
    pub async fn dispatch(&self, channel_names: &[String], notification: &Notification) -> DispatchReport {
        let mut report = DispatchReport::default();

        for name in channel_names {
            let Some(channel) = self.channels.get(name) else {
                warn!(
                    channel = %name,
                    policy = %notification.policy_id,
                    "Notification channel not registered, skipping"
                );
                report.missing_channels.push(name.clone());
                continue;
            };

            match channel.send(notification).await {
                Ok(()) => {
                    debug!(
                        channel = %name,
                        policy = %notification.policy_id,
                        repository = %notification.repository_id,
                        "Notification delivered"
                    );
                    report.delivered += 1;
                }
                Err(e) => {
                    warn!(
                        channel = %name,
                        policy = %notification.policy_id,
                        "Notification delivery failed: {}",
                        e
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("channels", &self.channels.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::LogChannel;
    use crate::error::{NotifyError, NotifyResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingChannel {
        name: String,
        sent: AtomicUsize,
    }

    #[async_trait]
    impl NotificationChannel for CountingChannel {
        fn name(&self) -> &str {
            &self.name
        }

        async fn send(&self, _notification: &Notification) -> NotifyResult<()> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingChannel;

    #[async_trait]
    impl NotificationChannel for FailingChannel {
        fn name(&self) -> &str {
            "broken"
        }

        async fn send(&self, _notification: &Notification) -> NotifyResult<()> {
            Err(NotifyError::delivery_failed("broken", "transport down"))
        }
    }

    fn notification() -> Notification {
        Notification::new("repo-1", "p1", "Policy One")
    }

    #[tokio::test]
    async fn test_dispatch_to_registered_channels() {
        let counting = Arc::new(CountingChannel {
            name: "email".to_string(),
            sent: AtomicUsize::new(0),
        });

        let mut dispatcher = NotificationDispatcher::new();
        dispatcher.register(counting.clone());
        dispatcher.register(Arc::new(LogChannel::new("slack")));

        assert!(dispatcher.contains("email"));
        assert!(!dispatcher.contains("pager"));
        assert_eq!(dispatcher.names().len(), 2);

        let report = dispatcher
            .dispatch(&["email".to_string(), "slack".to_string()], &notification())
            .await;

        assert_eq!(report.delivered, 2);
        assert!(report.all_delivered());
        assert_eq!(counting.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispatch_missing_channel_is_not_fatal() {
        let dispatcher = NotificationDispatcher::new();
        let report = dispatcher.dispatch(&["email".to_string()], &notification()).await;

        assert_eq!(report.delivered, 0);
        assert_eq!(report.missing_channels, vec!["email"]);
    }

    #[tokio::test]
    async fn test_dispatch_failure_is_counted_not_raised() {
        let mut dispatcher = NotificationDispatcher::new();
        dispatcher.register(Arc::new(FailingChannel));

        let report = dispatcher.dispatch(&["broken".to_string()], &notification()).await;

        assert_eq!(report.failed, 1);
        assert!(!report.all_delivered());
    }
}
