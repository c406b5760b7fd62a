//! Best-effort side-channel notifications.
//!
//! Notifications are dispatched on detached tasks. A failing or slow notifier
//! is logged and never surfaces to the request that triggered it.

mod webhook;

pub use webhook::WebhookNotifier;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Duration, timeout};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification delivery failed: {0}")]
    Delivery(#[from] reqwest::Error),

    #[error("Notification rejected with status {status}")]
    Rejected { status: u16 },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// The backend could not be reached within the retry budget.
    BackendFailure {
        request_id: String,
        user_id: Option<String>,
        error: String,
        at: DateTime<Utc>,
    },
}

impl Notification {
    pub fn backend_failure(
        request_id: impl Into<String>,
        user_id: Option<&str>,
        error: impl std::fmt::Display,
    ) -> Self {
        Self::BackendFailure {
            request_id: request_id.into(),
            user_id: user_id.map(str::to_string),
            error: error.to_string(),
            at: Utc::now(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::BackendFailure { .. } => "backend_failure",
        }
    }
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        match notification {
            Notification::BackendFailure {
                request_id,
                user_id,
                error,
                ..
            } => tracing::error!(
                request_id = %request_id,
                user_id = user_id.as_deref().unwrap_or("-"),
                error = %error,
                "Backend failure"
            ),
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    notifiers: Vec<Arc<dyn Notifier>>,
    timeout: Duration,
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self {
            notifiers: Vec::new(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn register<N: Notifier + 'static>(mut self, notifier: N) -> Self {
        self.notifiers.push(Arc::new(notifier));
        self
    }

    pub fn notifier_names(&self) -> Vec<&str> {
        self.notifiers.iter().map(|n| n.name()).collect()
    }

    /// Fire and forget. The returned handle is only useful to tests.
    pub fn dispatch(&self, notification: Notification) -> Option<JoinHandle<()>> {
        if self.notifiers.is_empty() {
            return None;
        }

        let notifiers = self.notifiers.clone();
        let limit = self.timeout;
        Some(tokio::spawn(async move {
            for notifier in notifiers {
                match timeout(limit, notifier.notify(&notification)).await {
                    Ok(Ok(())) => {
                        tracing::debug!(
                            notifier = notifier.name(),
                            kind = notification.kind(),
                            "Notification delivered"
                        );
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(notifier = notifier.name(), error = %e, "Notification failed");
                    }
                    Err(_) => {
                        tracing::warn!(
                            notifier = notifier.name(),
                            timeout_ms = limit.as_millis() as u64,
                            "Notification timed out"
                        );
                    }
                }
            }
        }))
    }
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("notifiers", &self.notifier_names())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct Counting(Arc<AtomicUsize>);

    #[async_trait::async_trait]
    impl Notifier for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn notify(&self, _notification: &Notification) -> Result<(), NotifyError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    #[async_trait::async_trait]
    impl Notifier for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn notify(&self, _notification: &Notification) -> Result<(), NotifyError> {
            Err(NotifyError::Rejected { status: 500 })
        }
    }

    struct Stalled;

    #[async_trait::async_trait]
    impl Notifier for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn notify(&self, _notification: &Notification) -> Result<(), NotifyError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    fn sample() -> Notification {
        Notification::backend_failure("req-1", Some("user-1"), "connection refused")
    }

    #[tokio::test]
    async fn test_empty_dispatcher_spawns_nothing() {
        assert!(NotificationDispatcher::new().dispatch(sample()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_later_notifiers() {
        let count = Arc::new(AtomicUsize::new(0));
        let dispatcher = NotificationDispatcher::new()
            .with_timeout(Duration::from_millis(50))
            .register(Failing)
            .register(Stalled)
            .register(Counting(Arc::clone(&count)));

        dispatcher.dispatch(sample()).unwrap().await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_notification_serializes_with_kind() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["kind"], "backend_failure");
        assert_eq!(value["user_id"], "user-1");
        assert_eq!(value["error"], "connection refused");
    }
}
