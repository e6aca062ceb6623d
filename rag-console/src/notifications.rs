//! Transient operator notifications.
//!
//! An ordered collection of short-lived messages. Every push schedules its
//! own removal timer, so each entry expires exactly once its TTL elapses
//! rather than on some polling sweep. Removal by id is idempotent. No cap
//! is imposed on live entries; the console renders whatever is alive.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

/// How a notification is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Error,
    Info,
}

/// One live notification.
#[derive(Debug, Clone)]
pub struct Notification {
    /// Unique id: creation millis plus a per-process sequence component, so
    /// two pushes within the same millisecond cannot collide.
    pub id: String,
    pub text: String,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
}

/// Append/remove-only queue of live notifications, insertion-ordered.
pub struct NotificationQueue {
    entries: Mutex<Vec<Notification>>,
    seq: AtomicU64,
    default_ttl: Duration,
}

impl NotificationQueue {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            seq: AtomicU64::new(0),
            default_ttl,
        }
    }

    /// Appends a notification with the default TTL and returns its id.
    pub fn push(self: &Arc<Self>, text: impl Into<String>, severity: Severity) -> String {
        let ttl = self.default_ttl;
        self.push_with_ttl(text, severity, ttl)
    }

    /// Appends a notification and schedules its removal after `ttl`.
    pub fn push_with_ttl(
        self: &Arc<Self>,
        text: impl Into<String>,
        severity: Severity,
        ttl: Duration,
    ) -> String {
        let created_at = Utc::now();
        let id = format!(
            "{}-{}",
            created_at.timestamp_millis(),
            self.seq.fetch_add(1, Ordering::Relaxed)
        );

        let entry = Notification {
            id: id.clone(),
            text: text.into(),
            severity,
            created_at,
        };
        self.entries.lock().expect("notifications poisoned").push(entry);

        let queue = Arc::clone(self);
        let expire_id = id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            queue.remove(&expire_id);
        });

        id
    }

    /// Removes a notification by id. Removing an unknown id is a no-op.
    pub fn remove(&self, id: &str) {
        let mut entries = self.entries.lock().expect("notifications poisoned");
        let before = entries.len();
        entries.retain(|n| n.id != id);
        if entries.len() < before {
            debug!(id, "notification expired");
        }
    }

    /// Live notifications in insertion order.
    pub fn snapshot(&self) -> Vec<Notification> {
        self.entries.lock().expect("notifications poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn notifications_expire_after_their_ttl() {
        let queue = Arc::new(NotificationQueue::new(Duration::from_millis(2500)));
        queue.push("API restart requested", Severity::Success);

        // Just before the TTL the entry is still live.
        tokio::time::sleep(Duration::from_millis(2400)).await;
        assert_eq!(queue.snapshot().len(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(queue.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_ttl_overrides_the_default() {
        let queue = Arc::new(NotificationQueue::new(Duration::from_millis(2500)));
        queue.push_with_ttl("model switched", Severity::Info, Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(queue.snapshot().is_empty());
    }

    #[tokio::test]
    async fn removing_an_unknown_id_is_a_no_op() {
        let queue = Arc::new(NotificationQueue::new(Duration::from_millis(2500)));
        let id = queue.push("one", Severity::Info);

        queue.remove("missing");
        assert_eq!(queue.snapshot().len(), 1);

        queue.remove(&id);
        queue.remove(&id);
        assert!(queue.snapshot().is_empty());
    }

    #[tokio::test]
    async fn ids_are_unique_within_one_millisecond() {
        let queue = Arc::new(NotificationQueue::new(Duration::from_secs(10)));
        let a = queue.push("a", Severity::Info);
        let b = queue.push("b", Severity::Info);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn insertion_order_is_display_order() {
        let queue = Arc::new(NotificationQueue::new(Duration::from_secs(10)));
        queue.push("first", Severity::Info);
        queue.push("second", Severity::Error);
        let texts: Vec<String> = queue.snapshot().into_iter().map(|n| n.text).collect();
        assert_eq!(texts, vec!["first", "second"]);
    }
}
