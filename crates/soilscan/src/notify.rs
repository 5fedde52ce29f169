//! User-facing failure notices.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// A notice to show the user, e.g. as a toast.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub title: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

impl Notice {
    pub fn new(title: &str, description: &str) -> Self {
        Self {
            title: title.to_string(),
            description: description.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn upload_failed(description: &str) -> Self {
        Self::new("Upload failed", description)
    }

    pub fn processing_failed(description: &str) -> Self {
        Self::new("Processing failed", description)
    }
}

/// Receives notices. Implementations must not block.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Discards every notice.
pub struct NoopNotifier;

impl NotificationSink for NoopNotifier {
    fn notify(&self, _notice: Notice) {}
}

/// Broadcasts notices to any number of subscribers.
#[derive(Clone)]
pub struct BroadcastNotifier {
    sender: Arc<broadcast::Sender<Notice>>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(32)
    }
}

impl NotificationSink for BroadcastNotifier {
    fn notify(&self, notice: Notice) {
        // Ignore errors - no active receivers is fine
        let _ = self.sender.send(notice);
    }
}
