//! User-facing notification service
//!
//! Separates "tell the user" from business logic so each frontend decides how
//! messages are shown: log lines in the CLI, toasts in a UI, a list in tests.

use std::sync::Mutex;
use tracing::{error, info};

/// Toast id shared by the messages of one removal, so a UI can replace the
/// "processing" toast with its outcome
pub const PROCESSING_ID: &str = "processing-toast";

/// Severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

/// A message for the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    /// Messages with the same id replace each other
    pub id: Option<String>,
}

impl Notification {
    pub fn info<S: Into<String>>(message: S) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: message.into(),
            id: None,
        }
    }

    pub fn success<S: Into<String>>(message: S) -> Self {
        Self {
            level: NotificationLevel::Success,
            message: message.into(),
            id: None,
        }
    }

    pub fn error<S: Into<String>>(message: S) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
            id: None,
        }
    }

    #[must_use]
    pub fn with_id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Trait for surfacing messages to the user
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Discards all notifications
pub struct NoOpNotifier;

impl Notifier for NoOpNotifier {
    fn notify(&self, _notification: Notification) {
        // Intentionally empty
    }
}

/// Emits notifications as tracing events
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Info => info!("ℹ️  {}", notification.message),
            NotificationLevel::Success => info!("✅ {}", notification.message),
            NotificationLevel::Error => error!("❌ {}", notification.message),
        }
    }
}

/// Keeps every notification, for assertions
#[derive(Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything received so far
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }

    /// Messages of the given level, in order
    pub fn messages(&self, level: NotificationLevel) -> Vec<String> {
        self.notifications
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.level == level)
            .map(|n| n.message.clone())
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.notifications.lock().unwrap().push(notification);
    }
}
