//! Frontend-facing services

pub mod notify;

pub use notify::{
    NoOpNotifier, Notification, NotificationLevel, Notifier, RecordingNotifier, TracingNotifier,
    PROCESSING_ID,
};
