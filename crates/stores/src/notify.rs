//! User-facing notification surface.

use std::sync::{Arc, Mutex};

/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// A user-facing notice (rendered as a toast by the UI layer).
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

/// Sink for user-facing notices.
///
/// Stores convert caught external failures into notices per the
/// propagation policy: notify, do not re-throw past the UI boundary.
pub trait Notifier: Send + Sync {
    /// Emits a success notice.
    fn success(&self, message: &str);

    /// Emits an error notice.
    fn error(&self, message: &str);
}

/// Notifier that emits notices to the tracing subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn success(&self, message: &str) {
        tracing::info!(notice = message, "user notice");
    }

    fn error(&self, message: &str) {
        tracing::warn!(notice = message, "user notice");
    }
}

/// Notifier that records notices for test assertions.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    notices: Arc<Mutex<Vec<Notice>>>,
}

impl RecordingNotifier {
    /// Creates a new empty recording notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all recorded notices.
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    /// Returns true if an error notice with this message was recorded.
    pub fn has_error(&self, message: &str) -> bool {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .any(|n| n.level == NoticeLevel::Error && n.message == message)
    }

    /// Returns true if a success notice with this message was recorded.
    pub fn has_success(&self, message: &str) -> bool {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .any(|n| n.level == NoticeLevel::Success && n.message == message)
    }

    /// Clears all recorded notices.
    pub fn clear(&self) {
        self.notices.lock().unwrap().clear();
    }
}

impl Notifier for RecordingNotifier {
    fn success(&self, message: &str) {
        self.notices.lock().unwrap().push(Notice {
            level: NoticeLevel::Success,
            message: message.to_string(),
        });
    }

    fn error(&self, message: &str) {
        self.notices.lock().unwrap().push(Notice {
            level: NoticeLevel::Error,
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_notifier_captures_levels() {
        let notifier = RecordingNotifier::new();
        notifier.success("saved");
        notifier.error("failed");

        assert_eq!(notifier.notices().len(), 2);
        assert!(notifier.has_success("saved"));
        assert!(notifier.has_error("failed"));
        assert!(!notifier.has_error("saved"));

        notifier.clear();
        assert!(notifier.notices().is_empty());
    }
}
