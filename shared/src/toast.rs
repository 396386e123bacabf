use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::AppError;
use crate::get_current_time_ms;

pub const MAX_QUEUED_TOASTS: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToastMessage {
    pub message: String,
    pub kind: ToastKind,
    pub created_at_ms: u64,
    pub duration_ms: u64,
}

impl ToastMessage {
    #[must_use]
    pub fn new(message: impl Into<String>, kind: ToastKind) -> Self {
        Self {
            message: message.into(),
            kind,
            created_at_ms: get_current_time_ms(),
            duration_ms: kind.default_duration_ms(),
        }
    }

    #[must_use]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.created_at_ms) > self.duration_ms
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToastKind {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl ToastKind {
    #[must_use]
    pub const fn default_duration_ms(self) -> u64 {
        match self {
            Self::Info => 3000,
            Self::Success => 2000,
            Self::Warning => 4000,
            Self::Error => 5000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToastView {
    pub message: String,
    pub kind: ToastKind,
    pub duration_ms: u64,
}

impl From<&ToastMessage> for ToastView {
    fn from(t: &ToastMessage) -> Self {
        Self {
            message: t.message.clone(),
            kind: t.kind,
            duration_ms: t.duration_ms,
        }
    }
}

/// Notifications waiting for the shell to display them. Shared by every
/// controller; the oldest toast is dropped once the queue is full.
#[derive(Debug, Default)]
pub struct Toasts {
    queue: Mutex<VecDeque<ToastMessage>>,
}

impl Toasts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, message: impl Into<String>, kind: ToastKind) {
        let Ok(mut queue) = self.queue.lock() else {
            return;
        };
        if queue.len() >= MAX_QUEUED_TOASTS {
            queue.pop_front();
        }
        queue.push_back(ToastMessage::new(message, kind));
    }

    pub fn success(&self, message: impl Into<String>) {
        self.push(message, ToastKind::Success);
    }

    pub fn error(&self, error: &AppError) {
        self.push(error.user_facing_message(), ToastKind::Error);
    }

    /// Takes every pending toast, oldest first.
    pub fn drain(&self) -> Vec<ToastMessage> {
        self.queue
            .lock()
            .map(|mut q| q.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_toast_expiry() {
        let toast = ToastMessage::new("saved", ToastKind::Success);
        assert!(!toast.is_expired(toast.created_at_ms + 2000));
        assert!(toast.is_expired(toast.created_at_ms + 2001));
    }

    #[test]
    fn test_error_toast_uses_user_message() {
        let toasts = Toasts::new();
        toasts.error(&AppError::new(ErrorKind::Conflict, "User already exists."));
        let drained = toasts.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].message, "User already exists.");
        assert_eq!(drained[0].kind, ToastKind::Error);
        assert_eq!(drained[0].duration_ms, 5000);
        assert!(toasts.is_empty());
    }

    #[test]
    fn test_queue_is_bounded() {
        let toasts = Toasts::new();
        for i in 0..MAX_QUEUED_TOASTS + 5 {
            toasts.push(format!("t{i}"), ToastKind::Info);
        }
        let drained = toasts.drain();
        assert_eq!(drained.len(), MAX_QUEUED_TOASTS);
        assert_eq!(drained[0].message, "t5");
    }

    #[test]
    fn test_view_conversion() {
        let toast = ToastMessage::new("hi", ToastKind::Warning);
        let view = ToastView::from(&toast);
        assert_eq!(view.duration_ms, 4000);
        assert_eq!(view.message, "hi");
    }
}
