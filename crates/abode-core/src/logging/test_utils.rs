//! Capturing subscriber for asserting on tracing events in tests.
//!
//! Enabled for this crate's tests and, in other crates, through the
//! `test-utils` feature.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, Registry};

/// One recorded event: its level, message and structured fields.
#[derive(Clone, Debug)]
pub struct CapturedEvent {
    /// Event level.
    pub level: Level,
    /// The `message` field.
    pub message: String,
    /// Every other field, rendered with `Debug`.
    pub fields: Vec<(String, String)>,
}

impl CapturedEvent {
    /// Value of the field named `key`.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find_map(|(k, v)| (k == key).then_some(v.as_str()))
    }
}

/// Events recorded since [`capture_logs`] was called.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<CapturedEvent>>>);

impl CapturedLogs {
    /// Snapshot of the recorded events.
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.0.lock().clone()
    }

    /// Whether an event at `level` has a message containing `needle`.
    pub fn has_event(&self, level: Level, needle: &str) -> bool {
        self.0
            .lock()
            .iter()
            .any(|e| e.level == level && e.message.contains(needle))
    }
}

#[derive(Default)]
struct Fields {
    message: String,
    rest: Vec<(String, String)>,
}

impl Visit for Fields {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let rendered = format!("{value:?}");
        match field.name() {
            "message" => self.message = rendered,
            name => self.rest.push((name.to_owned(), rendered)),
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => value.clone_into(&mut self.message),
            name => self.rest.push((name.to_owned(), value.to_owned())),
        }
    }
}

impl<S: Subscriber> Layer<S> for CapturedLogs {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = Fields::default();
        event.record(&mut fields);
        self.0.lock().push(CapturedEvent {
            level: *event.metadata().level(),
            message: fields.message,
            fields: fields.rest,
        });
    }
}

/// Record every event on the current thread until the guard is dropped.
///
/// The subscriber is thread-local, so async tests need the current-thread
/// runtime that `#[tokio::test]` uses by default.
pub fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let guard = Registry::default().with(logs.clone()).set_default();
    (logs, guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_level_message_and_fields() {
        let (logs, _guard) = capture_logs();
        tracing::debug!("loaded");
        tracing::warn!(conversation_id = %"c1", stamped = 3_u64, "mark read failed");

        assert!(logs.has_event(Level::WARN, "mark read"));
        assert!(!logs.has_event(Level::INFO, "loaded"));
        let events = logs.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].field("conversation_id"), Some("c1"));
        assert_eq!(events[1].field("stamped"), Some("3"));
        assert_eq!(events[1].field("missing"), None);
    }
}
