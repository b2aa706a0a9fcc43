//! Tracing layer that records events for assertions.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Records every event it sees, with its structured fields as strings.
///
/// Operator-facing logs are part of the contract (who was rate limited, which
/// dispatch attempt failed), so tests install this layer and assert on them.
///
/// ```
/// use formgate::infrastructure::mocks::MockCaptureLayer;
/// use tracing::{warn, Level};
/// use tracing_subscriber::layer::SubscriberExt;
///
/// let capture = MockCaptureLayer::new();
/// let subscriber = tracing_subscriber::registry().with(capture.clone());
///
/// tracing::subscriber::with_default(subscriber, || {
///     warn!(limiter = "contact", identity = %"10.0.0.1", "rate limit exceeded");
/// });
///
/// let warnings = capture.at_level(Level::WARN);
/// assert_eq!(warnings[0].field("limiter"), Some("contact"));
/// capture.clear();
/// assert_eq!(capture.count(), 0);
/// ```
#[derive(Clone, Default)]
pub struct MockCaptureLayer {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

/// One recorded event.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct CapturedEvent {
    pub level: Level,
    pub message: String,
    pub fields: HashMap<String, String>,
}

impl CapturedEvent {
    /// A recorded field rendered as text.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

impl MockCaptureLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far, oldest first.
    pub fn get_captured(&self) -> Vec<CapturedEvent> {
        self.events().clone()
    }

    /// Recorded events of exactly `level`.
    pub fn at_level(&self, level: Level) -> Vec<CapturedEvent> {
        self.events()
            .iter()
            .filter(|event| event.level == level)
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.events().len()
    }

    pub fn clear(&self) {
        self.events().clear();
    }

    fn events(&self) -> MutexGuard<'_, Vec<CapturedEvent>> {
        self.events.lock().expect(
            "MockCaptureLayer mutex poisoned - a test thread panicked while holding the lock",
        )
    }
}

impl<S: Subscriber> Layer<S> for MockCaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut recorder = FieldRecorder::default();
        event.record(&mut recorder);

        let mut fields = recorder.0;
        let message = fields.remove("message").unwrap_or_default();
        self.events().push(CapturedEvent {
            level: *event.metadata().level(),
            message,
            fields,
        });
    }
}

#[derive(Default)]
struct FieldRecorder(HashMap<String, String>);

impl Visit for FieldRecorder {
    // Keeps `%value` and string literals free of Debug quoting
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{error, info};
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_message_and_numeric_fields() {
        let capture = MockCaptureLayer::new();
        let subscriber = tracing_subscriber::registry().with(capture.clone());

        tracing::subscriber::with_default(subscriber, || {
            info!("form gate ready");
            error!(attempts = 3u32, reason = "smtp down", "notification dispatch exhausted");
        });

        assert_eq!(capture.count(), 2);
        let errors = capture.at_level(Level::ERROR);
        assert_eq!(errors[0].message, "notification dispatch exhausted");
        assert_eq!(errors[0].field("attempts"), Some("3"));
        assert_eq!(errors[0].field("reason"), Some("smtp down"));
        assert!(errors[0].field("message").is_none());
    }

    #[test]
    fn test_display_fields_are_unquoted() {
        let capture = MockCaptureLayer::new();
        let subscriber = tracing_subscriber::registry().with(capture.clone());
        let session = String::from("abc123");

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(session = %session, "csrf token mismatch");
        });

        assert_eq!(capture.get_captured()[0].field("session"), Some("abc123"));
    }
}
