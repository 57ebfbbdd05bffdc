use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Captured log entry
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: Level,
    pub message: String,
    /// Every non-message field, rendered as `name=value` pairs.
    pub fields: String,
    #[allow(dead_code)]
    pub target: String,
}

impl LogEntry {
    pub fn mentions(&self, text: &str) -> bool {
        self.message.contains(text) || self.fields.contains(text)
    }
}

/// Custom layer that captures logs for validation
pub struct LogCaptureLayer {
    logs: Arc<Mutex<Vec<LogEntry>>>,
}

impl LogCaptureLayer {
    pub fn new(logs: Arc<Mutex<Vec<LogEntry>>>) -> Self {
        Self { logs }
    }
}

impl<S> Layer<S> for LogCaptureLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let entry = LogEntry {
            level: *metadata.level(),
            message: visitor.message,
            fields: visitor.fields,
            target: metadata.target().to_string(),
        };

        self.logs.lock().unwrap().push(entry);
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: String,
}

impl tracing::field::Visit for FieldVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            let _ = write!(self.fields, "{}={} ", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        let rendered = format!("{:?}", value);
        // Remove quotes from debug format
        let rendered = rendered
            .strip_prefix('"')
            .and_then(|r| r.strip_suffix('"'))
            .map(str::to_string)
            .unwrap_or(rendered);
        if field.name() == "message" {
            self.message = rendered;
        } else {
            let _ = write!(self.fields, "{}={} ", field.name(), rendered);
        }
    }
}

/// Log validator for integration tests
pub struct LogValidator {
    logs: Arc<Mutex<Vec<LogEntry>>>,
}

impl LogValidator {
    pub fn new() -> Self {
        Self {
            logs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Get the capture layer for the subscriber
    pub fn layer(&self) -> LogCaptureLayer {
        LogCaptureLayer::new(Arc::clone(&self.logs))
    }

    /// Get all captured logs
    pub fn get_logs(&self) -> Vec<LogEntry> {
        self.logs.lock().unwrap().clone()
    }

    /// Entries at `level` whose message or fields mention `text`.
    pub fn find(&self, level: Level, text: &str) -> Vec<LogEntry> {
        self.get_logs()
            .into_iter()
            .filter(|log| log.level == level && log.mentions(text))
            .collect()
    }

    pub fn contains(&self, text: &str) -> bool {
        self.get_logs().iter().any(|log| log.mentions(text))
    }
}
