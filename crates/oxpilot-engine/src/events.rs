use oxpilot_common::events::{EventSink, EventType};

/// Default event sink: renders status events as structured log lines.
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn emit(&self, subject: &str, event_type: EventType, reason: &str, message: &str) {
        match event_type {
            EventType::Normal => {
                tracing::info!(subject = %subject, reason = %reason, "{message}");
            }
            EventType::Warning => {
                tracing::warn!(subject = %subject, reason = %reason, "{message}");
            }
        }
    }
}
