//! JSONL file layer.
//!
//! Pipeline events carry a few well-known fields (`stream`,
//! `target_label`, `transaction_id`); they are lifted to the top level of
//! each line so `jq 'select(.stream == "orders")'` works without digging.
//! Everything else lands under `fields`.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::io::Write;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// One line of the log file.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: &'static str,
    pub service: String,
    pub pid: u32,
    pub target: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
}

impl LogEntry {
    fn put(&mut self, name: &str, value: Value) {
        let slot = match name {
            "message" => {
                self.message = as_text(value);
                return;
            }
            "stream" => &mut self.stream,
            "target_label" => &mut self.target_label,
            "transaction_id" => &mut self.transaction_id,
            _ => {
                self.fields.insert(name.to_string(), value);
                return;
            }
        };
        *slot = Some(as_text(value));
    }
}

fn as_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

impl Visit for LogEntry {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field.name(), Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field.name(), Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field.name(), value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field.name(), value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field.name(), value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        // NaN and infinities have no JSON number form.
        let value = serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(value.to_string()));
        self.put(field.name(), value);
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.put(field.name(), Value::String(value.to_string()));
    }
}

/// Writes each event as one [`LogEntry`] line.
pub struct JsonLayer<W> {
    service: String,
    pid: u32,
    make_writer: W,
}

impl<W> JsonLayer<W> {
    pub fn new(service: impl Into<String>, make_writer: W) -> Self {
        Self {
            service: service.into(),
            pid: std::process::id(),
            make_writer,
        }
    }
}

impl<S, W> Layer<S> for JsonLayer<W>
where
    S: Subscriber,
    W: for<'writer> MakeWriter<'writer> + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut entry = LogEntry {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            level: metadata.level().as_str(),
            service: self.service.clone(),
            pid: self.pid,
            target: metadata.target().to_string(),
            ..Default::default()
        };
        event.record(&mut entry);

        if let Ok(mut line) = serde_json::to_vec(&entry) {
            line.push(b'\n');
            let _ = self.make_writer.make_writer().write_all(&line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::io;
    use std::sync::Arc;
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn capture(f: impl FnOnce()) -> Vec<Value> {
        let captured = Captured::default();
        let subscriber =
            tracing_subscriber::registry().with(JsonLayer::new("conveyor", captured.clone()));
        tracing::subscriber::with_default(subscriber, f);

        let output = String::from_utf8(captured.0.lock().clone()).unwrap();
        output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_known_fields_are_lifted() {
        let lines = capture(|| {
            tracing::warn!(
                stream = "orders",
                target_label = "fallback.0.http_client",
                attempts = 3u64,
                "Delivery failed"
            );
        });

        assert_eq!(lines.len(), 1);
        let entry = &lines[0];
        assert_eq!(entry["level"], "WARN");
        assert_eq!(entry["service"], "conveyor");
        assert_eq!(entry["pid"], std::process::id());
        assert_eq!(entry["message"], "Delivery failed");
        assert_eq!(entry["stream"], "orders");
        assert_eq!(entry["target_label"], "fallback.0.http_client");
        assert_eq!(entry["fields"]["attempts"], 3);
        assert!(entry.get("transaction_id").is_none());
    }

    #[test]
    fn test_display_fields_are_strings() {
        let id = "5f0c";
        let lines = capture(|| {
            tracing::error!(transaction_id = %id, released = true, "Dropped");
        });

        assert_eq!(lines[0]["transaction_id"], "5f0c");
        assert_eq!(lines[0]["fields"]["released"], true);
        assert!(lines[0].get("stream").is_none());
    }
}
