use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::values::FieldErrors;

/// Lifecycle events of a generation session, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted {
        model_id: Option<String>,
        mode: String,
    },
    ModelSelected {
        model_id: String,
        seeded_fields: Vec<String>,
    },
    DraftLoaded {
        accepted: Vec<String>,
        dropped: Vec<String>,
    },
    StateChanged {
        from: String,
        to: String,
    },
    ValidationFailed {
        errors: FieldErrors,
    },
    CostEstimate {
        model_id: String,
        amount: f64,
        display: String,
    },
    UploadCompleted {
        count: usize,
    },
    GenerationSucceeded {
        model_id: String,
        result_urls: Vec<String>,
    },
    GenerationFailed {
        stage: String,
        error: String,
    },
}

/// Append-only writer for a session's `events.jsonl`.
///
/// Every line carries `type`, `session_id` and `ts`; event fields are merged
/// last and may override them.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: PathBuf,
    session_id: String,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path: path.into(),
                session_id: session_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn record(&self, event: &SessionEvent) -> anyhow::Result<Value> {
        let Value::Object(mut payload) = serde_json::to_value(event)? else {
            anyhow::bail!("session event did not serialize to an object");
        };
        let event_type = payload
            .remove("type")
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string());
        self.emit(&event_type, payload)
    }

    pub fn emit(&self, event_type: &str, payload: Map<String, Value>) -> anyhow::Result<Value> {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(event_type.to_string()));
        event.insert(
            "session_id".to_string(),
            Value::String(self.inner.session_id.clone()),
        );
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        for (key, value) in payload {
            event.insert(key, value);
        }

        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(&event)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(event))
    }
}

/// Parses an events file, skipping lines that are not JSON objects.
pub fn read_events(path: &Path) -> anyhow::Result<Vec<Map<String, Value>>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(raw
        .lines()
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .filter_map(|row| row.as_object().cloned())
        .collect())
}

pub fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use serde_json::json;

    use super::*;

    #[test]
    fn record_writes_tagged_event_with_defaults() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "session-123");

        let emitted = writer.record(&SessionEvent::StateChanged {
            from: "idle".to_string(),
            to: "validating".to_string(),
        })?;

        let rows = read_events(&path)?;
        assert_eq!(rows.len(), 1);
        assert_eq!(Value::Object(rows[0].clone()), emitted);
        assert_eq!(rows[0]["type"], json!("state_changed"));
        assert_eq!(rows[0]["session_id"], json!("session-123"));
        assert_eq!(rows[0]["from"], json!("idle"));
        assert_eq!(rows[0]["to"], json!("validating"));
        DateTime::parse_from_rfc3339(rows[0]["ts"].as_str().unwrap_or(""))?;
        Ok(())
    }

    #[test]
    fn payload_can_override_default_keys() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = EventWriter::new(temp.path().join("events.jsonl"), "session-123");

        let mut payload = Map::new();
        payload.insert("session_id".to_string(), json!("override-session"));
        let emitted = writer.emit("custom", payload)?;

        assert_eq!(emitted["type"], json!("custom"));
        assert_eq!(emitted["session_id"], json!("override-session"));
        Ok(())
    }

    #[test]
    fn events_append_in_order_and_skip_garbage_lines() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("events.jsonl");
        let writer = EventWriter::new(&path, "session-123");

        writer.record(&SessionEvent::UploadCompleted { count: 2 })?;
        writer.record(&SessionEvent::GenerationFailed {
            stage: "generating".to_string(),
            error: "boom".to_string(),
        })?;
        let mut file = OpenOptions::new().append(true).open(&path)?;
        file.write_all(b"not json\n")?;

        let rows = read_events(&path)?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["type"], json!("upload_completed"));
        assert_eq!(rows[0]["count"], json!(2));
        assert_eq!(rows[1]["stage"], json!("generating"));
        Ok(())
    }
}
