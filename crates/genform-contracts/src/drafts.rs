use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::events::now_utc_iso;
use crate::values::FieldValues;

/// Saved form state for one storage namespace. Restored values are
/// untrusted and must be re-validated before submit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub model_id: String,
    #[serde(default)]
    pub values: FieldValues,
    #[serde(default)]
    pub saved_at: Option<String>,
}

impl Draft {
    pub fn new(model_id: impl Into<String>, values: FieldValues) -> Self {
        Self {
            model_id: model_id.into(),
            values,
            saved_at: None,
        }
    }
}

/// JSON file of drafts keyed by namespace. Writes merge only the touched
/// namespaces into whatever is on disk, so two stores sharing a file do not
/// clobber each other.
#[derive(Debug, Clone)]
pub struct DraftStore {
    path: PathBuf,
    payload: Map<String, Value>,
    dirty_keys: Vec<String>,
}

impl DraftStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            payload: Map::new(),
            dirty_keys: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&mut self, namespace: &str) -> Option<Draft> {
        self.refresh();
        let raw = self.payload.get(namespace)?.clone();
        match serde_json::from_value::<Draft>(raw) {
            Ok(draft) => Some(draft),
            Err(err) => {
                tracing::warn!(namespace, "ignoring unreadable draft: {err}");
                None
            }
        }
    }

    pub fn save(&mut self, namespace: &str, draft: &Draft) -> anyhow::Result<()> {
        self.refresh();
        let mut stamped = draft.clone();
        stamped.saved_at = Some(now_utc_iso());
        self.payload
            .insert(namespace.to_string(), serde_json::to_value(&stamped)?);
        self.mark_dirty(namespace);
        self.flush()
    }

    pub fn remove(&mut self, namespace: &str) -> anyhow::Result<bool> {
        self.refresh();
        if self.payload.remove(namespace).is_none() {
            return Ok(false);
        }
        self.mark_dirty(namespace);
        self.flush()?;
        Ok(true)
    }

    pub fn namespaces(&mut self) -> Vec<String> {
        self.refresh();
        self.payload.keys().cloned().collect()
    }

    fn mark_dirty(&mut self, namespace: &str) {
        if !self.dirty_keys.iter().any(|key| key == namespace) {
            self.dirty_keys.push(namespace.to_string());
        }
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        if self.dirty_keys.is_empty() {
            return Ok(());
        }
        let mut on_disk = read_json_object(&self.path).unwrap_or_default();
        for key in &self.dirty_keys {
            match self.payload.get(key) {
                Some(value) => {
                    on_disk.insert(key.clone(), value.clone());
                }
                None => {
                    on_disk.remove(key);
                }
            }
        }
        write_json_object(&self.path, &on_disk)?;
        self.payload = on_disk;
        self.dirty_keys.clear();
        Ok(())
    }

    fn refresh(&mut self) {
        self.payload = read_json_object(&self.path).unwrap_or_default();
    }
}

fn read_json_object(path: &Path) -> Option<Map<String, Value>> {
    let raw = std::fs::read_to_string(path).ok()?;
    let parsed: Value = serde_json::from_str(&raw).ok()?;
    parsed.as_object().cloned()
}

fn write_json_object(path: &Path, payload: &Map<String, Value>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(
        path,
        serde_json::to_string_pretty(&Value::Object(payload.clone()))?,
    )?;
    Ok(())
}
