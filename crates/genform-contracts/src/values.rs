use std::path::{Path, PathBuf};

use anyhow::Context;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;
pub const MAX_VIDEO_BYTES: u64 = 100 * 1024 * 1024;

/// Field values of the active session, keyed by UI field name.
pub type FieldValues = IndexMap<String, FieldValue>;

/// Human-readable messages keyed by UI field name. Empty means valid.
pub type FieldErrors = IndexMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }

    pub fn max_bytes(&self) -> u64 {
        match self {
            Self::Image => MAX_IMAGE_BYTES,
            Self::Video => MAX_VIDEO_BYTES,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "image" | "images" => Some(Self::Image),
            "video" | "videos" => Some(Self::Video),
            _ => None,
        }
    }
}

/// Opaque reference to a local file the user attached. Only the upload
/// collaborator reads its bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHandle {
    pub path: PathBuf,
    pub mime_type: String,
    pub size_bytes: u64,
}

impl FileHandle {
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        if !metadata.is_file() {
            anyhow::bail!("{} is not a file", path.display());
        }
        Ok(Self {
            path: path.to_path_buf(),
            mime_type: mime_for_path(path)
                .unwrap_or("application/octet-stream")
                .to_string(),
            size_bytes: metadata.len(),
        })
    }

    pub fn media_kind(&self) -> Option<MediaKind> {
        let (head, _) = self.mime_type.split_once('/')?;
        MediaKind::parse(head)
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or("upload")
            .to_string()
    }
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(str::to_ascii_lowercase)?;
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "mp4" => Some("video/mp4"),
        "mov" => Some("video/quicktime"),
        "webm" => Some("video/webm"),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    File(FileHandle),
    Files(Vec<FileHandle>),
    Json(Value),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Json(Value::String(value.into()))
    }

    pub fn null() -> Self {
        Self::Json(Value::Null)
    }

    /// `undefined`/`null`, whitespace-only strings and empty arrays are blank.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::File(_) => false,
            Self::Files(files) => files.is_empty(),
            Self::Json(Value::Null) => true,
            Self::Json(Value::String(text)) => text.trim().is_empty(),
            Self::Json(Value::Array(rows)) => rows.is_empty(),
            Self::Json(_) => false,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_json().and_then(Value::as_str)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_json().and_then(parse_value_to_f64)
    }

    pub fn files(&self) -> Vec<&FileHandle> {
        match self {
            Self::File(file) => vec![file],
            Self::Files(files) => files.iter().collect(),
            Self::Json(_) => Vec::new(),
        }
    }

    /// Text form used to compare against select options.
    pub fn option_key(&self) -> Option<String> {
        self.as_json().and_then(option_key)
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<FileHandle> for FieldValue {
    fn from(value: FileHandle) -> Self {
        Self::File(value)
    }
}

pub fn is_blank(value: Option<&FieldValue>) -> bool {
    value.map(FieldValue::is_blank).unwrap_or(true)
}

pub fn parse_value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(raw) => raw.as_f64(),
        Value::String(raw) => raw.trim().parse::<f64>().ok(),
        _ => None,
    }
}

pub fn value_as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(raw) => Some(*raw),
        Value::Number(raw) => raw.as_i64().map(|value| value != 0),
        Value::String(raw) => {
            let lowered = raw.trim().to_ascii_lowercase();
            if matches!(lowered.as_str(), "1" | "true" | "yes" | "on") {
                Some(true)
            } else if matches!(lowered.as_str(), "0" | "false" | "no" | "off") {
                Some(false)
            } else {
                None
            }
        }
        _ => None,
    }
}

pub fn option_key(value: &Value) -> Option<String> {
    match value {
        Value::String(raw) => Some(raw.trim().to_string()),
        Value::Number(raw) => Some(
            raw.as_f64()
                .map(trim_float)
                .unwrap_or_else(|| raw.to_string()),
        ),
        Value::Bool(raw) => Some(raw.to_string()),
        _ => None,
    }
}

pub fn trim_float(value: f64) -> String {
    let text = format!("{value:.6}");
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn blank_covers_null_whitespace_and_empty_arrays() {
        assert!(FieldValue::null().is_blank());
        assert!(FieldValue::text("   ").is_blank());
        assert!(FieldValue::Json(json!([])).is_blank());
        assert!(FieldValue::Files(Vec::new()).is_blank());
        assert!(is_blank(None));
        assert!(!FieldValue::text("boat").is_blank());
        assert!(!FieldValue::Json(json!(0)).is_blank());
        assert!(!FieldValue::Json(json!(false)).is_blank());
    }

    #[test]
    fn option_key_normalizes_numbers_and_strings() {
        assert_eq!(option_key(&json!(5)), Some("5".to_string()));
        assert_eq!(option_key(&json!(5.0)), Some("5".to_string()));
        assert_eq!(option_key(&json!(" 10 ")), Some("10".to_string()));
        assert_eq!(option_key(&json!(null)), None);
    }

    #[test]
    fn file_handle_reads_size_and_mime() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("ref.png");
        std::fs::write(&path, b"png-bytes")?;
        let handle = FileHandle::from_path(&path)?;
        assert_eq!(handle.size_bytes, 9);
        assert_eq!(handle.mime_type, "image/png");
        assert_eq!(handle.media_kind(), Some(MediaKind::Image));
        assert_eq!(handle.file_name(), "ref.png");
        Ok(())
    }

    #[test]
    fn file_values_deserialize_ahead_of_plain_json() -> anyhow::Result<()> {
        let raw = json!({"path": "/tmp/a.mp4", "mime_type": "video/mp4", "size_bytes": 3});
        let parsed: FieldValue = serde_json::from_value(raw)?;
        assert!(matches!(parsed, FieldValue::File(_)));
        let parsed: FieldValue = serde_json::from_value(json!("hello"))?;
        assert_eq!(parsed.as_str(), Some("hello"));
        Ok(())
    }
}
