use std::env;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde_json::Value;

use super::descriptor::ModelDescriptor;
use crate::values::MediaKind;

const DEFAULT_CATALOG_JSON: &str = include_str!("../../resources/default_catalog.json");

#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: IndexMap<String, ModelDescriptor>,
}

impl ModelCatalog {
    /// `None` loads the built-in catalog merged with the local override file.
    pub fn new(models: Option<IndexMap<String, ModelDescriptor>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    /// Built-in catalog only, ignoring any override file.
    pub fn builtin() -> Self {
        Self {
            models: parse_catalog_rows(DEFAULT_CATALOG_JSON),
        }
    }

    pub fn from_records(records: impl IntoIterator<Item = ModelDescriptor>) -> Self {
        let mut models = IndexMap::new();
        for record in records {
            insert_checked(&mut models, record);
        }
        Self { models }
    }

    pub fn get(&self, id: &str) -> Option<&ModelDescriptor> {
        self.models.get(id)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.values()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn by_media(&self, media: MediaKind) -> Vec<ModelDescriptor> {
        self.models
            .values()
            .filter(|model| model.media == media)
            .cloned()
            .collect()
    }

    pub fn ensure(&self, id: &str, media: MediaKind) -> Option<ModelDescriptor> {
        let model = self.get(id)?;
        if model.media == media {
            return Some(model.clone());
        }
        None
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::new(None)
    }
}

fn default_models() -> IndexMap<String, ModelDescriptor> {
    let mut merged = parse_catalog_rows(DEFAULT_CATALOG_JSON);
    if let Some(path) = catalog_override_path() {
        match std::fs::read_to_string(&path) {
            Ok(raw) => merge_catalog_rows(&mut merged, &raw),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(path = %path.display(), "catalog overrides unreadable: {err}")
            }
        }
    }
    merged
}

/// `GENFORM_CATALOG_OVERRIDES`, else `~/.genform/catalog_overrides.json`.
pub fn catalog_override_path() -> Option<PathBuf> {
    if let Some(explicit) = env::var_os("GENFORM_CATALOG_OVERRIDES").filter(|raw| !raw.is_empty())
    {
        return Some(PathBuf::from(explicit));
    }
    env::var_os("HOME")
        .map(PathBuf::from)
        .map(|home| home.join(".genform").join("catalog_overrides.json"))
}

fn parse_catalog_rows(raw: &str) -> IndexMap<String, ModelDescriptor> {
    let mut rows = IndexMap::new();
    merge_catalog_rows(&mut rows, raw);
    rows
}

/// Accepts either a bare array of records or `{"models": [...]}`. Records
/// replace existing ids in place; new ids are appended.
fn merge_catalog_rows(rows: &mut IndexMap<String, ModelDescriptor>, raw: &str) {
    let payload = match serde_json::from_str::<Value>(raw) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::warn!("catalog payload is not valid JSON: {err}");
            return;
        }
    };
    let records = match payload {
        Value::Array(records) => records,
        Value::Object(mut root) => match root.remove("models") {
            Some(Value::Array(records)) => records,
            _ => {
                tracing::warn!("catalog payload has no `models` array");
                return;
            }
        },
        _ => return,
    };
    for record in records {
        match serde_json::from_value::<ModelDescriptor>(record) {
            Ok(model) => insert_checked(rows, model),
            Err(err) => tracing::warn!("skipping malformed catalog record: {err}"),
        }
    }
}

fn insert_checked(rows: &mut IndexMap<String, ModelDescriptor>, model: ModelDescriptor) {
    let problems = model.problems();
    if !problems.is_empty() {
        tracing::warn!(model = %model.id, "skipping catalog record: {}", problems.join("; "));
        return;
    }
    rows.insert(model.id.clone(), model);
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn builtin_catalog_loads_every_record() {
        let catalog = ModelCatalog::builtin();
        let declared = serde_json::from_str::<Value>(DEFAULT_CATALOG_JSON)
            .ok()
            .and_then(|value| value.get("models").and_then(Value::as_array).map(Vec::len))
            .unwrap_or(0);
        assert!(declared > 0);
        assert_eq!(catalog.len(), declared);
    }

    #[test]
    fn builtin_catalog_has_unique_fields_per_model() {
        for model in ModelCatalog::builtin().list() {
            let unique = model.fields.iter().collect::<HashSet<_>>();
            assert_eq!(unique.len(), model.fields.len(), "{}", model.id);
        }
    }

    #[test]
    fn overrides_replace_and_append_by_id() {
        let mut rows = parse_catalog_rows(DEFAULT_CATALOG_JSON);
        let before = rows.len();
        let first_id = rows.keys().next().cloned().unwrap_or_default();
        let raw = serde_json::json!([
            {
                "id": first_id,
                "display_name": "Renamed",
                "endpoint": "fal-ai/renamed",
                "media": "image",
                "cost": {"type": "fixed", "amount": 0.01}
            },
            {
                "id": "custom-model",
                "display_name": "Custom",
                "endpoint": "fal-ai/custom",
                "media": "video",
                "cost": {"type": "per_second", "rate_per_second": 0.1}
            },
            {"id": "broken"}
        ])
        .to_string();
        merge_catalog_rows(&mut rows, &raw);
        assert_eq!(rows.len(), before + 1);
        assert_eq!(rows[&first_id].display_name, "Renamed");
        assert_eq!(rows.get_index(0).map(|(id, _)| id.clone()), Some(first_id));
        assert!(rows.contains_key("custom-model"));
        assert!(!rows.contains_key("broken"));
    }

    #[test]
    fn malformed_override_payload_is_ignored() {
        let mut rows = parse_catalog_rows(DEFAULT_CATALOG_JSON);
        let before = rows.len();
        merge_catalog_rows(&mut rows, "{not json");
        merge_catalog_rows(&mut rows, "42");
        assert_eq!(rows.len(), before);
    }

    #[test]
    fn negative_rates_are_rejected() {
        let catalog = ModelCatalog::from_records(vec![ModelDescriptor {
            id: "negative".to_string(),
            display_name: "Negative".to_string(),
            endpoint: "x".to_string(),
            media: MediaKind::Image,
            fields: Vec::new(),
            field_options: IndexMap::new(),
            capabilities: Default::default(),
            cost: crate::catalog::CostDescriptor::Fixed { amount: -0.5 },
        }]);
        assert!(catalog.is_empty());
    }

    #[test]
    fn by_media_filters_and_ensure_checks_kind() {
        let catalog = ModelCatalog::builtin();
        let videos = catalog.by_media(MediaKind::Video);
        assert!(!videos.is_empty());
        assert!(videos.iter().all(|model| model.media == MediaKind::Video));
        let video_id = videos[0].id.clone();
        assert!(catalog.ensure(&video_id, MediaKind::Video).is_some());
        assert!(catalog.ensure(&video_id, MediaKind::Image).is_none());
    }
}
