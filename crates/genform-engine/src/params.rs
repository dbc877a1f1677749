use std::thread;

use anyhow::{anyhow, bail, Context, Result};
use genform_contracts::catalog::ModelDescriptor;
use genform_contracts::fields::{resolve, FieldKind};
use genform_contracts::values::{FieldValue, FieldValues, FileHandle};
use serde_json::{Map, Value};

use crate::defaults::{apply_defaults, coerce_value, normalize_field_names};
use crate::providers::{UploadedFile, Uploader};

/// File slot waiting for the upload collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingUpload {
    pub field: String,
    pub files: Vec<FileHandle>,
    pub multiple: bool,
}

/// Payload with defaults applied and scalars coerced, still keyed by UI
/// field names. File fields are held back until uploaded.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPayload {
    params: Map<String, Value>,
    uploads: Vec<PendingUpload>,
}

/// Payload whose file fields all carry URLs.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPayload {
    params: Map<String, Value>,
    uploaded: Vec<UploadedFile>,
}

pub fn prepare_payload(values: &FieldValues, model: &ModelDescriptor) -> PendingPayload {
    let filled = apply_defaults(values, model);
    let mut params = Map::new();
    let mut uploads = Vec::new();
    for (name, value) in filled {
        let metadata = resolve(&name, model);
        let value = coerce_value(&metadata, value);
        if value.is_blank() {
            continue;
        }
        match value {
            FieldValue::File(file) => uploads.push(PendingUpload {
                multiple: matches!(metadata.kind, FieldKind::Files { .. }),
                field: name,
                files: vec![file],
            }),
            FieldValue::Files(files) => uploads.push(PendingUpload {
                field: name,
                files,
                multiple: true,
            }),
            FieldValue::Json(raw) => {
                params.insert(name, raw);
            }
        }
    }
    PendingPayload { params, uploads }
}

impl PendingPayload {
    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    pub fn uploads(&self) -> &[PendingUpload] {
        &self.uploads
    }

    pub fn has_uploads(&self) -> bool {
        !self.uploads.is_empty()
    }

    pub fn file_count(&self) -> usize {
        self.uploads.iter().map(|slot| slot.files.len()).sum()
    }

    /// Uploads every held-back file concurrently. Any single failure fails the
    /// whole stage and nothing is returned.
    pub fn resolve_uploads(self, uploader: &dyn Uploader) -> Result<ResolvedPayload> {
        let Self { mut params, uploads } = self;
        if uploads.is_empty() {
            return Ok(ResolvedPayload {
                params,
                uploaded: Vec::new(),
            });
        }
        for slot in &uploads {
            for file in &slot.files {
                check_upload(&slot.field, file)?;
            }
        }

        let jobs: Vec<(usize, &FileHandle)> = uploads
            .iter()
            .enumerate()
            .flat_map(|(slot, upload)| upload.files.iter().map(move |file| (slot, file)))
            .collect();
        let outcomes: Vec<(usize, Result<UploadedFile>)> = thread::scope(|scope| {
            let handles: Vec<_> = jobs
                .iter()
                .map(|(slot, file)| {
                    let slot = *slot;
                    let file = *file;
                    (slot, scope.spawn(move || uploader.upload(file)))
                })
                .collect();
            handles
                .into_iter()
                .map(|(slot, handle)| {
                    let outcome = handle
                        .join()
                        .unwrap_or_else(|_| Err(anyhow!("upload worker panicked")));
                    (slot, outcome)
                })
                .collect()
        });

        let mut urls: Vec<Vec<Value>> = vec![Vec::new(); uploads.len()];
        let mut uploaded = Vec::with_capacity(outcomes.len());
        for (slot, outcome) in outcomes {
            let field = &uploads[slot].field;
            let file = outcome.with_context(|| format!("upload failed for {field}"))?;
            urls[slot].push(Value::String(file.url.clone()));
            uploaded.push(file);
        }
        for (slot, mut slot_urls) in uploads.iter().zip(urls) {
            let value = if slot.multiple {
                Value::Array(slot_urls)
            } else {
                slot_urls.pop().unwrap_or(Value::Null)
            };
            params.insert(slot.field.clone(), value);
        }
        Ok(ResolvedPayload { params, uploaded })
    }
}

impl ResolvedPayload {
    pub fn uploaded(&self) -> &[UploadedFile] {
        &self.uploaded
    }

    /// Final request body: backend field names, empty values removed.
    pub fn into_params(self, model: &ModelDescriptor) -> Map<String, Value> {
        strip_empty_values(normalize_field_names(&self.params, model))
    }
}

/// Size and MIME checks run before the collaborator sees the file.
fn check_upload(field: &str, file: &FileHandle) -> Result<()> {
    let Some(media) = file.media_kind() else {
        bail!(
            "{field}: {} has unsupported type {}",
            file.file_name(),
            file.mime_type
        );
    };
    if file.size_bytes > media.max_bytes() {
        bail!(
            "{field}: {} exceeds the {} MB {} limit",
            file.file_name(),
            media.max_bytes() / (1024 * 1024),
            media.as_str()
        );
    }
    Ok(())
}

/// Drops nulls, blank strings, and empty arrays or objects. `false` and `0`
/// are kept.
pub fn strip_empty_values(params: Map<String, Value>) -> Map<String, Value> {
    params
        .into_iter()
        .filter(|(_, value)| match value {
            Value::Null => false,
            Value::String(text) => !text.trim().is_empty(),
            Value::Array(rows) => !rows.is_empty(),
            Value::Object(map) => !map.is_empty(),
            Value::Bool(_) | Value::Number(_) => true,
        })
        .collect()
}

/// Defaults, uploads, renaming and cleaning in one call.
pub fn build_params(
    values: &FieldValues,
    model: &ModelDescriptor,
    uploader: &dyn Uploader,
) -> Result<Map<String, Value>> {
    Ok(prepare_payload(values, model)
        .resolve_uploads(uploader)?
        .into_params(model))
}
