use std::collections::BTreeMap;
use std::env;
use std::fs;

use anyhow::{bail, Context, Result};
use genform_contracts::values::{FileHandle, MediaKind};
use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use reqwest::header::AUTHORIZATION;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

/// What the upload collaborator hands back for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub url: String,
    pub format: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

pub trait Uploader: Send + Sync {
    fn name(&self) -> &str;
    fn upload(&self, file: &FileHandle) -> Result<UploadedFile>;
}

#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub endpoint: String,
    pub params: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InferenceResponse {
    pub success: bool,
    pub result_urls: Vec<String>,
    pub error: Option<String>,
}

impl InferenceResponse {
    pub fn succeeded(result_urls: Vec<String>) -> Self {
        Self {
            success: true,
            result_urls,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result_urls: Vec::new(),
            error: Some(error.into()),
        }
    }
}

pub trait InferenceProvider: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &InferenceRequest) -> Result<InferenceResponse>;
}

#[derive(Default)]
pub struct InferenceProviderRegistry {
    providers: BTreeMap<String, Box<dyn InferenceProvider>>,
}

impl InferenceProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: InferenceProvider + 'static>(&mut self, provider: P) {
        self.providers
            .insert(provider.name().to_string(), Box::new(provider));
    }

    pub fn get(&self, name: &str) -> Option<&dyn InferenceProvider> {
        self.providers.get(name).map(|provider| provider.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

pub fn default_provider_registry() -> InferenceProviderRegistry {
    let mut providers = InferenceProviderRegistry::new();
    providers.register(DryrunProvider);
    providers.register(FalProvider::new());
    providers
}

/// Offline provider: result URLs are derived from a hash of the request, so
/// identical submissions yield identical results.
pub struct DryrunProvider;

impl InferenceProvider for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, request: &InferenceRequest) -> Result<InferenceResponse> {
        let count = ["num_images", "n"]
            .iter()
            .find_map(|key| request.params.get(*key).and_then(Value::as_u64))
            .unwrap_or(1)
            .clamp(1, 8);
        let digest = stable_hash(&json!({
            "endpoint": request.endpoint,
            "params": request.params,
        }));
        let endpoint = request.endpoint.trim().trim_matches('/');
        let urls = (0..count)
            .map(|idx| format!("dryrun://{endpoint}/{}-{idx:02}", &digest[..16]))
            .collect();
        Ok(InferenceResponse::succeeded(urls))
    }
}

/// fal.run-style synchronous HTTP inference.
pub struct FalProvider {
    api_base: String,
    http: HttpClient,
}

impl FalProvider {
    pub fn new() -> Self {
        Self {
            api_base: non_empty_env("FAL_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or_else(|| "https://fal.run".to_string()),
            http: HttpClient::new(),
        }
    }

    fn api_key() -> Option<String> {
        non_empty_env("FAL_KEY").or_else(|| non_empty_env("FAL_API_KEY"))
    }

    fn resolve_endpoint(&self, endpoint: &str) -> String {
        let raw = endpoint.trim();
        if raw.starts_with("http://") || raw.starts_with("https://") {
            return raw.to_string();
        }
        format!("{}/{}", self.api_base, raw.trim_start_matches('/'))
    }

    fn extract_urls(value: &Value, out: &mut Vec<String>) {
        match value {
            Value::String(url) => {
                let trimmed = url.trim();
                if trimmed.starts_with("http") && !out.iter().any(|existing| existing == trimmed)
                {
                    out.push(trimmed.to_string());
                }
            }
            Value::Array(rows) => {
                for row in rows {
                    Self::extract_urls(row, out);
                }
            }
            Value::Object(obj) => {
                for key in ["url", "images", "image", "video", "videos", "output"] {
                    if let Some(nested) = obj.get(key) {
                        Self::extract_urls(nested, out);
                    }
                }
            }
            _ => {}
        }
    }

    fn reported_error(payload: &Value) -> Option<String> {
        ["error", "detail"].iter().find_map(|key| match payload.get(*key) {
            Some(Value::String(message)) if !message.trim().is_empty() => {
                Some(message.trim().to_string())
            }
            Some(Value::Null) | None => None,
            Some(other) => Some(truncate_text(&other.to_string(), 512)),
        })
    }
}

impl Default for FalProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceProvider for FalProvider {
    fn name(&self) -> &str {
        "fal"
    }

    fn generate(&self, request: &InferenceRequest) -> Result<InferenceResponse> {
        let Some(api_key) = Self::api_key() else {
            bail!("FAL_KEY (or FAL_API_KEY) not set");
        };
        let endpoint = self.resolve_endpoint(&request.endpoint);
        let response = self
            .http
            .post(&endpoint)
            .header(AUTHORIZATION, format!("Key {api_key}"))
            .json(&Value::Object(request.params.clone()))
            .send()
            .with_context(|| format!("Fal request failed ({endpoint})"))?;
        let payload = response_json_or_error("Fal", response)?;
        if let Some(message) = Self::reported_error(&payload) {
            return Ok(InferenceResponse::failed(message));
        }
        let mut urls = Vec::new();
        Self::extract_urls(&payload, &mut urls);
        if urls.is_empty() {
            return Ok(InferenceResponse::failed("Fal response returned no result URLs"));
        }
        Ok(InferenceResponse::succeeded(urls))
    }
}

/// Leaves files where they are and hands back `file://` URLs.
pub struct LocalUploader;

impl Uploader for LocalUploader {
    fn name(&self) -> &str {
        "local"
    }

    fn upload(&self, file: &FileHandle) -> Result<UploadedFile> {
        let path = fs::canonicalize(&file.path)
            .with_context(|| format!("failed reading {}", file.path.display()))?;
        let (width, height) = match file.media_kind() {
            Some(MediaKind::Image) => match image::image_dimensions(&path) {
                Ok((width, height)) => (Some(width), Some(height)),
                Err(err) => {
                    tracing::debug!(path = %path.display(), "no image dimensions: {err}");
                    (None, None)
                }
            },
            _ => (None, None),
        };
        Ok(UploadedFile {
            url: format!("file://{}", path.display()),
            format: file_format(file),
            width,
            height,
        })
    }
}

/// Unsigned multipart upload to a Cloudinary-style endpoint.
pub struct HttpUploader {
    endpoint: String,
    preset: Option<String>,
    http: HttpClient,
}

impl HttpUploader {
    pub fn new(endpoint: impl Into<String>, preset: Option<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            preset,
            http: HttpClient::new(),
        }
    }

    /// `GENFORM_UPLOAD_URL` and optional `GENFORM_UPLOAD_PRESET`.
    pub fn from_env() -> Option<Self> {
        let endpoint = non_empty_env("GENFORM_UPLOAD_URL")?;
        Some(Self::new(endpoint, non_empty_env("GENFORM_UPLOAD_PRESET")))
    }
}

impl Uploader for HttpUploader {
    fn name(&self) -> &str {
        "http"
    }

    fn upload(&self, file: &FileHandle) -> Result<UploadedFile> {
        let bytes = fs::read(&file.path)
            .with_context(|| format!("failed reading {}", file.path.display()))?;
        let part = MultipartPart::bytes(bytes)
            .file_name(file.file_name())
            .mime_str(&file.mime_type)
            .with_context(|| format!("invalid mime type {}", file.mime_type))?;
        let mut form = MultipartForm::new().part("file", part);
        if let Some(preset) = self.preset.as_ref() {
            form = form.text("upload_preset", preset.clone());
        }
        let response = self
            .http
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .with_context(|| format!("Upload request failed ({})", self.endpoint))?;
        let payload = response_json_or_error("Upload", response)?;
        let Some(url) = ["secure_url", "url"]
            .iter()
            .find_map(|key| payload.get(*key).and_then(Value::as_str))
            .map(str::to_string)
        else {
            bail!("Upload response returned no URL");
        };
        let dimension = |key: &str| {
            payload
                .get(key)
                .and_then(Value::as_u64)
                .and_then(|value| u32::try_from(value).ok())
        };
        Ok(UploadedFile {
            url,
            format: payload
                .get("format")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| file_format(file)),
            width: dimension("width"),
            height: dimension("height"),
        })
    }
}

fn file_format(file: &FileHandle) -> String {
    file.path
        .extension()
        .and_then(|value| value.to_str())
        .map(str::to_ascii_lowercase)
        .or_else(|| {
            file.mime_type
                .split_once('/')
                .map(|(_, subtype)| subtype.to_string())
        })
        .unwrap_or_else(|| "bin".to_string())
}

fn response_json_or_error(label: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{label} response body read failed"))?;
    if !status.is_success() {
        bail!("{label} request failed ({code}): {}", truncate_text(&body, 512));
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{label} returned invalid JSON payload"))?;
    Ok(parsed)
}

/// Joins an error chain into one line, skipping repeated causes.
pub(crate) fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() || parts.last().map(String::as_str) == Some(trimmed) {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    truncate_text(&parts.join(": "), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn stable_hash(payload: &Value) -> String {
    let bytes = serde_json::to_vec(payload).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;

    fn request(params: Value) -> InferenceRequest {
        InferenceRequest {
            endpoint: "fal-ai/flux/dev".to_string(),
            params: params.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn dryrun_is_deterministic_and_honours_image_count() -> Result<()> {
        let provider = DryrunProvider;
        let first = provider.generate(&request(json!({"prompt": "boat", "num_images": 3})))?;
        let again = provider.generate(&request(json!({"prompt": "boat", "num_images": 3})))?;
        let other = provider.generate(&request(json!({"prompt": "lake"})))?;

        assert!(first.success);
        assert_eq!(first.result_urls.len(), 3);
        assert_eq!(first, again);
        assert_eq!(other.result_urls.len(), 1);
        assert_ne!(other.result_urls[0], first.result_urls[0]);
        assert!(first.result_urls[0].starts_with("dryrun://fal-ai/flux/dev/"));
        Ok(())
    }

    #[test]
    fn registry_holds_builtin_providers() {
        let registry = default_provider_registry();
        assert_eq!(registry.names(), vec!["dryrun", "fal"]);
        assert!(registry.get("dryrun").is_some());
        assert!(registry.get("replicate").is_none());
    }

    #[test]
    fn fal_extracts_image_and_video_urls() {
        let payload = json!({
            "images": [{"url": "https://cdn/a.png"}, {"url": "https://cdn/a.png"}],
            "video": {"url": "https://cdn/b.mp4"},
            "seed": 42
        });
        let mut urls = Vec::new();
        FalProvider::extract_urls(&payload, &mut urls);
        assert_eq!(urls, vec!["https://cdn/a.png", "https://cdn/b.mp4"]);
        assert_eq!(
            FalProvider::reported_error(&json!({"detail": "quota exceeded"})),
            Some("quota exceeded".to_string())
        );
    }

    #[test]
    fn fal_endpoints_join_the_api_base() {
        let provider = FalProvider {
            api_base: "https://fal.run".to_string(),
            http: HttpClient::new(),
        };
        assert_eq!(
            provider.resolve_endpoint("/fal-ai/veo3"),
            "https://fal.run/fal-ai/veo3"
        );
        assert_eq!(
            provider.resolve_endpoint("https://queue.fal.run/x"),
            "https://queue.fal.run/x"
        );
    }

    #[test]
    fn local_uploader_reports_dimensions() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("start.png");
        let mut pixels = RgbImage::new(3, 2);
        for pixel in pixels.pixels_mut() {
            *pixel = Rgb([10, 20, 30]);
        }
        pixels.save(&path)?;

        let uploaded = LocalUploader.upload(&FileHandle::from_path(&path)?)?;
        assert!(uploaded.url.starts_with("file://"));
        assert_eq!(uploaded.format, "png");
        assert_eq!((uploaded.width, uploaded.height), (Some(3), Some(2)));
        Ok(())
    }

    #[test]
    fn local_uploader_fails_for_missing_files() {
        let handle = FileHandle {
            path: "/definitely/not/here.png".into(),
            mime_type: "image/png".to_string(),
            size_bytes: 1,
        };
        assert!(LocalUploader.upload(&handle).is_err());
    }

    #[test]
    fn error_chain_is_flattened() {
        let err = anyhow::anyhow!("socket closed").context("Fal request failed");
        assert_eq!(error_chain_text(&err, 200), "Fal request failed: socket closed");
        assert_eq!(truncate_text("abcdef", 3), "abc…");
    }
}
