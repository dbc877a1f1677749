use genform_contracts::catalog::ModelDescriptor;
use genform_contracts::fields::{
    canonical_field_name, is_alias, resolve, FieldKind, FieldMetadata,
};
use genform_contracts::values::{
    is_blank, option_key, trim_float, value_as_bool, FieldErrors, FieldValue, FieldValues,
    MediaKind,
};
use serde_json::Value;

/// The active generation flow. Each mode carries a fixed list of fields that
/// must be non-blank before submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenerationMode {
    TextToImage,
    ImageReference,
    Restyle,
    TextToVideo,
    ImageToVideo,
    VideoToVideo,
    Template,
}

impl GenerationMode {
    pub const ALL: [GenerationMode; 7] = [
        Self::TextToImage,
        Self::ImageReference,
        Self::Restyle,
        Self::TextToVideo,
        Self::ImageToVideo,
        Self::VideoToVideo,
        Self::Template,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextToImage => "text-to-image",
            Self::ImageReference => "image-reference",
            Self::Restyle => "restyle",
            Self::TextToVideo => "text-to-video",
            Self::ImageToVideo => "image-to-video",
            Self::VideoToVideo => "video-to-video",
            Self::Template => "template",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == normalized)
    }

    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Self::TextToImage | Self::TextToVideo => &["prompt"],
            Self::ImageReference => &["prompt", "reference_images"],
            Self::Restyle => &["style_prompt", "original_image"],
            Self::ImageToVideo => &["prompt", "image_url"],
            Self::VideoToVideo => &["prompt", "video_url"],
            Self::Template => &["template"],
        }
    }

    pub fn media(&self) -> MediaKind {
        match self {
            Self::TextToImage | Self::ImageReference | Self::Restyle => MediaKind::Image,
            Self::TextToVideo | Self::ImageToVideo | Self::VideoToVideo | Self::Template => {
                MediaKind::Video
            }
        }
    }
}

/// UI names of the fields that must be non-blank for `mode` on `model`.
///
/// Every mode-required name is required whether or not the model declares
/// it. When the model declares the field under a UI alias instead
/// (`start_image` for `image_url`), the alias is required in its place.
/// Fields the model itself marks `required` are appended.
pub fn required_fields(mode: GenerationMode, model: &ModelDescriptor) -> Vec<String> {
    let mut required: Vec<String> = Vec::new();
    for wanted in mode.required_fields() {
        let field = declared_name(model, wanted).unwrap_or(wanted).to_string();
        if !required.contains(&field) {
            required.push(field);
        }
    }
    for field in &model.fields {
        let marked = model
            .options_for(field)
            .and_then(|options| options.required)
            .unwrap_or(false);
        if marked && !required.contains(field) {
            required.push(field.clone());
        }
    }
    required
}

/// True when the model declares every field `mode` requires, so a form for
/// that mode can be completed at all.
pub fn supports_mode(mode: GenerationMode, model: &ModelDescriptor) -> bool {
    mode.media() == model.media
        && mode
            .required_fields()
            .iter()
            .all(|wanted| declared_name(model, wanted).is_some())
}

fn declared_name<'a>(model: &'a ModelDescriptor, wanted: &str) -> Option<&'a str> {
    model
        .fields
        .iter()
        .find(|field| field.as_str() == wanted)
        .or_else(|| {
            model
                .fields
                .iter()
                .find(|field| is_alias(field) && canonical_field_name(field) == wanted)
        })
        .map(String::as_str)
}

/// First error for one field, checking in order: required, field-declared
/// constraints, file size ceilings, then the field's custom rule.
pub fn validate_field(
    name: &str,
    value: Option<&FieldValue>,
    mode: GenerationMode,
    model: &ModelDescriptor,
) -> Option<String> {
    let metadata = resolve(name, model);
    if is_blank(value) {
        let required = metadata.required
            || required_fields(mode, model)
                .iter()
                .any(|field| field == name);
        if required {
            return Some(format!("{} is required", metadata.label));
        }
        return None;
    }
    let value = value?;
    if let Some(message) = check_declared_constraints(&metadata, value, model) {
        return Some(message);
    }
    if let Some(message) = check_file_sizes(&metadata, value) {
        return Some(message);
    }
    let rule = metadata.rules.custom?;
    rule(value, model).map(|message| format!("{} {message}", metadata.label))
}

/// Validates the mode-required set and every field present in `values`,
/// visible or not.
pub fn validate_all(
    values: &FieldValues,
    mode: GenerationMode,
    model: &ModelDescriptor,
) -> FieldErrors {
    let mut errors = FieldErrors::new();
    for name in required_fields(mode, model) {
        if let Some(message) = validate_field(&name, values.get(&name), mode, model) {
            errors.insert(name, message);
        }
    }
    for (name, value) in values {
        if errors.contains_key(name) {
            continue;
        }
        if let Some(message) = validate_field(name, Some(value), mode, model) {
            errors.insert(name.clone(), message);
        }
    }
    errors
}

/// No errors and every required field filled in.
pub fn is_form_valid(values: &FieldValues, mode: GenerationMode, model: &ModelDescriptor) -> bool {
    validate_all(values, mode, model).is_empty()
        && required_fields(mode, model)
            .iter()
            .all(|name| !is_blank(values.get(name)))
}

fn check_declared_constraints(
    metadata: &FieldMetadata,
    value: &FieldValue,
    model: &ModelDescriptor,
) -> Option<String> {
    let label = &metadata.label;
    match &metadata.kind {
        FieldKind::Text { .. } => {
            let Some(text) = value.as_str() else {
                return Some(format!("{label} must be text"));
            };
            check_text(metadata, text, model)
        }
        FieldKind::Select { options } => {
            let key = value.option_key();
            let declared = options
                .iter()
                .any(|option| key.is_some() && option_key(&option.value) == key);
            if declared {
                return None;
            }
            if options.is_empty() {
                return Some(format!("{label} has no selectable options"));
            }
            let choices = options
                .iter()
                .map(|option| option.label.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            Some(format!("{label} must be one of: {choices}"))
        }
        FieldKind::Toggle => match value.as_json().and_then(value_as_bool) {
            Some(_) => None,
            None => Some(format!("{label} must be on or off")),
        },
        FieldKind::Slider { .. } | FieldKind::Number { .. } => {
            let Some(number) = value.as_f64() else {
                return Some(format!("{label} must be a number"));
            };
            let (min, max) = metadata.kind.bounds();
            if let Some(min) = min.filter(|min| number < *min) {
                return Some(format!("{label} must be at least {}", trim_float(min)));
            }
            if let Some(max) = max.filter(|max| number > *max) {
                return Some(format!("{label} must be at most {}", trim_float(max)));
            }
            None
        }
        FieldKind::File { media } => {
            let FieldValue::File(file) = value else {
                return Some(format!("{label} must be a single file"));
            };
            check_media(label, *media, file.media_kind())
        }
        FieldKind::Files {
            media,
            min_files,
            max_files,
        } => {
            let files = value.files();
            if files.is_empty() {
                return Some(format!("{label} must be a list of files"));
            }
            if files.len() < *min_files {
                return Some(format!("{label} needs at least {min_files} files"));
            }
            if let Some(max) = max_files.filter(|max| files.len() > *max) {
                return Some(format!("{label} accepts at most {max} files"));
            }
            files
                .iter()
                .find_map(|file| check_media(label, *media, file.media_kind()))
        }
        FieldKind::UrlArray { max_items } => {
            let items = match value.as_json() {
                Some(Value::Array(items)) => items.clone(),
                Some(Value::String(single)) => vec![Value::String(single.clone())],
                _ => return Some(format!("{label} must be a list of URLs")),
            };
            if let Some(max) = max_items.filter(|max| items.len() > *max) {
                return Some(format!("{label} accepts at most {max} entries"));
            }
            for item in &items {
                let Some(text) = item.as_str() else {
                    return Some(format!("{label} must be a list of URLs"));
                };
                if let Some(pattern) = &metadata.rules.pattern {
                    if !pattern.regex.is_match(text.trim()) {
                        return Some(format!("{label} {}", pattern.message));
                    }
                }
            }
            None
        }
    }
}

fn check_text(metadata: &FieldMetadata, text: &str, model: &ModelDescriptor) -> Option<String> {
    let label = &metadata.label;
    let length = text.chars().count();
    if let Some(min) = metadata.rules.min_length.filter(|min| length < *min) {
        return Some(format!("{label} must be at least {min} characters"));
    }
    if let Some(limit) = metadata.rules.max_length {
        let max = limit.resolve(model);
        if length > max {
            return Some(format!("{label} must be at most {max} characters"));
        }
    }
    if let Some(pattern) = &metadata.rules.pattern {
        if !pattern.regex.is_match(text) {
            return Some(format!("{label} {}", pattern.message));
        }
    }
    None
}

fn check_media(label: &str, expected: MediaKind, actual: Option<MediaKind>) -> Option<String> {
    if actual == Some(expected) {
        return None;
    }
    let noun = match expected {
        MediaKind::Image => "an image",
        MediaKind::Video => "a video",
    };
    Some(format!("{label} must be {noun} file"))
}

/// Size ceilings apply to every attached file regardless of field rules.
fn check_file_sizes(metadata: &FieldMetadata, value: &FieldValue) -> Option<String> {
    value.files().into_iter().find_map(|file| {
        let media = file
            .media_kind()
            .or(metadata.kind.media())
            .unwrap_or(MediaKind::Image);
        let limit = media.max_bytes();
        if file.size_bytes <= limit {
            return None;
        }
        Some(format!(
            "{} exceeds the {} MB {} limit",
            file.file_name(),
            limit / (1024 * 1024),
            media.as_str()
        ))
    })
}
