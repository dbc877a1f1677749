use std::borrow::Cow;

use serde_json::Value;

use super::metadata::{Conditional, FieldKind, FieldMetadata, MetadataSource};
use super::registry::registry_entry;
use crate::catalog::{FieldKindTag, FieldOptions, ModelDescriptor};
use crate::values::MediaKind;

const TOGGLE_PREFIXES: &[&str] = &["is", "enable", "has", "use"];

/// Resolves rendering/validation metadata for `field_name` on `model`.
///
/// Resolution never fails. Lookup order:
/// 1. the static registry (by name, then by the backend name it aliases);
/// 2. the model's own field options, sniffing a kind from their shape;
/// 3. substrings/prefixes of the field name;
/// 4. a single-line text field.
///
/// Model field options are layered over whichever record wins, so a registry
/// select still picks up the model's option list and default.
pub fn resolve(field_name: &str, model: &ModelDescriptor) -> FieldMetadata {
    let options = model.options_for(field_name);

    if let Some(entry) = registry_entry(field_name) {
        let mut metadata = entry.clone();
        metadata.name = field_name.to_string();
        if let Some(options) = options {
            apply_model_options(&mut metadata, options);
        }
        return metadata;
    }

    if let Some(kind) = options.and_then(|options| sniff_kind(field_name, options)) {
        let mut metadata = FieldMetadata::new(field_name, kind);
        metadata.source = MetadataSource::ModelOptions;
        if let Some(options) = options {
            apply_model_options(&mut metadata, options);
        }
        return metadata;
    }

    let (kind, source) = match infer_kind_from_name(field_name) {
        Some(kind) => (kind, MetadataSource::NameInference),
        None => (FieldKind::Text { multiline: false }, MetadataSource::Fallback),
    };
    tracing::debug!(
        field = field_name,
        model = %model.id,
        ?source,
        "field has no registry entry or typed options"
    );
    let mut metadata = FieldMetadata::new(field_name, kind);
    metadata.source = source;
    if let Some(options) = options {
        apply_model_options(&mut metadata, options);
    }
    metadata
}

/// Step 2 of resolution: infer a kind from the shape of the model's options.
fn sniff_kind(field_name: &str, options: &FieldOptions) -> Option<FieldKind> {
    if let Some(tag) = options.kind {
        return Some(kind_from_tag(field_name, tag, options));
    }
    if options.options.is_some() {
        return Some(kind_from_tag(field_name, FieldKindTag::Select, options));
    }
    if matches!(options.default, Some(Value::Bool(_))) {
        return Some(FieldKind::Toggle);
    }
    match (options.min, options.max) {
        (Some(_), Some(_)) => {
            return Some(kind_from_tag(field_name, FieldKindTag::Slider, options))
        }
        (Some(_), None) | (None, Some(_)) => {
            return Some(kind_from_tag(field_name, FieldKindTag::Number, options))
        }
        (None, None) => {}
    }
    if options.min_files.is_some() || options.max_files.is_some() {
        return Some(kind_from_tag(field_name, FieldKindTag::Files, options));
    }
    None
}

/// `is_loop`, `isLoop` and `enableUpscale` match; `issue` and `user_id` do not.
fn has_toggle_prefix(name: &str) -> bool {
    TOGGLE_PREFIXES.iter().any(|prefix| {
        let Some(head) = name.get(..prefix.len()) else {
            return false;
        };
        if !head.eq_ignore_ascii_case(prefix) {
            return false;
        }
        match name[prefix.len()..].chars().next() {
            Some(next) => next == '_' || next.is_ascii_uppercase(),
            None => false,
        }
    })
}

/// Step 3 of resolution: guess from the field name alone.
fn infer_kind_from_name(field_name: &str) -> Option<FieldKind> {
    if has_toggle_prefix(field_name.trim()) {
        return Some(FieldKind::Toggle);
    }
    let lowered = field_name.trim().to_ascii_lowercase();
    if lowered.contains("image") {
        if is_plural(&lowered) {
            return Some(FieldKind::Files {
                media: MediaKind::Image,
                min_files: 0,
                max_files: None,
            });
        }
        return Some(FieldKind::File {
            media: MediaKind::Image,
        });
    }
    if lowered.contains("video") {
        return Some(FieldKind::File {
            media: MediaKind::Video,
        });
    }
    if lowered.contains("prompt") {
        return Some(FieldKind::Text { multiline: true });
    }
    None
}

fn is_plural(lowered: &str) -> bool {
    lowered.ends_with("images") || lowered.ends_with("_urls") || lowered.ends_with("_files")
}

fn media_from_name(field_name: &str) -> MediaKind {
    if field_name.to_ascii_lowercase().contains("video") {
        MediaKind::Video
    } else {
        MediaKind::Image
    }
}

fn kind_from_tag(field_name: &str, tag: FieldKindTag, options: &FieldOptions) -> FieldKind {
    match tag {
        FieldKindTag::Text => FieldKind::Text {
            multiline: field_name.contains("prompt"),
        },
        FieldKindTag::Select => FieldKind::Select {
            options: options.normalized_options().unwrap_or_default(),
        },
        FieldKindTag::Toggle => FieldKind::Toggle,
        FieldKindTag::Slider => {
            let min = options.min.unwrap_or(0.0);
            FieldKind::Slider {
                min,
                max: options.max.unwrap_or(min).max(min),
                step: options.step,
            }
        }
        FieldKindTag::Number => FieldKind::Number {
            min: options.min,
            max: options.max,
            step: options.step,
        },
        FieldKindTag::File => FieldKind::File {
            media: media_from_name(field_name),
        },
        FieldKindTag::Files => FieldKind::Files {
            media: media_from_name(field_name),
            min_files: options.min_files.unwrap_or(0),
            max_files: options.max_files,
        },
        FieldKindTag::UrlArray => FieldKind::UrlArray {
            max_items: options.max_files,
        },
    }
}

fn apply_model_options(metadata: &mut FieldMetadata, options: &FieldOptions) {
    if let Some(tag) = options.kind.filter(|tag| *tag != metadata.kind.tag()) {
        metadata.kind = kind_from_tag(&metadata.name, tag, options);
    }
    match &mut metadata.kind {
        FieldKind::Select { options: choices } => {
            if let Some(declared) = options.normalized_options() {
                *choices = declared;
            }
        }
        FieldKind::Slider { min, max, step } => {
            if let Some(value) = options.min {
                *min = value;
            }
            if let Some(value) = options.max {
                *max = value;
            }
            if options.step.is_some() {
                *step = options.step;
            }
        }
        FieldKind::Number { min, max, step } => {
            if options.min.is_some() {
                *min = options.min;
            }
            if options.max.is_some() {
                *max = options.max;
            }
            if options.step.is_some() {
                *step = options.step;
            }
        }
        FieldKind::Files {
            min_files,
            max_files,
            ..
        } => {
            if let Some(value) = options.min_files {
                *min_files = value;
            }
            if options.max_files.is_some() {
                *max_files = options.max_files;
            }
        }
        FieldKind::UrlArray { max_items } => {
            if options.max_files.is_some() {
                *max_items = options.max_files;
            }
        }
        FieldKind::Text { .. } | FieldKind::Toggle | FieldKind::File { .. } => {}
    }
    if let Some(label) = options.label.as_deref().filter(|label| !label.trim().is_empty()) {
        metadata.label = label.to_string();
    }
    if let Some(default) = options.default.clone().filter(|value| !value.is_null()) {
        metadata.default = Some(default);
    }
    if let Some(required) = options.required {
        metadata.required = required;
    }
    metadata.user_selectable = options.is_user_selectable();
    if let Some(key) = options.backend_key.as_deref().filter(|key| !key.trim().is_empty()) {
        metadata.backend_key = Some(key.to_string());
    }
    if let Some(capability) = options
        .requires_capability
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
    {
        metadata.conditional = Some(Conditional::RequiresCapability(Cow::Owned(
            capability.to_string(),
        )));
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;
    use serde_json::json;

    use super::*;
    use crate::catalog::{Capabilities, CostDescriptor, OptionEntry};

    fn model_with(options: Vec<(&str, FieldOptions)>) -> ModelDescriptor {
        let field_options = options
            .into_iter()
            .map(|(name, options)| (name.to_string(), options))
            .collect::<IndexMap<String, FieldOptions>>();
        ModelDescriptor {
            id: "test-model".to_string(),
            display_name: "Test".to_string(),
            endpoint: "fal-ai/test".to_string(),
            media: MediaKind::Video,
            fields: field_options.keys().cloned().collect(),
            field_options,
            capabilities: Capabilities::default(),
            cost: CostDescriptor::Fixed { amount: 0.1 },
        }
    }

    #[test]
    fn registry_entries_take_model_option_lists() {
        let model = model_with(vec![(
            "duration",
            FieldOptions {
                options: Some(vec![
                    OptionEntry::Scalar(json!("5")),
                    OptionEntry::Scalar(json!("10")),
                ]),
                default: Some(json!("5")),
                ..FieldOptions::default()
            },
        )]);
        let metadata = resolve("duration", &model);
        assert_eq!(metadata.source, MetadataSource::Registry);
        assert_eq!(metadata.select_options().len(), 2);
        assert_eq!(metadata.default, Some(json!("5")));
        assert!(metadata.conditional.is_some());
    }

    #[test]
    fn model_options_are_sniffed_when_unregistered() {
        let model = model_with(vec![
            (
                "motion_strength",
                FieldOptions {
                    min: Some(0.0),
                    max: Some(10.0),
                    ..FieldOptions::default()
                },
            ),
            (
                "loop",
                FieldOptions {
                    default: Some(json!(false)),
                    ..FieldOptions::default()
                },
            ),
            (
                "style",
                FieldOptions {
                    options: Some(vec![OptionEntry::Scalar(json!("anime"))]),
                    ..FieldOptions::default()
                },
            ),
        ]);
        assert!(matches!(
            resolve("motion_strength", &model).kind,
            FieldKind::Slider { min, max, .. } if min == 0.0 && max == 10.0
        ));
        assert_eq!(resolve("loop", &model).kind, FieldKind::Toggle);
        let style = resolve("style", &model);
        assert_eq!(style.kind.tag(), FieldKindTag::Select);
        assert_eq!(style.source, MetadataSource::ModelOptions);
    }

    #[test]
    fn names_are_pattern_matched_as_a_last_resort() {
        let model = model_with(Vec::new());
        assert_eq!(resolve("enable_upscale", &model).kind, FieldKind::Toggle);
        assert_eq!(resolve("use_image_boost", &model).kind, FieldKind::Toggle);
        assert!(matches!(
            resolve("mask_image", &model).kind,
            FieldKind::File { media: MediaKind::Image }
        ));
        assert!(matches!(
            resolve("style_images", &model).kind,
            FieldKind::Files { media: MediaKind::Image, .. }
        ));
        assert!(matches!(
            resolve("driving_video", &model).kind,
            FieldKind::File { media: MediaKind::Video }
        ));
        assert_eq!(
            resolve("scene_prompt", &model).kind,
            FieldKind::Text { multiline: true }
        );
    }

    #[test]
    fn toggle_prefixes_match_snake_and_camel_case_words() {
        let model = model_with(Vec::new());
        for name in ["enableUpscale", "isLoop", "hasAudio", "useTurbo", "is_public"] {
            assert_eq!(resolve(name, &model).kind, FieldKind::Toggle, "{name}");
        }
        for name in ["issue", "user_id", "hashtag", "enabled", "is"] {
            assert_ne!(resolve(name, &model).kind, FieldKind::Toggle, "{name}");
        }
    }

    #[test]
    fn resolution_is_total_for_garbage_names() {
        let model = model_with(Vec::new());
        for name in ["", "   ", "???", "ñandú", "a_b_c_d_e_f_g", "\n\t"] {
            let metadata = resolve(name, &model);
            assert_eq!(metadata.name, name);
            assert!(!metadata.label.is_empty());
        }
        let fallback = resolve("zzz", &model);
        assert_eq!(fallback.source, MetadataSource::Fallback);
        assert_eq!(fallback.kind, FieldKind::Text { multiline: false });
    }

    #[test]
    fn explicit_type_and_backend_key_override_registry() {
        let model = model_with(vec![(
            "num_images",
            FieldOptions {
                kind: Some(FieldKindTag::Select),
                options: Some(vec![
                    OptionEntry::Scalar(json!(1)),
                    OptionEntry::Scalar(json!(2)),
                ]),
                backend_key: Some("n".to_string()),
                user_selectable: Some(false),
                ..FieldOptions::default()
            },
        )]);
        let metadata = resolve("num_images", &model);
        assert_eq!(metadata.kind.tag(), FieldKindTag::Select);
        assert_eq!(metadata.backend_key.as_deref(), Some("n"));
        assert!(!metadata.user_selectable);
    }

    #[test]
    fn aliased_names_keep_their_ui_name() {
        let model = model_with(Vec::new());
        let metadata = resolve("quantity", &model);
        assert_eq!(metadata.name, "quantity");
        assert!(metadata.kind.is_numeric());
    }
}
