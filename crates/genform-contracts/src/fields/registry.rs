use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use super::aliases::canonical_field_name;
use super::metadata::{FieldKind, FieldMetadata, FieldPattern, LengthLimit};
use crate::catalog::ModelDescriptor;
use crate::values::{FieldValue, MediaKind};

pub const DEFAULT_PROMPT_CHARACTER_LIMIT: usize = 2000;
pub const MAX_REFERENCE_IMAGES: usize = 4;

static HTTP_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://\S+$").expect("static url pattern compiles"));

static FIELD_REGISTRY: Lazy<IndexMap<String, FieldMetadata>> = Lazy::new(|| {
    let entries = vec![
        FieldMetadata::new("prompt", FieldKind::Text { multiline: true })
            .max_length(LengthLimit::PerModel(prompt_character_limit)),
        FieldMetadata::new("negative_prompt", FieldKind::Text { multiline: true })
            .requires_capability("supportsNegativePrompt")
            .max_length(LengthLimit::Fixed(DEFAULT_PROMPT_CHARACTER_LIMIT)),
        FieldMetadata::new("style_prompt", FieldKind::Text { multiline: true })
            .label("Style")
            .max_length(LengthLimit::PerModel(prompt_character_limit)),
        FieldMetadata::new(
            "image_url",
            FieldKind::File {
                media: MediaKind::Image,
            },
        )
        .label("Start image"),
        FieldMetadata::new(
            "end_image_url",
            FieldKind::File {
                media: MediaKind::Image,
            },
        )
        .label("End image")
        .requires_capability("supportsEndFrame"),
        FieldMetadata::new(
            "original_image",
            FieldKind::File {
                media: MediaKind::Image,
            },
        ),
        FieldMetadata::new(
            "reference_images",
            FieldKind::Files {
                media: MediaKind::Image,
                min_files: 1,
                max_files: Some(MAX_REFERENCE_IMAGES),
            },
        ),
        FieldMetadata::new(
            "video_url",
            FieldKind::File {
                media: MediaKind::Video,
            },
        )
        .label("Source video"),
        FieldMetadata::new(
            "image_urls",
            FieldKind::UrlArray {
                max_items: Some(MAX_REFERENCE_IMAGES),
            },
        )
        .label("Image URLs")
        .pattern(FieldPattern {
            regex: HTTP_URL.clone(),
            message: "must be an http(s) URL",
        }),
        FieldMetadata::new("duration", select()).show_if(has_selectable_duration),
        FieldMetadata::new("resolution", select()),
        FieldMetadata::new("aspect_ratio", select()),
        FieldMetadata::new("template", select()).label("Effect"),
        FieldMetadata::new("quality", select()),
        FieldMetadata::new("output_format", select()),
        FieldMetadata::new(
            "num_images",
            FieldKind::Slider {
                min: 1.0,
                max: 4.0,
                step: Some(1.0),
            },
        )
        .label("Number of images")
        .custom(whole_number),
        FieldMetadata::new(
            "seed",
            FieldKind::Number {
                min: Some(0.0),
                max: Some(2_147_483_647.0),
                step: Some(1.0),
            },
        )
        .custom(whole_number),
        FieldMetadata::new(
            "guidance_scale",
            FieldKind::Slider {
                min: 1.0,
                max: 20.0,
                step: Some(0.5),
            },
        ),
        FieldMetadata::new(
            "num_inference_steps",
            FieldKind::Slider {
                min: 1.0,
                max: 50.0,
                step: Some(1.0),
            },
        )
        .label("Inference steps")
        .custom(whole_number),
        FieldMetadata::new(
            "cfg_scale",
            FieldKind::Slider {
                min: 0.0,
                max: 1.0,
                step: Some(0.1),
            },
        )
        .label("Prompt adherence"),
        FieldMetadata::new("enable_safety_checker", FieldKind::Toggle).label("Safety checker"),
        FieldMetadata::new("enhance_prompt", FieldKind::Toggle),
        FieldMetadata::new("generate_audio", FieldKind::Toggle)
            .requires_capability("supportsAudio"),
        FieldMetadata::new("camera_fixed", FieldKind::Toggle)
            .label("Lock camera")
            .requires_capability("supportsCameraControl"),
    ];
    entries
        .into_iter()
        .map(|entry| (entry.name.clone(), entry))
        .collect()
});

fn select() -> FieldKind {
    FieldKind::Select {
        options: Vec::new(),
    }
}

fn prompt_character_limit(model: &ModelDescriptor) -> usize {
    model
        .capabilities
        .prompt_character_limit()
        .unwrap_or(DEFAULT_PROMPT_CHARACTER_LIMIT)
}

fn has_selectable_duration(model: &ModelDescriptor) -> bool {
    model.capabilities.fixed_duration().is_none()
}

fn whole_number(value: &FieldValue, _model: &ModelDescriptor) -> Option<String> {
    let number = value.as_f64()?;
    if number.fract() != 0.0 {
        return Some("must be a whole number".to_string());
    }
    None
}

/// Registry entry for `name`, or for the backend name it aliases.
pub fn registry_entry(name: &str) -> Option<&'static FieldMetadata> {
    FIELD_REGISTRY
        .get(name)
        .or_else(|| FIELD_REGISTRY.get(canonical_field_name(name)))
}

pub fn registered_field_names() -> impl Iterator<Item = &'static str> {
    FIELD_REGISTRY.keys().map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_entries_are_keyed_by_their_own_name() {
        assert!(FIELD_REGISTRY.len() > 20);
        for name in registered_field_names() {
            assert_eq!(registry_entry(name).map(|entry| entry.name.as_str()), Some(name));
        }
    }

    #[test]
    fn aliases_resolve_to_canonical_entries() {
        let entry = registry_entry("quantity").map(|entry| entry.name.clone());
        assert_eq!(entry.as_deref(), Some("num_images"));
        assert!(registry_entry("totally_unknown").is_none());
    }

    #[test]
    fn url_pattern_accepts_http_only() {
        assert!(HTTP_URL.is_match("https://cdn.example.com/a.png"));
        assert!(!HTTP_URL.is_match("ftp://example.com/a.png"));
        assert!(!HTTP_URL.is_match("https://example.com/a b.png"));
    }
}
