use std::borrow::Cow;

use regex::Regex;
use serde_json::Value;

use crate::catalog::{FieldKindTag, ModelDescriptor, SelectOption};
use crate::values::{FieldValue, MediaKind};

pub type ShowIf = fn(&ModelDescriptor) -> bool;
pub type CustomRule = fn(&FieldValue, &ModelDescriptor) -> Option<String>;
pub type ModelLimit = fn(&ModelDescriptor) -> usize;

/// Rendering and validation metadata for one field, after resolution.
#[derive(Debug, Clone)]
pub struct FieldMetadata {
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    pub default: Option<Value>,
    pub required: bool,
    pub user_selectable: bool,
    pub backend_key: Option<String>,
    pub conditional: Option<Conditional>,
    pub rules: FieldRules,
    pub source: MetadataSource,
}

impl FieldMetadata {
    pub fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            label: humanize_field_name(name),
            kind,
            default: None,
            required: false,
            user_selectable: true,
            backend_key: None,
            conditional: None,
            rules: FieldRules::default(),
            source: MetadataSource::Registry,
        }
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    pub fn requires_capability(mut self, capability: &'static str) -> Self {
        self.conditional = Some(Conditional::RequiresCapability(Cow::Borrowed(capability)));
        self
    }

    pub fn show_if(mut self, predicate: ShowIf) -> Self {
        self.conditional = Some(Conditional::ShowIf(predicate));
        self
    }

    pub fn min_length(mut self, limit: usize) -> Self {
        self.rules.min_length = Some(limit);
        self
    }

    pub fn max_length(mut self, limit: LengthLimit) -> Self {
        self.rules.max_length = Some(limit);
        self
    }

    pub fn pattern(mut self, pattern: FieldPattern) -> Self {
        self.rules.pattern = Some(pattern);
        self
    }

    pub fn custom(mut self, rule: CustomRule) -> Self {
        self.rules.custom = Some(rule);
        self
    }

    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    pub fn select_options(&self) -> &[SelectOption] {
        match &self.kind {
            FieldKind::Select { options } => options.as_slice(),
            _ => &[],
        }
    }
}

/// Where a resolved record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataSource {
    Registry,
    ModelOptions,
    NameInference,
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Text {
        multiline: bool,
    },
    Select {
        options: Vec<SelectOption>,
    },
    Toggle,
    Slider {
        min: f64,
        max: f64,
        step: Option<f64>,
    },
    Number {
        min: Option<f64>,
        max: Option<f64>,
        step: Option<f64>,
    },
    File {
        media: MediaKind,
    },
    Files {
        media: MediaKind,
        min_files: usize,
        max_files: Option<usize>,
    },
    UrlArray {
        max_items: Option<usize>,
    },
}

impl FieldKind {
    pub fn tag(&self) -> FieldKindTag {
        match self {
            Self::Text { .. } => FieldKindTag::Text,
            Self::Select { .. } => FieldKindTag::Select,
            Self::Toggle => FieldKindTag::Toggle,
            Self::Slider { .. } => FieldKindTag::Slider,
            Self::Number { .. } => FieldKindTag::Number,
            Self::File { .. } => FieldKindTag::File,
            Self::Files { .. } => FieldKindTag::Files,
            Self::UrlArray { .. } => FieldKindTag::UrlArray,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Self::File { .. } | Self::Files { .. })
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Slider { .. } | Self::Number { .. })
    }

    pub fn media(&self) -> Option<MediaKind> {
        match self {
            Self::File { media } | Self::Files { media, .. } => Some(*media),
            _ => None,
        }
    }

    pub fn bounds(&self) -> (Option<f64>, Option<f64>) {
        match self {
            Self::Slider { min, max, .. } => (Some(*min), Some(*max)),
            Self::Number { min, max, .. } => (*min, *max),
            _ => (None, None),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Conditional {
    /// Hidden unless the model's capability flag is truthy.
    RequiresCapability(Cow<'static, str>),
    ShowIf(ShowIf),
}

#[derive(Debug, Clone, Default)]
pub struct FieldRules {
    pub min_length: Option<usize>,
    pub max_length: Option<LengthLimit>,
    pub pattern: Option<FieldPattern>,
    pub custom: Option<CustomRule>,
}

#[derive(Debug, Clone, Copy)]
pub enum LengthLimit {
    Fixed(usize),
    PerModel(ModelLimit),
}

impl LengthLimit {
    pub fn resolve(&self, model: &ModelDescriptor) -> usize {
        match self {
            Self::Fixed(limit) => *limit,
            Self::PerModel(limit) => limit(model),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldPattern {
    pub regex: Regex,
    pub message: &'static str,
}

pub fn humanize_field_name(name: &str) -> String {
    let spaced = name
        .trim()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
        .to_ascii_lowercase();
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => "Field".to_string(),
    }
}
