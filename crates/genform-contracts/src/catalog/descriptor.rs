use std::collections::{BTreeMap, HashSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::fields::{canonical_field_name, resolve, FieldKind};
use crate::values::{option_key, parse_value_to_f64, value_as_bool, MediaKind};

/// Catalog record for one generation backend. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub display_name: String,
    /// Opaque reference handed to the inference collaborator.
    pub endpoint: String,
    pub media: MediaKind,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub field_options: IndexMap<String, FieldOptions>,
    #[serde(default)]
    pub capabilities: Capabilities,
    pub cost: CostDescriptor,
}

impl ModelDescriptor {
    pub fn accepts(&self, field: &str) -> bool {
        self.fields.iter().any(|name| name == field)
    }

    pub fn options_for(&self, field: &str) -> Option<&FieldOptions> {
        self.field_options.get(field)
    }

    pub fn declared_default(&self, field: &str) -> Option<&Value> {
        self.field_options
            .get(field)
            .and_then(|options| options.default.as_ref())
            .filter(|value| !value.is_null())
    }

    /// Structural problems that make a record unusable.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.id.trim().is_empty() {
            problems.push("model id is empty".to_string());
        }
        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.as_str()) {
                problems.push(format!("field '{field}' is declared more than once"));
            }
        }
        if let Some(rate) = self
            .cost
            .rates()
            .into_iter()
            .find(|rate| rate.is_nan() || *rate < 0.0)
        {
            problems.push(format!("cost rate {rate} is negative or not a number"));
        }
        problems.extend(self.unbounded_pricing_fields().into_iter().map(|field| {
            format!("pricing field '{field}' must be a select or a number with min and max")
        }));
        problems
    }
}

impl ModelDescriptor {
    /// Duration and resolution fields that accept values the cost range
    /// cannot enumerate. Template ids need no bound: unknown ones price at
    /// the standard tier.
    fn unbounded_pricing_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|field| {
                let canonical = canonical_field_name(field);
                canonical != "template" && self.cost.pricing_inputs().contains(&canonical)
            })
            .filter(|field| match resolve(field, self).kind {
                FieldKind::Select { .. } | FieldKind::Slider { .. } => false,
                FieldKind::Number { min, max, .. } => min.is_none() || max.is_none(),
                _ => true,
            })
            .map(String::as_str)
            .collect()
    }
}

/// Per-model override for one field. Every attribute is optional; the
/// resolver sniffs a kind from whatever is present.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldOptions {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FieldKindTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<OptionEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_files: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_files: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_selectable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Capability flag that must be truthy for the field to show.
    #[serde(
        default,
        alias = "requiresCapability",
        skip_serializing_if = "Option::is_none"
    )]
    pub requires_capability: Option<String>,
}

impl FieldOptions {
    pub fn normalized_options(&self) -> Option<Vec<SelectOption>> {
        self.options
            .as_ref()
            .map(|rows| rows.iter().map(OptionEntry::normalize).collect())
    }

    pub fn first_option_value(&self) -> Option<Value> {
        self.options
            .as_ref()
            .and_then(|rows| rows.first())
            .map(|row| row.normalize().value)
    }

    pub fn is_user_selectable(&self) -> bool {
        self.user_selectable.unwrap_or(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKindTag {
    Text,
    Select,
    Toggle,
    Slider,
    Number,
    File,
    Files,
    UrlArray,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionEntry {
    Pair {
        value: Value,
        #[serde(default)]
        label: Option<String>,
    },
    Scalar(Value),
}

impl OptionEntry {
    pub fn normalize(&self) -> SelectOption {
        match self {
            Self::Pair { value, label } => SelectOption {
                label: label
                    .clone()
                    .or_else(|| option_key(value))
                    .unwrap_or_default(),
                value: value.clone(),
            },
            Self::Scalar(value) => SelectOption {
                label: option_key(value).unwrap_or_default(),
                value: value.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: Value,
    pub label: String,
}

/// Boolean and numeric flags keyed by capability name
/// (`supportsEndFrame`, `fixedDuration`, `promptCharacterLimit`, ...).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capabilities(BTreeMap<String, Value>);

impl Capabilities {
    pub fn new(flags: BTreeMap<String, Value>) -> Self {
        Self(flags)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn is_truthy(&self, name: &str) -> bool {
        match self.0.get(name) {
            None | Some(Value::Null) => false,
            Some(Value::Number(raw)) => raw.as_f64().map(|v| v != 0.0).unwrap_or(false),
            Some(value @ Value::String(raw)) => {
                value_as_bool(value).unwrap_or(!raw.trim().is_empty())
            }
            Some(Value::Array(rows)) => !rows.is_empty(),
            Some(Value::Object(_)) => true,
            Some(Value::Bool(raw)) => *raw,
        }
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.0.get(name).and_then(parse_value_to_f64)
    }

    pub fn fixed_duration(&self) -> Option<f64> {
        self.number("fixedDuration").filter(|value| *value > 0.0)
    }

    pub fn prompt_character_limit(&self) -> Option<usize> {
        self.number("promptCharacterLimit")
            .filter(|value| *value > 0.0)
            .map(|value| value as usize)
    }

    pub fn supports_end_frame(&self) -> bool {
        self.is_truthy("supportsEndFrame")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CostDescriptor {
    PerSecond {
        rate_per_second: f64,
    },
    Fixed {
        amount: f64,
    },
    Tiered {
        base_rate: f64,
        #[serde(default)]
        tiers: Vec<ResolutionTier>,
    },
    TieredTemplate {
        standard_rate: f64,
        premium_rate: f64,
        advanced_rate: f64,
    },
}

impl CostDescriptor {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PerSecond { .. } => "per_second",
            Self::Fixed { .. } => "fixed",
            Self::Tiered { .. } => "tiered",
            Self::TieredTemplate { .. } => "tiered_template",
        }
    }

    /// Canonical names of the fields the formula reads.
    pub fn pricing_inputs(&self) -> &'static [&'static str] {
        match self {
            Self::PerSecond { .. } => &["duration"],
            Self::Fixed { .. } => &[],
            Self::Tiered { .. } => &["resolution", "duration"],
            Self::TieredTemplate { .. } => &["template"],
        }
    }

    pub fn rates(&self) -> Vec<f64> {
        match self {
            Self::PerSecond { rate_per_second } => vec![*rate_per_second],
            Self::Fixed { amount } => vec![*amount],
            Self::Tiered { base_rate, tiers } => std::iter::once(*base_rate)
                .chain(tiers.iter().map(|tier| tier.rate))
                .collect(),
            Self::TieredTemplate {
                standard_rate,
                premium_rate,
                advanced_rate,
            } => vec![*standard_rate, *premium_rate, *advanced_rate],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionTier {
    pub resolution: String,
    pub rate: f64,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn descriptor_deserializes_with_tagged_cost() -> anyhow::Result<()> {
        let model: ModelDescriptor = serde_json::from_value(json!({
            "id": "kling",
            "display_name": "Kling",
            "endpoint": "fal-ai/kling",
            "media": "video",
            "fields": ["prompt", "duration"],
            "field_options": {
                "duration": {"options": ["5", {"value": "10", "label": "10 seconds"}], "default": "5"}
            },
            "capabilities": {"supportsEndFrame": true, "promptCharacterLimit": 2500},
            "cost": {"type": "per_second", "rate_per_second": 0.08}
        }))?;
        assert_eq!(model.cost, CostDescriptor::PerSecond { rate_per_second: 0.08 });
        assert!(model.capabilities.supports_end_frame());
        assert_eq!(model.capabilities.prompt_character_limit(), Some(2500));
        let options = model
            .options_for("duration")
            .and_then(FieldOptions::normalized_options)
            .unwrap_or_default();
        assert_eq!(options[0].label, "5");
        assert_eq!(options[1].label, "10 seconds");
        assert_eq!(model.declared_default("duration"), Some(&json!("5")));
        assert!(model.problems().is_empty());
        Ok(())
    }

    #[test]
    fn problems_flag_duplicates_and_negative_rates() {
        let model = ModelDescriptor {
            id: "broken".to_string(),
            display_name: "Broken".to_string(),
            endpoint: "x".to_string(),
            media: MediaKind::Image,
            fields: vec!["prompt".to_string(), "prompt".to_string()],
            field_options: IndexMap::new(),
            capabilities: Capabilities::default(),
            cost: CostDescriptor::Fixed { amount: -1.0 },
        };
        assert_eq!(model.problems().len(), 2);
    }

    #[test]
    fn problems_flag_pricing_fields_with_an_open_bound() -> anyhow::Result<()> {
        let record = |duration: serde_json::Value| -> anyhow::Result<ModelDescriptor> {
            Ok(serde_json::from_value(json!({
                "id": "open",
                "display_name": "Open",
                "endpoint": "x",
                "media": "video",
                "fields": ["prompt", "duration"],
                "field_options": {"duration": duration},
                "cost": {"type": "per_second", "rate_per_second": 0.1}
            }))?)
        };
        let open = record(json!({"type": "number", "min": 1}))?;
        assert_eq!(
            open.problems(),
            vec!["pricing field 'duration' must be a select or a number with min and max"]
        );
        let free_text = record(json!({"type": "text"}))?;
        assert_eq!(free_text.problems().len(), 1);
        let bounded = record(json!({"type": "number", "min": 1, "max": 10}))?;
        assert!(bounded.problems().is_empty());
        let select = record(json!({"options": ["5", "10"]}))?;
        assert!(select.problems().is_empty());
        Ok(())
    }

    #[test]
    fn capability_truthiness() {
        let mut flags = BTreeMap::new();
        flags.insert("a".to_string(), json!(true));
        flags.insert("b".to_string(), json!(0));
        flags.insert("c".to_string(), json!("no"));
        flags.insert("fixedDuration".to_string(), json!(6));
        let caps = Capabilities::new(flags);
        assert!(caps.is_truthy("a"));
        assert!(!caps.is_truthy("b"));
        assert!(!caps.is_truthy("c"));
        assert!(!caps.is_truthy("missing"));
        assert_eq!(caps.fixed_duration(), Some(6.0));
    }
}
