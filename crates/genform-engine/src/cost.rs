use genform_contracts::catalog::{
    known_templates, template_tier, CostDescriptor, ModelDescriptor, ResolutionTier,
    TemplateTier, DEFAULT_TEMPLATE,
};
use genform_contracts::fields::{canonical_field_name, resolve, FieldKind};
use genform_contracts::values::{option_key, trim_float, FieldValue, FieldValues};
use serde::Serialize;
use serde_json::Value;

/// Duration assumed when neither the session, the model default nor a fixed
/// duration names one. Possibly arbitrary; kept as found.
pub const DEFAULT_DURATION_SECONDS: f64 = 5.0;

/// Resolution assumed by resolution-tiered pricing. Possibly arbitrary.
pub const DEFAULT_RESOLUTION: &str = "720p";

/// Where a priced duration came from, in the order they are consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationSource {
    Field,
    DeclaredDefault,
    FixedDuration,
    Constant,
}

pub const DURATION_FALLBACKS: [DurationSource; 4] = [
    DurationSource::Field,
    DurationSource::DeclaredDefault,
    DurationSource::FixedDuration,
    DurationSource::Constant,
];

impl DurationSource {
    fn lookup(&self, model: &ModelDescriptor, values: &FieldValues) -> Option<f64> {
        match self {
            Self::Field => priced_value(values, "duration")
                .and_then(FieldValue::as_json)
                .and_then(parse_duration_seconds),
            Self::DeclaredDefault => pricing_field(model, "duration")
                .and_then(|field| model.declared_default(field))
                .and_then(parse_duration_seconds),
            Self::FixedDuration => model.capabilities.fixed_duration(),
            Self::Constant => Some(DEFAULT_DURATION_SECONDS),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Field => "selected duration",
            Self::DeclaredDefault => "model default",
            Self::FixedDuration => "fixed duration",
            Self::Constant => "assumed duration",
        }
    }
}

/// Where a priced resolution or template id came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingSource {
    Field,
    DeclaredDefault,
    Constant,
}

pub const SETTING_FALLBACKS: [SettingSource; 3] = [
    SettingSource::Field,
    SettingSource::DeclaredDefault,
    SettingSource::Constant,
];

impl SettingSource {
    fn lookup(
        &self,
        model: &ModelDescriptor,
        values: &FieldValues,
        field: &str,
        constant: &str,
    ) -> Option<String> {
        let value = match self {
            Self::Field => priced_value(values, field).and_then(FieldValue::option_key),
            Self::DeclaredDefault => pricing_field(model, field)
                .and_then(|name| model.declared_default(name))
                .and_then(option_key),
            Self::Constant => Some(constant.to_string()),
        };
        value.filter(|value| !value.is_empty())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Field => "selected",
            Self::DeclaredDefault => "model default",
            Self::Constant => "assumed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostResult {
    pub amount: f64,
    pub breakdown: Vec<String>,
    pub display: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostRange {
    pub min: f64,
    pub max: f64,
    pub display: String,
}

/// Prices the current field values. Never fails: missing tiers and unknown
/// templates resolve through the documented fallbacks.
pub fn calculate(model: &ModelDescriptor, values: &FieldValues) -> CostResult {
    let mut breakdown = Vec::new();
    let amount = match &model.cost {
        CostDescriptor::PerSecond { rate_per_second } => {
            let (seconds, source) = resolve_duration(model, values);
            breakdown.push(format!(
                "{}/s x {}s ({})",
                format_rate(*rate_per_second),
                trim_float(seconds),
                source.as_str()
            ));
            rate_per_second * seconds
        }
        CostDescriptor::Fixed { amount } => {
            breakdown.push(format!("Flat rate {}", format_rate(*amount)));
            if let Some(seconds) = model.capabilities.fixed_duration() {
                breakdown.push(format!("Fixed duration {}s", trim_float(seconds)));
            }
            *amount
        }
        CostDescriptor::Tiered { base_rate, tiers } => {
            let (resolution, resolution_source) =
                resolve_setting(model, values, "resolution", DEFAULT_RESOLUTION);
            let rate = tier_rate(*base_rate, tiers, &resolution);
            let (seconds, duration_source) = resolve_duration(model, values);
            breakdown.push(format!(
                "{resolution} ({}) at {}/s",
                resolution_source.as_str(),
                format_rate(rate)
            ));
            breakdown.push(format!("x {}s ({})", trim_float(seconds), duration_source.as_str()));
            rate * seconds
        }
        CostDescriptor::TieredTemplate {
            standard_rate,
            premium_rate,
            advanced_rate,
        } => {
            let (template, source) = resolve_setting(model, values, "template", DEFAULT_TEMPLATE);
            let tier = template_tier(&template);
            let rate = match tier {
                TemplateTier::Standard => *standard_rate,
                TemplateTier::Premium => *premium_rate,
                TemplateTier::Advanced => *advanced_rate,
            };
            breakdown.push(format!(
                "{template} ({}) is a {} effect: {}",
                source.as_str(),
                tier.as_str(),
                format_rate(rate)
            ));
            rate
        }
    };
    let amount = round_amount(amount);
    CostResult {
        amount,
        breakdown,
        display: format_cost(amount),
    }
}

/// Cheapest and dearest estimate over every declared option of the fields
/// that feed the model's pricing formula, priced through `calculate`.
pub fn cost_range(model: &ModelDescriptor) -> CostRange {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for values in pricing_candidates(model) {
        let amount = calculate(model, &values).amount;
        min = min.min(amount);
        max = max.max(amount);
    }
    if !min.is_finite() || !max.is_finite() {
        min = 0.0;
        max = 0.0;
    }
    let display = if (max - min).abs() < 0.005 {
        format_cost(min)
    } else {
        format!("{} – {}", format_cost(min), format_cost(max))
    };
    CostRange { min, max, display }
}

pub fn resolve_duration(model: &ModelDescriptor, values: &FieldValues) -> (f64, DurationSource) {
    for source in DURATION_FALLBACKS {
        if let Some(seconds) = source.lookup(model, values) {
            if source != DurationSource::Field {
                tracing::debug!(model = %model.id, source = source.as_str(), "duration fallback");
            }
            return (seconds, source);
        }
    }
    (DEFAULT_DURATION_SECONDS, DurationSource::Constant)
}

fn resolve_setting(
    model: &ModelDescriptor,
    values: &FieldValues,
    field: &str,
    constant: &str,
) -> (String, SettingSource) {
    for source in SETTING_FALLBACKS {
        if let Some(value) = source.lookup(model, values, field, constant) {
            return (value, source);
        }
    }
    (constant.to_string(), SettingSource::Constant)
}

/// Accepts `5`, `"5"` and `"5s"`.
pub fn parse_duration_seconds(value: &Value) -> Option<f64> {
    let seconds = match value {
        Value::Number(raw) => raw.as_f64()?,
        Value::String(raw) => {
            let trimmed = raw.trim().to_ascii_lowercase();
            let digits = trimmed.strip_suffix('s').unwrap_or(&trimmed);
            digits.trim().parse::<f64>().ok()?
        }
        _ => return None,
    };
    Some(seconds).filter(|value| value.is_finite() && *value > 0.0)
}

fn tier_rate(base_rate: f64, tiers: &[ResolutionTier], resolution: &str) -> f64 {
    let wanted = resolution.trim();
    match tiers
        .iter()
        .find(|tier| tier.resolution.trim().eq_ignore_ascii_case(wanted))
    {
        Some(tier) => tier.rate,
        None => {
            tracing::debug!(resolution = wanted, "no pricing tier; using base rate");
            base_rate
        }
    }
}

/// Session value for a pricing field, looked up by backend name or any alias.
fn priced_value<'a>(values: &'a FieldValues, canonical: &str) -> Option<&'a FieldValue> {
    values
        .get(canonical)
        .filter(|value| !value.is_blank())
        .or_else(|| {
            values
                .iter()
                .filter(|(name, _)| canonical_field_name(name) == canonical)
                .map(|(_, value)| value)
                .find(|value| !value.is_blank())
        })
}

/// The model's own name for a pricing field.
fn pricing_field<'a>(model: &'a ModelDescriptor, canonical: &str) -> Option<&'a str> {
    model
        .fields
        .iter()
        .find(|field| field.as_str() == canonical)
        .or_else(|| {
            model
                .fields
                .iter()
                .find(|field| canonical_field_name(field) == canonical)
        })
        .map(String::as_str)
}

/// Every combination of "unset" plus each declared choice for the fields the
/// formula reads. Numeric fields contribute their bounds.
fn pricing_candidates(model: &ModelDescriptor) -> Vec<FieldValues> {
    let mut combinations = vec![FieldValues::new()];
    for canonical in model.cost.pricing_inputs() {
        let Some(field) = pricing_field(model, canonical) else {
            continue;
        };
        let choices = candidate_values(model, field, canonical);
        let mut expanded = Vec::with_capacity(combinations.len() * (choices.len() + 1));
        for base in &combinations {
            expanded.push(base.clone());
            for choice in &choices {
                let mut next = base.clone();
                next.insert(field.to_string(), FieldValue::Json(choice.clone()));
                expanded.push(next);
            }
        }
        combinations = expanded;
    }
    combinations
}

fn candidate_values(model: &ModelDescriptor, field: &str, canonical: &str) -> Vec<Value> {
    let metadata = resolve(field, model);
    let mut choices: Vec<Value> = match &metadata.kind {
        FieldKind::Select { options } => {
            options.iter().map(|option| option.value.clone()).collect()
        }
        FieldKind::Slider { min, max, .. } => vec![Value::from(*min), Value::from(*max)],
        FieldKind::Number { min, max, .. } => min
            .iter()
            .chain(max.iter())
            .map(|bound| Value::from(*bound))
            .collect(),
        _ => Vec::new(),
    };
    if canonical == "template" && metadata.select_options().is_empty() {
        choices.extend(known_templates().map(|(id, _)| Value::from(id)));
    }
    choices
}

fn round_amount(amount: f64) -> f64 {
    (amount * 1_000_000.0).round() / 1_000_000.0
}

fn format_rate(rate: f64) -> String {
    format!("${}", trim_float(rate))
}

pub fn format_cost(amount: f64) -> String {
    format!("${amount:.2}")
}
