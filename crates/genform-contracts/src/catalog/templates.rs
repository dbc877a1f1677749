use serde::{Deserialize, Serialize};

/// Template used when neither the session nor the model names one.
/// Carried over as-is; the choice of "hug" has no documented rationale.
pub const DEFAULT_TEMPLATE: &str = "hug";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateTier {
    Standard,
    Premium,
    Advanced,
}

impl TemplateTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Premium => "premium",
            Self::Advanced => "advanced",
        }
    }
}

const TEMPLATE_TIERS: &[(&str, TemplateTier)] = &[
    ("hug", TemplateTier::Standard),
    ("kiss", TemplateTier::Standard),
    ("heart_gesture", TemplateTier::Standard),
    ("squish", TemplateTier::Standard),
    ("muscle_flex", TemplateTier::Standard),
    ("fight", TemplateTier::Standard),
    ("bloom", TemplateTier::Standard),
    ("cinematic_zoom", TemplateTier::Premium),
    ("dolly_zoom", TemplateTier::Premium),
    ("earth_zoom", TemplateTier::Premium),
    ("venom", TemplateTier::Premium),
    ("dissolve", TemplateTier::Premium),
    ("explode", TemplateTier::Advanced),
    ("crystal_shatter", TemplateTier::Advanced),
    ("superhero_transform", TemplateTier::Advanced),
    ("anime_transform", TemplateTier::Advanced),
];

/// Unknown template ids price as `Standard`.
pub fn template_tier(template_id: &str) -> TemplateTier {
    let normalized = template_id.trim().to_ascii_lowercase();
    TEMPLATE_TIERS
        .iter()
        .find(|(id, _)| *id == normalized)
        .map(|(_, tier)| *tier)
        .unwrap_or(TemplateTier::Standard)
}

pub fn known_templates() -> impl Iterator<Item = (&'static str, TemplateTier)> {
    TEMPLATE_TIERS.iter().copied()
}

pub fn is_known_template(template_id: &str) -> bool {
    let normalized = template_id.trim().to_ascii_lowercase();
    TEMPLATE_TIERS.iter().any(|(id, _)| *id == normalized)
}
