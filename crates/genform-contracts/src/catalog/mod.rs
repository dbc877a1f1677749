mod descriptor;
mod registry;
mod selectors;
mod templates;

pub use descriptor::{
    Capabilities, CostDescriptor, FieldKindTag, FieldOptions, ModelDescriptor, OptionEntry,
    ResolutionTier, SelectOption,
};
pub use registry::{catalog_override_path, ModelCatalog};
pub use selectors::{ModelSelection, ModelSelector};
pub use templates::{
    is_known_template, known_templates, template_tier, TemplateTier, DEFAULT_TEMPLATE,
};
