mod aliases;
mod metadata;
mod registry;
mod resolver;

pub use aliases::{canonical_field_name, is_alias};
pub use metadata::{
    humanize_field_name, Conditional, CustomRule, FieldKind, FieldMetadata, FieldPattern,
    FieldRules, LengthLimit, MetadataSource, ModelLimit, ShowIf,
};
pub use registry::{
    registered_field_names, registry_entry, DEFAULT_PROMPT_CHARACTER_LIMIT, MAX_REFERENCE_IMAGES,
};
pub use resolver::resolve;
