//! Interpreters over the model catalog: field visibility, defaults and
//! normalization, validation, pricing, payload building, and the generation
//! session that drives them through upload and inference collaborators.

pub mod cost;
pub mod defaults;
pub mod error;
pub mod params;
pub mod providers;
pub mod session;
pub mod validation;
pub mod visibility;

pub use cost::{calculate, cost_range, CostRange, CostResult};
pub use defaults::{apply_defaults, coerce_value, compute_defaults, normalize_field_names};
pub use error::GenerationError;
pub use params::{build_params, prepare_payload, strip_empty_values, PendingPayload};
pub use providers::{
    default_provider_registry, DryrunProvider, FalProvider, HttpUploader, InferenceProvider,
    InferenceProviderRegistry, InferenceRequest, InferenceResponse, LocalUploader, UploadedFile,
    Uploader,
};
pub use session::{DraftMerge, GenerationSession, LifecycleState, ResultArtifact};
pub use validation::{
    is_form_valid, required_fields, supports_mode, validate_all, validate_field, GenerationMode,
};
pub use visibility::{editable_fields, is_visible, visible_fields};
