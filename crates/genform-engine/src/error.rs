use thiserror::Error;

use crate::session::LifecycleState;

/// The single session-level error slot. Field-level problems live in
/// `FieldErrors` and never become one of these unless submit is attempted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    #[error("{message}")]
    Validation { field: String, message: String },
    #[error("upload failed: {0}")]
    Upload(String),
    #[error("generation failed: {0}")]
    Inference(String),
    #[error("a submission is already {}", .0.as_str())]
    Busy(LifecycleState),
    #[error("{0} is fixed for this model")]
    NotUserSelectable(String),
    #[error("{0} is not a field of this model")]
    UndeclaredField(String),
    #[error("no model selected")]
    NoModel,
}

impl GenerationError {
    /// Lifecycle stage the error belongs to, as written to the event log.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validating",
            Self::Upload(_) => "uploading",
            Self::Inference(_) => "generating",
            Self::Busy(_)
            | Self::NotUserSelectable(_)
            | Self::UndeclaredField(_)
            | Self::NoModel => "idle",
        }
    }
}
