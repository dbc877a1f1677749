use genform_contracts::catalog::ModelDescriptor;
use genform_contracts::events::{now_utc_iso, EventWriter, SessionEvent};
use genform_contracts::fields::resolve;
use genform_contracts::values::{FieldErrors, FieldValue, FieldValues, MediaKind};
use serde::Serialize;

use crate::cost::{calculate, cost_range, CostRange, CostResult};
use crate::defaults::{coerce_value, compute_defaults};
use crate::error::GenerationError;
use crate::params::prepare_payload;
use crate::providers::{error_chain_text, InferenceProvider, InferenceRequest, Uploader};
use crate::validation::{is_form_valid, validate_all, validate_field, GenerationMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Idle,
    Validating,
    Uploading,
    Generating,
    Success,
    Error,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Uploading => "uploading",
            Self::Generating => "generating",
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Idle, Validating)
                | (Validating, Uploading)
                | (Validating, Generating)
                | (Validating, Error)
                | (Uploading, Generating)
                | (Uploading, Error)
                | (Generating, Success)
                | (Generating, Error)
                | (Success, Idle)
                | (Error, Idle)
        )
    }

    /// A submission is between validation and its outcome.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Validating | Self::Uploading | Self::Generating)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultArtifact {
    pub url: String,
    pub model_id: String,
    pub media: MediaKind,
    pub created_at: String,
}

/// Which restored draft keys were merged and which were dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftMerge {
    pub accepted: Vec<String>,
    pub dropped: Vec<String>,
}

/// One generation tab: the selected model, its field values and errors, and
/// the submit lifecycle. All mutation goes through the methods below.
pub struct GenerationSession {
    id: String,
    mode: GenerationMode,
    model: Option<ModelDescriptor>,
    values: FieldValues,
    errors: FieldErrors,
    state: LifecycleState,
    last_error: Option<GenerationError>,
    results: Vec<ResultArtifact>,
    events: Option<EventWriter>,
}

impl GenerationSession {
    pub fn new(mode: GenerationMode, events: Option<EventWriter>) -> Self {
        let id = events
            .as_ref()
            .map(|writer| writer.session_id().to_string())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let session = Self {
            id,
            mode,
            model: None,
            values: FieldValues::new(),
            errors: FieldErrors::new(),
            state: LifecycleState::Idle,
            last_error: None,
            results: Vec::new(),
            events,
        };
        session.record(SessionEvent::SessionStarted {
            model_id: None,
            mode: mode.as_str().to_string(),
        });
        session
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mode(&self) -> GenerationMode {
        self.mode
    }

    pub fn model(&self) -> Option<&ModelDescriptor> {
        self.model.as_ref()
    }

    pub fn values(&self) -> &FieldValues {
        &self.values
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn last_error(&self) -> Option<&GenerationError> {
        self.last_error.as_ref()
    }

    pub fn results(&self) -> &[ResultArtifact] {
        &self.results
    }

    /// Switches model and reseeds values from its declared defaults. Nothing
    /// from the previous model survives.
    pub fn set_model(&mut self, model: ModelDescriptor) -> Result<(), GenerationError> {
        self.ensure_editable()?;
        let values = compute_defaults(&model);
        self.record(SessionEvent::ModelSelected {
            model_id: model.id.clone(),
            seeded_fields: values.keys().cloned().collect(),
        });
        self.values = values;
        self.model = Some(model);
        self.clear_outcome();
        Ok(())
    }

    /// Switching tabs resets the form for the current model.
    pub fn set_mode(&mut self, mode: GenerationMode) -> Result<(), GenerationError> {
        self.ensure_editable()?;
        self.mode = mode;
        self.values = self.model.as_ref().map(compute_defaults).unwrap_or_default();
        self.clear_outcome();
        Ok(())
    }

    /// Applies one user edit and revalidates just that field. Returns the
    /// field's error, if any.
    pub fn update_field(
        &mut self,
        name: &str,
        value: FieldValue,
    ) -> Result<Option<String>, GenerationError> {
        self.ensure_editable()?;
        let model = self.model.as_ref().ok_or(GenerationError::NoModel)?;
        if !model.accepts(name) {
            tracing::warn!(field = name, model = %model.id, "ignoring edit to undeclared field");
            return Err(GenerationError::UndeclaredField(name.to_string()));
        }
        let metadata = resolve(name, model);
        if !metadata.user_selectable {
            tracing::warn!(field = name, model = %model.id, "ignoring edit to locked field");
            return Err(GenerationError::NotUserSelectable(name.to_string()));
        }
        let value = coerce_value(&metadata, value);
        let error = validate_field(name, Some(&value), self.mode, model);
        self.values.insert(name.to_string(), value);
        match &error {
            Some(message) => {
                self.errors.insert(name.to_string(), message.clone());
            }
            None => {
                self.errors.shift_remove(name);
            }
        }
        self.settle();
        Ok(error)
    }

    /// Regenerates `errors` wholesale.
    pub fn validate_all(&mut self) -> &FieldErrors {
        self.errors = match self.model.as_ref() {
            Some(model) => validate_all(&self.values, self.mode, model),
            None => FieldErrors::new(),
        };
        &self.errors
    }

    pub fn is_valid(&self) -> bool {
        self.model
            .as_ref()
            .map(|model| is_form_valid(&self.values, self.mode, model))
            .unwrap_or(false)
    }

    pub fn estimate(&self) -> Option<CostResult> {
        let model = self.model.as_ref()?;
        let result = calculate(model, &self.values);
        self.record(SessionEvent::CostEstimate {
            model_id: model.id.clone(),
            amount: result.amount,
            display: result.display.clone(),
        });
        Some(result)
    }

    pub fn cost_range(&self) -> Option<CostRange> {
        self.model.as_ref().map(cost_range)
    }

    /// Merges restored values over the current ones. Keys the model does not
    /// declare are dropped; the rest are coerced and the form revalidated.
    pub fn load_draft(&mut self, restored: FieldValues) -> Result<DraftMerge, GenerationError> {
        self.ensure_editable()?;
        let model = self.model.as_ref().ok_or(GenerationError::NoModel)?;
        let mut merge = DraftMerge::default();
        for (name, value) in restored {
            if !model.accepts(&name) {
                merge.dropped.push(name);
                continue;
            }
            let metadata = resolve(&name, model);
            if !metadata.user_selectable {
                merge.dropped.push(name);
                continue;
            }
            self.values.insert(name.clone(), coerce_value(&metadata, value));
            merge.accepted.push(name);
        }
        self.record(SessionEvent::DraftLoaded {
            accepted: merge.accepted.clone(),
            dropped: merge.dropped.clone(),
        });
        self.validate_all();
        self.settle();
        Ok(merge)
    }

    /// Back to the model's defaults with no errors. Results are kept.
    pub fn reset(&mut self) -> Result<(), GenerationError> {
        self.ensure_editable()?;
        self.values = self.model.as_ref().map(compute_defaults).unwrap_or_default();
        self.clear_outcome();
        Ok(())
    }

    pub fn can_submit(&self) -> bool {
        self.model.is_some() && !self.state.is_in_flight()
    }

    /// Validating, then Uploading when the payload holds files, then
    /// Generating. Every failure lands in `Error` with the form left intact.
    pub fn submit(
        &mut self,
        uploader: &dyn Uploader,
        provider: &dyn InferenceProvider,
    ) -> Result<Vec<ResultArtifact>, GenerationError> {
        if self.state.is_in_flight() {
            return Err(GenerationError::Busy(self.state));
        }
        let model = self.model.clone().ok_or(GenerationError::NoModel)?;
        self.settle();
        self.last_error = None;

        self.transition(LifecycleState::Validating);
        self.validate_all();
        if !is_form_valid(&self.values, self.mode, &model) {
            self.record(SessionEvent::ValidationFailed {
                errors: self.errors.clone(),
            });
            let (field, message) = self
                .errors
                .first()
                .map(|(field, message)| (field.clone(), message.clone()))
                .unwrap_or_else(|| (String::new(), "form is incomplete".to_string()));
            return Err(self.fail(GenerationError::Validation { field, message }));
        }

        let pending = prepare_payload(&self.values, &model);
        if pending.has_uploads() {
            self.transition(LifecycleState::Uploading);
        }
        let resolved = match pending.resolve_uploads(uploader) {
            Ok(resolved) => resolved,
            Err(err) => {
                return Err(self.fail(GenerationError::Upload(error_chain_text(&err, 512))));
            }
        };
        if !resolved.uploaded().is_empty() {
            self.record(SessionEvent::UploadCompleted {
                count: resolved.uploaded().len(),
            });
        }

        self.transition(LifecycleState::Generating);
        let request = InferenceRequest {
            endpoint: model.endpoint.clone(),
            params: resolved.into_params(&model),
        };
        let response = match provider.generate(&request) {
            Ok(response) => response,
            Err(err) => {
                return Err(self.fail(GenerationError::Inference(error_chain_text(&err, 512))));
            }
        };
        if !response.success || response.result_urls.is_empty() {
            let message = response
                .error
                .unwrap_or_else(|| "no results returned".to_string());
            return Err(self.fail(GenerationError::Inference(message)));
        }

        let created_at = now_utc_iso();
        let artifacts: Vec<ResultArtifact> = response
            .result_urls
            .iter()
            .map(|url| ResultArtifact {
                url: url.clone(),
                model_id: model.id.clone(),
                media: model.media,
                created_at: created_at.clone(),
            })
            .collect();
        self.results.extend(artifacts.iter().cloned());
        self.record(SessionEvent::GenerationSucceeded {
            model_id: model.id.clone(),
            result_urls: response.result_urls,
        });
        self.transition(LifecycleState::Success);
        Ok(artifacts)
    }

    fn ensure_editable(&self) -> Result<(), GenerationError> {
        if self.state.is_in_flight() {
            return Err(GenerationError::Busy(self.state));
        }
        Ok(())
    }

    /// Terminal states fall back to Idle on the next interaction.
    fn settle(&mut self) {
        if matches!(self.state, LifecycleState::Success | LifecycleState::Error) {
            self.transition(LifecycleState::Idle);
        }
    }

    fn clear_outcome(&mut self) {
        self.errors.clear();
        self.last_error = None;
        self.settle();
    }

    fn fail(&mut self, error: GenerationError) -> GenerationError {
        self.record(SessionEvent::GenerationFailed {
            stage: error.stage().to_string(),
            error: error.to_string(),
        });
        self.transition(LifecycleState::Error);
        self.last_error = Some(error.clone());
        error
    }

    fn transition(&mut self, next: LifecycleState) {
        if !self.state.can_transition_to(next) {
            tracing::warn!(from = self.state.as_str(), to = next.as_str(), "unexpected transition");
        }
        self.record(SessionEvent::StateChanged {
            from: self.state.as_str().to_string(),
            to: next.as_str().to_string(),
        });
        self.state = next;
    }

    fn record(&self, event: SessionEvent) {
        let Some(writer) = self.events.as_ref() else {
            return;
        };
        if let Err(err) = writer.record(&event) {
            tracing::warn!(session = %self.id, "failed to write session event: {err:#}");
        }
    }
}
