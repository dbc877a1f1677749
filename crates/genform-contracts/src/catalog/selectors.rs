use super::descriptor::ModelDescriptor;
use super::registry::ModelCatalog;
use crate::values::MediaKind;

#[derive(Debug, Clone, PartialEq)]
pub struct ModelSelection {
    pub model: ModelDescriptor,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ModelSelector {
    pub catalog: ModelCatalog,
}

impl ModelSelector {
    pub fn new(catalog: Option<ModelCatalog>) -> Self {
        Self {
            catalog: catalog.unwrap_or_default(),
        }
    }

    pub fn select(
        &self,
        requested: Option<&str>,
        media: MediaKind,
    ) -> Result<ModelSelection, String> {
        let media_name = media.as_str();
        let (fallback_reason, requested_text) = if let Some(requested_value) = requested {
            if let Some(model) = self.catalog.ensure(requested_value, media) {
                return Ok(ModelSelection {
                    model,
                    requested: Some(requested_value.to_string()),
                    fallback_reason: None,
                });
            }
            (
                Some(format!(
                    "Requested model '{requested_value}' unavailable for {media_name} generation."
                )),
                Some(requested_value.to_string()),
            )
        } else {
            (Some("No model specified; using default.".to_string()), None)
        };

        let candidates = self.catalog.by_media(media);
        let Some(model) = candidates.first().cloned() else {
            return Err(format!("No models available for {media_name} generation."));
        };
        Ok(ModelSelection {
            model,
            requested: requested_text,
            fallback_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;
    use crate::catalog::{Capabilities, CostDescriptor};

    fn model(id: &str, media: MediaKind) -> ModelDescriptor {
        ModelDescriptor {
            id: id.to_string(),
            display_name: id.to_string(),
            endpoint: format!("fal-ai/{id}"),
            media,
            fields: vec!["prompt".to_string()],
            field_options: IndexMap::new(),
            capabilities: Capabilities::default(),
            cost: CostDescriptor::Fixed { amount: 0.05 },
        }
    }

    #[test]
    fn selector_falls_back_when_requested_model_unavailable() {
        let catalog = ModelCatalog::from_records(vec![model("flux-fallback", MediaKind::Image)]);
        let selection = ModelSelector::new(Some(catalog))
            .select(Some("missing"), MediaKind::Image)
            .unwrap();
        assert_eq!(selection.model.id, "flux-fallback");
        assert_eq!(selection.requested.as_deref(), Some("missing"));
        assert_eq!(
            selection.fallback_reason.as_deref(),
            Some("Requested model 'missing' unavailable for image generation.")
        );
    }

    #[test]
    fn selector_without_request_uses_default_with_explanation() {
        let catalog = ModelCatalog::from_records(vec![
            model("kling", MediaKind::Video),
            model("flux", MediaKind::Image),
        ]);
        let selection = ModelSelector::new(Some(catalog))
            .select(None, MediaKind::Image)
            .unwrap();
        assert_eq!(selection.model.id, "flux");
        assert_eq!(
            selection.fallback_reason.as_deref(),
            Some("No model specified; using default.")
        );
    }

    #[test]
    fn selector_rejects_model_of_other_media() {
        let catalog = ModelCatalog::from_records(vec![model("flux", MediaKind::Image)]);
        let err = ModelSelector::new(Some(catalog))
            .select(Some("flux"), MediaKind::Video)
            .err()
            .unwrap_or_default();
        assert_eq!(err, "No models available for video generation.");
    }

    #[test]
    fn selector_keeps_requested_model_when_available() {
        let catalog = ModelCatalog::from_records(vec![
            model("flux", MediaKind::Image),
            model("seedream", MediaKind::Image),
        ]);
        let selection = ModelSelector::new(Some(catalog))
            .select(Some("seedream"), MediaKind::Image)
            .unwrap();
        assert_eq!(selection.model.id, "seedream");
        assert!(selection.fallback_reason.is_none());
    }
}
