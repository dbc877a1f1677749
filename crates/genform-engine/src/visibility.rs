use genform_contracts::catalog::ModelDescriptor;
use genform_contracts::fields::{resolve, Conditional, FieldMetadata};

/// Fields of `model` that are currently relevant, in declaration order.
pub fn visible_fields(model: &ModelDescriptor) -> Vec<String> {
    model
        .fields
        .iter()
        .filter(|name| is_visible(&resolve(name, model), model))
        .cloned()
        .collect()
}

/// Visible fields the user may change, resolved.
pub fn editable_fields(model: &ModelDescriptor) -> Vec<FieldMetadata> {
    model
        .fields
        .iter()
        .map(|name| resolve(name, model))
        .filter(|metadata| metadata.user_selectable && is_visible(metadata, model))
        .collect()
}

pub fn is_visible(metadata: &FieldMetadata, model: &ModelDescriptor) -> bool {
    match &metadata.conditional {
        None => true,
        Some(Conditional::RequiresCapability(capability)) => {
            model.capabilities.is_truthy(capability)
        }
        Some(Conditional::ShowIf(predicate)) => predicate(model),
    }
}

#[cfg(test)]
mod tests {
    use genform_contracts::catalog::ModelCatalog;
    use serde_json::json;

    use super::*;

    fn model(id: &str) -> ModelDescriptor {
        ModelCatalog::builtin()
            .get(id)
            .cloned()
            .unwrap_or_else(|| panic!("missing catalog model {id}"))
    }

    #[test]
    fn end_frame_requires_capability() {
        assert!(visible_fields(&model("kling-2.1-pro")).contains(&"end_image_url".to_string()));
        let mut without = model("kling-2.1-pro");
        without.capabilities = Default::default();
        assert!(!visible_fields(&without).contains(&"end_image_url".to_string()));
    }

    #[test]
    fn fixed_duration_models_hide_the_duration_selector() {
        let visible = visible_fields(&model("minimax-hailuo-02"));
        assert!(!visible.contains(&"duration".to_string()));
        assert!(visible.contains(&"prompt".to_string()));
        assert!(visible_fields(&model("kling-2.1-standard")).contains(&"duration".to_string()));
    }

    #[test]
    fn visible_fields_keep_declaration_order() {
        let model = model("kling-2.1-master");
        let visible = visible_fields(&model);
        let positions = visible
            .iter()
            .map(|name| model.fields.iter().position(|field| field == name))
            .collect::<Vec<_>>();
        let mut sorted = positions.clone();
        sorted.sort();
        assert_eq!(positions, sorted);
        assert_eq!(visible.first().map(String::as_str), Some("prompt"));
    }

    #[test]
    fn catalog_options_can_gate_a_field_on_a_capability() -> anyhow::Result<()> {
        let record = json!({
            "id": "gated",
            "display_name": "Gated",
            "endpoint": "test/gated",
            "media": "video",
            "fields": ["prompt", "motion_brush"],
            "field_options": {
                "motion_brush": {"type": "toggle", "requires_capability": "supportsMotionBrush"}
            },
            "capabilities": {},
            "cost": {"type": "fixed", "amount": 0.1}
        });
        let mut model: ModelDescriptor = serde_json::from_value(record)?;
        assert_eq!(visible_fields(&model), vec!["prompt"]);

        model.capabilities = serde_json::from_value(json!({"supportsMotionBrush": true}))?;
        assert_eq!(visible_fields(&model), vec!["prompt", "motion_brush"]);
        Ok(())
    }

    #[test]
    fn locked_fields_are_visible_but_not_editable() {
        let model = model("flux-schnell");
        assert!(visible_fields(&model).contains(&"enable_safety_checker".to_string()));
        assert!(!editable_fields(&model)
            .iter()
            .any(|metadata| metadata.name == "enable_safety_checker"));
    }
}
