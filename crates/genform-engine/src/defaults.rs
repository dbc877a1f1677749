use genform_contracts::catalog::ModelDescriptor;
use genform_contracts::fields::{canonical_field_name, resolve, FieldKind, FieldMetadata};
use genform_contracts::values::{
    option_key, parse_value_to_f64, value_as_bool, FieldValue, FieldValues,
};
use serde_json::{Map, Number, Value};

/// Initial values for a freshly selected model: declared defaults only.
/// Fields without a declared default stay absent.
pub fn compute_defaults(model: &ModelDescriptor) -> FieldValues {
    let mut values = FieldValues::new();
    for name in model.field_options.keys() {
        if let Some(default) = model.declared_default(name) {
            values.insert(name.clone(), FieldValue::Json(default.clone()));
        }
    }
    values
}

/// Fill-missing pass run right before payload construction. For every field
/// the model configures that is absent from `values`: the declared default,
/// else the first declared option, else nothing.
pub fn apply_defaults(values: &FieldValues, model: &ModelDescriptor) -> FieldValues {
    let mut filled = values.clone();
    for (name, options) in &model.field_options {
        if filled.contains_key(name) {
            continue;
        }
        let fallback = model
            .declared_default(name)
            .cloned()
            .or_else(|| options.first_option_value());
        if let Some(value) = fallback {
            filled.insert(name.clone(), FieldValue::Json(value));
        }
    }
    filled
}

/// Coerces a value to the shape its field kind expects. Values that cannot be
/// coerced are returned unchanged for validation to report.
pub fn coerce_value(metadata: &FieldMetadata, value: FieldValue) -> FieldValue {
    match (&metadata.kind, value) {
        (FieldKind::Slider { .. } | FieldKind::Number { .. }, FieldValue::Json(raw)) => {
            FieldValue::Json(coerce_number(raw))
        }
        (FieldKind::Toggle, FieldValue::Json(raw)) => match value_as_bool(&raw) {
            Some(flag) => FieldValue::Json(Value::Bool(flag)),
            None => FieldValue::Json(raw),
        },
        (FieldKind::Select { options }, FieldValue::Json(raw)) => {
            let key = option_key(&raw);
            let declared = options
                .iter()
                .find(|option| key.is_some() && option_key(&option.value) == key);
            match declared {
                Some(option) => FieldValue::Json(option.value.clone()),
                None => FieldValue::Json(raw),
            }
        }
        (FieldKind::Files { .. }, FieldValue::File(file)) => FieldValue::Files(vec![file]),
        (FieldKind::File { .. }, FieldValue::Files(mut files)) if files.len() == 1 => {
            FieldValue::File(files.remove(0))
        }
        (FieldKind::Text { .. }, FieldValue::Json(Value::Number(raw))) => {
            FieldValue::Json(Value::String(raw.to_string()))
        }
        (_, value) => value,
    }
}

fn coerce_number(raw: Value) -> Value {
    if let Value::String(text) = &raw {
        if let Some(number) = parse_value_to_f64(&raw) {
            if number.fract() == 0.0 && number.abs() < i64::MAX as f64 {
                return Value::Number(Number::from(number as i64));
            }
            if let Some(number) = Number::from_f64(number) {
                return Value::Number(number);
            }
        }
        tracing::debug!(value = text.as_str(), "numeric field holds non-numeric text");
    }
    raw
}

/// Backend name for a field: its declared backend key, else the alias
/// table's canonical name.
pub fn backend_field_name(metadata: &FieldMetadata) -> String {
    metadata
        .backend_key
        .clone()
        .unwrap_or_else(|| canonical_field_name(&metadata.name).to_string())
}

/// Rewrites UI field names to backend names. A field that already carries
/// the backend name wins over an alias that maps onto it.
pub fn normalize_field_names(
    params: &Map<String, Value>,
    model: &ModelDescriptor,
) -> Map<String, Value> {
    let mut normalized = Map::new();
    for (name, value) in params {
        let target = backend_field_name(&resolve(name, model));
        if target == *name {
            normalized.insert(target, value.clone());
            continue;
        }
        if params.contains_key(&target) || normalized.contains_key(&target) {
            tracing::debug!(field = name.as_str(), target = target.as_str(), "alias shadowed");
            continue;
        }
        normalized.insert(target, value.clone());
    }
    normalized
}

#[cfg(test)]
mod tests {
    use genform_contracts::catalog::ModelCatalog;
    use genform_contracts::values::FileHandle;
    use serde_json::json;

    use super::*;

    fn model(id: &str) -> ModelDescriptor {
        ModelCatalog::builtin()
            .get(id)
            .cloned()
            .unwrap_or_else(|| panic!("missing catalog model {id}"))
    }

    #[test]
    fn compute_defaults_seeds_declared_defaults_only() {
        let model = model("seedance-1-lite");
        let defaults = compute_defaults(&model);
        assert_eq!(defaults.get("duration"), Some(&FieldValue::Json(json!("5"))));
        assert!(!defaults.contains_key("resolution"));
        assert!(!defaults.contains_key("prompt"));
    }

    #[test]
    fn apply_defaults_fills_missing_with_default_then_first_option() {
        let model = model("seedance-1-lite");
        let mut values = FieldValues::new();
        values.insert("duration".to_string(), FieldValue::Json(json!("10")));
        let filled = apply_defaults(&values, &model);
        assert_eq!(filled.get("duration"), Some(&FieldValue::Json(json!("10"))));
        assert_eq!(filled.get("resolution"), Some(&FieldValue::Json(json!("480p"))));
        assert_eq!(filled.get("camera_fixed"), Some(&FieldValue::Json(json!(false))));
        assert!(!filled.contains_key("prompt"));
    }

    #[test]
    fn apply_defaults_is_idempotent_for_every_catalog_model() {
        for model in ModelCatalog::builtin().list() {
            let mut values = FieldValues::new();
            values.insert("prompt".to_string(), FieldValue::text("a boat"));
            values.insert("stale".to_string(), FieldValue::null());
            let once = apply_defaults(&values, model);
            let twice = apply_defaults(&once, model);
            assert_eq!(once, twice, "{}", model.id);
        }
    }

    #[test]
    fn coercion_matches_field_kinds() {
        let model = model("kling-2.1-standard");
        let cfg = resolve("cfg_scale", &model);
        assert_eq!(
            coerce_value(&cfg, FieldValue::Json(json!("0.7"))),
            FieldValue::Json(json!(0.7))
        );
        let seed = resolve("seed", &model);
        assert_eq!(
            coerce_value(&seed, FieldValue::Json(json!("42"))),
            FieldValue::Json(json!(42))
        );
        let toggle = resolve("enable_safety_checker", &model);
        assert_eq!(
            coerce_value(&toggle, FieldValue::Json(json!("yes"))),
            FieldValue::Json(json!(true))
        );
        let duration = resolve("duration", &model);
        assert_eq!(
            coerce_value(&duration, FieldValue::Json(json!(10))),
            FieldValue::Json(json!("10"))
        );
        assert_eq!(
            coerce_value(&cfg, FieldValue::Json(json!("lots"))),
            FieldValue::Json(json!("lots"))
        );
    }

    #[test]
    fn single_file_is_wrapped_for_multi_file_fields() {
        let model = model("nano-banana-edit");
        let refs = resolve("reference_images", &model);
        let file = FileHandle {
            path: "/tmp/a.png".into(),
            mime_type: "image/png".to_string(),
            size_bytes: 1,
        };
        assert_eq!(
            coerce_value(&refs, FieldValue::File(file.clone())),
            FieldValue::Files(vec![file])
        );
    }

    #[test]
    fn aliases_and_backend_keys_rename_fields() {
        let model = model("gpt-image-1-edit");
        let mut params = Map::new();
        params.insert("quantity".to_string(), json!(2));
        params.insert("output_quality".to_string(), json!("high"));
        params.insert("reference_images".to_string(), json!(["https://a"]));
        let normalized = normalize_field_names(&params, &model);
        assert_eq!(normalized.get("num_images"), Some(&json!(2)));
        assert_eq!(normalized.get("quality"), Some(&json!("high")));
        assert_eq!(normalized.get("image_urls"), Some(&json!(["https://a"])));
        assert!(!normalized.contains_key("quantity"));
        assert!(!normalized.contains_key("output_quality"));
    }

    #[test]
    fn explicit_backend_name_beats_alias() {
        let model = model("flux-dev");
        let mut params = Map::new();
        params.insert("quantity".to_string(), json!(3));
        params.insert("num_images".to_string(), json!(1));
        let normalized = normalize_field_names(&params, &model);
        assert_eq!(normalized.get("num_images"), Some(&json!(1)));
        assert_eq!(normalized.len(), 1);
    }
}
