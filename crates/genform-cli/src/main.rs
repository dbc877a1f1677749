use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use genform_contracts::catalog::{ModelCatalog, ModelDescriptor, ModelSelector};
use genform_contracts::drafts::{Draft, DraftStore};
use genform_contracts::events::EventWriter;
use genform_contracts::fields::resolve;
use genform_contracts::values::{FieldValue, FieldValues, FileHandle, MediaKind};
use genform_engine::{
    cost_range, default_provider_registry, is_form_valid, supports_mode, validate_all,
    visible_fields, GenerationMode, GenerationSession, HttpUploader, LocalUploader, Uploader,
};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "genform",
    version,
    about = "Model-driven generation forms: inspect, price, validate and submit"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List catalog models.
    Models(ModelsArgs),
    /// Show the resolved, visible fields of one model.
    Fields(FieldsArgs),
    /// Price a set of values and show the model's cost range.
    Estimate(FormArgs),
    /// Validate a set of values for a generation mode.
    Validate(FormArgs),
    /// Validate, upload, and run one generation.
    Submit(SubmitArgs),
    /// Save or inspect stored drafts.
    #[command(subcommand)]
    Draft(DraftCommand),
}

#[derive(Debug, Parser)]
struct ModelsArgs {
    #[arg(long)]
    media: Option<String>,
}

#[derive(Debug, Parser)]
struct FieldsArgs {
    #[arg(long)]
    model: String,
}

#[derive(Debug, Parser)]
struct FormArgs {
    /// Catalog model id. With `--mode`, an unusable id falls back to the
    /// first model of the mode's media.
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    mode: Option<String>,
    /// `name=value`; the value is parsed as JSON when it parses.
    #[arg(long = "set")]
    sets: Vec<String>,
    /// `name=path`; repeat a name to attach several files.
    #[arg(long = "file")]
    files: Vec<String>,
}

#[derive(Debug, Parser)]
struct SubmitArgs {
    #[command(flatten)]
    form: FormArgs,
    /// Draft namespace merged in before `--set` values.
    #[arg(long)]
    draft: Option<String>,
    #[arg(long)]
    drafts: Option<PathBuf>,
    #[arg(long, default_value = "dryrun")]
    provider: String,
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum DraftCommand {
    Save(DraftSaveArgs),
    Show(DraftShowArgs),
}

#[derive(Debug, Parser)]
struct DraftSaveArgs {
    #[arg(long)]
    namespace: String,
    #[arg(long)]
    model: String,
    #[arg(long = "set")]
    sets: Vec<String>,
    #[arg(long)]
    drafts: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct DraftShowArgs {
    #[arg(long)]
    namespace: Option<String>,
    #[arg(long)]
    drafts: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("genform error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Models(args) => run_models(args),
        Command::Fields(args) => run_fields(args),
        Command::Estimate(args) => run_estimate(args),
        Command::Validate(args) => run_validate(args),
        Command::Submit(args) => run_submit(args),
        Command::Draft(DraftCommand::Save(args)) => run_draft_save(args),
        Command::Draft(DraftCommand::Show(args)) => run_draft_show(args),
    }
}

fn run_models(args: ModelsArgs) -> Result<i32> {
    let catalog = ModelCatalog::default();
    let media = args
        .media
        .as_deref()
        .map(|raw| MediaKind::parse(raw).ok_or_else(|| anyhow!("unknown media kind: {raw}")))
        .transpose()?;
    let rows: Vec<Value> = catalog
        .list()
        .filter(|model| media.map_or(true, |media| model.media == media))
        .map(|model| {
            json!({
                "id": model.id,
                "display_name": model.display_name,
                "media": model.media,
                "cost": model.cost.kind(),
                "range": cost_range(model).display,
            })
        })
        .collect();
    print_json(&Value::Array(rows))?;
    Ok(0)
}

fn run_fields(args: FieldsArgs) -> Result<i32> {
    let model = find_model(&args.model)?;
    let rows: Vec<Value> = visible_fields(&model)
        .into_iter()
        .map(|name| {
            let metadata = resolve(&name, &model);
            json!({
                "name": metadata.name,
                "label": metadata.label,
                "kind": metadata.kind.tag(),
                "required": metadata.required,
                "user_selectable": metadata.user_selectable,
                "default": metadata.default,
                "options": metadata.select_options(),
            })
        })
        .collect();
    print_json(&Value::Array(rows))?;
    Ok(0)
}

fn run_estimate(args: FormArgs) -> Result<i32> {
    let (model, mode) = select_model(&args)?;
    let mut session = open_session(&model, mode, None)?;
    apply_form_args(&mut session, &args)?;
    let estimate = session
        .estimate()
        .ok_or_else(|| anyhow!("no model selected"))?;
    print_json(&json!({
        "model": model.id,
        "estimate": estimate,
        "range": cost_range(&model),
    }))?;
    Ok(0)
}

fn run_validate(args: FormArgs) -> Result<i32> {
    let (model, mode) = select_model(&args)?;
    let mut values = FieldValues::new();
    for (name, value) in parse_form_values(&args)? {
        values.insert(name, value);
    }
    let errors = validate_all(&values, mode, &model);
    let valid = is_form_valid(&values, mode, &model);
    print_json(&json!({
        "model": model.id,
        "mode": mode.as_str(),
        "valid": valid,
        "errors": errors,
    }))?;
    Ok(if valid { 0 } else { 2 })
}

fn run_submit(args: SubmitArgs) -> Result<i32> {
    let (model, mode) = select_model(&args.form)?;
    let events = args.events.as_ref().map(|path| {
        let stamp = genform_contracts::events::now_utc_iso();
        EventWriter::new(path, format!("cli-{}-{stamp}", std::process::id()))
    });
    let mut session = open_session(&model, mode, events)?;
    if let Some(namespace) = args.draft.as_deref() {
        let mut store = DraftStore::new(drafts_path(args.drafts.clone())?);
        match store.load(namespace) {
            Some(draft) if draft.model_id == model.id => {
                let merge = session.load_draft(draft.values)?;
                if !merge.dropped.is_empty() {
                    eprintln!("Dropped draft fields: {}", merge.dropped.join(", "));
                }
            }
            Some(draft) => {
                tracing::warn!(
                    namespace,
                    draft_model = %draft.model_id,
                    "draft is for another model"
                );
            }
            None => tracing::warn!(namespace, "no draft saved"),
        }
    }
    apply_form_args(&mut session, &args.form)?;

    let registry = default_provider_registry();
    let provider = registry.get(&args.provider).ok_or_else(|| {
        anyhow!(
            "unknown provider '{}' (available: {})",
            args.provider,
            registry.names().join(", ")
        )
    })?;
    let remote = HttpUploader::from_env();
    let uploader: &dyn Uploader = match remote.as_ref() {
        Some(uploader) => uploader,
        None => &LocalUploader,
    };

    match session.submit(uploader, provider) {
        Ok(results) => {
            print_json(&json!({
                "session": session.id(),
                "state": session.state(),
                "results": results,
            }))?;
            Ok(0)
        }
        Err(err) => {
            print_json(&json!({
                "session": session.id(),
                "state": session.state(),
                "stage": err.stage(),
                "error": err.to_string(),
                "errors": session.errors(),
            }))?;
            Ok(2)
        }
    }
}

fn run_draft_save(args: DraftSaveArgs) -> Result<i32> {
    let model = find_model(&args.model)?;
    let mut values = FieldValues::new();
    for raw in &args.sets {
        let (name, value) = parse_assignment(raw)?;
        if !model.accepts(&name) {
            bail!("{} does not declare field '{name}'", model.id);
        }
        values.insert(name, FieldValue::Json(value));
    }
    let mut store = DraftStore::new(drafts_path(args.drafts)?);
    store.save(&args.namespace, &Draft::new(model.id.clone(), values))?;
    println!("Saved draft '{}' to {}", args.namespace, store.path().display());
    Ok(0)
}

fn run_draft_show(args: DraftShowArgs) -> Result<i32> {
    let mut store = DraftStore::new(drafts_path(args.drafts)?);
    let Some(namespace) = args.namespace else {
        print_json(&json!(store.namespaces()))?;
        return Ok(0);
    };
    match store.load(&namespace) {
        Some(draft) => {
            print_json(&serde_json::to_value(&draft)?)?;
            Ok(0)
        }
        None => {
            eprintln!("No draft saved under '{namespace}'.");
            Ok(1)
        }
    }
}

fn find_model(id: &str) -> Result<ModelDescriptor> {
    ModelCatalog::default()
        .get(id)
        .cloned()
        .ok_or_else(|| anyhow!("unknown model: {id}"))
}

/// A known `--model` is used as given and checked against `--mode`. An
/// unknown one with `--mode` falls back through the selector to the first
/// model of the mode's media.
fn select_model(args: &FormArgs) -> Result<(ModelDescriptor, GenerationMode)> {
    let catalog = ModelCatalog::default();
    if let Some(model) = args.model.as_deref().and_then(|id| catalog.get(id)).cloned() {
        let mode = resolve_mode(args.mode.as_deref(), &model)?;
        return Ok((model, mode));
    }
    let Some(raw_mode) = args.mode.as_deref() else {
        return match args.model.as_deref() {
            Some(id) => Err(anyhow!("unknown model: {id}")),
            None => Err(anyhow!("pass --model, --mode, or both")),
        };
    };
    let mode = parse_mode(raw_mode)?;
    let selection = ModelSelector::new(Some(catalog))
        .select(args.model.as_deref(), mode.media())
        .map_err(|err| anyhow!(err))?;
    if let Some(reason) = selection.fallback_reason.as_deref() {
        eprintln!("{reason} Using {}.", selection.model.id);
    }
    Ok((selection.model, mode))
}

fn parse_mode(raw: &str) -> Result<GenerationMode> {
    GenerationMode::parse(raw).ok_or_else(|| {
        let known: Vec<&str> = GenerationMode::ALL.iter().map(|mode| mode.as_str()).collect();
        anyhow!("unknown mode '{raw}' (expected one of: {})", known.join(", "))
    })
}

/// Explicit `--mode`, else the first mode whose required fields the model
/// declares, else the plain text mode for the model's media.
fn resolve_mode(raw: Option<&str>, model: &ModelDescriptor) -> Result<GenerationMode> {
    match raw {
        Some(raw) => {
            let mode = parse_mode(raw)?;
            if mode.media() != model.media {
                bail!(
                    "{} generates {} but mode {} expects {}",
                    model.id,
                    model.media.as_str(),
                    mode.as_str(),
                    mode.media().as_str()
                );
            }
            Ok(mode)
        }
        None => Ok(GenerationMode::ALL
            .into_iter()
            .find(|mode| supports_mode(*mode, model))
            .unwrap_or(match model.media {
                MediaKind::Image => GenerationMode::TextToImage,
                MediaKind::Video => GenerationMode::TextToVideo,
            })),
    }
}

fn open_session(
    model: &ModelDescriptor,
    mode: GenerationMode,
    events: Option<EventWriter>,
) -> Result<GenerationSession> {
    let mut session = GenerationSession::new(mode, events);
    session.set_model(model.clone())?;
    Ok(session)
}

fn apply_form_args(session: &mut GenerationSession, args: &FormArgs) -> Result<()> {
    for (name, value) in parse_form_values(args)? {
        if let Some(message) = session.update_field(&name, value)? {
            tracing::debug!(field = %name, "{message}");
        }
    }
    Ok(())
}

fn parse_form_values(args: &FormArgs) -> Result<Vec<(String, FieldValue)>> {
    let mut values: Vec<(String, FieldValue)> = Vec::new();
    for raw in &args.sets {
        let (name, value) = parse_assignment(raw)?;
        values.push((name, FieldValue::Json(value)));
    }
    let mut attached: Vec<(String, Vec<FileHandle>)> = Vec::new();
    for raw in &args.files {
        let (name, path) = raw
            .split_once('=')
            .ok_or_else(|| anyhow!("expected name=path, got '{raw}'"))?;
        let handle = FileHandle::from_path(path.trim())
            .with_context(|| format!("cannot attach {path} to {name}"))?;
        match attached.iter_mut().find(|(field, _)| field == name.trim()) {
            Some((_, files)) => files.push(handle),
            None => attached.push((name.trim().to_string(), vec![handle])),
        }
    }
    for (name, mut files) in attached {
        let value = if files.len() == 1 {
            FieldValue::File(files.remove(0))
        } else {
            FieldValue::Files(files)
        };
        values.push((name, value));
    }
    Ok(values)
}

/// `name=value`, with the value read as JSON and falling back to a string.
fn parse_assignment(raw: &str) -> Result<(String, Value)> {
    let Some((name, value)) = raw.split_once('=') else {
        bail!("expected name=value, got '{raw}'");
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("missing field name in '{raw}'");
    }
    let value = serde_json::from_str::<Value>(value.trim())
        .unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((name.to_string(), value))
}

fn drafts_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    if let Some(path) = env::var_os("GENFORM_DRAFTS").filter(|raw| !raw.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    let home = env::var_os("HOME").ok_or_else(|| anyhow!("HOME is not set; pass --drafts"))?;
    Ok(PathBuf::from(home).join(".genform").join("drafts.json"))
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignments_parse_json_then_fall_back_to_text() -> Result<()> {
        assert_eq!(parse_assignment("quantity=2")?, ("quantity".to_string(), json!(2)));
        assert_eq!(
            parse_assignment("prompt=a fox at dawn")?,
            ("prompt".to_string(), json!("a fox at dawn"))
        );
        assert_eq!(
            parse_assignment("enable_safety_checker=false")?,
            ("enable_safety_checker".to_string(), json!(false))
        );
        assert_eq!(parse_assignment("duration=\"10\"")?.1, json!("10"));
        assert!(parse_assignment("no-equals").is_err());
        assert!(parse_assignment("=5").is_err());
        Ok(())
    }

    #[test]
    fn repeated_file_flags_collect_into_one_field() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let first = dir.path().join("a.png");
        let second = dir.path().join("b.png");
        std::fs::write(&first, b"a")?;
        std::fs::write(&second, b"b")?;
        let args = FormArgs {
            model: Some("nano-banana-edit".to_string()),
            mode: None,
            sets: vec!["prompt=swap the sky".to_string()],
            files: vec![
                format!("reference_images={}", first.display()),
                format!("reference_images={}", second.display()),
            ],
        };
        let values = parse_form_values(&args)?;
        assert_eq!(values.len(), 2);
        assert!(matches!(&values[1].1, FieldValue::Files(files) if files.len() == 2));
        Ok(())
    }

    #[test]
    fn mode_defaults_follow_model_media() -> Result<()> {
        let video = find_model("kling-2.1-standard")?;
        assert_eq!(resolve_mode(None, &video)?, GenerationMode::TextToVideo);
        assert_eq!(
            resolve_mode(Some("image_to_video"), &video)?,
            GenerationMode::ImageToVideo
        );
        assert!(resolve_mode(Some("restyle"), &video).is_err());
        assert!(resolve_mode(Some("sketch"), &video).is_err());

        let effects = find_model("pixverse-v4.5-effects")?;
        assert_eq!(resolve_mode(None, &effects)?, GenerationMode::Template);
        Ok(())
    }

    #[test]
    fn unknown_model_with_a_mode_falls_back_to_that_media() -> Result<()> {
        let args = FormArgs {
            model: Some("no-such-model".to_string()),
            mode: Some("text-to-video".to_string()),
            sets: Vec::new(),
            files: Vec::new(),
        };
        let (model, mode) = select_model(&args)?;
        assert_eq!(model.media, MediaKind::Video);
        assert_eq!(mode, GenerationMode::TextToVideo);

        let known = FormArgs {
            model: Some("kling-2.1-standard".to_string()),
            ..args
        };
        assert_eq!(select_model(&known)?.0.id, "kling-2.1-standard");
        let mismatched = FormArgs {
            mode: Some("restyle".to_string()),
            ..known
        };
        assert!(select_model(&mismatched).is_err());

        let strict = FormArgs {
            model: Some("no-such-model".to_string()),
            mode: None,
            ..mismatched
        };
        assert!(select_model(&strict).is_err());
        Ok(())
    }

    #[test]
    fn explicit_drafts_path_wins() -> Result<()> {
        let path = PathBuf::from("/tmp/custom-drafts.json");
        assert_eq!(drafts_path(Some(path.clone()))?, path);
        Ok(())
    }
}
