use anyhow::{Context, Result, bail};
use schemars::{Schema, schema_for};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;

use super::models::{ActionDef, Config};

/// Load configuration from a string slice.
///
/// Template paths are kept as written; callers that know the task file's
/// location should prefer [`load_from_path`], which anchors relative template
/// paths and verifies the files exist.
pub fn load_from_str(s: &str) -> Result<Config> {
    let cfg: Config =
        serde_json::from_str(s).context("Failed to parse JSON task string into Config")?;
    validate_config(&cfg)?;
    Ok(cfg)
}

/// Load configuration from any reader (e.g., a file).
pub fn load_from_reader<R: Read>(reader: R) -> Result<Config> {
    let cfg: Config =
        serde_json::from_reader(reader).context("Failed to parse JSON task from reader")?;
    validate_config(&cfg)?;
    Ok(cfg)
}

/// Load configuration from a file path synchronously.
///
/// Relative template paths are resolved against the task file's directory,
/// and each referenced template file must exist.
pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path_ref = path.as_ref();
    let file = File::open(path_ref)
        .with_context(|| format!("Failed to open task file {}", path_ref.display()))?;
    let mut cfg: Config = serde_json::from_reader(file)
        .with_context(|| format!("Failed to parse JSON task from {}", path_ref.display()))?;
    finish_load(&mut cfg, path_ref)?;
    Ok(cfg)
}

/// Load configuration from a file path asynchronously (Tokio).
pub async fn load_from_path_async<P: AsRef<Path>>(path: P) -> Result<Config> {
    use tokio::fs;
    let path_ref = path.as_ref();
    let bytes = fs::read(path_ref)
        .await
        .with_context(|| format!("Failed to read task file {}", path_ref.display()))?;
    let mut cfg: Config = serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse JSON task from {}", path_ref.display()))?;
    finish_load(&mut cfg, path_ref)?;
    Ok(cfg)
}

fn finish_load(cfg: &mut Config, task_path: &Path) -> Result<()> {
    if let Some(base) = task_path.parent() {
        resolve_template_paths(cfg, base);
    }
    validate_config(cfg)?;
    validate_template_files(cfg)?;
    debug!("Loaded task from {}", task_path.display());
    Ok(())
}

/// Generate the JSON Schema for the Config model (for external validation or tooling).
pub fn generate_schema() -> Schema {
    schema_for!(Config)
}

/// Write the JSON Schema for the Config model to any writer (pretty-printed).
pub fn write_schema_to_writer<W: Write>(mut writer: W) -> Result<()> {
    let schema = generate_schema();
    let json = serde_json::to_string_pretty(&schema).context("Failed to serialize schema")?;
    writer
        .write_all(json.as_bytes())
        .context("Failed to write schema to writer")?;
    Ok(())
}

/// Rewrite relative template paths so they are anchored at `base`
/// (normally the directory containing the task file).
pub fn resolve_template_paths(cfg: &mut Config, base: &Path) {
    for step in &mut cfg.steps {
        resolve_action_paths(step, base);
    }
    for action in cfg.actions.values_mut() {
        resolve_action_paths(action, base);
    }
}

fn resolve_action_paths(action: &mut ActionDef, base: &Path) {
    match action {
        ActionDef::FindImage { template, .. }
        | ActionDef::WaitForImage { template, .. }
        | ActionDef::WaitForImageGone { template, .. }
        | ActionDef::ClickImage { template, .. } => {
            let p = Path::new(template.as_str());
            if p.is_relative() {
                *template = base.join(p).to_string_lossy().into_owned();
            }
        }
        ActionDef::Sequence { steps } => {
            for step in steps {
                resolve_action_paths(step, base);
            }
        }
        ActionDef::Conditional { then, else_, .. } => {
            resolve_action_paths(then, base);
            if let Some(e) = else_ {
                resolve_action_paths(e, base);
            }
        }
        _ => {}
    }
}

/// Perform sanity checks and internal reference validation.
/// - Ensure `Ref` actions reference existing named actions.
/// - Ensure confidence values are in (0.0, 1.0].
/// - Ensure polling intervals are non-zero.
pub fn validate_config(cfg: &Config) -> Result<()> {
    let named_action_names = cfg
        .actions
        .keys()
        .cloned()
        .collect::<std::collections::BTreeSet<_>>();

    let dc = cfg.settings.default_confidence;
    if !(dc > 0.0 && dc <= 1.0) {
        bail!("settings.default_confidence must be in (0.0, 1.0], got {dc}");
    }
    if cfg.settings.default_interval_ms == 0 {
        bail!("settings.default_interval_ms must be non-zero");
    }

    for (name, action) in &cfg.actions {
        validate_action(action, &named_action_names)
            .with_context(|| format!("Invalid named action '{}'", name))?;
    }

    for (idx, step) in cfg.steps.iter().enumerate() {
        validate_action(step, &named_action_names)
            .with_context(|| format!("Invalid step {idx}"))?;
    }

    Ok(())
}

/// Verify every template file referenced by the task exists on disk.
/// Run after [`resolve_template_paths`] so relative paths are anchored.
pub fn validate_template_files(cfg: &Config) -> Result<()> {
    let mut check = |template: &str| -> Result<()> {
        if !Path::new(template).is_file() {
            bail!("Template image not found: {template}");
        }
        Ok(())
    };

    let mut result = Ok(());
    for_each_action(cfg, &mut |action| {
        if result.is_err() {
            return;
        }
        if let ActionDef::FindImage { template, .. }
        | ActionDef::WaitForImage { template, .. }
        | ActionDef::WaitForImageGone { template, .. }
        | ActionDef::ClickImage { template, .. } = action
        {
            result = check(template);
        }
    });
    result
}

/// Visit every action in the task (steps and named actions), recursing into
/// sequences and conditionals.
pub fn for_each_action(cfg: &Config, f: &mut impl FnMut(&ActionDef)) {
    for step in &cfg.steps {
        visit_action(step, f);
    }
    for action in cfg.actions.values() {
        visit_action(action, f);
    }
}

fn visit_action(action: &ActionDef, f: &mut impl FnMut(&ActionDef)) {
    f(action);
    match action {
        ActionDef::Sequence { steps } => {
            for step in steps {
                visit_action(step, f);
            }
        }
        ActionDef::Conditional { then, else_, .. } => {
            visit_action(then, f);
            if let Some(e) = else_ {
                visit_action(e, f);
            }
        }
        _ => {}
    }
}

fn validate_action(
    action: &ActionDef,
    named_action_names: &std::collections::BTreeSet<String>,
) -> Result<()> {
    match action {
        ActionDef::Ref { name } => {
            if !named_action_names.contains(name) {
                bail!("Referenced action '{}' was not found in `actions`", name);
            }
        }
        ActionDef::Sequence { steps } => {
            for (i, step) in steps.iter().enumerate() {
                validate_action(step, named_action_names)
                    .with_context(|| format!("Invalid action in sequence at index {}", i))?;
            }
        }
        ActionDef::Conditional { then, else_, .. } => {
            validate_action(then, named_action_names)
                .context("Invalid action in conditional `then` branch")?;
            if let Some(else_action) = else_ {
                validate_action(else_action, named_action_names)
                    .context("Invalid action in conditional `else` branch")?;
            }
        }
        ActionDef::FindImage { confidence, .. }
        | ActionDef::WaitForImage { confidence, .. }
        | ActionDef::WaitForImageGone { confidence, .. }
        | ActionDef::ClickImage { confidence, .. } => {
            if let Some(c) = confidence
                && !(*c > 0.0 && *c <= 1.0)
            {
                bail!("confidence must be in (0.0, 1.0], got {c}");
            }
            if let ActionDef::WaitForImage {
                interval_ms: Some(0),
                ..
            }
            | ActionDef::WaitForImageGone {
                interval_ms: Some(0),
                ..
            }
            | ActionDef::ClickImage {
                interval_ms: Some(0),
                ..
            } = action
            {
                bail!("interval_ms must be non-zero");
            }
        }
        // Leaf actions: nothing to validate
        ActionDef::MouseMove { .. }
        | ActionDef::MouseClick { .. }
        | ActionDef::MouseScroll { .. }
        | ActionDef::KeySeq { .. }
        | ActionDef::TypeText { .. }
        | ActionDef::SleepMs { .. }
        | ActionDef::SleepRandMs { .. }
        | ActionDef::FocusWindow { .. }
        | ActionDef::SetVar { .. }
        | ActionDef::Log { .. }
        | ActionDef::CaptureScreen { .. } => {}
    }
    Ok(())
}
