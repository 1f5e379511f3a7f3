use anyhow::{anyhow, Context, Result};
use ollyscript_core::db::{LabelSource, ProjectContext};
use ollyscript_core::services::script::ScriptEngine;
use serde::Serialize;
use tracing::info;

use crate::canonicalize_or_current;
use crate::commands::{open_image, resolve_project_file};

/// Outcome of a script run against a registered binary.
#[derive(Debug, Serialize)]
pub struct ScriptRunSummary {
    pub binary: String,
    pub script: String,
    pub output: Vec<String>,
    pub labels_stored: usize,
}

/// Run a rhai script against a registered binary.
///
/// The script sees the binary through the offline image host. Labels and
/// comments it creates are persisted once the script finishes successfully.
pub fn run_script_command(
    root: &str,
    binary: &str,
    script: &str,
    base: Option<u64>,
    json: bool,
) -> Result<ScriptRunSummary> {
    let ctx = ProjectContext::from_root(canonicalize_or_current(root)?)?;
    let (resolved, image) = open_image(&ctx, binary, base)?;
    let script_path = resolve_project_file(&ctx.layout, script, &ctx.layout.scripts_dir)?;

    let engine = ScriptEngine::with_base_dir(image, ctx.layout.root.clone());
    engine
        .run_file(&script_path)
        .with_context(|| format!("Script {} failed", script_path.display()))?;
    let output = engine.output();
    let mut host = engine.into_host().map_err(|e| anyhow!(e))?;

    let labels = host.take_labels();
    let labels_stored = ctx
        .db
        .store_labels(resolved.id, &labels, LabelSource::Script)
        .context("Failed to store script labels")?;
    info!(binary, script = %script_path.display(), labels = labels_stored, "script finished");

    let summary = ScriptRunSummary {
        binary: resolved.record.name,
        script: script_path.display().to_string(),
        output,
        labels_stored,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(summary);
    }

    for line in &summary.output {
        println!("{line}");
    }
    println!("Stored {} label(s) from {}", summary.labels_stored, summary.script);
    Ok(summary)
}
