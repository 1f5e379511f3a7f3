use std::fs::File;
use std::io::BufReader;

use anyhow::{Context, Result};
use chrono::Utc;
use ollyscript_core::db::{
    ImportRecord, ImportStatus, LabelSource, ProjectContext, ProjectLabelSink, ResolvedBinary,
};
use ollyscript_core::host::SectionSource;
use ollyscript_core::mapfile::{import_ida_symbols, parse_map, ImportOptions, ImportReport};
use tracing::{info, warn};

use crate::canonicalize_or_current;
use crate::commands::{load_image, resolve_project_file};

/// What an import attempt got as far as resolving, for the imports table.
#[derive(Debug)]
struct ImportTarget {
    map_path: String,
    load_base: u64,
}

/// Import an IDA map file as user labels for a registered binary.
///
/// Symbols are resolved against the binary's sections at its effective load
/// base. Labels are written in a single transaction: a failed import leaves the
/// stored labels untouched. Every attempt against a registered binary,
/// including dry runs and failures, is recorded in the imports table.
pub fn import_map_command(
    root: &str,
    binary: &str,
    map: &str,
    base: Option<u64>,
    lenient: bool,
    dry_run: bool,
    json: bool,
) -> Result<ImportReport> {
    let ctx = ProjectContext::from_root(canonicalize_or_current(root)?)?;
    let resolved = ctx.resolve_binary(binary)?;
    let options = ImportOptions { lenient: lenient || ctx.config.lenient_imports };
    let started_at = Utc::now().to_rfc3339();

    let mut target = ImportTarget { map_path: map.to_string(), load_base: 0 };
    let outcome = attempt_import(&ctx, &resolved, map, base, &options, dry_run, &mut target);

    let (status, error, counts) = match &outcome {
        Ok(report) if dry_run => (ImportStatus::DryRun, None, report.clone()),
        Ok(report) => (ImportStatus::Succeeded, None, report.clone()),
        Err(err) => (ImportStatus::Failed, Some(format!("{err:#}")), ImportReport::default()),
    };
    let record = ImportRecord {
        binary: resolved.record.name.clone(),
        map_path: target.map_path.clone(),
        load_base: target.load_base,
        symbols_found: counts.symbols_found,
        labels_inserted: counts.labels_inserted,
        skipped: counts.skipped.len(),
        status,
        error,
        started_at,
        finished_at: Utc::now().to_rfc3339(),
    };
    ctx.db.insert_import(&record).context("Failed to record map import")?;

    let report = match outcome {
        Ok(report) => report,
        Err(err) => {
            warn!(binary, map = %target.map_path, error = %format!("{err:#}"), "map import failed");
            return Err(err);
        }
    };
    info!(binary, symbols = report.symbols_found, labels = report.labels_inserted, "map imported");

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(report);
    }

    if dry_run {
        println!("Dry run: no labels written.");
    }
    println!("Imported map {}:", target.map_path);
    println!("  Binary: {}", resolved.record.name);
    println!("  Load base: 0x{:X}", target.load_base);
    println!("  Symbols found: {}", report.symbols_found);
    println!("  Labels inserted: {}", report.labels_inserted);
    println!("  Skipped lines: {}", report.skipped.len());
    for skipped in &report.skipped {
        println!("    line {}: {}", skipped.line, skipped.reason);
    }
    Ok(report)
}

/// Load the image, parse the map and (unless dry) store the labels.
///
/// Fills `target` as far as it gets so failures are recorded accurately.
fn attempt_import(
    ctx: &ProjectContext,
    resolved: &ResolvedBinary,
    map: &str,
    base: Option<u64>,
    options: &ImportOptions,
    dry_run: bool,
    target: &mut ImportTarget,
) -> Result<ImportReport> {
    let image = load_image(ctx, resolved, base)?;
    target.load_base = image.load_base();
    let map_path = resolve_project_file(&ctx.layout, map, &ctx.layout.maps_dir)?;
    target.map_path = map_path.display().to_string();

    let file = File::open(&map_path)
        .with_context(|| format!("Failed to open map file {}", map_path.display()))?;
    let reader = BufReader::new(file);
    let failed = || format!("Failed to import {}", map_path.display());

    if dry_run {
        let sections = image.sections().with_context(failed)?;
        let parsed = parse_map(reader, &sections, options).with_context(failed)?;
        return Ok(ImportReport {
            symbols_found: parsed.symbols.len(),
            labels_inserted: 0,
            skipped: parsed.skipped,
        });
    }

    let tx = ctx.db.connection().unchecked_transaction().context("Failed to begin import")?;
    let mut sink = ProjectLabelSink::new(&ctx.db, resolved.id, LabelSource::Map);
    let report = import_ida_symbols(reader, &image, &mut sink, options).with_context(failed)?;
    tx.commit().context("Failed to commit imported labels")?;
    Ok(report)
}

/// List stored labels and comments, optionally for one binary.
pub fn list_labels_command(root: &str, binary: Option<&str>, json: bool) -> Result<()> {
    let ctx = ProjectContext::from_root(canonicalize_or_current(root)?)?;
    if let Some(name) = binary {
        ctx.resolve_binary(name)?;
    }
    let labels = ctx.db.list_labels(binary).context("Failed to list labels")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&labels)?);
        return Ok(());
    }

    println!("Labels:");
    if labels.is_empty() {
        println!("(none)");
        return Ok(());
    }
    for label in labels {
        println!(
            "- {} 0x{:08X} {:<7} {} (source: {})",
            label.binary,
            label.address,
            label.kind.as_str(),
            label.text,
            label.source.as_str()
        );
    }
    Ok(())
}

/// List recorded map imports, optionally for one binary.
pub fn list_imports_command(root: &str, binary: Option<&str>, json: bool) -> Result<()> {
    let ctx = ProjectContext::from_root(canonicalize_or_current(root)?)?;
    let imports = ctx.db.list_imports(binary).context("Failed to list imports")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&imports)?);
        return Ok(());
    }

    println!("Map imports:");
    if imports.is_empty() {
        println!("(none)");
        return Ok(());
    }
    for import in imports {
        println!(
            "- {} <- {} [{}] symbols: {}, labels: {}, skipped: {}, finished: {}",
            import.binary,
            import.map_path,
            import.status.as_str(),
            import.symbols_found,
            import.labels_inserted,
            import.skipped,
            import.finished_at
        );
        if let Some(err) = import.error {
            println!("    error: {err}");
        }
    }
    Ok(())
}
