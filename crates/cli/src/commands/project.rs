use std::fs;

use crate::commands::{open_project_db, print_dir_status};
use crate::{canonicalize_or_current, infer_project_name};
use anyhow::{Context, Result};
use serde::Serialize;

#[derive(Serialize)]
pub struct ProjectInfoSnapshot {
    pub name: String,
    pub root: String,
    pub config_file: String,
    pub config_version: String,
    pub db_path: String,
    pub default_load_base: Option<u64>,
    pub lenient_imports: bool,
    pub layout: ProjectInfoLayout,
    pub binaries: Vec<ollyscript_core::db::BinaryRecord>,
    pub label_count: usize,
    pub imports: Vec<ollyscript_core::db::ImportRecord>,
}

#[derive(Serialize)]
pub struct ProjectInfoLayout {
    pub meta_dir: String,
    pub maps_dir: String,
    pub scripts_dir: String,
}

/// Initialize a new project at `root`.
pub fn init_project_command(root: &str, name: Option<String>) -> Result<()> {
    let root_path = canonicalize_or_current(root)?;
    let layout = ollyscript_core::db::ProjectLayout::new(&root_path);

    // Derive project name if not provided.
    let project_name = match name {
        Some(n) => n,
        None => infer_project_name(&root_path),
    };

    // Ensure directories exist.
    fs::create_dir_all(&layout.meta_dir)
        .with_context(|| format!("Failed to create meta dir: {}", layout.meta_dir.display()))?;
    fs::create_dir_all(&layout.maps_dir)
        .with_context(|| format!("Failed to create maps dir: {}", layout.maps_dir.display()))?;
    fs::create_dir_all(&layout.scripts_dir).with_context(|| {
        format!("Failed to create scripts dir: {}", layout.scripts_dir.display())
    })?;

    // Build project config.
    let db_path_rel = layout.db_path_relative_string();
    let config = ollyscript_core::db::ProjectConfig::new(&project_name, db_path_rel);

    // Serialize and write config JSON.
    let json = serde_json::to_string_pretty(&config)?;
    fs::write(&layout.project_config_path, json).with_context(|| {
        format!("Failed to write project config: {}", layout.project_config_path.display())
    })?;

    // Create the project database immediately so follow-on commands (and tests)
    // can rely on its presence.
    ollyscript_core::db::ProjectDb::open(&layout.db_path).with_context(|| {
        format!("Failed to initialize project database at {}", layout.db_path.display())
    })?;

    println!("Initialized ollyscript project:");
    println!("  Name: {}", project_name);
    println!("  Root: {}", layout.root.display());
    println!("  Config: {}", layout.project_config_path.display());
    println!("  DB path (relative): {}", config.db.path);
    println!("  Maps dir: {}", layout.maps_dir.display());
    println!("  Scripts dir: {}", layout.scripts_dir.display());

    Ok(())
}

/// Show basic information about an existing project.
pub fn project_info_command(root: &str, json: bool) -> Result<()> {
    let root_path = canonicalize_or_current(root)?;
    let layout = ollyscript_core::db::ProjectLayout::new(&root_path);

    let (config, _db_path, db) = open_project_db(&layout)?;
    let binaries = db.list_binaries().context("Failed to list binaries")?;
    let labels = db.list_labels(None).context("Failed to list labels")?;
    let imports = db.list_imports(None).context("Failed to list imports")?;

    if json {
        let snapshot = ProjectInfoSnapshot {
            name: config.name.clone(),
            root: layout.root.display().to_string(),
            config_file: layout.project_config_path.display().to_string(),
            config_version: config.config_version.clone(),
            db_path: config.db.path.clone(),
            default_load_base: config.default_load_base,
            lenient_imports: config.lenient_imports,
            layout: ProjectInfoLayout {
                meta_dir: layout.meta_dir.display().to_string(),
                maps_dir: layout.maps_dir.display().to_string(),
                scripts_dir: layout.scripts_dir.display().to_string(),
            },
            binaries,
            label_count: labels.len(),
            imports,
        };
        let serialized = serde_json::to_string_pretty(&snapshot)?;
        println!("{}", serialized);
        return Ok(());
    }

    println!("ollyscript Project Info");
    println!("=======================");
    println!("Name: {}", config.name);
    println!("Root: {}", layout.root.display());
    println!("Config file: {}", layout.project_config_path.display());
    println!("Config version: {}", config.config_version);
    println!("DB path (config): {}", config.db.path);
    if let Some(base) = config.default_load_base {
        println!("Default load base: 0x{:X}", base);
    }
    println!("Lenient imports: {}", config.lenient_imports);
    println!();

    // Basic directory existence checks.
    println!("Directories:");
    print_dir_status("Meta dir (.ollyscript)", &layout.meta_dir);
    print_dir_status("Maps dir", &layout.maps_dir);
    print_dir_status("Scripts dir", &layout.scripts_dir);
    println!();
    println!("Binaries: {}", binaries.len());
    for bin in &binaries {
        println!("- {} ({})", bin.name, bin.path);
    }
    println!("Labels: {}", labels.len());
    println!("Map imports: {}", imports.len());

    Ok(())
}
