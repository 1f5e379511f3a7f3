use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use ollyscript_core::db::{ProjectContext, ProjectLayout, ResolvedBinary};
use ollyscript_core::services::hosts::ImageHost;

/// Resolve the DB path (respecting relative/absolute config) and open a ProjectDb (delegates to core helper).
pub fn open_project_db(
    layout: &ProjectLayout,
) -> Result<(ollyscript_core::db::ProjectConfig, PathBuf, ollyscript_core::db::ProjectDb)> {
    ollyscript_core::db::open_project_db(layout)
}

/// Helper to print whether a directory exists.
pub fn print_dir_status(label: &str, path: &Path) {
    let exists = path.is_dir();
    println!("- {label}: {} ({})", if exists { "OK" } else { "MISSING" }, path.display());
}

/// Load base for an image: explicit flag, then project default, then the header.
pub fn effective_load_base(ctx: &ProjectContext, base: Option<u64>, image: &ImageHost) -> u64 {
    base.or(ctx.config.default_load_base).unwrap_or_else(|| image.image_base())
}

/// Resolve a registered binary and load it as an offline host.
pub fn open_image(
    ctx: &ProjectContext,
    binary: &str,
    base: Option<u64>,
) -> Result<(ResolvedBinary, ImageHost)> {
    let resolved = ctx.resolve_binary(binary)?;
    let image = load_image(ctx, &resolved, base)?;
    Ok((resolved, image))
}

/// Load an already resolved binary at its effective load base.
pub fn load_image(
    ctx: &ProjectContext,
    resolved: &ResolvedBinary,
    base: Option<u64>,
) -> Result<ImageHost> {
    let image = ImageHost::open(&resolved.path)
        .with_context(|| format!("Failed to load binary {}", resolved.path.display()))?;
    let load_base = effective_load_base(ctx, base, &image);
    Ok(image.with_load_base(load_base))
}

/// Resolve a user-supplied file path.
///
/// Tries the path as given (relative to the project root), then under
/// `fallback_dir`.
pub fn resolve_project_file(
    layout: &ProjectLayout,
    path: &str,
    fallback_dir: &Path,
) -> Result<PathBuf> {
    let direct = layout.resolve(path);
    if direct.is_file() {
        return Ok(direct);
    }
    let fallback = fallback_dir.join(path);
    if fallback.is_file() {
        return Ok(fallback);
    }
    Err(anyhow!("File not found: {} (also looked in {})", path, fallback_dir.display()))
}
