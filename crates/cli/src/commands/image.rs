use anyhow::{anyhow, Context, Result};
use ollyscript_core::db::ProjectContext;
use ollyscript_core::host::{DebugSession, Disassembly, NameKind, SectionSource};

use crate::commands::open_image;
use crate::{canonicalize_or_current, parse_address};

/// List the sections of a registered binary at its effective load base.
pub fn sections_command(root: &str, binary: &str, base: Option<u64>, json: bool) -> Result<()> {
    let ctx = ProjectContext::from_root(canonicalize_or_current(root)?)?;
    let (resolved, image) = open_image(&ctx, binary, base)?;
    let sections = image.sections().context("Failed to enumerate sections")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&sections)?);
        return Ok(());
    }

    println!("Sections of {} (load base 0x{:X}):", resolved.record.name, image.load_base());
    if sections.is_empty() {
        println!("(none)");
        return Ok(());
    }
    for (idx, sec) in sections.iter().enumerate() {
        println!(
            "  {:04}  {:<8}  0x{:08X}-0x{:08X}  ({} bytes)",
            idx + 1,
            sec.name,
            sec.base,
            sec.base.saturating_add(sec.size),
            sec.size
        );
    }
    Ok(())
}

/// Show the main module of a registered binary.
pub fn module_info_command(root: &str, binary: &str, base: Option<u64>, json: bool) -> Result<()> {
    let ctx = ProjectContext::from_root(canonicalize_or_current(root)?)?;
    let (_resolved, image) = open_image(&ctx, binary, base)?;
    let module = DebugSession::new(image).main_module().context("Failed to find main module")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&module)?);
        return Ok(());
    }

    println!("Main module:");
    println!("  Name: {}", module.name);
    println!("  Path: {}", module.path);
    println!("  Base: 0x{:X}", module.base);
    println!("  Image base: 0x{:X}", module.image_base);
    println!("  Size: 0x{:X}", module.size);
    println!("  Entry: 0x{:X}", module.entry);
    Ok(())
}

/// Disassemble `count` instructions from `address` (defaults to the entry point).
pub fn disasm_command(
    root: &str,
    binary: &str,
    address: Option<&str>,
    count: usize,
    base: Option<u64>,
    json: bool,
) -> Result<Vec<Disassembly>> {
    let ctx = ProjectContext::from_root(canonicalize_or_current(root)?)?;
    let (_resolved, image) = open_image(&ctx, binary, base)?;

    let start = match address {
        Some(a) => parse_address(a)?,
        None => DebugSession::new(&image).main_module()?.entry,
    };
    let section = image
        .sections()
        .context("Failed to enumerate sections")?
        .into_iter()
        .find(|s| s.contains(start))
        .ok_or_else(|| anyhow!("Address 0x{start:X} is outside every section of {binary}"))?;
    let listing = image
        .disassemble_range(start, count)
        .with_context(|| format!("Failed to disassemble at 0x{start:X}"))?;

    let labels = ctx.db.list_labels(Some(binary)).context("Failed to list labels")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(listing);
    }

    println!("{} (section {}):", binary, section.name);
    for insn in &listing {
        for label in labels.iter().filter(|l| l.address == insn.address) {
            match label.kind {
                NameKind::Label => println!("{}:", label.text),
                NameKind::Comment => println!("  ; {}", label.text),
            }
        }
        println!("  0x{:08X}  {}", insn.address, insn);
    }
    Ok(listing)
}
