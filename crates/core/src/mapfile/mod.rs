//! IDA `.map` symbol import.
//!
//! An IDA map export lists public symbols after an `Address  Publics by Value`
//! header:
//!
//! ```text
//!  Address         Publics by Value
//!
//!  0001:00000000       sub_401000
//!  0001:00000010       sub_401010
//!  0002:0000002A       dword_40202A
//!
//! Program entry point at 0001:00000000
//! ```
//!
//! Each `segment:RVA` pair is resolved against the debuggee's section list
//! (selectors are 1-based) and the resulting absolute address is handed to a
//! [`LabelSink`] as a user label.

use std::io::BufRead;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::host::{HostError, LabelSink, Section, SectionSource};

/// Separator IDA writes between the address column and the symbol name.
pub const NAME_SEPARATOR: &str = "       ";

/// Prefix of the header line that opens the publics listing.
pub const PUBLICS_HEADER: &str = "Address";

/// Position of the scanner relative to the publics listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Before the `Address` header.
    Initial,
    /// Header seen; waiting for the blank line that follows it.
    PreMarker,
    /// Inside the listing; every non-blank line is a symbol.
    Marker,
}

/// A symbol resolved to an absolute address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapSymbol {
    pub name: String,
    pub address: u64,
    /// 1-based segment selector as written in the map.
    pub segment: u32,
    pub rva: u64,
    /// 1-based line number in the map file.
    pub line: usize,
}

/// A line that was dropped in lenient mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedLine {
    pub line: usize,
    pub reason: String,
}

/// Output of a full scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedMap {
    pub symbols: Vec<MapSymbol>,
    pub skipped: Vec<SkippedLine>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOptions {
    /// Skip malformed symbol lines instead of aborting the import.
    pub lenient: bool,
}

impl ImportOptions {
    pub fn lenient() -> Self {
        Self { lenient: true }
    }
}

/// Summary of a completed import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub symbols_found: usize,
    pub labels_inserted: usize,
    pub skipped: Vec<SkippedLine>,
}

/// Why a single symbol line could not be resolved.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LineError {
    #[error("missing name separator")]
    MissingSeparator,
    #[error("missing ':' between segment and offset in '{0}'")]
    MissingColon(String),
    #[error("invalid segment selector '{0}'")]
    BadSelector(String),
    #[error("segment {selector} out of range (binary has {available} sections)")]
    SelectorOutOfRange { selector: u32, available: usize },
    #[error("invalid hexadecimal offset '{0}'")]
    BadOffset(String),
    #[error("address 0x{base:X} + 0x{rva:X} overflows")]
    AddressOverflow { base: u64, rva: u64 },
    #[error("empty symbol name")]
    EmptyName,
}

#[derive(Debug, Error)]
pub enum MapError {
    #[error("Failed to read map file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed map line {line}: {source}")]
    Line { line: usize, source: LineError },
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Map(#[from] MapError),
    #[error(transparent)]
    Host(#[from] HostError),
}

/// Resolve one listing line (already trimmed) into a symbol.
pub fn parse_symbol_line(
    text: &str,
    line: usize,
    sections: &[Section],
) -> Result<MapSymbol, LineError> {
    let (full_address, name) =
        text.split_once(NAME_SEPARATOR).ok_or(LineError::MissingSeparator)?;
    let name = name.trim();
    if name.is_empty() {
        return Err(LineError::EmptyName);
    }

    let (selector, offset) = full_address
        .trim()
        .split_once(':')
        .ok_or_else(|| LineError::MissingColon(full_address.trim().to_string()))?;

    let segment: u32 =
        selector.parse().map_err(|_| LineError::BadSelector(selector.to_string()))?;
    let section = segment
        .checked_sub(1)
        .and_then(|idx| sections.get(idx as usize))
        .ok_or(LineError::SelectorOutOfRange { selector: segment, available: sections.len() })?;

    let digits = offset.strip_prefix("0x").or_else(|| offset.strip_prefix("0X")).unwrap_or(offset);
    let rva =
        u64::from_str_radix(digits, 16).map_err(|_| LineError::BadOffset(offset.to_string()))?;
    let address = section
        .base
        .checked_add(rva)
        .ok_or(LineError::AddressOverflow { base: section.base, rva })?;

    Ok(MapSymbol { name: name.to_string(), address, segment, rva, line })
}

/// Scan a map file and resolve every public symbol against `sections`.
///
/// In strict mode the first malformed line aborts the scan.
pub fn parse_map<R: BufRead>(
    mut reader: R,
    sections: &[Section],
    options: &ImportOptions,
) -> Result<ParsedMap, MapError> {
    let mut state = ScanState::Initial;
    let mut parsed = ParsedMap::default();
    let mut buf = Vec::new();
    let mut line_no = 0usize;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        line_no += 1;
        let raw = String::from_utf8_lossy(&buf);
        let text = raw.trim();

        if text.starts_with(PUBLICS_HEADER) {
            state = ScanState::PreMarker;
            continue;
        }

        match (state, text.is_empty()) {
            (ScanState::PreMarker, true) => state = ScanState::Marker,
            (ScanState::Marker, true) => break,
            (ScanState::Marker, false) => match parse_symbol_line(text, line_no, sections) {
                Ok(symbol) => parsed.symbols.push(symbol),
                Err(source) if options.lenient => {
                    warn!(line = line_no, error = %source, "skipping malformed map line");
                    parsed.skipped.push(SkippedLine { line: line_no, reason: source.to_string() });
                }
                Err(source) => return Err(MapError::Line { line: line_no, source }),
            },
            _ => {}
        }
    }

    debug!(
        symbols = parsed.symbols.len(),
        skipped = parsed.skipped.len(),
        lines = line_no,
        "map scan finished"
    );
    Ok(parsed)
}

/// Register each symbol as a user label. Returns the number inserted.
pub fn apply_symbols<L: LabelSink + ?Sized>(
    symbols: &[MapSymbol],
    sink: &mut L,
) -> Result<usize, HostError> {
    for symbol in symbols {
        sink.add_user_label(symbol.address, &symbol.name)?;
    }
    Ok(symbols.len())
}

/// Parse `reader` completely, then insert the symbols into `sink`.
///
/// Nothing is inserted if the scan fails.
pub fn import_ida_symbols<R, S, L>(
    reader: R,
    sections: &S,
    sink: &mut L,
    options: &ImportOptions,
) -> Result<ImportReport, ImportError>
where
    R: BufRead,
    S: SectionSource + ?Sized,
    L: LabelSink + ?Sized,
{
    let sections = sections.sections()?;
    let parsed = parse_map(reader, &sections, options)?;
    let labels_inserted = apply_symbols(&parsed.symbols, sink)?;
    info!(
        symbols = parsed.symbols.len(),
        labels = labels_inserted,
        skipped = parsed.skipped.len(),
        "imported IDA map symbols"
    );
    Ok(ImportReport {
        symbols_found: parsed.symbols.len(),
        labels_inserted,
        skipped: parsed.skipped,
    })
}
