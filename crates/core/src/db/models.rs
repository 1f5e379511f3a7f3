use serde::{Deserialize, Serialize};

use crate::host::NameKind;

/// Record describing a binary known to the project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BinaryRecord {
    /// Human-friendly name, unique within the project.
    pub name: String,
    /// Path to the binary, relative to the project root if possible.
    pub path: String,
    /// Optional architecture string (e.g., "x86", "x86_64").
    pub arch: Option<String>,
    /// Optional content hash for identity (SHA-256).
    pub hash: Option<String>,
    /// Preferred image base from the PE header, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_base: Option<u64>,
}

impl BinaryRecord {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self { name: name.into(), path: path.into(), arch: None, hash: None, image_base: None }
    }
}

/// Where a stored name came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LabelSource {
    /// Imported from an IDA map file.
    Map,
    /// Inserted by a script.
    Script,
}

impl LabelSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelSource::Map => "map",
            LabelSource::Script => "script",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "map" => Some(LabelSource::Map),
            "script" => Some(LabelSource::Script),
            _ => None,
        }
    }
}

/// A label or comment stored for a binary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LabelRecord {
    pub binary: String,
    pub address: u64,
    pub kind: NameKind,
    pub text: String,
    pub source: LabelSource,
    pub created_at: String,
}

/// Allowed status values for map imports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    Succeeded,
    Failed,
    /// Parsed but not written (`--dry-run`).
    DryRun,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Succeeded => "succeeded",
            ImportStatus::Failed => "failed",
            ImportStatus::DryRun => "dryrun",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "succeeded" => Some(ImportStatus::Succeeded),
            "failed" => Some(ImportStatus::Failed),
            "dryrun" => Some(ImportStatus::DryRun),
            _ => None,
        }
    }
}

/// Bookkeeping for one map import.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportRecord {
    pub binary: String,
    pub map_path: String,
    pub load_base: u64,
    pub symbols_found: usize,
    pub labels_inserted: usize,
    pub skipped: usize,
    pub status: ImportStatus,
    /// Error message for failed imports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: String,
    pub finished_at: String,
}
