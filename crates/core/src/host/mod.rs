//! Capability interfaces for the debugger host.
//!
//! Every native call the scripting layer needs is expressed as a small trait so
//! callers receive the host as an injected collaborator. A live debugger plugin,
//! the offline [`ImageHost`](crate::services::hosts::ImageHost), and test fakes
//! all implement the same set.

pub mod session;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use session::{DebugSession, ARGUMENT_CAPACITY};

/// A section of the debugged binary as mapped in the debuggee address space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    /// Absolute load address of the first byte of the section.
    pub base: u64,
    pub size: u64,
}

impl Section {
    pub fn new(name: impl Into<String>, base: u64, size: u64) -> Self {
        Self { name: name.into(), base, size }
    }

    /// True if `address` falls inside `[base, base + size)`.
    pub fn contains(&self, address: u64) -> bool {
        address >= self.base && address - self.base < self.size
    }
}

/// Information about the main module of the debuggee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub name: String,
    pub path: String,
    /// Actual load address.
    pub base: u64,
    pub size: u64,
    /// Absolute address of the entry point.
    pub entry: u64,
    /// Preferred base from the PE header.
    pub image_base: u64,
}

/// Result of decoding a single instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disassembly {
    pub address: u64,
    /// Number of bytes consumed by the instruction.
    pub size: usize,
    /// Hex dump of the instruction bytes.
    pub dump: String,
    /// Mnemonic and operands.
    pub text: String,
}

impl fmt::Display for Disassembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({} bytes)", self.dump, self.text, self.size)
    }
}

/// What `insert_name` attaches at an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameKind {
    /// User label, shown in place of the address (the `:` shortcut).
    Label,
    /// User comment, shown next to the instruction (the `;` shortcut).
    Comment,
}

impl NameKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NameKind::Label => "label",
            NameKind::Comment => "comment",
        }
    }
}

impl FromStr for NameKind {
    type Err = HostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "label" => Ok(NameKind::Label),
            "comment" => Ok(NameKind::Comment),
            other => Err(HostError::Unsupported(format!(
                "unknown name kind '{other}'. Allowed: label, comment"
            ))),
        }
    }
}

/// Execution mode requested from the host when resuming the debuggee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    #[default]
    Running,
    RunThread,
    StepIn,
    StepOver,
    AnimateIn,
    AnimateOver,
    TraceIn,
    TraceOver,
    TillReturn,
    OverReturn,
    TillUser,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "run",
            RunStatus::RunThread => "run-thread",
            RunStatus::StepIn => "step-in",
            RunStatus::StepOver => "step-over",
            RunStatus::AnimateIn => "animate-in",
            RunStatus::AnimateOver => "animate-over",
            RunStatus::TraceIn => "trace-in",
            RunStatus::TraceOver => "trace-over",
            RunStatus::TillReturn => "till-return",
            RunStatus::OverReturn => "over-return",
            RunStatus::TillUser => "till-user",
        }
    }
}

impl FromStr for RunStatus {
    type Err = HostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s.to_ascii_lowercase().as_str() {
            "run" | "running" => RunStatus::Running,
            "run-thread" => RunStatus::RunThread,
            "step-in" => RunStatus::StepIn,
            "step-over" => RunStatus::StepOver,
            "animate-in" => RunStatus::AnimateIn,
            "animate-over" => RunStatus::AnimateOver,
            "trace-in" => RunStatus::TraceIn,
            "trace-over" => RunStatus::TraceOver,
            "till-return" => RunStatus::TillReturn,
            "over-return" => RunStatus::OverReturn,
            "till-user" => RunStatus::TillUser,
            other => {
                return Err(HostError::Unsupported(format!("unknown run status '{other}'")));
            }
        };
        Ok(status)
    }
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("No process is being debugged")]
    NoProcess,
    #[error("Host did not report a main module")]
    NoMainModule,
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    #[error("Disassembly failed: {0}")]
    Disassembly(String),
    #[error("Image error: {0}")]
    Image(String),
    #[error("Label insertion failed: {0}")]
    Label(String),
}

/// Ordered list of the debuggee's sections.
pub trait SectionSource {
    fn sections(&self) -> Result<Vec<Section>, HostError>;
}

/// Receiver for names (labels and comments) placed on the disassembly.
pub trait LabelSink {
    fn insert_name(&mut self, address: u64, kind: NameKind, text: &str) -> Result<(), HostError>;

    fn add_user_label(&mut self, address: u64, name: &str) -> Result<(), HostError> {
        self.insert_name(address, NameKind::Label, name)
    }
}

pub trait ModuleSource {
    /// `Ok(None)` when the host has no main module loaded.
    fn find_main_module(&self) -> Result<Option<ModuleInfo>, HostError>;
}

pub trait Disassembler {
    /// Decode exactly one instruction from the start of `code`, as if it were at `address`.
    fn disassemble(&self, code: &[u8], address: u64) -> Result<Disassembly, HostError>;
}

pub trait ProcessControl {
    fn run(&mut self, status: RunStatus, pass_exceptions: bool) -> Result<(), HostError>;

    /// Process one pending debug event. Returns true if an event was handled.
    fn check_for_debug_event(&mut self) -> Result<bool, HostError>;

    fn close_process(&mut self, confirm: bool) -> Result<bool, HostError>;

    /// Replace the command line passed to the debuggee on its next start.
    fn set_arguments(&mut self, arguments: &str) -> Result<(), HostError>;
}

/// Everything the scripting layer can ask of a host.
pub trait DebuggerHost:
    SectionSource + LabelSink + ModuleSource + Disassembler + ProcessControl
{
}

impl<T> DebuggerHost for T where
    T: SectionSource + LabelSink + ModuleSource + Disassembler + ProcessControl
{
}

impl<T: SectionSource + ?Sized> SectionSource for &T {
    fn sections(&self) -> Result<Vec<Section>, HostError> {
        (**self).sections()
    }
}

impl<T: ModuleSource + ?Sized> ModuleSource for &T {
    fn find_main_module(&self) -> Result<Option<ModuleInfo>, HostError> {
        (**self).find_main_module()
    }
}

impl<T: Disassembler + ?Sized> Disassembler for &T {
    fn disassemble(&self, code: &[u8], address: u64) -> Result<Disassembly, HostError> {
        (**self).disassemble(code, address)
    }
}

impl SectionSource for [Section] {
    fn sections(&self) -> Result<Vec<Section>, HostError> {
        Ok(self.to_vec())
    }
}

impl SectionSource for Vec<Section> {
    fn sections(&self) -> Result<Vec<Section>, HostError> {
        Ok(self.clone())
    }
}

impl<T: LabelSink + ?Sized> LabelSink for &mut T {
    fn insert_name(&mut self, address: u64, kind: NameKind, text: &str) -> Result<(), HostError> {
        (**self).insert_name(address, kind, text)
    }
}

/// A label or comment as recorded by an in-memory sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRecord {
    pub address: u64,
    pub kind: NameKind,
    pub text: String,
}

/// In-memory sink that keeps insertion order.
impl LabelSink for Vec<NameRecord> {
    fn insert_name(&mut self, address: u64, kind: NameKind, text: &str) -> Result<(), HostError> {
        self.push(NameRecord { address, kind, text: text.to_string() });
        Ok(())
    }
}
