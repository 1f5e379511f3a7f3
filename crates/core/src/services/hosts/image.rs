use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use capstone::{arch, prelude::*, Capstone};
use goblin::{pe, Object};
use tracing::debug;

use crate::host::{
    Disassembler, Disassembly, HostError, LabelSink, ModuleInfo, ModuleSource, NameKind,
    NameRecord, ProcessControl, RunStatus, Section, SectionSource,
};

/// Instruction set of the loaded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageArch {
    X86,
    X86_64,
}

impl ImageArch {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageArch::X86 => "x86",
            ImageArch::X86_64 => "x86_64",
        }
    }
}

#[derive(Debug, Clone)]
struct ImageSection {
    name: String,
    rva: u64,
    virtual_size: u64,
    raw_offset: usize,
    raw_size: usize,
}

/// Host backed by a PE file on disk instead of a live debugger.
///
/// Sections, main module and disassembly come from the image. Labels are kept
/// in memory; a later name at the same address and kind replaces the earlier
/// one. There is never a running process.
#[derive(Debug)]
pub struct ImageHost {
    path: PathBuf,
    bytes: Vec<u8>,
    arch: ImageArch,
    image_base: u64,
    load_base: u64,
    entry_rva: u64,
    size_of_image: u64,
    sections: Vec<ImageSection>,
    labels: BTreeMap<(u64, NameKind), String>,
    arguments: String,
}

fn arch_from_machine(machine: u16, is_64: bool) -> Result<ImageArch, HostError> {
    match machine {
        pe::header::COFF_MACHINE_X86 => Ok(ImageArch::X86),
        pe::header::COFF_MACHINE_X86_64 => Ok(ImageArch::X86_64),
        _ if is_64 => Ok(ImageArch::X86_64),
        other => Err(HostError::Image(format!("unsupported machine type 0x{other:04X}"))),
    }
}

fn make_cs(arch: ImageArch) -> Result<Capstone, HostError> {
    let mode = match arch {
        ImageArch::X86 => arch::x86::ArchMode::Mode32,
        ImageArch::X86_64 => arch::x86::ArchMode::Mode64,
    };
    Capstone::new()
        .x86()
        .mode(mode)
        .build()
        .map_err(|e| HostError::Disassembly(format!("capstone init failed: {e}")))
}

fn hex_dump(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

fn to_disassembly(insn: &capstone::Insn) -> Disassembly {
    let text = format!("{} {}", insn.mnemonic().unwrap_or(""), insn.op_str().unwrap_or(""))
        .trim()
        .to_string();
    Disassembly {
        address: insn.address(),
        size: insn.bytes().len(),
        dump: hex_dump(insn.bytes()),
        text,
    }
}

impl ImageHost {
    /// Load and parse a PE image.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, HostError> {
        let path = path.as_ref().to_path_buf();
        let bytes = fs::read(&path)
            .map_err(|e| HostError::Image(format!("failed to read {}: {e}", path.display())))?;
        Self::from_bytes(path, bytes)
    }

    /// Parse an image already in memory; `path` is only used for reporting.
    pub fn from_bytes(path: impl Into<PathBuf>, bytes: Vec<u8>) -> Result<Self, HostError> {
        let path = path.into();
        let (arch, image_base, entry_rva, size_of_image, sections) = {
            let pe = match Object::parse(&bytes) {
                Ok(Object::PE(pe)) => pe,
                Ok(_) => {
                    return Err(HostError::Image(format!(
                        "{} is not a PE image",
                        path.display()
                    )))
                }
                Err(e) => return Err(HostError::Image(format!("{}: {e}", path.display()))),
            };
            let arch = arch_from_machine(pe.header.coff_header.machine, pe.is_64)?;
            let size_of_image = pe
                .header
                .optional_header
                .map(|oh| oh.windows_fields.size_of_image as u64)
                .unwrap_or_default();
            let sections = pe
                .sections
                .iter()
                .map(|sec| ImageSection {
                    name: sec.name().unwrap_or_default().to_string(),
                    rva: sec.virtual_address as u64,
                    virtual_size: if sec.virtual_size == 0 {
                        sec.size_of_raw_data as u64
                    } else {
                        sec.virtual_size as u64
                    },
                    raw_offset: sec.pointer_to_raw_data as usize,
                    raw_size: sec.size_of_raw_data as usize,
                })
                .collect::<Vec<_>>();
            (arch, pe.image_base as u64, pe.entry as u64, size_of_image, sections)
        };

        debug!(
            path = %path.display(),
            arch = arch.as_str(),
            image_base,
            sections = sections.len(),
            "loaded PE image"
        );

        Ok(Self {
            path,
            bytes,
            arch,
            image_base,
            load_base: image_base,
            entry_rva,
            size_of_image,
            sections,
            labels: BTreeMap::new(),
            arguments: String::new(),
        })
    }

    /// Rebase the image onto the address it was actually loaded at.
    pub fn with_load_base(mut self, base: u64) -> Self {
        self.load_base = base;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn arch(&self) -> ImageArch {
        self.arch
    }

    pub fn image_base(&self) -> u64 {
        self.image_base
    }

    pub fn load_base(&self) -> u64 {
        self.load_base
    }

    /// Command line most recently set through `set_arguments`.
    pub fn arguments(&self) -> &str {
        &self.arguments
    }

    /// Raw file bytes backing `address`, up to the end of its section's data.
    pub fn bytes_at(&self, address: u64) -> Option<&[u8]> {
        let rva = address.checked_sub(self.load_base)?;
        let sec = self.sections.iter().find(|s| rva >= s.rva && rva - s.rva < s.virtual_size)?;
        let offset_in_section = (rva - sec.rva) as usize;
        if offset_in_section >= sec.raw_size {
            return None;
        }
        let start = sec.raw_offset.checked_add(offset_in_section)?;
        let end = sec.raw_offset.saturating_add(sec.raw_size).min(self.bytes.len());
        if start >= end {
            return None;
        }
        Some(&self.bytes[start..end])
    }

    /// Decode up to `count` instructions starting at an absolute address.
    pub fn disassemble_range(
        &self,
        address: u64,
        count: usize,
    ) -> Result<Vec<Disassembly>, HostError> {
        let code = self.bytes_at(address).ok_or_else(|| {
            HostError::Image(format!("address 0x{address:X} is not backed by file data"))
        })?;
        let cs = make_cs(self.arch)?;
        let insns = cs
            .disasm_count(code, address, count)
            .map_err(|e| HostError::Disassembly(e.to_string()))?;
        Ok(insns.iter().map(|i| to_disassembly(&i)).collect())
    }

    /// Names recorded so far, ordered by address.
    pub fn labels(&self) -> Vec<NameRecord> {
        self.labels
            .iter()
            .map(|((address, kind), text)| NameRecord {
                address: *address,
                kind: *kind,
                text: text.clone(),
            })
            .collect()
    }

    pub fn take_labels(&mut self) -> Vec<NameRecord> {
        let labels = self.labels();
        self.labels.clear();
        labels
    }
}

impl SectionSource for ImageHost {
    fn sections(&self) -> Result<Vec<Section>, HostError> {
        self.sections
            .iter()
            .map(|sec| {
                let base = self.load_base.checked_add(sec.rva).ok_or_else(|| {
                    HostError::Image(format!("section {} overflows the address space", sec.name))
                })?;
                Ok(Section::new(sec.name.clone(), base, sec.virtual_size))
            })
            .collect()
    }
}

impl ModuleSource for ImageHost {
    fn find_main_module(&self) -> Result<Option<ModuleInfo>, HostError> {
        let name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        Ok(Some(ModuleInfo {
            name,
            path: self.path.display().to_string(),
            base: self.load_base,
            size: self.size_of_image,
            entry: self.load_base.wrapping_add(self.entry_rva),
            image_base: self.image_base,
        }))
    }
}

impl Disassembler for ImageHost {
    fn disassemble(&self, code: &[u8], address: u64) -> Result<Disassembly, HostError> {
        let cs = make_cs(self.arch)?;
        let insns = cs
            .disasm_count(code, address, 1)
            .map_err(|e| HostError::Disassembly(e.to_string()))?;
        insns
            .iter()
            .next()
            .map(|i| to_disassembly(&i))
            .ok_or_else(|| {
                HostError::Disassembly(format!("no instruction decoded at 0x{address:X}"))
            })
    }
}

impl LabelSink for ImageHost {
    fn insert_name(&mut self, address: u64, kind: NameKind, text: &str) -> Result<(), HostError> {
        self.labels.insert((address, kind), text.to_string());
        Ok(())
    }
}

impl ProcessControl for ImageHost {
    fn run(&mut self, _status: RunStatus, _pass_exceptions: bool) -> Result<(), HostError> {
        Err(HostError::NoProcess)
    }

    fn check_for_debug_event(&mut self) -> Result<bool, HostError> {
        Ok(false)
    }

    fn close_process(&mut self, _confirm: bool) -> Result<bool, HostError> {
        Err(HostError::NoProcess)
    }

    fn set_arguments(&mut self, arguments: &str) -> Result<(), HostError> {
        self.arguments = arguments.to_string();
        Ok(())
    }
}
