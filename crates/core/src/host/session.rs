use std::io::BufRead;

use tracing::debug;

use crate::host::{
    Disassembler, Disassembly, HostError, LabelSink, ModuleInfo, ModuleSource, NameKind,
    ProcessControl, RunStatus, Section, SectionSource,
};
use crate::mapfile::{import_ida_symbols, ImportError, ImportOptions, ImportReport};

/// Size of the host's argument buffer, terminator included.
pub const ARGUMENT_CAPACITY: usize = 1024;

/// Script-facing wrapper around a host.
///
/// Adds the small amount of behavior the raw host calls need to be usable from
/// scripts: draining debug events after resuming, turning a missing main module
/// into an error, and clamping arguments to the host buffer.
#[derive(Debug)]
pub struct DebugSession<H> {
    host: H,
}

impl<H> DebugSession<H> {
    pub fn new(host: H) -> Self {
        Self { host }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }
}

impl<H: ProcessControl> DebugSession<H> {
    /// Resume the debuggee, then drain pending debug events so thread
    /// registers reflect the new state. Returns the number of events drained.
    pub fn run(&mut self, status: RunStatus, pass_exceptions: bool) -> Result<usize, HostError> {
        self.host.run(status, pass_exceptions)?;
        let mut drained = 0;
        while self.host.check_for_debug_event()? {
            drained += 1;
        }
        debug!(status = status.as_str(), drained, "debuggee resumed");
        Ok(drained)
    }

    pub fn close_process(&mut self, confirm: bool) -> Result<bool, HostError> {
        self.host.close_process(confirm)
    }

    /// Set the debuggee command line, truncated to what the host buffer holds.
    ///
    /// The buffer holds UTF-16 units, so characters outside the BMP take two
    /// slots. A character that would not fit whole is dropped.
    pub fn set_arguments(&mut self, arguments: &str) -> Result<(), HostError> {
        let limit = ARGUMENT_CAPACITY - 1;
        let mut units = 0;
        let cut = arguments.char_indices().find_map(|(idx, ch)| {
            units += ch.len_utf16();
            (units > limit).then_some(idx)
        });
        match cut {
            Some(cut) => self.host.set_arguments(&arguments[..cut]),
            None => self.host.set_arguments(arguments),
        }
    }
}

impl<H: ModuleSource> DebugSession<H> {
    pub fn main_module(&self) -> Result<ModuleInfo, HostError> {
        self.host.find_main_module()?.ok_or(HostError::NoMainModule)
    }
}

impl<H: SectionSource> DebugSession<H> {
    pub fn sections(&self) -> Result<Vec<Section>, HostError> {
        self.host.sections()
    }
}

impl<H: Disassembler> DebugSession<H> {
    pub fn disassemble(&self, code: &[u8], address: u64) -> Result<Disassembly, HostError> {
        self.host.disassemble(code, address)
    }
}

impl<H: LabelSink> DebugSession<H> {
    pub fn insert_name(
        &mut self,
        address: u64,
        kind: NameKind,
        text: &str,
    ) -> Result<(), HostError> {
        self.host.insert_name(address, kind, text)
    }

    pub fn add_user_label(&mut self, address: u64, name: &str) -> Result<(), HostError> {
        self.host.add_user_label(address, name)
    }
}

impl<H: SectionSource + LabelSink> DebugSession<H> {
    /// Import an IDA map file into the host as user labels.
    pub fn import_map<R: BufRead>(
        &mut self,
        reader: R,
        options: &ImportOptions,
    ) -> Result<ImportReport, ImportError> {
        let sections = self.host.sections()?;
        import_ida_symbols(reader, &sections, &mut self.host, options)
    }
}
