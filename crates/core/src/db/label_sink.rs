use crate::db::{LabelSource, ProjectDb};
use crate::host::{HostError, LabelSink, NameKind};

/// A [`LabelSink`] that writes names straight into the project database.
pub struct ProjectLabelSink<'a> {
    db: &'a ProjectDb,
    binary_id: i64,
    source: LabelSource,
    written: usize,
}

impl<'a> ProjectLabelSink<'a> {
    pub fn new(db: &'a ProjectDb, binary_id: i64, source: LabelSource) -> Self {
        Self { db, binary_id, source, written: 0 }
    }

    /// Number of names written through this sink.
    pub fn written(&self) -> usize {
        self.written
    }
}

impl LabelSink for ProjectLabelSink<'_> {
    fn insert_name(&mut self, address: u64, kind: NameKind, text: &str) -> Result<(), HostError> {
        self.db
            .upsert_label(self.binary_id, address, kind, text, self.source)
            .map_err(|e| HostError::Label(e.to_string()))?;
        self.written += 1;
        Ok(())
    }
}
