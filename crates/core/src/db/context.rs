use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};

use crate::db::{open_project_db, BinaryRecord, ProjectConfig, ProjectDb, ProjectLayout};

/// Convenience wrapper bundling layout, config, db path, and an open ProjectDb.
#[derive(Debug)]
pub struct ProjectContext {
    pub layout: ProjectLayout,
    pub config: ProjectConfig,
    pub db_path: PathBuf,
    pub db: ProjectDb,
}

/// A registered binary together with its row id and absolute path.
#[derive(Debug, Clone)]
pub struct ResolvedBinary {
    pub id: i64,
    pub record: BinaryRecord,
    pub path: PathBuf,
}

impl ProjectContext {
    /// Load project config and open the database for a given root.
    pub fn from_root(root: impl AsRef<Path>) -> Result<Self> {
        let layout = ProjectLayout::new(root);
        let (config, db_path, db) = open_project_db(&layout)?;
        Ok(Self { layout, config, db_path, db })
    }

    /// Look up a registered binary by name.
    pub fn resolve_binary(&self, name: &str) -> Result<ResolvedBinary> {
        let (id, record) = self.db.find_binary(name)?.ok_or_else(|| {
            anyhow!("Binary '{}' is not registered in this project (see add-binary)", name)
        })?;
        let path = self.layout.resolve(&record.path);
        Ok(ResolvedBinary { id, record, path })
    }
}
