//! Project database integration and project layout definitions.
//!
//! This module wraps a SQLite database storing:
//! - Binaries registered in the project
//! - Labels and comments attached to addresses of those binaries
//! - The history of IDA map imports
//!
//! It also owns the on-disk layout (`ProjectLayout`) and the JSON project
//! config (`ProjectConfig`).

mod config;
mod context;
mod label_sink;
mod layout;
mod models;
mod project_db;
mod util;

pub use config::{DbConfig, ProjectConfig};
pub use context::{ProjectContext, ResolvedBinary};
pub use label_sink::ProjectLabelSink;
pub use layout::ProjectLayout;
pub use models::{BinaryRecord, ImportRecord, ImportStatus, LabelRecord, LabelSource};
pub use project_db::{DbError, DbResult, ProjectDb, CURRENT_SCHEMA_VERSION};
pub use util::{load_project_config, open_project_db};
