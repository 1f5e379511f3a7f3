use serde::{Deserialize, Serialize};

/// Location of the project database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    /// Path to the project database file (typically relative to project root).
    pub path: String,
}

impl DbConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// Serializable configuration describing an ollyscript project.
///
/// This lives at `.ollyscript/project.json` in the project root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Human-friendly project name.
    pub name: String,
    /// Optional description / notes.
    pub description: Option<String>,
    /// Schema/config version. This is about the config format, not binary version.
    pub config_version: String,
    /// Database configuration (path is typically relative to project root).
    pub db: DbConfig,
    /// Load address to rebase images onto when no `--base` is given.
    ///
    /// When absent, images are used at the preferred base from their header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_load_base: Option<u64>,
    /// Skip malformed map lines instead of aborting imports.
    #[serde(default)]
    pub lenient_imports: bool,
}

impl ProjectConfig {
    /// Create a new project configuration using the given name and db path.
    pub fn new(name: impl Into<String>, db_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            config_version: "0.1.0".to_string(),
            db: DbConfig::new(db_path),
            default_load_base: None,
            lenient_imports: false,
        }
    }
}
