use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tracing::debug;

use crate::db::{BinaryRecord, ImportRecord, ImportStatus, LabelRecord, LabelSource};
use crate::host::{NameKind, NameRecord};

/// Minimum schema version we know how to handle.
///
/// `0` means "no schema yet" (fresh DB).
const MIN_SUPPORTED_SCHEMA_VERSION: i32 = 0;

/// Latest schema version this crate knows about.
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Error type for project database operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// Underlying SQLite error.
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// The database was created with a newer schema version than we support.
    #[error(
        "Unsupported schema version {found}; supported range is {min_supported}..={max_supported}"
    )]
    UnsupportedSchemaVersion { found: i32, min_supported: i32, max_supported: i32 },

    /// A stored value could not be decoded.
    #[error("Corrupt {column} value '{value}'")]
    Corrupt { column: &'static str, value: String },
}

/// Convenience result type for DB operations.
pub type DbResult<T> = Result<T, DbError>;

/// SQLite-backed project database.
///
/// This is a thin wrapper around `rusqlite::Connection` that is responsible for:
/// - Opening/creating the DB file.
/// - Applying schema migrations.
/// - Providing small, testable helpers for querying and updating records.
#[derive(Debug)]
pub struct ProjectDb {
    conn: Connection,
}

impl ProjectDb {
    /// Open (or create) a project database at the given path and ensure the schema exists.
    pub fn open(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        apply_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Expose a reference to the underlying connection for advanced callers.
    /// For most code, prefer higher-level helpers.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Insert a binary record and return its row id.
    pub fn insert_binary(&self, record: &BinaryRecord) -> DbResult<i64> {
        self.conn.execute(
            r#"
            INSERT INTO binaries (name, path, arch, hash, image_base)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                record.name,
                record.path,
                record.arch,
                record.hash,
                record.image_base.map(|b| b as i64)
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// List all binaries (ordered by id).
    pub fn list_binaries(&self) -> DbResult<Vec<BinaryRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT name, path, arch, hash, image_base
            FROM binaries
            ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(BinaryRecord {
                name: row.get(0)?,
                path: row.get(1)?,
                arch: row.get(2)?,
                hash: row.get(3)?,
                image_base: row.get::<_, Option<i64>>(4)?.map(|b| b as u64),
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Look up a binary by name, returning its row id alongside the record.
    pub fn find_binary(&self, name: &str) -> DbResult<Option<(i64, BinaryRecord)>> {
        let found = self
            .conn
            .query_row(
                r#"
                SELECT id, name, path, arch, hash, image_base
                FROM binaries
                WHERE name = ?1
                "#,
                params![name],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        BinaryRecord {
                            name: row.get(1)?,
                            path: row.get(2)?,
                            arch: row.get(3)?,
                            hash: row.get(4)?,
                            image_base: row.get::<_, Option<i64>>(5)?.map(|b| b as u64),
                        },
                    ))
                },
            )
            .optional()?;
        Ok(found)
    }

    /// Insert or replace the name at `(binary, address, kind)`.
    pub fn upsert_label(
        &self,
        binary_id: i64,
        address: u64,
        kind: NameKind,
        text: &str,
        source: LabelSource,
    ) -> DbResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            r#"
            INSERT INTO labels (binary_id, address, kind, text, source, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(binary_id, address, kind) DO UPDATE SET
                text = excluded.text,
                source = excluded.source,
                created_at = excluded.created_at
            "#,
            params![binary_id, address as i64, kind.as_str(), text, source.as_str(), now],
        )?;
        debug!(binary_id, address, kind = kind.as_str(), text, "stored name");
        Ok(())
    }

    /// Store a batch of names in one transaction. Returns the number written.
    pub fn store_labels(
        &self,
        binary_id: i64,
        names: &[NameRecord],
        source: LabelSource,
    ) -> DbResult<usize> {
        let tx = self.conn.unchecked_transaction()?;
        for name in names {
            self.upsert_label(binary_id, name.address, name.kind, &name.text, source)?;
        }
        tx.commit()?;
        Ok(names.len())
    }

    /// List stored names, optionally restricted to one binary (ordered by address).
    pub fn list_labels(&self, binary: Option<&str>) -> DbResult<Vec<LabelRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT b.name, l.address, l.kind, l.text, l.source, l.created_at
            FROM labels l
            JOIN binaries b ON b.id = l.binary_id
            WHERE (?1 IS NULL OR b.name = ?1)
            ORDER BY b.name, l.address, l.kind
            "#,
        )?;
        let rows = stmt.query_map(params![binary], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (binary, address, kind, text, source, created_at) = row?;
            let kind = kind
                .parse::<NameKind>()
                .map_err(|_| DbError::Corrupt { column: "labels.kind", value: kind.clone() })?;
            let source = LabelSource::parse(&source)
                .ok_or(DbError::Corrupt { column: "labels.source", value: source.clone() })?;
            out.push(LabelRecord {
                binary,
                address: address as u64,
                kind,
                text,
                source,
                created_at,
            });
        }
        Ok(out)
    }

    /// Count stored names for a binary.
    pub fn count_labels(&self, binary_id: i64) -> DbResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM labels WHERE binary_id = ?1",
            params![binary_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Record a map import and return its row id.
    pub fn insert_import(&self, record: &ImportRecord) -> DbResult<i64> {
        self.conn.execute(
            r#"
            INSERT INTO imports (
                binary, map_path, load_base, symbols_found, labels_inserted, skipped,
                status, error, started_at, finished_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                record.binary,
                record.map_path,
                record.load_base as i64,
                record.symbols_found as i64,
                record.labels_inserted as i64,
                record.skipped as i64,
                record.status.as_str(),
                record.error,
                record.started_at,
                record.finished_at
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// List map imports (ordered by id), optionally filtered by binary name.
    pub fn list_imports(&self, binary: Option<&str>) -> DbResult<Vec<ImportRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT binary, map_path, load_base, symbols_found, labels_inserted, skipped,
                   status, error, started_at, finished_at
            FROM imports
            WHERE (?1 IS NULL OR binary = ?1)
            ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map(params![binary], |row| {
            Ok((
                ImportRecord {
                    binary: row.get(0)?,
                    map_path: row.get(1)?,
                    load_base: row.get::<_, i64>(2)? as u64,
                    symbols_found: row.get::<_, i64>(3)? as usize,
                    labels_inserted: row.get::<_, i64>(4)? as usize,
                    skipped: row.get::<_, i64>(5)? as usize,
                    status: ImportStatus::Failed,
                    error: row.get(7)?,
                    started_at: row.get(8)?,
                    finished_at: row.get(9)?,
                },
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (mut record, status) = row?;
            record.status = ImportStatus::parse(&status)
                .ok_or(DbError::Corrupt { column: "imports.status", value: status.clone() })?;
            out.push(record);
        }
        Ok(out)
    }
}

/// Apply schema migrations in order, tracked through `PRAGMA user_version`.
fn apply_migrations(conn: &Connection) -> DbResult<()> {
    let mut current_version = current_schema_version(conn)?;

    // Reject DBs created with a newer schema than we support.
    if current_version > CURRENT_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            found: current_version,
            min_supported: MIN_SUPPORTED_SCHEMA_VERSION,
            max_supported: CURRENT_SCHEMA_VERSION,
        });
    }

    if current_version == 0 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS binaries (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                name       TEXT NOT NULL UNIQUE,
                path       TEXT NOT NULL,
                arch       TEXT,
                hash       TEXT,
                image_base INTEGER
            );

            CREATE TABLE IF NOT EXISTS labels (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                binary_id  INTEGER NOT NULL REFERENCES binaries(id),
                address    INTEGER NOT NULL,
                kind       TEXT NOT NULL,
                text       TEXT NOT NULL,
                source     TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(binary_id, address, kind)
            );

            PRAGMA user_version = 1;
            COMMIT;
            "#,
        )?;
        current_version = 1;
    }

    if current_version < 2 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS imports (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                binary          TEXT NOT NULL,
                map_path        TEXT NOT NULL,
                load_base       INTEGER NOT NULL,
                symbols_found   INTEGER NOT NULL,
                labels_inserted INTEGER NOT NULL,
                skipped         INTEGER NOT NULL DEFAULT 0,
                status          TEXT NOT NULL,
                error           TEXT,
                started_at      TEXT NOT NULL,
                finished_at     TEXT NOT NULL
            );

            PRAGMA user_version = 2;
            COMMIT;
            "#,
        )?;
        current_version = 2;
    }

    debug_assert_eq!(current_version, CURRENT_SCHEMA_VERSION);
    Ok(())
}

/// Read the SQLite schema version from `PRAGMA user_version`.
fn current_schema_version(conn: &Connection) -> DbResult<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    Ok(version)
}
