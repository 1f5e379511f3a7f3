mod common;

use std::io::Cursor;

use common::{sample_sections, SAMPLE_MAP};
use ollyscript_core::db::{
    BinaryRecord, DbError, ImportRecord, ImportStatus, LabelSource, ProjectDb, ProjectLabelSink,
    CURRENT_SCHEMA_VERSION,
};
use ollyscript_core::host::{NameKind, NameRecord};
use ollyscript_core::mapfile::{import_ida_symbols, ImportOptions};
use rusqlite::Connection;
use tempfile::tempdir;

fn schema_version(db: &ProjectDb) -> i32 {
    db.connection().query_row("PRAGMA user_version;", [], |row| row.get(0)).expect("version")
}

fn open_with_binary(dir: &std::path::Path) -> (ProjectDb, i64) {
    let db = ProjectDb::open(&dir.join("project.db")).expect("open db");
    let mut bin = BinaryRecord::new("prog.exe", "bin/prog.exe");
    bin.arch = Some("x86".into());
    bin.image_base = Some(0x40_0000);
    let id = db.insert_binary(&bin).expect("insert binary");
    (db, id)
}

#[test]
fn project_db_initializes_and_reopens() {
    let dir = tempdir().expect("tempdir");
    let db_path = dir.path().join("project.db");

    {
        let db = ProjectDb::open(&db_path).expect("open db");
        assert_eq!(schema_version(&db), CURRENT_SCHEMA_VERSION);

        let bin = BinaryRecord::new("prog.exe", "bin/prog.exe");
        let id = db.insert_binary(&bin).expect("insert binary");
        assert!(id > 0);
    }

    {
        let db = ProjectDb::open(&db_path).expect("re-open db");
        assert_eq!(schema_version(&db), CURRENT_SCHEMA_VERSION);
        let binaries = db.list_binaries().expect("list binaries");
        assert_eq!(binaries.len(), 1);
        assert_eq!(binaries[0].name, "prog.exe");
        assert_eq!(binaries[0].image_base, None);
    }
}

#[test]
fn newer_schema_is_rejected() {
    let dir = tempdir().expect("tempdir");
    let db_path = dir.path().join("project.db");
    {
        let conn = Connection::open(&db_path).unwrap();
        conn.execute_batch("PRAGMA user_version = 99;").unwrap();
    }

    match ProjectDb::open(&db_path) {
        Err(DbError::UnsupportedSchemaVersion { found, max_supported, .. }) => {
            assert_eq!(found, 99);
            assert_eq!(max_supported, CURRENT_SCHEMA_VERSION);
        }
        other => panic!("expected unsupported schema error, got {other:?}"),
    }
}

#[test]
fn version_one_database_gains_imports_table() {
    let dir = tempdir().expect("tempdir");
    let db_path = dir.path().join("project.db");
    {
        let conn = Connection::open(&db_path).unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE binaries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                path TEXT NOT NULL,
                arch TEXT,
                hash TEXT,
                image_base INTEGER
            );
            CREATE TABLE labels (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                binary_id INTEGER NOT NULL REFERENCES binaries(id),
                address INTEGER NOT NULL,
                kind TEXT NOT NULL,
                text TEXT NOT NULL,
                source TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(binary_id, address, kind)
            );
            INSERT INTO binaries (name, path) VALUES ('old.exe', 'old.exe');
            PRAGMA user_version = 1;
            "#,
        )
        .unwrap();
    }

    let db = ProjectDb::open(&db_path).expect("migrate");
    assert_eq!(schema_version(&db), 2);
    assert_eq!(db.list_binaries().unwrap()[0].name, "old.exe");
    assert!(db.list_imports(None).unwrap().is_empty());
}

#[test]
fn find_binary_returns_id_and_record() {
    let dir = tempdir().expect("tempdir");
    let (db, id) = open_with_binary(dir.path());

    let (found_id, record) = db.find_binary("prog.exe").unwrap().expect("found");
    assert_eq!(found_id, id);
    assert_eq!(record.arch.as_deref(), Some("x86"));
    assert_eq!(record.image_base, Some(0x40_0000));
    assert!(db.find_binary("other.exe").unwrap().is_none());

    let dup = db.insert_binary(&BinaryRecord::new("prog.exe", "elsewhere"));
    assert!(matches!(dup, Err(DbError::Sql(_))));
}

#[test]
fn upsert_replaces_name_at_same_address_and_kind() {
    let dir = tempdir().expect("tempdir");
    let (db, id) = open_with_binary(dir.path());

    db.upsert_label(id, 0x40_1000, NameKind::Label, "start", LabelSource::Script).unwrap();
    db.upsert_label(id, 0x40_1000, NameKind::Label, "entry", LabelSource::Map).unwrap();
    db.upsert_label(id, 0x40_1000, NameKind::Comment, "prologue", LabelSource::Script).unwrap();
    db.upsert_label(id, 0x40_0FFF, NameKind::Label, "before", LabelSource::Map).unwrap();

    let labels = db.list_labels(Some("prog.exe")).unwrap();
    assert_eq!(labels.len(), 3);
    assert_eq!(labels[0].text, "before");
    // Same address: ordered by kind name, so the comment comes first.
    assert_eq!(labels[1].kind, NameKind::Comment);
    assert_eq!(labels[2].text, "entry");
    assert_eq!(labels[2].source, LabelSource::Map);
    assert_eq!(db.count_labels(id).unwrap(), 3);
    assert!(db.list_labels(Some("other.exe")).unwrap().is_empty());
}

#[test]
fn store_labels_writes_batch() {
    let dir = tempdir().expect("tempdir");
    let (db, id) = open_with_binary(dir.path());

    let names = vec![
        NameRecord { address: 0x40_1000, kind: NameKind::Label, text: "a".into() },
        NameRecord { address: 0x40_1004, kind: NameKind::Comment, text: "b".into() },
    ];
    let written = db.store_labels(id, &names, LabelSource::Script).unwrap();
    assert_eq!(written, 2);

    let labels = db.list_labels(None).unwrap();
    assert!(labels.iter().all(|l| l.source == LabelSource::Script && l.binary == "prog.exe"));
}

#[test]
fn corrupt_label_kind_is_reported() {
    let dir = tempdir().expect("tempdir");
    let (db, id) = open_with_binary(dir.path());
    db.connection()
        .execute(
            "INSERT INTO labels (binary_id, address, kind, text, source, created_at)
             VALUES (?1, 1, 'bookmark', 'x', 'map', 'now')",
            [id],
        )
        .unwrap();

    match db.list_labels(None) {
        Err(DbError::Corrupt { column, value }) => {
            assert_eq!(column, "labels.kind");
            assert_eq!(value, "bookmark");
        }
        other => panic!("expected corrupt error, got {other:?}"),
    }
}

#[test]
fn imports_round_trip_with_status_and_error() {
    let dir = tempdir().expect("tempdir");
    let (db, _id) = open_with_binary(dir.path());

    let ok = ImportRecord {
        binary: "prog.exe".into(),
        map_path: "maps/prog.map".into(),
        load_base: 0x40_0000,
        symbols_found: 3,
        labels_inserted: 3,
        skipped: 0,
        status: ImportStatus::Succeeded,
        error: None,
        started_at: "2026-01-01T00:00:00Z".into(),
        finished_at: "2026-01-01T00:00:01Z".into(),
    };
    let failed = ImportRecord {
        status: ImportStatus::Failed,
        labels_inserted: 0,
        error: Some("Malformed map line 4: missing name separator".into()),
        ..ok.clone()
    };
    let dry =
        ImportRecord { binary: "other.exe".into(), status: ImportStatus::DryRun, ..ok.clone() };
    for record in [&ok, &failed, &dry] {
        db.insert_import(record).unwrap();
    }

    let all = db.list_imports(None).unwrap();
    assert_eq!(all, vec![ok.clone(), failed, dry]);
    let filtered = db.list_imports(Some("other.exe")).unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].status, ImportStatus::DryRun);
}

#[test]
fn project_label_sink_persists_imported_symbols() {
    let dir = tempdir().expect("tempdir");
    let (db, id) = open_with_binary(dir.path());

    let mut sink = ProjectLabelSink::new(&db, id, LabelSource::Map);
    let report = import_ida_symbols(
        Cursor::new(SAMPLE_MAP),
        &sample_sections(),
        &mut sink,
        &ImportOptions::default(),
    )
    .expect("import");
    assert_eq!(report.labels_inserted, 3);
    assert_eq!(sink.written(), 3);

    let labels = db.list_labels(Some("prog.exe")).unwrap();
    let stored: Vec<(u64, &str)> = labels.iter().map(|l| (l.address, l.text.as_str())).collect();
    assert_eq!(
        stored,
        vec![(0x40_1000, "_start"), (0x40_1003, "sub_401003"), (0x40_202A, "dword_40202A")]
    );
    assert!(labels.iter().all(|l| l.source == LabelSource::Map));
}

#[test]
fn label_source_and_import_status_parse_their_own_strings() {
    for source in [LabelSource::Map, LabelSource::Script] {
        assert_eq!(LabelSource::parse(source.as_str()), Some(source));
    }
    for status in [ImportStatus::Succeeded, ImportStatus::Failed, ImportStatus::DryRun] {
        assert_eq!(ImportStatus::parse(status.as_str()), Some(status));
    }
    assert_eq!(LabelSource::parse("ida"), None);
    assert_eq!(LabelSource::parse("manual"), None);
}
