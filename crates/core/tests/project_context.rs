use ollyscript_core::db::{BinaryRecord, ProjectConfig, ProjectContext, ProjectLayout};

fn write_config(layout: &ProjectLayout, config: &ProjectConfig) {
    std::fs::create_dir_all(&layout.meta_dir).unwrap();
    std::fs::write(&layout.project_config_path, serde_json::to_string_pretty(config).unwrap())
        .unwrap();
}

#[test]
fn layout_places_metadata_under_dot_dir() {
    let layout = ProjectLayout::new("/work/proj");
    assert!(layout.meta_dir.ends_with(".ollyscript"));
    assert!(layout.project_config_path.ends_with(".ollyscript/project.json"));
    assert!(layout.maps_dir.ends_with("maps"));
    assert!(layout.scripts_dir.ends_with("scripts"));
    assert_eq!(
        std::path::Path::new(&layout.db_path_relative_string()),
        std::path::Path::new(".ollyscript").join("project.db")
    );
}

#[test]
fn project_context_loads_config_and_db() {
    let temp = tempfile::tempdir().unwrap();
    let layout = ProjectLayout::new(temp.path());
    let config = ProjectConfig::new("CtxProject", layout.db_path_relative_string());
    write_config(&layout, &config);

    let ctx = ProjectContext::from_root(temp.path()).expect("context");
    assert_eq!(ctx.config.name, "CtxProject");
    assert_eq!(ctx.config.default_load_base, None);
    assert!(!ctx.config.lenient_imports);
    assert!(ctx.db_path.is_file());

    ctx.db.list_binaries().expect("list binaries");
}

#[test]
fn config_without_optional_fields_still_parses() {
    let temp = tempfile::tempdir().unwrap();
    let layout = ProjectLayout::new(temp.path());
    std::fs::create_dir_all(&layout.meta_dir).unwrap();
    std::fs::write(
        &layout.project_config_path,
        r#"{"name":"Bare","description":null,"config_version":"0.1.0","db":{"path":".ollyscript/project.db"}}"#,
    )
    .unwrap();

    let ctx = ProjectContext::from_root(temp.path()).expect("context");
    assert_eq!(ctx.config.name, "Bare");
    assert_eq!(ctx.config.default_load_base, None);
}

#[test]
fn config_options_round_trip() {
    let mut config = ProjectConfig::new("Opts", ".ollyscript/project.db");
    config.default_load_base = Some(0x1000_0000);
    config.lenient_imports = true;
    let json = serde_json::to_string(&config).unwrap();
    let back: ProjectConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back.default_load_base, Some(0x1000_0000));
    assert!(back.lenient_imports);
}

#[test]
fn resolve_binary_finds_registered_binaries() {
    let temp = tempfile::tempdir().unwrap();
    let layout = ProjectLayout::new(temp.path());
    write_config(&layout, &ProjectConfig::new("Resolve", layout.db_path_relative_string()));

    let ctx = ProjectContext::from_root(temp.path()).unwrap();
    let id = ctx.db.insert_binary(&BinaryRecord::new("prog.exe", "bin/prog.exe")).unwrap();

    let resolved = ctx.resolve_binary("prog.exe").expect("resolve");
    assert_eq!(resolved.id, id);
    assert_eq!(resolved.path, temp.path().join("bin/prog.exe"));

    let err = ctx.resolve_binary("ghost.exe").unwrap_err();
    assert!(err.to_string().contains("not registered"));
}

#[test]
fn missing_config_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let err = ProjectContext::from_root(temp.path()).unwrap_err();
    assert!(err.to_string().contains("Failed to read project config"));
}
