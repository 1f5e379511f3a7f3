//! Rhai bindings over a debugger host.
//!
//! Scripts see the host through plain functions:
//!
//! | function                         | returns                               |
//! |----------------------------------|---------------------------------------|
//! | `run(status)` / `run(status, pass)` | number of debug events drained     |
//! | `close_process(confirm)`         | bool                                  |
//! | `set_arguments(text)`            | ()                                    |
//! | `main_module()`                  | map: name, path, base, size, entry, image_base |
//! | `sections()`                     | array of maps: name, base, size       |
//! | `disasm(blob, address)`          | `"<dump> <text> (<n> bytes)"`         |
//! | `insert_name(address, kind, text)` | ()                                  |
//! | `add_user_label(address, name)`  | ()                                    |
//! | `import_map(path)` / `import_map(path, lenient)` | labels inserted       |
//! | `log(text)`                      | ()                                    |
//!
//! Relative map paths resolve against the engine's base directory. `print`
//! output is captured and also emitted as `tracing` events; `log` only emits.

use std::cell::RefCell;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use rhai::{Array, Blob, Dynamic, Engine, EvalAltResult, ImmutableString, Map, INT};
use thiserror::Error;
use tracing::{debug, info};

use crate::host::{DebugSession, DebuggerHost, ModuleInfo, NameKind, RunStatus, Section};
use crate::mapfile::ImportOptions;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Failed to read script {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("Script error: {0}")]
    Eval(String),
    #[error("Host is still referenced by the script engine")]
    HostInUse,
}

type FnResult<T> = Result<T, Box<EvalAltResult>>;

fn script_err(err: impl std::fmt::Display) -> Box<EvalAltResult> {
    err.to_string().into()
}

fn to_address(value: INT) -> FnResult<u64> {
    u64::try_from(value).map_err(|_| script_err(format!("invalid address {value}")))
}

fn to_int(value: u64) -> FnResult<INT> {
    INT::try_from(value)
        .map_err(|_| script_err(format!("value 0x{value:X} does not fit a script integer")))
}

fn module_map(module: ModuleInfo) -> FnResult<Map> {
    let mut map = Map::new();
    map.insert("name".into(), Dynamic::from(module.name));
    map.insert("path".into(), Dynamic::from(module.path));
    map.insert("base".into(), Dynamic::from(to_int(module.base)?));
    map.insert("size".into(), Dynamic::from(to_int(module.size)?));
    map.insert("entry".into(), Dynamic::from(to_int(module.entry)?));
    map.insert("image_base".into(), Dynamic::from(to_int(module.image_base)?));
    Ok(map)
}

fn section_map(section: Section) -> FnResult<Dynamic> {
    let mut map = Map::new();
    map.insert("name".into(), Dynamic::from(section.name));
    map.insert("base".into(), Dynamic::from(to_int(section.base)?));
    map.insert("size".into(), Dynamic::from(to_int(section.size)?));
    Ok(Dynamic::from_map(map))
}

/// A rhai engine bound to a single host.
pub struct ScriptEngine<H: DebuggerHost + 'static> {
    engine: Engine,
    session: Rc<RefCell<DebugSession<H>>>,
    output: Rc<RefCell<Vec<String>>>,
}

impl<H: DebuggerHost + 'static> ScriptEngine<H> {
    /// Bind `host`, resolving relative map paths against the current directory.
    pub fn new(host: H) -> Self {
        Self::with_base_dir(host, ".")
    }

    pub fn with_base_dir(host: H, base_dir: impl Into<PathBuf>) -> Self {
        let session = Rc::new(RefCell::new(DebugSession::new(host)));
        let output = Rc::new(RefCell::new(Vec::new()));
        let mut engine = Engine::new();

        let printed = output.clone();
        engine.on_print(move |text| {
            info!(target: "ollyscript::script", "{text}");
            printed.borrow_mut().push(text.to_string());
        });
        engine.on_debug(|text, _source, pos| {
            debug!(target: "ollyscript::script", %pos, "{text}");
        });
        engine.register_fn("log", |text: ImmutableString| {
            info!(target: "ollyscript::script", "{text}");
        });

        register_process(&mut engine, &session);
        register_inspection(&mut engine, &session);
        register_names(&mut engine, &session, base_dir.into());

        Self { engine, session, output }
    }

    /// Evaluate a script. Host errors surface as script runtime errors.
    pub fn run(&self, source: &str) -> Result<(), ScriptError> {
        self.engine.run(source).map_err(|e| ScriptError::Eval(e.to_string()))
    }

    pub fn run_file(&self, path: &Path) -> Result<(), ScriptError> {
        let source = fs::read_to_string(path)
            .map_err(|source| ScriptError::Read { path: path.to_path_buf(), source })?;
        self.run(&source)
    }

    /// Lines written with `print` so far.
    pub fn output(&self) -> Vec<String> {
        self.output.borrow().clone()
    }

    /// Borrow the host between script runs.
    pub fn with_host<T>(&self, f: impl FnOnce(&H) -> T) -> T {
        f(self.session.borrow().host())
    }

    /// Tear down the engine and hand the host back.
    pub fn into_host(self) -> Result<H, ScriptError> {
        let Self { engine, session, .. } = self;
        drop(engine);
        Rc::try_unwrap(session)
            .map(|cell| cell.into_inner().into_host())
            .map_err(|_| ScriptError::HostInUse)
    }
}

fn register_process<H: DebuggerHost + 'static>(
    engine: &mut Engine,
    session: &Rc<RefCell<DebugSession<H>>>,
) {
    let s = session.clone();
    engine.register_fn("run", move |status: ImmutableString| -> FnResult<INT> {
        let status: RunStatus = status.parse().map_err(script_err)?;
        let drained = s.borrow_mut().run(status, false).map_err(script_err)?;
        Ok(drained as INT)
    });

    let s = session.clone();
    engine.register_fn("run", move |status: ImmutableString, pass: bool| -> FnResult<INT> {
        let status: RunStatus = status.parse().map_err(script_err)?;
        let drained = s.borrow_mut().run(status, pass).map_err(script_err)?;
        Ok(drained as INT)
    });

    let s = session.clone();
    engine.register_fn("close_process", move |confirm: bool| -> FnResult<bool> {
        s.borrow_mut().close_process(confirm).map_err(script_err)
    });

    let s = session.clone();
    engine.register_fn("set_arguments", move |arguments: ImmutableString| -> FnResult<()> {
        s.borrow_mut().set_arguments(arguments.as_str()).map_err(script_err)
    });
}

fn register_inspection<H: DebuggerHost + 'static>(
    engine: &mut Engine,
    session: &Rc<RefCell<DebugSession<H>>>,
) {
    let s = session.clone();
    engine.register_fn("main_module", move || -> FnResult<Map> {
        let module = s.borrow().main_module().map_err(script_err)?;
        module_map(module)
    });

    let s = session.clone();
    engine.register_fn("sections", move || -> FnResult<Array> {
        let sections = s.borrow().sections().map_err(script_err)?;
        sections.into_iter().map(section_map).collect()
    });

    let s = session.clone();
    engine.register_fn("disasm", move |code: Blob, address: INT| -> FnResult<String> {
        let address = to_address(address)?;
        let insn = s.borrow().disassemble(&code, address).map_err(script_err)?;
        Ok(insn.to_string())
    });
}

fn register_names<H: DebuggerHost + 'static>(
    engine: &mut Engine,
    session: &Rc<RefCell<DebugSession<H>>>,
    base_dir: PathBuf,
) {
    let s = session.clone();
    engine.register_fn(
        "insert_name",
        move |address: INT, kind: ImmutableString, text: ImmutableString| -> FnResult<()> {
            let kind: NameKind = kind.parse().map_err(script_err)?;
            let address = to_address(address)?;
            s.borrow_mut().insert_name(address, kind, text.as_str()).map_err(script_err)
        },
    );

    let s = session.clone();
    engine.register_fn(
        "add_user_label",
        move |address: INT, name: ImmutableString| -> FnResult<()> {
            let address = to_address(address)?;
            s.borrow_mut().add_user_label(address, name.as_str()).map_err(script_err)
        },
    );

    let base = Rc::new(base_dir);
    let s = session.clone();
    let dir = base.clone();
    engine.register_fn("import_map", move |path: ImmutableString| -> FnResult<INT> {
        import_from_script(&s, &dir, path.as_str(), ImportOptions::default())
    });

    let s = session.clone();
    let dir = base;
    engine.register_fn("import_map", move |path: ImmutableString, lenient: bool| -> FnResult<INT> {
        import_from_script(&s, &dir, path.as_str(), ImportOptions { lenient })
    });
}

fn import_from_script<H: DebuggerHost>(
    session: &Rc<RefCell<DebugSession<H>>>,
    base_dir: &Path,
    path: &str,
    options: ImportOptions,
) -> FnResult<INT> {
    let path = base_dir.join(path);
    let file = File::open(&path)
        .map_err(|e| script_err(format!("failed to open {}: {e}", path.display())))?;
    let report =
        session.borrow_mut().import_map(BufReader::new(file), &options).map_err(script_err)?;
    Ok(report.labels_inserted as INT)
}
