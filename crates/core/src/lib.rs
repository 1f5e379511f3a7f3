//! ollyscript-core
//!
//! Scripting bindings over a debugger's plugin API.
//!
//! The host debugger is modelled as a set of capability traits (`host`), so the
//! logic here never calls native exports directly. On top of them this crate
//! provides the IDA `.map` importer (`mapfile`), a debug-session facade, an
//! offline host backed by a PE image, rhai script bindings (`services`), and a
//! small SQLite project store (`db`).

pub mod db;
pub mod host;
pub mod mapfile;
pub mod services;

/// Returns the library version as encoded at compile time.
///
/// Useful for tests and for frontends to report consistent version info.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
