//! Storage layer for budget
//!
//! Wraps the SQLite engine and builds fresh databases from SQL scripts.

pub mod bootstrap;
pub mod engine;

pub use bootstrap::{BootstrapState, Bootstrapper, ScriptCursor};
pub use engine::{Compiled, EngineError, SqlEngine, SqliteEngine, SqliteStatement};
