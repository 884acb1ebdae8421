//! budget - Simple personal finance tracker
//!
//! This library holds the startup logic of the `budget` command: it turns the
//! command-line flags into a single startup action, loads or creates the
//! config file, and builds new databases from SQL scripts.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `cli`: Argument parsing, flag resolution and the startup dispatcher
//! - `config`: Default paths and the `key: value` config file
//! - `context`: Per-run options handed to each component
//! - `crypto`: Scrubbed buffers and zeroed strings for secrets
//! - `error`: Custom error types
//! - `storage`: SQLite engine and script bootstrap
//!
//! # Example
//!
//! ```rust,ignore
//! use budget::cli::{cook, StartupArgs};
//! use budget::context::RunContext;
//! use budget::config::{BudgetPaths, ConfigStore};
//!
//! let store = ConfigStore::new(BudgetPaths::new()?);
//! let outcome = cook(&RunContext::default(), &store, StartupArgs::default())?;
//! ```

pub mod cli;
pub mod config;
pub mod context;
pub mod crypto;
pub mod error;
pub mod storage;

pub use context::RunContext;
pub use error::BudgetError;
