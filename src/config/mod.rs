//! Configuration module for budget
//!
//! This module provides configuration management including:
//! - Default path resolution under the user's home directory
//! - Loading the `key: value` config file, or writing defaults if it is absent

pub mod paths;
pub mod store;

pub use paths::BudgetPaths;
pub use store::{CipherSpec, Config, ConfigSource, ConfigStore, HashSpec, LoadedConfig};
