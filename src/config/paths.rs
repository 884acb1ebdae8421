//! Path management for budget
//!
//! Resolves the default locations of the config file and the database.
//!
//! ## Path Resolution Order
//!
//! 1. `BUDGET_HOME` environment variable (if set)
//! 2. The user's home directory as reported by the platform

use std::path::PathBuf;

use directories::BaseDirs;

use crate::error::BudgetError;

/// Directory under home holding the config file
pub const CONFIG_DIR: &str = ".config";
/// Leaf name of the config file
pub const CONFIG_FILE: &str = "budget.conf";
/// Directory under home holding the database
pub const DATABASE_DIR: &str = ".local";
/// Leaf name of the database
pub const DATABASE_FILE: &str = ".budget";

/// Manages the default paths used by budget
#[derive(Debug, Clone)]
pub struct BudgetPaths {
    /// Directory all defaults are relative to
    home_dir: PathBuf,
}

impl BudgetPaths {
    /// Create a new BudgetPaths instance
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self, BudgetError> {
        let home_dir = if let Ok(custom) = std::env::var("BUDGET_HOME") {
            PathBuf::from(custom)
        } else {
            BaseDirs::new()
                .map(|dirs| dirs.home_dir().to_path_buf())
                .ok_or_else(|| BudgetError::ConfigUnavailable("could not determine home directory".into()))?
        };

        Ok(Self { home_dir })
    }

    /// Create BudgetPaths rooted at a custom directory (useful for testing)
    pub fn with_home_dir(home_dir: impl Into<PathBuf>) -> Self {
        Self {
            home_dir: home_dir.into(),
        }
    }

    /// Get the default config file (~/.config/budget.conf)
    pub fn config_file(&self) -> PathBuf {
        self.home_dir.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Get the default database file (~/.local/.budget)
    pub fn database_file(&self) -> PathBuf {
        self.home_dir.join(DATABASE_DIR).join(DATABASE_FILE)
    }
}
