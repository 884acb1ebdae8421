//! Custom error types for budget
//!
//! This module defines the error hierarchy for the application using thiserror
//! for ergonomic error definitions. Every variant maps onto a process exit
//! status through [`BudgetError::exit_code`].

use thiserror::Error;

use crate::cli::flags::StartupFlags;

/// Exit code for a failed component operation
pub const EXIT_FAILURE: u8 = 1;
/// Exit code for a flag combination that authorizes nothing (EX_USAGE)
pub const EXIT_USAGE: u8 = 64;
/// Exit code for declared but unimplemented functionality (EX_UNAVAILABLE)
pub const EXIT_UNAVAILABLE: u8 = 69;
/// Exit code for internal consistency failures (EX_SOFTWARE)
pub const EXIT_SOFTWARE: u8 = 70;

/// The main error type for budget operations
#[derive(Error, Debug)]
pub enum BudgetError {
    /// The flag mask is not one of the authorized combinations
    #[error("invalid flag state: mask {mask} does not name a startup action")]
    InvalidFlagState { mask: StartupFlags },

    /// The config file exists but could not be read
    #[error("config unavailable: {0}")]
    ConfigUnavailable(String),

    /// The exclusive create of the default config found a file already there
    #[error("config appeared while writing defaults: {0}")]
    ConfigExists(String),

    /// Writing the default config fell short or failed
    #[error("could not write default config: {0}")]
    ConfigWriteFailed(String),

    /// The SQL script could not be opened
    #[error("could not open SQL script: {0}")]
    ScriptOpenFailed(String),

    /// The SQL script could not be mapped into memory
    #[error("could not map SQL script: {0}")]
    ScriptMapFailed(String),

    /// The engine rejected the statement text at `offset`
    #[error("statement at byte {offset} failed to compile: {message}")]
    StatementCompileFailed { offset: usize, message: String },

    /// The engine failed while running the statement at `offset`
    #[error("statement at byte {offset} failed to execute: {message}")]
    StatementExecuteFailed { offset: usize, message: String },

    /// A handle or cursor broke an internal guarantee
    #[error("internal invariant violated: {0}")]
    ResourceInvariantViolated(String),

    /// The database engine could not open the database
    #[error("could not open database: {0}")]
    DatabaseOpenFailed(String),

    /// The database engine reported an error while closing the database
    #[error("could not close database: {0}")]
    DatabaseCloseFailed(String),

    /// Initialization targets a database that is already present
    #[error("database already exists: {0}")]
    DatabaseExists(String),

    /// The asymmetric key file is missing or unreadable
    #[error("key unavailable: {0}")]
    KeyUnavailable(String),

    /// Declared functionality that has no implementation yet
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
}

impl BudgetError {
    /// Process exit status for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::InvalidFlagState { .. } => EXIT_USAGE,
            Self::NotImplemented(_) => EXIT_UNAVAILABLE,
            Self::ResourceInvariantViolated(_) => EXIT_SOFTWARE,
            _ => EXIT_FAILURE,
        }
    }

    /// Check if this error can be recovered from by using in-memory defaults
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ConfigWriteFailed(_))
    }
}

/// Result type alias for budget operations
pub type BudgetResult<T> = Result<T, BudgetError>;
