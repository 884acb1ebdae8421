//! Command-line interface
//!
//! This module bridges clap argument parsing with the startup dispatcher.
//! The options mirror the single-letter flags of a classic getopt tool.

pub mod cook;
pub mod flags;

use std::path::PathBuf;

use clap::Parser;

pub use cook::{cook, exit_code, Outcome};
pub use flags::{resolve, Action, Flag, StartupArgs, StartupFlags};

use crate::context::RunContext;
use crate::crypto::SecureString;

/// Simple personal finance tracker
#[derive(Parser, Debug)]
#[command(
    name = "budget",
    version,
    about = "Simple personal finance tracker",
    long_about = "Records deposits, expenses and other transactions against categories \
                  in a local SQLite database.",
    disable_help_flag = true
)]
pub struct Cli {
    /// Config file to load (written with defaults if missing)
    #[arg(short = 'C', value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable debugging printouts
    #[arg(short = 'D')]
    pub debug: bool,

    /// Initialize a new database from the script given with -f
    #[arg(short = 'I')]
    pub init: bool,

    /// Budget database to use
    #[arg(short = 'd', value_name = "PATH")]
    pub database: Option<PathBuf>,

    /// SQL script used by -I
    #[arg(short = 'f', value_name = "PATH")]
    pub sql: Option<PathBuf>,

    /// This help message
    #[arg(short = 'h')]
    pub help: bool,

    /// Interactive mode (not implemented)
    #[arg(short = 'i')]
    pub interactive: bool,

    /// Asymmetric decryption key location
    #[arg(short = 'k', value_name = "PATH")]
    pub key: Option<PathBuf>,

    /// Dry run (not implemented)
    #[arg(short = 'n')]
    pub dry_run: bool,

    /// Symmetric decryption password (not implemented, you probably shouldn't use this)
    #[arg(short = 'p', value_name = "PASSWORD")]
    pub password: Option<String>,

    /// Validate database integrity (not implemented)
    #[arg(short = 'v')]
    pub validate: bool,
}

impl Cli {
    /// Options that only affect how the run is carried out
    pub fn run_context(&self) -> RunContext {
        RunContext {
            debug: self.debug,
            dry_run: self.dry_run,
        }
    }
}

impl From<Cli> for StartupArgs {
    fn from(cli: Cli) -> Self {
        Self {
            config: cli.config,
            database: cli.database,
            key: cli.key,
            sql: cli.sql,
            password: cli.password.map(SecureString::new),
            init: cli.init,
            help: cli.help,
            interactive: cli.interactive,
            dry_run: cli.dry_run,
            validate: cli.validate,
        }
    }
}
