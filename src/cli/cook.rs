//! Startup dispatcher
//!
//! [`cook`] loads the config if one was named, resolves the remaining
//! arguments into an [`Action`] and carries out exactly that action.

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

use log::{debug, error, info};

use super::flags::{resolve, Action, StartupArgs};
use crate::config::{Config, ConfigStore};
use crate::context::RunContext;
use crate::error::{BudgetError, BudgetResult};
use crate::storage::{Bootstrapper, SqliteEngine};

/// What a successful run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Help was requested
    Help,
    /// An existing database was opened
    Connected {
        database: PathBuf,
        schema_version: i64,
    },
    /// A new database was built from a script
    Initialized {
        database: PathBuf,
        statements: usize,
    },
    /// A script ran against a scratch database instead of `database`
    Rehearsed {
        database: PathBuf,
        statements: usize,
    },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Help => write!(f, "help"),
            Self::Connected {
                database,
                schema_version,
            } => write!(
                f,
                "connected to {} (schema version {})",
                database.display(),
                schema_version
            ),
            Self::Initialized {
                database,
                statements,
            } => write!(
                f,
                "initialized {}: {} statements executed",
                database.display(),
                statements
            ),
            Self::Rehearsed {
                database,
                statements,
            } => write!(
                f,
                "dry run: {} statements would initialize {}",
                statements,
                database.display()
            ),
        }
    }
}

/// Exit status for the result of [`cook`]
pub fn exit_code(result: &BudgetResult<Outcome>) -> u8 {
    match result {
        Ok(_) => 0,
        Err(err) => err.exit_code(),
    }
}

/// Carry out the startup the arguments ask for
///
/// A config named with `-C` is loaded first. Once loaded it no longer counts
/// towards the flag mask, and its database path stands in for a missing
/// `-d`. If loading fails the config flag stays set and the mask resolves to
/// [`Action::Invalid`]. The context is handed on to whichever component runs.
pub fn cook(ctx: &RunContext, store: &ConfigStore, mut args: StartupArgs) -> BudgetResult<Outcome> {
    debug!("run context {:?}, mask {}", ctx, args.flags());

    let mut config = None;
    if !args.help {
        if let Some(path) = args.config.clone() {
            match store.load(ctx, &path) {
                Ok(loaded) => {
                    debug!("config {} loaded from {:?}", path.display(), loaded.source);
                    args.config = None;
                    if args.database.is_none() {
                        args.database = Some(loaded.config.database.clone());
                    }
                    config = Some(loaded.config);
                }
                Err(err) => error!("{}", err),
            }
        }
    }

    args.report_unimplemented();

    match resolve(&args) {
        Action::ShowHelp => Ok(Outcome::Help),
        Action::Connect { database } => connect(&database),
        Action::Decrypt { database, key } => {
            check_decryptable(&database, &key, config.as_ref())?;
            Err(BudgetError::NotImplemented("database decryption"))
        }
        Action::Initialize { database, sql } => initialize(ctx, &database, &sql),
        Action::BootstrapEncrypted { key, .. } => {
            check_key(&key)?;
            Err(BudgetError::NotImplemented("encrypted bootstrap"))
        }
        Action::Invalid { mask } => Err(BudgetError::InvalidFlagState { mask }),
    }
}

/// Open an existing database and read its schema version
fn connect(database: &Path) -> BudgetResult<Outcome> {
    let engine = SqliteEngine::open_existing(database)?;
    let schema_version: i64 = engine
        .connection()
        .query_row("PRAGMA schema_version", [], |row| row.get(0))
        .map_err(|e| BudgetError::DatabaseOpenFailed(format!("{}: {}", database.display(), e)))?;
    engine.close()?;

    info!("connected to {}", database.display());
    Ok(Outcome::Connected {
        database: database.to_path_buf(),
        schema_version,
    })
}

/// Build a new database at `database` from the script at `sql`
///
/// A dry run builds the same schema in memory and leaves `database` alone.
fn initialize(ctx: &RunContext, database: &Path, sql: &Path) -> BudgetResult<Outcome> {
    if database.exists() {
        return Err(BudgetError::DatabaseExists(database.display().to_string()));
    }
    let script = File::open(sql)
        .map_err(|e| BudgetError::ScriptOpenFailed(format!("{}: {}", sql.display(), e)))?;

    if ctx.dry_run {
        let mut engine = SqliteEngine::in_memory()?;
        let statements = Bootstrapper::new(&mut engine).run(ctx, script)?;
        engine.close()?;
        info!("dry run of {} against scratch database passed", sql.display());
        return Ok(Outcome::Rehearsed {
            database: database.to_path_buf(),
            statements,
        });
    }

    let mut engine = SqliteEngine::create(database)?;
    let statements = Bootstrapper::new(&mut engine).run(ctx, script)?;
    engine.close()?;

    info!("initialized {} with {} statements", database.display(), statements);
    Ok(Outcome::Initialized {
        database: database.to_path_buf(),
        statements,
    })
}

/// Checks that must pass before a database can be decrypted
fn check_decryptable(database: &Path, key: &Path, config: Option<&Config>) -> BudgetResult<()> {
    check_regular_file(database)
        .map_err(|e| BudgetError::DatabaseOpenFailed(format!("{}: {}", database.display(), e)))?;
    check_key(key)?;
    if let Some(config) = config {
        debug!("decrypting with {} (hash {})", config.cipher, config.hash);
    }
    Ok(())
}

fn check_key(key: &Path) -> BudgetResult<()> {
    check_regular_file(key)
        .map_err(|e| BudgetError::KeyUnavailable(format!("{}: {}", key.display(), e)))
}

fn check_regular_file(path: &Path) -> Result<(), String> {
    let file = File::open(path).map_err(|e| e.to_string())?;
    let metadata = file.metadata().map_err(|e| e.to_string())?;
    if !metadata.is_file() {
        return Err("not a regular file".into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::flags::{Flag, StartupFlags};
    use crate::config::BudgetPaths;
    use crate::error::{EXIT_FAILURE, EXIT_UNAVAILABLE, EXIT_USAGE};
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        temp_dir: TempDir,
        store: ConfigStore,
    }

    impl Fixture {
        fn new() -> Self {
            let temp_dir = TempDir::new().unwrap();
            let store = ConfigStore::new(BudgetPaths::with_home_dir(temp_dir.path()));
            Self { temp_dir, store }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.temp_dir.path().join(name)
        }

        fn write(&self, name: &str, contents: &str) -> PathBuf {
            let path = self.path(name);
            fs::write(&path, contents).unwrap();
            path
        }

        fn cook(&self, args: StartupArgs) -> BudgetResult<Outcome> {
            cook(&RunContext::default(), &self.store, args)
        }

        fn dry_run(&self, args: StartupArgs) -> BudgetResult<Outcome> {
            let ctx = RunContext {
                dry_run: true,
                ..Default::default()
            };
            cook(&ctx, &self.store, args)
        }

        fn init_args(&self, database: &str, sql: PathBuf) -> StartupArgs {
            StartupArgs {
                init: true,
                database: Some(self.path(database)),
                sql: Some(sql),
                ..Default::default()
            }
        }
    }

    #[test]
    fn test_initialize_then_connect() {
        let fx = Fixture::new();
        let sql = fx.write("schema.sql", "CREATE TABLE t(x);\nINSERT INTO t VALUES(1);\n");

        let outcome = fx.cook(fx.init_args("new.db", sql)).unwrap();
        assert_eq!(
            outcome,
            Outcome::Initialized {
                database: fx.path("new.db"),
                statements: 2
            }
        );

        let result = fx.cook(StartupArgs {
            database: Some(fx.path("new.db")),
            ..Default::default()
        });
        assert!(matches!(result, Ok(Outcome::Connected { schema_version, .. }) if schema_version > 0));
        assert_eq!(exit_code(&result), 0);
    }

    #[test]
    fn test_initialize_refuses_existing_database() {
        let fx = Fixture::new();
        let sql = fx.write("schema.sql", "CREATE TABLE t(x);");
        fx.write("new.db", "");

        let err = fx.cook(fx.init_args("new.db", sql)).unwrap_err();
        assert!(matches!(err, BudgetError::DatabaseExists(_)));
    }

    #[test]
    fn test_missing_script_creates_nothing() {
        let fx = Fixture::new();
        let err = fx
            .cook(fx.init_args("new.db", fx.path("missing.sql")))
            .unwrap_err();
        assert!(matches!(err, BudgetError::ScriptOpenFailed(_)));
        assert!(!fx.path("new.db").exists());
    }

    #[test]
    fn test_failed_bootstrap_is_a_failure() {
        let fx = Fixture::new();
        let sql = fx.write("schema.sql", "CREATE TABLE t(x);\nNOT SQL;\n");

        let result = fx.cook(fx.init_args("new.db", sql));
        assert!(matches!(result, Err(BudgetError::StatementCompileFailed { .. })));
        assert_eq!(exit_code(&result), EXIT_FAILURE);
    }

    #[test]
    fn test_connect_to_missing_database_fails() {
        let fx = Fixture::new();
        let err = fx
            .cook(StartupArgs {
                database: Some(fx.path("missing.db")),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, BudgetError::DatabaseOpenFailed(_)));
    }

    #[test]
    fn test_invalid_mask_is_rejected() {
        let fx = Fixture::new();
        let result = fx.cook(StartupArgs {
            sql: Some(fx.path("schema.sql")),
            ..Default::default()
        });
        match &result {
            Err(BudgetError::InvalidFlagState { mask }) => {
                assert_eq!(*mask, StartupFlags::empty().with(Flag::SqlFileProvided));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(exit_code(&result), EXIT_USAGE);
    }

    #[test]
    fn test_config_supplies_database() {
        let fx = Fixture::new();
        let sql = fx.write("schema.sql", "CREATE TABLE t(x);");
        fx.cook(fx.init_args("budget.db", sql)).unwrap();
        let config = fx.write(
            "budget.conf",
            &format!("database: {}\n", fx.path("budget.db").display()),
        );

        let outcome = fx
            .cook(StartupArgs {
                config: Some(config),
                ..Default::default()
            })
            .unwrap();
        assert!(matches!(outcome, Outcome::Connected { database, .. } if database == fx.path("budget.db")));
    }

    #[test]
    fn test_missing_config_is_written() {
        let fx = Fixture::new();
        let sql = fx.write("schema.sql", "CREATE TABLE t(x);");
        let config = fx.path("budget.conf");

        let outcome = fx
            .cook(StartupArgs {
                config: Some(config.clone()),
                ..fx.init_args("new.db", sql)
            })
            .unwrap();
        assert!(matches!(outcome, Outcome::Initialized { statements: 1, .. }));
        assert!(config.exists());
    }

    #[test]
    fn test_unreadable_config_leaves_flag_set() {
        let fx = Fixture::new();
        let result = fx.cook(StartupArgs {
            config: Some(fx.temp_dir.path().to_path_buf()),
            database: Some(fx.path("new.db")),
            ..Default::default()
        });
        match result {
            Err(BudgetError::InvalidFlagState { mask }) => {
                assert!(mask.contains(Flag::HaveConfig));
                assert!(mask.contains(Flag::HaveDatabase));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_help_skips_config() {
        let fx = Fixture::new();
        let config = fx.path("budget.conf");
        let outcome = fx
            .cook(StartupArgs {
                help: true,
                config: Some(config.clone()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(outcome, Outcome::Help);
        assert!(!config.exists());
    }

    #[test]
    fn test_decrypt_checks_then_reports_unimplemented() {
        let fx = Fixture::new();
        let database = fx.write("budget.db", "ciphertext");
        let key = fx.write("id_budget", "key material");

        let result = fx.cook(StartupArgs {
            database: Some(database.clone()),
            key: Some(key),
            ..Default::default()
        });
        assert!(matches!(result, Err(BudgetError::NotImplemented(_))));
        assert_eq!(exit_code(&result), EXIT_UNAVAILABLE);

        let err = fx
            .cook(StartupArgs {
                database: Some(database),
                key: Some(fx.path("missing_key")),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, BudgetError::KeyUnavailable(_)));
    }

    #[test]
    fn test_encrypted_bootstrap_leaves_database_alone() {
        let fx = Fixture::new();
        let sql = fx.write("schema.sql", "CREATE TABLE t(x);");
        let key = fx.write("id_budget", "key material");

        let err = fx
            .cook(StartupArgs {
                key: Some(key),
                ..fx.init_args("new.db", sql)
            })
            .unwrap_err();
        assert!(matches!(err, BudgetError::NotImplemented(_)));
        assert!(!fx.path("new.db").exists());
    }

    #[test]
    fn test_dry_run_initialize_leaves_disk_alone() {
        let fx = Fixture::new();
        let sql = fx.write("schema.sql", "CREATE TABLE t(x);\nINSERT INTO t VALUES(1);\n");
        let config = fx.path("budget.conf");

        let outcome = fx
            .dry_run(StartupArgs {
                config: Some(config.clone()),
                ..fx.init_args("new.db", sql)
            })
            .unwrap();
        assert_eq!(
            outcome,
            Outcome::Rehearsed {
                database: fx.path("new.db"),
                statements: 2
            }
        );
        assert!(!fx.path("new.db").exists());
        assert!(!config.exists());
    }

    #[test]
    fn test_dry_run_reports_script_errors() {
        let fx = Fixture::new();
        let sql = fx.write("schema.sql", "CREATE TABLE t(x);\nINSERT INTO missing VALUES(1);\n");

        let result = fx.dry_run(fx.init_args("new.db", sql));
        assert!(matches!(result, Err(BudgetError::StatementCompileFailed { offset: 18, .. })));
        assert!(!fx.path("new.db").exists());
    }
}
