use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use env_logger::Env;
use log::{error, LevelFilter};

use budget::cli::{cook, exit_code, Cli, Outcome, StartupArgs};
use budget::config::{BudgetPaths, ConfigStore};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let paths = match BudgetPaths::new() {
        Ok(paths) => paths,
        Err(err) => {
            error!("{}", err);
            return ExitCode::from(err.exit_code());
        }
    };
    let store = ConfigStore::new(paths);

    let ctx = cli.run_context();
    let result = cook(&ctx, &store, StartupArgs::from(cli));

    match &result {
        Ok(Outcome::Help) => eprint!("{}", Cli::command().render_help()),
        Ok(outcome) => println!("{}", outcome),
        Err(err) => error!("{}", err),
    }

    ExitCode::from(exit_code(&result))
}

/// Diagnostics go to stderr; `-D` turns on debug output
fn init_logging(debug: bool) {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("warn"));
    if debug {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.format_timestamp(None).init();
}
