//! ogb CLI
//!
//! Administrative front end for the OpenGenomeBrowser result cache
//! (`ogb-cache`) and background jobs (`ogb-jobs`).
//!
//! ```text
//! ogb cache stats
//! ogb jobs similarity FAM1079-i1-1 FAM10789-i1-1 --kind ani --wait
//! ogb jobs matrix FAM1079-i1-1 FAM10789-i1-1 FAM19036-p1-1.1 --wait
//! ```

// CLI output goes to stdout/stderr
#![allow(clippy::print_stdout, clippy::print_stderr)]
#![expect(
    clippy::missing_errors_doc,
    reason = "Errors are rendered by the CLI, not documented per function"
)]

/// CLI argument parsing and exit codes.
pub mod cli;
/// Command implementations.
pub mod commands;
/// Settings file and environment overrides.
pub mod config;
/// Tracing and logging configuration.
pub mod tracing;

use crate::cli::{Cli, CliError, EXIT_OK, exit_code_for, render_error};
use crate::commands::Context;
use crate::config::Settings;

/// Run a parsed command line and return the process exit code
#[must_use]
pub fn run(cli: Cli) -> i32 {
    let tracing_config = tracing::TracingConfig {
        format: cli.log_format,
        level: cli.log_level.into(),
        filter: None,
    };
    // Ignore error if tracing already initialized (e.g., in tests)
    let _ = tracing::init_tracing(tracing_config);

    let json = cli.json;
    match run_command(cli) {
        Ok(()) => EXIT_OK,
        Err(err) => {
            render_error(&err, json);
            exit_code_for(&err)
        }
    }
}

fn run_command(cli: Cli) -> Result<(), CliError> {
    let settings = Settings::load(cli.config.as_deref())?;
    let ctx = Context::new(settings, cli.json);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::other(format!("Failed to create tokio runtime: {e}")))?;
    runtime.block_on(commands::execute(cli.command, &ctx))
}
