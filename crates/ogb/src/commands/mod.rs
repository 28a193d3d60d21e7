//! Command implementations

pub mod cache;
pub mod jobs;
pub mod tools;

use crate::cli::{CliError, Commands, OkEnvelope};
use crate::config::Settings;
use serde::Serialize;

/// Shared state of one CLI invocation
#[derive(Debug, Clone)]
pub struct Context {
    /// Loaded settings
    pub settings: Settings,
    /// Print JSON envelopes instead of text
    pub json: bool,
}

impl Context {
    /// Context for `settings`
    #[must_use]
    pub const fn new(settings: Settings, json: bool) -> Self {
        Self { settings, json }
    }

    /// Print `data` as a JSON envelope, or `text()` in text mode
    pub fn emit<T: Serialize>(&self, data: &T, text: impl FnOnce() -> String) -> Result<(), CliError> {
        if self.json {
            let json = serde_json::to_string(&OkEnvelope::new(data))
                .map_err(|e| CliError::other(format!("Failed to serialize output: {e}")))?;
            println!("{json}");
        } else {
            let text = text();
            if !text.is_empty() {
                println!("{}", text.trim_end());
            }
        }
        Ok(())
    }
}

/// Run `command`
pub async fn execute(command: Commands, ctx: &Context) -> Result<(), CliError> {
    match command {
        Commands::Cache { subcommand } => cache::execute(subcommand, ctx),
        Commands::Jobs { subcommand } => jobs::execute(subcommand, ctx).await,
        Commands::Dotplot {
            reference,
            query,
            mincluster,
        } => tools::dotplot(ctx, &reference, &query, mincluster).await,
        Commands::Tools { subcommand } => tools::execute(subcommand, ctx).await,
    }
}
