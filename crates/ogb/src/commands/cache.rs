//! `ogb cache ...`

use super::Context;
use crate::cli::{CacheCommands, CliError};
use ogb_cache::{CacheEntry, CacheStore, EvictionPolicy, FunctionId};
use serde::Serialize;
use std::fmt::Write as _;

/// Run a cache subcommand
pub fn execute(command: CacheCommands, ctx: &Context) -> Result<(), CliError> {
    let config = ctx.settings.cache_config()?;
    let store = CacheStore::new(&config.root)?;
    tracing::debug!(root = %store.root().display(), "Opened cache");

    match command {
        CacheCommands::Stats => stats(ctx, &store),
        CacheCommands::List { function } => list(ctx, &store, &FunctionId::new(function)?),
        CacheCommands::Prune { max_entries } => {
            prune(ctx, &store, max_entries.unwrap_or(config.max_entries))
        }
        CacheCommands::Clear { function } => clear(ctx, &store, &FunctionId::new(function)?),
    }
}

fn stats(ctx: &Context, store: &CacheStore) -> Result<(), CliError> {
    let stats = store.stats()?;
    ctx.emit(&stats, || {
        let mut out = String::new();
        for f in &stats.functions {
            let _ = writeln!(out, "{}\t{} entries\t{} bytes", f.function, f.entries, f.bytes);
        }
        let _ = writeln!(
            out,
            "total\t{} entries\t{} bytes",
            stats.total_entries(),
            stats.total_bytes()
        );
        out
    })
}

#[derive(Serialize)]
struct EntryView {
    key: String,
    timestamp: String,
    path: String,
}

impl From<&CacheEntry> for EntryView {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            key: entry.key.to_string(),
            timestamp: entry.timestamp.to_rfc3339(),
            path: entry.path.display().to_string(),
        }
    }
}

fn list(ctx: &Context, store: &CacheStore, function: &FunctionId) -> Result<(), CliError> {
    let entries: Vec<EntryView> = store
        .list_entries(function)?
        .iter()
        .map(EntryView::from)
        .collect();
    ctx.emit(&entries, || {
        entries.iter().fold(String::new(), |mut out, e| {
            let _ = writeln!(out, "{}\t{}", e.timestamp, e.key);
            out
        })
    })
}

#[derive(Serialize)]
struct PruneView {
    max_entries: usize,
    removed: usize,
    failed: usize,
}

fn prune(ctx: &Context, store: &CacheStore, max_entries: usize) -> Result<(), CliError> {
    let report = EvictionPolicy::new(max_entries).enforce_all(store);
    let view = PruneView {
        max_entries,
        removed: report.removed.len(),
        failed: report.failed.len(),
    };
    tracing::info!(max_entries, removed = view.removed, failed = view.failed, "Pruned cache");
    ctx.emit(&view, || {
        format!(
            "Removed {} entries ({} failed), keeping at most {} per function",
            view.removed, view.failed, view.max_entries
        )
    })
}

fn clear(ctx: &Context, store: &CacheStore, function: &FunctionId) -> Result<(), CliError> {
    let removed = store.clear_function(function)?;
    ctx.emit(&serde_json::json!({ "function": function.as_str(), "removed": removed }), || {
        if removed {
            format!("Cleared {function}")
        } else {
            format!("Nothing cached for {function}")
        }
    })
}
