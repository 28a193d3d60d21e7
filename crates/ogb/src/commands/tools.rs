//! `ogb tools check` and `ogb dotplot`

use super::Context;
use super::jobs::ORTHOFINDER_LOCK;
use crate::cli::{CliError, ToolsCommands};
use ogb_cache::CacheCoordinator;
use ogb_jobs::tools::dotplot::DotPlotter;
use ogb_jobs::tools::gendiscal::GenDisCal;
use ogb_jobs::tools::lock::ToolLock;
use ogb_jobs::tools::orthoani::OrthoAni;
use ogb_jobs::tools::orthofinder::OrthoFinder;
use serde::Serialize;
use std::fmt::Write as _;

#[derive(Debug, Serialize)]
struct ToolCheck {
    tool: &'static str,
    ok: bool,
    detail: String,
}

impl ToolCheck {
    fn from_result(tool: &'static str, result: ogb_jobs::Result<String>) -> Self {
        match result {
            Ok(detail) => Self {
                tool,
                ok: true,
                detail,
            },
            Err(e) => Self {
                tool,
                ok: false,
                detail: e.to_string(),
            },
        }
    }
}

/// Run a tools subcommand
pub async fn execute(command: ToolsCommands, ctx: &Context) -> Result<(), CliError> {
    match command {
        ToolsCommands::Check => check(ctx).await,
    }
}

async fn check(ctx: &Context) -> Result<(), CliError> {
    let tools = &ctx.settings.tools;
    let orthofinder = OrthoFinder::new(
        tools.orthofinder.clone(),
        ToolLock::new(ctx.settings.state_dir()?.join(ORTHOFINDER_LOCK)),
    );

    let checks = vec![
        ToolCheck::from_result(
            "GenDisCal",
            GenDisCal::new(tools.gendiscal.clone())
                .check()
                .await
                .map(|()| "ok".to_string()),
        ),
        ToolCheck::from_result(
            "OrthoANI",
            OrthoAni::new(tools.orthoani.clone())
                .check()
                .await
                .map(|()| "ok".to_string()),
        ),
        ToolCheck::from_result(
            "OrthoFinder",
            match orthofinder.check() {
                Ok(()) => orthofinder.version().await.map(|v| format!("version {v}")),
                Err(e) => Err(e),
            },
        ),
    ];

    ctx.emit(&checks, || {
        checks.iter().fold(String::new(), |mut out, c| {
            let mark = if c.ok { "ok" } else { "missing" };
            let _ = writeln!(out, "{}\t{mark}\t{}", c.tool, c.detail);
            out
        })
    })?;

    let missing: Vec<&str> = checks.iter().filter(|c| !c.ok).map(|c| c.tool).collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(CliError::config_with_help(
            format!("Unavailable tools: {}", missing.join(", ")),
            "Fix the [tools] section of the settings file",
        ))
    }
}

/// Compute, or read from the cache, the dot plot of two assemblies
pub async fn dotplot(
    ctx: &Context,
    reference: &str,
    query: &str,
    mincluster: u32,
) -> Result<(), CliError> {
    let cache = CacheCoordinator::new(&ctx.settings.cache_config()?)?;
    let plotter = DotPlotter::new(ctx.settings.tools.dotplot.clone(), cache)?;
    let plot = plotter.calculate(reference, query, mincluster).await?;
    ctx.emit(&plot, || {
        let mut out = plot.coords.clone();
        if !plot.flipped_scaffolds.is_empty() {
            let _ = writeln!(out, "\n# flipped: {}", plot.flipped_scaffolds.join(","));
        }
        out
    })
}
