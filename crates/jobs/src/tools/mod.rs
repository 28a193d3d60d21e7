//! External bioinformatics tools behind async traits
//!
//! Each adapter takes a plain config struct, offers an explicit `check()`
//! for presence, and turns non-zero exits or malformed output into
//! [`Error::ToolInvocationFailed`] carrying the captured output.

pub mod dotplot;
pub mod gendiscal;
pub mod lock;
pub mod orthoani;
pub mod orthofinder;

use crate::{Error, GenomeId, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Scores the similarity of two assemblies
#[async_trait]
pub trait SimilarityTool: Send + Sync {
    /// Tool name for logs and diagnostics
    fn name(&self) -> &'static str;

    /// Similarity of two assemblies, 1.0 meaning identical
    async fn similarity(&self, first: &Path, second: &Path) -> Result<f64>;
}

/// Builds a dendrogram over a set of genomes
#[async_trait]
pub trait DendrogramTool: Send + Sync {
    /// Tool name for logs and diagnostics
    fn name(&self) -> &'static str;

    /// Newick tree over `genomes` (sorted, distinct)
    async fn dendrogram(&self, genomes: &[GenomeId]) -> Result<String>;
}

/// Captured result of a finished tool process
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Exit code, if the process exited normally
    pub code: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl ToolOutput {
    /// Diagnostic text for failure messages
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "exit code {}; stdout={}; stderr={}",
            self.code.map_or_else(|| "none".to_string(), |c| c.to_string()),
            self.stdout.trim(),
            self.stderr.trim()
        )
    }
}

/// Run `command` to completion, failing on spawn errors and non-zero exits
pub(crate) async fn run_tool(tool: &str, mut command: Command) -> Result<ToolOutput> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    tracing::debug!(tool, command = ?command.as_std(), "Starting external tool");
    let output = command
        .output()
        .await
        .map_err(|e| Error::tool(tool, format!("could not start: {e}")))?;

    let result = ToolOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    if output.status.success() {
        Ok(result)
    } else {
        Err(Error::tool(tool, result.describe()))
    }
}

/// Fail unless `path` is an existing file
pub(crate) fn require_file(tool: &str, path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(Error::tool(tool, format!("path is invalid: '{}'", path.display())))
    }
}

/// Fail unless `path` is an existing directory
pub(crate) fn require_dir(tool: &str, path: &Path) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(Error::tool(
            tool,
            format!("directory does not exist: '{}'", path.display()),
        ))
    }
}
