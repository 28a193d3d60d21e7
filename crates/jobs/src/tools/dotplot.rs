//! Dot plots of two assemblies via nucmer and DotPrep, memoized on disk

use crate::{Error, Result};
use ogb_cache::{CacheCoordinator, CacheOptions, ContentKey, FunctionId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

const NUCMER: &str = "nucmer";
const DOTPREP: &str = "DotPrep";
const PREFIX: &str = "out";

/// Dot plots take minutes; a reader waits this long for a concurrent writer
pub const DOTPLOT_RETRY_WAIT: Duration = Duration::from_secs(60);

/// nucmer and DotPrep settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DotPlotConfig {
    /// nucmer executable (MUMmer 4)
    pub nucmer: PathBuf,
    /// `DotPrep.py` executable
    pub dotprep: PathBuf,
    /// Base directory that assembly paths are relative to
    pub folder_structure: PathBuf,
}

impl Default for DotPlotConfig {
    fn default() -> Self {
        Self {
            nucmer: PathBuf::from("nucmer"),
            dotprep: PathBuf::from("DotPrep.py"),
            folder_structure: PathBuf::from("folder_structure"),
        }
    }
}

/// Alignment coordinates and index as consumed by the Dot viewer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DotPlot {
    /// Contents of `out.coords`
    pub coords: String,
    /// Contents of `out.coords.idx`
    pub index: String,
    /// Query scaffolds aligned in reverse orientation
    pub flipped_scaffolds: Vec<String>,
}

/// Query scaffolds marked with orientation `-` in the `#query` section
#[must_use]
pub fn flipped_scaffolds(index: &str) -> Vec<String> {
    let mut in_query = false;
    let mut flipped = Vec::new();
    for line in index.lines() {
        if let Some(section) = line.strip_prefix('#') {
            in_query = section.trim() == "query";
            continue;
        }
        if !in_query || line.starts_with("query,") {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() > 2 && fields[2] == "-" {
            flipped.push(fields[0].to_string());
        }
    }
    flipped
}

/// Memoized dot plot calculator
#[derive(Debug, Clone)]
pub struct DotPlotter {
    config: DotPlotConfig,
    cache: CacheCoordinator,
    function: FunctionId,
}

impl DotPlotter {
    /// Calculator storing its results in `cache`
    pub fn new(config: DotPlotConfig, cache: CacheCoordinator) -> Result<Self> {
        Ok(Self {
            config,
            cache,
            function: FunctionId::qualified(module_path!(), "calculate_dotplot")?,
        })
    }

    /// Dot plot of `fasta_qry` against `fasta_ref`.
    ///
    /// Paths are relative to the configured folder structure. The blocking
    /// work runs on tokio's blocking pool.
    pub async fn calculate(&self, fasta_ref: &str, fasta_qry: &str, mincluster: u32) -> Result<DotPlot> {
        let this = self.clone();
        let (fasta_ref, fasta_qry) = (fasta_ref.to_string(), fasta_qry.to_string());
        tokio::task::spawn_blocking(move || this.calculate_blocking(&fasta_ref, &fasta_qry, mincluster))
            .await
            .map_err(|e| Error::configuration(format!("Dot plot task failed: {e}")))?
    }

    /// Synchronous variant of [`calculate`](Self::calculate)
    pub fn calculate_blocking(&self, fasta_ref: &str, fasta_qry: &str, mincluster: u32) -> Result<DotPlot> {
        let kwargs = serde_json::json!({
            "fasta_ref": fasta_ref,
            "fasta_qry": fasta_qry,
            "mincluster": mincluster,
        });
        let key = ContentKey::new(&(), &kwargs)?;
        let options = CacheOptions {
            retry_wait: DOTPLOT_RETRY_WAIT,
            ..self.cache.defaults()
        };
        let reference = self.config.folder_structure.join(fasta_ref);
        let query = self.config.folder_structure.join(fasta_qry);
        let plot = self
            .cache
            .get_or_compute_with(&self.function, &key, &options, |dir: &Path| {
                self.run(dir, &reference, &query, mincluster)
            })?;
        Ok(plot)
    }

    fn run(&self, dir: &Path, reference: &Path, query: &Path, mincluster: u32) -> Result<DotPlot> {
        for fasta in [reference, query] {
            if !fasta.is_file() {
                return Err(Error::tool(NUCMER, format!("path is invalid: '{}'", fasta.display())));
            }
        }
        let prefix = dir.join(PREFIX);

        let mut nucmer = Command::new(&self.config.nucmer);
        nucmer
            .arg("--mincluster")
            .arg(mincluster.to_string())
            .arg("--prefix")
            .arg(&prefix)
            .arg(reference)
            .arg(query);
        run_blocking(NUCMER, nucmer)?;

        let mut dotprep = Command::new(&self.config.dotprep);
        dotprep
            .arg("--delta")
            .arg(prefix.with_extension("delta"))
            .arg("--out")
            .arg(&prefix);
        run_blocking(DOTPREP, dotprep)?;

        let coords_path = prefix.with_extension("coords");
        let index_path = prefix.with_extension("coords.idx");
        let coords = std::fs::read_to_string(&coords_path)
            .map_err(|e| Error::io(e, &coords_path, "read"))?;
        let index = std::fs::read_to_string(&index_path)
            .map_err(|e| Error::io(e, &index_path, "read"))?;
        let flipped_scaffolds = flipped_scaffolds(&index);
        Ok(DotPlot {
            coords,
            index,
            flipped_scaffolds,
        })
    }
}

fn run_blocking(tool: &str, mut command: Command) -> Result<()> {
    tracing::debug!(tool, command = ?command, "Starting external tool");
    let output = command
        .stdin(Stdio::null())
        .output()
        .map_err(|e| Error::tool(tool, format!("could not start: {e}")))?;
    if output.status.success() {
        Ok(())
    } else {
        Err(Error::tool(
            tool,
            format!(
                "exit code {}; stdout={}; stderr={}",
                output
                    .status
                    .code()
                    .map_or_else(|| "none".to_string(), |c| c.to_string()),
                String::from_utf8_lossy(&output.stdout).trim(),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ))
    }
}
