//! OrthoANI command-line tool (Java, needs BLAST+)

use super::{SimilarityTool, require_dir, require_file, run_tool};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::process::Command;

const TOOL: &str = "OrthoANI";

/// OrthoANI settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrthoAniConfig {
    /// Java executable
    pub java: PathBuf,
    /// `OAT_cmd.jar`
    pub jar: PathBuf,
    /// Directory with the BLAST+ binaries
    pub blast_dir: PathBuf,
    /// Threads per comparison; all cores when unset
    pub threads: Option<usize>,
}

impl Default for OrthoAniConfig {
    fn default() -> Self {
        Self {
            java: PathBuf::from("java"),
            jar: PathBuf::from("OAT_cmd.jar"),
            blast_dir: PathBuf::from("ncbi_blast/bin"),
            threads: None,
        }
    }
}

/// Similarity via `java -jar OAT_cmd.jar`
#[derive(Debug, Clone)]
pub struct OrthoAni {
    config: OrthoAniConfig,
}

impl OrthoAni {
    /// Adapter for `config`
    #[must_use]
    pub const fn new(config: OrthoAniConfig) -> Self {
        Self { config }
    }

    /// Verify jar, BLAST directory and Java
    pub async fn check(&self) -> Result<()> {
        require_file(TOOL, &self.config.jar)?;
        require_dir(TOOL, &self.config.blast_dir)?;
        let mut command = Command::new(&self.config.java);
        command.arg("-version");
        run_tool(TOOL, command).await.map(|_| ())
    }

    fn threads(&self) -> usize {
        self.config.threads.unwrap_or_else(|| {
            std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
        })
    }
}

/// Parse the report: `SUCCESS: true` three lines from the end, then
/// `OrthoANI : <percent> (%)` on the last line
pub fn parse_output(stdout: &str) -> Result<f64> {
    let malformed = || Error::tool(TOOL, format!("unexpected output: {}", stdout.trim()));
    let lines: Vec<&str> = stdout.trim().lines().map(str::trim_end).collect();
    if lines.len() < 3 || lines[lines.len() - 3] != "SUCCESS: true" {
        return Err(malformed());
    }
    let percent = lines[lines.len() - 1]
        .strip_prefix("OrthoANI : ")
        .and_then(|rest| rest.strip_suffix(" (%)"))
        .ok_or_else(malformed)?;
    let percent: f64 = percent.trim().parse().map_err(|_| malformed())?;
    Ok(percent / 100.0)
}

#[async_trait]
impl SimilarityTool for OrthoAni {
    fn name(&self) -> &'static str {
        TOOL
    }

    async fn similarity(&self, first: &Path, second: &Path) -> Result<f64> {
        require_file(TOOL, first)?;
        require_file(TOOL, second)?;
        if first == second {
            return Ok(1.0);
        }

        // OAT leaves intermediate files next to its inputs; stale ones break later runs
        let scratch = tempfile::Builder::new()
            .prefix("ogb-orthoani-")
            .tempdir()
            .map_err(|e| Error::io(e, std::env::temp_dir(), "create_temp_dir"))?;
        let link1 = link_into(scratch.path(), "1_", first)?;
        let link2 = link_into(scratch.path(), "2_", second)?;

        let mut command = Command::new(&self.config.java);
        command
            .arg("-jar")
            .arg(&self.config.jar)
            .arg("-blastplus_dir")
            .arg(&self.config.blast_dir)
            .arg("-num_threads")
            .arg(self.threads().to_string())
            .arg("-fasta1")
            .arg(&link1)
            .arg("-fasta2")
            .arg(&link2);
        let output = run_tool(TOOL, command).await?;
        parse_output(&output.stdout).map_err(|_| {
            Error::tool(
                TOOL,
                format!(
                    "error with fasta1={} and fasta2={}; {}",
                    first.display(),
                    second.display(),
                    output.describe()
                ),
            )
        })
    }
}

#[cfg(unix)]
fn link_into(dir: &Path, prefix: &str, target: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(target).map_err(|e| Error::io(e, target, "absolute"))?;
    let name = target
        .file_name()
        .map(|n| format!("{prefix}{}", n.to_string_lossy()))
        .ok_or_else(|| Error::tool(TOOL, format!("not a file: '{}'", target.display())))?;
    let link = dir.join(name);
    std::os::unix::fs::symlink(&absolute, &link).map_err(|e| Error::io(e, &link, "symlink"))?;
    Ok(link)
}

#[cfg(not(unix))]
fn link_into(dir: &Path, prefix: &str, target: &Path) -> Result<PathBuf> {
    let name = target
        .file_name()
        .map(|n| format!("{prefix}{}", n.to_string_lossy()))
        .ok_or_else(|| Error::tool(TOOL, format!("not a file: '{}'", target.display())))?;
    let copy = dir.join(name);
    std::fs::copy(target, &copy).map_err(|e| Error::io(e, &copy, "copy"))?;
    Ok(copy)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "\
Reading fasta1
Reading fasta2
SUCCESS: true
Calculation took 12s
OrthoANI : 97.4312 (%)
";

    #[test]
    fn parses_percentage() {
        let sim = parse_output(REPORT).unwrap();
        assert!((sim - 0.974_312).abs() < 1e-9);
    }

    #[test]
    fn requires_success_marker() {
        let out = REPORT.replace("SUCCESS: true", "SUCCESS: false");
        assert!(parse_output(&out).is_err());
    }

    #[test]
    fn requires_percent_line() {
        assert!(parse_output("SUCCESS: true\nx\nOrthoANI : 97.1\n").is_err());
        assert!(parse_output("OrthoANI : 97.1 (%)\n").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn links_keep_file_names() {
        let tmp = tempfile::TempDir::new().unwrap();
        let fasta = tmp.path().join("FAM1.fna");
        std::fs::write(&fasta, ">c\nA\n").unwrap();
        let scratch = tmp.path().join("scratch");
        std::fs::create_dir(&scratch).unwrap();
        let link = link_into(&scratch, "1_", &fasta).unwrap();
        assert_eq!(link.file_name().unwrap(), "1_FAM1.fna");
        assert_eq!(std::fs::read_to_string(link).unwrap(), ">c\nA\n");
    }
}
