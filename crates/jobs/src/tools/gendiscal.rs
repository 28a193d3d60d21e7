//! GenDisCal genome distance calculator

use super::{SimilarityTool, require_file, run_tool};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::process::Command;

const TOOL: &str = "GenDisCal";
const HEADER: &str = "File1,File2,Expected_Relation,Distance";

/// GenDisCal settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenDisCalConfig {
    /// Executable
    pub binary: PathBuf,
    /// One of `PaSiT4`, `PaSiT6`, `TETRA`, `approxANI`, `combinedSpecies`
    pub preset: String,
}

impl Default for GenDisCalConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("GenDisCal"),
            preset: "approxANI".to_string(),
        }
    }
}

/// Similarity via `GenDisCal --preset <preset> <fasta1> <fasta2>`
#[derive(Debug, Clone)]
pub struct GenDisCal {
    config: GenDisCalConfig,
}

impl GenDisCal {
    /// Adapter for `config`
    #[must_use]
    pub const fn new(config: GenDisCalConfig) -> Self {
        Self { config }
    }

    /// Verify that the binary runs
    pub async fn check(&self) -> Result<()> {
        let mut command = Command::new(&self.config.binary);
        command.arg("--version");
        run_tool(TOOL, command).await.map(|_| ())
    }
}

/// Parse the two-line CSV report; similarity is `1 - distance`
pub fn parse_output(stdout: &str) -> Result<f64> {
    let malformed = || Error::tool(TOOL, format!("unexpected output: {}", stdout.trim()));
    let lines: Vec<&str> = stdout.trim().lines().collect();
    let [header, row] = lines.as_slice() else {
        return Err(malformed());
    };
    if header.trim() != HEADER {
        return Err(malformed());
    }
    let fields: Vec<&str> = row.trim().split(',').collect();
    let [_, _, _, distance] = fields.as_slice() else {
        return Err(malformed());
    };
    let distance: f64 = distance.trim().parse().map_err(|_| malformed())?;
    Ok(1.0 - distance)
}

#[async_trait]
impl SimilarityTool for GenDisCal {
    fn name(&self) -> &'static str {
        TOOL
    }

    async fn similarity(&self, first: &Path, second: &Path) -> Result<f64> {
        require_file(TOOL, first)?;
        require_file(TOOL, second)?;
        if first == second {
            return Ok(1.0);
        }

        let mut command = Command::new(&self.config.binary);
        command
            .arg("--preset")
            .arg(&self.config.preset)
            .arg(first)
            .arg(second);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_distance() {
        let out = "File1,File2,Expected_Relation,Distance\na.fna,b.fna,Species,0.0125\n";
        let sim = parse_output(out).unwrap();
        assert!((sim - 0.9875).abs() < 1e-12);
    }

    #[test]
    fn rejects_wrong_header() {
        let out = "File1,File2,Distance\na.fna,b.fna,0.1\n";
        assert!(parse_output(out).is_err());
    }

    #[test]
    fn rejects_extra_lines_and_columns() {
        assert!(parse_output("File1,File2,Expected_Relation,Distance\n").is_err());
        assert!(
            parse_output("File1,File2,Expected_Relation,Distance\na,b,c,0.1,extra\n").is_err()
        );
        assert!(parse_output("File1,File2,Expected_Relation,Distance\na,b,c,zero\n").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_configured_binary() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::TempDir::new().unwrap();
        let script = tmp.path().join("GenDisCal");
        std::fs::write(
            &script,
            "#!/bin/sh\necho 'File1,File2,Expected_Relation,Distance'\necho \"$3,$4,Species,0.25\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        let a = tmp.path().join("a.fna");
        let b = tmp.path().join("b.fna");
        std::fs::write(&a, ">a\nACGT\n").unwrap();
        std::fs::write(&b, ">b\nACGA\n").unwrap();

        let tool = GenDisCal::new(GenDisCalConfig {
            binary: script,
            ..GenDisCalConfig::default()
        });
        assert!((tool.similarity(&a, &b).await.unwrap() - 0.75).abs() < 1e-12);
        assert!((tool.similarity(&a, &a).await.unwrap() - 1.0).abs() < 1e-12);
    }
}
