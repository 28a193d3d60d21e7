//! Core-genome dendrograms from a precomputed OrthoFinder run
//!
//! A full OrthoFinder run over every genome is done ahead of time. A subset
//! tree is produced by commenting unwanted species in `SpeciesIDs.txt` of the
//! precomputed working directory and re-running with `-b`. OrthoFinder keeps
//! state in that directory, so only one run may happen at a time.

use super::lock::ToolLock;
use super::{DendrogramTool, require_dir, require_file, run_tool};
use crate::{Error, GenomeId, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::process::Command;

const TOOL: &str = "OrthoFinder";
const SPECIES_IDS: &str = "SpeciesIDs.txt";
const SPECIES_IDS_BACKUP: &str = "SpeciesIDs.txt.backup";
const ROOTED_TREE: &str = "Species_Tree/SpeciesTree_rooted.txt";

/// OrthoFinder settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrthoFinderConfig {
    /// Directory containing `orthofinder.py`
    pub install_dir: PathBuf,
    /// Directory with the proteome FASTAs; also holds the SpeciesIDs backup
    pub fastas_dir: PathBuf,
    /// Results directory of the precomputed run (contains `WorkingDirectory`)
    pub latest_run: PathBuf,
}

impl Default for OrthoFinderConfig {
    fn default() -> Self {
        Self {
            install_dir: PathBuf::from("orthofinder"),
            fastas_dir: PathBuf::from("orthofinder/fastas"),
            latest_run: PathBuf::from("orthofinder/fastas/OrthoFinder/latest"),
        }
    }
}

impl OrthoFinderConfig {
    fn binary(&self) -> PathBuf {
        self.install_dir.join("orthofinder.py")
    }

    fn working_dir(&self) -> PathBuf {
        self.latest_run.join("WorkingDirectory")
    }
}

/// One line of `SpeciesIDs.txt`, e.g. `3: FAM1079-i1-1.faa`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeciesLine {
    /// The line as written by OrthoFinder
    pub line: String,
    /// Genome identifier taken from the proteome file name
    pub genome: GenomeId,
}

/// Parse an uncommented `SpeciesIDs.txt`
pub fn parse_species_ids(text: &str) -> Result<Vec<SpeciesLine>> {
    text.trim()
        .lines()
        .map(|line| {
            let malformed = || Error::tool(TOOL, format!("unexpected SpeciesIDs line: {line:?}"));
            let (_, file) = line.split_once(' ').ok_or_else(malformed)?;
            let stem = file.trim().strip_suffix(".faa").ok_or_else(malformed)?;
            Ok(SpeciesLine {
                line: line.to_string(),
                genome: GenomeId::new(stem).map_err(|_| malformed())?,
            })
        })
        .collect()
}

/// Comment out every species not in `wanted`
#[must_use]
pub fn filter_species_ids(lines: &[SpeciesLine], wanted: &BTreeSet<&GenomeId>) -> String {
    lines
        .iter()
        .map(|l| {
            if wanted.contains(&l.genome) {
                l.line.clone()
            } else {
                format!("# {}", l.line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The results directory, printed on the line after `Results:`
#[must_use]
pub fn parse_results_dir(stdout: &str) -> Option<PathBuf> {
    let mut lines = stdout.lines();
    lines.find(|l| l.trim_end() == "Results:")?;
    lines
        .next()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(PathBuf::from)
}

/// Dendrograms via `orthofinder.py -b <WorkingDirectory>`
#[derive(Debug, Clone)]
pub struct OrthoFinder {
    config: OrthoFinderConfig,
    lock: ToolLock,
}

impl OrthoFinder {
    /// Adapter for `config`, serialized through `lock`
    #[must_use]
    pub const fn new(config: OrthoFinderConfig, lock: ToolLock) -> Self {
        Self { config, lock }
    }

    /// Verify the installation and the precomputed run
    pub fn check(&self) -> Result<()> {
        require_file(TOOL, &self.config.binary())?;
        require_dir(TOOL, &self.config.fastas_dir)?;
        require_file(TOOL, &self.config.working_dir().join(SPECIES_IDS))
    }

    /// Version reported by `orthofinder.py -h`
    pub async fn version(&self) -> Result<String> {
        let mut command = Command::new(self.config.binary());
        command.arg("-h");
        let output = run_tool(TOOL, command).await?;
        output
            .stdout
            .split(" Copyright (C) ")
            .next()
            .and_then(|head| head.split("version ").nth(1))
            .map(|v| v.trim().to_string())
            .ok_or_else(|| Error::tool(TOOL, "could not read version"))
    }

    async fn run_precomputed(&self, genomes: &[GenomeId]) -> Result<String> {
        let wanted: BTreeSet<&GenomeId> = genomes.iter().collect();
        let working_dir = self.config.working_dir();
        require_dir(TOOL, &self.config.fastas_dir)?;
        require_dir(TOOL, &working_dir)?;
        let species_ids_path = working_dir.join(SPECIES_IDS);
        require_file(TOOL, &species_ids_path)?;

        let backup_path = self.config.fastas_dir.join(SPECIES_IDS_BACKUP);
        if !backup_path.is_file() {
            tracing::info!("Running OrthoFinder for the first time, saving SpeciesIDs backup");
            let current = read(&species_ids_path).await?;
            if current.lines().any(|l| l.starts_with('#')) {
                return Err(Error::tool(
                    TOOL,
                    "SpeciesIDs.txt must not contain commented lines before the first run",
                ));
            }
            tokio::fs::copy(&species_ids_path, &backup_path)
                .await
                .map_err(|e| Error::io(e, &backup_path, "copy"))?;
        }

        let species = parse_species_ids(&read(&backup_path).await?)?;
        let precomputed: BTreeSet<&GenomeId> = species.iter().map(|s| &s.genome).collect();

        if precomputed == wanted {
            let tree = read(&self.config.latest_run.join(ROOTED_TREE)).await?;
            return Ok(tree.trim().to_string());
        }

        let missing: Vec<&str> = wanted
            .difference(&precomputed)
            .map(|g| g.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(Error::tool(
                TOOL,
                format!(
                    "the following genomes have not been precomputed: {}",
                    missing.join(", ")
                ),
            ));
        }

        let filtered = filter_species_ids(&species, &wanted);
        tokio::fs::write(&species_ids_path, filtered)
            .await
            .map_err(|e| Error::io(e, &species_ids_path, "write"))?;

        let mut command = Command::new(self.config.binary());
        command.arg("-b").arg(&working_dir);
        let output = run_tool(TOOL, command).await?;

        let result_dir = parse_results_dir(&output.stdout)
            .filter(|dir| dir.is_dir())
            .ok_or_else(|| {
                Error::tool(
                    TOOL,
                    format!("could not find results directory; {}", output.describe()),
                )
            })?;
        let tree_path = result_dir.join(ROOTED_TREE);
        let tree = read(&tree_path).await.map_err(|_| {
            Error::tool(
                TOOL,
                format!(
                    "could not find species tree {}; {}",
                    tree_path.display(),
                    output.describe()
                ),
            )
        })?;

        if let Err(e) = tokio::fs::remove_dir_all(&result_dir).await {
            tracing::warn!(dir = %result_dir.display(), error = %e, "Failed to remove OrthoFinder results");
        }
        Ok(tree.trim().to_string())
    }
}

async fn read(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::io(e, path, "read"))
}

#[async_trait]
impl DendrogramTool for OrthoFinder {
    fn name(&self) -> &'static str {
        TOOL
    }

    async fn dendrogram(&self, genomes: &[GenomeId]) -> Result<String> {
        let _guard = self.lock.acquire().await?;
        tracing::info!(genomes = genomes.len(), "Starting OrthoFinder");
        self.run_precomputed(genomes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SPECIES: &str = "0: FAM1.faa\n1: FAM2.faa\n2: FAM3.faa\n";

    fn gid(s: &str) -> GenomeId {
        GenomeId::new(s).unwrap()
    }

    #[test]
    fn parses_species_ids() {
        let lines = parse_species_ids(SPECIES).unwrap();
        let ids: Vec<&str> = lines.iter().map(|l| l.genome.as_str()).collect();
        assert_eq!(ids, ["FAM1", "FAM2", "FAM3"]);
        assert!(parse_species_ids("0: FAM1.fna").is_err());
    }

    #[test]
    fn comments_unwanted_species() {
        let lines = parse_species_ids(SPECIES).unwrap();
        let (a, c) = (gid("FAM1"), gid("FAM3"));
        let wanted: BTreeSet<&GenomeId> = [&a, &c].into_iter().collect();
        assert_eq!(
            filter_species_ids(&lines, &wanted),
            "0: FAM1.faa\n# 1: FAM2.faa\n2: FAM3.faa"
        );
    }

    #[test]
    fn finds_results_dir() {
        let stdout = "OrthoFinder version 2.5\n\nResults:\n    /data/of/Results_Jan01/\n\nCitation";
        assert_eq!(
            parse_results_dir(stdout),
            Some(PathBuf::from("/data/of/Results_Jan01/"))
        );
        assert_eq!(parse_results_dir("no results here"), None);
    }

    fn precomputed(tmp: &TempDir) -> OrthoFinderConfig {
        let config = OrthoFinderConfig {
            install_dir: tmp.path().join("install"),
            fastas_dir: tmp.path().join("fastas"),
            latest_run: tmp.path().join("fastas/OrthoFinder/Results_All"),
        };
        std::fs::create_dir_all(config.working_dir()).unwrap();
        std::fs::create_dir_all(config.latest_run.join("Species_Tree")).unwrap();
        std::fs::write(config.working_dir().join(SPECIES_IDS), SPECIES).unwrap();
        std::fs::write(
            config.latest_run.join(ROOTED_TREE),
            "((FAM1:0.1,FAM2:0.2):0.3,FAM3:0.4);\n",
        )
        .unwrap();
        config
    }

    #[tokio::test]
    async fn full_set_returns_precomputed_tree() {
        let tmp = TempDir::new().unwrap();
        let config = precomputed(&tmp);
        let tool = OrthoFinder::new(config.clone(), ToolLock::new(tmp.path().join("of.lock")));

        let tree = tool
            .dendrogram(&[gid("FAM1"), gid("FAM2"), gid("FAM3")])
            .await
            .unwrap();
        assert_eq!(tree, "((FAM1:0.1,FAM2:0.2):0.3,FAM3:0.4);");
        assert!(config.fastas_dir.join(SPECIES_IDS_BACKUP).is_file());
    }

    #[tokio::test]
    async fn unknown_genome_fails() {
        let tmp = TempDir::new().unwrap();
        let config = precomputed(&tmp);
        let tool = OrthoFinder::new(config, ToolLock::new(tmp.path().join("of.lock")));

        let err = tool
            .dendrogram(&[gid("FAM1"), gid("FAM9")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("FAM9"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn subset_runs_orthofinder_and_cleans_up() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let config = precomputed(&tmp);
        let results = tmp.path().join("Results_Subset");
        std::fs::create_dir_all(config.install_dir.clone()).unwrap();
        let script = format!(
            "#!/bin/sh\nmkdir -p {dir}/Species_Tree\necho '(FAM1:0.1,FAM3:0.2);' > {dir}/{tree}\necho 'Results:'\necho '    {dir}'\n",
            dir = results.display(),
            tree = ROOTED_TREE,
        );
        std::fs::write(config.binary(), script).unwrap();
        std::fs::set_permissions(config.binary(), std::fs::Permissions::from_mode(0o755))
            .unwrap();

        let tool = OrthoFinder::new(config.clone(), ToolLock::new(tmp.path().join("of.lock")));
        let tree = tool.dendrogram(&[gid("FAM1"), gid("FAM3")]).await.unwrap();

        assert_eq!(tree, "(FAM1:0.1,FAM3:0.2);");
        assert!(!results.exists());
        let species = std::fs::read_to_string(config.working_dir().join(SPECIES_IDS)).unwrap();
        assert!(species.contains("# 1: FAM2.faa"));
    }
}
