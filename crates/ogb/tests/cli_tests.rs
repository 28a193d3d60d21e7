//! Exit codes and side effects of complete command lines
#![allow(clippy::unwrap_used, clippy::expect_used)]

use clap::Parser;
use ogb::cli::{Cli, EXIT_CLI, EXIT_OK};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Workspace {
    _tmp: TempDir,
    config: PathBuf,
    cache: PathBuf,
    state: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let cache = tmp.path().join("cache");
        let state = tmp.path().join("state");
        let config = tmp.path().join("ogb.toml");
        std::fs::write(
            &config,
            format!(
                "[cache]\ndir = {:?}\nmax_entries = 2\n\n[jobs]\nstate_dir = {:?}\nworkers = 2\n\n[genomes]\nassembly_dir = {:?}\n",
                cache.display().to_string(),
                state.display().to_string(),
                tmp.path().join("assemblies").display().to_string(),
            ),
        )
        .unwrap();
        Self {
            _tmp: tmp,
            config,
            cache,
            state,
        }
    }

    fn run(&self, args: &[&str]) -> i32 {
        let config = self.config.display().to_string();
        let mut argv = vec!["ogb", "--json", "--config", config.as_str()];
        argv.extend_from_slice(args);
        temp_env::with_vars_unset(["OGB_CACHE_DIR", "OGB_STATE_DIR", "OGB_WORKERS"], || {
            ogb::run(Cli::try_parse_from(&argv).unwrap())
        })
    }
}

fn count_files(dir: &Path, extension: &str) -> usize {
    std::fs::read_dir(dir).map_or(0, |entries| {
        entries
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().is_some_and(|ext| ext == extension))
            .count()
    })
}

#[test]
fn cache_stats_on_empty_root() {
    let ws = Workspace::new();
    assert_eq!(ws.run(&["cache", "stats"]), EXIT_OK);
    assert!(ws.cache.is_dir());
}

#[test]
fn self_similarity_is_recorded() {
    let ws = Workspace::new();
    assert_eq!(
        ws.run(&["jobs", "similarity", "g1", "g1", "--kind", "genome-similarity", "--wait"]),
        EXIT_OK
    );
    assert_eq!(count_files(&ws.state.join("genome-similarity"), "json"), 1);
    assert_eq!(ws.run(&["jobs", "status", "--kind", "genome-similarity"]), EXIT_OK);
}

#[test]
fn backup_and_import_round_trip_through_files() {
    let ws = Workspace::new();
    let tsv = ws.state.parent().unwrap().join("ani.tsv");
    std::fs::write(&tsv, "g2\tg1\t0.98\ng1\tg3\t0.5\n").unwrap();
    let tsv_arg = tsv.display().to_string();

    assert_eq!(ws.run(&["jobs", "import", &tsv_arg]), EXIT_OK);
    assert_eq!(count_files(&ws.state.join("ani"), "json"), 2);

    // Second import conflicts unless told to skip
    assert_eq!(ws.run(&["jobs", "import", &tsv_arg]), EXIT_CLI);
    assert_eq!(
        ws.run(&["jobs", "import", &tsv_arg, "--ignore-conflicts"]),
        EXIT_OK
    );

    let out = ws.state.parent().unwrap().join("backup.tsv");
    let out_arg = out.display().to_string();
    assert_eq!(ws.run(&["jobs", "backup", &out_arg]), EXIT_OK);
    let text = std::fs::read_to_string(&out).unwrap();
    assert_eq!(text.lines().count(), 2);
    assert!(text.contains("g1\tg2\t0.98"));

    // Refuses to overwrite
    assert_ne!(ws.run(&["jobs", "backup", &out_arg]), EXIT_OK);
}

#[test]
fn invalid_genome_identifier_is_usage_error() {
    let ws = Workspace::new();
    assert_eq!(ws.run(&["jobs", "similarity", "a/b", "c"]), EXIT_CLI);
}

#[test]
fn missing_config_file_is_usage_error() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml").display().to_string();
    let cli = Cli::try_parse_from(["ogb", "--config", missing.as_str(), "cache", "stats"]).unwrap();
    assert_eq!(ogb::run(cli), EXIT_CLI);
}
