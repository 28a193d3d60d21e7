//! Settings file and environment overrides
//!
//! Resolution: `--config` / `OGB_CONFIG`, else `ogb.toml` in the working
//! directory if present, else built-in defaults. `OGB_CACHE_DIR`,
//! `OGB_STATE_DIR` and `OGB_WORKERS` override values from the file.
//!
//! ```toml
//! [cache]
//! dir = "/var/cache/ogb"
//! max_entries = 50
//!
//! [jobs]
//! workers = 4
//!
//! [genomes]
//! assembly_dir = "/data/assemblies"
//! extension = "fna"
//!
//! [tools.gendiscal]
//! preset = "approxANI"
//! ```

use crate::cli::CliError;
use ogb_cache::{CACHE_DIR_ENV, CacheConfig, DEFAULT_MAX_ENTRIES, DEFAULT_RETRY_WAIT};
use ogb_jobs::locator::{AssemblyLocator, DirectoryLocator, MapLocator};
use ogb_jobs::tools::dotplot::DotPlotConfig;
use ogb_jobs::tools::gendiscal::GenDisCalConfig;
use ogb_jobs::tools::orthoani::OrthoAniConfig;
use ogb_jobs::tools::orthofinder::OrthoFinderConfig;
use ogb_jobs::{DEFAULT_WORKERS, GenomeId};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Settings file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "ogb.toml";
/// Environment variable overriding the job state directory
pub const STATE_DIR_ENV: &str = "OGB_STATE_DIR";
/// Environment variable overriding the worker count
pub const WORKERS_ENV: &str = "OGB_WORKERS";

/// `[cache]` section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    /// Cache root; resolved from the environment and platform when unset
    pub dir: Option<PathBuf>,
    /// Entries kept per cached function
    pub max_entries: usize,
    /// Seconds to wait before re-reading an entry another process is writing
    pub retry_wait_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            dir: None,
            max_entries: DEFAULT_MAX_ENTRIES,
            retry_wait_secs: DEFAULT_RETRY_WAIT.as_secs(),
        }
    }
}

/// `[jobs]` section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobSettings {
    /// Directory of job records and tool lock files
    pub state_dir: Option<PathBuf>,
    /// Concurrent background workers
    pub workers: usize,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            state_dir: None,
            workers: DEFAULT_WORKERS,
        }
    }
}

/// `[genomes]` section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenomeSettings {
    /// Directory holding `<identifier>.<extension>` assemblies
    pub assembly_dir: Option<PathBuf>,
    /// Assembly file extension
    pub extension: String,
    /// Explicit identifier → assembly table; takes precedence over `assembly_dir`
    pub paths: BTreeMap<GenomeId, PathBuf>,
}

impl Default for GenomeSettings {
    fn default() -> Self {
        Self {
            assembly_dir: None,
            extension: "fna".to_string(),
            paths: BTreeMap::new(),
        }
    }
}

/// `[tools]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolSettings {
    /// GenDisCal
    pub gendiscal: GenDisCalConfig,
    /// OrthoANI
    pub orthoani: OrthoAniConfig,
    /// OrthoFinder
    pub orthofinder: OrthoFinderConfig,
    /// nucmer and DotPrep
    pub dotplot: DotPlotConfig,
}

/// Everything the CLI reads from its settings file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Result cache
    pub cache: CacheSettings,
    /// Background jobs
    pub jobs: JobSettings,
    /// Assembly lookup
    pub genomes: GenomeSettings,
    /// External tools
    pub tools: ToolSettings,
}

impl Settings {
    /// Parse settings from TOML text
    pub fn from_toml(text: &str, origin: &Path) -> Result<Self, CliError> {
        toml::from_str(text).map_err(|e| {
            CliError::config_with_help(
                format!("Invalid settings file {}: {e}", origin.display()),
                "See `ogb --help` for the supported sections",
            )
        })
    }

    /// Load settings from `explicit`, else `ogb.toml` in the working
    /// directory, else defaults; then apply environment overrides
    pub fn load(explicit: Option<&Path>) -> Result<Self, CliError> {
        let mut settings = match explicit {
            Some(path) => Self::read(path)?,
            None => {
                let local = Path::new(DEFAULT_CONFIG_FILE);
                if local.is_file() {
                    Self::read(local)?
                } else {
                    tracing::debug!("No settings file, using defaults");
                    Self::default()
                }
            }
        };
        settings.apply_env_overrides()?;
        Ok(settings)
    }

    fn read(path: &Path) -> Result<Self, CliError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CliError::config(format!("Cannot read settings file {}: {e}", path.display()))
        })?;
        tracing::debug!(path = %path.display(), "Loaded settings file");
        Self::from_toml(&text, path)
    }

    /// Apply `OGB_CACHE_DIR`, `OGB_STATE_DIR` and `OGB_WORKERS`
    pub fn apply_env_overrides(&mut self) -> Result<(), CliError> {
        if let Some(dir) = non_empty_var(CACHE_DIR_ENV) {
            self.cache.dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = non_empty_var(STATE_DIR_ENV) {
            self.jobs.state_dir = Some(PathBuf::from(dir));
        }
        if let Some(workers) = non_empty_var(WORKERS_ENV) {
            self.jobs.workers = workers.trim().parse().map_err(|_| {
                CliError::config(format!("{WORKERS_ENV} must be a positive integer, got {workers:?}"))
            })?;
        }
        Ok(())
    }

    /// Cache configuration for the coordinator and the cache commands
    pub fn cache_config(&self) -> Result<CacheConfig, CliError> {
        let root = match &self.cache.dir {
            Some(dir) => dir.clone(),
            None => ogb_cache::default_cache_root()?,
        };
        Ok(CacheConfig::new(root)
            .with_max_entries(self.cache.max_entries)
            .with_retry_wait(Duration::from_secs(self.cache.retry_wait_secs)))
    }

    /// Directory of job records
    pub fn state_dir(&self) -> Result<PathBuf, CliError> {
        if let Some(dir) = &self.jobs.state_dir {
            return Ok(dir.clone());
        }
        let base = dirs::state_dir()
            .or_else(dirs::data_dir)
            .ok_or_else(|| CliError::config("Could not determine state directory"))?;
        Ok(base.join("ogb"))
    }

    /// Assembly lookup from the `[genomes]` section
    pub fn locator(&self) -> Result<Arc<dyn AssemblyLocator>, CliError> {
        if !self.genomes.paths.is_empty() {
            return Ok(Arc::new(MapLocator::new(self.genomes.paths.clone())));
        }
        match &self.genomes.assembly_dir {
            Some(dir) => Ok(Arc::new(DirectoryLocator::new(
                dir,
                self.genomes.extension.clone(),
            ))),
            None => Err(CliError::config_with_help(
                "No assemblies configured",
                "Set genomes.assembly_dir or genomes.paths in the settings file",
            )),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_VARS: [&str; 3] = [CACHE_DIR_ENV, STATE_DIR_ENV, WORKERS_ENV];

    #[test]
    fn test_defaults() {
        let settings = Settings::from_toml("", Path::new("ogb.toml")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.cache.max_entries, 50);
        assert_eq!(settings.cache.retry_wait_secs, 10);
        assert_eq!(settings.jobs.workers, 4);
        assert_eq!(settings.tools.gendiscal.preset, "approxANI");
    }

    #[test]
    fn test_sections_parse() {
        let text = r#"
            [cache]
            dir = "/srv/cache"
            max_entries = 3

            [jobs]
            state_dir = "/srv/state"
            workers = 8

            [genomes.paths]
            "FAM1079-i1-1" = "/data/FAM1079-i1-1.fna"

            [tools.orthoani]
            jar = "/opt/oat/OAT_cmd.jar"
            threads = 2
        "#;
        let settings = Settings::from_toml(text, Path::new("ogb.toml")).unwrap();
        assert_eq!(settings.cache.dir, Some(PathBuf::from("/srv/cache")));
        assert_eq!(settings.cache.max_entries, 3);
        assert_eq!(settings.jobs.workers, 8);
        assert_eq!(settings.tools.orthoani.threads, Some(2));
        assert_eq!(settings.tools.orthoani.java, PathBuf::from("java"));

        let genome = GenomeId::new("FAM1079-i1-1").unwrap();
        let path = settings.locator().unwrap().assembly(&genome).unwrap();
        assert_eq!(path, PathBuf::from("/data/FAM1079-i1-1.fna"));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = Settings::from_toml("[cache]\nmax = 3\n", Path::new("ogb.toml")).unwrap_err();
        assert!(matches!(err, CliError::Config { .. }));
    }

    #[test]
    fn test_env_overrides_file_values() {
        temp_env::with_vars(
            [
                (CACHE_DIR_ENV, Some("/env/cache")),
                (STATE_DIR_ENV, Some("/env/state")),
                (WORKERS_ENV, Some("2")),
            ],
            || {
                let mut settings =
                    Settings::from_toml("[jobs]\nworkers = 16\n", Path::new("ogb.toml")).unwrap();
                settings.apply_env_overrides().unwrap();
                assert_eq!(settings.cache.dir, Some(PathBuf::from("/env/cache")));
                assert_eq!(settings.state_dir().unwrap(), PathBuf::from("/env/state"));
                assert_eq!(settings.jobs.workers, 2);
            },
        );
    }

    #[test]
    fn test_cache_config_uses_settings() {
        let settings = Settings {
            cache: CacheSettings {
                dir: Some(PathBuf::from("/srv/cache")),
                max_entries: 5,
                retry_wait_secs: 1,
            },
            ..Settings::default()
        };
        let config = settings.cache_config().unwrap();
        assert_eq!(config.root, PathBuf::from("/srv/cache"));
        assert_eq!(config.max_entries, 5);
        assert_eq!(config.retry_wait, Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_worker_count() {
        temp_env::with_var(WORKERS_ENV, Some("many"), || {
            let mut settings = Settings::default();
            assert!(settings.apply_env_overrides().is_err());
        });
    }

    #[test]
    fn test_explicit_file_is_loaded() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("settings.toml");
        std::fs::write(&path, "[cache]\nmax_entries = 7\n").unwrap();

        temp_env::with_vars_unset(ALL_VARS, || {
            let settings = Settings::load(Some(&path)).unwrap();
            assert_eq!(settings.cache.max_entries, 7);
        });

        let missing = tmp.path().join("missing.toml");
        assert!(Settings::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_missing_assemblies_is_config_error() {
        let err = Settings::default().locator().err().unwrap();
        assert!(matches!(err, CliError::Config { .. }));
    }
}
