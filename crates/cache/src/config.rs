//! Cache configuration and cache-root resolution

use crate::{Error, Result};
use dirs::{cache_dir, home_dir};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the cache root
pub const CACHE_DIR_ENV: &str = "OGB_CACHE_DIR";

/// Default number of entries kept per cached function
pub const DEFAULT_MAX_ENTRIES: usize = 50;

/// Default wait before re-reading an entry that another process may still be writing
pub const DEFAULT_RETRY_WAIT: Duration = Duration::from_secs(10);

/// Settings shared by every cached function of one cache root
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Root directory; one subdirectory per cached function
    pub root: PathBuf,
    /// Entries kept per function after eviction
    pub max_entries: usize,
    /// Wait before the single re-read of an unreadable entry
    pub retry_wait: Duration,
}

impl CacheConfig {
    /// Configuration with default limits at an explicit root
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_entries: DEFAULT_MAX_ENTRIES,
            retry_wait: DEFAULT_RETRY_WAIT,
        }
    }

    /// Configuration with default limits at the resolved default root
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(default_cache_root()?))
    }

    /// Set the per-function entry limit
    #[must_use]
    pub const fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Set the corrupt-read retry wait
    #[must_use]
    pub const fn with_retry_wait(mut self, retry_wait: Duration) -> Self {
        self.retry_wait = retry_wait;
        self
    }
}

/// Inputs for determining the cache root directory
#[derive(Debug, Clone)]
struct CacheInputs {
    ogb_cache_dir: Option<PathBuf>,
    xdg_cache_home: Option<PathBuf>,
    os_cache_dir: Option<PathBuf>,
    home_dir: Option<PathBuf>,
    temp_dir: PathBuf,
}

fn cache_root_from_inputs(inputs: CacheInputs) -> Result<PathBuf> {
    // Resolution order (first writable wins):
    // 1) OGB_CACHE_DIR (explicit override)
    // 2) XDG_CACHE_HOME/ogb
    // 3) OS cache dir/ogb
    // 4) ~/.ogb/cache
    // 5) TMPDIR/ogb/cache (fallback)
    let mut candidates: Vec<PathBuf> = Vec::new();

    if let Some(dir) = inputs.ogb_cache_dir.filter(|p| !p.as_os_str().is_empty()) {
        candidates.push(dir);
    }
    if let Some(xdg) = inputs.xdg_cache_home {
        candidates.push(xdg.join("ogb"));
    }
    if let Some(os_cache) = inputs.os_cache_dir {
        candidates.push(os_cache.join("ogb"));
    }
    if let Some(home) = inputs.home_dir {
        candidates.push(home.join(".ogb/cache"));
    }
    candidates.push(inputs.temp_dir.join("ogb/cache"));

    for path in candidates {
        if is_writable_dir(&path) {
            return Ok(path);
        }
        // Permission denied or other errors - try next candidate
    }
    Err(Error::configuration(
        "Failed to determine a writable cache directory",
    ))
}

/// Create `path` if needed and check that files can be created inside it
fn is_writable_dir(path: &Path) -> bool {
    if std::fs::create_dir_all(path).is_err() {
        return false;
    }
    // Read-only mounts (containers, CI caches) accept create_dir_all on an existing path
    let probe = path.join(".write_probe");
    match std::fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(&probe)
    {
        Ok(_) => {
            let _ = std::fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}

/// Resolve the default cache root from the environment
pub fn default_cache_root() -> Result<PathBuf> {
    let non_empty = |key: &str| {
        std::env::var(key)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
    };
    let inputs = CacheInputs {
        ogb_cache_dir: non_empty(CACHE_DIR_ENV),
        xdg_cache_home: non_empty("XDG_CACHE_HOME"),
        os_cache_dir: cache_dir(),
        home_dir: home_dir(),
        temp_dir: std::env::temp_dir(),
    };
    cache_root_from_inputs(inputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn override_wins() {
        let tmp = TempDir::new().unwrap();
        let wanted = tmp.path().join("explicit");
        let inputs = CacheInputs {
            ogb_cache_dir: Some(wanted.clone()),
            xdg_cache_home: Some(tmp.path().join("xdg")),
            os_cache_dir: None,
            home_dir: None,
            temp_dir: tmp.path().to_path_buf(),
        };
        assert_eq!(cache_root_from_inputs(inputs).unwrap(), wanted);
        assert!(wanted.is_dir());
    }

    #[test]
    fn falls_back_to_xdg() {
        let tmp = TempDir::new().unwrap();
        let inputs = CacheInputs {
            ogb_cache_dir: Some(PathBuf::new()),
            xdg_cache_home: Some(tmp.path().join("xdg")),
            os_cache_dir: None,
            home_dir: None,
            temp_dir: tmp.path().to_path_buf(),
        };
        assert_eq!(
            cache_root_from_inputs(inputs).unwrap(),
            tmp.path().join("xdg/ogb")
        );
    }

    #[cfg(unix)]
    #[test]
    fn skips_unwritable_candidates() {
        let tmp = TempDir::new().unwrap();
        let inputs = CacheInputs {
            ogb_cache_dir: Some(PathBuf::from("/proc/ogb-not-writable")),
            xdg_cache_home: None,
            os_cache_dir: None,
            home_dir: None,
            temp_dir: tmp.path().to_path_buf(),
        };
        let dir = cache_root_from_inputs(inputs).unwrap();
        assert!(dir.starts_with(tmp.path()));
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = CacheConfig::new("/tmp/ogb")
            .with_max_entries(2)
            .with_retry_wait(Duration::from_millis(5));
        assert_eq!(config.max_entries, 2);
        assert_eq!(config.retry_wait, Duration::from_millis(5));
        assert_eq!(
            CacheConfig::new("/tmp/ogb").max_entries,
            DEFAULT_MAX_ENTRIES
        );
    }
}
