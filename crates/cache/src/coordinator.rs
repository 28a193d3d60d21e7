//! Compute-or-retrieve orchestration over a [`CacheStore`]

use crate::{
    CacheConfig, CacheEntry, CacheStore, ContentKey, Error, EvictionPolicy, FunctionId, Result,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::thread;
use std::time::Duration;

/// Per-call limits of [`CacheCoordinator::get_or_compute_with`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    /// Entries kept for the function after the call
    pub max_entries: usize,
    /// Wait before the single re-read of an unreadable entry
    pub retry_wait: Duration,
}

impl From<&CacheConfig> for CacheOptions {
    fn from(config: &CacheConfig) -> Self {
        Self {
            max_entries: config.max_entries,
            retry_wait: config.retry_wait,
        }
    }
}

/// Memoizes computations in a [`CacheStore`].
///
/// On a local filesystem at most one caller computes a given key at a time:
/// the first to claim the entry directory runs the computation, later callers
/// read its result. Processes on different machines that do not share the
/// cache root may both compute the same key.
#[derive(Debug, Clone)]
pub struct CacheCoordinator {
    store: CacheStore,
    defaults: CacheOptions,
}

impl CacheCoordinator {
    /// Open the store described by `config`
    pub fn new(config: &CacheConfig) -> Result<Self> {
        Ok(Self {
            store: CacheStore::new(&config.root)?,
            defaults: CacheOptions::from(config),
        })
    }

    /// Coordinator over an existing store
    #[must_use]
    pub const fn with_store(store: CacheStore, defaults: CacheOptions) -> Self {
        Self { store, defaults }
    }

    /// The underlying store
    #[must_use]
    pub const fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Limits used by [`get_or_compute`](Self::get_or_compute)
    #[must_use]
    pub const fn defaults(&self) -> CacheOptions {
        self.defaults
    }

    /// [`get_or_compute_with`](Self::get_or_compute_with) using the default limits
    pub fn get_or_compute<T, E, F>(
        &self,
        function: &FunctionId,
        key: &ContentKey,
        compute: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
        F: FnOnce(&Path) -> std::result::Result<T, E>,
    {
        self.get_or_compute_with(function, key, &self.defaults, compute)
    }

    /// Return the cached result for `key`, computing and storing it on a miss.
    ///
    /// `compute` receives the entry directory and may leave auxiliary files
    /// there. If it fails the entry is removed and the error is returned as
    /// [`Error::ComputationFailed`] carrying the original error as its source.
    /// Eviction runs after every call.
    pub fn get_or_compute_with<T, E, F>(
        &self,
        function: &FunctionId,
        key: &ContentKey,
        options: &CacheOptions,
        compute: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
        F: FnOnce(&Path) -> std::result::Result<T, E>,
    {
        let outcome = if self.store.exists(function, key) {
            self.load(function, key, options.retry_wait)
        } else {
            match self.store.claim(function, key) {
                Ok(entry) => self.run(&entry, compute),
                Err(e) if e.is_already_exists() => {
                    tracing::debug!(%function, %key, "Lost claim race, reading result");
                    self.load(function, key, options.retry_wait)
                }
                Err(e) => Err(e),
            }
        };

        EvictionPolicy::new(options.max_entries).enforce(&self.store, function);
        outcome
    }

    /// Derive the key from `args` and `kwargs`, then [`get_or_compute`](Self::get_or_compute)
    pub fn memoize<A, K, T, E, F>(
        &self,
        function: &FunctionId,
        args: &A,
        kwargs: &K,
        compute: F,
    ) -> Result<T>
    where
        A: Serialize + ?Sized,
        K: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
        F: FnOnce(&Path) -> std::result::Result<T, E>,
    {
        let key = ContentKey::new(args, kwargs)?;
        self.get_or_compute(function, &key, compute)
    }

    fn load<T: DeserializeOwned>(
        &self,
        function: &FunctionId,
        key: &ContentKey,
        retry_wait: Duration,
    ) -> Result<T> {
        tracing::debug!(%function, %key, "Loading cached result");
        let value = match self.store.read(function, key) {
            Ok(value) => value,
            Err(e) if e.is_corrupt_entry() => {
                tracing::debug!(
                    %function,
                    %key,
                    wait_ms = retry_wait.as_millis(),
                    "Cache entry not readable yet, retrying once"
                );
                thread::sleep(retry_wait);
                self.store.read(function, key)?
            }
            Err(e) => return Err(e),
        };

        if let Err(e) = self.store.touch(function, key) {
            tracing::warn!(%function, %key, error = %e, "Failed to refresh cache timestamp");
        }
        Ok(value)
    }

    fn run<T, E, F>(&self, entry: &CacheEntry, compute: F) -> Result<T>
    where
        T: Serialize,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
        F: FnOnce(&Path) -> std::result::Result<T, E>,
    {
        tracing::debug!(function = %entry.function, key = %entry.key, "Running cached computation");
        let value = match compute(&entry.path) {
            Ok(value) => value,
            Err(e) => {
                let source: Box<dyn std::error::Error + Send + Sync> = e.into();
                tracing::warn!(
                    function = %entry.function,
                    key = %entry.key,
                    error = %source,
                    "Cached computation failed, rolling back entry"
                );
                self.rollback(entry);
                return Err(Error::ComputationFailed {
                    function: entry.function.to_string(),
                    key: entry.key.to_string(),
                    source,
                });
            }
        };

        if let Err(e) = self.store.write_result(entry, &value) {
            tracing::warn!(
                function = %entry.function,
                key = %entry.key,
                error = %e,
                "Could not persist cached result, rolling back entry"
            );
            self.rollback(entry);
            return Err(e);
        }
        Ok(value)
    }

    fn rollback(&self, entry: &CacheEntry) {
        if let Err(e) = self.store.remove(&entry.function, &entry.key) {
            tracing::warn!(
                function = %entry.function,
                key = %entry.key,
                error = %e,
                "Failed to remove rolled back cache entry"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::fs;
    use tempfile::TempDir;

    fn coordinator(max_entries: usize) -> (TempDir, CacheCoordinator) {
        let tmp = TempDir::new().unwrap();
        let config = CacheConfig::new(tmp.path())
            .with_max_entries(max_entries)
            .with_retry_wait(Duration::from_millis(10));
        let coordinator = CacheCoordinator::new(&config).unwrap();
        (tmp, coordinator)
    }

    #[derive(Debug, thiserror::Error)]
    #[error("tool exploded")]
    struct ToolError;

    #[test]
    fn second_call_hits_cache() {
        let (_tmp, cache) = coordinator(2);
        let f = FunctionId::new("tests.answer").unwrap();
        let key = ContentKey::from_args(&["k"]).unwrap();
        let calls = Cell::new(0);

        let compute = |_: &Path| {
            calls.set(calls.get() + 1);
            Ok::<_, ToolError>(42)
        };
        assert_eq!(cache.get_or_compute(&f, &key, compute).unwrap(), 42);
        let first = cache.store().timestamp(&f, &key).unwrap();

        let compute = |_: &Path| {
            calls.set(calls.get() + 1);
            Ok::<_, ToolError>(0)
        };
        assert_eq!(cache.get_or_compute(&f, &key, compute).unwrap(), 42);
        assert_eq!(calls.get(), 1);
        assert!(cache.store().timestamp(&f, &key).unwrap() >= first);
    }

    #[test]
    fn failure_rolls_back_and_keeps_source() {
        let (_tmp, cache) = coordinator(2);
        let f = FunctionId::new("tests.fails").unwrap();
        let key = ContentKey::from_args(&["k"]).unwrap();

        let err = cache
            .get_or_compute(&f, &key, |_: &Path| Err::<u8, _>(ToolError))
            .unwrap_err();
        assert!(!cache.store().exists(&f, &key));
        let source = err.computation_source().unwrap();
        assert!(source.downcast_ref::<ToolError>().is_some());

        let value = cache
            .get_or_compute(&f, &key, |_: &Path| Ok::<_, ToolError>(7u8))
            .unwrap();
        assert_eq!(value, 7);
        assert!(cache.store().exists(&f, &key));
    }

    #[test]
    fn compute_receives_entry_dir() {
        let (_tmp, cache) = coordinator(2);
        let f = FunctionId::new("tests.artifacts").unwrap();
        let key = ContentKey::from_args(&["plot"]).unwrap();

        let path = cache
            .get_or_compute(&f, &key, |dir: &Path| {
                let out = dir.join("plot.coords");
                fs::write(&out, b"0 0 1 1").map(|()| out)
            })
            .unwrap();
        assert!(path.starts_with(cache.store().entry_dir(&f, &key)));
        assert!(path.is_file());
    }

    #[test]
    fn claimed_but_unwritten_entry_is_corrupt_after_retry() {
        let (_tmp, cache) = coordinator(2);
        let f = FunctionId::new("tests.stuck").unwrap();
        let key = ContentKey::from_args(&["k"]).unwrap();
        cache.store().claim(&f, &key).unwrap();

        let err = cache
            .get_or_compute(&f, &key, |_: &Path| Ok::<_, ToolError>(1u8))
            .unwrap_err();
        assert!(err.is_corrupt_entry());
        // An unreadable entry is not removed by the reader
        assert!(cache.store().exists(&f, &key));
    }

    #[test]
    fn memoize_derives_key_from_arguments() {
        let (_tmp, cache) = coordinator(5);
        let f = FunctionId::new("tests.add").unwrap();
        let calls = Cell::new(0);
        let add = |a: i64, b: i64| {
            cache.memoize(&f, &(a, b), &serde_json::json!({"scale": 1}), |_: &Path| {
                calls.set(calls.get() + 1);
                Ok::<_, ToolError>(a + b)
            })
        };
        assert_eq!(add(1, 2).unwrap(), 3);
        assert_eq!(add(1, 2).unwrap(), 3);
        assert_eq!(add(2, 1).unwrap(), 3);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn eviction_runs_after_each_call() {
        let (_tmp, cache) = coordinator(2);
        let f = FunctionId::new("tests.evict").unwrap();
        for n in 1..=3u32 {
            let key = ContentKey::from_args(&[n]).unwrap();
            cache
                .get_or_compute(&f, &key, |_: &Path| Ok::<_, ToolError>(n))
                .unwrap();
        }
        assert_eq!(cache.store().list_entries(&f).unwrap().len(), 2);
        assert!(!cache.store().exists(&f, &ContentKey::from_args(&[1u32]).unwrap()));
    }
}
