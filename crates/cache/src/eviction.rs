//! Bounded-size trimming of cached functions

use crate::{CacheEntry, CacheStore, ContentKey, FunctionId};
use chrono::Utc;
use std::time::Duration;

/// Age after which a claimed entry that never got a result counts as abandoned
pub const ABANDONED_CLAIM_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Keeps at most `max_entries` finished entries per function, dropping the oldest.
///
/// Entries without a result artifact belong to a computation that is still
/// running. They are not counted and are only removed once their claim is
/// older than `abandoned_after`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionPolicy {
    /// Finished entries kept per function
    pub max_entries: usize,
    /// Age at which an entry without a result is removed
    pub abandoned_after: Duration,
}

/// What one eviction pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Entries that were deleted
    pub removed: Vec<(FunctionId, ContentKey)>,
    /// Entries whose deletion failed and were skipped
    pub failed: Vec<(FunctionId, ContentKey)>,
}

impl EvictionReport {
    fn merge(&mut self, other: Self) {
        self.removed.extend(other.removed);
        self.failed.extend(other.failed);
    }
}

impl EvictionPolicy {
    /// Policy keeping `max_entries` entries per function
    #[must_use]
    pub const fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            abandoned_after: ABANDONED_CLAIM_AGE,
        }
    }

    /// Override the age at which unfinished entries are removed
    #[must_use]
    pub const fn with_abandoned_after(mut self, abandoned_after: Duration) -> Self {
        self.abandoned_after = abandoned_after;
        self
    }

    fn is_abandoned(&self, entry: &CacheEntry) -> bool {
        (Utc::now() - entry.timestamp)
            .to_std()
            .is_ok_and(|age| age > self.abandoned_after)
    }

    /// Remove every finished entry of `function` beyond the newest
    /// `max_entries`, and every abandoned unfinished one.
    ///
    /// Never fails: listing and deletion errors are logged and skipped.
    pub fn enforce(&self, store: &CacheStore, function: &FunctionId) -> EvictionReport {
        let mut report = EvictionReport::default();
        let entries = match store.list_entries(function) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(%function, error = %e, "Could not list cache entries for eviction");
                return report;
            }
        };

        let (finished, pending): (Vec<_>, Vec<_>) =
            entries.into_iter().partition(CacheEntry::is_finished);
        let abandoned = pending.into_iter().filter(|e| self.is_abandoned(e));

        for entry in finished.into_iter().skip(self.max_entries).chain(abandoned) {
            match store.remove(function, &entry.key) {
                Ok(()) => {
                    tracing::debug!(%function, key = %entry.key, "Evicted cache entry");
                    report.removed.push((entry.function, entry.key));
                }
                Err(e) => {
                    tracing::warn!(%function, key = %entry.key, error = %e, "Failed to evict cache entry");
                    report.failed.push((entry.function, entry.key));
                }
            }
        }
        report
    }

    /// Run [`enforce`](Self::enforce) over every function under the root
    pub fn enforce_all(&self, store: &CacheStore) -> EvictionReport {
        let mut report = EvictionReport::default();
        let functions = match store.functions() {
            Ok(functions) => functions,
            Err(e) => {
                tracing::warn!(error = %e, "Could not list cached functions for eviction");
                return report;
            }
        };
        for function in &functions {
            report.merge(self.enforce(store, function));
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key(n: u32) -> ContentKey {
        ContentKey::from_args(&[n]).unwrap()
    }

    #[test]
    fn keeps_newest_entries() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::new(tmp.path()).unwrap();
        let f = FunctionId::new("tests.f").unwrap();
        for n in 1..=5 {
            store.write(&f, &key(n), &n).unwrap();
        }

        let report = EvictionPolicy::new(2).enforce(&store, &f);
        assert_eq!(report.removed.len(), 3);
        assert!(report.failed.is_empty());
        assert!(store.exists(&f, &key(4)));
        assert!(store.exists(&f, &key(5)));
        for n in 1..=3 {
            assert!(!store.exists(&f, &key(n)));
        }
    }

    #[test]
    fn touched_entry_survives() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::new(tmp.path()).unwrap();
        let f = FunctionId::new("tests.f").unwrap();
        for n in 1..=3 {
            store.write(&f, &key(n), &n).unwrap();
        }
        store.touch(&f, &key(1)).unwrap();

        EvictionPolicy::new(2).enforce(&store, &f);
        assert!(store.exists(&f, &key(1)));
        assert!(!store.exists(&f, &key(2)));
        assert!(store.exists(&f, &key(3)));
    }

    #[test]
    fn under_limit_is_noop() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::new(tmp.path()).unwrap();
        let f = FunctionId::new("tests.f").unwrap();
        store.write(&f, &key(1), &1).unwrap();
        assert_eq!(
            EvictionPolicy::new(2).enforce(&store, &f),
            EvictionReport::default()
        );
    }

    #[test]
    fn unfinished_entry_is_neither_counted_nor_evicted() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::new(tmp.path()).unwrap();
        let f = FunctionId::new("tests.f").unwrap();
        // Oldest entry of the function, still computing
        store.claim(&f, &key(0)).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        for n in 1..=3 {
            store.write(&f, &key(n), &n).unwrap();
        }

        let report = EvictionPolicy::new(2).enforce(&store, &f);
        assert_eq!(report.removed, vec![(f.clone(), key(1))]);
        assert!(store.exists(&f, &key(0)));
        assert!(store.exists(&f, &key(2)));
        assert!(store.exists(&f, &key(3)));
    }

    #[test]
    fn abandoned_claim_is_removed() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::new(tmp.path()).unwrap();
        let f = FunctionId::new("tests.f").unwrap();
        store.claim(&f, &key(0)).unwrap();
        store.write(&f, &key(1), &1).unwrap();
        std::thread::sleep(Duration::from_millis(5));

        let policy = EvictionPolicy::new(2).with_abandoned_after(Duration::from_millis(1));
        let report = policy.enforce(&store, &f);
        assert_eq!(report.removed, vec![(f.clone(), key(0))]);
        assert!(store.exists(&f, &key(1)));
    }

    #[test]
    fn enforce_all_covers_every_function() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::new(tmp.path()).unwrap();
        let f = FunctionId::new("tests.f").unwrap();
        let g = FunctionId::new("tests.g").unwrap();
        for n in 1..=3 {
            store.write(&f, &key(n), &n).unwrap();
            store.write(&g, &key(n), &n).unwrap();
        }
        let report = EvictionPolicy::new(1).enforce_all(&store);
        assert_eq!(report.removed.len(), 4);
        assert_eq!(store.list_entries(&f).unwrap().len(), 1);
        assert_eq!(store.list_entries(&g).unwrap().len(), 1);
    }
}
