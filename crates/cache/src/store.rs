//! On-disk layout of the cache
//!
//! ```text
//! <root>/<function>/<key>/result.json
//! <root>/<function>/<key>/timestamp.txt
//! ```
//!
//! Claiming an entry is a single `create_dir`, which is atomic on a local
//! filesystem. The timestamp marker is written right after the claim and
//! again next to the result artifact once the computation has produced it.

use crate::{ContentKey, Error, FunctionId, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// File holding the serialized result of an entry
pub const RESULT_FILE: &str = "result.json";

/// File holding the last creation or access time of an entry
pub const TIMESTAMP_FILE: &str = "timestamp.txt";

/// One entry of a cached function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Owning function
    pub function: FunctionId,
    /// Content key of the call
    pub key: ContentKey,
    /// Entry directory
    pub path: PathBuf,
    /// Time of creation or of the last successful read
    pub timestamp: DateTime<Utc>,
}

impl CacheEntry {
    /// Path of the result artifact
    #[must_use]
    pub fn result_path(&self) -> PathBuf {
        self.path.join(RESULT_FILE)
    }

    /// True once the result artifact has been written
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.result_path().is_file()
    }
}

/// Entry count and disk usage of one cached function
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionStats {
    /// Function directory name
    pub function: String,
    /// Number of entries
    pub entries: usize,
    /// Total size of all files in bytes
    pub bytes: u64,
}

/// Summary over every function under a cache root
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Per-function figures, sorted by function name
    pub functions: Vec<FunctionStats>,
}

impl CacheStats {
    /// Sum of all entry counts
    #[must_use]
    pub fn total_entries(&self) -> usize {
        self.functions.iter().map(|f| f.entries).sum()
    }

    /// Sum of all sizes
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.functions.iter().map(|f| f.bytes).sum()
    }
}

/// File-system-backed key-value store, one directory per function and key
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| Error::io(e, &root, "create_dir_all"))?;
        Ok(Self { root })
    }

    /// Open a store at the default cache root
    pub fn open_default() -> Result<Self> {
        Self::new(crate::default_cache_root()?)
    }

    /// The cache root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every entry of `function`
    #[must_use]
    pub fn function_dir(&self, function: &FunctionId) -> PathBuf {
        self.root.join(function.as_str())
    }

    /// Directory of one entry
    #[must_use]
    pub fn entry_dir(&self, function: &FunctionId, key: &ContentKey) -> PathBuf {
        self.function_dir(function).join(key.as_str())
    }

    /// True iff the entry directory exists, whatever its contents
    #[must_use]
    pub fn exists(&self, function: &FunctionId, key: &ContentKey) -> bool {
        self.entry_dir(function, key).is_dir()
    }

    /// Deserialize the stored result
    pub fn read<T: DeserializeOwned>(&self, function: &FunctionId, key: &ContentKey) -> Result<T> {
        let path = self.entry_dir(function, key).join(RESULT_FILE);
        let bytes = fs::read(&path).map_err(|e| {
            let message = if e.kind() == ErrorKind::NotFound {
                "result artifact is missing".to_string()
            } else {
                format!("cannot read {}: {e}", path.display())
            };
            Error::corrupt_entry(function.as_str(), key.as_str(), message)
        })?;
        serde_json::from_slice(&bytes).map_err(|e| {
            Error::corrupt_entry(
                function.as_str(),
                key.as_str(),
                format!("result artifact is not valid: {e}"),
            )
        })
    }

    /// Create the entry directory and its timestamp marker.
    ///
    /// Fails with [`Error::AlreadyExists`] when another caller claimed the
    /// key first.
    pub fn claim(&self, function: &FunctionId, key: &ContentKey) -> Result<CacheEntry> {
        let function_dir = self.function_dir(function);
        fs::create_dir_all(&function_dir)
            .map_err(|e| Error::io(e, &function_dir, "create_dir_all"))?;

        let path = function_dir.join(key.as_str());
        match fs::create_dir(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::already_exists(function.as_str(), key.as_str()));
            }
            Err(e) => return Err(Error::io(e, &path, "create_dir")),
        }

        let timestamp = write_timestamp(&path)?;
        Ok(CacheEntry {
            function: function.clone(),
            key: key.clone(),
            path,
            timestamp,
        })
    }

    /// Persist the result of a claimed entry and refresh its timestamp
    pub fn write_result<T: Serialize + ?Sized>(
        &self,
        entry: &CacheEntry,
        result: &T,
    ) -> Result<DateTime<Utc>> {
        let json = serde_json::to_vec(result).map_err(|e| {
            Error::serialization(format!(
                "Failed to serialize result of {}/{}: {e}",
                entry.function, entry.key
            ))
        })?;
        write_atomic(&entry.path, RESULT_FILE, &json)?;
        write_timestamp(&entry.path)
    }

    /// Claim `key` and store `result` in one step
    pub fn write<T: Serialize + ?Sized>(
        &self,
        function: &FunctionId,
        key: &ContentKey,
        result: &T,
    ) -> Result<CacheEntry> {
        let entry = self.claim(function, key)?;
        match self.write_result(&entry, result) {
            Ok(timestamp) => Ok(CacheEntry { timestamp, ..entry }),
            Err(e) => {
                if let Err(cleanup) = self.remove(function, key) {
                    tracing::warn!(
                        %function,
                        %key,
                        error = %cleanup,
                        "Failed to roll back unwritten cache entry"
                    );
                }
                Err(e)
            }
        }
    }

    /// Refresh the timestamp marker to now
    pub fn touch(&self, function: &FunctionId, key: &ContentKey) -> Result<DateTime<Utc>> {
        write_timestamp(&self.entry_dir(function, key))
    }

    /// Read the timestamp marker
    #[must_use]
    pub fn timestamp(&self, function: &FunctionId, key: &ContentKey) -> Option<DateTime<Utc>> {
        read_timestamp(&self.entry_dir(function, key))
    }

    /// Delete an entry with all its files; a missing entry is not an error
    pub fn remove(&self, function: &FunctionId, key: &ContentKey) -> Result<()> {
        let path = self.entry_dir(function, key);
        match fs::remove_dir_all(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(e, &path, "remove_dir_all")),
        }
    }

    /// Every entry of `function`, newest first.
    ///
    /// Directories whose name is not a content key are ignored. The sort is
    /// stable, so entries with equal timestamps keep directory order.
    pub fn list_entries(&self, function: &FunctionId) -> Result<Vec<CacheEntry>> {
        let dir = self.function_dir(function);
        let read_dir = match fs::read_dir(&dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(e, &dir, "read_dir")),
        };

        let mut entries = Vec::new();
        for item in read_dir {
            let item = item.map_err(|e| Error::io(e, &dir, "read_dir"))?;
            let path = item.path();
            if !path.is_dir() {
                continue;
            }
            let Some(key) = item.file_name().to_str().and_then(ContentKey::parse) else {
                tracing::debug!(path = %path.display(), "Skipping foreign directory in cache");
                continue;
            };
            let Some(timestamp) = read_timestamp(&path).or_else(|| modified_time(&path)) else {
                continue;
            };
            entries.push(CacheEntry {
                function: function.clone(),
                key,
                path,
                timestamp,
            });
        }
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(entries)
    }

    /// Delete every entry of `function`; returns whether anything was removed
    pub fn clear_function(&self, function: &FunctionId) -> Result<bool> {
        let dir = self.function_dir(function);
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::io(e, &dir, "remove_dir_all")),
        }
    }

    /// Every function that has a directory under the root, sorted by name
    pub fn functions(&self) -> Result<Vec<FunctionId>> {
        let read_dir = fs::read_dir(&self.root).map_err(|e| Error::io(e, &self.root, "read_dir"))?;
        let mut functions = Vec::new();
        for item in read_dir {
            let item = item.map_err(|e| Error::io(e, &self.root, "read_dir"))?;
            if !item.path().is_dir() {
                continue;
            }
            if let Some(id) = item
                .file_name()
                .to_str()
                .and_then(|name| FunctionId::new(name).ok())
            {
                functions.push(id);
            }
        }
        functions.sort();
        Ok(functions)
    }

    /// Entry counts and disk usage per function
    pub fn stats(&self) -> Result<CacheStats> {
        let mut stats = CacheStats::default();
        for function in self.functions()? {
            let entries = self.list_entries(&function)?.len();
            let bytes = walkdir::WalkDir::new(self.function_dir(&function))
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter_map(|e| e.metadata().ok())
                .map(|m| m.len())
                .sum();
            stats.functions.push(FunctionStats {
                function: function.to_string(),
                entries,
                bytes,
            });
        }
        Ok(stats)
    }
}

/// Write `bytes` to `dir/name` through a sibling temp file and a rename
fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> Result<()> {
    let target = dir.join(name);
    let tmp = dir.join(format!(".{name}.tmp"));
    fs::write(&tmp, bytes).map_err(|e| Error::io(e, &tmp, "write"))?;
    fs::rename(&tmp, &target).map_err(|e| Error::io(e, &target, "rename"))
}

fn write_timestamp(entry_dir: &Path) -> Result<DateTime<Utc>> {
    let now = Utc::now();
    let text = now.to_rfc3339_opts(SecondsFormat::Nanos, true);
    write_atomic(entry_dir, TIMESTAMP_FILE, text.as_bytes())?;
    Ok(now)
}

fn read_timestamp(entry_dir: &Path) -> Option<DateTime<Utc>> {
    let text = fs::read_to_string(entry_dir.join(TIMESTAMP_FILE)).ok()?;
    DateTime::parse_from_rfc3339(text.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn modified_time(path: &Path) -> Option<DateTime<Utc>> {
    let modified: SystemTime = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    Some(modified.into())
}
