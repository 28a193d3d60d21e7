//! Exclusive access to tools that must not run concurrently

use crate::{Error, Result};
use fs4::tokio::AsyncFileExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Open `path` and take an exclusive advisory lock on it.
///
/// Waiting for the lock happens on the blocking pool. The lock is released
/// when the returned file is dropped.
pub(crate) async fn lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io(e, parent, "create_dir_all"))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .await
        .map_err(|e| Error::io(e, path, "open"))?;

    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        file.lock_exclusive()
            .map(|()| file)
            .map_err(|e| Error::io(e, &owned, "lock_exclusive"))
    })
    .await
    .map_err(|e| Error::configuration(format!("Lock task failed: {e}")))?
}

/// Serializes access to a non-reentrant tool across tasks and processes.
///
/// Tasks of one process queue on an async mutex; processes sharing the
/// lock file queue on an exclusive file lock.
#[derive(Debug, Clone)]
pub struct ToolLock {
    local: Arc<Mutex<()>>,
    path: PathBuf,
}

/// Held while the tool runs
#[derive(Debug)]
pub struct ToolLockGuard {
    _file: File,
    _local: OwnedMutexGuard<()>,
}

impl ToolLock {
    /// Lock backed by the file at `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            local: Arc::new(Mutex::new(())),
            path: path.into(),
        }
    }

    /// The lock file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait until no other holder remains
    pub async fn acquire(&self) -> Result<ToolLockGuard> {
        let local = Arc::clone(&self.local).lock_owned().await;
        tracing::debug!(path = %self.path.display(), "Waiting for tool lock");
        let file = lock_file(&self.path).await?;
        Ok(ToolLockGuard {
            _file: file,
            _local: local,
        })
    }
}
