//! Job records as JSON files, shared between processes
//!
//! ```text
//! <state_dir>/<kind>/<id>.json
//! <state_dir>/<kind>/.lock
//! ```
//!
//! Every read-modify-write of a kind holds an exclusive lock on its `.lock`
//! file. Records are written to a temp file and renamed into place, so
//! readers never see a partial record.

use super::JobStore;
use crate::tools::lock::lock_file;
use crate::{Error, JobKind, JobOutput, JobRecord, JobStatus, JobSubject, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;

const LOCK_FILE: &str = ".lock";
const EXTENSION: &str = "json";

/// File-backed job store
#[derive(Debug, Clone)]
pub struct FileJobStore {
    state_dir: PathBuf,
    // Tasks of this process queue here before taking the file lock
    local: Arc<Mutex<()>>,
}

impl FileJobStore {
    /// Store under `state_dir`, created on first write
    #[must_use]
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            local: Arc::new(Mutex::new(())),
        }
    }

    /// Root directory of the store
    #[must_use]
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    fn kind_dir(&self, kind: JobKind) -> PathBuf {
        self.state_dir.join(kind.as_str())
    }

    fn record_path(&self, kind: JobKind, id: &str) -> PathBuf {
        self.kind_dir(kind).join(format!("{id}.{EXTENSION}"))
    }

    /// Run `f` while holding the lock of `kind`
    async fn locked<T, F, Fut>(&self, kind: JobKind, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut + Send,
        Fut: std::future::Future<Output = Result<T>> + Send,
    {
        let _local = self.local.lock().await;
        let _file = lock_file(&self.kind_dir(kind).join(LOCK_FILE)).await?;
        f().await
    }

    async fn read(&self, kind: JobKind, id: &str) -> Result<Option<JobRecord>> {
        read_record(&self.record_path(kind, id)).await
    }

    async fn write(&self, record: &JobRecord) -> Result<()> {
        let path = self.record_path(record.kind, &record.id());
        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| Error::serialization(format!("Failed to serialize job record: {e}")))?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json)
            .await
            .map_err(|e| Error::io(e, &tmp, "write"))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::io(e, &path, "rename"))
    }

    async fn modify<F>(&self, kind: JobKind, id: &str, apply: F) -> Result<JobRecord>
    where
        F: FnOnce(&mut JobRecord) -> Result<()> + Send,
    {
        self.locked(kind, || async move {
            let mut record = self
                .read(kind, id)
                .await?
                .ok_or_else(|| Error::not_found(kind, id))?;
            apply(&mut record)?;
            self.write(&record).await?;
            Ok(record)
        })
        .await
    }

    async fn read_all(&self, kind: JobKind) -> Result<Vec<(PathBuf, JobRecord)>> {
        let dir = self.kind_dir(kind);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(e, &dir, "read_dir")),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::io(e, &dir, "read_dir"))?
        {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != EXTENSION) {
                continue;
            }
            match read_record(&path).await {
                Ok(Some(record)) => records.push((path, record)),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable job record");
                }
            }
        }
        records.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(records)
    }
}

async fn read_record(path: &Path) -> Result<Option<JobRecord>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io(e, path, "read")),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| Error::serialization(format!("Invalid job record {}: {e}", path.display())))
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn get(&self, kind: JobKind, id: &str) -> Result<Option<JobRecord>> {
        self.read(kind, id).await
    }

    async fn insert_if_absent(&self, record: JobRecord) -> Result<(JobRecord, bool)> {
        let kind = record.kind;
        self.locked(kind, || async move {
            if let Some(existing) = self.read(kind, &record.id()).await? {
                return Ok((existing, false));
            }
            self.write(&record).await?;
            Ok((record, true))
        })
        .await
    }

    async fn complete(
        &self,
        kind: JobKind,
        id: &str,
        attempt: u32,
        output: JobOutput,
    ) -> Result<JobRecord> {
        self.modify(kind, id, |r| r.complete(attempt, output)).await
    }

    async fn fail(
        &self,
        kind: JobKind,
        id: &str,
        attempt: u32,
        message: String,
    ) -> Result<JobRecord> {
        self.modify(kind, id, |r| r.fail(attempt, message)).await
    }

    async fn reset(&self, kind: JobKind, subject: &JobSubject) -> Result<JobRecord> {
        self.locked(kind, || async move {
            let mut record = self
                .read(kind, &subject.id())
                .await?
                .unwrap_or_else(|| JobRecord::running(kind, subject.clone()));
            record.reset();
            self.write(&record).await?;
            Ok(record)
        })
        .await
    }

    async fn delete(&self, kind: JobKind, id: &str) -> Result<bool> {
        let path = self.record_path(kind, id);
        self.locked(kind, || async move {
            match fs::remove_file(&path).await {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
                Err(e) => Err(Error::io(e, &path, "remove_file")),
            }
        })
        .await
    }

    async fn list(&self, kind: JobKind, status: Option<JobStatus>) -> Result<Vec<JobRecord>> {
        Ok(self
            .read_all(kind)
            .await?
            .into_iter()
            .map(|(_, record)| record)
            .filter(|r| status.is_none_or(|s| r.status == s))
            .collect())
    }

    async fn purge(&self, kind: JobKind, status: JobStatus) -> Result<usize> {
        self.locked(kind, || async move {
            let mut removed = 0;
            for (path, record) in self.read_all(kind).await? {
                if record.status != status {
                    continue;
                }
                match fs::remove_file(&path).await {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(Error::io(e, &path, "remove_file")),
                }
            }
            Ok(removed)
        })
        .await
    }
}
