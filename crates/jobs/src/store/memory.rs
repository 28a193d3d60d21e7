//! In-process job store

use super::JobStore;
use crate::{Error, JobKind, JobOutput, JobRecord, JobStatus, JobSubject, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

type Records = BTreeMap<(JobKind, String), JobRecord>;

/// Job records kept in memory; lost when the process exits
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    records: Mutex<Records>,
}

impl MemoryJobStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn modify<F>(&self, kind: JobKind, id: &str, apply: F) -> Result<JobRecord>
    where
        F: FnOnce(&mut JobRecord) -> Result<()> + Send,
    {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(&(kind, id.to_string()))
            .ok_or_else(|| Error::not_found(kind, id))?;
        let mut updated = record.clone();
        apply(&mut updated)?;
        *record = updated.clone();
        Ok(updated)
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn get(&self, kind: JobKind, id: &str) -> Result<Option<JobRecord>> {
        Ok(self.records.lock().await.get(&(kind, id.to_string())).cloned())
    }

    async fn insert_if_absent(&self, record: JobRecord) -> Result<(JobRecord, bool)> {
        let mut records = self.records.lock().await;
        let slot = (record.kind, record.id());
        if let Some(existing) = records.get(&slot) {
            return Ok((existing.clone(), false));
        }
        records.insert(slot, record.clone());
        Ok((record, true))
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
        let mut records = self.records.lock().await;
        let record = records
            .entry((kind, subject.id()))
            .or_insert_with(|| JobRecord::running(kind, subject.clone()));
        record.reset();
        Ok(record.clone())
    }

    async fn delete(&self, kind: JobKind, id: &str) -> Result<bool> {
        Ok(self
            .records
            .lock()
            .await
            .remove(&(kind, id.to_string()))
            .is_some())
    }

    async fn list(&self, kind: JobKind, status: Option<JobStatus>) -> Result<Vec<JobRecord>> {
        Ok(self
            .records
            .lock()
            .await
            .values()
            .filter(|r| r.kind == kind && status.is_none_or(|s| r.status == s))
            .cloned()
            .collect())
    }

    async fn purge(&self, kind: JobKind, status: JobStatus) -> Result<usize> {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, r| !(r.kind == kind && r.status == status));
        Ok(before - records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::super::contract;
    use super::*;

    #[tokio::test]
    async fn insert_is_first_writer_wins() {
        contract::insert_is_first_writer_wins(&MemoryJobStore::new()).await;
    }

    #[tokio::test]
    async fn transitions_are_guarded() {
        contract::transitions_are_guarded(&MemoryJobStore::new()).await;
    }

    #[tokio::test]
    async fn superseded_attempt_is_refused() {
        contract::superseded_attempt_is_refused(&MemoryJobStore::new()).await;
    }

    #[tokio::test]
    async fn missing_records() {
        contract::missing_records(&MemoryJobStore::new()).await;
    }

    #[tokio::test]
    async fn list_and_purge() {
        contract::list_and_purge(&MemoryJobStore::new()).await;
    }
}
