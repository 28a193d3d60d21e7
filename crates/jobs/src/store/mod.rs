//! Persistence of job records
//!
//! Every state change is a compare-and-set on one record: the store reads the
//! current record, applies the guarded transition and writes it back without
//! another writer interleaving. Workers finish a record by naming the attempt
//! they were started for, so an outcome from before a reset is refused.

mod file;
mod memory;

pub use file::FileJobStore;
pub use memory::MemoryJobStore;

use crate::{JobKind, JobOutput, JobRecord, JobStatus, JobSubject, Result};
use async_trait::async_trait;

/// Storage backend for job records
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Record with identity `id`, if any
    async fn get(&self, kind: JobKind, id: &str) -> Result<Option<JobRecord>>;

    /// Store `record` unless its identity is taken.
    ///
    /// Returns the stored record and whether `record` was inserted.
    async fn insert_if_absent(&self, record: JobRecord) -> Result<(JobRecord, bool)>;

    /// RUNNING → DONE with `output`, if the record is still at `attempt`
    async fn complete(
        &self,
        kind: JobKind,
        id: &str,
        attempt: u32,
        output: JobOutput,
    ) -> Result<JobRecord>;

    /// RUNNING or FAILED → FAILED with `message`, if the record is still at
    /// `attempt`; DONE records are refused
    async fn fail(
        &self,
        kind: JobKind,
        id: &str,
        attempt: u32,
        message: String,
    ) -> Result<JobRecord>;

    /// Any state → RUNNING under a new attempt, creating the record if it is missing
    async fn reset(&self, kind: JobKind, subject: &JobSubject) -> Result<JobRecord>;

    /// Delete one record; returns whether it existed
    async fn delete(&self, kind: JobKind, id: &str) -> Result<bool>;

    /// All records of `kind`, optionally only those in `status`
    async fn list(&self, kind: JobKind, status: Option<JobStatus>) -> Result<Vec<JobRecord>>;

    /// Delete all records of `kind` in `status`; returns how many were removed
    async fn purge(&self, kind: JobKind, status: JobStatus) -> Result<usize>;
}
