//! Creation, polling and background execution of job records

use crate::computation::JobComputation;
use crate::runner::TaskRunner;
use crate::store::JobStore;
use crate::{Error, JobKind, JobPoll, JobRecord, JobSubject, Result};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Front door for one job kind.
///
/// `get_or_create` is the only way records come into existence; the worker
/// it enqueues moves the record out of RUNNING exactly once. A reload starts
/// a new attempt, and outcomes of earlier attempts are dropped.
pub struct JobManager<C> {
    store: Arc<dyn JobStore>,
    runner: TaskRunner,
    computation: Arc<C>,
}

impl<C> Clone for JobManager<C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            runner: self.runner.clone(),
            computation: Arc::clone(&self.computation),
        }
    }
}

impl<C: JobComputation> JobManager<C> {
    /// Manager for `computation`, persisting to `store` and running on `runner`
    pub fn new(store: Arc<dyn JobStore>, runner: TaskRunner, computation: C) -> Self {
        Self {
            store,
            runner,
            computation: Arc::new(computation),
        }
    }

    /// Kind of the managed records
    pub fn kind(&self) -> JobKind {
        self.computation.kind()
    }

    /// Backing store
    #[must_use]
    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Worker pool
    #[must_use]
    pub const fn runner(&self) -> &TaskRunner {
        &self.runner
    }

    /// Return the record for `subject`, creating it if needed.
    ///
    /// A new record starts RUNNING and a worker is enqueued for it, unless the
    /// result is trivial (a genome compared with itself), in which case it is
    /// stored DONE right away. Returns whether the record was created.
    pub async fn get_or_create(&self, subject: JobSubject) -> Result<(JobRecord, bool)> {
        let kind = self.kind();
        subject.validate_for(kind)?;

        if let Some(output) = self.computation.trivial_output(&subject) {
            return self
                .store
                .insert_if_absent(JobRecord::done(kind, subject, output))
                .await;
        }

        let (record, created) = self
            .store
            .insert_if_absent(JobRecord::running(kind, subject.clone()))
            .await?;
        if created {
            tracing::info!(%kind, id = %record.id(), "Created job");
            self.spawn(subject, record.attempt);
        }
        Ok((record, created))
    }

    /// Current record for `subject`, without creating one
    pub async fn get(&self, subject: &JobSubject) -> Result<Option<JobRecord>> {
        self.store.get(self.kind(), &subject.id()).await
    }

    /// What a caller waiting on `subject` should do next
    pub async fn poll(&self, subject: &JobSubject) -> Result<JobPoll> {
        Ok(self.get(subject).await?.into())
    }

    /// Recompute `subject` from scratch.
    ///
    /// The record is reset to RUNNING (created if missing), its result and
    /// message are cleared and a new worker is enqueued.
    pub async fn reload(&self, subject: JobSubject) -> Result<JobRecord> {
        let kind = self.kind();
        subject.validate_for(kind)?;
        let record = self.store.reset(kind, &subject).await?;
        tracing::info!(%kind, id = %record.id(), attempt = record.attempt, "Reloading job");

        if let Some(output) = self.computation.trivial_output(&subject) {
            return self
                .store
                .complete(kind, &record.id(), record.attempt, output)
                .await;
        }
        self.spawn(subject, record.attempt);
        Ok(record)
    }

    fn spawn(&self, subject: JobSubject, attempt: u32) {
        let store = Arc::clone(&self.store);
        let computation = Arc::clone(&self.computation);
        let name = format!("{}:{}#{attempt}", self.kind(), subject.id());
        self.runner.enqueue(name, async move {
            execute(store.as_ref(), computation.as_ref(), &subject, attempt).await;
        });
    }
}

/// Worker body: run the computation and record the outcome for `attempt`.
///
/// Guarded transitions that find the record already moved on, or reloaded
/// into a later attempt, are logged and otherwise ignored.
async fn execute<C: JobComputation>(
    store: &dyn JobStore,
    computation: &C,
    subject: &JobSubject,
    attempt: u32,
) {
    let kind = computation.kind();
    let id = subject.id();
    tracing::info!(%kind, %id, attempt, "Starting job");

    match computation.compute(subject).await {
        Ok(output) => match store.complete(kind, &id, attempt, output).await {
            Ok(_) => tracing::info!(%kind, %id, "Job done"),
            Err(e) if e.is_stale_transition() => {
                tracing::warn!(%kind, %id, error = %e, "Discarding result of superseded job");
            }
            Err(e) => tracing::error!(%kind, %id, error = %e, "Failed to store job result"),
        },
        Err(cause) => {
            tracing::error!(%kind, %id, error = %cause, "Job failed");
            match store.fail(kind, &id, attempt, cause.to_string()).await {
                Ok(_) => {}
                Err(e) if e.is_stale_transition() => {
                    tracing::info!(%kind, %id, attempt, "Job superseded, dropping its failure");
                }
                Err(e) => tracing::error!(%kind, %id, error = %e, "Failed to record job failure"),
            }
        }
    }
}

/// Insert pre-computed records.
///
/// Subjects are validated for their kind. Without `ignore_conflicts`, any
/// identity already present (in the store or twice in `records`) fails the
/// whole batch before anything is written. Returns how many records were
/// inserted.
pub async fn bulk_insert(
    store: &dyn JobStore,
    records: Vec<JobRecord>,
    ignore_conflicts: bool,
) -> Result<usize> {
    let mut seen = BTreeSet::new();
    for record in &records {
        record.subject.validate_for(record.kind)?;
        let fresh = seen.insert((record.kind, record.id()));
        if ignore_conflicts {
            continue;
        }
        if !fresh || store.get(record.kind, &record.id()).await?.is_some() {
            return Err(Error::Conflict {
                kind: record.kind,
                id: record.id(),
            });
        }
    }

    let mut inserted = 0;
    for record in records {
        let (kind, id) = (record.kind, record.id());
        let (_, created) = store.insert_if_absent(record).await?;
        if created {
            inserted += 1;
        } else if ignore_conflicts {
            tracing::debug!(%kind, %id, "Skipping existing record");
        } else {
            return Err(Error::Conflict { kind, id });
        }
    }
    tracing::info!(inserted, "Bulk insert finished");
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryJobStore;
    use crate::{GenomeId, GenomePair, JobOutput, JobStatus};
    use async_trait::async_trait;

    struct Fails;

    #[async_trait]
    impl JobComputation for Fails {
        fn kind(&self) -> JobKind {
            JobKind::Ani
        }

        async fn compute(&self, _subject: &JobSubject) -> Result<JobOutput> {
            Err(Error::tool("orthoani", "exit status 1"))
        }
    }

    fn pair(a: &str, b: &str) -> JobSubject {
        GenomePair::new(GenomeId::new(a).unwrap(), GenomeId::new(b).unwrap()).into()
    }

    #[tokio::test]
    async fn failure_is_recorded_with_message() {
        let manager = JobManager::new(Arc::new(MemoryJobStore::new()), TaskRunner::new(1), Fails);
        let (record, created) = manager.get_or_create(pair("a", "b")).await.unwrap();
        assert!(created);
        assert_eq!(record.status, JobStatus::Running);

        manager.runner().wait_idle().await;
        match manager.poll(&pair("b", "a")).await.unwrap() {
            JobPoll::Failed(Some(message)) => assert!(message.contains("exit status 1")),
            other => panic!("unexpected poll result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn late_failure_keeps_done_record() {
        let store = MemoryJobStore::new();
        let subject = pair("a", "b");
        store
            .insert_if_absent(JobRecord::running(JobKind::Ani, subject.clone()))
            .await
            .unwrap();
        store
            .complete(JobKind::Ani, &subject.id(), 0, JobOutput::Similarity(0.9))
            .await
            .unwrap();

        execute(&store, &Fails, &subject, 0).await;

        let record = store.get(JobKind::Ani, &subject.id()).await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Done);
        assert_eq!(record.message, None);
    }

    #[tokio::test]
    async fn set_subject_is_rejected_for_pairwise_kind() {
        let manager = JobManager::new(Arc::new(MemoryJobStore::new()), TaskRunner::new(1), Fails);
        let set = crate::GenomeSet::new(["a", "b"].map(|s| GenomeId::new(s).unwrap()));
        assert!(matches!(
            manager.get_or_create(set.into()).await,
            Err(Error::InvalidSubject { .. })
        ));
    }

    #[tokio::test]
    async fn bulk_insert_conflicts() {
        let store = MemoryJobStore::new();
        let record = |a, b, v| JobRecord::done(JobKind::Ani, pair(a, b), JobOutput::Similarity(v));

        assert_eq!(
            bulk_insert(&store, vec![record("a", "b", 0.9)], false)
                .await
                .unwrap(),
            1
        );

        // One conflict fails the batch before anything is written
        let err = bulk_insert(&store, vec![record("a", "c", 0.8), record("b", "a", 0.1)], false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
        assert!(store.get(JobKind::Ani, "a:c").await.unwrap().is_none());

        let inserted = bulk_insert(&store, vec![record("a", "c", 0.8), record("b", "a", 0.1)], true)
            .await
            .unwrap();
        assert_eq!(inserted, 1);
        let kept = store.get(JobKind::Ani, "a:b").await.unwrap().unwrap();
        assert_eq!(kept.result(), Some(&JobOutput::Similarity(0.9)));
    }
}
