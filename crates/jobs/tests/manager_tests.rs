//! End-to-end behavior of job creation, execution and reload
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use async_trait::async_trait;
use ogb_jobs::matrix::similarity_progress;
use ogb_jobs::{
    Error, FileJobStore, GenomeId, GenomePair, JobComputation, JobKind, JobManager, JobOutput,
    JobPoll, JobStatus, JobStore, JobSubject, MemoryJobStore, Result, TaskRunner,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

/// Similarity derived from the identifiers; fails the first `failures` calls
struct Scripted {
    calls: Arc<AtomicUsize>,
    failures: usize,
}

impl Scripted {
    fn new(failures: usize) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                calls: Arc::clone(&calls),
                failures,
            },
            calls,
        )
    }
}

#[async_trait]
impl JobComputation for Scripted {
    fn kind(&self) -> JobKind {
        JobKind::GenomeSimilarity
    }

    async fn compute(&self, subject: &JobSubject) -> Result<JobOutput> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(Error::tool("GenDisCal", format!("attempt {call} crashed")));
        }
        let pair = subject.as_pair().expect("pairwise subject");
        #[allow(clippy::cast_precision_loss)]
        let len = (pair.first().as_str().len() + pair.second().as_str().len()) as f64;
        Ok(JobOutput::Similarity(1.0 / len))
    }
}

/// Call `n` waits for `gates[n]`; the first call then fails, later ones succeed
struct Gated {
    calls: AtomicUsize,
    gates: Vec<Arc<Notify>>,
}

#[async_trait]
impl JobComputation for Gated {
    fn kind(&self) -> JobKind {
        JobKind::Ani
    }

    async fn compute(&self, _subject: &JobSubject) -> Result<JobOutput> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.gates[call].notified().await;
        if call == 0 {
            Err(Error::tool("OrthoANI", "first attempt crashed"))
        } else {
            Ok(JobOutput::Similarity(0.9))
        }
    }
}

fn gid(s: &str) -> GenomeId {
    GenomeId::new(s).unwrap()
}

fn pair(a: &str, b: &str) -> JobSubject {
    GenomePair::new(gid(a), gid(b)).into()
}

fn memory_manager(failures: usize) -> (JobManager<Scripted>, Arc<AtomicUsize>) {
    let (computation, calls) = Scripted::new(failures);
    let manager = JobManager::new(Arc::new(MemoryJobStore::new()), TaskRunner::new(2), computation);
    (manager, calls)
}

#[tokio::test]
async fn reversed_pair_reuses_record() {
    let (manager, calls) = memory_manager(0);

    let (first, created) = manager.get_or_create(pair("b", "a")).await.unwrap();
    assert!(created);
    let (second, created) = manager.get_or_create(pair("a", "b")).await.unwrap();
    assert!(!created);
    assert_eq!(first.id(), second.id());
    assert_eq!(first.id(), "a:b");

    manager.runner().wait_idle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        manager.poll(&pair("a", "b")).await.unwrap(),
        JobPoll::Ready(JobOutput::Similarity(0.5))
    );
}

#[tokio::test]
async fn self_similarity_is_done_without_tool() {
    let (manager, calls) = memory_manager(0);

    let (record, created) = manager.get_or_create(pair("a", "a")).await.unwrap();
    assert!(created);
    assert_eq!(record.status, JobStatus::Done);
    assert_eq!(record.result(), Some(&JobOutput::Similarity(1.0)));

    manager.runner().wait_idle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_job_can_be_reloaded() {
    let (manager, calls) = memory_manager(1);
    let subject = pair("x", "yy");

    manager.get_or_create(subject.clone()).await.unwrap();
    manager.runner().wait_idle().await;
    let record = manager.get(&subject).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert!(record.message.unwrap().contains("attempt 0 crashed"));

    // A failed record is terminal until reloaded
    let (again, created) = manager.get_or_create(subject.clone()).await.unwrap();
    assert!(!created);
    assert_eq!(again.status, JobStatus::Failed);

    let reloaded = manager.reload(subject.clone()).await.unwrap();
    assert_eq!(reloaded.status, JobStatus::Running);
    assert_eq!(reloaded.message, None);
    manager.runner().wait_idle().await;

    let record = manager.get(&subject).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Done);
    assert_eq!(record.message, None);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn late_failure_of_replaced_attempt_is_dropped() {
    let gates = vec![Arc::new(Notify::new()), Arc::new(Notify::new())];
    let computation = Gated {
        calls: AtomicUsize::new(0),
        gates: gates.clone(),
    };
    let manager = JobManager::new(Arc::new(MemoryJobStore::new()), TaskRunner::new(2), computation);
    let subject = pair("a", "b");

    manager.get_or_create(subject.clone()).await.unwrap();
    let reloaded = manager.reload(subject.clone()).await.unwrap();
    assert_eq!(reloaded.attempt, 1);

    // First worker fails after the reload, then the reloaded one succeeds
    gates[0].notify_one();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let record = manager.get(&subject).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Running);
    gates[1].notify_one();
    manager.runner().wait_idle().await;

    let record = manager.get(&subject).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Done);
    assert_eq!(record.result(), Some(&JobOutput::Similarity(0.9)));
    assert_eq!(record.message, None);
}

#[tokio::test]
async fn reload_creates_missing_record() {
    let (manager, _) = memory_manager(0);
    assert_eq!(manager.poll(&pair("a", "b")).await.unwrap(), JobPoll::Missing);

    manager.reload(pair("a", "b")).await.unwrap();
    manager.runner().wait_idle().await;
    assert!(matches!(
        manager.poll(&pair("a", "b")).await.unwrap(),
        JobPoll::Ready(_)
    ));
}

#[tokio::test]
async fn purge_removes_failed_records_only() {
    let (manager, _) = memory_manager(1);
    manager.get_or_create(pair("a", "b")).await.unwrap();
    manager.runner().wait_idle().await;
    manager.get_or_create(pair("a", "c")).await.unwrap();
    manager.runner().wait_idle().await;

    let removed = manager
        .store()
        .purge(JobKind::GenomeSimilarity, JobStatus::Failed)
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(manager.poll(&pair("a", "b")).await.unwrap(), JobPoll::Missing);
    assert!(matches!(
        manager.poll(&pair("a", "c")).await.unwrap(),
        JobPoll::Ready(_)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_compute_once() {
    let tmp = TempDir::new().unwrap();
    let (computation, calls) = Scripted::new(0);
    let manager = JobManager::new(
        Arc::new(FileJobStore::new(tmp.path())),
        TaskRunner::new(4),
        computation,
    );

    let mut handles = Vec::new();
    for i in 0..8 {
        let manager = manager.clone();
        let subject = if i % 2 == 0 { pair("a", "b") } else { pair("b", "a") };
        handles.push(tokio::spawn(async move {
            manager.get_or_create(subject).await.unwrap().1
        }));
    }
    let mut created = 0;
    for handle in handles {
        if handle.await.unwrap() {
            created += 1;
        }
    }
    assert_eq!(created, 1);

    manager.runner().wait_idle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // The record is visible to another store over the same directory
    let other = FileJobStore::new(tmp.path());
    let record = other
        .get(JobKind::GenomeSimilarity, "a:b")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, JobStatus::Done);
}

#[tokio::test]
async fn similarity_matrix_completes_after_workers_finish() {
    let (manager, calls) = memory_manager(0);
    let genomes = ["ccc", "a", "bb", "a"].map(gid);

    let first = similarity_progress(&manager, genomes.clone()).await.unwrap();
    assert_eq!(first.total, 3);
    assert_eq!(first.done + first.running, 3);

    manager.runner().wait_idle().await;
    let second = similarity_progress(&manager, genomes).await.unwrap();
    assert!(second.is_complete());
    assert_eq!(second.failed, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let matrix = second.matrix.unwrap();
    let labels: Vec<&str> = matrix.labels().iter().map(GenomeId::as_str).collect();
    assert_eq!(labels, ["a", "bb", "ccc"]);
    assert_eq!(matrix.distance(0, 0), Some(0.0));
    // a vs ccc: similarity 1/4
    assert_eq!(matrix.distance(0, 2), Some(0.75));
    assert_eq!(matrix.distance(2, 0), Some(0.75));
}
