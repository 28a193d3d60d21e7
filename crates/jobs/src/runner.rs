//! Bounded pool of background workers

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;

/// Default number of concurrent workers
pub const DEFAULT_WORKERS: usize = 4;

/// Runs enqueued jobs on the tokio runtime, at most `workers` at a time.
///
/// Enqueued work cannot be cancelled and has no timeout. Cloning shares the
/// pool.
#[derive(Debug, Clone)]
pub struct TaskRunner {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    workers: usize,
}

impl Default for TaskRunner {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}

impl TaskRunner {
    /// Pool with `workers` concurrent slots (at least one)
    #[must_use]
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            tracker: TaskTracker::new(),
            workers,
        }
    }

    /// Number of concurrent slots
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Jobs enqueued and not yet finished
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Schedule `job`; returns immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enqueue<F>(&self, name: impl Into<String>, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let permits = Arc::clone(&self.permits);
        tracing::debug!(job = %name, pending = self.pending() + 1, "Enqueued background job");
        self.tracker.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                tracing::warn!(job = %name, "Worker pool closed, dropping job");
                return;
            };
            job.await;
        });
    }

    /// Wait until every job enqueued so far has finished
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_is_bounded() {
        let runner = TaskRunner::new(2);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        for i in 0..8 {
            let (active, peak, done) = (Arc::clone(&active), Arc::clone(&peak), Arc::clone(&done));
            runner.enqueue(format!("job-{i}"), async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        runner.wait_idle().await;

        assert_eq!(done.load(Ordering::SeqCst), 8);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(runner.pending(), 0);
    }

    #[tokio::test]
    async fn reusable_after_wait() {
        let runner = TaskRunner::new(0);
        assert_eq!(runner.workers(), 1);
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let hits = Arc::clone(&hits);
            runner.enqueue("tick", async move {
                hits.fetch_add(1, Ordering::SeqCst);
            });
            runner.wait_idle().await;
        }
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
