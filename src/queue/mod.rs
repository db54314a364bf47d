//! Job Queue
//!
//! Sequential scheduler for interactive jobs. Enqueued ids wait in a FIFO;
//! a single drain task runs them one at a time and stops when the list is
//! empty. The next enqueue after that starts a fresh drain task.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let queue = JobQueue::new(executor, store, broadcaster);
//! let position = queue.enqueue(&job.id).await?;
//! queue.wait_until_idle().await;
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;

use crate::events::{Broadcaster, Event};
use crate::jobs::{JobExecutor, JobOutcome, JobStatus, JobUpdate};
use crate::storage::{JobStore, StoreError};

/// Queue errors
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Job already in queue: {0}")]
    DuplicateJob(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job store error: {0}")]
    Store(#[from] StoreError),
}

/// Point-in-time view of the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    pub pending: Vec<String>,
    pub active: Option<String>,
    pub draining: bool,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<String>,
    /// Set only while draining, to the id most recently taken off `pending`
    active: Option<String>,
    draining: bool,
}

/// Single-flight FIFO of job ids
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    state: Mutex<QueueState>,
    executor: JobExecutor,
    store: Arc<dyn JobStore>,
    broadcaster: Broadcaster,
    /// Mirrors `QueueState::draining`, for waiters
    draining: watch::Sender<bool>,
}

impl JobQueue {
    pub fn new(executor: JobExecutor, store: Arc<dyn JobStore>, broadcaster: Broadcaster) -> Self {
        let (draining, _) = watch::channel(false);
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState::default()),
                executor,
                store,
                broadcaster,
                draining,
            }),
        }
    }

    /// Append a job and start draining if idle.
    ///
    /// Returns the 1-based position in the pending list. An id already
    /// pending is rejected and the queue is left untouched; the id of the
    /// running job may be queued again.
    pub async fn enqueue(&self, job_id: &str) -> Result<usize, QueueError> {
        if self.inner.store.get(job_id).await?.is_none() {
            return Err(QueueError::JobNotFound(job_id.to_string()));
        }

        let (position, start_drain) = {
            let mut state = self.inner.state.lock();
            if state.pending.iter().any(|id| id == job_id) {
                return Err(QueueError::DuplicateJob(job_id.to_string()));
            }
            state.pending.push_back(job_id.to_string());

            let start_drain = !state.draining;
            if start_drain {
                state.draining = true;
                self.inner.draining.send_replace(true);
            }
            (state.pending.len(), start_drain)
        };

        tracing::info!(job_id, queue_length = position, "Job enqueued");
        self.inner.broadcaster.broadcast(&Event::QueueUpdate {
            queue_length: position,
        });

        if start_drain {
            tokio::spawn(self.clone().drain());
        }
        Ok(position)
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.inner.state.lock();
        QueueSnapshot {
            pending: state.pending.iter().cloned().collect(),
            active: state.active.clone(),
            draining: state.draining,
        }
    }

    pub fn pending_len(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn is_draining(&self) -> bool {
        self.inner.state.lock().draining
    }

    /// Resolve once no drain task is running
    pub async fn wait_until_idle(&self) {
        let mut rx = self.inner.draining.subscribe();
        // The sender lives as long as `self`
        let _ = rx.wait_for(|draining| !*draining).await;
    }

    async fn drain(self) {
        tracing::debug!("Drain started");
        loop {
            let (job_id, remaining) = {
                let mut state = self.inner.state.lock();
                match state.pending.pop_front() {
                    Some(job_id) => {
                        state.active = Some(job_id.clone());
                        (job_id, state.pending.len())
                    }
                    None => {
                        state.active = None;
                        state.draining = false;
                        self.inner.draining.send_replace(false);
                        break;
                    }
                }
            };

            self.inner.broadcaster.broadcast(&Event::QueueUpdate {
                queue_length: remaining,
            });
            self.run_job(&job_id).await;
        }
        tracing::debug!("Drain finished");
    }

    /// Run one job to a terminal state. Never fails; every outcome is
    /// persisted and announced.
    async fn run_job(&self, job_id: &str) {
        let started = self
            .inner
            .store
            .update(job_id, JobUpdate::status(JobStatus::Running).with_progress(0))
            .await;

        let job = match started {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::warn!(job_id, "Job disappeared before it could start");
                self.announce_not_started(job_id, "Job not found");
                return;
            }
            Err(e) => {
                tracing::error!(job_id, "Failed to mark job running: {}", e);
                self.announce_not_started(job_id, "Processing could not start");
                return;
            }
        };

        tracing::info!(job_id, files = job.files.len(), mode = %job.mode, "Job started");
        self.inner.broadcaster.broadcast(&Event::JobStatus {
            job_id: job_id.to_string(),
            status: JobStatus::Running,
            progress: 0,
        });

        let outcome = match self.inner.executor.execute(&job).await {
            Ok(report) => JobOutcome::classify(report),
            Err(e) => JobOutcome::unexpected(&job, &e),
        };

        match outcome.status {
            JobStatus::Failed => tracing::warn!(job_id, "Job failed"),
            status => tracing::info!(job_id, ?status, "Job finished"),
        }

        if let Err(e) = self.inner.store.update(job_id, outcome.to_update()).await {
            tracing::error!(job_id, "Failed to persist job outcome: {}", e);
        }
        self.inner.broadcaster.broadcast(&outcome.event(job_id));
    }

    /// Terminal event for a dequeued job that never ran
    fn announce_not_started(&self, job_id: &str, error: &str) {
        self.inner.broadcaster.broadcast(&Event::JobError {
            job_id: job_id.to_string(),
            error: error.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{FileEntry, FileResult, JobRecord};
    use crate::ocr::{Extractor, OcrMode, ScriptedEngine};
    use crate::pdf::BlankRasterizer;
    use crate::storage::{FileStore, JsonJobStore};
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        store: Arc<JsonJobStore>,
        files: FileStore,
        broadcaster: Broadcaster,
        queue: JobQueue,
    }

    async fn harness(engine: ScriptedEngine) -> Harness {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonJobStore::open(dir.path()).await.unwrap());
        let files = FileStore::new(dir.path());
        let broadcaster = Broadcaster::new();
        let executor = JobExecutor::new(
            store.clone(),
            files.clone(),
            Extractor::new(Arc::new(engine)),
            Arc::new(BlankRasterizer::with_pages(2)),
            broadcaster.clone(),
            "auto",
        );
        let queue = JobQueue::new(executor, store.clone(), broadcaster.clone());
        Harness {
            _dir: dir,
            store,
            files,
            broadcaster,
            queue,
        }
    }

    impl Harness {
        /// Create a job whose files exist only if listed in `present`
        async fn job(&self, names: &[&str], present: &[&str]) -> JobRecord {
            let files = names.iter().map(|n| FileEntry::new(n, 1)).collect();
            let job = JobRecord::new("img", files, OcrMode::TextOnly, "cpu");
            self.files.create_job_dirs(&job.id).await.unwrap();
            for name in present {
                let path = self.files.upload_path(&job.id, name).unwrap();
                RgbImage::from_pixel(8, 8, Rgb([0, 0, 0])).save(path).unwrap();
            }
            self.store.create(job).await.unwrap()
        }

        async fn stored(&self, id: &str) -> JobRecord {
            self.store.get(id).await.unwrap().unwrap()
        }
    }

    fn kinds(listener: &mut crate::events::Listener) -> Vec<(String, serde_json::Value)> {
        let mut out = Vec::new();
        while let Ok(msg) = listener.receiver.try_recv() {
            let value: serde_json::Value = serde_json::from_str(&msg).unwrap();
            out.push((value["type"].as_str().unwrap().to_string(), value));
        }
        out
    }

    #[tokio::test]
    async fn test_unknown_job_is_rejected() {
        let h = harness(ScriptedEngine::new("x")).await;
        assert!(matches!(
            h.queue.enqueue("nope").await,
            Err(QueueError::JobNotFound(_))
        ));
        assert!(!h.queue.is_draining());
    }

    #[tokio::test]
    async fn test_duplicate_pending_job_is_rejected() {
        let h = harness(ScriptedEngine::new("x")).await;
        let first = h.job(&["a.png"], &["a.png"]).await;
        let second = h.job(&["b.png"], &["b.png"]).await;

        // The drain task cannot run before this test yields, so `first`
        // is still pending when `second` and the duplicate arrive
        assert_eq!(h.queue.enqueue(&first.id).await.unwrap(), 1);
        assert_eq!(h.queue.enqueue(&second.id).await.unwrap(), 2);
        let duplicate = h.queue.enqueue(&second.id).await;

        assert!(matches!(duplicate, Err(QueueError::DuplicateJob(_))));
        assert_eq!(h.queue.pending_len(), 2);

        h.queue.wait_until_idle().await;
        assert_eq!(h.stored(&first.id).await.status, JobStatus::Completed);
        assert_eq!(h.stored(&second.id).await.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_jobs_run_in_fifo_order() {
        let h = harness(ScriptedEngine::new("x")).await;
        let mut listener = h.broadcaster.register();
        let jobs = [
            h.job(&["a.png"], &["a.png"]).await,
            h.job(&["b.png"], &["b.png"]).await,
            h.job(&["c.png"], &["c.png"]).await,
        ];
        for job in &jobs {
            h.queue.enqueue(&job.id).await.unwrap();
        }
        h.queue.wait_until_idle().await;

        let events = kinds(&mut listener);
        let started: Vec<&str> = events
            .iter()
            .filter(|(kind, _)| kind == "job_status")
            .map(|(_, v)| v["job_id"].as_str().unwrap())
            .collect();
        let expected: Vec<&str> = jobs.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(started, expected);

        // One job runs at a time: every start follows the previous job's end
        let order: Vec<&str> = events
            .iter()
            .filter(|(kind, _)| kind == "job_status" || kind == "job_complete")
            .map(|(kind, _)| kind.as_str())
            .collect();
        assert_eq!(
            order,
            vec!["job_status", "job_complete", "job_status", "job_complete", "job_status", "job_complete"]
        );
    }

    #[tokio::test]
    async fn test_partial_failure_completes_with_warnings() {
        let h = harness(ScriptedEngine::new("text")).await;
        let mut listener = h.broadcaster.register();
        let job = h.job(&["a.png", "gone.png", "c.png"], &["a.png", "c.png"]).await;

        h.queue.enqueue(&job.id).await.unwrap();
        h.queue.wait_until_idle().await;

        let stored = h.stored(&job.id).await;
        assert_eq!(stored.status, JobStatus::CompletedWithWarnings);
        assert_eq!(stored.progress, 100);
        assert_eq!(stored.per_file_results.len(), 2);
        assert!(!stored.per_file_results.contains_key(&job.files[1].id));
        assert!(matches!(
            stored.per_file_results.get(&job.files[0].id),
            Some(FileResult::Image(_))
        ));
        assert!(stored.warning.as_deref().unwrap().contains("gone.png"));

        let events = kinds(&mut listener);
        let (kind, last) = events.last().unwrap();
        assert_eq!(kind, "job_complete");
        assert_eq!(last["status"], "completed-with-warnings");
        assert!(last["warning"].as_str().unwrap().contains("gone.png"));
    }

    #[tokio::test]
    async fn test_total_failure_clears_results() {
        let h = harness(ScriptedEngine::new("x").then_fail("oom").then_fail("oom")).await;
        let mut listener = h.broadcaster.register();
        let job = h.job(&["a.png", "b.png"], &["a.png", "b.png"]).await;

        h.queue.enqueue(&job.id).await.unwrap();
        h.queue.wait_until_idle().await;

        let stored = h.stored(&job.id).await;
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.progress, 0);
        assert!(stored.per_file_results.is_empty());

        let events = kinds(&mut listener);
        let (kind, last) = events.last().unwrap();
        assert_eq!(kind, "job_error");
        assert_eq!(last["error"], "All files failed: a.png, b.png");
        // Engine detail never reaches the push channel
        assert!(!last["error"].as_str().unwrap().contains("oom"));
    }

    #[tokio::test]
    async fn test_drain_restarts_after_idle() {
        let h = harness(ScriptedEngine::new("x")).await;
        let first = h.job(&["a.png"], &["a.png"]).await;
        h.queue.enqueue(&first.id).await.unwrap();
        h.queue.wait_until_idle().await;

        let snapshot = h.queue.snapshot();
        assert_eq!(
            snapshot,
            QueueSnapshot {
                pending: vec![],
                active: None,
                draining: false
            }
        );

        // A finished job may be queued again and a new drain picks it up
        assert_eq!(h.queue.enqueue(&first.id).await.unwrap(), 1);
        assert!(h.queue.is_draining());
        h.queue.wait_until_idle().await;
        assert_eq!(h.stored(&first.id).await.status, JobStatus::Completed);
        assert!(h.queue.snapshot().active.is_none());
    }

    #[tokio::test]
    async fn test_job_deleted_while_pending_gets_terminal_event() {
        let h = harness(ScriptedEngine::new("x")).await;
        let mut listener = h.broadcaster.register();
        let job = h.job(&["a.png"], &["a.png"]).await;

        // Removed before the drain task gets to run
        h.queue.enqueue(&job.id).await.unwrap();
        assert!(h.store.delete(&job.id).await.unwrap());
        h.queue.wait_until_idle().await;

        let events = kinds(&mut listener);
        assert!(events.iter().all(|(kind, _)| kind != "job_status"));
        let (kind, last) = events.last().unwrap();
        assert_eq!(kind, "job_error");
        assert_eq!(last["job_id"], job.id.as_str());
        assert_eq!(last["error"], "Job not found");
    }

    #[tokio::test]
    async fn test_queue_update_events() {
        let h = harness(ScriptedEngine::new("x")).await;
        let mut listener = h.broadcaster.register();
        let a = h.job(&["a.png"], &["a.png"]).await;
        let b = h.job(&["b.png"], &["b.png"]).await;

        h.queue.enqueue(&a.id).await.unwrap();
        h.queue.enqueue(&b.id).await.unwrap();
        h.queue.wait_until_idle().await;

        let lengths: Vec<u64> = kinds(&mut listener)
            .into_iter()
            .filter(|(kind, _)| kind == "queue_update")
            .map(|(_, v)| v["queue_length"].as_u64().unwrap())
            .collect();
        // Two enqueues, then two dequeues
        assert_eq!(lengths, vec![1, 2, 1, 0]);
    }
}
