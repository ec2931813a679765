//! Task dispatch: hand stamped jobs to background workers.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use mealplan_db::models::JobKind;

use crate::fingerprint::Fingerprint;
use crate::preferences::Preferences;
use crate::worker::{GenerationWorker, WorkerError, WorkerOutcome};

/// One stamped generation job.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationTask {
    pub plan_id: Uuid,
    pub job_id: Uuid,
    pub kind: JobKind,
    pub preferences: Preferences,
    pub fingerprint: Fingerprint,
}

/// Fire-and-forget hand-off of generation tasks. Implementations must not
/// block the caller on the generation itself.
pub trait TaskDispatcher: Send + Sync {
    fn enqueue(&self, task: GenerationTask);
}

const _: () = {
    fn _assert_object_safe(_: &dyn TaskDispatcher) {}
};

/// Configuration for [`WorkerPool`].
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum number of generations running at once.
    pub max_concurrent: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { max_concurrent: 4 }
    }
}

/// Runs each task on its own tokio task, at most `max_concurrent` at a
/// time. Tasks beyond the limit wait for a permit.
pub struct WorkerPool {
    worker: Arc<GenerationWorker>,
    semaphore: Arc<Semaphore>,
    tracker: TaskTracker,
}

impl WorkerPool {
    pub fn new(worker: Arc<GenerationWorker>, config: &DispatcherConfig) -> Self {
        Self {
            worker,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            tracker: TaskTracker::new(),
        }
    }

    /// Number of spawned tasks that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for every task enqueued so far to finish. Tasks enqueued after
    /// this call still run but are not waited for.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        tracing::debug!("worker pool drained");
    }
}

impl TaskDispatcher for WorkerPool {
    fn enqueue(&self, task: GenerationTask) {
        let worker = Arc::clone(&self.worker);
        let semaphore = Arc::clone(&self.semaphore);

        tracing::debug!(plan_id = %task.plan_id, job_id = %task.job_id, kind = %task.kind, "enqueued generation");

        self.tracker.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                tracing::warn!(plan_id = %task.plan_id, "worker pool closed, dropping job");
                return;
            };

            match worker.run(&task).await {
                Ok(WorkerOutcome::Committed { .. }) => {}
                Ok(WorkerOutcome::Missing) | Ok(WorkerOutcome::Superseded) => {}
                Err(WorkerError::Generation { plan_id, source }) => {
                    tracing::warn!(
                        plan_id = %plan_id,
                        job_id = %task.job_id,
                        kind = %source.kind(),
                        error = %source,
                        "generation job failed"
                    );
                }
                Err(WorkerError::Store(e)) => {
                    tracing::error!(
                        plan_id = %task.plan_id,
                        job_id = %task.job_id,
                        error = %e,
                        "generation job hit a store error"
                    );
                }
            }
        });
    }
}
