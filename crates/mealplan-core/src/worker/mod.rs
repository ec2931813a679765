//! Generation worker: runs one stamped job to completion.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use mealplan_db::models::JobKind;

use crate::dispatch::GenerationTask;
use crate::generator::{GeneratorError, PlanGenerator};
use crate::record::PlanRecord;
use crate::schedule::{PlanContent, week_start_for};
use crate::state::Transition;
use crate::store::{ApplyOutcome, PlanStore};

/// How a job ended when it did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerOutcome {
    /// New content was committed.
    Committed { kind: JobKind, record: PlanRecord },
    /// The plan no longer exists.
    Missing,
    /// A newer job took over the plan; nothing was written.
    Superseded,
}

#[derive(Debug, Error)]
pub enum WorkerError {
    /// Generation failed. The plan has been marked `error`.
    #[error("generation failed for plan {plan_id}: {source}")]
    Generation {
        plan_id: Uuid,
        #[source]
        source: GeneratorError,
    },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Executes generation tasks against a store and a generator.
pub struct GenerationWorker {
    store: Arc<dyn PlanStore>,
    generator: Arc<dyn PlanGenerator>,
}

impl GenerationWorker {
    pub fn new(store: Arc<dyn PlanStore>, generator: Arc<dyn PlanGenerator>) -> Self {
        Self { store, generator }
    }

    /// Run `task` using the wall clock for every timestamp.
    pub async fn run(&self, task: &GenerationTask) -> Result<WorkerOutcome, WorkerError> {
        self.run_with_clock(task, Utc::now).await
    }

    /// Run `task` with every timestamp (and "today") taken from `now`.
    pub async fn run_at(
        &self,
        task: &GenerationTask,
        now: DateTime<Utc>,
    ) -> Result<WorkerOutcome, WorkerError> {
        self.run_with_clock(task, move || now).await
    }

    async fn run_with_clock<C>(
        &self,
        task: &GenerationTask,
        clock: C,
    ) -> Result<WorkerOutcome, WorkerError>
    where
        C: Fn() -> DateTime<Utc> + Send + Sync,
    {
        let plan_id = task.plan_id;
        let job_id = task.job_id;

        let begin = Transition::BeginRun {
            job_id,
            at: clock(),
        };
        let record = match self.store.apply(plan_id, &begin).await? {
            ApplyOutcome::Applied(record) => record,
            ApplyOutcome::Missing => {
                tracing::warn!(plan_id = %plan_id, job_id = %job_id, "plan vanished before job started");
                return Ok(WorkerOutcome::Missing);
            }
            ApplyOutcome::Rejected { reason, .. } => {
                tracing::info!(plan_id = %plan_id, job_id = %job_id, reason = %reason, "skipping job");
                return Ok(WorkerOutcome::Superseded);
            }
        };

        // A daily refresh needs a week to patch into.
        let kind = match (task.kind, record.content.as_ref()) {
            (JobKind::Daily, Some(content)) if !content.is_empty() => JobKind::Daily,
            (JobKind::Daily, _) => {
                tracing::info!(plan_id = %plan_id, job_id = %job_id, "no content to patch, generating full week");
                JobKind::Weekly
            }
            (JobKind::Weekly, _) => JobKind::Weekly,
        };

        tracing::info!(
            plan_id = %plan_id,
            job_id = %job_id,
            kind = %kind,
            attempt = record.attempts,
            "generation started"
        );

        let today = clock().date_naive();
        let generated = match kind {
            JobKind::Weekly => {
                let week_start = week_start_for(today);
                self.generator
                    .generate_weekly(&task.preferences, week_start)
                    .await
                    .map(|schedule| Transition::CommitWeekly {
                        job_id,
                        content: PlanContent::from_weekly(schedule, today),
                        week_start,
                        preferences: task.preferences.clone(),
                        fingerprint: task.fingerprint.clone(),
                        at: clock(),
                    })
            }
            JobKind::Daily => {
                let generated = self.generator.generate_daily(&task.preferences, today).await;
                generated.and_then(|meals| {
                    let content = record
                        .content
                        .clone()
                        .map(|c| c.with_daily(today, meals))
                        .ok_or(GeneratorError::EmptyContent)?;
                    Ok(Transition::CommitDaily {
                        job_id,
                        content,
                        at: clock(),
                    })
                })
            }
        };

        let commit = match generated {
            Ok(commit) => commit,
            Err(source) => {
                self.record_failure(plan_id, job_id, &source, clock()).await?;
                return Err(WorkerError::Generation { plan_id, source });
            }
        };

        match self.store.apply(plan_id, &commit).await? {
            ApplyOutcome::Applied(record) => {
                tracing::info!(plan_id = %plan_id, job_id = %job_id, kind = %kind, "generation committed");
                Ok(WorkerOutcome::Committed { kind, record })
            }
            ApplyOutcome::Missing => Ok(WorkerOutcome::Missing),
            ApplyOutcome::Rejected { reason, .. } => {
                tracing::info!(
                    plan_id = %plan_id,
                    job_id = %job_id,
                    reason = %reason,
                    "dropping result of superseded job"
                );
                Ok(WorkerOutcome::Superseded)
            }
        }
    }

    async fn record_failure(
        &self,
        plan_id: Uuid,
        job_id: Uuid,
        error: &GeneratorError,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let fail = Transition::Fail {
            job_id,
            error: error.to_string(),
            at,
        };
        match self.store.apply(plan_id, &fail).await? {
            ApplyOutcome::Applied(_) => {
                tracing::error!(
                    plan_id = %plan_id,
                    job_id = %job_id,
                    kind = %error.kind(),
                    error = %error,
                    "generation failed"
                );
            }
            ApplyOutcome::Missing => {}
            ApplyOutcome::Rejected { reason, .. } => {
                tracing::info!(
                    plan_id = %plan_id,
                    job_id = %job_id,
                    reason = %reason,
                    error = %error,
                    "superseded job failed, leaving plan untouched"
                );
            }
        }
        Ok(())
    }
}
