//! Plan record state machine.
//!
//! Every mutation of a [`PlanRecord`] is expressed as a [`Transition`] and
//! applied through [`PlanStateMachine::apply`], which checks the guard and
//! the status graph before touching anything. Stores run `apply` inside
//! their atomic read-modify-write so a guard and its write never interleave
//! with another writer.

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

use mealplan_db::models::{JobKind, PlanStatus};

use crate::fingerprint::Fingerprint;
use crate::preferences::Preferences;
use crate::record::{JobStamp, PlanRecord, expiry_for};
use crate::schedule::PlanContent;

/// What the engine saw when it decided to dispatch. A stamp only lands if
/// the record still looks exactly like this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StampGuard {
    pub status: PlanStatus,
    pub job_id: Option<Uuid>,
    pub fingerprint: Option<Fingerprint>,
}

impl StampGuard {
    pub fn observe(record: &PlanRecord) -> Self {
        Self {
            status: record.status,
            job_id: record.job_id(),
            fingerprint: record.fingerprint.clone(),
        }
    }

    fn matches(&self, record: &PlanRecord) -> bool {
        self.status == record.status
            && self.job_id == record.job_id()
            && self.fingerprint == record.fingerprint
    }
}

/// A guarded mutation of a plan record.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Mark the record pending for a new job (any status -> pending).
    Stamp {
        guard: StampGuard,
        job: JobStamp,
        preferences: Preferences,
        fingerprint: Fingerprint,
    },
    /// A worker picked the job up (pending -> running).
    BeginRun { job_id: Uuid, at: DateTime<Utc> },
    /// A full week was generated (running -> success).
    CommitWeekly {
        job_id: Uuid,
        content: PlanContent,
        week_start: NaiveDate,
        preferences: Preferences,
        fingerprint: Fingerprint,
        at: DateTime<Utc>,
    },
    /// Today's slots were regenerated (running -> success).
    CommitDaily {
        job_id: Uuid,
        content: PlanContent,
        at: DateTime<Utc>,
    },
    /// Generation failed (running -> error).
    Fail {
        job_id: Uuid,
        error: String,
        at: DateTime<Utc>,
    },
}

impl Transition {
    /// Status the record ends up in.
    pub fn target(&self) -> PlanStatus {
        match self {
            Self::Stamp { .. } => PlanStatus::Pending,
            Self::BeginRun { .. } => PlanStatus::Running,
            Self::CommitWeekly { .. } | Self::CommitDaily { .. } => PlanStatus::Success,
            Self::Fail { .. } => PlanStatus::Error,
        }
    }

    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Self::Stamp { job, .. } => job.queued_at,
            Self::BeginRun { at, .. }
            | Self::CommitWeekly { at, .. }
            | Self::CommitDaily { at, .. }
            | Self::Fail { at, .. } => *at,
        }
    }

    /// Job a worker-side transition belongs to.
    fn worker_job(&self) -> Option<Uuid> {
        match self {
            Self::Stamp { .. } => None,
            Self::BeginRun { job_id, .. }
            | Self::CommitWeekly { job_id, .. }
            | Self::CommitDaily { job_id, .. }
            | Self::Fail { job_id, .. } => Some(*job_id),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Stamp { .. } => "stamp",
            Self::BeginRun { .. } => "begin_run",
            Self::CommitWeekly { .. } => "commit_weekly",
            Self::CommitDaily { .. } => "commit_daily",
            Self::Fail { .. } => "fail",
        }
    }
}

/// Why a transition was refused. The record is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("stamp lost the race: plan {plan_id} changed since it was read")]
    StaleStamp { plan_id: Uuid },

    #[error("job {job_id} was superseded on plan {plan_id} (current job: {current:?})")]
    Superseded {
        plan_id: Uuid,
        job_id: Uuid,
        current: Option<Uuid>,
    },

    #[error("invalid transition {from} -> {to} on plan {plan_id}")]
    InvalidTransition {
        plan_id: Uuid,
        from: PlanStatus,
        to: PlanStatus,
    },
}

/// The plan state machine.
///
/// ```text
/// pending  -> running   (worker picks up the job)
/// running  -> success   (commit)
/// running  -> error     (generation failed)
/// *        -> pending   (stamp a new job, superseding any older one)
/// ```
pub struct PlanStateMachine;

impl PlanStateMachine {
    pub fn is_valid_transition(from: PlanStatus, to: PlanStatus) -> bool {
        matches!(
            (from, to),
            (_, PlanStatus::Pending)
                | (PlanStatus::Pending, PlanStatus::Running)
                | (PlanStatus::Running, PlanStatus::Success)
                | (PlanStatus::Running, PlanStatus::Error)
        )
    }

    /// Check `transition` against `record` and apply it in place.
    pub fn apply(record: &mut PlanRecord, transition: &Transition) -> Result<(), TransitionError> {
        if let Transition::Stamp { guard, .. } = transition {
            if !guard.matches(record) {
                return Err(TransitionError::StaleStamp { plan_id: record.id });
            }
        }

        if let Some(job_id) = transition.worker_job() {
            if record.job_id() != Some(job_id) {
                return Err(TransitionError::Superseded {
                    plan_id: record.id,
                    job_id,
                    current: record.job_id(),
                });
            }
        }

        let to = transition.target();
        if !Self::is_valid_transition(record.status, to) {
            return Err(TransitionError::InvalidTransition {
                plan_id: record.id,
                from: record.status,
                to,
            });
        }

        match transition {
            Transition::Stamp {
                job,
                preferences,
                fingerprint,
                ..
            } => {
                record.applied_preferences = Some(preferences.clone());
                record.fingerprint = Some(fingerprint.clone());
                record.job = Some(*job);
                record.last_error = None;
                record.last_started_at = None;
                record.last_finished_at = None;
            }
            Transition::BeginRun { at, .. } => {
                record.last_started_at = Some(*at);
                record.last_error = None;
                record.attempts += 1;
            }
            Transition::CommitWeekly {
                content,
                week_start,
                preferences,
                fingerprint,
                at,
                ..
            } => {
                record.content = Some(content.clone());
                record.week_start = Some(*week_start);
                record.expires_at = Some(expiry_for(*week_start));
                record.applied_preferences = Some(preferences.clone());
                record.fingerprint = Some(fingerprint.clone());
                record.content_fingerprint = Some(fingerprint.clone());
                record.generated_at = Some(*at);
                record.daily_refreshed_at = Some(*at);
                record.last_error = None;
                record.last_finished_at = Some(*at);
            }
            Transition::CommitDaily { content, at, .. } => {
                record.content = Some(content.clone());
                record.daily_refreshed_at = Some(*at);
                record.last_error = None;
                record.last_finished_at = Some(*at);
            }
            Transition::Fail { error, at, .. } => {
                record.last_error = Some(error.clone());
                record.last_finished_at = Some(*at);
            }
        }

        record.status = to;
        record.updated_at = transition.at();
        Ok(())
    }
}

/// Job kind that produced the record's current stamp, if any.
pub fn last_job_kind(record: &PlanRecord) -> Option<JobKind> {
    record.job.map(|j| j.kind)
}
