//! Refresh decision engine.
//!
//! [`RefreshEngine::ensure_plan`] makes sure a record exists for the
//! caller, decides whether its content is still good, and if not stamps
//! the record pending and enqueues a generation. It never waits for the
//! generation; the caller sees the result on a later read.

use std::sync::Arc;

use anyhow::{Result, bail};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use mealplan_db::models::{JobKind, PlanStatus};

use crate::dispatch::{GenerationTask, TaskDispatcher};
use crate::fingerprint::Fingerprint;
use crate::preferences::{PreferenceInput, Preferences};
use crate::record::{JobStamp, PlanRecord};
use crate::state::{StampGuard, Transition, last_job_kind};
use crate::store::{ApplyOutcome, PlanStore};

/// Tunables for the decision rules.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// A pending or running job older than this is assumed lost and may be
    /// replaced.
    pub stale_after: Duration,
    /// Maximum age of the daily slots before they are regenerated.
    pub daily_max_age: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::minutes(15),
            daily_max_age: Duration::hours(24),
        }
    }
}

/// What `ensure_plan` should do with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Content is current.
    UpToDate,
    /// A job is already queued or running for these preferences.
    InFlight,
    RefreshDaily,
    RegenerateWeekly,
}

impl Decision {
    pub fn job_kind(self) -> Option<JobKind> {
        match self {
            Self::RefreshDaily => Some(JobKind::Daily),
            Self::RegenerateWeekly => Some(JobKind::Weekly),
            Self::UpToDate | Self::InFlight => None,
        }
    }
}

/// Result of [`RefreshEngine::ensure_plan`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnsureOutcome {
    pub record: PlanRecord,
    pub weekly_regenerated: bool,
    /// Also set on weekly regeneration, which includes today's slots.
    pub daily_refreshed: bool,
}

impl EnsureOutcome {
    fn unchanged(record: PlanRecord) -> Self {
        Self {
            record,
            weekly_regenerated: false,
            daily_refreshed: false,
        }
    }
}

/// Canonical form of a caller-supplied owner key: trimmed and lowercased.
/// Blank keys select the anonymous slot.
pub fn normalize_user_key(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_lowercase)
}

/// True when the record has no week or its week is over.
pub fn weekly_expired(record: &PlanRecord, now: DateTime<Utc>) -> bool {
    match (record.week_start, record.expires_at) {
        (Some(_), Some(expires_at)) => expires_at <= now,
        _ => true,
    }
}

/// True when today's slots are missing, dated another day, or too old.
pub fn should_refresh_daily(
    record: &PlanRecord,
    now: DateTime<Utc>,
    daily_max_age: Duration,
) -> bool {
    let Some(refreshed_at) = record.daily_refreshed_at else {
        return true;
    };
    let daily_date = record.content.as_ref().and_then(|c| c.daily_date());
    if daily_date != Some(now.date_naive()) {
        return true;
    }
    refreshed_at < now - daily_max_age
}

/// True when a job is queued or running and young enough to still be
/// alive.
pub fn job_in_flight(record: &PlanRecord, now: DateTime<Utc>, stale_after: Duration) -> bool {
    record.status.is_active()
        && record
            .job
            .is_some_and(|job| now - job.queued_at < stale_after)
}

/// The refresh decision for `record` given the caller's fingerprint.
pub fn decide(
    record: &PlanRecord,
    fingerprint: &Fingerprint,
    force_weekly: bool,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> Decision {
    let preferences_changed = record.fingerprint.as_ref() != Some(fingerprint);

    if job_in_flight(record, now, config.stale_after) && !force_weekly && !preferences_changed {
        return Decision::InFlight;
    }

    // A failed weekly leaves the record stamped with preferences its content
    // was never built from. A failed forced rebuild of current content does not.
    let weekly_failed = record.status == PlanStatus::Error
        && last_job_kind(record) == Some(JobKind::Weekly)
        && record.content_fingerprint.as_ref() != Some(fingerprint);

    if force_weekly
        || weekly_expired(record, now)
        || preferences_changed
        || !record.has_content()
        || weekly_failed
    {
        Decision::RegenerateWeekly
    } else if should_refresh_daily(record, now, config.daily_max_age) {
        Decision::RefreshDaily
    } else {
        Decision::UpToDate
    }
}

/// Decides on and dispatches plan refreshes.
pub struct RefreshEngine {
    store: Arc<dyn PlanStore>,
    dispatcher: Arc<dyn TaskDispatcher>,
    config: EngineConfig,
}

impl RefreshEngine {
    pub fn new(
        store: Arc<dyn PlanStore>,
        dispatcher: Arc<dyn TaskDispatcher>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn PlanStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Load the caller's record and ensure it.
    pub async fn sync(
        &self,
        user_key: Option<&str>,
        input: &PreferenceInput,
        force_weekly: bool,
    ) -> Result<EnsureOutcome> {
        let user_key = normalize_user_key(user_key);
        let existing = self.store.find_for_user(user_key.as_deref()).await?;
        self.ensure_plan(existing, user_key.as_deref(), input, force_weekly)
            .await
    }

    pub async fn ensure_plan(
        &self,
        existing: Option<PlanRecord>,
        user_key: Option<&str>,
        input: &PreferenceInput,
        force_weekly: bool,
    ) -> Result<EnsureOutcome> {
        self.ensure_plan_at(existing, user_key, input, force_weekly, Utc::now())
            .await
    }

    /// [`Self::ensure_plan`] with an explicit current time.
    pub async fn ensure_plan_at(
        &self,
        existing: Option<PlanRecord>,
        user_key: Option<&str>,
        input: &PreferenceInput,
        force_weekly: bool,
        now: DateTime<Utc>,
    ) -> Result<EnsureOutcome> {
        let preferences = input.normalize();
        let fingerprint = Fingerprint::of(&preferences);

        let record = match existing {
            Some(record) => record,
            None => {
                let user_key = normalize_user_key(user_key);
                self.store.create(user_key.as_deref(), &fingerprint).await?
            }
        };

        let decision = decide(&record, &fingerprint, force_weekly, now, &self.config);
        tracing::debug!(
            plan_id = %record.id,
            status = %record.status,
            decision = ?decision,
            force_weekly,
            "refresh decision"
        );

        let Some(kind) = decision.job_kind() else {
            return Ok(EnsureOutcome::unchanged(record));
        };

        self.stamp_and_dispatch(record, kind, preferences, fingerprint, now)
            .await
    }

    async fn stamp_and_dispatch(
        &self,
        record: PlanRecord,
        kind: JobKind,
        preferences: Preferences,
        fingerprint: Fingerprint,
        now: DateTime<Utc>,
    ) -> Result<EnsureOutcome> {
        let job = JobStamp {
            id: Uuid::new_v4(),
            kind,
            queued_at: now,
        };
        let stamp = Transition::Stamp {
            guard: StampGuard::observe(&record),
            job,
            preferences: preferences.clone(),
            fingerprint: fingerprint.clone(),
        };

        let stamped = match self.store.apply(record.id, &stamp).await? {
            ApplyOutcome::Applied(stamped) => stamped,
            ApplyOutcome::Rejected { current, reason } => {
                // Someone else decided first; their job covers this request.
                tracing::debug!(plan_id = %record.id, reason = %reason, "stamp lost the race");
                return Ok(EnsureOutcome::unchanged(current));
            }
            ApplyOutcome::Missing => bail!("plan {} disappeared while stamping", record.id),
        };

        if let Some(previous) = record.job.filter(|_| record.status.is_active()) {
            tracing::info!(
                plan_id = %record.id,
                superseded_job = %previous.id,
                "superseding in-flight job"
            );
        }

        tracing::info!(
            plan_id = %stamped.id,
            job_id = %job.id,
            kind = %kind,
            "dispatching generation"
        );

        self.dispatcher.enqueue(GenerationTask {
            plan_id: stamped.id,
            job_id: job.id,
            kind,
            preferences,
            fingerprint,
        });

        let weekly = kind == JobKind::Weekly;
        Ok(EnsureOutcome {
            record: stamped,
            weekly_regenerated: weekly,
            daily_refreshed: true,
        })
    }
}
