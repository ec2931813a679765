//! The plan record: one user's weekly plan plus refresh bookkeeping.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use mealplan_db::models::{JobKind, MealPlanRow, PlanStatus};

use crate::fingerprint::Fingerprint;
use crate::preferences::Preferences;
use crate::schedule::PlanContent;

/// The generation currently stamped on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobStamp {
    pub id: Uuid,
    pub kind: JobKind,
    pub queued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanRecord {
    pub id: Uuid,
    /// Owner. `None` is the single anonymous slot.
    pub user_key: Option<String>,
    pub week_start: Option<NaiveDate>,
    /// Always `week_start + 7 days` at midnight UTC.
    pub expires_at: Option<DateTime<Utc>>,
    pub content: Option<PlanContent>,
    /// Preferences the current (or in-flight) content is built from.
    pub applied_preferences: Option<Preferences>,
    pub fingerprint: Option<Fingerprint>,
    /// Fingerprint `content` was generated from. Only a weekly commit sets it.
    pub content_fingerprint: Option<Fingerprint>,
    pub status: PlanStatus,
    pub job: Option<JobStamp>,
    pub generated_at: Option<DateTime<Utc>>,
    pub daily_refreshed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_started_at: Option<DateTime<Utc>>,
    pub last_finished_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PlanRecord {
    /// A freshly created record: pending, no content, no job.
    pub fn new(user_key: Option<&str>, fingerprint: Fingerprint, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_key: user_key.map(str::to_owned),
            week_start: None,
            expires_at: None,
            content: None,
            applied_preferences: None,
            fingerprint: Some(fingerprint),
            content_fingerprint: None,
            status: PlanStatus::Pending,
            job: None,
            generated_at: None,
            daily_refreshed_at: None,
            last_error: None,
            last_started_at: None,
            last_finished_at: None,
            attempts: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_content(&self) -> bool {
        self.content.as_ref().is_some_and(|c| !c.is_empty())
    }

    pub fn job_id(&self) -> Option<Uuid> {
        self.job.map(|j| j.id)
    }

    /// Decode a database row. Fails if a JSON column does not match the
    /// expected shape.
    pub fn from_row(row: MealPlanRow) -> Result<Self> {
        let content = row
            .content
            .map(serde_json::from_value::<PlanContent>)
            .transpose()
            .with_context(|| format!("plan {} has malformed content", row.id))?;
        let applied_preferences = row
            .applied_preferences
            .map(serde_json::from_value::<Preferences>)
            .transpose()
            .with_context(|| format!("plan {} has malformed applied_preferences", row.id))?;
        let job = match (row.job_id, row.job_kind, row.queued_at) {
            (Some(id), Some(kind), Some(queued_at)) => Some(JobStamp {
                id,
                kind,
                queued_at,
            }),
            _ => None,
        };
        let attempts = u32::try_from(row.attempts)
            .with_context(|| format!("plan {} has negative attempts", row.id))?;

        Ok(Self {
            id: row.id,
            user_key: row.user_key,
            week_start: row.week_start,
            expires_at: row.expires_at,
            content,
            applied_preferences,
            fingerprint: row.fingerprint.map(Fingerprint::from_stored),
            content_fingerprint: row.content_fingerprint.map(Fingerprint::from_stored),
            status: row.status,
            job,
            generated_at: row.generated_at,
            daily_refreshed_at: row.daily_refreshed_at,
            last_error: row.last_error,
            last_started_at: row.last_started_at,
            last_finished_at: row.last_finished_at,
            attempts,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    /// Encode into a row carrying the same `version`.
    pub fn to_row(&self) -> Result<MealPlanRow> {
        let content = self
            .content
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .context("failed to encode plan content")?;
        let applied_preferences = self
            .applied_preferences
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .context("failed to encode applied preferences")?;
        let attempts = i32::try_from(self.attempts).context("attempt counter overflow")?;

        Ok(MealPlanRow {
            id: self.id,
            user_key: self.user_key.clone(),
            week_start: self.week_start,
            content,
            applied_preferences,
            fingerprint: self.fingerprint.as_ref().map(|f| f.as_str().to_owned()),
            content_fingerprint: self
                .content_fingerprint
                .as_ref()
                .map(|f| f.as_str().to_owned()),
            status: self.status,
            job_id: self.job.map(|j| j.id),
            job_kind: self.job.map(|j| j.kind),
            queued_at: self.job.map(|j| j.queued_at),
            generated_at: self.generated_at,
            daily_refreshed_at: self.daily_refreshed_at,
            expires_at: self.expires_at,
            last_error: self.last_error.clone(),
            last_started_at: self.last_started_at,
            last_finished_at: self.last_finished_at,
            attempts,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Expiry of a week starting on `week_start`: the following Monday at
/// 00:00 UTC.
pub fn expiry_for(week_start: NaiveDate) -> DateTime<Utc> {
    (week_start + Duration::days(7))
        .and_time(NaiveTime::MIN)
        .and_utc()
}
