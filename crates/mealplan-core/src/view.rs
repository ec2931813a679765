//! Client-facing rendering of a plan record.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{Value, json};

use mealplan_db::models::PlanStatus;

use crate::engine::EnsureOutcome;
use crate::preferences::Preferences;
use crate::record::PlanRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Refreshed {
    pub weekly: bool,
    pub daily: bool,
}

/// What a caller gets back from a sync: the plan as it stands right now
/// (possibly still empty while the first generation runs) plus status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanView {
    /// Plan content with the week bounds always present (null when no week
    /// has been generated yet).
    pub plan: Value,
    pub meta: Option<Preferences>,
    pub generated_at: Option<DateTime<Utc>>,
    pub daily_refreshed_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub status: PlanStatus,
    /// A generation is queued or running.
    pub pending: bool,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refreshed: Option<Refreshed>,
}

impl PlanView {
    pub fn of_record(record: &PlanRecord) -> Self {
        let mut plan = record
            .content
            .as_ref()
            .and_then(|c| serde_json::to_value(c).ok())
            .unwrap_or_else(|| json!({}));

        if let Value::Object(map) = &mut plan {
            let week_end: Option<NaiveDate> = record.week_start.map(|s| s + Duration::days(6));
            map.entry("week_start")
                .or_insert_with(|| json!(record.week_start));
            map.entry("week_end").or_insert_with(|| json!(week_end));
        }

        Self {
            plan,
            meta: record.applied_preferences.clone(),
            generated_at: record.generated_at,
            daily_refreshed_at: record.daily_refreshed_at,
            expires_at: record.expires_at,
            status: record.status,
            pending: record.status.is_active(),
            error: record.last_error.clone(),
            refreshed: None,
        }
    }

    pub fn of_outcome(outcome: &EnsureOutcome) -> Self {
        Self {
            refreshed: Some(Refreshed {
                weekly: outcome.weekly_regenerated,
                daily: outcome.daily_refreshed,
            }),
            ..Self::of_record(&outcome.record)
        }
    }
}
