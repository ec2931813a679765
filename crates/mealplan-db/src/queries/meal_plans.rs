//! Database query functions for the `meal_plans` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{MealPlanRow, PlanStatus};

/// Insert a fresh plan for `user_key`, or return the existing one.
///
/// The owner index treats a NULL key as the single anonymous slot, so two
/// concurrent callers for the same key always end up with the same row.
pub async fn insert_plan_or_get(
    pool: &PgPool,
    user_key: Option<&str>,
    fingerprint: &str,
) -> Result<MealPlanRow> {
    let inserted = sqlx::query_as::<_, MealPlanRow>(
        "INSERT INTO meal_plans (user_key, fingerprint) \
         VALUES ($1, $2) \
         ON CONFLICT ((COALESCE(user_key, ''))) DO NOTHING \
         RETURNING *",
    )
    .bind(user_key)
    .bind(fingerprint)
    .fetch_optional(pool)
    .await
    .context("failed to insert meal plan")?;

    if let Some(row) = inserted {
        return Ok(row);
    }

    get_plan_for_user(pool, user_key)
        .await?
        .with_context(|| format!("meal plan for {user_key:?} vanished after insert conflict"))
}

/// Fetch a plan by its ID.
pub async fn get_plan(pool: &PgPool, id: Uuid) -> Result<Option<MealPlanRow>> {
    let row = sqlx::query_as::<_, MealPlanRow>("SELECT * FROM meal_plans WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch meal plan")?;

    Ok(row)
}

/// Fetch the plan owned by `user_key` (`None` selects the anonymous slot).
pub async fn get_plan_for_user(pool: &PgPool, user_key: Option<&str>) -> Result<Option<MealPlanRow>> {
    let row = sqlx::query_as::<_, MealPlanRow>(
        "SELECT * FROM meal_plans WHERE COALESCE(user_key, '') = COALESCE($1, '')",
    )
    .bind(user_key)
    .fetch_optional(pool)
    .await
    .context("failed to fetch meal plan for user")?;

    Ok(row)
}

/// List all plans, ordered by creation time (oldest first).
pub async fn list_plans(pool: &PgPool) -> Result<Vec<MealPlanRow>> {
    let rows = sqlx::query_as::<_, MealPlanRow>("SELECT * FROM meal_plans ORDER BY created_at ASC")
        .fetch_all(pool)
        .await
        .context("failed to list meal plans")?;

    Ok(rows)
}

/// Fetch one page of plans ordered by ID, starting after `after`.
///
/// Used to walk the whole table in bounded chunks.
pub async fn list_plans_page(
    pool: &PgPool,
    after: Option<Uuid>,
    limit: i64,
) -> Result<Vec<MealPlanRow>> {
    let rows = sqlx::query_as::<_, MealPlanRow>(
        "SELECT * FROM meal_plans \
         WHERE ($1::uuid IS NULL OR id > $1) \
         ORDER BY id ASC \
         LIMIT $2",
    )
    .bind(after)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("failed to list meal plan page")?;

    Ok(rows)
}

/// Write back every mutable column of `row`.
///
/// Uses optimistic locking: the UPDATE only matches while the stored
/// `version` still equals `row.version`, and bumps it on success. Returns
/// the number of rows affected (0 means another writer got there first or
/// the plan no longer exists).
pub async fn update_plan_versioned(pool: &PgPool, row: &MealPlanRow) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE meal_plans \
         SET week_start = $1, \
             content = $2, \
             applied_preferences = $3, \
             fingerprint = $4, \
             status = $5, \
             job_id = $6, \
             job_kind = $7, \
             queued_at = $8, \
             generated_at = $9, \
             daily_refreshed_at = $10, \
             expires_at = $11, \
             last_error = $12, \
             last_started_at = $13, \
             last_finished_at = $14, \
             attempts = $15, \
             content_fingerprint = $16, \
             version = version + 1, \
             updated_at = now() \
         WHERE id = $17 AND version = $18",
    )
    .bind(row.week_start)
    .bind(&row.content)
    .bind(&row.applied_preferences)
    .bind(&row.fingerprint)
    .bind(row.status)
    .bind(row.job_id)
    .bind(row.job_kind)
    .bind(row.queued_at)
    .bind(row.generated_at)
    .bind(row.daily_refreshed_at)
    .bind(row.expires_at)
    .bind(&row.last_error)
    .bind(row.last_started_at)
    .bind(row.last_finished_at)
    .bind(row.attempts)
    .bind(&row.content_fingerprint)
    .bind(row.id)
    .bind(row.version)
    .execute(pool)
    .await
    .context("failed to update meal plan")?;

    Ok(result.rows_affected())
}

/// Summary of plan counts grouped by status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: i64,
    pub running: i64,
    pub success: i64,
    pub error: i64,
    pub total: i64,
}

/// Count plans by status.
pub async fn count_plans_by_status(pool: &PgPool) -> Result<StatusCounts> {
    let rows: Vec<(PlanStatus, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM meal_plans GROUP BY status")
            .fetch_all(pool)
            .await
            .context("failed to count meal plans by status")?;

    let mut counts = StatusCounts::default();
    for (status, count) in rows {
        match status {
            PlanStatus::Pending => counts.pending = count,
            PlanStatus::Running => counts.running = count,
            PlanStatus::Success => counts.success = count,
            PlanStatus::Error => counts.error = count,
        }
        counts.total += count;
    }

    Ok(counts)
}
