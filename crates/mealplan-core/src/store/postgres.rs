//! PostgreSQL-backed plan store.

use anyhow::{Result, bail};
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use mealplan_db::queries::meal_plans as db;

use crate::fingerprint::Fingerprint;
use crate::record::PlanRecord;
use crate::state::{PlanStateMachine, Transition};

use super::{ApplyOutcome, PlanStore};

/// How many times `apply` re-reads after losing a version race before
/// giving up.
const MAX_APPLY_ATTEMPTS: usize = 3;

/// Plan store over the `meal_plans` table.
///
/// `apply` reads the row, runs the state machine in process, and writes
/// back with an optimistic lock on the `version` column. A lost race means
/// the record changed under us, so the guard is evaluated again against
/// the fresh row.
#[derive(Clone)]
pub struct PgPlanStore {
    pool: PgPool,
}

impl PgPlanStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PlanStore for PgPlanStore {
    async fn find_for_user(&self, user_key: Option<&str>) -> Result<Option<PlanRecord>> {
        db::get_plan_for_user(&self.pool, user_key)
            .await?
            .map(PlanRecord::from_row)
            .transpose()
    }

    async fn get(&self, id: Uuid) -> Result<Option<PlanRecord>> {
        db::get_plan(&self.pool, id)
            .await?
            .map(PlanRecord::from_row)
            .transpose()
    }

    async fn create(&self, user_key: Option<&str>, fingerprint: &Fingerprint) -> Result<PlanRecord> {
        let row = db::insert_plan_or_get(&self.pool, user_key, fingerprint.as_str()).await?;
        PlanRecord::from_row(row)
    }

    async fn list_page(&self, after: Option<Uuid>, limit: usize) -> Result<Vec<PlanRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        db::list_plans_page(&self.pool, after, limit)
            .await?
            .into_iter()
            .map(PlanRecord::from_row)
            .collect()
    }

    async fn apply(&self, id: Uuid, transition: &Transition) -> Result<ApplyOutcome> {
        for attempt in 1..=MAX_APPLY_ATTEMPTS {
            let Some(current) = self.get(id).await? else {
                return Ok(ApplyOutcome::Missing);
            };

            let mut next = current.clone();
            if let Err(reason) = PlanStateMachine::apply(&mut next, transition) {
                return Ok(ApplyOutcome::Rejected { current, reason });
            }

            let rows = db::update_plan_versioned(&self.pool, &next.to_row()?).await?;
            if rows == 1 {
                next.version += 1;
                return Ok(ApplyOutcome::Applied(next));
            }

            tracing::debug!(
                plan_id = %id,
                transition = transition.name(),
                attempt,
                "version conflict, re-reading plan"
            );
        }

        bail!(
            "optimistic lock failed: plan {} kept changing during {} ({} attempts)",
            id,
            transition.name(),
            MAX_APPLY_ATTEMPTS
        )
    }
}
