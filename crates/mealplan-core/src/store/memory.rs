//! In-process plan store.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::fingerprint::Fingerprint;
use crate::record::PlanRecord;
use crate::state::{PlanStateMachine, Transition};

use super::{ApplyOutcome, PlanStore};

/// Plan records held in a mutex-guarded map. Every operation runs under
/// the lock, so `apply` is trivially atomic.
#[derive(Default)]
pub struct MemoryPlanStore {
    plans: Mutex<BTreeMap<Uuid, PlanRecord>>,
}

impl MemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a record in place as-is, replacing any record with the same id.
    pub async fn insert(&self, record: PlanRecord) {
        self.plans.lock().await.insert(record.id, record);
    }

    pub async fn len(&self) -> usize {
        self.plans.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.plans.lock().await.is_empty()
    }
}

#[async_trait]
impl PlanStore for MemoryPlanStore {
    async fn find_for_user(&self, user_key: Option<&str>) -> Result<Option<PlanRecord>> {
        let plans = self.plans.lock().await;
        Ok(plans
            .values()
            .find(|p| p.user_key.as_deref() == user_key)
            .cloned())
    }

    async fn get(&self, id: Uuid) -> Result<Option<PlanRecord>> {
        Ok(self.plans.lock().await.get(&id).cloned())
    }

    async fn create(&self, user_key: Option<&str>, fingerprint: &Fingerprint) -> Result<PlanRecord> {
        let mut plans = self.plans.lock().await;
        if let Some(existing) = plans.values().find(|p| p.user_key.as_deref() == user_key) {
            return Ok(existing.clone());
        }
        let record = PlanRecord::new(user_key, fingerprint.clone(), Utc::now());
        plans.insert(record.id, record.clone());
        tracing::debug!(plan_id = %record.id, "created plan record");
        Ok(record)
    }

    async fn list_page(&self, after: Option<Uuid>, limit: usize) -> Result<Vec<PlanRecord>> {
        let plans = self.plans.lock().await;
        let page = match after {
            Some(after) => plans
                .range((std::ops::Bound::Excluded(after), std::ops::Bound::Unbounded))
                .map(|(_, p)| p.clone())
                .take(limit)
                .collect(),
            None => plans.values().take(limit).cloned().collect(),
        };
        Ok(page)
    }

    async fn apply(&self, id: Uuid, transition: &Transition) -> Result<ApplyOutcome> {
        let mut plans = self.plans.lock().await;
        let Some(stored) = plans.get_mut(&id) else {
            return Ok(ApplyOutcome::Missing);
        };

        let mut next = stored.clone();
        match PlanStateMachine::apply(&mut next, transition) {
            Ok(()) => {
                next.version += 1;
                *stored = next.clone();
                Ok(ApplyOutcome::Applied(next))
            }
            Err(reason) => Ok(ApplyOutcome::Rejected {
                current: stored.clone(),
                reason,
            }),
        }
    }
}
