//! Persistence seam for plan records.
//!
//! A [`PlanStore`] owns the atomic read-check-write cycle: [`PlanStore::apply`]
//! loads the record, runs [`PlanStateMachine::apply`](crate::state::PlanStateMachine::apply)
//! and writes the result back only if nobody else wrote in between.

pub mod memory;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::fingerprint::Fingerprint;
use crate::record::PlanRecord;
use crate::state::{Transition, TransitionError};

pub use memory::MemoryPlanStore;
pub use postgres::PgPlanStore;

/// Result of [`PlanStore::apply`].
#[derive(Debug, Clone)]
pub enum ApplyOutcome {
    /// The transition landed; this is the record as written.
    Applied(PlanRecord),
    /// The guard or the status graph refused it; `current` is the record
    /// as it stands.
    Rejected {
        current: PlanRecord,
        reason: TransitionError,
    },
    /// No record with that id.
    Missing,
}

#[async_trait]
pub trait PlanStore: Send + Sync {
    /// Record owned by `user_key` (`None` selects the anonymous slot).
    async fn find_for_user(&self, user_key: Option<&str>) -> Result<Option<PlanRecord>>;

    async fn get(&self, id: Uuid) -> Result<Option<PlanRecord>>;

    /// Insert a fresh pending record for `user_key`, or return the one that
    /// already exists. Concurrent callers converge on a single record.
    async fn create(&self, user_key: Option<&str>, fingerprint: &Fingerprint) -> Result<PlanRecord>;

    /// Up to `limit` records with id greater than `after`, ordered by id.
    async fn list_page(&self, after: Option<Uuid>, limit: usize) -> Result<Vec<PlanRecord>>;

    /// Atomically check and apply `transition` to record `id`.
    async fn apply(&self, id: Uuid, transition: &Transition) -> Result<ApplyOutcome>;
}

/// Every record in the store, fetched page by page.
pub async fn list_all(store: &dyn PlanStore, page_size: usize) -> Result<Vec<PlanRecord>> {
    let mut all = Vec::new();
    let mut after = None;
    loop {
        let page = store.list_page(after, page_size).await?;
        let Some(last) = page.last() else {
            break;
        };
        after = Some(last.id);
        let done = page.len() < page_size;
        all.extend(page);
        if done {
            break;
        }
    }
    Ok(all)
}
