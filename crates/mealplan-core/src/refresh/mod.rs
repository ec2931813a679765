//! Batch refresh of every stored plan.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::RefreshEngine;
use crate::preferences::PreferenceInput;

/// Records fetched per page while walking the store.
pub const DEFAULT_CHUNK_SIZE: usize = 50;

/// Counts from one [`refresh_all`] pass. A weekly regeneration counts as
/// a daily refresh too, since it rebuilds today's slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    pub scanned: usize,
    pub weekly_regenerated: usize,
    pub daily_refreshed: usize,
    pub failed: usize,
}

/// Run `ensure_plan` for every stored plan with the preferences it was last
/// built from. A record with no stored preferences uses the defaults.
///
/// A failure on one record is logged and counted; the walk continues.
pub async fn refresh_all(
    engine: &RefreshEngine,
    force_weekly: bool,
    chunk_size: usize,
) -> Result<RefreshSummary> {
    refresh_all_at(engine, force_weekly, chunk_size, Utc::now()).await
}

pub async fn refresh_all_at(
    engine: &RefreshEngine,
    force_weekly: bool,
    chunk_size: usize,
    now: DateTime<Utc>,
) -> Result<RefreshSummary> {
    let chunk_size = chunk_size.max(1);
    let mut summary = RefreshSummary::default();
    let mut after = None;

    loop {
        let page = engine.store().list_page(after, chunk_size).await?;
        let Some(last) = page.last() else {
            break;
        };
        after = Some(last.id);
        let page_len = page.len();

        for record in page {
            summary.scanned += 1;
            let plan_id = record.id;
            let user_key = record.user_key.clone();
            let input = record
                .applied_preferences
                .as_ref()
                .map(PreferenceInput::from)
                .unwrap_or_default();

            match engine
                .ensure_plan_at(Some(record), user_key.as_deref(), &input, force_weekly, now)
                .await
            {
                Ok(outcome) => {
                    if outcome.weekly_regenerated {
                        summary.weekly_regenerated += 1;
                        tracing::info!(plan_id = %plan_id, "weekly plan regenerated");
                    }
                    if outcome.daily_refreshed {
                        summary.daily_refreshed += 1;
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(plan_id = %plan_id, error = %e, "failed to refresh plan");
                }
            }
        }

        if page_len < chunk_size {
            break;
        }
    }

    tracing::info!(
        scanned = summary.scanned,
        weekly = summary.weekly_regenerated,
        daily = summary.daily_refreshed,
        failed = summary.failed,
        "batch refresh finished"
    );

    Ok(summary)
}
