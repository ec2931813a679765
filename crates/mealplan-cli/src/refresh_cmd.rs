//! `mealplan refresh` command: batch refresh of every stored plan.

use anyhow::Result;
use sqlx::PgPool;

use mealplan_core::generator::GeneratorConfig;
use mealplan_core::refresh::refresh_all;

use crate::sync_cmd::Runtime;

pub async fn run_refresh(
    pool: &PgPool,
    generator: GeneratorConfig,
    max_concurrent: usize,
    force_weekly: bool,
    chunk_size: usize,
) -> Result<()> {
    let runtime = Runtime::new(pool, generator, max_concurrent)?;

    let summary = refresh_all(&runtime.engine, force_weekly, chunk_size).await;
    // Let whatever was dispatched finish even if the walk itself failed.
    runtime.workers.shutdown().await;
    let summary = summary?;

    println!("Scanned: {}", summary.scanned);
    println!("  weekly regenerated: {}", summary.weekly_regenerated);
    println!("  daily refreshed:    {}", summary.daily_refreshed);
    println!("  failed:             {}", summary.failed);
    Ok(())
}
