//! `mealplan list` command: status counts and one line per stored plan.

use anyhow::Result;
use sqlx::PgPool;

use mealplan_db::queries::meal_plans as plan_db;

pub async fn run_list(pool: &PgPool) -> Result<()> {
    let counts = plan_db::count_plans_by_status(pool).await?;
    println!(
        "Plans: {} (pending={} running={} success={} error={})",
        counts.total, counts.pending, counts.running, counts.success, counts.error,
    );

    let plans = plan_db::list_plans(pool).await?;
    if plans.is_empty() {
        return Ok(());
    }
    println!();
    println!(
        "{:<36}  {:<28}  {:<8}  {:<10}  {}",
        "ID", "USER", "STATUS", "WEEK", "GENERATED"
    );
    for plan in &plans {
        let week = plan
            .week_start
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        let generated = plan
            .generated_at
            .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<36}  {:<28}  {:<8}  {:<10}  {}",
            plan.id,
            plan.user_key.as_deref().unwrap_or("(anonymous)"),
            plan.status.to_string(),
            week,
            generated,
        );
        if let Some(err) = &plan.last_error {
            println!("    last error: {err}");
        }
    }
    Ok(())
}
