//! `mealplan sync` and `mealplan show`.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;

use mealplan_core::dispatch::{DispatcherConfig, WorkerPool};
use mealplan_core::engine::{EngineConfig, RefreshEngine, normalize_user_key};
use mealplan_core::generator::{GeneratorConfig, OpenAiGenerator};
use mealplan_core::preferences::PreferenceInput;
use mealplan_core::store::{PgPlanStore, PlanStore};
use mealplan_core::view::PlanView;
use mealplan_core::worker::GenerationWorker;

/// Engine wired to Postgres and a background worker pool.
pub struct Runtime {
    pub store: Arc<PgPlanStore>,
    pub workers: Arc<WorkerPool>,
    pub engine: RefreshEngine,
}

impl Runtime {
    pub fn new(pool: &PgPool, generator: GeneratorConfig, max_concurrent: usize) -> Result<Self> {
        if generator.api_key.is_none() {
            tracing::warn!(
                "no OpenAI API key configured; generations will fail as unavailable"
            );
        }
        let store = Arc::new(PgPlanStore::new(pool.clone()));
        let generator = Arc::new(OpenAiGenerator::new(generator)?);
        let worker = Arc::new(GenerationWorker::new(store.clone(), generator));
        let workers = Arc::new(WorkerPool::new(
            worker,
            &DispatcherConfig { max_concurrent },
        ));
        let engine = RefreshEngine::new(store.clone(), workers.clone(), EngineConfig::default());
        Ok(Self {
            store,
            workers,
            engine,
        })
    }
}

pub struct SyncArgs {
    pub user: Option<String>,
    pub preferences: PreferenceInput,
    pub force_refresh: bool,
    pub wait: bool,
}

/// Ensure the caller's plan and print the view as JSON.
///
/// The command always lets queued generations finish before returning, so
/// a dispatched job is never dropped with the process. With `wait`, the
/// record as committed by the worker is printed as a second document.
pub async fn run_sync(
    pool: &PgPool,
    generator: GeneratorConfig,
    max_concurrent: usize,
    args: SyncArgs,
) -> Result<()> {
    let runtime = Runtime::new(pool, generator, max_concurrent)?;

    let outcome = runtime
        .engine
        .sync(args.user.as_deref(), &args.preferences, args.force_refresh)
        .await?;
    print_json(&PlanView::of_outcome(&outcome))?;

    runtime.workers.shutdown().await;

    if args.wait {
        let record = runtime
            .store
            .get(outcome.record.id)
            .await?
            .with_context(|| format!("plan {} vanished", outcome.record.id))?;
        print_json(&PlanView::of_record(&record))?;
    }
    Ok(())
}

/// Print the stored plan for a user without refreshing it.
pub async fn run_show(pool: &PgPool, user: Option<&str>) -> Result<()> {
    let store = PgPlanStore::new(pool.clone());
    let user_key = normalize_user_key(user);
    let record = store
        .find_for_user(user_key.as_deref())
        .await?
        .with_context(|| match &user_key {
            Some(key) => format!("no plan for {key}"),
            None => "no anonymous plan".to_string(),
        })?;
    print_json(&PlanView::of_record(&record))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to render JSON")?;
    println!("{text}");
    Ok(())
}
