//! Refresh decision engine behaviour against the in-memory store.

mod common;

use std::sync::Arc;

use chrono::Duration;

use mealplan_core::engine::{EngineConfig, RefreshEngine};
use mealplan_core::fingerprint::Fingerprint;
use mealplan_core::generator::GeneratorErrorKind;
use mealplan_core::preferences::PreferenceInput;
use mealplan_core::record::expiry_for;
use mealplan_core::store::{MemoryPlanStore, PlanStore};
use mealplan_core::worker::{GenerationWorker, WorkerOutcome};
use mealplan_core::{JobKind, PlanStatus};

use common::{RecordingDispatcher, ScriptedGenerator, keto, monday_date, vegan, wednesday};

// ===========================================================================
// Fixture
// ===========================================================================

struct Fixture {
    store: Arc<MemoryPlanStore>,
    dispatcher: Arc<RecordingDispatcher>,
    engine: RefreshEngine,
}

impl Fixture {
    fn new() -> Self {
        let store = Arc::new(MemoryPlanStore::new());
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let engine = RefreshEngine::new(
            store.clone(),
            dispatcher.clone(),
            EngineConfig::default(),
        );
        Self {
            store,
            dispatcher,
            engine,
        }
    }

    fn worker(&self, generator: ScriptedGenerator) -> GenerationWorker {
        GenerationWorker::new(self.store.clone(), Arc::new(generator))
    }

    /// Run the most recently dispatched task to completion at `now`.
    async fn run_last(&self, generator: ScriptedGenerator, now: chrono::DateTime<chrono::Utc>) {
        let task = self.dispatcher.last().expect("a task should have been dispatched");
        let outcome = self.worker(generator).run_at(&task, now).await;
        assert!(
            matches!(outcome, Ok(WorkerOutcome::Committed { .. })),
            "expected commit, got {outcome:?}"
        );
    }

    async fn sync_at(
        &self,
        user: &str,
        input: &PreferenceInput,
        force: bool,
        now: chrono::DateTime<chrono::Utc>,
    ) -> mealplan_core::engine::EnsureOutcome {
        let existing = self.store.find_for_user(Some(user)).await.unwrap();
        self.engine
            .ensure_plan_at(existing, Some(user), input, force, now)
            .await
            .unwrap()
    }
}

// ===========================================================================
// Scenarios
// ===========================================================================

#[tokio::test]
async fn first_request_creates_pending_record_and_dispatches_weekly() {
    let fx = Fixture::new();
    let input = vegan();

    let outcome = fx.sync_at("ana@example.com", &input, false, wednesday()).await;

    assert!(outcome.weekly_regenerated);
    assert!(outcome.daily_refreshed);
    assert_eq!(outcome.record.status, PlanStatus::Pending);
    assert!(outcome.record.content.is_none());
    assert_eq!(
        outcome.record.fingerprint,
        Some(Fingerprint::of(&input.normalize()))
    );

    let tasks = fx.dispatcher.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].kind, JobKind::Weekly);
    assert_eq!(tasks[0].plan_id, outcome.record.id);
    assert_eq!(Some(tasks[0].job_id), outcome.record.job_id());
}

#[tokio::test]
async fn repeated_request_while_generating_is_a_no_op() {
    let fx = Fixture::new();
    fx.sync_at("ana@example.com", &vegan(), false, wednesday()).await;

    let again = fx
        .sync_at("ana@example.com", &vegan(), false, wednesday() + Duration::seconds(5))
        .await;

    assert!(!again.weekly_regenerated);
    assert!(!again.daily_refreshed);
    assert_eq!(fx.dispatcher.count(), 1);
}

#[tokio::test]
async fn fresh_plan_is_left_alone() {
    let fx = Fixture::new();
    fx.sync_at("ana@example.com", &vegan(), false, wednesday()).await;
    fx.run_last(ScriptedGenerator::ok(), wednesday()).await;

    let later = wednesday() + Duration::hours(2);
    let first = fx.sync_at("ana@example.com", &vegan(), false, later).await;
    let second = fx.sync_at("ana@example.com", &vegan(), false, later).await;

    for outcome in [&first, &second] {
        assert!(!outcome.weekly_regenerated);
        assert!(!outcome.daily_refreshed);
        assert_eq!(outcome.record.status, PlanStatus::Success);
    }
    assert_eq!(fx.dispatcher.count(), 1);
}

#[tokio::test]
async fn changed_allergens_trigger_weekly_regeneration() {
    let fx = Fixture::new();
    fx.sync_at("ana@example.com", &vegan(), false, wednesday()).await;
    fx.run_last(ScriptedGenerator::ok(), wednesday()).await;
    let before = fx.store.find_for_user(Some("ana@example.com")).await.unwrap().unwrap();

    let mut changed = vegan();
    changed.allergens.push("sesame".to_string());
    let outcome = fx
        .sync_at("ana@example.com", &changed, false, wednesday() + Duration::hours(1))
        .await;

    assert!(outcome.weekly_regenerated);
    assert!(outcome.daily_refreshed);
    assert_eq!(outcome.record.status, PlanStatus::Pending);
    assert_eq!(
        outcome.record.fingerprint,
        Some(Fingerprint::of(&changed.normalize()))
    );
    assert_ne!(outcome.record.fingerprint, before.fingerprint);
    // Old content stays visible until the new week lands.
    assert_eq!(outcome.record.content, before.content);
    assert_eq!(fx.dispatcher.last().unwrap().kind, JobKind::Weekly);
}

#[tokio::test]
async fn reordered_allergens_are_not_a_change() {
    let fx = Fixture::new();
    let input = PreferenceInput {
        allergens: vec!["soy".into(), "milk".into()],
        ..vegan()
    };
    fx.sync_at("ana@example.com", &input, false, wednesday()).await;
    fx.run_last(ScriptedGenerator::ok(), wednesday()).await;

    let reordered = PreferenceInput {
        allergens: vec![" milk".into(), "soy".into(), "soy".into()],
        ..vegan()
    };
    let outcome = fx
        .sync_at("ana@example.com", &reordered, false, wednesday() + Duration::hours(1))
        .await;

    assert!(!outcome.weekly_regenerated);
    assert_eq!(fx.dispatcher.count(), 1);
}

#[tokio::test]
async fn next_day_triggers_daily_refresh_only() {
    let fx = Fixture::new();
    fx.sync_at("ana@example.com", &vegan(), false, wednesday()).await;
    fx.run_last(ScriptedGenerator::ok(), wednesday()).await;

    let thursday = wednesday() + Duration::days(1);
    let outcome = fx.sync_at("ana@example.com", &vegan(), false, thursday).await;

    assert!(!outcome.weekly_regenerated);
    assert!(outcome.daily_refreshed);
    assert_eq!(outcome.record.status, PlanStatus::Pending);
    assert_eq!(fx.dispatcher.last().unwrap().kind, JobKind::Daily);
}

#[tokio::test]
async fn expired_week_regenerates() {
    let fx = Fixture::new();
    fx.sync_at("ana@example.com", &vegan(), false, wednesday()).await;
    fx.run_last(ScriptedGenerator::ok(), wednesday()).await;

    let expiry = expiry_for(monday_date());
    let outcome = fx.sync_at("ana@example.com", &vegan(), false, expiry).await;

    assert!(outcome.weekly_regenerated);
    assert_eq!(fx.dispatcher.last().unwrap().kind, JobKind::Weekly);
}

#[tokio::test]
async fn force_refresh_supersedes_in_flight_job() {
    let fx = Fixture::new();
    let first = fx.sync_at("ana@example.com", &vegan(), false, wednesday()).await;
    let first_job = first.record.job_id().unwrap();

    let forced = fx
        .sync_at("ana@example.com", &vegan(), true, wednesday() + Duration::seconds(1))
        .await;

    assert!(forced.weekly_regenerated);
    assert_ne!(forced.record.job_id(), Some(first_job));
    assert_eq!(fx.dispatcher.count(), 2);

    // The old job finds itself replaced and writes nothing.
    let old_task = fx.dispatcher.tasks()[0].clone();
    let outcome = fx
        .worker(ScriptedGenerator::ok())
        .run_at(&old_task, wednesday() + Duration::seconds(2))
        .await
        .unwrap();
    assert_eq!(outcome, WorkerOutcome::Superseded);

    let stored = fx.store.get(forced.record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PlanStatus::Pending);
    assert_eq!(stored.job_id(), forced.record.job_id());
    assert_eq!(stored.attempts, 0);
}

#[tokio::test]
async fn failed_weekly_is_retried_on_next_request() {
    let fx = Fixture::new();
    fx.sync_at("ana@example.com", &vegan(), false, wednesday()).await;
    let task = fx.dispatcher.last().unwrap();
    let result = fx
        .worker(ScriptedGenerator::failing(GeneratorErrorKind::UpstreamError))
        .run_at(&task, wednesday())
        .await;
    assert!(result.is_err());

    let outcome = fx
        .sync_at("ana@example.com", &vegan(), false, wednesday() + Duration::minutes(1))
        .await;

    assert!(outcome.weekly_regenerated);
    assert_eq!(outcome.record.status, PlanStatus::Pending);
    assert!(outcome.record.last_error.is_none());
    assert_eq!(fx.dispatcher.count(), 2);
}

#[tokio::test]
async fn failed_preference_change_is_not_forgotten() {
    let fx = Fixture::new();
    fx.sync_at("ana@example.com", &vegan(), false, wednesday()).await;
    fx.run_last(ScriptedGenerator::ok(), wednesday()).await;

    fx.sync_at("ana@example.com", &keto(), false, wednesday() + Duration::hours(1))
        .await;
    let task = fx.dispatcher.last().unwrap();
    let _ = fx
        .worker(ScriptedGenerator::failing(GeneratorErrorKind::MalformedContent))
        .run_at(&task, wednesday() + Duration::hours(1))
        .await;

    let outcome = fx
        .sync_at("ana@example.com", &keto(), false, wednesday() + Duration::hours(2))
        .await;
    assert!(outcome.weekly_regenerated, "keto week must still be generated");
}

#[tokio::test]
async fn failed_forced_rebuild_keeps_serving_current_week() {
    let fx = Fixture::new();
    fx.sync_at("ana@example.com", &vegan(), false, wednesday()).await;
    fx.run_last(ScriptedGenerator::ok(), wednesday()).await;

    let forced_at = wednesday() + Duration::hours(1);
    let forced = fx.sync_at("ana@example.com", &vegan(), true, forced_at).await;
    assert!(forced.weekly_regenerated);
    let task = fx.dispatcher.last().unwrap();
    let result = fx
        .worker(ScriptedGenerator::failing(GeneratorErrorKind::UpstreamError))
        .run_at(&task, forced_at)
        .await;
    assert!(result.is_err());

    let outcome = fx
        .sync_at("ana@example.com", &vegan(), false, forced_at + Duration::minutes(1))
        .await;
    assert!(!outcome.weekly_regenerated);
    assert!(!outcome.daily_refreshed);
    assert_eq!(outcome.record.status, PlanStatus::Error);
    assert!(outcome.record.has_content());
    assert_eq!(fx.dispatcher.count(), 2);

    // Next day only the daily slots are refreshed.
    let tomorrow = fx
        .sync_at("ana@example.com", &vegan(), false, wednesday() + Duration::days(1))
        .await;
    assert!(!tomorrow.weekly_regenerated);
    assert!(tomorrow.daily_refreshed);
    assert_eq!(fx.dispatcher.last().unwrap().kind, JobKind::Daily);
}

#[tokio::test]
async fn users_get_separate_records() {
    let fx = Fixture::new();
    let a = fx.sync_at("ana@example.com", &vegan(), false, wednesday()).await;
    let b = fx.sync_at("ben@example.com", &vegan(), false, wednesday()).await;

    assert_ne!(a.record.id, b.record.id);
    assert_eq!(fx.dispatcher.count(), 2);
    assert_eq!(fx.store.len().await, 2);
}

#[tokio::test]
async fn anonymous_requests_share_one_record() {
    let fx = Fixture::new();
    let a = fx
        .engine
        .ensure_plan_at(None, None, &vegan(), false, wednesday())
        .await
        .unwrap();
    let existing = fx.store.find_for_user(None).await.unwrap();
    let b = fx
        .engine
        .ensure_plan_at(existing, None, &vegan(), false, wednesday())
        .await
        .unwrap();

    assert_eq!(a.record.id, b.record.id);
    assert!(a.record.user_key.is_none());
    assert_eq!(fx.dispatcher.count(), 1);
}

#[tokio::test]
async fn stale_snapshot_does_not_double_dispatch() {
    let fx = Fixture::new();
    let created = fx.sync_at("ana@example.com", &vegan(), false, wednesday()).await;
    fx.run_last(ScriptedGenerator::ok(), wednesday()).await;

    // Two callers read the same committed record on the next day.
    let thursday = wednesday() + Duration::days(1);
    let snapshot = fx.store.get(created.record.id).await.unwrap();
    let first = fx
        .engine
        .ensure_plan_at(snapshot.clone(), Some("ana@example.com"), &vegan(), false, thursday)
        .await
        .unwrap();
    let second = fx
        .engine
        .ensure_plan_at(snapshot, Some("ana@example.com"), &vegan(), false, thursday)
        .await
        .unwrap();

    assert!(first.daily_refreshed);
    assert!(!second.daily_refreshed, "loser of the stamp race must not dispatch");
    assert_eq!(second.record.job_id(), first.record.job_id());
    assert_eq!(fx.dispatcher.count(), 2);
}

// ===========================================================================
// Concurrency
// ===========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_requests_dispatch_exactly_once() {
    let fx = Arc::new(Fixture::new());

    let mut handles = Vec::new();
    for _ in 0..32 {
        let fx = Arc::clone(&fx);
        handles.push(tokio::spawn(async move {
            fx.engine
                .sync(Some("crowd@example.com"), &vegan(), false)
                .await
                .unwrap()
        }));
    }

    let mut weekly = 0;
    let mut ids = std::collections::HashSet::new();
    for handle in handles {
        let outcome = handle.await.unwrap();
        ids.insert(outcome.record.id);
        if outcome.weekly_regenerated {
            weekly += 1;
        }
    }

    assert_eq!(ids.len(), 1, "all callers must converge on one record");
    assert_eq!(weekly, 1);
    assert_eq!(fx.dispatcher.count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_next_day_requests_dispatch_one_daily() {
    let fx = Arc::new(Fixture::new());
    fx.sync_at("ana@example.com", &vegan(), false, wednesday()).await;
    fx.run_last(ScriptedGenerator::ok(), wednesday()).await;
    let thursday = wednesday() + Duration::days(1);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let fx = Arc::clone(&fx);
        handles.push(tokio::spawn(async move {
            fx.sync_at("ana@example.com", &vegan(), false, thursday).await
        }));
    }
    let refreshed = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .filter(|o| o.daily_refreshed)
        .count();

    assert_eq!(refreshed, 1);
    assert_eq!(fx.dispatcher.count(), 2);
    assert_eq!(fx.dispatcher.last().unwrap().kind, JobKind::Daily);
}

#[tokio::test]
async fn user_keys_are_normalized() {
    let fx = Fixture::new();
    let a = fx
        .engine
        .sync(Some("  Ana@Example.COM "), &vegan(), false)
        .await
        .unwrap();
    let b = fx
        .engine
        .sync(Some("ana@example.com"), &vegan(), false)
        .await
        .unwrap();

    assert_eq!(a.record.id, b.record.id);
    assert_eq!(a.record.user_key.as_deref(), Some("ana@example.com"));
    // The second call finds the first job still in flight.
    assert!(!b.weekly_regenerated);
    assert_eq!(fx.dispatcher.count(), 1);
}
