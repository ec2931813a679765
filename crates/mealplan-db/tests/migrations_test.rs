//! Integration tests for embedded migrations and pool helpers.
//!
//! These tests use the shared PostgreSQL from `mealplan-test-utils`
//! (testcontainers, or `MEALPLAN_TEST_PG_URL` when set).

use sqlx::Row;
use uuid::Uuid;

use mealplan_db::config::DbConfig;
use mealplan_db::pool;
use mealplan_db::queries::meal_plans;
use mealplan_test_utils::{create_test_db, drop_test_db, pg_url};

#[tokio::test]
async fn migrations_create_meal_plans_table() {
    let (pool, db_name) = create_test_db().await;

    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT tablename::text FROM pg_tables \
         WHERE schemaname = 'public' AND tablename NOT LIKE '\\_sqlx%' \
         ORDER BY tablename",
    )
    .fetch_all(&pool)
    .await
    .expect("should list tables");

    let names: Vec<&str> = rows.iter().map(|(n,)| n.as_str()).collect();
    assert_eq!(names, vec!["meal_plans"]);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let (pool, db_name) = create_test_db().await;

    // create_test_db already ran them once.
    pool::run_migrations(&pool)
        .await
        .expect("second migration run should succeed");

    let row = sqlx::query("SELECT COUNT(*) AS cnt FROM meal_plans")
        .fetch_one(&pool)
        .await
        .expect("count should succeed");
    let count: i64 = row.get("cnt");
    assert_eq!(count, 0);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn fresh_schema_reports_no_plans() {
    let (pool, db_name) = create_test_db().await;

    let counts = meal_plans::count_plans_by_status(&pool)
        .await
        .expect("count_plans_by_status should succeed");
    assert_eq!(counts.total, 0);
    assert_eq!(counts.pending + counts.running + counts.success + counts.error, 0);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn ensure_database_exists_creates_once() {
    let db_name = format!("mealplan_test_{}", Uuid::new_v4().simple());
    let config = DbConfig::new(format!("{}/{db_name}", pg_url().await)).with_max_connections(3);

    let created = pool::ensure_database_exists(&config)
        .await
        .expect("first ensure should succeed");
    assert!(created);
    let created_again = pool::ensure_database_exists(&config)
        .await
        .expect("second ensure should succeed");
    assert!(!created_again);

    let db = pool::create_pool(&config)
        .await
        .expect("should connect to created database");
    assert_eq!(db.options().get_max_connections(), 3);
    pool::run_migrations(&db).await.expect("migrations should succeed");
    db.close().await;

    drop_test_db(&db_name).await;
}
