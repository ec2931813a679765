//! Connection pool, schema migrations, and first-run database setup.

use anyhow::{Context, Result, bail};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};

use crate::config::DbConfig;

/// Schema for `meal_plans`, embedded from `crates/mealplan-db/migrations/`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// Open a pool sized by `config`.
pub async fn create_pool(config: &DbConfig) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(&config.database_url)
        .await
        .with_context(|| format!("cannot open a pool on {}", config.database_url))
}

/// Bring the schema up to date. Already-applied migrations are skipped.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .context("meal_plans schema migration failed")?;
    tracing::info!(known = MIGRATOR.iter().count(), "schema up to date");
    Ok(())
}

/// Create the database named in `config` when the server does not have it
/// yet. Returns whether it had to be created.
pub async fn ensure_database_exists(config: &DbConfig) -> Result<bool> {
    let Some(name) = config.database_name() else {
        bail!("no database name in {}", config.database_url);
    };
    let ident = quote_ident(name)?;

    // One short-lived connection to the server's `postgres` database.
    let admin_url = config.maintenance_url();
    let admin = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(config.acquire_timeout)
        .connect(&admin_url)
        .await
        .with_context(|| format!("cannot reach {admin_url} to check for {name}"))?;

    let result = create_if_missing(&admin, name, &ident).await;
    admin.close().await;
    result
}

async fn create_if_missing(admin: &PgPool, name: &str, ident: &str) -> Result<bool> {
    let found: Option<i32> = sqlx::query_scalar("SELECT 1 FROM pg_database WHERE datname = $1")
        .bind(name)
        .fetch_optional(admin)
        .await
        .with_context(|| format!("lookup of database {name} failed"))?;
    if found.is_some() {
        tracing::debug!(db = name, "database present");
        return Ok(false);
    }

    admin
        .execute(format!("CREATE DATABASE {ident}").as_str())
        .await
        .with_context(|| format!("CREATE DATABASE {ident} failed"))?;
    tracing::info!(db = name, "database created");
    Ok(true)
}

/// Double-quoted SQL identifier; `CREATE DATABASE` cannot bind its name.
fn quote_ident(name: &str) -> Result<String> {
    if name.is_empty() || name.contains('\0') {
        bail!("{name:?} is not a usable database name");
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}
