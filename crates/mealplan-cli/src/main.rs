mod config;
mod list_cmd;
mod refresh_cmd;
mod sync_cmd;

use clap::{Parser, Subcommand};

use mealplan_core::preferences::PreferenceInput;
use mealplan_core::refresh::DEFAULT_CHUNK_SIZE;
use mealplan_db::config::DbConfig;
use mealplan_db::pool;
use mealplan_db::queries::meal_plans;

use config::MealplanConfig;

#[derive(Parser)]
#[command(name = "mealplan", about = "Weekly meal plans kept fresh by a background generator")]
struct Cli {
    /// Database URL (overrides MEALPLAN_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a mealplan config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = DbConfig::DEFAULT_URL)]
        db_url: String,
        /// API key for the OpenAI-compatible meal planner
        #[arg(long)]
        openai_api_key: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Create and migrate the mealplan database
    DbInit,
    /// Ensure a user's plan is current, dispatching generation if needed
    Sync {
        /// Owner of the plan (omit for the shared anonymous plan)
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        diet: Option<String>,
        #[arg(long)]
        goal: Option<String>,
        #[arg(long)]
        country: Option<String>,
        /// Portion size note (e.g. small, medium, large)
        #[arg(long)]
        portion: Option<String>,
        /// Allergen to avoid; repeat for several
        #[arg(long = "allergen")]
        allergens: Vec<String>,
        /// Regenerate the whole week regardless of freshness
        #[arg(long)]
        force_refresh: bool,
        /// Print the plan again once background generation has finished
        #[arg(long)]
        wait: bool,
        /// Maximum number of concurrent generations
        #[arg(long, default_value_t = 4)]
        max_concurrent: usize,
    },
    /// Show a user's stored plan without refreshing it
    Show {
        #[arg(long)]
        user: Option<String>,
    },
    /// List stored plans with status counts
    List,
    /// Refresh every stored plan
    Refresh {
        /// Regenerate every week instead of only what is stale
        #[arg(long)]
        force_weekly: bool,
        /// Plans fetched per page
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
        /// Maximum number of concurrent generations
        #[arg(long, default_value_t = 4)]
        max_concurrent: usize,
    },
}

/// Execute the `mealplan init` command: write config file.
fn cmd_init(db_url: &str, openai_api_key: Option<String>, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();
    let has_key = openai_api_key.is_some();

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        openai: config::OpenAiSection {
            api_key: openai_api_key,
            ..Default::default()
        },
    };
    config::write_initial_config(&path, &cfg, force)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    if has_key {
        println!("  openai.api_key = (set)");
    } else {
        println!("  openai.api_key not set; export OPENAI_API_KEY or re-run with --openai-api-key");
    }
    println!();
    println!("Next: run `mealplan db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `mealplan db-init` command: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = MealplanConfig::resolve(cli_db_url)?;

    println!("Initializing mealplan database...");

    if pool::ensure_database_exists(&resolved.db_config).await? {
        println!("Created database {}", resolved.db_config.database_url);
    }
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    let result = report_schema(&db_pool).await;
    db_pool.close().await;
    result?;

    println!("mealplan db-init complete.");
    Ok(())
}

async fn report_schema(db_pool: &sqlx::PgPool) -> anyhow::Result<()> {
    pool::run_migrations(db_pool).await?;
    let counts = meal_plans::count_plans_by_status(db_pool).await?;
    println!(
        "Database ready. meal_plans: {} rows (pending={} running={} success={} error={})",
        counts.total, counts.pending, counts.running, counts.success, counts.error,
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so JSON on stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init {
            db_url,
            openai_api_key,
            force,
        } => {
            cmd_init(&db_url, openai_api_key, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::Sync {
            user,
            diet,
            goal,
            country,
            portion,
            allergens,
            force_refresh,
            wait,
            max_concurrent,
        } => {
            let resolved = MealplanConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config_for_workers(max_concurrent)).await?;
            let args = sync_cmd::SyncArgs {
                user,
                preferences: PreferenceInput {
                    diet,
                    goal,
                    country,
                    portion,
                    allergens,
                },
                force_refresh,
                wait,
            };
            let result =
                sync_cmd::run_sync(&db_pool, resolved.generator, max_concurrent, args).await;
            db_pool.close().await;
            result?;
        }
        Commands::Show { user } => {
            let resolved = MealplanConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = sync_cmd::run_show(&db_pool, user.as_deref()).await;
            db_pool.close().await;
            result?;
        }
        Commands::List => {
            let resolved = MealplanConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = list_cmd::run_list(&db_pool).await;
            db_pool.close().await;
            result?;
        }
        Commands::Refresh {
            force_weekly,
            chunk_size,
            max_concurrent,
        } => {
            let resolved = MealplanConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config_for_workers(max_concurrent)).await?;
            let result = refresh_cmd::run_refresh(
                &db_pool,
                resolved.generator,
                max_concurrent,
                force_weekly,
                chunk_size,
            )
            .await;
            db_pool.close().await;
            result?;
        }
    }

    Ok(())
}


#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn sync_collects_repeated_allergens() {
        let cli = Cli::try_parse_from([
            "mealplan",
            "sync",
            "--user",
            "ana@example.com",
            "--allergen",
            "peanut",
            "--allergen",
            "shellfish",
            "--force-refresh",
        ])
        .unwrap();
        let Commands::Sync {
            user,
            allergens,
            force_refresh,
            wait,
            max_concurrent,
            ..
        } = cli.command
        else {
            panic!("expected sync");
        };
        assert_eq!(user.as_deref(), Some("ana@example.com"));
        assert_eq!(allergens, vec!["peanut", "shellfish"]);
        assert!(force_refresh);
        assert!(!wait);
        assert_eq!(max_concurrent, 4);
    }

    #[test]
    fn refresh_defaults_chunk_size() {
        let cli = Cli::try_parse_from(["mealplan", "refresh"]).unwrap();
        let Commands::Refresh {
            force_weekly,
            chunk_size,
            ..
        } = cli.command
        else {
            panic!("expected refresh");
        };
        assert!(!force_weekly);
        assert_eq!(chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn database_url_is_global() {
        let cli =
            Cli::try_parse_from(["mealplan", "list", "--database-url", "postgresql://h/db"])
                .unwrap();
        assert_eq!(cli.database_url.as_deref(), Some("postgresql://h/db"));
    }
}
