use std::env;
use std::time::Duration;

/// Database configuration.
///
/// Reads from the `MEALPLAN_DATABASE_URL` environment variable, falling back
/// to `postgresql://localhost:5432/mealplan` when unset.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Full PostgreSQL connection URL.
    pub database_url: String,
    /// Pool size. Every plan transition is a read followed by a versioned
    /// write, and each running generation holds a connection for both, so
    /// this should stay above the worker pool's concurrency.
    pub max_connections: u32,
    /// How long a caller waits for a free connection.
    pub acquire_timeout: Duration,
}

impl DbConfig {
    /// The default connection URL used when no environment variable is set.
    pub const DEFAULT_URL: &str = "postgresql://localhost:5432/mealplan";

    /// Environment variable consulted by [`DbConfig::from_env`].
    pub const ENV_VAR: &str = "MEALPLAN_DATABASE_URL";

    pub const MAX_CONNECTIONS_VAR: &str = "MEALPLAN_DB_MAX_CONNECTIONS";
    pub const ACQUIRE_TIMEOUT_VAR: &str = "MEALPLAN_DB_ACQUIRE_TIMEOUT_SECS";

    pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
    pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(15);

    /// Build a config from the environment. Unset or unparseable pool
    /// settings fall back to the defaults.
    pub fn from_env() -> Self {
        let database_url =
            env::var(Self::ENV_VAR).unwrap_or_else(|_| Self::DEFAULT_URL.to_owned());
        Self::new(database_url).with_pool_env()
    }

    /// Build a config from an explicit URL (useful for tests and CLI flags).
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: Self::DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Self::DEFAULT_ACQUIRE_TIMEOUT,
        }
    }

    /// Override pool settings from `MEALPLAN_DB_MAX_CONNECTIONS` and
    /// `MEALPLAN_DB_ACQUIRE_TIMEOUT_SECS` where they are set.
    pub fn with_pool_env(mut self) -> Self {
        let parsed = |name: &str| env::var(name).ok().and_then(|v| v.trim().parse::<u64>().ok());
        if let Some(n) = parsed(Self::MAX_CONNECTIONS_VAR).filter(|n| *n > 0) {
            self.max_connections = u32::try_from(n).unwrap_or(u32::MAX);
        }
        if let Some(secs) = parsed(Self::ACQUIRE_TIMEOUT_VAR).filter(|s| *s > 0) {
            self.acquire_timeout = Duration::from_secs(secs);
        }
        self
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections.max(1);
        self
    }

    /// Extract the database name from the URL, ignoring any query string.
    ///
    /// Returns `None` if the URL has no path component.
    pub fn database_name(&self) -> Option<&str> {
        let without_query = self
            .database_url
            .split_once('?')
            .map_or(self.database_url.as_str(), |(base, _)| base);
        without_query.rsplit('/').next().filter(|s| !s.is_empty())
    }

    /// Return a URL pointing at the `postgres` maintenance database on the
    /// same host. Used to issue `CREATE DATABASE` when the target DB does not
    /// yet exist.
    pub fn maintenance_url(&self) -> String {
        match self.database_url.rfind('/') {
            Some(pos) => {
                let mut url = self.database_url[..pos].to_owned();
                url.push_str("/postgres");
                url
            }
            None => self.database_url.clone(),
        }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
