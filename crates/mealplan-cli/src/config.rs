//! Configuration file management for mealplan.
//!
//! Provides a TOML-based config file at `~/.config/mealplan/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use mealplan_core::generator::GeneratorConfig;
use mealplan_db::config::DbConfig;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    #[serde(default)]
    pub openai: OpenAiSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct OpenAiSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file already exists at {}\nUse --force to overwrite.", .0.display())]
    AlreadyExists(PathBuf),

    #[error("failed to read config file at {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file at {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the mealplan config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/mealplan` or
/// `~/.config/mealplan`, also on macOS.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("mealplan");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("mealplan")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse a config file.
pub fn load_config_from(path: &Path) -> Result<ConfigFile, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load the config file at the default location, if there is one.
///
/// A missing file is `Ok(None)`; an unreadable or invalid one is an error.
pub fn load_config() -> Result<Option<ConfigFile>, ConfigError> {
    let path = config_path();
    if !path.exists() {
        return Ok(None);
    }
    load_config_from(&path).map(Some)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// The file is owner read/write only on Unix since it may hold an API key.
pub fn save_config_to(path: &Path, config: &ConfigFile) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    }

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

/// Write a fresh config file unless one exists and `force` is unset.
pub fn write_initial_config(path: &Path, config: &ConfigFile, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(ConfigError::AlreadyExists(path.to_path_buf()).into());
    }
    save_config_to(path, config)
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct MealplanConfig {
    pub db_config: DbConfig,
    pub generator: GeneratorConfig,
}

impl MealplanConfig {
    /// Resolve configuration from the default config file location.
    pub fn resolve(cli_db_url: Option<&str>) -> Result<Self> {
        let file = load_config()?;
        Ok(Self::resolve_with(cli_db_url, file.as_ref()))
    }

    /// Resolve using the chain: CLI flag > env var > config file > default.
    ///
    /// - DB URL: `cli_db_url` > `MEALPLAN_DATABASE_URL` > `database.url` > `DbConfig::DEFAULT_URL`
    /// - API key: `OPENAI_API_KEY` > `openai.api_key` > none
    /// - Model and base URL: `MEALPLAN_OPENAI_MODEL` / `MEALPLAN_OPENAI_BASE_URL`
    ///   > `openai.model` / `openai.base_url` > built-in default
    pub fn resolve_with(cli_db_url: Option<&str>, file: Option<&ConfigFile>) -> Self {
        let db_url = cli_db_url
            .map(str::to_owned)
            .or_else(|| {
                std::env::var(DbConfig::ENV_VAR)
                    .ok()
                    .filter(|v| !v.trim().is_empty())
            })
            .or_else(|| file.map(|f| f.database.url.clone()))
            .unwrap_or_else(|| DbConfig::DEFAULT_URL.to_owned());

        // File values first, then the environment on top.
        let mut generator = GeneratorConfig::default();
        if let Some(openai) = file.map(|f| &f.openai) {
            generator.api_key.clone_from(&openai.api_key);
            if let Some(model) = &openai.model {
                generator = generator.with_model(model.as_str());
            }
            if let Some(url) = &openai.base_url {
                generator = generator.with_base_url(url.as_str());
            }
        }

        Self {
            db_config: DbConfig::new(db_url).with_pool_env(),
            generator: generator.with_env(),
        }
    }

    /// Database settings with enough connections for `workers` concurrent
    /// generations plus the caller's own queries.
    pub fn db_config_for_workers(&self, workers: usize) -> DbConfig {
        let needed = u32::try_from(workers.saturating_add(2)).unwrap_or(u32::MAX);
        let current = self.db_config.max_connections;
        self.db_config.clone().with_max_connections(current.max(needed))
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
