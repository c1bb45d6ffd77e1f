use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub lifecycle: LifecycleConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    /// Optional database URL. If not provided, defaults to a per-user data dir.
    pub url: Option<String>,
    /// Maximum number of pooled connections.
    pub max_connections: u32,
    /// Connection acquire timeout in seconds.
    pub connection_timeout: u64,
}

/// Lifecycle Engine / Stale Sweeper tunables, per §6.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LifecycleConfig {
    /// How long a reservation may sit `in_progress` before the Stale Sweeper
    /// auto-unlocks it, in hours.
    pub stale_timeout_hours: u64,
    /// How often the Stale Sweeper runs, in seconds.
    pub stale_sweep_interval_secs: u64,
    /// Bounded retries (with jittered backoff) the Lifecycle Engine spends
    /// on a `TransactionAborted` write before surfacing it to the caller.
    pub writer_retry_budget: u32,
    /// Queries slower than this are logged at `warn`, per §6.
    pub slow_query_log_threshold_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (pretty, json, compact)
    pub format: LogFormat,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn from_env() -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        builder = builder.add_source(File::from_str(
            include_str!("../config/default.toml"),
            FileFormat::Toml,
        ));

        if let Ok(config_file) = env::var("CONFIG_FILE") {
            builder = builder.add_source(
                File::with_name(&config_file)
                    .required(false)
                    .format(FileFormat::Toml),
            );
        }

        // TASKD_-prefixed env vars override the file (e.g. TASKD_DATABASE_URL).
        builder = builder.add_source(
            Environment::with_prefix("TASKD")
                .separator("_")
                .try_parsing(true),
        );

        let config = builder.build().context("failed to build configuration")?;

        let mut result: Config = config
            .try_deserialize()
            .context("failed to deserialize configuration")?;

        Self::apply_standard_env_vars(&mut result);

        Ok(result)
    }

    /// Load configuration from a specific file path.
    pub fn from_file(path: &str) -> Result<Self> {
        let builder = ConfigBuilder::builder()
            .add_source(File::with_name(path).format(FileFormat::Toml))
            .add_source(
                Environment::with_prefix("TASKD")
                    .separator("_")
                    .try_parsing(true),
            );

        let config = builder.build().context("failed to build configuration from file")?;

        config
            .try_deserialize()
            .context("failed to deserialize configuration from file")
    }

    /// Standard, unprefixed env vars accepted for compatibility with common
    /// deployment patterns (DATABASE_URL, LOG_LEVEL).
    fn apply_standard_env_vars(config: &mut Config) {
        if let Ok(database_url) = env::var("DATABASE_URL") {
            config.database.url = Some(database_url);
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.logging.level = log_level;
        }
    }

    /// The database URL, falling back to a per-user data directory.
    pub fn database_url(&self) -> String {
        match &self.database.url {
            Some(url) => url.clone(),
            None => Self::default_database_url(),
        }
    }

    pub fn default_database_url() -> String {
        if let Ok(xdg_data) = env::var("XDG_DATA_HOME") {
            return format!("sqlite://{xdg_data}/task-coordinator/tasks.sqlite");
        }
        let home = env::var("HOME")
            .or_else(|_| env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string());
        format!("sqlite://{home}/.local/share/task-coordinator/tasks.sqlite")
    }

    pub fn stale_timeout(&self) -> chrono::Duration {
        chrono::Duration::hours(self.lifecycle.stale_timeout_hours as i64)
    }

    pub fn stale_sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.lifecycle.stale_sweep_interval_secs)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(anyhow::anyhow!(
                    "invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                ));
            }
        }

        let database_url = self.database_url();
        if !database_url.starts_with("sqlite://") && database_url != ":memory:" {
            return Err(anyhow::anyhow!(
                "only SQLite databases are supported. URL must start with 'sqlite://'. Got: {}",
                database_url
            ));
        }

        if self.database.max_connections == 0 {
            return Err(anyhow::anyhow!("database.max_connections must be greater than 0"));
        }

        if self.lifecycle.stale_timeout_hours == 0 {
            return Err(anyhow::anyhow!("lifecycle.stale_timeout_hours must be greater than 0"));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: None,
                max_connections: 5,
                connection_timeout: 30,
            },
            lifecycle: LifecycleConfig {
                stale_timeout_hours: 24,
                stale_sweep_interval_secs: 900,
                writer_retry_budget: 3,
                slow_query_log_threshold_ms: 100,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Pretty,
            },
        }
    }
}

/// Default database file path, used when no env/config override is set.
#[allow(dead_code)]
pub fn default_database_path() -> PathBuf {
    let home = env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".local/share/task-coordinator/tasks.sqlite")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let config = Config::default();
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.lifecycle.stale_timeout_hours, 24);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn database_url_falls_back_to_default() {
        let config = Config::default();
        let url = config.database_url();
        assert!(url.starts_with("sqlite://"));
        assert!(url.contains("tasks.sqlite"));
    }

    #[test]
    fn database_url_honors_override() {
        let mut config = Config::default();
        config.database.url = Some("sqlite://custom.db".to_string());
        assert_eq!(config.database_url(), "sqlite://custom.db");
    }

    #[test]
    fn validate_rejects_bad_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_stale_timeout() {
        let mut config = Config::default();
        config.lifecycle.stale_timeout_hours = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn stale_timeout_converts_hours_to_duration() {
        let config = Config::default();
        assert_eq!(config.stale_timeout(), chrono::Duration::hours(24));
    }
}
