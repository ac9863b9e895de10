//! Configuration management for the scheduler.
//!
//! Hierarchical merging: programmatic defaults, then
//! `.metronome/config.yaml`, then `.metronome/local.yaml`, then
//! `METRONOME_*` environment variables (highest priority).

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Invalid check_interval_secs: {0}. Must be at least 1")]
    InvalidCheckInterval(u64),

    #[error("Invalid batch_size: {0}. Must be between 1 and 1000")]
    InvalidBatchSize(u32),

    #[error("Invalid max_concurrent_instances: {0}. Must be at least 1")]
    InvalidMaxConcurrent(u32),

    #[error("Invalid default_timezone: {0}")]
    InvalidDefaultTimezone(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            scheduler: SchedulerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: ".metronome/metronome.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Wall time between scheduler polls.
    pub check_interval_secs: u64,
    /// Due schedules fetched per tick.
    pub batch_size: u32,
    /// Global ceiling on live instances across all schedules. A defensive
    /// upper bound only; per-schedule limits come from `max_instances`.
    pub max_concurrent_instances: u32,
    /// Fallback when a schedule is created without a timezone.
    pub default_timezone: String,
    /// Initial `enabled` for newly created schedules.
    pub enabled_by_default: bool,
    /// Horizon beyond which `next_run_at` is not pre-computed.
    pub max_lookahead_days: u32,
    /// Retention window for terminal instance rows.
    pub cleanup_older_than_days: u32,
    /// Run the retention sweep every N ticks.
    pub cleanup_every_ticks: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 60,
            batch_size: 50,
            max_concurrent_instances: 100,
            default_timezone: "UTC".to_string(),
            enabled_by_default: true,
            max_lookahead_days: 366,
            cleanup_older_than_days: 30,
            cleanup_every_ticks: 60,
        }
    }
}

impl SchedulerConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn cleanup_older_than(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.cleanup_older_than_days))
    }

    pub fn max_lookahead(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.max_lookahead_days))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .metronome/config.yaml (project config)
    /// 3. .metronome/local.yaml (local overrides, optional)
    /// 4. Environment variables (METRONOME_* prefix, highest priority)
    pub fn load() -> Result<Config, ConfigError> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".metronome/config.yaml"))
            .merge(Yaml::file(".metronome/local.yaml"))
            .merge(Env::prefixed("METRONOME_").split("__"))
            .extract()
            .map_err(|e| ConfigError::LoadError(e.to_string()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config, ConfigError> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .map_err(|e| ConfigError::LoadError(e.to_string()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }

        if config.scheduler.check_interval_secs == 0 {
            return Err(ConfigError::InvalidCheckInterval(config.scheduler.check_interval_secs));
        }

        if config.scheduler.batch_size == 0 || config.scheduler.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(config.scheduler.batch_size));
        }

        if config.scheduler.max_concurrent_instances == 0 {
            return Err(ConfigError::InvalidMaxConcurrent(config.scheduler.max_concurrent_instances));
        }

        if config.scheduler.default_timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(ConfigError::InvalidDefaultTimezone(
                config.scheduler.default_timezone.clone(),
            ));
        }

        match config.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => return Err(ConfigError::InvalidLogLevel(other.to_string())),
        }

        match config.logging.format.as_str() {
            "json" | "pretty" => {}
            other => return Err(ConfigError::InvalidLogFormat(other.to_string())),
        }

        Ok(())
    }
}
