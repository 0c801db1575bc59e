//! Configuration for the statistics cache pipeline.
//!
//! Covers the static enable switch, submission batch size, trigger
//! intervals, job time budget, collaborator endpoints and storage layout.

use std::time::Duration;
use thiserror::Error;

use crate::compute::{CachePaths, JobTemplate};

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for the statistics cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    // Scheduling
    /// Static switch; when false the scheduler clears all periodic work.
    pub enabled: bool,
    /// Maximum repertoire entries holding a job id at once.
    pub max_jobs: usize,
    /// Period of the discovery trigger.
    pub discovery_interval: Duration,
    /// Period of the check (submit or poll) trigger.
    pub check_interval: Duration,

    // Job budget
    /// Wall-clock hours granted at `time_multiplier == 1`.
    pub base_job_hours: u32,
    /// Cap on the wall-clock budget.
    pub max_job_hours: u32,

    // Remote compute
    pub compute_url: Option<String>,
    pub compute_token: Option<String>,
    /// Storage system holding job archives.
    pub storage_system: String,
    /// Root directory of the cache layout.
    pub cache_root: String,
    pub app_id: String,
    pub app_queue: String,
    /// Base URL the remote platform calls back on job events.
    pub callback_url: String,

    // Infrastructure
    /// PostgreSQL URL; in-memory registry when unset.
    pub database_url: Option<String>,
    /// Redis URL; in-process queue when unset.
    pub redis_url: Option<String>,
    pub queue_name: String,
    pub slack_webhook: Option<String>,
    pub listen_addr: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_jobs: 10,
            discovery_interval: Duration::from_secs(3600),
            check_interval: Duration::from_secs(600),

            base_job_hours: 1,
            max_job_hours: 48,

            compute_url: None,
            compute_token: None,
            storage_system: "data-storage".to_string(),
            cache_root: "/community/cache".to_string(),
            app_id: "statistics".to_string(),
            app_queue: "normal".to_string(),
            callback_url: "http://localhost:8080".to_string(),

            database_url: None,
            redis_url: None,
            queue_name: "stats-cache".to_string(),
            slack_webhook: None,
            listen_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `STATS_CACHE_ENABLE`: Static enable switch (default: false)
    /// - `STATS_CACHE_MAX_JOBS`: Concurrent job limit (default: 10)
    /// - `STATS_CACHE_DISCOVERY_INTERVAL_SECS`: Discovery period (default: 3600)
    /// - `STATS_CACHE_CHECK_INTERVAL_SECS`: Check period (default: 600)
    /// - `STATS_CACHE_BASE_JOB_HOURS`: Base job budget (default: 1)
    /// - `STATS_CACHE_MAX_JOB_HOURS`: Job budget cap (default: 48)
    /// - `STATS_CACHE_COMPUTE_URL` / `STATS_CACHE_COMPUTE_TOKEN`: Remote platform
    /// - `STATS_CACHE_STORAGE_SYSTEM`: Archive storage system (default: data-storage)
    /// - `STATS_CACHE_ROOT`: Cache root (default: /community/cache)
    /// - `STATS_CACHE_APP_ID` / `STATS_CACHE_APP_QUEUE`: Job application and queue
    /// - `STATS_CACHE_CALLBACK_URL`: Webhook base URL (default: http://localhost:8080)
    /// - `DATABASE_URL`: PostgreSQL URL (optional)
    /// - `REDIS_URL`: Redis URL (optional)
    /// - `STATS_CACHE_QUEUE_NAME`: Redis queue name (default: stats-cache)
    /// - `STATS_CACHE_SLACK_WEBHOOK`: Slack incoming webhook (optional)
    /// - `STATS_CACHE_LISTEN_ADDR`: Listener address (default: 0.0.0.0:8080)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value or the
    /// resulting configuration fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("STATS_CACHE_ENABLE") {
            config.enabled = parse_env_bool(&val, "STATS_CACHE_ENABLE")?;
        }

        if let Ok(val) = std::env::var("STATS_CACHE_MAX_JOBS") {
            config.max_jobs = parse_env_value(&val, "STATS_CACHE_MAX_JOBS")?;
        }

        if let Ok(val) = std::env::var("STATS_CACHE_DISCOVERY_INTERVAL_SECS") {
            let secs: u64 = parse_env_value(&val, "STATS_CACHE_DISCOVERY_INTERVAL_SECS")?;
            config.discovery_interval = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("STATS_CACHE_CHECK_INTERVAL_SECS") {
            let secs: u64 = parse_env_value(&val, "STATS_CACHE_CHECK_INTERVAL_SECS")?;
            config.check_interval = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("STATS_CACHE_BASE_JOB_HOURS") {
            config.base_job_hours = parse_env_value(&val, "STATS_CACHE_BASE_JOB_HOURS")?;
        }

        if let Ok(val) = std::env::var("STATS_CACHE_MAX_JOB_HOURS") {
            config.max_job_hours = parse_env_value(&val, "STATS_CACHE_MAX_JOB_HOURS")?;
        }

        config.compute_url = std::env::var("STATS_CACHE_COMPUTE_URL").ok();
        config.compute_token = std::env::var("STATS_CACHE_COMPUTE_TOKEN").ok();

        if let Ok(val) = std::env::var("STATS_CACHE_STORAGE_SYSTEM") {
            config.storage_system = val;
        }

        if let Ok(val) = std::env::var("STATS_CACHE_ROOT") {
            config.cache_root = val;
        }

        if let Ok(val) = std::env::var("STATS_CACHE_APP_ID") {
            config.app_id = val;
        }

        if let Ok(val) = std::env::var("STATS_CACHE_APP_QUEUE") {
            config.app_queue = val;
        }

        if let Ok(val) = std::env::var("STATS_CACHE_CALLBACK_URL") {
            config.callback_url = val;
        }

        config.database_url = std::env::var("DATABASE_URL").ok();
        config.redis_url = std::env::var("REDIS_URL").ok();

        if let Ok(val) = std::env::var("STATS_CACHE_QUEUE_NAME") {
            config.queue_name = val;
        }

        config.slack_webhook = std::env::var("STATS_CACHE_SLACK_WEBHOOK").ok();

        if let Ok(val) = std::env::var("STATS_CACHE_LISTEN_ADDR") {
            config.listen_addr = val;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_jobs == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_jobs must be greater than 0".to_string(),
            ));
        }

        if self.discovery_interval.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "discovery_interval must be greater than 0".to_string(),
            ));
        }

        if self.check_interval.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "check_interval must be greater than 0".to_string(),
            ));
        }

        if self.base_job_hours == 0 {
            return Err(ConfigError::ValidationFailed(
                "base_job_hours must be at least 1".to_string(),
            ));
        }

        if self.max_job_hours < self.base_job_hours {
            return Err(ConfigError::ValidationFailed(
                "max_job_hours cannot be less than base_job_hours".to_string(),
            ));
        }

        if self.cache_root.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "cache_root cannot be empty".to_string(),
            ));
        }

        if self.app_id.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "app_id cannot be empty".to_string(),
            ));
        }

        if self.queue_name.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "queue_name cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Cache path layout rooted at `cache_root`.
    pub fn paths(&self) -> CachePaths {
        CachePaths::new(self.cache_root.clone())
    }

    /// Static part of every job specification.
    pub fn job_template(&self) -> JobTemplate {
        JobTemplate {
            app_id: self.app_id.clone(),
            batch_queue: self.app_queue.clone(),
            storage_system: self.storage_system.clone(),
            callback_url: self.callback_url.clone(),
            paths: self.paths(),
        }
    }

    /// Builder method to set the static enable switch.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Builder method to set the concurrent job limit.
    pub fn with_max_jobs(mut self, max_jobs: usize) -> Self {
        self.max_jobs = max_jobs;
        self
    }

    /// Builder method to set the discovery period.
    pub fn with_discovery_interval(mut self, interval: Duration) -> Self {
        self.discovery_interval = interval;
        self
    }

    /// Builder method to set the check period.
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Builder method to set the base and maximum job budget.
    pub fn with_job_hours(mut self, base: u32, max: u32) -> Self {
        self.base_job_hours = base;
        self.max_job_hours = max;
        self
    }

    /// Builder method to set the cache root.
    pub fn with_cache_root(mut self, root: impl Into<String>) -> Self {
        self.cache_root = root.into();
        self
    }

    /// Builder method to set the job application id.
    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = app_id.into();
        self
    }

    /// Builder method to set the callback base URL.
    pub fn with_callback_url(mut self, url: impl Into<String>) -> Self {
        self.callback_url = url.into();
        self
    }

    /// Builder method to set the remote platform endpoint.
    pub fn with_compute(mut self, url: impl Into<String>, token: Option<String>) -> Self {
        self.compute_url = Some(url.into());
        self.compute_token = token;
        self
    }

    /// Builder method to set the database URL.
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Builder method to set the Redis URL.
    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = Some(url.into());
        self
    }

    /// Builder method to set the Slack webhook.
    pub fn with_slack_webhook(mut self, url: impl Into<String>) -> Self {
        self.slack_webhook = Some(url.into());
        self
    }

    /// Builder method to set the listener address.
    pub fn with_listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = addr.into();
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.max_jobs, 10);
        assert_eq!(config.discovery_interval, Duration::from_secs(3600));
        assert_eq!(config.check_interval, Duration::from_secs(600));
        assert_eq!(config.base_job_hours, 1);
        assert_eq!(config.max_job_hours, 48);
        assert_eq!(config.cache_root, "/community/cache");
        assert!(config.database_url.is_none());
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = CacheConfig::new()
            .with_enabled(true)
            .with_max_jobs(3)
            .with_check_interval(Duration::from_secs(60))
            .with_job_hours(2, 24)
            .with_cache_root("/data/cache")
            .with_callback_url("https://stats.example.org")
            .with_compute("https://compute.example.org", Some("t".to_string()))
            .with_database_url("postgres://test/db");

        assert!(config.enabled);
        assert_eq!(config.max_jobs, 3);
        assert_eq!(config.check_interval, Duration::from_secs(60));
        assert_eq!(config.base_job_hours, 2);
        assert_eq!(config.max_job_hours, 24);
        assert_eq!(config.paths().root(), "/data/cache");
        assert_eq!(config.job_template().callback_url, "https://stats.example.org");
        assert_eq!(config.compute_url.as_deref(), Some("https://compute.example.org"));
        assert_eq!(config.database_url.as_deref(), Some("postgres://test/db"));
    }

    #[test]
    fn test_validation_valid_config() {
        assert!(CacheConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_zero_max_jobs() {
        let result = CacheConfig::default().with_max_jobs(0).validate();
        assert!(result.unwrap_err().to_string().contains("max_jobs"));
    }

    #[test]
    fn test_validation_zero_interval() {
        let result = CacheConfig::default()
            .with_discovery_interval(Duration::ZERO)
            .validate();
        assert!(result.unwrap_err().to_string().contains("discovery_interval"));

        let result = CacheConfig::default()
            .with_check_interval(Duration::ZERO)
            .validate();
        assert!(result.unwrap_err().to_string().contains("check_interval"));
    }

    #[test]
    fn test_validation_job_hours() {
        let result = CacheConfig::default().with_job_hours(0, 48).validate();
        assert!(result.unwrap_err().to_string().contains("base_job_hours"));

        let result = CacheConfig::default().with_job_hours(8, 4).validate();
        assert!(result.unwrap_err().to_string().contains("max_job_hours"));
    }

    #[test]
    fn test_validation_empty_root_and_app() {
        let result = CacheConfig::default().with_cache_root(" ").validate();
        assert!(result.unwrap_err().to_string().contains("cache_root"));

        let result = CacheConfig::default().with_app_id("").validate();
        assert!(result.unwrap_err().to_string().contains("app_id"));
    }

    #[test]
    fn test_parse_env_bool() {
        assert!(parse_env_bool("true", "test").unwrap());
        assert!(parse_env_bool("1", "test").unwrap());
        assert!(parse_env_bool("YES", "test").unwrap());
        assert!(parse_env_bool(" on ", "test").unwrap());

        assert!(!parse_env_bool("false", "test").unwrap());
        assert!(!parse_env_bool("0", "test").unwrap());
        assert!(!parse_env_bool("off", "test").unwrap());

        assert!(parse_env_bool("maybe", "test").is_err());
    }

    #[test]
    fn test_parse_env_value() {
        let jobs: usize = parse_env_value("25", "STATS_CACHE_MAX_JOBS").unwrap();
        assert_eq!(jobs, 25);
        let err = parse_env_value::<u32>("ten", "STATS_CACHE_MAX_JOBS").unwrap_err();
        assert!(err.to_string().contains("STATS_CACHE_MAX_JOBS"));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingEnvVar("STATS_CACHE_COMPUTE_URL".to_string());
        assert!(err.to_string().contains("STATS_CACHE_COMPUTE_URL"));

        let err = ConfigError::InvalidValue {
            key: "KEY".to_string(),
            message: "bad value".to_string(),
        };
        assert!(err.to_string().contains("KEY"));
        assert!(err.to_string().contains("bad value"));
    }
}
