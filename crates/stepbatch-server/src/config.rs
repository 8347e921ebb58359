//! Configuration management for the step scheduler.
//!
//! This module provides configuration loading with multiple sources:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables (override)
//!
//! Environment variables take precedence over config file values,
//! which take precedence over defaults.
//!
//! # Example
//!
//! ```ignore
//! use stepbatch_server::config::SchedulerConfig;
//!
//! // Load from file with env overrides
//! let config = SchedulerConfig::load("stepbatch.yaml")?;
//!
//! // Or load from environment only
//! let config = SchedulerConfig::from_env()?;
//! ```

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use stepbatch_domain::ResultCacheConfig;

/// Scheduler configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct SchedulerConfig {
    /// Result cache settings
    #[serde(default)]
    pub cache: CacheSettings,

    /// Step boundary settings
    #[serde(default)]
    pub step: StepSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Result cache settings.
///
/// # Example YAML Configuration
///
/// ```yaml
/// cache:
///   enabled: true
///   max_capacity: 10000
///   ttl_secs: 300
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CacheSettings {
    /// Store results of idempotent reads.
    /// Environment variable: `STEPBATCH_CACHE__ENABLED`
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum number of cached entries.
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,

    /// Entry time-to-live in seconds. Unset keeps entries until a mutation
    /// invalidates them.
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_capacity: default_max_capacity(),
            ttl_secs: None,
        }
    }
}

impl CacheSettings {
    /// Builds the result cache configuration from these settings.
    pub fn to_cache_config(&self) -> ResultCacheConfig {
        let config = ResultCacheConfig::default()
            .with_enabled(self.enabled)
            .with_max_capacity(self.max_capacity);
        match self.ttl_secs {
            Some(secs) => config.with_ttl(Duration::from_secs(secs)),
            None => config,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_capacity() -> u64 {
    10_000
}

/// Step boundary settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StepSettings {
    /// Period of the automatic step loop in milliseconds.
    #[serde(default = "default_step_interval")]
    pub interval_ms: u64,
}

impl Default for StepSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_step_interval(),
        }
    }
}

impl StepSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

fn default_step_interval() -> u64 {
    10
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development)
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl SchedulerConfig {
    /// Load configuration from a YAML file with environment variable overrides.
    ///
    /// Environment variables are prefixed with `STEPBATCH_` and use `__` as
    /// separator. For example:
    /// - `STEPBATCH_CACHE__MAX_CAPACITY=500` overrides `cache.max_capacity`
    /// - `STEPBATCH_STEP__INTERVAL_MS=50` overrides `step.interval_ms`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let scheduler_config: SchedulerConfig = load_layered(Some(path.as_ref()))?;
        scheduler_config.validate()?;
        Ok(scheduler_config)
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let scheduler_config: SchedulerConfig = load_layered(None)?;
        scheduler_config.validate()?;
        Ok(scheduler_config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.cache.max_capacity == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "cache.max_capacity must be greater than 0".to_string(),
            });
        }

        if self.cache.ttl_secs == Some(0) {
            return Err(ConfigLoadError::Invalid {
                message: "cache.ttl_secs must be greater than 0 when set".to_string(),
            });
        }

        if self.step.interval_ms == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "step.interval_ms must be greater than 0".to_string(),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "logging.level must be one of: {:?}, got: {}",
                    valid_levels, self.logging.level
                ),
            });
        }

        Ok(())
    }
}

/// Builds a configuration of type `T` from its defaults, an optional YAML
/// file and `STEPBATCH_*` environment variables, in increasing precedence.
///
/// Batch kinds with their own sections use this to extend the scheduler
/// configuration in the same file. Validation is left to the caller.
pub fn load_layered<T>(path: Option<&Path>) -> Result<T, ConfigLoadError>
where
    T: Default + Serialize + DeserializeOwned,
{
    let mut builder = Config::builder().add_source(Config::try_from(&T::default())?);

    if let Some(path) = path {
        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
    }

    Ok(builder.add_source(env_source()).build()?.try_deserialize()?)
}

// Use __ as separator for nested keys: STEPBATCH_CACHE__ENABLED -> cache.enabled
fn env_source() -> Environment {
    Environment::with_prefix("STEPBATCH")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
