//! Configuration of the geolocation client.
//!
//! The `geo` section lives next to the scheduler sections in one YAML file
//! and is overridden with `STEPBATCH_GEO__*` environment variables.
//!
//! ```yaml
//! cache:
//!   max_capacity: 50000
//! geo:
//!   endpoint: "http://ip-api.com/batch"
//!   page_size: 100
//!   timeout_secs: 10
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stepbatch_server::config::load_layered;
use stepbatch_server::{ConfigLoadError, SchedulerConfig};

use crate::batch::MAX_PAGE_SIZE;

/// Scheduler configuration extended with the provider settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct GeoConfig {
    #[serde(flatten)]
    pub scheduler: SchedulerConfig,

    /// Geolocation provider settings
    #[serde(default)]
    pub geo: GeoSettings,
}

/// Geolocation provider settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct GeoSettings {
    /// Batch endpoint of the provider.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Queries per provider request.
    /// Environment variable: `STEPBATCH_GEO__PAGE_SIZE`
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Provider request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for GeoSettings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            page_size: default_page_size(),
            timeout_secs: default_timeout(),
        }
    }
}

impl GeoSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_endpoint() -> String {
    "http://ip-api.com/batch".to_string()
}

fn default_page_size() -> usize {
    MAX_PAGE_SIZE
}

fn default_timeout() -> u64 {
    10
}

impl GeoConfig {
    /// Load configuration from a YAML file with environment variable overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let config: GeoConfig = load_layered(Some(path.as_ref()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config: GeoConfig = load_layered(None)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the scheduler sections and the provider settings.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        self.scheduler.validate()?;

        if self.geo.endpoint.trim().is_empty() {
            return Err(ConfigLoadError::Invalid {
                message: "geo.endpoint cannot be empty".to_string(),
            });
        }

        if !(1..=MAX_PAGE_SIZE).contains(&self.geo.page_size) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "geo.page_size must be between 1 and {MAX_PAGE_SIZE}, got: {}",
                    self.geo.page_size
                ),
            });
        }

        if self.geo.timeout_secs == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "geo.timeout_secs must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}
