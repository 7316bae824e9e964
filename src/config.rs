//! Application configuration
//!
//! Built-in defaults, overridden by an optional `config/default.*` file, then
//! by `SPATIAL_AGENT__<SECTION>__<KEY>` environment variables.

use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_with::serde_as;
use spatial_shared::{default_confirmation_actions, limits, Action};

use crate::error::ActionError;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub device_api: DeviceApiConfig,
    pub retry: RetryConfig,
    pub dispatcher: DispatcherConfig,
    pub query: QueryConfig,
    pub database: DatabaseConfig,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DeviceApiConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub connect_timeout: Duration,
}

impl Default for DeviceApiConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080".to_string(),
            api_key: None,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

#[serde_as]
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub min_wait: Duration,
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub max_wait: Duration,
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub attempt_timeout: Duration,
    /// Deadline for a whole logical request, waits included
    #[serde_as(as = "Option<serde_with::DurationMilliSeconds<u64>>")]
    pub overall_timeout: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_wait: Duration::from_millis(500),
            max_wait: Duration::from_secs(10),
            attempt_timeout: Duration::from_secs(10),
            overall_timeout: Some(Duration::from_secs(60)),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Actions that need the caller's explicit confirmation flag
    pub confirmation_required: Vec<Action>,
    /// When set, only these actions may be submitted
    pub allowed_actions: Option<Vec<Action>>,
    /// Upper bound on per-device history returned in one call
    pub history_limit: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            confirmation_required: default_confirmation_actions(),
            allowed_actions: None,
            history_limit: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct QueryConfig {
    pub max_rows: u32,
    /// Search radius for point queries, in meters
    pub point_radius_m: f64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_rows: limits::DEFAULT_MAX_ROWS,
            point_radius_m: 25.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/spatial".to_string(),
            max_connections: 10,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_prefix("SPATIAL_AGENT")
    }

    fn load_with_prefix(prefix: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("dispatcher.confirmation_required")
                    .with_list_parse_key("dispatcher.allowed_actions"),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), ActionError> {
        if self.device_api.endpoint.trim().is_empty() {
            return Err(ActionError::Configuration(
                "Device API endpoint cannot be empty".to_string(),
            ));
        }
        self.retry.validate()?;
        if self.query.max_rows == 0 {
            return Err(ActionError::Configuration(
                "Maximum row count must be greater than zero".to_string(),
            ));
        }
        if !(self.query.point_radius_m.is_finite() && self.query.point_radius_m > 0.0) {
            return Err(ActionError::Configuration(
                "Point search radius must be a positive distance".to_string(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(ActionError::Configuration(
                "Database pool needs at least one connection".to_string(),
            ));
        }
        Ok(())
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), ActionError> {
        if self.max_attempts == 0 {
            return Err(ActionError::Configuration(
                "Retry attempts must be greater than zero".to_string(),
            ));
        }
        if self.min_wait > self.max_wait {
            return Err(ActionError::Configuration(format!(
                "Minimum retry wait {:?} exceeds maximum {:?}",
                self.min_wait, self.max_wait
            )));
        }
        if self.attempt_timeout.is_zero() {
            return Err(ActionError::Configuration(
                "Attempt timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
