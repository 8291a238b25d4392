//! Configuration loading and validation.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::engine::EngineOptions;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Attendance service endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the attendance service
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_base_url() -> String {
    "http://localhost:3000/api/attendance/".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout(),
        }
    }
}

/// Engine cadence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Live duration tick cadence in milliseconds
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Periodic reconciliation interval in seconds
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,

    /// Delay before the post-punch confirming reconciliation, milliseconds
    #[serde(default = "default_deferred_reconcile_delay_ms")]
    pub deferred_reconcile_delay_ms: u64,

    /// Upper bound on the geolocation wait, milliseconds
    #[serde(default = "default_geolocation_timeout_ms")]
    pub geolocation_timeout_ms: u64,
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_reconcile_interval_secs() -> u64 {
    60
}

fn default_deferred_reconcile_delay_ms() -> u64 {
    500
}

fn default_geolocation_timeout_ms() -> u64 {
    3000
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
            deferred_reconcile_delay_ms: default_deferred_reconcile_delay_ms(),
            geolocation_timeout_ms: default_geolocation_timeout_ms(),
        }
    }
}

/// Fixed terminal coordinates attached to punches when configured.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeolocationConfig {
    pub latitude: f64,
    pub longitude: f64,
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Employee this session punches for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<String>,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geolocation: Option<GeolocationConfig>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            employee_id: None,
            log_level: default_log_level(),
            service: ServiceConfig::default(),
            timing: TimingConfig::default(),
            geolocation: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.service.base_url).map_err(|e| {
            ConfigError::ValidationError(format!(
                "service.base_url is not a valid URL: {}",
                e
            ))
        })?;

        if self.service.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "service.timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.timing.tick_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "timing.tick_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.timing.reconcile_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "timing.reconcile_interval_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Engine options derived from this configuration.
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            employee_id: self.employee_id.clone(),
            tick_interval: Duration::from_millis(self.timing.tick_interval_ms),
            reconcile_interval: Duration::from_secs(self.timing.reconcile_interval_secs),
            deferred_reconcile_delay: Duration::from_millis(
                self.timing.deferred_reconcile_delay_ms,
            ),
            geolocation_timeout: Duration::from_millis(self.timing.geolocation_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert_eq!(config.log_level, "info");
        assert_eq!(config.service.timeout_seconds, 30);
        assert_eq!(config.timing.tick_interval_ms, 1000);
        assert_eq!(config.timing.reconcile_interval_secs, 60);
        assert_eq!(config.timing.deferred_reconcile_delay_ms, 500);
        assert!(config.employee_id.is_none());
        assert!(config.geolocation.is_none());
    }

    #[test]
    fn test_config_validation_ok() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_bad_url() {
        let mut config = AppConfig::default();
        config.service.base_url = "not a url".to_string();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_tick() {
        let mut config = AppConfig::default();
        config.timing.tick_interval_ms = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_engine_options_from_config() {
        let mut config = AppConfig::default();
        config.employee_id = Some("emp-7".to_string());
        config.timing.reconcile_interval_secs = 120;

        let options = config.engine_options();
        assert_eq!(options.employee_id.as_deref(), Some("emp-7"));
        assert_eq!(options.reconcile_interval, Duration::from_secs(120));
        assert_eq!(options.tick_interval, Duration::from_secs(1));
        assert_eq!(options.deferred_reconcile_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            employee_id = "emp-42"

            [service]
            base_url = "https://hr.example.com/api/"
            timeout_seconds = 10

            [geolocation]
            latitude = 41.0082
            longitude = 28.9784
        "#;

        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.employee_id.as_deref(), Some("emp-42"));
        assert_eq!(config.service.base_url, "https://hr.example.com/api/");
        assert_eq!(config.service.timeout_seconds, 10);
        // Unspecified sections fall back per-field.
        assert_eq!(config.timing.tick_interval_ms, 1000);
        assert_eq!(config.geolocation.unwrap().latitude, 41.0082);
    }

    #[test]
    fn test_config_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "employee_id = \"emp-9\"\n").unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.employee_id.as_deref(), Some("emp-9"));
        assert_eq!(config.timing.reconcile_interval_secs, 60);
    }

    #[test]
    fn test_config_from_file_rejects_invalid() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[service]\nbase_url = \"not a url\"\n").unwrap();

        assert!(matches!(
            AppConfig::from_file(&path),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string(&config).unwrap();

        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.service.base_url, parsed.service.base_url);
    }
}
