//! YAML configuration for Bookshelf
//!
//! One file describes the provider connection, the gateway's resilience
//! settings, the persistence presets and logging. Every section is optional;
//! omitted fields keep their defaults. Durations are milliseconds.
//!
//! ## Example YAML Configuration
//!
//! ```yaml
//! version: "1.0"
//!
//! provider:
//!   base_url: "https://www.googleapis.com/books/v1"
//!   api_key: "my-key"
//!   request_timeout: 10000
//!
//! gateway:
//!   rate_limit:
//!     max_requests: 100
//!     window: 60000
//!   cache:
//!     capacity: 100
//!     ttl: 300000
//!   retry:
//!     max_attempts: 3
//!     base_delay: 1000
//!     max_delay: 8000
//!     backoff_factor: 2.0
//!   circuit_breaker:
//!     failure_threshold: 3
//!     open_timeout: 60000
//!   stale_fallback: true
//!
//! persistence:
//!   retry:
//!     max_attempts: 2
//!   circuit_breaker:
//!     failure_threshold: 5
//!
//! logging:
//!   level: "info,gateway=debug"
//!   json: false
//! ```
//!
//! [`BookshelfConfig::load`] reads an optional `bookshelf.yaml` from the
//! working directory and then applies `BOOKSHELF__*` environment overrides,
//! e.g. `BOOKSHELF__PROVIDER__API_KEY` or `BOOKSHELF__GATEWAY__CACHE__TTL`.

use std::fs;
use std::path::Path;

use gateway::{GatewayConfig, PersistenceConfig, ProviderConfig};
use resilience::{CircuitBreakerConfig, RetryConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("failed to assemble layered config: {0}")]
    Layered(#[from] config::ConfigError),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookshelfConfig {
    /// Configuration format version
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub persistence: PersistenceConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for BookshelfConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            provider: ProviderConfig::default(),
            gateway: GatewayConfig::default(),
            persistence: PersistenceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Log output settings for the binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `warn,gateway=debug`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl BookshelfConfig {
    /// Load a YAML configuration file from the given path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: BookshelfConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// `bookshelf.yaml` (if present) overlaid with `BOOKSHELF__*` variables.
    pub fn load() -> Result<Self, ConfigLoadError> {
        Self::load_layered("bookshelf")
    }

    /// Like [`load`](Self::load) with a different file stem. The extension is
    /// resolved by the `config` crate (`.yaml`, `.yml`, `.toml`, `.json`).
    pub fn load_layered(file_stem: &str) -> Result<Self, ConfigLoadError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name(file_stem).required(false))
            .add_source(
                config::Environment::with_prefix("BOOKSHELF")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: BookshelfConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        self.validate_provider()?;
        self.validate_gateway()?;
        validate_retry("persistence.retry", &self.persistence.retry)?;
        validate_breaker(
            "persistence.circuit_breaker",
            &self.persistence.circuit_breaker,
        )?;

        tracing_subscriber::EnvFilter::try_new(&self.logging.level).map_err(|e| {
            ConfigLoadError::Validation(format!(
                "logging.level '{}' is not a valid filter: {e}",
                self.logging.level
            ))
        })?;

        Ok(())
    }

    fn validate_provider(&self) -> Result<(), ConfigLoadError> {
        let url = self.provider.base_url.trim();
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(ConfigLoadError::Validation(format!(
                "provider.base_url must be an http(s) URL, got '{url}'"
            )));
        }
        if self.provider.request_timeout.is_zero() {
            return Err(ConfigLoadError::Validation(
                "provider.request_timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_gateway(&self) -> Result<(), ConfigLoadError> {
        let gateway = &self.gateway;

        if gateway.rate_limit.max_requests == 0 {
            return Err(ConfigLoadError::Validation(
                "gateway.rate_limit.max_requests must be greater than 0".to_string(),
            ));
        }
        if gateway.rate_limit.window.is_zero() {
            return Err(ConfigLoadError::Validation(
                "gateway.rate_limit.window must be greater than 0".to_string(),
            ));
        }
        if gateway.cache.capacity == 0 {
            return Err(ConfigLoadError::Validation(
                "gateway.cache.capacity must be greater than 0".to_string(),
            ));
        }

        validate_retry("gateway.retry", &gateway.retry)?;
        validate_breaker("gateway.circuit_breaker", &gateway.circuit_breaker)
    }
}

fn validate_retry(section: &str, retry: &RetryConfig) -> Result<(), ConfigLoadError> {
    if retry.max_attempts == 0 {
        return Err(ConfigLoadError::Validation(format!(
            "{section}.max_attempts must be greater than 0"
        )));
    }
    if !retry.backoff_factor.is_finite() || retry.backoff_factor < 1.0 {
        return Err(ConfigLoadError::Validation(format!(
            "{section}.backoff_factor must be at least 1.0, got {}",
            retry.backoff_factor
        )));
    }
    if retry.max_delay < retry.base_delay {
        return Err(ConfigLoadError::Validation(format!(
            "{section}.max_delay must not be below base_delay"
        )));
    }
    Ok(())
}

fn validate_breaker(section: &str, breaker: &CircuitBreakerConfig) -> Result<(), ConfigLoadError> {
    if breaker.failure_threshold == 0 {
        return Err(ConfigLoadError::Validation(format!(
            "{section}.failure_threshold must be greater than 0"
        )));
    }
    Ok(())
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_minimal_config() {
        let config = BookshelfConfig::from_yaml("version: \"1.0\"").unwrap();
        assert_eq!(config, BookshelfConfig::default());
    }

    #[test]
    fn test_version_is_optional() {
        let config = BookshelfConfig::from_yaml("logging:\n  json: true").unwrap();
        assert_eq!(config.version, "1.0");
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let yaml = r#"
version: "1"
gateway:
  cache:
    ttl: 1000
  circuit_breaker:
    failure_threshold: 5
persistence:
  retry:
    max_attempts: 4
"#;
        let config = BookshelfConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.gateway.cache.ttl, Duration::from_secs(1));
        assert_eq!(config.gateway.cache.capacity, 100);
        assert_eq!(config.gateway.circuit_breaker.failure_threshold, 5);
        assert_eq!(
            config.gateway.circuit_breaker.open_timeout,
            Duration::from_secs(60)
        );
        assert_eq!(config.persistence.retry.max_attempts, 4);
        assert_eq!(config.persistence.retry.base_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_invalid_version() {
        let result = BookshelfConfig::from_yaml("version: \"2.0\"");
        assert!(matches!(
            result,
            Err(ConfigLoadError::UnsupportedVersion(v)) if v == "2.0"
        ));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let yaml = "gateway:\n  cache:\n    capacity: 0";
        assert!(matches!(
            BookshelfConfig::from_yaml(yaml),
            Err(ConfigLoadError::Validation(msg)) if msg.contains("cache.capacity")
        ));
    }

    #[test]
    fn test_backoff_factor_below_one_rejected() {
        let yaml = "persistence:\n  retry:\n    backoff_factor: 0.5";
        assert!(matches!(
            BookshelfConfig::from_yaml(yaml),
            Err(ConfigLoadError::Validation(msg)) if msg.contains("persistence.retry.backoff_factor")
        ));
    }

    #[test]
    fn test_bad_base_url_rejected() {
        let yaml = "provider:\n  base_url: \"ftp://books\"";
        assert!(matches!(
            BookshelfConfig::from_yaml(yaml),
            Err(ConfigLoadError::Validation(_))
        ));
    }

    #[test]
    fn test_bad_log_filter_rejected() {
        let yaml = "logging:\n  level: \"gateway=[\"";
        assert!(matches!(
            BookshelfConfig::from_yaml(yaml),
            Err(ConfigLoadError::Validation(msg)) if msg.contains("logging.level")
        ));
    }

    #[test]
    fn test_malformed_yaml() {
        assert!(matches!(
            BookshelfConfig::from_yaml("gateway: [unclosed"),
            Err(ConfigLoadError::YamlParse(_))
        ));
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = BookshelfConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert_eq!(BookshelfConfig::from_yaml(&yaml).unwrap(), config);
    }
}
