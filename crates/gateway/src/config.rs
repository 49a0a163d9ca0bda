use resilience::{CacheConfig, CircuitBreakerConfig, RateLimitConfig, RetryConfig};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

/// Resilience settings for a [`BookGateway`](crate::BookGateway).
///
/// # Example
/// ```
/// use gateway::GatewayConfig;
/// use std::time::Duration;
///
/// let cfg = GatewayConfig {
///     stale_fallback: false,
///     ..Default::default()
/// };
/// assert_eq!(cfg.cache.ttl, Duration::from_secs(300));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Outbound admission control.
    pub rate_limit: RateLimitConfig,
    /// Response cache sizing and TTL.
    pub cache: CacheConfig,
    /// Backoff timing for provider calls. The retry predicate is always the api preset's.
    pub retry: RetryConfig,
    /// Failure isolation for the provider.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Serve an expired cache entry when the provider call fails for good.
    pub stale_fallback: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig::default(),
            cache: CacheConfig::default(),
            retry: RetryConfig::api(),
            circuit_breaker: CircuitBreakerConfig::external_provider(),
            stale_fallback: true,
        }
    }
}

/// Connection settings for [`GoogleBooksClient`](crate::GoogleBooksClient).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API root; `/volumes` is appended.
    pub base_url: String,
    /// Optional API key sent as the `key` query parameter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Whole-request timeout in milliseconds.
    #[serde(with = "resilience::serde_millis")]
    pub request_timeout: Duration,
    /// Connect timeout in milliseconds.
    #[serde(with = "resilience::serde_millis")]
    pub connect_timeout: Duration,
}

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/books/v1";

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Resilience settings for the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Fields left out keep the persistence preset's values.
    #[serde(deserialize_with = "persistence_retry")]
    pub retry: RetryConfig,
    #[serde(deserialize_with = "persistence_breaker")]
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::persistence(),
            circuit_breaker: CircuitBreakerConfig::persistence(),
        }
    }
}

#[derive(Deserialize)]
struct RetryOverrides {
    max_attempts: Option<u32>,
    base_delay: Option<u64>,
    max_delay: Option<u64>,
    backoff_factor: Option<f64>,
    jitter: Option<bool>,
}

fn persistence_retry<'de, D: Deserializer<'de>>(deserializer: D) -> Result<RetryConfig, D::Error> {
    let overrides = RetryOverrides::deserialize(deserializer)?;
    let mut cfg = RetryConfig::persistence();
    if let Some(max_attempts) = overrides.max_attempts {
        cfg.max_attempts = max_attempts;
    }
    if let Some(ms) = overrides.base_delay {
        cfg.base_delay = Duration::from_millis(ms);
    }
    if let Some(ms) = overrides.max_delay {
        cfg.max_delay = Duration::from_millis(ms);
    }
    if let Some(factor) = overrides.backoff_factor {
        cfg.backoff_factor = factor;
    }
    if let Some(jitter) = overrides.jitter {
        cfg.jitter = jitter;
    }
    Ok(cfg)
}

#[derive(Deserialize)]
struct BreakerOverrides {
    failure_threshold: Option<u32>,
    open_timeout: Option<u64>,
}

fn persistence_breaker<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<CircuitBreakerConfig, D::Error> {
    let overrides = BreakerOverrides::deserialize(deserializer)?;
    let mut cfg = CircuitBreakerConfig::persistence();
    if let Some(threshold) = overrides.failure_threshold {
        cfg.failure_threshold = threshold;
    }
    if let Some(ms) = overrides.open_timeout {
        cfg.open_timeout = Duration::from_millis(ms);
    }
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_defaults() {
        let cfg = GatewayConfig::default();
        assert_eq!(cfg.cache.capacity, 100);
        assert_eq!(cfg.cache.ttl, Duration::from_secs(300));
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.circuit_breaker.failure_threshold, 3);
        assert_eq!(cfg.circuit_breaker.open_timeout, Duration::from_secs(60));
        assert!(cfg.stale_fallback);
    }

    #[test]
    fn persistence_defaults() {
        let cfg = PersistenceConfig::default();
        assert_eq!(cfg.retry.max_attempts, 2);
        assert_eq!(cfg.circuit_breaker.failure_threshold, 5);
        assert_eq!(cfg.circuit_breaker.open_timeout, Duration::from_secs(30));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: GatewayConfig = serde_json::from_str(
            r#"{"cache": {"capacity": 10, "ttl": 1000}, "stale_fallback": false}"#,
        )
        .unwrap();

        assert_eq!(cfg.cache.capacity, 10);
        assert_eq!(cfg.cache.ttl, Duration::from_secs(1));
        assert!(!cfg.stale_fallback);
        assert_eq!(cfg.retry, RetryConfig::api());
    }

    #[test]
    fn partial_persistence_sections_keep_persistence_presets() {
        let cfg: PersistenceConfig = serde_json::from_str(
            r#"{"retry": {"max_attempts": 4}, "circuit_breaker": {"open_timeout": 5000}}"#,
        )
        .unwrap();

        assert_eq!(cfg.retry.max_attempts, 4);
        assert_eq!(cfg.retry.base_delay, Duration::from_secs(2));
        assert_eq!(cfg.retry.backoff_factor, 1.5);
        assert_eq!(cfg.circuit_breaker.failure_threshold, 5);
        assert_eq!(cfg.circuit_breaker.open_timeout, Duration::from_secs(5));

        let roundtrip: PersistenceConfig =
            serde_json::from_str(&serde_json::to_string(&cfg).unwrap()).unwrap();
        assert_eq!(roundtrip, cfg);
    }

    #[test]
    fn partial_gateway_sections_keep_defaults() {
        let cfg: GatewayConfig = serde_json::from_str(
            r#"{"rate_limit": {"max_requests": 3}, "retry": {"jitter": false}}"#,
        )
        .unwrap();

        assert_eq!(cfg.rate_limit.max_requests, 3);
        assert_eq!(cfg.rate_limit.window, Duration::from_secs(60));
        assert_eq!(cfg.retry, RetryConfig::api().with_jitter(false));
    }

    #[test]
    fn provider_serde_roundtrip() {
        let cfg = ProviderConfig {
            api_key: Some("secret".into()),
            ..Default::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"request_timeout\":10000"));

        let parsed: ProviderConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, cfg);

        let bare: ProviderConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(bare.base_url, DEFAULT_BASE_URL);
        assert!(bare.api_key.is_none());
    }
}
