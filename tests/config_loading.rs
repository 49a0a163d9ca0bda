use bookshelf::{BookshelfConfig, ConfigLoadError};
use std::fs;
use std::time::Duration;
use tempfile::tempdir;

const CONFIG_YAML: &str = r#"
version: "1.0"
provider:
  base_url: "https://books.example.test/v1"
  request_timeout: 2500
gateway:
  rate_limit:
    max_requests: 20
    window: 1000
  cache:
    capacity: 8
  stale_fallback: false
logging:
  level: "debug"
  json: true
"#;

#[test]
fn loads_yaml_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bookshelf.yaml");
    fs::write(&path, CONFIG_YAML).unwrap();

    let config = BookshelfConfig::from_file(&path).unwrap();

    assert_eq!(config.provider.base_url, "https://books.example.test/v1");
    assert_eq!(config.provider.request_timeout, Duration::from_millis(2500));
    assert_eq!(config.gateway.rate_limit.max_requests, 20);
    assert_eq!(config.gateway.rate_limit.window, Duration::from_secs(1));
    assert_eq!(config.gateway.cache.capacity, 8);
    assert!(!config.gateway.stale_fallback);
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.json);
}

#[test]
fn missing_file_is_a_read_error() {
    let dir = tempdir().unwrap();
    let result = BookshelfConfig::from_file(dir.path().join("nope.yaml"));
    assert!(matches!(result, Err(ConfigLoadError::FileRead(_))));
}

#[test]
fn layered_load_reads_file_by_stem() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("layered.yaml"), CONFIG_YAML).unwrap();
    let stem = dir.path().join("layered");

    let config = BookshelfConfig::load_layered(stem.to_str().unwrap()).unwrap();

    assert_eq!(config.gateway.cache.capacity, 8);
    assert_eq!(config.gateway.rate_limit.window, Duration::from_secs(1));
    assert!(!config.gateway.stale_fallback);
    // Untouched sections fall back to defaults.
    assert_eq!(config.gateway.retry.max_attempts, 3);
    assert_eq!(config.persistence.circuit_breaker.failure_threshold, 5);
}

#[test]
fn layered_load_without_file_uses_defaults() {
    let dir = tempdir().unwrap();
    let stem = dir.path().join("absent");

    let config = BookshelfConfig::load_layered(stem.to_str().unwrap()).unwrap();

    assert_eq!(config.gateway.cache.ttl, Duration::from_secs(300));
    assert_eq!(config.gateway.rate_limit.max_requests, 100);
}

#[test]
fn layered_load_rejects_invalid_values() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("invalid.yaml"),
        "gateway:\n  circuit_breaker:\n    failure_threshold: 0\n",
    )
    .unwrap();
    let stem = dir.path().join("invalid");

    let result = BookshelfConfig::load_layered(stem.to_str().unwrap());
    assert!(matches!(result, Err(ConfigLoadError::Validation(_))));
}
