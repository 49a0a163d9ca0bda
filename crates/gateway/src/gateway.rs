//! The gateway composes the resilience primitives around a [`BookSource`].
//!
//! ```text
//! call(params)
//!   -> cache hit?            return it
//!   -> breaker.execute(
//!        retry.execute(
//!          limiter.admit(); source.call()))
//!   -> ok:                   cache + return
//!   -> err + stale entry:    return stale (if enabled)
//!   -> err:                  propagate
//! ```

use resilience::{
    CircuitBreaker, CircuitSnapshot, Lookup, ResponseCache, RetryExecutor, RetryPolicy,
    SlidingWindowLimiter,
};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::params::{SearchQuery, VolumeId};
use crate::source::BookSource;
use crate::types::{Book, Payload, SearchResults};
use crate::GatewayError;

/// Read-only load figures for logs and dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitStatus {
    /// Admissions inside the limiter's current window.
    pub request_count: usize,
    /// Entries held by the response cache, fresh or not.
    pub cache_size: usize,
}

/// Cached, rate limited, retried and circuit-broken access to a [`BookSource`].
///
/// Every provider error that comes back through the breaker counts toward
/// opening it, including non-retryable ones such as a 404 for an unknown
/// volume id. Input rejected by validation never reaches the breaker.
pub struct BookGateway<S> {
    source: Arc<S>,
    limiter: Arc<SlidingWindowLimiter>,
    cache: Arc<ResponseCache<Payload>>,
    retry: RetryExecutor<GatewayError>,
    breaker: Arc<CircuitBreaker>,
    stale_fallback: bool,
}

impl<S: BookSource> BookGateway<S> {
    /// Gateway with fresh primitives built from `config`.
    pub fn new(source: S, config: GatewayConfig) -> Self {
        Self::builder(source).config(config).build()
    }

    pub fn builder(source: S) -> GatewayBuilder<S> {
        GatewayBuilder::new(source)
    }

    /// Search volumes. `max_results` is clamped into `[1, 40]`.
    pub async fn search(
        &self,
        query: &str,
        max_results: i64,
    ) -> Result<Arc<SearchResults>, GatewayError> {
        let query = SearchQuery::new(query, max_results)?;
        let source = &self.source;
        let query = &query;

        let payload = self
            .call(query.cache_key(), move || async move {
                let results = source.search(query).await?;
                Ok(Payload::Search(Arc::new(results)))
            })
            .await?;

        payload
            .into_search()
            .ok_or_else(|| GatewayError::Decode("cached entry is not a search result".into()))
    }

    /// Fetch a single volume by provider id.
    pub async fn get_by_id(&self, id: &str) -> Result<Arc<Book>, GatewayError> {
        let id = VolumeId::new(id)?;
        let source = &self.source;
        let id = &id;

        let payload = self
            .call(id.cache_key(), move || async move {
                let book = source.volume(id).await?;
                Ok(Payload::Volume(Arc::new(book)))
            })
            .await?;

        payload
            .into_volume()
            .ok_or_else(|| GatewayError::Decode("cached entry is not a volume".into()))
    }

    /// `{request_count, cache_size}` snapshot. Never mutates anything beyond
    /// dropping limiter timestamps that already left the window.
    pub fn rate_limit_status(&self) -> RateLimitStatus {
        RateLimitStatus {
            request_count: self.limiter.count(),
            cache_size: self.cache.len(),
        }
    }

    pub fn circuit_state(&self) -> CircuitSnapshot {
        self.breaker.snapshot()
    }

    pub fn cache(&self) -> &ResponseCache<Payload> {
        &self.cache
    }

    pub fn limiter(&self) -> &SlidingWindowLimiter {
        &self.limiter
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    async fn call<F, Fut>(&self, key: String, fetch: F) -> Result<Payload, GatewayError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Payload, GatewayError>>,
    {
        let stale = match self.cache.lookup(&key) {
            Lookup::Fresh(payload) => {
                tracing::debug!(key = %key, "cache hit");
                return Ok(payload);
            }
            Lookup::Stale(payload) => Some(payload),
            Lookup::Missing => None,
        };
        tracing::debug!(key = %key, stale = stale.is_some(), "cache miss");

        let limiter = &self.limiter;
        let retry = &self.retry;
        let fetch = &fetch;

        let outcome = self
            .breaker
            .execute(move || {
                retry.execute(move |_attempt| async move {
                    limiter.admit().await;
                    fetch().await
                })
            })
            .await;

        match outcome {
            Ok(payload) => {
                self.cache.put(key, payload.clone());
                Ok(payload)
            }
            Err(err) => match stale {
                Some(payload) if self.stale_fallback => {
                    tracing::warn!(key = %key, error = %err, "provider call failed, serving stale result");
                    Ok(payload)
                }
                _ => {
                    tracing::debug!(key = %key, error = %err, "provider call failed");
                    Err(err)
                }
            },
        }
    }
}

/// Assembles a [`BookGateway`], letting callers inject shared or
/// pre-configured primitives.
pub struct GatewayBuilder<S> {
    source: S,
    config: GatewayConfig,
    limiter: Option<Arc<SlidingWindowLimiter>>,
    cache: Option<Arc<ResponseCache<Payload>>>,
    breaker: Option<Arc<CircuitBreaker>>,
    policy: Option<RetryPolicy<GatewayError>>,
    on_retry: Option<Box<dyn Fn(u32, &GatewayError) + Send + Sync>>,
}

impl<S: BookSource> GatewayBuilder<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            config: GatewayConfig::default(),
            limiter: None,
            cache: None,
            breaker: None,
            policy: None,
            on_retry: None,
        }
    }

    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an existing limiter, e.g. one shared by every gateway that draws
    /// on the same provider quota.
    pub fn limiter(mut self, limiter: Arc<SlidingWindowLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn cache(mut self, cache: Arc<ResponseCache<Payload>>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Replace the api retry policy (timing from `config.retry` is then ignored).
    pub fn retry_policy(mut self, policy: RetryPolicy<GatewayError>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Observe every retry: `(failed_attempt, error)`.
    pub fn on_retry<F>(mut self, observer: F) -> Self
    where
        F: Fn(u32, &GatewayError) + Send + Sync + 'static,
    {
        self.on_retry = Some(Box::new(observer));
        self
    }

    pub fn build(self) -> BookGateway<S> {
        let config = self.config;

        let policy = self
            .policy
            .unwrap_or_else(|| RetryPolicy::api().with_config(config.retry));
        let mut retry = RetryExecutor::new(policy);
        if let Some(observer) = self.on_retry {
            retry = retry.with_observer(observer);
        }

        BookGateway {
            source: Arc::new(self.source),
            limiter: self
                .limiter
                .unwrap_or_else(|| Arc::new(SlidingWindowLimiter::new(config.rate_limit))),
            cache: self
                .cache
                .unwrap_or_else(|| Arc::new(ResponseCache::new(config.cache))),
            retry,
            breaker: self.breaker.unwrap_or_else(|| {
                Arc::new(CircuitBreaker::new(config.circuit_breaker).with_name("metadata-provider"))
            }),
            stale_fallback: config.stale_fallback,
        }
    }
}
