//! Retry logic with exponential backoff for transient failures.
//!
//! A [`RetryExecutor`] re-runs a failing async operation until it succeeds,
//! the policy's predicate declares the error permanent, or the attempt budget
//! runs out. Whatever error ends the loop is handed back untouched.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::error::Classify;

/// Configuration for retry behavior.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    #[serde(with = "crate::serde_millis")]
    pub base_delay: Duration,
    /// Upper bound on a single backoff delay (before jitter), in milliseconds.
    #[serde(with = "crate::serde_millis")]
    pub max_delay: Duration,
    /// Multiplier applied per retry.
    pub backoff_factor: f64,
    /// Add up to 10% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::api()
    }
}

impl RetryConfig {
    /// Calls to the external metadata provider.
    pub fn api() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
            backoff_factor: 2.0,
            jitter: true,
        }
    }

    /// Calls to the persistence layer.
    pub fn persistence() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(5),
            backoff_factor: 1.5,
            jitter: true,
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Backoff after the given failed attempt (1-indexed), without jitter:
    /// `min(base_delay * backoff_factor^(attempt-1), max_delay)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let exponential = self.base_delay.as_millis() as f64 * self.backoff_factor.powi(exponent);
        let capped = exponential.min(self.max_delay.as_millis() as f64);

        if capped.is_nan() || capped <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_millis(capped as u64)
        }
    }

    /// Backoff plus jitter, if enabled.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.backoff(attempt);
        if !self.jitter {
            return delay;
        }

        let delay_ms = delay.as_millis() as u64;
        let jitter = fastrand::u64(0..=delay_ms / 10);
        Duration::from_millis(delay_ms + jitter)
    }
}

/// Decides whether an error is worth another attempt.
pub type RetryPredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Observer invoked before each backoff sleep with the failed attempt number.
pub type RetryObserver<E> = Arc<dyn Fn(u32, &E) + Send + Sync>;

/// Default predicate: network, timeout, 5xx and 429 are transient; everything
/// else (other 4xx, auth failures, validation, open circuit) is permanent.
pub fn is_retryable<E: Classify>(error: &E) -> bool {
    error.kind().is_transient()
}

/// [`is_retryable`], plus any 502/503/504 response regardless of how the error
/// was tagged.
pub fn is_retryable_for_api<E: Classify>(error: &E) -> bool {
    is_retryable(error) || matches!(error.status(), Some(502..=504))
}

/// Only failures to reach the dependency at all.
pub fn is_connectivity_error<E: Classify>(error: &E) -> bool {
    error.kind().is_connectivity()
}

/// Retry configuration paired with the predicate that gates each retry.
pub struct RetryPolicy<E> {
    config: RetryConfig,
    predicate: RetryPredicate<E>,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            config: self.config,
            predicate: Arc::clone(&self.predicate),
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<E: Classify + 'static> RetryPolicy<E> {
    /// `config` with the default predicate.
    pub fn new(config: RetryConfig) -> Self {
        Self::with_predicate(config, is_retryable::<E>)
    }

    /// Preset for the external metadata provider.
    pub fn api() -> Self {
        Self::with_predicate(RetryConfig::api(), is_retryable_for_api::<E>)
    }

    /// Preset for the persistence layer. Only connectivity failures are retried.
    pub fn persistence() -> Self {
        Self::with_predicate(RetryConfig::persistence(), is_connectivity_error::<E>)
    }
}

impl<E> RetryPolicy<E> {
    pub fn with_predicate<P>(config: RetryConfig, predicate: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self {
            config,
            predicate: Arc::new(predicate),
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Same predicate, different timing.
    pub fn with_config(mut self, config: RetryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn should_retry(&self, error: &E) -> bool {
        (self.predicate)(error)
    }
}

/// Result of a retried operation.
#[derive(Debug)]
pub struct RetryResult<T, E> {
    /// The final result: the first success, or the error that ended the loop.
    pub result: Result<T, E>,
    /// Number of attempts made (1 = no retries needed).
    pub attempts: u32,
    /// Total time spent on all attempts and backoff.
    pub total_duration: Duration,
}

impl<T, E> RetryResult<T, E> {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }

    pub fn into_result(self) -> Result<T, E> {
        self.result
    }
}

/// Runs operations under a [`RetryPolicy`].
pub struct RetryExecutor<E> {
    policy: RetryPolicy<E>,
    on_retry: Option<RetryObserver<E>>,
}

impl<E> Clone for RetryExecutor<E> {
    fn clone(&self) -> Self {
        Self {
            policy: self.policy.clone(),
            on_retry: self.on_retry.clone(),
        }
    }
}

impl<E> fmt::Debug for RetryExecutor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("policy", &self.policy)
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

impl<E> RetryExecutor<E> {
    pub fn new(policy: RetryPolicy<E>) -> Self {
        Self {
            policy,
            on_retry: None,
        }
    }

    /// Install an observer fired before each backoff. It sees the attempt
    /// that just failed and its error; it cannot change what happens next.
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(u32, &E) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(observer));
        self
    }

    pub fn policy(&self) -> &RetryPolicy<E> {
        &self.policy
    }

    /// Run `operation` until it succeeds or the policy gives up.
    ///
    /// The closure receives the 1-indexed attempt number. On failure the
    /// error from the last attempt is returned as-is.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.execute_with_stats(operation).await.into_result()
    }

    /// Like [`execute`](Self::execute), also reporting attempts and elapsed time.
    pub async fn execute_with_stats<T, F, Fut>(&self, mut operation: F) -> RetryResult<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let config = self.policy.config();
        let max_attempts = config.max_attempts.max(1);
        let start = Instant::now();
        let mut attempt = 1;

        loop {
            let error = match operation(attempt).await {
                Ok(value) => {
                    return RetryResult {
                        result: Ok(value),
                        attempts: attempt,
                        total_duration: start.elapsed(),
                    };
                }
                Err(error) => error,
            };

            if !self.policy.should_retry(&error) {
                tracing::debug!(attempt, error = %error, "permanent failure, not retrying");
                return RetryResult {
                    result: Err(error),
                    attempts: attempt,
                    total_duration: start.elapsed(),
                };
            }

            if attempt >= max_attempts {
                tracing::warn!(attempts = attempt, error = %error, "retries exhausted");
                return RetryResult {
                    result: Err(error),
                    attempts: attempt,
                    total_duration: start.elapsed(),
                };
            }

            let delay = config.delay_for(attempt);
            tracing::warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "transient failure, backing off"
            );
            if let Some(observer) = &self.on_retry {
                observer(attempt, &error);
            }

            sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    struct TestError {
        kind: ErrorKind,
        status: Option<u16>,
    }

    impl TestError {
        fn of(kind: ErrorKind) -> Self {
            Self { kind, status: None }
        }

        fn http(status: u16) -> Self {
            Self {
                kind: ErrorKind::from_status(status).unwrap(),
                status: Some(status),
            }
        }
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{} ({:?})", self.kind, self.status)
        }
    }

    impl Classify for TestError {
        fn kind(&self) -> ErrorKind {
            self.kind
        }

        fn status(&self) -> Option<u16> {
            self.status
        }
    }

    fn quick(attempts: u32) -> RetryConfig {
        RetryConfig::api()
            .with_max_attempts(attempts)
            .with_base_delay(Duration::from_millis(10))
            .with_jitter(false)
    }

    #[test]
    fn presets() {
        let api = RetryConfig::api();
        assert_eq!(api.max_attempts, 3);
        assert_eq!(api.base_delay, Duration::from_secs(1));
        assert_eq!(api.max_delay, Duration::from_secs(8));
        assert_eq!(api.backoff_factor, 2.0);

        let persistence = RetryConfig::persistence();
        assert_eq!(persistence.max_attempts, 2);
        assert_eq!(persistence.base_delay, Duration::from_secs(2));
        assert_eq!(persistence.max_delay, Duration::from_secs(5));
        assert_eq!(persistence.backoff_factor, 1.5);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let cfg = RetryConfig::api();
        assert_eq!(cfg.backoff(1), Duration::from_secs(1));
        assert_eq!(cfg.backoff(2), Duration::from_secs(2));
        assert_eq!(cfg.backoff(3), Duration::from_secs(4));
        assert_eq!(cfg.backoff(4), Duration::from_secs(8));
        assert_eq!(cfg.backoff(10), Duration::from_secs(8));
        assert_eq!(cfg.backoff(u32::MAX), Duration::from_secs(8));
    }

    #[test]
    fn jitter_stays_within_ten_percent() {
        let cfg = RetryConfig::api();
        for _ in 0..200 {
            let delay = cfg.delay_for(2);
            assert!(delay >= Duration::from_millis(2_000));
            assert!(delay <= Duration::from_millis(2_200));
        }
    }

    #[test]
    fn predicates() {
        assert!(is_retryable(&TestError::of(ErrorKind::Network)));
        assert!(is_retryable(&TestError::of(ErrorKind::Timeout)));
        assert!(is_retryable(&TestError::http(500)));
        assert!(is_retryable(&TestError::http(429)));
        assert!(!is_retryable(&TestError::http(400)));
        assert!(!is_retryable(&TestError::http(401)));
        assert!(!is_retryable(&TestError::http(404)));
        assert!(!is_retryable(&TestError::of(ErrorKind::Validation)));
        assert!(!is_retryable(&TestError::of(ErrorKind::CircuitOpen)));

        // A gateway status is retried by the api predicate even when tagged otherwise.
        let odd = TestError {
            kind: ErrorKind::Decode,
            status: Some(502),
        };
        assert!(!is_retryable(&odd));
        assert!(is_retryable_for_api(&odd));

        assert!(is_connectivity_error(&TestError::of(ErrorKind::Network)));
        assert!(!is_connectivity_error(&TestError::http(503)));
        assert!(!is_connectivity_error(&TestError::http(429)));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let observed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&observed);
        let executor = RetryExecutor::new(RetryPolicy::<TestError>::new(quick(3)))
            .with_observer(move |attempt, _err| sink.lock().unwrap().push(attempt));

        let result = executor
            .execute_with_stats(|attempt| async move {
                if attempt < 3 {
                    Err(TestError::http(503))
                } else {
                    Ok("done")
                }
            })
            .await;

        assert!(result.succeeded());
        assert_eq!(result.attempts, 3);
        assert_eq!(*observed.lock().unwrap(), vec![1, 2]);
        // 10ms + 20ms of backoff on the paused clock
        assert_eq!(result.total_duration, Duration::from_millis(30));
        assert_eq!(result.into_result().unwrap(), "done");
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts_with_original_error() {
        let calls = AtomicU32::new(0);
        let executor = RetryExecutor::new(RetryPolicy::<TestError>::new(quick(4)));

        let result = executor
            .execute(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(TestError::of(ErrorKind::Timeout)) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(result.unwrap_err(), TestError::of(ErrorKind::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let retries = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&retries);
        let executor = RetryExecutor::new(RetryPolicy::<TestError>::new(quick(3)))
            .with_observer(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        let start = Instant::now();

        let result = executor
            .execute_with_stats(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(TestError::http(404)) }
            })
            .await;

        assert_eq!(result.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(retries.load(Ordering::SeqCst), 0);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(result.into_result().unwrap_err(), TestError::http(404));
    }

    #[tokio::test(start_paused = true)]
    async fn persistence_policy_ignores_server_errors() {
        let calls = AtomicU32::new(0);
        let executor = RetryExecutor::new(RetryPolicy::<TestError>::persistence());

        let result = executor
            .execute(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(TestError::http(503)) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn custom_predicate_is_honoured() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::<TestError>::with_predicate(quick(5), |err: &TestError| {
            err.status == Some(404)
        });
        let executor = RetryExecutor::new(policy);

        let result = executor
            .execute(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(TestError::http(404)) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempts_still_runs_once() {
        let calls = AtomicU32::new(0);
        let executor = RetryExecutor::new(RetryPolicy::<TestError>::new(quick(0)));

        let _ = executor
            .execute(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(TestError::of(ErrorKind::Network)) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn config_serde_roundtrip() {
        let cfg = RetryConfig::persistence();
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"base_delay\":2000"));
        let parsed: RetryConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, parsed);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let cfg: RetryConfig = serde_json::from_str(r#"{"max_attempts": 5}"#).unwrap();
        assert_eq!(cfg.max_attempts, 5);
        assert_eq!(cfg.base_delay, Duration::from_secs(1));
        assert_eq!(cfg.max_delay, Duration::from_secs(8));
        assert_eq!(cfg.backoff_factor, 2.0);
        assert!(cfg.jitter);
    }
}
