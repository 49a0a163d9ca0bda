//! Bookshelf resilience primitives
//!
//! Building blocks for talking to a flaky third-party API without hammering it
//! or falling over when it misbehaves:
//!
//! - [`SlidingWindowLimiter`] - at most `N` calls in any trailing window
//! - [`ResponseCache`] - TTL + capacity bounded memo of successful responses
//! - [`RetryExecutor`] - exponential backoff with jitter, driven by a [`RetryPolicy`]
//! - [`CircuitBreaker`] - stops calling a dependency that keeps failing
//!
//! Everything is an ordinary value. Construct one per dependency and share it
//! behind an `Arc`; two gateways never see each other's counters.
//!
//! All timing goes through `tokio::time`, so tests can pause the clock and
//! step it forward instead of sleeping for real.
//!
//! ## Quick example
//!
//! ```no_run
//! use resilience::{CircuitBreaker, CircuitOpenError, Classify, ErrorKind, RetryExecutor, RetryPolicy};
//!
//! #[derive(Debug)]
//! enum FetchError { Http(u16), Open(CircuitOpenError) }
//!
//! impl std::fmt::Display for FetchError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{self:?}")
//!     }
//! }
//!
//! impl From<CircuitOpenError> for FetchError {
//!     fn from(err: CircuitOpenError) -> Self { FetchError::Open(err) }
//! }
//!
//! impl Classify for FetchError {
//!     fn kind(&self) -> ErrorKind {
//!         match self {
//!             FetchError::Http(status) => ErrorKind::from_status(*status).unwrap_or(ErrorKind::Server),
//!             FetchError::Open(_) => ErrorKind::CircuitOpen,
//!         }
//!     }
//! }
//!
//! # async fn fetch() -> Result<String, FetchError> { Ok(String::new()) }
//! #[tokio::main]
//! async fn main() {
//!     let breaker = CircuitBreaker::default();
//!     let retry = RetryExecutor::new(RetryPolicy::<FetchError>::api());
//!
//!     let body = breaker
//!         .execute(|| retry.execute(|_attempt| fetch()))
//!         .await;
//! }
//! ```

pub mod cache;
pub mod circuit_breaker;
pub mod error;
pub mod rate_limit;
pub mod retry;
pub mod serde_millis;

pub use cache::{CacheConfig, CacheStats, Lookup, ResponseCache};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState,
};
pub use error::{CircuitOpenError, Classify, ErrorKind};
pub use rate_limit::{RateLimitConfig, RateLimitStats, SlidingWindowLimiter};
pub use retry::{
    is_connectivity_error, is_retryable, is_retryable_for_api, RetryConfig, RetryExecutor,
    RetryObserver, RetryPolicy, RetryPredicate, RetryResult,
};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a previous holder panicked. Every
/// critical section in this crate leaves its state valid between statements.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
