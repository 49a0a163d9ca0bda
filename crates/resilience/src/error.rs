//! Failure classification shared by the retry executor and circuit breaker.
//!
//! Errors are tagged with an [`ErrorKind`] where they are constructed. Retry
//! predicates only ever look at that tag (and the optional HTTP status), never
//! at the rendered message.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Coarse class of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller supplied parameters that cannot be sent upstream.
    Validation,
    /// Connection refused, reset, DNS failure and friends.
    Network,
    /// The request or connect phase timed out.
    Timeout,
    /// Upstream answered with a 5xx status.
    Server,
    /// Upstream answered 429.
    RateLimited,
    /// Upstream answered with a 4xx status other than 401, 403 and 429.
    Client,
    /// Upstream answered 401 or 403.
    Unauthorized,
    /// Upstream answered 2xx with a body we could not parse.
    Decode,
    /// Rejected locally by an open circuit breaker.
    CircuitOpen,
}

impl ErrorKind {
    /// Classify an HTTP status code. Returns `None` for non-error statuses.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            401 | 403 => Some(ErrorKind::Unauthorized),
            429 => Some(ErrorKind::RateLimited),
            400..=499 => Some(ErrorKind::Client),
            500..=599 => Some(ErrorKind::Server),
            _ => None,
        }
    }

    /// Whether a failure of this kind is worth trying again.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorKind::Network | ErrorKind::Timeout | ErrorKind::Server | ErrorKind::RateLimited
        )
    }

    /// Connectivity-class failures: the dependency could not be reached at all.
    pub fn is_connectivity(self) -> bool {
        matches!(self, ErrorKind::Network | ErrorKind::Timeout)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Server => "server",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Client => "client",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Decode => "decode",
            ErrorKind::CircuitOpen => "circuit_open",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implemented by error types that carry a structured [`ErrorKind`].
pub trait Classify {
    fn kind(&self) -> ErrorKind;

    /// HTTP status that produced the error, when there was one.
    fn status(&self) -> Option<u16> {
        None
    }
}

/// Synthetic error raised by [`CircuitBreaker`](crate::CircuitBreaker) when it
/// rejects a call without invoking the wrapped operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("circuit breaker is open; retry in {}ms", retry_after.as_millis())]
pub struct CircuitOpenError {
    /// Time left until the breaker admits a trial call.
    pub retry_after: Duration,
}

impl Classify for CircuitOpenError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::CircuitOpen
    }
}
