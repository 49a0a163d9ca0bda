use resilience::{CircuitOpenError, Classify, ErrorKind};
use thiserror::Error;

/// Errors surfaced by [`BookGateway`](crate::BookGateway) and book sources.
///
/// Every variant maps onto one [`ErrorKind`]; the kind is fixed when the error
/// is built, so retry decisions never depend on message text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Call parameters could not be turned into a request.
    #[error("invalid request: {0}")]
    Validation(String),
    /// The provider could not be reached.
    #[error("network error: {0}")]
    Network(String),
    /// Connecting to or reading from the provider took too long.
    #[error("request timed out: {0}")]
    Timeout(String),
    /// The provider failed with a 5xx status.
    #[error("provider error {status}: {message}")]
    Server { status: u16, message: String },
    /// The provider answered 429.
    #[error("rate limited by provider: {message}")]
    RateLimited { message: String },
    /// The provider rejected the request with a 4xx status.
    #[error("request rejected by provider ({status}): {message}")]
    Client { status: u16, message: String },
    /// The provider refused our credentials (401/403).
    #[error("not authorized by provider ({status}): {message}")]
    Unauthorized { status: u16, message: String },
    /// A successful response carried a body we could not parse.
    #[error("malformed provider response: {0}")]
    Decode(String),
    /// The circuit breaker rejected the call without contacting the provider.
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),
}

impl GatewayError {
    /// Build the error matching an HTTP status.
    ///
    /// Statuses outside 4xx/5xx are not expected on the error path and are
    /// reported as client errors so they are never retried.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match ErrorKind::from_status(status) {
            Some(ErrorKind::Unauthorized) => GatewayError::Unauthorized { status, message },
            Some(ErrorKind::RateLimited) => GatewayError::RateLimited { message },
            Some(ErrorKind::Server) => GatewayError::Server { status, message },
            _ => GatewayError::Client { status, message },
        }
    }

    /// Whether asking again later could plausibly succeed. Presentation code
    /// uses this to decide whether to offer a manual retry.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_transient() || matches!(self, GatewayError::CircuitOpen(_))
    }
}

impl Classify for GatewayError {
    fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Validation(_) => ErrorKind::Validation,
            GatewayError::Network(_) => ErrorKind::Network,
            GatewayError::Timeout(_) => ErrorKind::Timeout,
            GatewayError::Server { .. } => ErrorKind::Server,
            GatewayError::RateLimited { .. } => ErrorKind::RateLimited,
            GatewayError::Client { .. } => ErrorKind::Client,
            GatewayError::Unauthorized { .. } => ErrorKind::Unauthorized,
            GatewayError::Decode(_) => ErrorKind::Decode,
            GatewayError::CircuitOpen(_) => ErrorKind::CircuitOpen,
        }
    }

    fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Server { status, .. }
            | GatewayError::Client { status, .. }
            | GatewayError::Unauthorized { status, .. } => Some(*status),
            GatewayError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout(err.to_string())
        } else if err.is_decode() {
            GatewayError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            GatewayError::from_status(status.as_u16(), err.to_string())
        } else if err.is_builder() {
            GatewayError::Validation(err.to_string())
        } else {
            GatewayError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Decode(err.to_string())
    }
}
