//! Workspace umbrella crate for Bookshelf.
//!
//! Re-exports the metadata gateway and the resilience primitives, adds the
//! YAML/env configuration layer, and wires the gateway to a book store in
//! [`Library`] so callers can import provider volumes with a single call.

pub mod config;

pub use config::{BookshelfConfig, ConfigLoadError, LoggingConfig};
pub use gateway::{
    Book, BookGateway, BookSource, BookStore, GatewayBuilder, GatewayConfig, GatewayError,
    GoogleBooksClient, MemoryStore, PersistenceConfig, ProviderConfig, RateLimitStatus,
    ResilientStore, SearchQuery, SearchResults, StoreError, VolumeId,
};
pub use resilience::{
    CacheConfig, CircuitBreakerConfig, CircuitSnapshot, CircuitState, ErrorKind, RateLimitConfig,
    RetryConfig,
};

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Errors from [`Library`] operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LibraryError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Gateway plus durable store: what the presentation layer holds on to.
pub struct Library<S, B> {
    gateway: BookGateway<S>,
    store: ResilientStore<B>,
}

impl<S: BookSource, B: BookStore> Library<S, B> {
    pub fn new(source: S, store: B, config: &BookshelfConfig) -> Self {
        Self {
            gateway: BookGateway::new(source, config.gateway.clone()),
            store: ResilientStore::new(store, config.persistence.clone()),
        }
    }

    /// Assemble from an already-built gateway, e.g. one with an `on_retry` hook.
    pub fn with_gateway(gateway: BookGateway<S>, store: B, persistence: PersistenceConfig) -> Self {
        Self {
            gateway,
            store: ResilientStore::new(store, persistence),
        }
    }

    pub fn gateway(&self) -> &BookGateway<S> {
        &self.gateway
    }

    pub fn store(&self) -> &ResilientStore<B> {
        &self.store
    }

    pub async fn search(
        &self,
        query: &str,
        max_results: i64,
    ) -> Result<Arc<SearchResults>, LibraryError> {
        Ok(self.gateway.search(query, max_results).await?)
    }

    /// Fetch a volume from the provider and persist it.
    pub async fn import_volume(&self, id: &str) -> Result<Arc<Book>, LibraryError> {
        let book = self.gateway.get_by_id(id).await?;
        self.store.upsert(&book).await?;
        tracing::info!(id = %book.id, title = %book.title, "imported volume");
        Ok(book)
    }

    /// A stored book, if it was imported before. Never calls the provider.
    pub async fn stored(&self, id: &str) -> Result<Option<Book>, LibraryError> {
        Ok(self.store.lookup(id.trim()).await?)
    }

    pub fn status(&self) -> LibraryStatus {
        LibraryStatus {
            rate_limit: self.gateway.rate_limit_status(),
            provider_circuit: CircuitReport::from(self.gateway.circuit_state()),
            persistence_circuit: CircuitReport::from(self.store.circuit_state()),
        }
    }
}

/// Serializable view of a [`CircuitSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CircuitReport {
    pub state: CircuitState,
    pub failure_count: u32,
    /// Milliseconds since the most recent failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_ms_ago: Option<u64>,
}

impl From<CircuitSnapshot> for CircuitReport {
    fn from(snapshot: CircuitSnapshot) -> Self {
        Self {
            state: snapshot.state,
            failure_count: snapshot.failure_count,
            last_failure_ms_ago: snapshot
                .last_failure_time
                .map(|at| at.elapsed().as_millis() as u64),
        }
    }
}

/// Everything `bookshelf status` prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LibraryStatus {
    pub rate_limit: RateLimitStatus,
    pub provider_circuit: CircuitReport,
    pub persistence_circuit: CircuitReport,
}
