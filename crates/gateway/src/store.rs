//! Durable book records, guarded by the persistence presets.

use async_trait::async_trait;
use dashmap::DashMap;
use resilience::{
    CircuitBreaker, CircuitOpenError, CircuitSnapshot, Classify, ErrorKind, RetryExecutor,
    RetryPolicy,
};
use thiserror::Error;

use crate::config::PersistenceConfig;
use crate::types::Book;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The backing store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store operation timed out: {0}")]
    Timeout(String),
    /// The store refused the record. Not retried.
    #[error("store rejected record: {0}")]
    Rejected(String),
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),
}

impl Classify for StoreError {
    fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Unavailable(_) => ErrorKind::Network,
            StoreError::Timeout(_) => ErrorKind::Timeout,
            StoreError::Rejected(_) => ErrorKind::Client,
            StoreError::CircuitOpen(_) => ErrorKind::CircuitOpen,
        }
    }
}

/// Where imported books are kept.
#[async_trait]
pub trait BookStore: Send + Sync {
    /// Insert or replace the record keyed by `book.id`.
    async fn upsert(&self, book: &Book) -> Result<(), StoreError>;

    async fn lookup(&self, id: &str) -> Result<Option<Book>, StoreError>;
}

/// In-process store, mostly for tests and the CLI.
#[derive(Debug, Default)]
pub struct MemoryStore {
    books: DashMap<String, Book>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}

#[async_trait]
impl BookStore for MemoryStore {
    async fn upsert(&self, book: &Book) -> Result<(), StoreError> {
        if book.id.is_empty() {
            return Err(StoreError::Rejected("book id is empty".into()));
        }
        self.books.insert(book.id.clone(), book.clone());
        Ok(())
    }

    async fn lookup(&self, id: &str) -> Result<Option<Book>, StoreError> {
        Ok(self.books.get(id).map(|entry| entry.value().clone()))
    }
}

/// Wraps a [`BookStore`] in its own breaker and the persistence retry preset
/// (2 attempts, connectivity errors only).
pub struct ResilientStore<S> {
    inner: S,
    breaker: CircuitBreaker,
    retry: RetryExecutor<StoreError>,
}

impl<S: BookStore> ResilientStore<S> {
    pub fn new(inner: S, config: PersistenceConfig) -> Self {
        Self {
            inner,
            breaker: CircuitBreaker::new(config.circuit_breaker).with_name("persistence"),
            retry: RetryExecutor::new(RetryPolicy::persistence().with_config(config.retry)),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn circuit_state(&self) -> CircuitSnapshot {
        self.breaker.snapshot()
    }
}

#[async_trait]
impl<S: BookStore> BookStore for ResilientStore<S> {
    async fn upsert(&self, book: &Book) -> Result<(), StoreError> {
        let inner = &self.inner;
        let retry = &self.retry;
        self.breaker
            .execute(move || retry.execute(move |_attempt| inner.upsert(book)))
            .await
    }

    async fn lookup(&self, id: &str) -> Result<Option<Book>, StoreError> {
        let inner = &self.inner;
        let retry = &self.retry;
        self.breaker
            .execute(move || retry.execute(move |_attempt| inner.lookup(id)))
            .await
    }
}
