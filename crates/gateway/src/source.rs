use async_trait::async_trait;
use std::sync::Arc;

use crate::params::{SearchQuery, VolumeId};
use crate::types::{Book, SearchResults};
use crate::GatewayError;

/// The upstream metadata provider.
///
/// Implementations perform exactly one request per call and report failures
/// as classified [`GatewayError`]s. Retrying, caching and rate limiting are
/// the gateway's job.
#[async_trait]
pub trait BookSource: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> Result<SearchResults, GatewayError>;

    async fn volume(&self, id: &VolumeId) -> Result<Book, GatewayError>;
}

#[async_trait]
impl<S: BookSource + ?Sized> BookSource for Arc<S> {
    async fn search(&self, query: &SearchQuery) -> Result<SearchResults, GatewayError> {
        (**self).search(query).await
    }

    async fn volume(&self, id: &VolumeId) -> Result<Book, GatewayError> {
        (**self).volume(id).await
    }
}
