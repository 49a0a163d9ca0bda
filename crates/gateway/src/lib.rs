//! Bookshelf metadata gateway
//!
//! [`BookGateway`] is the only way the rest of Bookshelf talks to the book
//! metadata provider. Each call is normalized, answered from the response
//! cache when possible, and otherwise sent through the circuit breaker, the
//! retry executor and the rate limiter (outermost first) to a [`BookSource`].
//!
//! ```no_run
//! use gateway::{BookGateway, GatewayConfig, GoogleBooksClient, ProviderConfig};
//!
//! # async fn run() -> Result<(), gateway::GatewayError> {
//! let client = GoogleBooksClient::new(&ProviderConfig::default())?;
//! let gateway = BookGateway::new(client, GatewayConfig::default());
//!
//! let results = gateway.search("dune", 10).await?;
//! for book in &results.items {
//!     println!("{} by {}", book.title, book.authors.join(", "));
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod params;
pub mod types;

mod gateway;
mod google;
mod source;
mod store;

pub use config::{GatewayConfig, PersistenceConfig, ProviderConfig, DEFAULT_BASE_URL};
pub use error::GatewayError;
pub use gateway::{BookGateway, GatewayBuilder, RateLimitStatus};
pub use google::GoogleBooksClient;
pub use params::{SearchQuery, VolumeId};
pub use source::BookSource;
pub use store::{BookStore, MemoryStore, ResilientStore, StoreError};
pub use types::{Book, Payload, SearchResults};

pub use resilience;
