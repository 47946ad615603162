//! Search index client.
//!
//! [`SearchIndexClient`] owns one document type and talks to the engine
//! through a [`SearchTransport`]. Every call goes through the client's
//! [`RetryPolicy`](crate::retry::RetryPolicy):
//!
//! - transport failures (refused connection, timeout) are retried and, once
//!   the attempts are used up, returned as `Err`;
//! - engine faults (an HTTP answer with an error body) are logged with the
//!   payload and reported as `Ok(false)` or [`Lookup::Error`](crate::lookup::Lookup::Error).
//!
//! The OpenSearch transport lives behind the `opensearch` feature. Tests and
//! other engines plug in their own [`SearchTransport`].

pub mod analysis;
mod client;
pub mod config;
#[cfg(feature = "opensearch")]
mod opensearch;
mod transport;

pub use client::SearchIndexClient;
pub use config::{Credentials, SearchConfig};
#[cfg(feature = "opensearch")]
pub use opensearch::OpenSearchTransport;
pub use transport::{EngineResponse, SearchTransport};

/// One ranked hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit<D> {
    pub id: String,
    /// `None` when the query is sorted or scoring is disabled.
    pub score: Option<f64>,
    pub document: D,
}

/// Hits of one search request plus the engine's total match count.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResults<D> {
    pub total: u64,
    pub hits: Vec<SearchHit<D>>,
}

impl<D> SearchResults<D> {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn documents(&self) -> impl Iterator<Item = &D> {
        self.hits.iter().map(|hit| &hit.document)
    }
}
