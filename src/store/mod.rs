/// Document store abstraction layer
///
/// The store executes composed query bodies; this crate never scores documents itself.
/// Two narrow traits cover what the retrieval core needs: running a search against an
/// index, and resolving a place name to coordinates. A single client instance is built
/// at startup and shared (Arc) by every request.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod elasticsearch;
pub mod retry;

/// Fields fetched for every restaurant hit.
pub const SOURCE_FIELDS: [&str; 9] = [
    "place_id",
    "title",
    "summary",
    "category",
    "address",
    "convenience",
    "atmosphere",
    "occasion",
    "pin",
];

/// Errors raised by a document store call.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection refused, reset, DNS failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Store answered with a non-success status
    #[error("Store API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Response body did not have the expected shape
    #[error("Failed to decode store response: {0}")]
    Decode(String),

    #[error("Store request timed out: {0}")]
    Timeout(String),
}

impl StoreError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Transport(_) | StoreError::Timeout(_) => true,
            StoreError::Api { status, .. } => *status == 429 || *status >= 500,
            StoreError::Decode(_) => false,
        }
    }
}

/// One hit of a store response, in response order.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub source: serde_json::Value,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// A named place returned by the coordinate lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceCandidate {
    pub name: String,
    /// None when the indexed document has no usable coordinate
    pub coordinate: Option<GeoPoint>,
}

/// Executes composed query bodies against an index.
///
/// Implementations must be Send + Sync: one client is shared across concurrent requests.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Run `body` against `index` and return hits in rank order (best first).
    async fn search(
        &self,
        index: &str,
        body: &serde_json::Value,
    ) -> Result<Vec<SearchHit>, StoreError>;
}

/// Resolves a location string to zero or more candidate coordinates, best first.
#[async_trait]
pub trait CoordinateLookup: Send + Sync {
    async fn lookup(&self, name: &str) -> Result<Vec<PlaceCandidate>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(StoreError::Transport("refused".into()).is_transient());
        assert!(StoreError::Timeout("10s".into()).is_transient());
        assert!(StoreError::Api { status: 503, message: String::new() }.is_transient());
        assert!(StoreError::Api { status: 429, message: String::new() }.is_transient());
        assert!(!StoreError::Api { status: 400, message: String::new() }.is_transient());
        assert!(!StoreError::Decode("bad json".into()).is_transient());
    }
}
