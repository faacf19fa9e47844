/// Elasticsearch document store
///
/// Calls the `_search` endpoint using reqwest. One client per process: the underlying
/// connection pool is reused by every request and sub-query.
/// Basic auth is optional (MATJIP_STORE__USERNAME / MATJIP_STORE__PASSWORD).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{CoordinateLookup, DocumentStore, GeoPoint, PlaceCandidate, SearchHit, StoreError};
use crate::config::StoreConfig;

/// `_search` response envelope
#[derive(Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    hits: Vec<RawHit>,
}

#[derive(Deserialize)]
struct RawHit {
    #[serde(rename = "_source", default)]
    source: serde_json::Value,
    #[serde(rename = "_score")]
    score: Option<f64>,
}

pub struct ElasticsearchStore {
    client: reqwest::Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    coordinate_index: String,
}

impl ElasticsearchStore {
    /// Build the shared client from store configuration.
    ///
    /// # Errors
    /// Returns `StoreError::Transport` if the HTTP client cannot be constructed
    /// (e.g. TLS backend initialization failure).
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| StoreError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(ElasticsearchStore {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            coordinate_index: config.coordinate_index.clone(),
        })
    }

    async fn post_search(
        &self,
        index: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, StoreError> {
        let url = format!("{}/{}/_search", self.base_url, index);

        let mut request = self.client.post(&url).json(body);
        if let Some(ref username) = self.username {
            request = request.basic_auth(username, self.password.as_ref());
        }

        let response = request.send().await.map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(StoreError::Api {
                status,
                message: body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| StoreError::Decode(format!("Failed to parse search response: {}", e)))
    }
}

fn map_reqwest_error(e: reqwest::Error) -> StoreError {
    if e.is_timeout() {
        StoreError::Timeout(e.to_string())
    } else {
        StoreError::Transport(format!("HTTP request failed: {}", e))
    }
}

/// Extract hits, in response order, from a `_search` response body.
pub fn parse_hits(body: serde_json::Value) -> Result<Vec<SearchHit>, StoreError> {
    let response: SearchResponse = serde_json::from_value(body)
        .map_err(|e| StoreError::Decode(format!("Unexpected search response shape: {}", e)))?;

    Ok(response
        .hits
        .hits
        .into_iter()
        .map(|hit| SearchHit {
            source: hit.source,
            score: hit.score,
        })
        .collect())
}

/// Convert coordinate-index hits to candidates, one per hit.
///
/// A document without a usable `{name, pin.coordinate}` still counts as a candidate
/// (with no coordinate), so the hit count seen by location resolution stays honest.
pub fn parse_places(hits: Vec<SearchHit>) -> Vec<PlaceCandidate> {
    hits.into_iter()
        .map(|hit| {
            let name = hit.source["name"].as_str().unwrap_or_default().to_string();
            let coordinate =
                match serde_json::from_value::<GeoPoint>(hit.source["pin"]["coordinate"].clone()) {
                    Ok(point) => Some(point),
                    Err(e) => {
                        tracing::debug!(name = %name, error = %e, "Coordinate document without a usable pin");
                        None
                    }
                };
            PlaceCandidate { name, coordinate }
        })
        .collect()
}

#[async_trait]
impl DocumentStore for ElasticsearchStore {
    async fn search(
        &self,
        index: &str,
        body: &serde_json::Value,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let response = self.post_search(index, body).await?;
        parse_hits(response)
    }
}

#[async_trait]
impl CoordinateLookup for ElasticsearchStore {
    async fn lookup(&self, name: &str) -> Result<Vec<PlaceCandidate>, StoreError> {
        let body = json!({
            "query": {
                "match": {
                    "name": {
                        "query": name,
                        "operator": "and"
                    }
                }
            }
        });

        let hits = self.search(&self.coordinate_index, &body).await?;
        Ok(parse_places(hits))
    }
}
