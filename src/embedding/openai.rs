/// OpenAI-compatible embedding provider
///
/// Calls `{base_url}/embeddings` using reqwest. The base URL is configurable so any
/// OpenAI-compatible endpoint works. The `dimensions` request field pins the output
/// size to the indexed vector field (768 by default).
/// Requires MATJIP_EMBEDDING__API_KEY env var or embedding.api_key in matjip.toml.

use async_trait::async_trait;

use super::{EmbeddingError, EmbeddingProvider, normalize_l2};
use crate::config::EmbeddingConfig;

/// Request body for the Embeddings API
#[derive(serde::Serialize)]
struct EmbedRequest {
    input: String,
    model: String,
    dimensions: usize,
}

/// Response from the Embeddings API
#[derive(serde::Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

/// Single embedding result
#[derive(serde::Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

/// OpenAI-backed embedding provider.
///
/// Requires a valid API key, validated on construction rather than at embed time.
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dim: usize,
}

impl OpenAIEmbeddingProvider {
    /// Create a new OpenAIEmbeddingProvider from embedding configuration.
    ///
    /// # Errors
    /// Returns `EmbeddingError::NotConfigured` if the API key is missing or empty.
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let api_key = config.api_key.clone().unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(EmbeddingError::NotConfigured(
                "An API key is required for the query embedder. \
                 Set MATJIP_EMBEDDING__API_KEY or embedding.api_key in matjip.toml"
                    .to_string(),
            ));
        }

        Ok(OpenAIEmbeddingProvider {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            dim: config.dimensions,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let request = EmbedRequest {
            input: text.to_string(),
            model: self.model.clone(),
            dimensions: self.dim,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| EmbeddingError::Generation(format!("HTTP request failed: {}", e)))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(EmbeddingError::Api {
                status,
                message: body,
            });
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Generation(format!("Failed to parse API response: {}", e)))?;

        let embedding = embed_response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbeddingError::Generation("API returned empty embedding list".to_string()))?;

        if embedding.len() != self.dim {
            return Err(EmbeddingError::Dimension {
                expected: self.dim,
                actual: embedding.len(),
            });
        }

        Ok(normalize_l2(embedding))
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}
