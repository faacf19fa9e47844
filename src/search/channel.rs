/// Retrieval channels: run a composed body against the restaurant index.
///
/// A channel never fails a search. Store or embedder errors are logged and turn into an
/// empty list, so fusion degrades to whichever channel still answered.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;

use super::RetrievedDocument;
use crate::embedding::EmbeddingProvider;
use crate::filters::EntityFilters;
use crate::query::{is_match_nothing, QueryComposer};
use crate::store::{DocumentStore, SearchHit};

/// Convert store hits into ranked documents.
///
/// Hits without a usable place_id are skipped and a repeated place_id keeps its first
/// (best) position, so ranks stay contiguous from 1.
pub fn rank_hits(hits: Vec<SearchHit>) -> Vec<RetrievedDocument> {
    let mut seen: HashSet<String> = HashSet::with_capacity(hits.len());
    let mut docs = Vec::with_capacity(hits.len());
    for hit in hits {
        let Some(mut doc) = RetrievedDocument::from_hit(hit, 0) else {
            continue;
        };
        if !seen.insert(doc.place_id().to_string()) {
            continue;
        }
        doc.channel_rank = docs.len() + 1;
        docs.push(doc);
    }
    docs
}

#[derive(Clone)]
pub struct KeywordChannel {
    store: Arc<dyn DocumentStore>,
    index: String,
}

impl KeywordChannel {
    pub fn new(store: Arc<dyn DocumentStore>, index: impl Into<String>) -> Self {
        KeywordChannel {
            store,
            index: index.into(),
        }
    }

    pub async fn retrieve(&self, body: &Value) -> Vec<RetrievedDocument> {
        if is_match_nothing(body) {
            tracing::debug!("Keyword query has no signal, skipping store call");
            return Vec::new();
        }

        match self.store.search(&self.index, body).await {
            Ok(hits) => {
                let docs = rank_hits(hits);
                tracing::debug!(hits = docs.len(), "Keyword channel returned");
                docs
            }
            Err(e) => {
                tracing::warn!(error = %e, index = %self.index, "Keyword channel failed, continuing without it");
                Vec::new()
            }
        }
    }
}

#[derive(Clone)]
pub struct VectorChannel {
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: String,
}

impl VectorChannel {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        index: impl Into<String>,
    ) -> Self {
        VectorChannel {
            store,
            embedder,
            index: index.into(),
        }
    }

    /// Embed `query_text` and run a kNN query restricted by the location filters only.
    pub async fn retrieve(
        &self,
        composer: &QueryComposer,
        query_text: &str,
        filters: &EntityFilters,
        size: usize,
    ) -> Vec<RetrievedDocument> {
        let embedding = match self.embedder.embed(query_text).await {
            Ok(embedding) => embedding,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    model = self.embedder.model_name(),
                    "Embedding failed, vector channel skipped"
                );
                return Vec::new();
            }
        };

        let body = composer.vector(&embedding, filters, size);
        match self.store.search(&self.index, &body).await {
            Ok(hits) => {
                let docs = rank_hits(hits);
                tracing::debug!(hits = docs.len(), "Vector channel returned");
                docs
            }
            Err(e) => {
                tracing::warn!(error = %e, index = %self.index, "Vector channel failed, continuing without it");
                Vec::new()
            }
        }
    }
}
