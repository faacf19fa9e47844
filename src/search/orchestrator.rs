/// Top-level search entry point.
///
/// One request flows through: normalize the NLU payload, pick the intent's size budget,
/// resolve entity filters once, then fan each sub-query out to its own task. A task runs
/// both channels concurrently and fuses them. A single sub-query is capped directly;
/// several are interleaved by `merge_round_robin`. The relevance filter sees the final
/// list last.
///
/// The whole request runs under the configured deadline; dropping or timing out the
/// request drops the JoinSet, which aborts every in-flight sub-query.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Value};
use tokio::task::JoinSet;
use tracing::Instrument;

use super::{
    merge_round_robin, provenance_counts, FusedDocument, KeywordChannel, RrfFusion, VectorChannel,
};
use crate::config::{Config, SearchConfig};
use crate::embedding::EmbeddingProvider;
use crate::entities::{Intent, SearchRequest};
use crate::errors::MatjipError;
use crate::filters::{EntityFilterBuilder, EntityFilters};
use crate::query::QueryComposer;
use crate::relevance::{AcceptAll, RelevanceFilter};
use crate::store::{CoordinateLookup, DocumentStore};

/// Per-request diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchStats {
    pub sub_queries: usize,
    /// Per-channel window requested for each sub-query
    pub fetch_size: usize,
    pub keyword_hits: usize,
    pub vector_hits: usize,
    pub hybrid: usize,
    pub keyword_only: usize,
    pub vector_only: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub intent: Intent,
    pub documents: Vec<FusedDocument>,
    pub stats: SearchStats,
}

struct SubQueryResult {
    index: usize,
    keyword_hits: usize,
    vector_hits: usize,
    fused: Vec<FusedDocument>,
}

#[derive(Clone)]
pub struct SearchOrchestrator {
    keyword: KeywordChannel,
    vector: VectorChannel,
    filters: Arc<EntityFilterBuilder>,
    composer: QueryComposer,
    fusion: RrfFusion,
    relevance: Arc<dyn RelevanceFilter>,
    settings: SearchConfig,
}

impl SearchOrchestrator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        lookup: Arc<dyn CoordinateLookup>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: &Config,
    ) -> Self {
        let index = config.store.restaurant_index.clone();
        SearchOrchestrator {
            keyword: KeywordChannel::new(store.clone(), index.clone()),
            vector: VectorChannel::new(store, embedder, index),
            filters: Arc::new(EntityFilterBuilder::new(lookup, config.store.geo_radius.clone())),
            composer: QueryComposer::from_config(config),
            fusion: RrfFusion::new(config.search.rrf_k),
            relevance: Arc::new(AcceptAll),
            settings: config.search.clone(),
        }
    }

    pub fn with_relevance_filter(mut self, relevance: Arc<dyn RelevanceFilter>) -> Self {
        self.relevance = relevance;
        self
    }

    pub fn settings(&self) -> &SearchConfig {
        &self.settings
    }

    /// Run one search request under the configured deadline.
    ///
    /// Channel failures never surface here: a request whose every channel failed
    /// returns an empty document list and the caller decides on a fallback.
    pub async fn search(&self, request: SearchRequest) -> Result<SearchOutcome, MatjipError> {
        let deadline = self.settings.request_timeout();
        let span = tracing::info_span!(
            "search",
            request_id = %uuid::Uuid::new_v4(),
            intent = %request.intent
        );

        match tokio::time::timeout(deadline, self.run(request))
            .instrument(span)
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(timeout_secs = deadline.as_secs(), "Search exceeded deadline, aborting sub-queries");
                Err(MatjipError::Timeout(deadline.as_secs()))
            }
        }
    }

    async fn run(&self, request: SearchRequest) -> Result<SearchOutcome, MatjipError> {
        let started = Instant::now();
        let request = request.normalized();
        let intent = request.intent;
        let size = self.settings.size_budget(intent);

        if request.suggested_queries.is_empty() {
            tracing::info!("No sub-queries in request, returning empty result");
            return Ok(SearchOutcome {
                intent,
                documents: Vec::new(),
                stats: SearchStats {
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    ..Default::default()
                },
            });
        }

        let num_sub_queries = request.suggested_queries.len();
        let fetch_size = self.settings.fetch_size(intent, num_sub_queries);
        let filters = Arc::new(self.filters.build(&request.entities).await);
        let request = Arc::new(request);

        tracing::info!(
            sub_queries = num_sub_queries,
            size_budget = size,
            fetch_size,
            location_filters = filters.location.len(),
            negation_policy = self.composer.negation_policy_name(),
            "Search started"
        );

        let mut tasks = JoinSet::new();
        for (index, text) in request.suggested_queries.iter().cloned().enumerate() {
            let keyword = self.keyword.clone();
            let vector = self.vector.clone();
            let composer = self.composer.clone();
            let fusion = self.fusion;
            let filters = Arc::clone(&filters);
            let request = Arc::clone(&request);

            tasks.spawn(
                async move {
                    let body = composer.keyword(
                        request.intent,
                        &text,
                        &request.entities,
                        &request.negation_entities,
                        &filters,
                        fetch_size,
                    );
                    let (keyword_docs, vector_docs) = tokio::join!(
                        keyword.retrieve(&body),
                        vector.retrieve(&composer, &text, &filters, fetch_size),
                    );
                    let fused = fusion.fuse(&keyword_docs, &vector_docs);
                    let (hybrid, keyword_only, vector_only) = provenance_counts(&fused);
                    tracing::info!(
                        sub_query = %text,
                        keyword_hits = keyword_docs.len(),
                        vector_hits = vector_docs.len(),
                        hybrid,
                        keyword_only,
                        vector_only,
                        "Sub-query fused"
                    );
                    SubQueryResult {
                        index,
                        keyword_hits: keyword_docs.len(),
                        vector_hits: vector_docs.len(),
                        fused,
                    }
                }
                .in_current_span(),
            );
        }

        let mut results: Vec<SubQueryResult> = Vec::with_capacity(num_sub_queries);
        while let Some(joined) = tasks.join_next().await {
            let result = joined
                .map_err(|e| MatjipError::Internal(format!("Sub-query task failed: {}", e)))?;
            results.push(result);
        }
        results.sort_by_key(|r| r.index);

        let keyword_hits = results.iter().map(|r| r.keyword_hits).sum();
        let vector_hits = results.iter().map(|r| r.vector_hits).sum();

        let documents = if results.len() == 1 {
            let mut fused = results
                .pop()
                .map(|r| r.fused)
                .unwrap_or_default();
            fused.truncate(size);
            fused
        } else {
            merge_round_robin(results.into_iter().map(|r| r.fused).collect(), size)
        };

        let query_text = request.suggested_queries.join(" ");
        let documents = match self.relevance.filter(&query_text, documents.clone()).await {
            Ok(filtered) => {
                if filtered.len() != documents.len() {
                    tracing::debug!(
                        filter = self.relevance.name(),
                        before = documents.len(),
                        after = filtered.len(),
                        "Relevance filter applied"
                    );
                }
                filtered
            }
            Err(e) => {
                tracing::warn!(
                    filter = self.relevance.name(),
                    error = %e,
                    "Relevance filter failed, keeping unfiltered results"
                );
                documents
            }
        };

        let (hybrid, keyword_only, vector_only) = provenance_counts(&documents);
        let stats = SearchStats {
            sub_queries: num_sub_queries,
            fetch_size,
            keyword_hits,
            vector_hits,
            hybrid,
            keyword_only,
            vector_only,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        tracing::info!(
            results = documents.len(),
            hybrid,
            keyword_only,
            vector_only,
            elapsed_ms = stats.elapsed_ms,
            "Search completed"
        );

        Ok(SearchOutcome {
            intent,
            documents,
            stats,
        })
    }

    /// Compose the queries a request would issue, without running retrieval.
    ///
    /// Location lookups still run so the filters match what a search would send. The
    /// query vector is elided since no embedding is computed.
    pub async fn explain(&self, request: SearchRequest) -> Value {
        let request = request.normalized();
        let intent = request.intent;
        let num_sub_queries = request.suggested_queries.len();
        let fetch_size = self.settings.fetch_size(intent, num_sub_queries);
        let filters: EntityFilters = self.filters.build(&request.entities).await;

        let sub_queries: Vec<Value> = request
            .suggested_queries
            .iter()
            .map(|text| {
                let keyword = self.composer.keyword(
                    intent,
                    text,
                    &request.entities,
                    &request.negation_entities,
                    &filters,
                    fetch_size,
                );
                let mut vector = self.composer.vector(&[], &filters, fetch_size);
                vector["knn"]["query_vector"] = json!("<elided>");
                json!({
                    "query": text,
                    "keyword": keyword,
                    "vector": vector,
                })
            })
            .collect();

        json!({
            "intent": intent,
            "size_budget": self.settings.size_budget(intent),
            "fetch_size": fetch_size,
            "negation_policy": self.composer.negation_policy_name(),
            "sub_queries": sub_queries,
        })
    }
}
