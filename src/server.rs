use rmcp::{
    ServerHandler,
    tool,
    model::{ServerCapabilities, Implementation, ProtocolVersion, CallToolResult},
    handler::server::wrapper::Parameters,
    ErrorData as McpError,
};
use serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use serde_json::json;
use std::time::Instant;

use crate::entities::{EntitySet, Intent, SearchRequest};
use crate::errors::MatjipError;
use crate::search::SearchOrchestrator;

pub struct RestaurantSearchService {
    search: SearchOrchestrator,
    start_time: Instant,
}

impl RestaurantSearchService {
    pub fn new(search: SearchOrchestrator) -> Self {
        Self {
            search,
            start_time: Instant::now(),
        }
    }

    fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

// Parameter structs

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct SearchRestaurantsParams {
    /// Classified intent: "search", "compare" or "information" (unknown values fall back to "search")
    pub intent: String,
    /// Extracted entities by category: location, title, category, convenience, menu, atmosphere, occasion
    #[serde(default)]
    pub entities: EntitySet,
    /// Entities the user wants excluded, same shape as entities
    #[serde(default)]
    pub negation_entities: EntitySet,
    /// Reformulated sub-queries (required, at least one non-empty)
    #[serde(default)]
    pub suggested_queries: Vec<String>,
}

impl SearchRestaurantsParams {
    /// Build a typed request. The NLU step occasionally emits intent variants, so an
    /// unrecognized intent degrades to a general search instead of failing the call.
    pub fn into_request(self) -> Result<SearchRequest, MatjipError> {
        if self.suggested_queries.iter().all(|q| q.trim().is_empty()) {
            return Err(MatjipError::validation(
                "suggested_queries",
                "Field 'suggested_queries' must contain at least one non-empty query",
            ));
        }

        let intent = self.intent.parse::<Intent>().unwrap_or_else(|e| {
            tracing::warn!(intent = %self.intent, error = %e, "Unrecognized intent, treating as search");
            Intent::Search
        });

        Ok(SearchRequest {
            intent,
            entities: self.entities,
            negation_entities: self.negation_entities,
            suggested_queries: self.suggested_queries,
        })
    }
}

// Helper: convert MatjipError to CallToolResult with isError: true
fn error_to_result(err: MatjipError) -> CallToolResult {
    match err {
        MatjipError::Validation { message, field } => {
            let mut obj = json!({
                "isError": true,
                "error": message,
            });
            if let Some(f) = field {
                obj["field"] = json!(f);
            }
            CallToolResult::structured_error(obj)
        }
        MatjipError::Timeout(secs) => {
            CallToolResult::structured_error(json!({
                "isError": true,
                "error": format!("Search timed out after {} seconds", secs),
                "hint": "Retry with fewer suggested_queries"
            }))
        }
        other => {
            CallToolResult::structured_error(json!({
                "isError": true,
                "error": other.to_string()
            }))
        }
    }
}

// Tool implementations
#[rmcp::tool_router]
impl RestaurantSearchService {
    #[tool(description = "Hybrid keyword + vector restaurant search. Takes NLU output (intent, entities, negation_entities, suggested_queries) and returns places ranked by reciprocal rank fusion, capped per intent (search 5, compare 8, information 3).")]
    async fn search_restaurants(
        &self,
        Parameters(params): Parameters<SearchRestaurantsParams>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(
            tool = "search_restaurants",
            intent = %params.intent,
            sub_queries = params.suggested_queries.len(),
            "Tool called"
        );

        let request = match params.into_request() {
            Ok(request) => request,
            Err(e) => return Ok(error_to_result(e)),
        };

        match self.search.search(request).await {
            Ok(outcome) => Ok(CallToolResult::structured(json!({
                "intent": outcome.intent,
                "results": outcome.documents,
                "count": outcome.documents.len(),
                "stats": outcome.stats,
                "hint": if outcome.documents.is_empty() {
                    "No places matched; consider a web search fallback"
                } else {
                    "Results are ordered by fused rank"
                }
            }))),
            Err(e) => Ok(error_to_result(e)),
        }
    }

    #[tool(description = "Check server health and status")]
    async fn health_check(
        &self,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(tool = "health_check", "Tool called");

        let settings = self.search.settings();
        let response = json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "uptime_seconds": self.uptime_seconds(),
            "rrf_k": settings.rrf_k,
            "negation_policy": settings.negation_policy,
        });

        Ok(CallToolResult::structured(response))
    }
}

// ServerHandler implementation
#[rmcp::tool_handler(router = Self::tool_router())]
impl ServerHandler for RestaurantSearchService {
    fn get_info(&self) -> rmcp::model::InitializeResult {
        rmcp::model::InitializeResult {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .build(),
            server_info: Implementation {
                name: "matjip".to_string(),
                title: None,
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: Some("Hybrid keyword + vector restaurant retrieval with reciprocal rank fusion".to_string()),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Restaurant retrieval core. Tools: search_restaurants (pass the NLU payload: intent, entities, negation_entities, suggested_queries), health_check.".to_string()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(intent: &str, queries: &[&str]) -> SearchRestaurantsParams {
        SearchRestaurantsParams {
            intent: intent.to_string(),
            entities: EntitySet::default(),
            negation_entities: EntitySet::default(),
            suggested_queries: queries.iter().map(|q| q.to_string()).collect(),
        }
    }

    #[test]
    fn test_known_intent_parsed() {
        let request = params("Compare", &["a", "b"]).into_request().unwrap();
        assert_eq!(request.intent, Intent::Compare);
    }

    #[test]
    fn test_unknown_intent_falls_back_to_search() {
        let request = params("recommendation", &["강남 맛집"]).into_request().unwrap();
        assert_eq!(request.intent, Intent::Search);
    }

    #[test]
    fn test_blank_sub_queries_rejected() {
        match params("search", &["  "]).into_request() {
            Err(MatjipError::Validation { field, .. }) => {
                assert_eq!(field.as_deref(), Some("suggested_queries"))
            }
            other => panic!("expected validation error, got {:?}", other.map(|r| r.intent)),
        }
    }

    #[test]
    fn test_error_results_by_kind() {
        let validation = error_to_result(MatjipError::validation("intent", "bad intent"));
        assert_eq!(validation.is_error, Some(true));
        assert_eq!(validation.structured_content.unwrap()["field"], "intent");

        let timeout = error_to_result(MatjipError::Timeout(30));
        let content = timeout.structured_content.unwrap();
        assert_eq!(content["error"], "Search timed out after 30 seconds");
        assert!(content["hint"].is_string());

        let internal = error_to_result(MatjipError::Internal("task panicked".into()));
        assert_eq!(internal.structured_content.unwrap()["error"], "Internal error: task panicked");
    }

    #[test]
    fn test_params_deserialize_with_missing_maps() {
        let params: SearchRestaurantsParams = serde_json::from_value(json!({
            "intent": "information",
            "entities": {"title": ["진대감"]},
            "suggested_queries": ["진대감 영업시간"]
        }))
        .unwrap();
        assert!(params.negation_entities.is_empty());
        assert_eq!(params.entities.title, vec!["진대감"]);
    }
}
