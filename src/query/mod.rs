/// Query composition for the keyword and vector channels.
///
/// The composer is pure: location lookups happen beforehand in `EntityFilterBuilder`, so
/// the same inputs always yield the same bodies. Negation entities pass through a
/// pluggable `NegationPolicy`; whether they should become exclusions is still open, so
/// the default policy ignores them.

pub mod keyword;
pub mod vector;

use std::sync::Arc;

use serde_json::{json, Value};

use crate::config::{Config, NegationMode};
use crate::entities::{EntityCategory, EntitySet, Intent};
use crate::filters::{EntityFilters, MenuFragment};

pub use keyword::{build_keyword_query, is_match_nothing, match_nothing};
pub use vector::build_vector_query;

/// Turns negation entities into `must_not` clauses for the keyword channel.
pub trait NegationPolicy: Send + Sync {
    fn exclusions(&self, negations: &EntitySet) -> Vec<Value>;

    fn name(&self) -> &'static str;
}

/// Accepts negation entities as metadata only.
pub struct IgnoreNegations;

impl NegationPolicy for IgnoreNegations {
    fn exclusions(&self, negations: &EntitySet) -> Vec<Value> {
        if !negations.is_empty() {
            tracing::debug!(?negations, "Negation entities present but ignored by policy");
        }
        Vec::new()
    }

    fn name(&self) -> &'static str {
        "ignore"
    }
}

/// One `must_not` match per negated category.
pub struct MustNotNegations;

impl NegationPolicy for MustNotNegations {
    fn exclusions(&self, negations: &EntitySet) -> Vec<Value> {
        EntityCategory::ALL
            .iter()
            .filter_map(|category| {
                let query = negations.joined(*category)?;
                Some(match category {
                    EntityCategory::Menu => MenuFragment { query }.required(),
                    other => json!({ "match": { other.field(): { "query": query } } }),
                })
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "must_not"
    }
}

pub fn negation_policy(mode: NegationMode) -> Arc<dyn NegationPolicy> {
    match mode {
        NegationMode::Ignore => Arc::new(IgnoreNegations),
        NegationMode::MustNot => Arc::new(MustNotNegations),
    }
}

/// Builds both channel bodies for one sub-query.
#[derive(Clone)]
pub struct QueryComposer {
    negation: Arc<dyn NegationPolicy>,
    vector_field: String,
    num_candidates_multiplier: usize,
}

impl QueryComposer {
    pub fn new(
        negation: Arc<dyn NegationPolicy>,
        vector_field: impl Into<String>,
        num_candidates_multiplier: usize,
    ) -> Self {
        QueryComposer {
            negation,
            vector_field: vector_field.into(),
            num_candidates_multiplier,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        QueryComposer::new(
            negation_policy(config.search.negation_policy),
            config.embedding.vector_field.clone(),
            config.search.num_candidates_multiplier,
        )
    }

    pub fn negation_policy_name(&self) -> &'static str {
        self.negation.name()
    }

    pub fn keyword(
        &self,
        intent: Intent,
        query_text: &str,
        entities: &EntitySet,
        negations: &EntitySet,
        filters: &EntityFilters,
        size: usize,
    ) -> Value {
        let exclusions = self.negation.exclusions(negations);
        build_keyword_query(intent, query_text, entities, filters, exclusions, size)
    }

    pub fn vector(&self, embedding: &[f32], filters: &EntityFilters, size: usize) -> Value {
        build_vector_query(
            &self.vector_field,
            embedding,
            &filters.location,
            size,
            self.num_candidates_multiplier,
        )
    }
}
