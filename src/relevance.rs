/// Post-retrieval relevance filtering seam.
///
/// Relevance grading happens outside this crate (an LLM grader in the surrounding
/// workflow). The orchestrator hands the final list to a `RelevanceFilter` and keeps the
/// unfiltered list when the filter fails.

use async_trait::async_trait;

use crate::errors::MatjipError;
use crate::search::FusedDocument;

#[async_trait]
pub trait RelevanceFilter: Send + Sync {
    /// Return the subset (in any order the filter chooses) judged relevant to `query_text`.
    async fn filter(
        &self,
        query_text: &str,
        documents: Vec<FusedDocument>,
    ) -> Result<Vec<FusedDocument>, MatjipError>;

    fn name(&self) -> &'static str;
}

/// Keeps every document.
pub struct AcceptAll;

#[async_trait]
impl RelevanceFilter for AcceptAll {
    async fn filter(
        &self,
        _query_text: &str,
        documents: Vec<FusedDocument>,
    ) -> Result<Vec<FusedDocument>, MatjipError> {
        Ok(documents)
    }

    fn name(&self) -> &'static str {
        "accept_all"
    }
}
