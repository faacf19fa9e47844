pub mod channel;
pub mod fusion;
pub mod merge;
pub mod orchestrator;

// Re-export key types for convenience
pub use channel::{KeywordChannel, VectorChannel};
pub use fusion::RrfFusion;
pub use merge::merge_round_robin;
pub use orchestrator::{SearchOrchestrator, SearchOutcome, SearchStats};

use serde::{Deserialize, Deserializer, Serialize};

use crate::store::{GeoPoint, SearchHit};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pin {
    pub coordinate: GeoPoint,
}

/// Restaurant fields fetched from the store (`_source`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    /// Join key across channels and sub-queries
    pub place_id: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub title: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub summary: String,
    /// Multi-valued categories are joined with ", "
    #[serde(default, deserialize_with = "text_or_list")]
    pub category: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub address: String,
    #[serde(default, deserialize_with = "string_or_list")]
    pub convenience: Vec<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub atmosphere: Vec<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub occasion: Vec<String>,
    /// A malformed pin reads as absent rather than rejecting the document
    #[serde(default, deserialize_with = "lenient_pin", skip_serializing_if = "Option::is_none")]
    pub pin: Option<Pin>,
}

/// Indexed documents carry `null` for fields the crawler never filled.
fn string_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_pin<'de, D>(deserializer: D) -> Result<Option<Pin>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

/// A text field that some documents store as a list of values.
fn text_or_list<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(string_or_list(deserializer)?.join(", "))
}

/// Some documents store single-valued tags as a bare string.
fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Null(()),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
        OneOrMany::Null(()) => Vec::new(),
    })
}

/// One hit of one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedDocument {
    #[serde(flatten)]
    pub place: Place,
    /// Score reported by the store for this channel
    pub source_score: Option<f64>,
    /// 1-based position in the channel's hit list
    pub channel_rank: usize,
}

impl RetrievedDocument {
    /// Returns None for hits whose source lacks a usable `place_id`.
    pub fn from_hit(hit: SearchHit, rank: usize) -> Option<Self> {
        match serde_json::from_value::<Place>(hit.source) {
            Ok(place) if !place.place_id.is_empty() => Some(RetrievedDocument {
                place,
                source_score: hit.score,
                channel_rank: rank,
            }),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping hit without a usable source document");
                None
            }
        }
    }

    pub fn place_id(&self) -> &str {
        &self.place.place_id
    }
}

/// Which channels contributed a fused document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Hybrid,
    KeywordOnly,
    VectorOnly,
}

impl Provenance {
    pub fn from_ranks(keyword_rank: Option<usize>, vector_rank: Option<usize>) -> Self {
        match (keyword_rank, vector_rank) {
            (Some(_), Some(_)) => Provenance::Hybrid,
            (None, Some(_)) => Provenance::VectorOnly,
            // a fused document always has at least one rank
            (Some(_), None) | (None, None) => Provenance::KeywordOnly,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Hybrid => "hybrid",
            Provenance::KeywordOnly => "keyword_only",
            Provenance::VectorOnly => "vector_only",
        }
    }
}

/// A document after reciprocal rank fusion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedDocument {
    #[serde(flatten)]
    pub place: Place,
    /// Sum of 1/(k + rank) over the channels the document appeared in
    pub rrf_score: f64,
    pub keyword_rank: Option<usize>,
    pub keyword_score: Option<f64>,
    pub vector_rank: Option<usize>,
    pub vector_score: Option<f64>,
    pub provenance: Provenance,
    /// 1-based position in the fused list of the sub-query that produced it
    pub final_rank: usize,
}

impl FusedDocument {
    pub fn place_id(&self) -> &str {
        &self.place.place_id
    }
}

/// Count documents per provenance: (hybrid, keyword_only, vector_only).
pub fn provenance_counts(docs: &[FusedDocument]) -> (usize, usize, usize) {
    docs.iter().fold((0, 0, 0), |(h, k, v), doc| match doc.provenance {
        Provenance::Hybrid => (h + 1, k, v),
        Provenance::KeywordOnly => (h, k + 1, v),
        Provenance::VectorOnly => (h, k, v + 1),
    })
}
