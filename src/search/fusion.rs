/// Reciprocal Rank Fusion of the keyword and vector channel lists.
///
/// score(d) = Σ 1 / (k + rank_i(d)) over the channels d appears in, rank 1-based.
/// Documents found by both channels outrank single-channel documents at similar ranks.
///
/// Pure function of its two ordered inputs: ties keep first-encounter order (keyword list
/// first, then vector list) through a stable sort, so output never depends on hash order.

use std::collections::HashMap;

use super::{FusedDocument, Place, Provenance, RetrievedDocument};

pub const DEFAULT_RRF_K: f64 = 60.0;

#[derive(Debug, Clone, Copy)]
pub struct RrfFusion {
    /// Smoothing constant: higher values flatten the influence of rank differences
    k: f64,
}

impl Default for RrfFusion {
    fn default() -> Self {
        RrfFusion { k: DEFAULT_RRF_K }
    }
}

/// Per-document accumulator, kept in first-encounter order.
struct Entry {
    place: Place,
    score: f64,
    keyword_rank: Option<usize>,
    keyword_score: Option<f64>,
    vector_rank: Option<usize>,
    vector_score: Option<f64>,
}

impl RrfFusion {
    pub fn new(k: f64) -> Self {
        RrfFusion { k }
    }

    pub fn k(&self) -> f64 {
        self.k
    }

    fn contribution(&self, rank: usize) -> f64 {
        1.0 / (self.k + rank as f64)
    }

    /// Fuse two rank-ordered lists into one list ordered by RRF score.
    ///
    /// Ranks come from list position (index + 1). Each list is assumed to hold a
    /// place_id at most once; a repeated id only counts its first occurrence.
    pub fn fuse(
        &self,
        keyword: &[RetrievedDocument],
        vector: &[RetrievedDocument],
    ) -> Vec<FusedDocument> {
        let mut entries: Vec<Entry> = Vec::with_capacity(keyword.len() + vector.len());
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(keyword.len() + vector.len());

        for (position, doc) in keyword.iter().enumerate() {
            let rank = position + 1;
            match index.get(doc.place_id()) {
                // duplicate within the keyword list
                Some(_) => continue,
                None => {
                    index.insert(doc.place_id(), entries.len());
                    entries.push(Entry {
                        place: doc.place.clone(),
                        score: self.contribution(rank),
                        keyword_rank: Some(rank),
                        keyword_score: doc.source_score,
                        vector_rank: None,
                        vector_score: None,
                    });
                }
            }
        }

        for (position, doc) in vector.iter().enumerate() {
            let rank = position + 1;
            match index.get(doc.place_id()) {
                Some(&i) => {
                    let entry = &mut entries[i];
                    if entry.vector_rank.is_some() {
                        continue;
                    }
                    entry.score += self.contribution(rank);
                    entry.vector_rank = Some(rank);
                    entry.vector_score = doc.source_score;
                }
                None => {
                    index.insert(doc.place_id(), entries.len());
                    entries.push(Entry {
                        place: doc.place.clone(),
                        score: self.contribution(rank),
                        keyword_rank: None,
                        keyword_score: None,
                        vector_rank: Some(rank),
                        vector_score: doc.source_score,
                    });
                }
            }
        }

        // Stable: equal scores keep first-encounter order.
        entries.sort_by(|a, b| b.score.total_cmp(&a.score));

        entries
            .into_iter()
            .enumerate()
            .map(|(i, entry)| FusedDocument {
                provenance: Provenance::from_ranks(entry.keyword_rank, entry.vector_rank),
                place: entry.place,
                rrf_score: entry.score,
                keyword_rank: entry.keyword_rank,
                keyword_score: entry.keyword_score,
                vector_rank: entry.vector_rank,
                vector_score: entry.vector_score,
                final_rank: i + 1,
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn doc(id: &str, score: f64) -> RetrievedDocument {
        RetrievedDocument {
            place: Place {
                place_id: id.to_string(),
                title: format!("place {}", id),
                summary: String::new(),
                category: String::new(),
                address: String::new(),
                convenience: vec![],
                atmosphere: vec![],
                occasion: vec![],
                pin: None,
            },
            source_score: Some(score),
            channel_rank: 0,
        }
    }

    fn ids(fused: &[FusedDocument]) -> Vec<&str> {
        fused.iter().map(|d| d.place_id()).collect()
    }

    #[test]
    fn test_rrf_score_formula() {
        let keyword = vec![doc("a", 9.0), doc("b", 7.0)];
        let vector = vec![doc("b", 0.9), doc("c", 0.8)];

        let fused = RrfFusion::default().fuse(&keyword, &vector);

        let b = fused.iter().find(|d| d.place_id() == "b").unwrap();
        assert!((b.rrf_score - (1.0 / 62.0 + 1.0 / 61.0)).abs() < 1e-12);
        assert_eq!(b.keyword_rank, Some(2));
        assert_eq!(b.vector_rank, Some(1));
        assert_eq!(b.keyword_score, Some(7.0));
        assert_eq!(b.vector_score, Some(0.9));
        assert_eq!(b.provenance, Provenance::Hybrid);

        let a = fused.iter().find(|d| d.place_id() == "a").unwrap();
        assert!((a.rrf_score - 1.0 / 61.0).abs() < 1e-12);
        assert_eq!(a.provenance, Provenance::KeywordOnly);
        assert_eq!(a.vector_rank, None);
        assert_eq!(a.vector_score, None);
    }

    #[test]
    fn test_hybrid_document_ranks_first() {
        let keyword = vec![doc("a", 9.0), doc("b", 7.0)];
        let vector = vec![doc("b", 0.9), doc("c", 0.8)];

        let fused = RrfFusion::default().fuse(&keyword, &vector);
        assert_eq!(ids(&fused), vec!["b", "a", "c"]);
        let ranks: Vec<usize> = fused.iter().map(|d| d.final_rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn test_ties_keep_keyword_first_order() {
        // a and c both score 1/61, b and d both 1/62
        let keyword = vec![doc("a", 5.0), doc("b", 4.0)];
        let vector = vec![doc("c", 0.9), doc("d", 0.8)];

        let fused = RrfFusion::default().fuse(&keyword, &vector);
        assert_eq!(ids(&fused), vec!["a", "c", "b", "d"]);
    }

    #[test]
    fn test_deterministic_across_runs() {
        let keyword: Vec<_> = (0..30).map(|i| doc(&format!("k{}", i), 30.0 - i as f64)).collect();
        let vector: Vec<_> = (0..30).map(|i| doc(&format!("k{}", (i * 7) % 40), 1.0)).collect();

        let fusion = RrfFusion::default();
        let first = fusion.fuse(&keyword, &vector);
        for _ in 0..10 {
            assert_eq!(fusion.fuse(&keyword, &vector), first);
        }
    }

    #[test]
    fn test_empty_keyword_channel_degrades_to_vector_only() {
        let vector = vec![doc("d1", 0.9), doc("d2", 0.8)];

        let fused = RrfFusion::default().fuse(&[], &vector);

        assert_eq!(ids(&fused), vec!["d1", "d2"]);
        assert_eq!(fused[0].final_rank, 1);
        assert_eq!(fused[1].final_rank, 2);
        assert!(fused.iter().all(|d| d.provenance == Provenance::VectorOnly));
        assert!((fused[0].rrf_score - 1.0 / 61.0).abs() < 1e-12);
        assert!((fused[1].rrf_score - 1.0 / 62.0).abs() < 1e-12);
    }

    #[test]
    fn test_both_empty() {
        assert!(RrfFusion::default().fuse(&[], &[]).is_empty());
    }

    #[test]
    fn test_provenance_invariant_holds() {
        let keyword = vec![doc("a", 1.0), doc("b", 1.0), doc("c", 1.0)];
        let vector = vec![doc("c", 1.0), doc("d", 1.0), doc("a", 1.0)];

        for d in RrfFusion::default().fuse(&keyword, &vector) {
            let both = d.keyword_rank.is_some() && d.vector_rank.is_some();
            assert_eq!(d.provenance == Provenance::Hybrid, both);
        }
    }

    #[test]
    fn test_custom_k() {
        let fused = RrfFusion::new(1.0).fuse(&[doc("a", 1.0)], &[]);
        assert!((fused[0].rrf_score - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_duplicate_within_channel_counted_once() {
        let keyword = vec![doc("a", 2.0), doc("a", 1.0)];
        let fused = RrfFusion::default().fuse(&keyword, &[]);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].keyword_rank, Some(1));
    }
}
