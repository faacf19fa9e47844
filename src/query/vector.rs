/// Vector-channel kNN query body.
///
/// Identical for every intent. Only location filters are attached: entity semantics are
/// already carried by the embedding, and exact-match entity filters would undo the
/// point of semantic retrieval.

use serde_json::{json, Value};

use crate::store::SOURCE_FIELDS;

pub fn build_vector_query(
    field: &str,
    embedding: &[f32],
    location_filters: &[Value],
    k: usize,
    num_candidates_multiplier: usize,
) -> Value {
    let mut knn = json!({
        "field": field,
        "query_vector": embedding,
        "k": k,
        "num_candidates": k * num_candidates_multiplier.max(1),
    });
    if !location_filters.is_empty() {
        knn["filter"] = Value::Array(location_filters.to_vec());
    }

    json!({
        "size": k,
        "_source": { "includes": SOURCE_FIELDS },
        "knn": knn
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_knn_shape() {
        let body = build_vector_query("embedding", &[0.6, 0.8], &[], 50, 4);
        assert_eq!(body["size"], 50);
        assert_eq!(body["knn"]["field"], "embedding");
        assert_eq!(body["knn"]["k"], 50);
        assert_eq!(body["knn"]["num_candidates"], 200);
        assert_eq!(body["knn"]["query_vector"].as_array().unwrap().len(), 2);
        assert!(body["knn"].get("filter").is_none());
    }

    #[test]
    fn test_only_location_filters_attached() {
        let geo = json!({"geo_distance": {"distance": "3km", "pin.coordinate": {"lat": 37.5, "lon": 127.0}}});
        let body = build_vector_query("embedding", &[1.0], &[geo.clone()], 20, 4);
        assert_eq!(body["knn"]["filter"], json!([geo]));
    }
}
