use crate::filters::build_filter_clauses;
use scholaris_model::{FilterValue, Filters};
use serde_json::{json, Value};

pub const LARGE_COLLECTION_DOCS: u64 = 1_000_000;
pub const LARGE_REQUEST_SIZE: usize = 1_000;
pub const MAX_K: usize = 1_000;
pub const MAX_CANDIDATES: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnnParams {
    pub k: usize,
    pub num_candidates: usize,
}

/// A search is large when either the corpus or the page is big enough that
/// script-score ranking would walk too many documents.
#[must_use]
pub fn is_large_search(collection_size: u64, size: usize) -> bool {
    collection_size > LARGE_COLLECTION_DOCS || size > LARGE_REQUEST_SIZE
}

/// Filter shape cost: maps add a unit per bound, long lists saturate at 3,
/// scalars count once.
#[must_use]
pub fn filter_complexity(filters: &Filters) -> f64 {
    let mut complexity = 0.0;
    for (_, condition) in filters.iter() {
        match condition {
            FilterValue::Range(bounds) => complexity += bounds.len() as f64,
            FilterValue::Terms(values) => complexity += (values.len() as f64 / 5.0).min(3.0),
            FilterValue::Term(_) => complexity += 1.0,
        }
    }
    complexity
}

impl KnnParams {
    /// Scales `k` and `num_candidates` with page size, filter complexity,
    /// and collection size, then clamps to engine limits.
    #[must_use]
    pub fn derive(size: usize, filters: &Filters, collection_size: u64) -> Self {
        let mut k = size * 2;
        let mut candidates = size * 5;

        let complexity = filter_complexity(filters);
        if complexity > 0.0 {
            k = (k as f64 * (1.0 + 0.15 * complexity)) as usize;
            candidates = (candidates as f64 * (1.0 + 0.1 * complexity)) as usize;
        }

        if collection_size > LARGE_COLLECTION_DOCS {
            k = k.max(size * 3);
            candidates = candidates.max(size * 10);
        } else if collection_size > 100_000 {
            k = k.max((size as f64 * 2.5) as usize);
            candidates = candidates.max(size * 7);
        } else if collection_size > 10_000 {
            k = k.max(size * 2);
            candidates = candidates.max(size * 5);
        } else {
            k = k.max((size as f64 * 1.5) as usize);
            candidates = candidates.max(size * 3);
        }

        if size > 100 {
            k = (k as f64 * 0.8) as usize;
            candidates = (candidates as f64 * 0.9) as usize;
        } else if size < 10 {
            k = k.max(20);
            candidates = candidates.max(50);
        }

        k = k.min(MAX_K);
        candidates = candidates.min(MAX_CANDIDATES);
        if k >= candidates {
            candidates = (k * 2).min(MAX_CANDIDATES);
        }

        Self {
            k,
            num_candidates: candidates,
        }
    }
}

/// Native approximate-KNN search over the title embedding.
#[must_use]
pub fn knn_search_body(
    query_vector: &[f32],
    size: usize,
    params: KnnParams,
    filters: &Filters,
) -> Value {
    let mut knn = json!({
        "field": "title_embedding",
        "query_vector": query_vector,
        "k": params.k,
        "num_candidates": params.num_candidates
    });
    let clauses = build_filter_clauses(filters);
    match clauses.len() {
        0 => {}
        1 => {
            knn["filter"] = clauses.into_iter().next().unwrap_or_else(|| json!({}));
        }
        _ => {
            knn["filter"] = json!({"bool": {"filter": clauses}});
        }
    }
    json!({"size": size, "knn": knn})
}

/// True when every embedding field is mapped as an indexed dense_vector, so
/// the native `knn` clause is answerable.
#[must_use]
pub fn knn_supported(mapping_properties: &Value) -> bool {
    ["title_embedding", "abstract_embedding", "keywords_embedding"]
        .iter()
        .all(|field| {
            let Some(spec) = mapping_properties.get(field) else {
                return false;
            };
            spec.get("type").and_then(Value::as_str) == Some("dense_vector")
                && spec.get("index").and_then(Value::as_bool) == Some(true)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filters_from(raw: Value) -> Filters {
        serde_json::from_value(raw).expect("filters decode")
    }

    #[test]
    fn base_params_scale_with_page_size() {
        let params = KnnParams::derive(20, &Filters::default(), 5_000);
        assert_eq!(params.k, 40);
        assert_eq!(params.num_candidates, 100);
    }

    #[test]
    fn tiny_pages_get_floors() {
        let params = KnnParams::derive(3, &Filters::default(), 100);
        assert!(params.k >= 20);
        assert!(params.num_candidates >= 50);
    }

    #[test]
    fn filter_complexity_expands_the_search_frontier() {
        let plain = KnnParams::derive(50, &Filters::default(), 50_000);
        let filtered = KnnParams::derive(
            50,
            &filters_from(json!({
                "publication_year": {"gte": 2018, "lte": 2022},
                "keywords": ["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"],
                "publication_type": "article"
            })),
            50_000,
        );
        assert!(filtered.k > plain.k);
        assert!(filtered.num_candidates > plain.num_candidates);
    }

    #[test]
    fn caps_hold_and_candidates_stay_above_k() {
        let params = KnnParams::derive(900, &Filters::default(), 5_000_000);
        assert!(params.k <= MAX_K);
        assert!(params.num_candidates <= MAX_CANDIDATES);
        assert!(params.num_candidates > params.k);
    }

    #[test]
    fn large_search_thresholds() {
        assert!(is_large_search(LARGE_COLLECTION_DOCS + 1, 10));
        assert!(is_large_search(10, LARGE_REQUEST_SIZE + 1));
        assert!(!is_large_search(10, 10));
    }

    #[test]
    fn single_filter_clause_is_inlined() {
        let body = knn_search_body(
            &[0.1, 0.2],
            10,
            KnnParams { k: 20, num_candidates: 50 },
            &filters_from(json!({"publication_type": "article"})),
        );
        assert_eq!(
            body["knn"]["filter"],
            json!({"term": {"publication_type": "article"}})
        );

        let body = knn_search_body(
            &[0.1, 0.2],
            10,
            KnnParams { k: 20, num_candidates: 50 },
            &filters_from(json!({"publication_type": "article", "publication_year": 2020})),
        );
        assert!(body["knn"]["filter"]["bool"]["filter"].is_array());
    }

    #[test]
    fn knn_support_needs_indexed_dense_vectors() {
        let good = json!({
            "title_embedding": {"type": "dense_vector", "dims": 384, "index": true},
            "abstract_embedding": {"type": "dense_vector", "dims": 384, "index": true},
            "keywords_embedding": {"type": "dense_vector", "dims": 384, "index": true}
        });
        assert!(knn_supported(&good));

        let unindexed = json!({
            "title_embedding": {"type": "dense_vector", "dims": 384},
            "abstract_embedding": {"type": "dense_vector", "dims": 384, "index": true},
            "keywords_embedding": {"type": "dense_vector", "dims": 384, "index": true}
        });
        assert!(!knn_supported(&unindexed));
        assert!(!knn_supported(&json!({})));
    }
}
