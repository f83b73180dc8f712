use crate::filters::build_filter_clauses;
use scholaris_model::Filters;
use serde_json::{json, Value};

pub const SEMANTIC_WEIGHT_TITLE: f64 = 0.3;
pub const SEMANTIC_WEIGHT_ABSTRACT: f64 = 0.5;
pub const SEMANTIC_WEIGHT_KEYWORDS: f64 = 0.2;
pub const DEFAULT_MIN_SCORE: f64 = 0.5;

const EMBEDDING_FIELDS: [(&str, f64); 3] = [
    ("title_embedding", SEMANTIC_WEIGHT_TITLE),
    ("abstract_embedding", SEMANTIC_WEIGHT_ABSTRACT),
    ("keywords_embedding", SEMANTIC_WEIGHT_KEYWORDS),
];

#[must_use]
pub fn total_semantic_weight() -> f64 {
    EMBEDDING_FIELDS.iter().map(|(_, w)| w).sum()
}

fn cosine_functions(query_vector: &[f32], weight_scale: f64) -> Vec<Value> {
    EMBEDDING_FIELDS
        .iter()
        .map(|(field, weight)| {
            json!({
                "script_score": {
                    "script": {
                        "source": format!(
                            "cosineSimilarity(params.query_vector, '{field}') + 1.0"
                        ),
                        "params": {"query_vector": query_vector}
                    }
                },
                "weight": weight * weight_scale
            })
        })
        .collect()
}

/// Script-score semantic search over the per-field embeddings. Documents
/// without any embedding are excluded up front; cosine scores are shifted
/// by +1.0 so the engine's non-negative score constraint holds.
#[must_use]
pub fn semantic_search_body(
    query_vector: &[f32],
    size: usize,
    from: usize,
    min_score: f64,
    filters: &Filters,
) -> Value {
    let total = total_semantic_weight();
    let min_es_score = min_score * total + 1.0;

    let mut base = json!({
        "bool": {
            "should": [
                {"exists": {"field": "title_embedding"}},
                {"exists": {"field": "abstract_embedding"}},
                {"exists": {"field": "keywords_embedding"}}
            ],
            "minimum_should_match": 1
        }
    });
    let clauses = build_filter_clauses(filters);
    if !clauses.is_empty() {
        base["bool"]["filter"] = json!(clauses);
    }

    json!({
        "size": size,
        "from": from,
        "query": {
            "function_score": {
                "query": base,
                "functions": cosine_functions(query_vector, 1.0),
                "score_mode": "sum",
                "boost_mode": "replace",
                "min_score": min_es_score
            }
        }
    })
}

/// Maps a raw function-score result back onto the cosine-similarity scale.
#[must_use]
pub fn normalize_semantic_score(raw_score: f64) -> f64 {
    (raw_score - 1.0) / total_semantic_weight()
}

/// Text relevance multiplied into the weighted embedding similarity.
#[must_use]
pub fn hybrid_search_body(
    query: &str,
    query_vector: &[f32],
    size: usize,
    from: usize,
    text_weight: f64,
    semantic_weight: f64,
    filters: &Filters,
) -> Value {
    let text_query = json!({
        "multi_match": {
            "query": query,
            "fields": ["title^3", "abstract^2", "keywords"],
            "operator": "or",
            "fuzziness": "AUTO"
        }
    });

    let clauses = build_filter_clauses(filters);
    let base = if clauses.is_empty() {
        text_query
    } else {
        json!({"bool": {"must": [text_query], "filter": clauses}})
    };

    json!({
        "size": size,
        "from": from,
        "query": {
            "function_score": {
                "query": base,
                "functions": cosine_functions(query_vector, semantic_weight),
                "score_mode": "sum",
                "boost_mode": "multiply",
                "boost": text_weight
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector() -> Vec<f32> {
        vec![0.25; 4]
    }

    #[test]
    fn semantic_body_requires_some_embedding_and_replaces_score() {
        let body = semantic_search_body(&vector(), 10, 0, 0.5, &Filters::default());
        let fs = &body["query"]["function_score"];
        assert_eq!(fs["boost_mode"], json!("replace"));
        assert_eq!(fs["score_mode"], json!("sum"));
        assert_eq!(fs["min_score"], json!(0.5 * 1.0 + 1.0));
        assert_eq!(
            fs["query"]["bool"]["minimum_should_match"],
            json!(1)
        );
        assert_eq!(fs["functions"].as_array().map(Vec::len), Some(3));
        assert_eq!(fs["functions"][1]["weight"], json!(SEMANTIC_WEIGHT_ABSTRACT));
    }

    #[test]
    fn semantic_score_normalization_inverts_the_shift() {
        let min_es = 0.5 * total_semantic_weight() + 1.0;
        assert!((normalize_semantic_score(min_es) - 0.5).abs() < 1e-9);
        assert!((normalize_semantic_score(1.0)).abs() < 1e-9);
    }

    #[test]
    fn hybrid_body_multiplies_text_and_semantic_signals() {
        let filters: Filters =
            serde_json::from_value(json!({"publication_year": {"gte": 2019}})).expect("filters");
        let body = hybrid_search_body("grafen", &vector(), 20, 0, 0.3, 0.7, &filters);
        let fs = &body["query"]["function_score"];
        assert_eq!(fs["boost_mode"], json!("multiply"));
        assert_eq!(fs["boost"], json!(0.3));
        let weight = fs["functions"][0]["weight"].as_f64().expect("weight");
        assert!((weight - 0.7 * SEMANTIC_WEIGHT_TITLE).abs() < 1e-9);
        assert_eq!(
            fs["query"]["bool"]["filter"][0],
            json!({"range": {"publication_year": {"gte": 2019}}})
        );
    }

    #[test]
    fn hybrid_without_filters_keeps_bare_text_query() {
        let body = hybrid_search_body("grafen", &vector(), 20, 10, 0.3, 0.7, &Filters::default());
        assert!(body["query"]["function_score"]["query"]
            .get("multi_match")
            .is_some());
        assert_eq!(body["from"], json!(10));
    }
}
