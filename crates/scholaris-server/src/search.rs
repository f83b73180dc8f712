//! Search execution: picks the ranking strategy, runs it against the
//! backend and shapes hits for the wire.

use serde_json::{json, Value};
use tracing::{debug, warn};

use scholaris_api::{ApiError, SearchRequest};
use scholaris_index::{IndexError, IndexErrorCode, QUERY_EMBED_PREFIX};
use scholaris_model::Filters;
use scholaris_query::{
    facets_body, facets_for_ids_body, hybrid_search_body, is_large_search, knn_search_body,
    knn_supported, normalize_semantic_score, parse_facets, semantic_search_body, text_search_body,
    Facets, KnnParams, SearchMethod, DEFAULT_MIN_SCORE,
};

use crate::AppState;

pub const HYBRID_TEXT_WEIGHT: f64 = 0.3;
pub const HYBRID_SEMANTIC_WEIGHT: f64 = 0.7;

#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub hits: Vec<Value>,
    pub total: u64,
    pub facets: Option<Facets>,
}

/// Maps backend failures onto the wire error taxonomy.
pub fn index_error_to_api(error: IndexError) -> ApiError {
    match error.code {
        IndexErrorCode::NotFound => ApiError::not_found(error.message),
        IndexErrorCode::Validation => ApiError::invalid_param("query", &error.message),
        IndexErrorCode::Network | IndexErrorCode::Upstream => ApiError::upstream(error.message),
        IndexErrorCode::Internal | _ => ApiError::internal(error.message),
    }
}

/// Embeds the query text, with the retrieval prefix the model family
/// expects. Both a missing and a failing embedder disable the semantic
/// modes rather than silently degrading them.
pub async fn embed_query(state: &AppState, query: &str) -> Result<Vec<f32>, ApiError> {
    let Some(embedder) = &state.embedder else {
        return Err(ApiError::not_ready(
            "semantic search requires an embedding service (SCHOLARIS_EMBEDDER_URL is unset)",
        ));
    };
    let prefixed = format!("{QUERY_EMBED_PREFIX}{query}");
    let mut vectors = embedder
        .embed(&[prefixed])
        .await
        .map_err(|e| ApiError::not_ready(format!("embedding service unavailable: {e}")))?;
    vectors
        .pop()
        .ok_or_else(|| ApiError::not_ready("embedding service returned no vector"))
}

fn hit_with_score(hit: &Value, map_score: Option<fn(f64) -> f64>) -> Value {
    let mut payload = hit.get("_source").cloned().unwrap_or_else(|| json!({}));
    let raw = hit.get("_score").and_then(Value::as_f64).unwrap_or(0.0);
    let score = map_score.map_or(raw, |f| f(raw));
    if let Value::Object(map) = &mut payload {
        map.insert("_score".to_string(), json!(score));
    }
    payload
}

fn response_hits(response: &Value, map_score: Option<fn(f64) -> f64>) -> (Vec<Value>, u64) {
    let hits = response["hits"]["hits"]
        .as_array()
        .map(|hits| hits.iter().map(|hit| hit_with_score(hit, map_score)).collect())
        .unwrap_or_default();
    let total = response["hits"]["total"]["value"].as_u64().unwrap_or(0);
    (hits, total)
}

fn empty_filters() -> Filters {
    Filters::default()
}

async fn facets_over_query(state: &AppState, query_part: Value) -> Option<Facets> {
    match state
        .backend
        .search(&state.config.article_index, &facets_body(query_part))
        .await
    {
        Ok(response) => Some(parse_facets(&response)),
        Err(error) => {
            warn!(%error, "facet aggregation failed, continuing without facets");
            None
        }
    }
}

async fn facets_over_hits(state: &AppState, hits: &[Value]) -> Option<Facets> {
    let ids: Vec<scholaris_model::ArticleId> = hits
        .iter()
        .filter_map(|hit| hit.get("id").and_then(Value::as_str))
        .filter_map(|id| scholaris_model::ArticleId::parse(id).ok())
        .collect();
    if ids.is_empty() {
        return Some(Facets::default());
    }
    match state
        .backend
        .search(&state.config.article_index, &facets_for_ids_body(&ids))
        .await
    {
        Ok(response) => Some(parse_facets(&response)),
        Err(error) => {
            warn!(%error, "knn facet follow-up failed, continuing without facets");
            None
        }
    }
}

/// True when the live mapping supports the native `knn` clause and the
/// workload is large enough to justify it over script scoring.
async fn prefer_knn(state: &AppState, size: usize) -> (bool, u64) {
    let collection = match state.backend.count(&state.config.article_index, None).await {
        Ok(count) => count,
        Err(error) => {
            debug!(%error, "collection count unavailable, assuming small corpus");
            0
        }
    };
    let supported = match state.backend.get_mapping(&state.config.article_index).await {
        Ok(mapping) => {
            let properties = mapping
                .get(&state.config.article_index)
                .or_else(|| mapping.as_object().and_then(|m| m.values().next()))
                .and_then(|entry| entry.get("mappings"))
                .and_then(|m| m.get("properties"))
                .cloned()
                .unwrap_or(Value::Null);
            knn_supported(&properties)
        }
        Err(error) => {
            debug!(%error, "mapping probe failed, using script scoring");
            false
        }
    };
    (supported && is_large_search(collection, size), collection)
}

pub async fn execute_search(
    state: &AppState,
    request: &SearchRequest,
) -> Result<SearchOutcome, ApiError> {
    let filters = request.filters.clone().unwrap_or_else(empty_filters);
    match request.method {
        SearchMethod::Text => {
            let body = text_search_body(&request.query, request.size, request.from, &filters);
            let query_part = body["query"].clone();
            let response = state
                .backend
                .search(&state.config.article_index, &body)
                .await
                .map_err(index_error_to_api)?;
            let (hits, total) = response_hits(&response, None);
            let facets = if request.include_facets {
                facets_over_query(state, query_part).await
            } else {
                None
            };
            Ok(SearchOutcome { hits, total, facets })
        }
        SearchMethod::Semantic => {
            let vector = embed_query(state, &request.query).await?;
            let (use_knn, collection) = prefer_knn(state, request.size).await;
            if use_knn {
                let params = KnnParams::derive(request.size, &filters, collection);
                let body = knn_search_body(&vector, request.size, params, &filters);
                let response = state
                    .backend
                    .search(&state.config.article_index, &body)
                    .await
                    .map_err(index_error_to_api)?;
                let (hits, total) = response_hits(&response, None);
                let facets = if request.include_facets {
                    facets_over_hits(state, &hits).await
                } else {
                    None
                };
                Ok(SearchOutcome { hits, total, facets })
            } else {
                let body = semantic_search_body(
                    &vector,
                    request.size,
                    request.from,
                    DEFAULT_MIN_SCORE,
                    &filters,
                );
                let query_part = body["query"].clone();
                let response = state
                    .backend
                    .search(&state.config.article_index, &body)
                    .await
                    .map_err(index_error_to_api)?;
                let (hits, total) = response_hits(&response, Some(normalize_semantic_score));
                let facets = if request.include_facets {
                    facets_over_query(state, query_part).await
                } else {
                    None
                };
                Ok(SearchOutcome { hits, total, facets })
            }
        }
        SearchMethod::Hybrid => {
            let vector = embed_query(state, &request.query).await?;
            let body = hybrid_search_body(
                &request.query,
                &vector,
                request.size,
                request.from,
                HYBRID_TEXT_WEIGHT,
                HYBRID_SEMANTIC_WEIGHT,
                &filters,
            );
            let query_part = body["query"].clone();
            let response = state
                .backend
                .search(&state.config.article_index, &body)
                .await
                .map_err(index_error_to_api)?;
            let (hits, total) = response_hits(&response, None);
            let facets = if request.include_facets {
                facets_over_query(state, query_part).await
            } else {
                None
            };
            Ok(SearchOutcome { hits, total, facets })
        }
    }
}
