//! HTTP handlers, one per route.

use std::sync::atomic::Ordering;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::warn;

use scholaris_api::{
    decode_body, ApiError, AuthorIdBody, AuthorPublicationsBody, AuthorsBulkBody, ClusterBody,
    PublicationsByIdsBody, SearchAuthorsBody, SearchBody, TopicAnalysisBody, UnitBody,
    UnitPublicationsBody, API_VERSION, MAX_BULK_AUTHOR_IDS, SYSTEM_NAME,
};
use scholaris_cluster::{cluster_publications, ClusterMethod, ClusterOptions};
use scholaris_model::{build_analytics, strip_heavy, ArticleId, AuthorId, UnitName};
use scholaris_query::authors::{
    paged_publications_body, plan_author_publications, publications_by_ids_body,
    scroll_publications_query, AuthorPublicationsPlan, PUBLICATION_ID_BATCH,
};
use scholaris_query::{article_by_id_body, author_search_body, classify_search, QueryClass};

use crate::analytics::{
    analyze_topic_affiliations, unit_collaborations, unit_collaborations_direct,
    unit_publication_count, unit_publications, AnalyticsError,
};
use crate::search::{execute_search, index_error_to_api};
use crate::telemetry::render_prometheus;
use crate::AppState;
use scholaris_index::SCROLL_KEEP_ALIVE;
use scholaris_query::AffiliationLevel;

/// Publications above this hit count get their affiliation analysis from
/// a fresh aggregation instead of local counting.
const AFFILIATION_REAGG_THRESHOLD: usize = 100;
/// Publications examined when collecting an author's co-authors.
const COAUTHOR_PUBLICATION_LIMIT: usize = 100;

fn error_response(error: ApiError) -> Response {
    let status =
        StatusCode::from_u16(error.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({"error": error}))).into_response()
}

fn detail_response(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({"detail": message}))).into_response()
}

fn ok_json(body: Value) -> Response {
    Json(body).into_response()
}

macro_rules! try_api {
    ($expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(error) => return error_response(error),
        }
    };
}

pub async fn root_handler() -> Response {
    ok_json(json!({
        "status": "ok",
        "system": SYSTEM_NAME,
        "version": API_VERSION
    }))
}

pub async fn healthz_handler() -> Response {
    ok_json(json!({"status": "ok"}))
}

pub async fn readyz_handler(State(state): State<AppState>) -> Response {
    if !state.backend.ping().await {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "unreachable"})),
        )
            .into_response();
    }
    for index in [&state.config.article_index, &state.config.author_index] {
        match state.backend.index_exists(index).await {
            Ok(true) => {}
            _ => {
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({"status": "missing_index", "index": index})),
                )
                    .into_response();
            }
        }
    }
    ok_json(json!({"status": "ready"}))
}

pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    let ready = state.backend.ping().await;
    (
        [("content-type", "text/plain; version=0.0.4")],
        render_prometheus(&state.metrics, ready),
    )
        .into_response()
}

pub async fn search_handler(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let request = try_api!(decode_body::<SearchBody>(body).and_then(SearchBody::validate));
    let _permit = try_api!(state.admission.admit(classify_search(request.method)));
    state.metrics.searches_total.fetch_add(1, Ordering::Relaxed);

    let outcome = try_api!(execute_search(&state, &request).await);
    let mut response = json!({"hits": outcome.hits, "total": outcome.total});
    if request.include_facets {
        response["facets"] = serde_json::to_value(outcome.facets.unwrap_or_default())
            .unwrap_or_else(|_| json!({}));
    }
    ok_json(response)
}

pub async fn cluster_handler(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let request = try_api!(decode_body::<ClusterBody>(body).and_then(ClusterBody::validate));
    let _permit = try_api!(state.admission.admit(QueryClass::Heavy));
    state.metrics.cluster_runs_total.fetch_add(1, Ordering::Relaxed);

    let search_request = scholaris_api::SearchRequest {
        query: request.query.clone(),
        size: request.size,
        from: 0,
        method: request.method,
        filters: request.filters.clone(),
        include_facets: false,
    };
    let outcome = try_api!(execute_search(&state, &search_request).await);
    let mut hits = outcome.hits;

    let clustering_results = if hits.is_empty() {
        json!({"error": "No publications found for the query"})
    } else {
        let options = ClusterOptions {
            method: ClusterMethod::parse_loose(&request.clustering_method),
            k_max: request.max_clusters.max(1) as usize,
            min_cluster_size: request.min_cluster_size,
            adaptive: true,
        };
        match cluster_publications(&hits, &options) {
            Ok(result) => {
                for hit in &mut hits {
                    let label = hit
                        .get("id")
                        .and_then(Value::as_str)
                        .and_then(|id| result.publication_to_cluster.get(id))
                        .copied();
                    if let Some(label) = label {
                        hit["cluster"] = json!(label);
                    }
                }
                serde_json::to_value(&result).unwrap_or_else(|_| json!({}))
            }
            Err(error) => json!({"error": error.0}),
        }
    };

    let affiliation_analysis = if hits.len() > AFFILIATION_REAGG_THRESHOLD {
        analyze_topic_affiliations(&state, &request.query, 10, AffiliationLevel::Unit, None).await
    } else {
        analyze_topic_affiliations(
            &state,
            &request.query,
            10,
            AffiliationLevel::Unit,
            Some(&hits),
        )
        .await
    }
    .unwrap_or_else(|error| {
        warn!(%error, "affiliation analysis failed during clustering");
        json!({"error": error.message})
    });

    ok_json(json!({
        "search_results": {"hits": hits, "total": outcome.total},
        "clustering_results": clustering_results,
        "affiliation_analysis": affiliation_analysis
    }))
}

pub async fn search_authors_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Response {
    let request =
        try_api!(decode_body::<SearchAuthorsBody>(body).and_then(SearchAuthorsBody::validate));
    let _permit = try_api!(state.admission.admit(QueryClass::Medium));

    let response = try_api!(state
        .backend
        .search(
            &state.config.author_index,
            &author_search_body(&request.query, request.size),
        )
        .await
        .map_err(index_error_to_api));

    let authors: Vec<Value> = response["hits"]["hits"]
        .as_array()
        .map(|hits| {
            hits.iter()
                .map(|hit| {
                    let mut source = hit.get("_source").cloned().unwrap_or_else(|| json!({}));
                    if let Value::Object(map) = &mut source {
                        map.insert(
                            "_score".to_string(),
                            hit.get("_score").cloned().unwrap_or(json!(0.0)),
                        );
                    }
                    source
                })
                .collect()
        })
        .unwrap_or_default();
    let total = response["hits"]["total"]["value"].as_u64().unwrap_or(0);
    ok_json(json!({"authors": authors, "total": total, "query": request.query}))
}

pub async fn author_publications_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Response {
    let request = try_api!(
        decode_body::<AuthorPublicationsBody>(body).and_then(AuthorPublicationsBody::validate)
    );
    let _permit = try_api!(state.admission.admit(QueryClass::Medium));
    let started = Instant::now();

    let author_id = try_api!(AuthorId::parse(&request.author_id)
        .map_err(|e| ApiError::invalid_param("author_id", &e.0)));
    let author_doc = try_api!(state
        .backend
        .get_doc(&state.config.author_index, author_id.as_str())
        .await
        .map_err(index_error_to_api));
    let Some(author_doc) = author_doc else {
        return error_response(ApiError::not_found(format!(
            "author '{}' not found",
            author_id.as_str()
        )));
    };

    let stored_ids: Vec<ArticleId> = author_doc["publications"]
        .as_array()
        .map(|ids| {
            ids.iter()
                .filter_map(Value::as_str)
                .filter_map(|id| ArticleId::parse(id).ok())
                .collect()
        })
        .unwrap_or_default();
    let art_num = author_doc["art_num"].as_i64().unwrap_or(0);
    let filters = request.filters.clone().unwrap_or_default();

    let plan = plan_author_publications(&stored_ids, art_num, request.size, request.from);
    let publications: Vec<Value> = match plan {
        AuthorPublicationsPlan::ScrollAll => {
            let query = scroll_publications_query(&author_id, &filters);
            let hits = try_api!(state
                .backend
                .scroll_all(
                    &state.config.article_index,
                    json!({"query": query, "size": 1000}),
                    SCROLL_KEEP_ALIVE,
                )
                .await
                .map_err(index_error_to_api));
            hits.into_iter()
                .filter_map(|hit| hit.get("_source").cloned())
                .collect()
        }
        AuthorPublicationsPlan::IdSubset { ids } => {
            let mut collected = Vec::new();
            for batch in ids.chunks(PUBLICATION_ID_BATCH) {
                let response = try_api!(state
                    .backend
                    .search(
                        &state.config.article_index,
                        &publications_by_ids_body(batch, &filters),
                    )
                    .await
                    .map_err(index_error_to_api));
                if let Some(hits) = response["hits"]["hits"].as_array() {
                    collected
                        .extend(hits.iter().filter_map(|hit| hit.get("_source").cloned()));
                }
            }
            collected
        }
        AuthorPublicationsPlan::Paged { size, from } => {
            let response = try_api!(state
                .backend
                .search(
                    &state.config.article_index,
                    &paged_publications_body(&author_id, size, from, &filters),
                )
                .await
                .map_err(index_error_to_api));
            response["hits"]["hits"]
                .as_array()
                .map(|hits| {
                    hits.iter()
                        .filter_map(|hit| hit.get("_source").cloned())
                        .collect()
                })
                .unwrap_or_default()
        }
    };

    let total = publications.len();
    ok_json(json!({
        "publications": publications,
        "total": total,
        "author_id": author_id.as_str(),
        "execution_time": started.elapsed().as_secs_f64()
    }))
}

pub async fn author_coauthors_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Response {
    let request = try_api!(decode_body::<AuthorIdBody>(body));
    let _permit = try_api!(state.admission.admit(QueryClass::Cheap));
    let author_id = try_api!(AuthorId::parse(&request.author_id)
        .map_err(|e| ApiError::invalid_param("author_id", &e.0)));

    let response = try_api!(state
        .backend
        .search(
            &state.config.article_index,
            &json!({
                "size": COAUTHOR_PUBLICATION_LIMIT,
                "query": {"term": {"authors": author_id.as_str()}},
                "_source": ["authors"]
            }),
        )
        .await
        .map_err(index_error_to_api));

    let mut coauthor_ids: Vec<String> = Vec::new();
    if let Some(hits) = response["hits"]["hits"].as_array() {
        for hit in hits {
            if let Some(authors) = hit.pointer("/_source/authors").and_then(Value::as_array) {
                for candidate in authors.iter().filter_map(Value::as_str) {
                    if candidate != author_id.as_str()
                        && !coauthor_ids.iter().any(|seen| seen == candidate)
                    {
                        coauthor_ids.push(candidate.to_string());
                    }
                }
            }
        }
    }

    let coauthors = if coauthor_ids.is_empty() {
        Vec::new()
    } else {
        let docs = try_api!(state
            .backend
            .mget(&state.config.author_index, &coauthor_ids)
            .await
            .map_err(index_error_to_api));
        docs.into_iter()
            .map(|doc| resolve_mget_entry(doc, None))
            .collect()
    };

    ok_json(json!({
        "coauthors": coauthors,
        "total": coauthors.len(),
        "author_id": author_id.as_str()
    }))
}

pub async fn publications_by_ids_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Response {
    let (ids, filters) =
        try_api!(decode_body::<PublicationsByIdsBody>(body).and_then(PublicationsByIdsBody::validate));
    let _permit = try_api!(state.admission.admit(QueryClass::Medium));

    let article_ids: Vec<ArticleId> = ids
        .iter()
        .filter_map(|id| ArticleId::parse(id).ok())
        .collect();
    let filters = filters.unwrap_or_default();

    let mut publications: Vec<Value> = Vec::new();
    for batch in article_ids.chunks(PUBLICATION_ID_BATCH) {
        match state
            .backend
            .search(
                &state.config.article_index,
                &publications_by_ids_body(batch, &filters),
            )
            .await
        {
            Ok(response) => {
                if let Some(hits) = response["hits"]["hits"].as_array() {
                    publications
                        .extend(hits.iter().filter_map(|hit| hit.get("_source").cloned()));
                }
            }
            Err(error) => {
                // A lost batch costs completeness, not the whole lookup.
                warn!(%error, batch = batch.len(), "publication id batch failed, skipping");
                state
                    .metrics
                    .backend_errors_total
                    .fetch_add(1, Ordering::Relaxed);
            }
        }
    }
    ok_json(json!({"publications": publications, "total": publications.len()}))
}

fn resolve_mget_entry(doc: Value, fields: Option<&[String]>) -> Value {
    let found = doc.get("found").and_then(Value::as_bool).unwrap_or(false);
    let id = doc.get("_id").and_then(Value::as_str).unwrap_or_default();
    if !found {
        return json!({"id": id, "full_name": format!("ID: {id}")});
    }
    let mut source = doc.get("_source").cloned().unwrap_or_else(|| json!({}));
    if let (Some(fields), Value::Object(map)) = (fields, &mut source) {
        map.retain(|key, _| fields.iter().any(|f| f == key));
    }
    source
}

pub async fn authors_bulk_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Response {
    let request = try_api!(decode_body::<AuthorsBulkBody>(body));
    let _permit = try_api!(state.admission.admit(QueryClass::Cheap));

    let mut ids = request.ids;
    if ids.len() > MAX_BULK_AUTHOR_IDS {
        warn!(
            requested = ids.len(),
            kept = MAX_BULK_AUTHOR_IDS,
            "authors_bulk id list truncated"
        );
        ids.truncate(MAX_BULK_AUTHOR_IDS);
    }
    if ids.is_empty() {
        return ok_json(json!({"authors": []}));
    }

    let docs = try_api!(state
        .backend
        .mget(&state.config.author_index, &ids)
        .await
        .map_err(index_error_to_api));
    let authors: Vec<Value> = docs
        .into_iter()
        .map(|doc| resolve_mget_entry(doc, request.fields.as_deref()))
        .collect();
    ok_json(json!({"authors": authors}))
}

pub async fn unit_publications_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Response {
    let request =
        try_api!(decode_body::<UnitPublicationsBody>(body).and_then(UnitPublicationsBody::validate));
    let _permit = try_api!(state.admission.admit(QueryClass::Heavy));

    let unit = match UnitName::parse(&request.unit) {
        Ok(unit) => unit,
        Err(error) => return detail_response(error.0),
    };
    let filters = request.filters.clone().unwrap_or_default();

    let (mut publications, total, author_count, method) =
        match unit_publications(&state, &unit, request.size, request.from, &filters).await {
            Ok(outcome) => outcome,
            Err(AnalyticsError::User(message)) => return detail_response(message),
            Err(AnalyticsError::Api(error)) => return error_response(error),
        };

    let analytics = build_analytics(&publications);

    let clustering = if request.cluster_results && publications.len() >= 3 {
        match cluster_publications(&publications, &ClusterOptions::default()) {
            Ok(result) => Some(serde_json::to_value(&result).unwrap_or_else(|_| json!({}))),
            Err(error) => Some(json!({"error": error.0})),
        }
    } else {
        None
    };

    let collaborations = if method == "traditional" {
        match unit_collaborations(&state, &unit, 10).await {
            Ok(result) => Some(result["collaborations"].clone()),
            Err(error) => {
                warn!(%error, "collaboration analysis failed for unit publications");
                None
            }
        }
    } else {
        None
    };

    if request.lite {
        for publication in &mut publications {
            strip_heavy(publication, true);
        }
    }

    let mut response = json!({
        "unit": unit.as_str(),
        "publications": publications,
        "total": total,
        "author_count": author_count,
        "analytics": analytics,
        "method": method
    });
    if let Some(clustering) = clustering {
        response["clustering"] = clustering;
    }
    if let Some(collaborations) = collaborations {
        response["collaborations"] = collaborations;
    }
    ok_json(response)
}

pub async fn unit_collaborations_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Response {
    let request = try_api!(decode_body::<UnitBody>(body));
    let _permit = try_api!(state.admission.admit(QueryClass::Heavy));
    let unit = match UnitName::parse(&request.unit) {
        Ok(unit) => unit,
        Err(error) => return detail_response(error.0),
    };

    match unit_collaborations(&state, &unit, 10).await {
        Ok(result) => ok_json(result),
        Err(error) => {
            warn!(%error, "collaboration analyzer failed, taking the direct scan");
            match unit_collaborations_direct(&state, &unit, 10).await {
                Ok(result) => ok_json(result),
                Err(error) => error_response(error),
            }
        }
    }
}

pub async fn unit_publications_count_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Response {
    let request = try_api!(decode_body::<UnitBody>(body));
    let _permit = try_api!(state.admission.admit(QueryClass::Cheap));
    let unit = match UnitName::parse(&request.unit) {
        Ok(unit) => unit,
        Err(error) => return detail_response(error.0),
    };
    let count = unit_publication_count(&state, &unit).await;
    ok_json(json!({"unit": unit.as_str(), "count": count}))
}

pub async fn topic_analysis_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Response {
    let request =
        try_api!(decode_body::<TopicAnalysisBody>(body).and_then(TopicAnalysisBody::validate));
    let _permit = try_api!(state.admission.admit(QueryClass::Heavy));

    let search_request = scholaris_api::SearchRequest {
        query: request.query.clone(),
        size: request.size,
        from: 0,
        method: scholaris_query::SearchMethod::Hybrid,
        filters: None,
        include_facets: false,
    };
    let outcome = try_api!(execute_search(&state, &search_request).await);
    if outcome.hits.is_empty() {
        return detail_response(format!(
            "No publications found for topic '{}'",
            request.query
        ));
    }

    let affiliation_analysis = try_api!(
        analyze_topic_affiliations(
            &state,
            &request.query,
            request.top_n,
            AffiliationLevel::Unit,
            Some(&outcome.hits),
        )
        .await
    );

    ok_json(json!({
        "topic": request.query,
        "total_publications": outcome.total,
        "affiliation_analysis": affiliation_analysis,
        "publications": outcome.hits,
        "results_count": outcome.hits.len()
    }))
}

pub async fn publication_by_id_handler(
    State(state): State<AppState>,
    Path(publication_id): Path<String>,
) -> Response {
    let _permit = try_api!(state.admission.admit(QueryClass::Cheap));
    let id = try_api!(ArticleId::parse(&publication_id)
        .map_err(|e| ApiError::invalid_param("publication_id", &e.0)));
    let response = try_api!(state
        .backend
        .search(&state.config.article_index, &article_by_id_body(&id))
        .await
        .map_err(index_error_to_api));
    match response["hits"]["hits"]
        .as_array()
        .and_then(|hits| hits.first())
        .and_then(|hit| hit.get("_source"))
    {
        Some(source) => ok_json(source.clone()),
        None => error_response(ApiError::not_found(format!(
            "publication '{}' not found",
            id.as_str()
        ))),
    }
}

pub async fn author_by_id_handler(
    State(state): State<AppState>,
    Path(author_id): Path<String>,
) -> Response {
    let _permit = try_api!(state.admission.admit(QueryClass::Cheap));
    let id = try_api!(
        AuthorId::parse(&author_id).map_err(|e| ApiError::invalid_param("author_id", &e.0))
    );
    let doc = try_api!(state
        .backend
        .get_doc(&state.config.author_index, id.as_str())
        .await
        .map_err(index_error_to_api));
    match doc {
        Some(source) => ok_json(source),
        None => error_response(ApiError::not_found(format!(
            "author '{}' not found",
            id.as_str()
        ))),
    }
}

pub async fn index_stats_handler(State(state): State<AppState>) -> Response {
    let _permit = try_api!(state.admission.admit(QueryClass::Cheap));
    let article = try_api!(state
        .backend
        .index_stats(&state.config.article_index)
        .await
        .map_err(index_error_to_api));
    let author = try_api!(state
        .backend
        .index_stats(&state.config.author_index)
        .await
        .map_err(index_error_to_api));
    ok_json(json!({
        "article_index": article,
        "author_index": author
    }))
}
