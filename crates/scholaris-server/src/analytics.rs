//! Affiliation analytics over the article and author indices.
//!
//! Every operation has an aggregation path over the denormalized
//! `author_units`/`author_subunits` fields and a fallback that resolves
//! affiliations author by author, because corpora indexed before the
//! denormalization pass carry no unit fields on articles.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Value};
use tracing::{debug, warn};

use scholaris_api::ApiError;
use scholaris_model::{AuthorId, Filters, UnitName};
use scholaris_query::lookups::{
    articles_by_author_ids_body, authors_by_unit_fuzzy_body, authors_by_unit_term_body,
    authors_in_unit_count_body, exists_body, topic_articles_body, unit_articles_count_body,
    unit_fallback_scan_body, AUTHOR_ID_BATCH,
};
use scholaris_query::{
    paged_query_body, parse_terms_agg, probe_body, topic_affiliation_agg_body,
    unit_collaboration_agg_body, unit_term_query, AffiliationLevel,
};

use crate::search::index_error_to_api;
use crate::AppState;
use scholaris_index::SCROLL_KEEP_ALIVE;

/// Coverage ratio above which the denormalized fields are trusted.
pub const DENORM_COVERAGE_THRESHOLD: f64 = 0.8;

/// Outcome of the unit publication paths. `User` errors carry a message
/// the handler serves as a 400 `{detail}` body.
#[derive(Debug)]
pub enum AnalyticsError {
    User(String),
    Api(ApiError),
}

impl From<ApiError> for AnalyticsError {
    fn from(error: ApiError) -> Self {
        Self::Api(error)
    }
}

/// Whether the article corpus carries denormalized affiliation fields,
/// probed once and cached in state. The probe requires both the mapping
/// and real coverage: a mapped but mostly-empty field would make the
/// aggregation paths silently undercount.
pub async fn denormalization_enabled(state: &AppState) -> bool {
    if let Some(cached) = *state.denorm_probe.read().await {
        return cached;
    }
    let enabled = probe_denormalization(state).await;
    *state.denorm_probe.write().await = Some(enabled);
    enabled
}

async fn probe_denormalization(state: &AppState) -> bool {
    let index = &state.config.article_index;
    let mapped = match state.backend.get_mapping(index).await {
        Ok(mapping) => mapping
            .get(index)
            .or_else(|| mapping.as_object().and_then(|m| m.values().next()))
            .and_then(|entry| entry.pointer("/mappings/properties/author_units"))
            .is_some(),
        Err(error) => {
            debug!(%error, "mapping probe failed, assuming no denormalization");
            return false;
        }
    };
    if !mapped {
        return false;
    }
    let total = match state.backend.count(index, None).await {
        Ok(count) if count > 0 => count,
        _ => return false,
    };
    let covered = state
        .backend
        .count(index, Some(&exists_body("author_units")))
        .await
        .unwrap_or(0);
    let coverage = covered as f64 / total as f64;
    debug!(coverage, "denormalization coverage probe");
    coverage >= DENORM_COVERAGE_THRESHOLD
}

/// Unit/subunit of one author, resolved through the authors index and
/// cached for the process lifetime.
async fn author_affiliation(state: &AppState, author_id: &str) -> (Option<String>, Option<String>) {
    if let Some(cached) = state.author_units.read().await.get(author_id) {
        return cached.clone();
    }
    let resolved = match state
        .backend
        .get_doc(&state.config.author_index, author_id)
        .await
    {
        Ok(Some(doc)) => (
            doc.get("unit").and_then(Value::as_str).map(str::to_string),
            doc.get("subunit").and_then(Value::as_str).map(str::to_string),
        ),
        _ => (None, None),
    };
    state
        .author_units
        .write()
        .await
        .insert(author_id.to_string(), resolved.clone());
    resolved
}

fn affiliation_rows(counts: &BTreeMap<String, u64>, total: u64) -> Vec<Value> {
    let mut ranked: Vec<(&String, &u64)> = counts.iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    ranked
        .into_iter()
        .map(|(name, count)| {
            let percentage = if total > 0 {
                (*count as f64 / total as f64 * 10_000.0).round() / 100.0
            } else {
                0.0
            };
            json!({"name": name, "count": count, "percentage": percentage})
        })
        .collect()
}

/// Which affiliations publish on a topic. Prefers one terms aggregation;
/// without denormalized fields it counts affiliations hit by hit,
/// resolving authors through the cache.
pub async fn analyze_topic_affiliations(
    state: &AppState,
    query: &str,
    top_n: usize,
    level: AffiliationLevel,
    hits: Option<&[Value]>,
) -> Result<Value, ApiError> {
    if denormalization_enabled(state).await && !query.is_empty() {
        let body = topic_affiliation_agg_body(query, level);
        let response = state
            .backend
            .search(&state.config.article_index, &body)
            .await
            .map_err(index_error_to_api)?;
        let total = response["hits"]["total"]["value"].as_u64().unwrap_or(0);
        let counts: BTreeMap<String, u64> =
            parse_terms_agg(&response, "affiliations").into_iter().collect();
        let mut rows = affiliation_rows(&counts, total);
        rows.truncate(top_n);
        return Ok(json!({
            "affiliations": rows,
            "total_publications": total,
            "method": "aggregation"
        }));
    }

    let fetched;
    let sample: &[Value] = match hits {
        Some(hits) => hits,
        None => {
            let response = state
                .backend
                .search(&state.config.article_index, &topic_articles_body(query))
                .await
                .map_err(index_error_to_api)?;
            fetched = response["hits"]["hits"]
                .as_array()
                .map(|hits| {
                    hits.iter()
                        .filter_map(|hit| hit.get("_source").cloned())
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            &fetched
        }
    };

    let field = level.field();
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    for publication in sample {
        let mut units: BTreeSet<String> = BTreeSet::new();
        if let Some(denormalized) = publication.get(field).and_then(Value::as_array) {
            units.extend(denormalized.iter().filter_map(Value::as_str).map(str::to_string));
        } else if let Some(authors) = publication.get("authors").and_then(Value::as_array) {
            for author in authors.iter().filter_map(Value::as_str) {
                let (unit, subunit) = author_affiliation(state, author).await;
                let name = match level {
                    AffiliationLevel::Unit => unit,
                    AffiliationLevel::Subunit => subunit,
                };
                if let Some(name) = name {
                    units.insert(name);
                }
            }
        }
        for unit in units {
            *counts.entry(unit).or_insert(0) += 1;
        }
    }
    let total = sample.len() as u64;
    let mut rows = affiliation_rows(&counts, total);
    rows.truncate(top_n);
    Ok(json!({
        "affiliations": rows,
        "total_publications": total,
        "method": "per_author"
    }))
}

async fn unit_author_ids(
    state: &AppState,
    unit: &UnitName,
    fuzzy: bool,
) -> Result<Vec<AuthorId>, ApiError> {
    let body = if fuzzy {
        authors_by_unit_fuzzy_body(unit)
    } else {
        authors_by_unit_term_body(unit)
    };
    let response = state
        .backend
        .search(&state.config.author_index, &body)
        .await
        .map_err(index_error_to_api)?;
    Ok(response["hits"]["hits"]
        .as_array()
        .map(|hits| {
            hits.iter()
                .filter_map(|hit| hit.pointer("/_source/id").and_then(Value::as_str))
                .filter_map(|id| AuthorId::parse(id).ok())
                .collect()
        })
        .unwrap_or_default())
}

/// Articles attributed to any of the authors, fetched in id batches so
/// one oversized `terms` clause never forms.
async fn articles_for_authors(
    state: &AppState,
    author_ids: &[AuthorId],
) -> Result<Vec<Value>, ApiError> {
    let mut articles: Vec<Value> = Vec::new();
    let mut seen: BTreeSet<String> = BTreeSet::new();
    for batch in author_ids.chunks(AUTHOR_ID_BATCH) {
        let hits = state
            .backend
            .scroll_all(
                &state.config.article_index,
                articles_by_author_ids_body(batch),
                SCROLL_KEEP_ALIVE,
            )
            .await
            .map_err(index_error_to_api)?;
        for hit in hits {
            let Some(source) = hit.get("_source").cloned() else {
                continue;
            };
            let id = source.get("id").and_then(Value::as_str).unwrap_or_default();
            if id.is_empty() || seen.insert(id.to_string()) {
                articles.push(source);
            }
        }
    }
    Ok(articles)
}

/// Units co-publishing with one unit. Aggregation path first, a scrolled
/// per-publication count as fallback.
pub async fn unit_collaborations(
    state: &AppState,
    unit: &UnitName,
    top_n: usize,
) -> Result<Value, ApiError> {
    if denormalization_enabled(state).await {
        // Bucket budget includes the unit's own bucket, which is dropped.
        let body = unit_collaboration_agg_body(unit, top_n + 1);
        let response = state
            .backend
            .search(&state.config.article_index, &body)
            .await
            .map_err(index_error_to_api)?;
        let publications_count = response["hits"]["total"]["value"].as_u64().unwrap_or(0);
        let rows: Vec<Value> = parse_terms_agg(&response, "collaborating_units")
            .into_iter()
            .filter(|(name, _)| name != unit.as_str())
            .take(top_n)
            .map(|(name, count)| json!({"unit": name, "joint_publications": count}))
            .collect();
        let authors_count = state
            .backend
            .count(&state.config.author_index, Some(&authors_in_unit_count_body(unit)))
            .await
            .unwrap_or(0);
        return Ok(json!({
            "unit": unit.as_str(),
            "collaborations": rows,
            "authors_count": authors_count,
            "publications_count": publications_count,
            "method": "aggregation"
        }));
    }

    let author_ids = unit_author_ids(state, unit, false).await?;
    let publications = if author_ids.is_empty() {
        Vec::new()
    } else {
        articles_for_authors(state, &author_ids).await?
    };

    let mut co_units: BTreeMap<String, u64> = BTreeMap::new();
    let mut author_union: BTreeSet<String> = BTreeSet::new();
    for publication in &publications {
        if let Some(authors) = publication.get("authors").and_then(Value::as_array) {
            author_union.extend(authors.iter().filter_map(Value::as_str).map(str::to_string));
        }
        let units: BTreeSet<&str> = publication
            .get("author_units")
            .and_then(Value::as_array)
            .map(|units| units.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        for co_unit in units {
            if co_unit != unit.as_str() {
                *co_units.entry(co_unit.to_string()).or_insert(0) += 1;
            }
        }
    }
    let mut ranked: Vec<(String, u64)> = co_units.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(top_n);
    let rows: Vec<Value> = ranked
        .into_iter()
        .map(|(name, count)| json!({"unit": name, "joint_publications": count}))
        .collect();
    Ok(json!({
        "unit": unit.as_str(),
        "collaborations": rows,
        "authors_count": author_union.len(),
        "publications_count": publications.len(),
        "method": "fallback"
    }))
}

/// Last resort when the analyzer itself fails: one direct page of unit
/// articles, counting co-units locally.
pub async fn unit_collaborations_direct(
    state: &AppState,
    unit: &UnitName,
    top_n: usize,
) -> Result<Value, ApiError> {
    let response = state
        .backend
        .search(&state.config.article_index, &unit_fallback_scan_body(unit))
        .await
        .map_err(index_error_to_api)?;
    let mut co_units: BTreeMap<String, u64> = BTreeMap::new();
    let mut publications_count = 0_u64;
    if let Some(hits) = response["hits"]["hits"].as_array() {
        for hit in hits {
            publications_count += 1;
            let units: BTreeSet<&str> = hit
                .pointer("/_source/author_units")
                .and_then(Value::as_array)
                .map(|units| units.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            for co_unit in units {
                if co_unit != unit.as_str() {
                    *co_units.entry(co_unit.to_string()).or_insert(0) += 1;
                }
            }
        }
    }
    let mut ranked: Vec<(String, u64)> = co_units.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(top_n);
    let rows: Vec<Value> = ranked
        .into_iter()
        .map(|(name, count)| json!({"unit": name, "joint_publications": count}))
        .collect();
    Ok(json!({
        "unit": unit.as_str(),
        "collaborations": rows,
        "publications_count": publications_count,
        "method": "author_units_fallback"
    }))
}

/// Articles attributed to a unit: optimized denormalized path when the
/// probe finds any, else the author-resolution path with its explicit
/// user-facing failures.
pub async fn unit_publications(
    state: &AppState,
    unit: &UnitName,
    size: Option<usize>,
    from: usize,
    filters: &Filters,
) -> Result<(Vec<Value>, u64, u64, &'static str), AnalyticsError> {
    let query = unit_term_query(unit, filters);
    let probe = state
        .backend
        .search(&state.config.article_index, &probe_body(query.clone()))
        .await;
    let probe_total = match &probe {
        Ok(response) => response["hits"]["total"]["value"].as_u64().unwrap_or(0),
        Err(error) => {
            warn!(%error, "unit probe failed, taking the author-resolution path");
            0
        }
    };

    if probe_total > 0 {
        let publications = match size {
            None | Some(0) => {
                let mut body = json!({"query": query, "size": 1000});
                body["_source"] = scholaris_query::lookups::unit_scroll_source();
                let hits = state
                    .backend
                    .scroll_all(&state.config.article_index, body, SCROLL_KEEP_ALIVE)
                    .await
                    .map_err(index_error_to_api)?;
                hits.into_iter()
                    .filter_map(|hit| hit.get("_source").cloned())
                    .collect::<Vec<_>>()
            }
            Some(size) => {
                let response = state
                    .backend
                    .search(
                        &state.config.article_index,
                        &paged_query_body(query, size, from),
                    )
                    .await
                    .map_err(index_error_to_api)?;
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
        let author_count = state
            .backend
            .count(&state.config.author_index, Some(&authors_in_unit_count_body(unit)))
            .await
            .unwrap_or(0);
        return Ok((publications, probe_total, author_count, "optimized"));
    }

    // Traditional path: resolve the unit's authors first.
    let author_ids = unit_author_ids(state, unit, true).await?;
    if author_ids.is_empty() {
        return Err(AnalyticsError::User(format!(
            "No authors found for unit '{}'",
            unit.as_str()
        )));
    }
    let mut publications = articles_for_authors(state, &author_ids).await?;
    if publications.is_empty() {
        return Err(AnalyticsError::User(format!(
            "No publications found for unit '{}'",
            unit.as_str()
        )));
    }
    let total = publications.len() as u64;
    if let Some(size) = size.filter(|s| *s > 0) {
        let start = from.min(publications.len());
        let end = from.saturating_add(size).min(publications.len());
        publications = publications[start..end].to_vec();
    }
    Ok((publications, total, author_ids.len() as u64, "traditional"))
}

/// Number of publications attributed to a unit. Every failure degrades
/// to zero; this count feeds dashboards, not correctness.
pub async fn unit_publication_count(state: &AppState, unit: &UnitName) -> u64 {
    let denorm = state
        .backend
        .count(
            &state.config.article_index,
            Some(&unit_articles_count_body(unit, &Filters::default())),
        )
        .await
        .unwrap_or(0);
    if denorm > 0 {
        return denorm;
    }
    let Ok(author_ids) = unit_author_ids(state, unit, true).await else {
        return 0;
    };
    if author_ids.is_empty() {
        return 0;
    }
    let mut total = 0_u64;
    let mut counted: BTreeSet<String> = BTreeSet::new();
    for batch in author_ids.chunks(AUTHOR_ID_BATCH) {
        let Ok(hits) = state
            .backend
            .scroll_all(
                &state.config.article_index,
                articles_by_author_ids_body(batch),
                SCROLL_KEEP_ALIVE,
            )
            .await
        else {
            continue;
        };
        for hit in hits {
            if let Some(id) = hit.pointer("/_source/id").and_then(Value::as_str) {
                if counted.insert(id.to_string()) {
                    total += 1;
                }
            }
        }
    }
    total
}
