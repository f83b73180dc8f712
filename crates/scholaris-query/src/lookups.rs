// SPDX-License-Identifier: Apache-2.0

use crate::filters::build_unit_filter_clauses;
use scholaris_model::{AuthorId, Filters, UnitName};
use serde_json::{json, Value};

/// Page width when resolving authors of a unit without denormalized fields.
pub const UNIT_AUTHORS_FALLBACK_SIZE: usize = 5_000;
/// Page width for article lookups keyed by author id batches.
pub const ARTICLES_BY_AUTHORS_SIZE: usize = 1_000;
/// Author ids per `terms` batch when walking a unit's articles indirectly.
pub const AUTHOR_ID_BATCH: usize = 500;
/// Terms bucket count for topic affiliation rankings.
pub const TOPIC_UNITS_AGG_SIZE: usize = 100;
/// Articles sampled for local affiliation counting when no hits were given.
pub const TOPIC_SAMPLE_SIZE: usize = 200;
/// Page width of the last-resort unit collaboration scan.
pub const UNIT_FALLBACK_SCAN_SIZE: usize = 10_000;

/// Which denormalized affiliation field an analysis ranks over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AffiliationLevel {
    Unit,
    Subunit,
}

impl AffiliationLevel {
    #[must_use]
    pub fn field(self) -> &'static str {
        match self {
            AffiliationLevel::Unit => "author_units",
            AffiliationLevel::Subunit => "author_subunits",
        }
    }
}

/// Source projection for unit-level article scans. Narrow on purpose: the
/// analytics only need bibliographic fields, never embeddings or abstracts.
#[must_use]
pub fn unit_scroll_source() -> Value {
    json!([
        "id",
        "publication_year",
        "publication_type",
        "title",
        "keywords",
        "author_units",
        "authors"
    ])
}

/// Count body for documents carrying a field at all.
#[must_use]
pub fn exists_body(field: &str) -> Value {
    json!({"query": {"exists": {"field": field}}})
}

/// Query part matching articles still missing denormalized unit fields.
#[must_use]
pub fn missing_denorm_query() -> Value {
    json!({"bool": {"must_not": {"exists": {"field": "author_units"}}}})
}

/// Term query over the denormalized unit field, optionally narrowed.
#[must_use]
pub fn unit_term_query(unit: &UnitName, filters: &Filters) -> Value {
    let term = json!({"term": {"author_units": unit.as_str()}});
    let clauses = build_unit_filter_clauses(filters);
    if clauses.is_empty() {
        term
    } else {
        json!({"bool": {"must": [term], "filter": clauses}})
    }
}

/// Hit-count probe; returns totals without documents.
#[must_use]
pub fn probe_body(query: Value) -> Value {
    json!({"query": query, "size": 0})
}

/// One page of a query, full source.
#[must_use]
pub fn paged_query_body(query: Value, size: usize, from: usize) -> Value {
    json!({"query": query, "size": size, "from": from})
}

/// Count of articles attributed to a unit.
#[must_use]
pub fn unit_articles_count_body(unit: &UnitName, filters: &Filters) -> Value {
    json!({"query": unit_term_query(unit, filters)})
}

/// Which units publish on a topic: a field-boosted match plus a terms
/// ranking over the denormalized affiliation field.
#[must_use]
pub fn topic_affiliation_agg_body(query: &str, level: AffiliationLevel) -> Value {
    json!({
        "query": {
            "multi_match": {
                "query": query,
                "fields": ["title^3", "abstract^2", "keywords"]
            }
        },
        "size": 0,
        "aggs": {
            "affiliations": {"terms": {"field": level.field(), "size": TOPIC_UNITS_AGG_SIZE}}
        }
    })
}

/// Sample of articles on a topic, full source, for local affiliation
/// counting.
#[must_use]
pub fn topic_articles_body(query: &str) -> Value {
    json!({
        "query": {
            "multi_match": {
                "query": query,
                "fields": ["title^3", "abstract^2", "keywords"]
            }
        },
        "size": TOPIC_SAMPLE_SIZE
    })
}

/// Co-occurring units on one unit's articles. The unit itself comes back as
/// a bucket; callers drop it.
#[must_use]
pub fn unit_collaboration_agg_body(unit: &UnitName, top_n: usize) -> Value {
    json!({
        "query": {"term": {"author_units": unit.as_str()}},
        "size": 0,
        "aggs": {
            "collaborating_units": {"terms": {"field": "author_units", "size": top_n}}
        }
    })
}

/// Last-resort collaboration scan: denormalized unit lists only, one page.
#[must_use]
pub fn unit_fallback_scan_body(unit: &UnitName) -> Value {
    json!({
        "query": {"term": {"author_units": unit.as_str()}},
        "_source": ["author_units"],
        "size": UNIT_FALLBACK_SCAN_SIZE
    })
}

/// Count of author documents registered under a unit.
#[must_use]
pub fn authors_in_unit_count_body(unit: &UnitName) -> Value {
    json!({"query": {"term": {"unit": unit.as_str()}}})
}

/// Exact author lookup by unit name, ids only.
#[must_use]
pub fn authors_by_unit_term_body(unit: &UnitName) -> Value {
    json!({
        "size": UNIT_AUTHORS_FALLBACK_SIZE,
        "_source": ["id"],
        "query": {"term": {"unit": unit.as_str()}}
    })
}

/// Fuzzy author lookup by unit name, ids only. Fallback path for corpora
/// without denormalized unit fields on articles.
#[must_use]
pub fn authors_by_unit_fuzzy_body(unit: &UnitName) -> Value {
    json!({
        "size": UNIT_AUTHORS_FALLBACK_SIZE,
        "query": {"match": {"unit": {"query": unit.as_str(), "fuzziness": "AUTO"}}},
        "_source": ["id"]
    })
}

/// Query part matching articles written by any of the given authors.
#[must_use]
pub fn articles_by_authors_query(author_ids: &[AuthorId], filters: &Filters) -> Value {
    let ids: Vec<&str> = author_ids.iter().map(AuthorId::as_str).collect();
    let terms = json!({"terms": {"authors": ids}});
    let clauses = build_unit_filter_clauses(filters);
    if clauses.is_empty() {
        terms
    } else {
        json!({"bool": {"must": [terms], "filter": clauses}})
    }
}

/// One full-source batch of articles for a slice of author ids.
#[must_use]
pub fn articles_by_author_ids_body(author_ids: &[AuthorId]) -> Value {
    let ids: Vec<&str> = author_ids.iter().map(AuthorId::as_str).collect();
    json!({
        "query": {"terms": {"authors": ids}},
        "size": ARTICLES_BY_AUTHORS_SIZE
    })
}

/// Publication ids of one author, for enrichment passes.
#[must_use]
pub fn author_pub_ids_body(author_id: &AuthorId) -> Value {
    json!({
        "size": ARTICLES_BY_AUTHORS_SIZE,
        "_source": ["id"],
        "query": {"term": {"authors": author_id.as_str()}}
    })
}

/// Flattens a terms aggregation into `(value, doc_count)` pairs.
#[must_use]
pub fn parse_terms_agg(response: &Value, agg_name: &str) -> Vec<(String, u64)> {
    response["aggregations"][agg_name]["buckets"]
        .as_array()
        .map(|buckets| {
            buckets
                .iter()
                .filter_map(|bucket| {
                    let key = bucket.get("key")?.as_str()?.to_string();
                    let count = bucket.get("doc_count")?.as_u64()?;
                    Some((key, count))
                })
                .collect()
        })
        .unwrap_or_default()
}
