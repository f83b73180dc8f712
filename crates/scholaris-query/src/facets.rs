use scholaris_model::{ArticleId, ValueCount, YearCount};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const TYPE_FACET_SIZE: usize = 20;
pub const KEYWORD_FACET_SIZE: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Facets {
    pub publication_years: Vec<YearCount>,
    pub publication_types: Vec<ValueCount>,
    pub keywords: Vec<ValueCount>,
}

/// Facet aggregations over an arbitrary query part. Hits are suppressed;
/// only the aggregation frame matters.
#[must_use]
pub fn facets_body(query_part: Value) -> Value {
    json!({
        "size": 0,
        "query": query_part,
        "aggs": {
            "publication_years": {
                "histogram": {
                    "field": "publication_year",
                    "interval": 1,
                    "min_doc_count": 1
                }
            },
            "publication_types": {
                "terms": {"field": "publication_type", "size": TYPE_FACET_SIZE}
            },
            "keywords": {"terms": {"field": "keywords.keyword", "size": KEYWORD_FACET_SIZE}}
        }
    })
}

/// Facets restricted to an explicit id set, e.g. the hits of a k-NN pass.
#[must_use]
pub fn facets_for_ids_body(ids: &[ArticleId]) -> Value {
    let id_values: Vec<&str> = ids.iter().map(ArticleId::as_str).collect();
    facets_body(json!({"terms": {"id": id_values}}))
}

/// Reads the three facet aggregations back out of a search response.
/// Malformed buckets are skipped rather than failing the whole request.
#[must_use]
pub fn parse_facets(response: &Value) -> Facets {
    let aggs = &response["aggregations"];

    let mut publication_years: Vec<YearCount> = aggs["publication_years"]["buckets"]
        .as_array()
        .map(|buckets| {
            buckets
                .iter()
                .filter_map(|bucket| {
                    let year = bucket.get("key")?.as_f64()? as i32;
                    let count = bucket.get("doc_count")?.as_u64()?;
                    Some(YearCount { year, count })
                })
                .collect()
        })
        .unwrap_or_default();
    publication_years.sort_by_key(|entry| entry.year);

    let publication_types = terms_buckets(&aggs["publication_types"])
        .into_iter()
        .map(|(value, count)| ValueCount { value, count })
        .collect();

    let keywords = terms_buckets(&aggs["keywords"])
        .into_iter()
        .map(|(value, count)| ValueCount { value, count })
        .collect();

    Facets {
        publication_years,
        publication_types,
        keywords,
    }
}

fn terms_buckets(agg: &Value) -> Vec<(String, u64)> {
    agg["buckets"]
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facet_body_shape() {
        let body = facets_body(json!({"match_all": {}}));
        assert_eq!(body["size"], 0);
        assert_eq!(
            body["aggs"]["publication_years"]["histogram"]["interval"],
            1
        );
        assert_eq!(
            body["aggs"]["publication_years"]["histogram"]["min_doc_count"],
            1
        );
        assert_eq!(
            body["aggs"]["publication_types"]["terms"]["field"],
            "publication_type"
        );
        assert_eq!(body["aggs"]["publication_types"]["terms"]["size"], 20);
        assert_eq!(body["aggs"]["keywords"]["terms"]["field"], "keywords.keyword");
        assert_eq!(body["aggs"]["keywords"]["terms"]["size"], 30);
    }

    #[test]
    fn parses_histogram_and_terms_buckets() {
        let response = json!({
            "aggregations": {
                "publication_years": {"buckets": [
                    {"key": 2021.0, "doc_count": 9},
                    {"key": 2019.0, "doc_count": 4}
                ]},
                "publication_types": {"buckets": [{"key": "article", "doc_count": 11}]},
                "keywords": {"buckets": [
                    {"key": "graphene", "doc_count": 7},
                    {"key": "sensors", "doc_count": 3}
                ]}
            }
        });
        let facets = parse_facets(&response);
        assert_eq!(
            facets.publication_years,
            vec![
                YearCount { year: 2019, count: 4 },
                YearCount { year: 2021, count: 9 },
            ]
        );
        assert_eq!(facets.publication_types[0].value, "article");
        assert_eq!(facets.keywords.len(), 2);
    }

    #[test]
    fn empty_response_parses_to_empty_facets() {
        assert_eq!(parse_facets(&json!({})), Facets::default());
    }
}
