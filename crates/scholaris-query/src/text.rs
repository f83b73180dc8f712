use crate::filters::build_filter_clauses;
use regex::Regex;
use scholaris_model::Filters;
use serde_json::{json, Value};

pub const TEXT_SEARCH_FIELDS: [&str; 3] = ["title^3", "abstract^2", "keywords"];

/// Splits a raw query into exact phrases (double-quoted spans) and loose terms.
#[must_use]
pub fn split_query_terms(query: &str) -> (Vec<String>, Vec<String>) {
    // Invalid phrase regexes cannot happen for a literal pattern; fall back
    // to treating the whole query as loose terms if the engine refuses it.
    let Ok(phrase_re) = Regex::new(r#""([^"]+)""#) else {
        return (
            Vec::new(),
            query.split_whitespace().map(str::to_string).collect(),
        );
    };
    let phrases: Vec<String> = phrase_re
        .captures_iter(query)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect();
    let remainder = phrase_re.replace_all(query, " ");
    let terms: Vec<String> = remainder
        .split_whitespace()
        .map(str::to_string)
        .collect();
    (phrases, terms)
}

/// Full-text query: quoted phrases become mandatory phrase matches, loose
/// terms become fuzzy OR clauses.
#[must_use]
pub fn text_search_body(query: &str, size: usize, from: usize, filters: &Filters) -> Value {
    let (phrases, terms) = split_query_terms(query);

    let must: Vec<Value> = phrases
        .iter()
        .map(|phrase| {
            json!({
                "multi_match": {
                    "query": phrase,
                    "fields": TEXT_SEARCH_FIELDS,
                    "type": "phrase",
                    "slop": 0
                }
            })
        })
        .collect();
    let should: Vec<Value> = terms
        .iter()
        .map(|term| {
            json!({
                "multi_match": {
                    "query": term,
                    "fields": TEXT_SEARCH_FIELDS,
                    "operator": "or",
                    "fuzziness": "AUTO"
                }
            })
        })
        .collect();

    let mut query_part = if must.is_empty() && should.is_empty() {
        json!({"match_all": {}})
    } else {
        let mut bool_part = serde_json::Map::new();
        if !must.is_empty() {
            bool_part.insert("must".to_string(), json!(must));
        }
        if !should.is_empty() {
            bool_part.insert("should".to_string(), json!(should));
            if must.is_empty() {
                bool_part.insert("minimum_should_match".to_string(), json!(1));
            }
        }
        json!({"bool": bool_part})
    };

    let clauses = build_filter_clauses(filters);
    if !clauses.is_empty() {
        if query_part.get("bool").is_none() {
            query_part = json!({"bool": {"must": [query_part]}});
        }
        query_part["bool"]["filter"] = json!(clauses);
    }

    json!({"size": size, "from": from, "query": query_part})
}

/// Fuzzy author directory search across name and affiliation fields.
#[must_use]
pub fn author_search_body(query: &str, size: usize) -> Value {
    json!({
        "size": size,
        "query": {
            "multi_match": {
                "query": query,
                "fields": ["full_name^3", "unit", "subunit"],
                "type": "best_fields",
                "fuzziness": "AUTO"
            }
        }
    })
}
