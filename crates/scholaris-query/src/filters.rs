use scholaris_model::{FilterValue, Filters};
use serde_json::{json, Value};

/// Lowers filters into Elasticsearch `filter` clauses.
///
/// `publication_type` is a keyword field and filters on the raw name; other
/// text fields get a `.keyword` suffix so exact matching bypasses analysis.
/// Range bounds on `publication_year` are coerced to integers.
#[must_use]
pub fn build_filter_clauses(filters: &Filters) -> Vec<Value> {
    let mut clauses = Vec::with_capacity(filters.len());
    for (field, condition) in filters.iter() {
        if field == "publication_type" {
            match condition {
                FilterValue::Terms(values) => {
                    clauses.push(json!({"terms": {"publication_type": values}}));
                }
                FilterValue::Term(value) => {
                    clauses.push(json!({"term": {"publication_type": value}}));
                }
                FilterValue::Range(bounds) => {
                    clauses.push(json!({"range": {"publication_type": bounds}}));
                }
            }
            continue;
        }
        match condition {
            FilterValue::Range(bounds) => {
                let lowered: serde_json::Map<String, Value> = bounds
                    .iter()
                    .map(|(bound, value)| {
                        let coerced = if field == "publication_year" {
                            coerce_int(value)
                        } else {
                            value.clone()
                        };
                        (bound.clone(), coerced)
                    })
                    .collect();
                clauses.push(json!({"range": {field.as_str(): lowered}}));
            }
            FilterValue::Terms(values) => {
                clauses.push(json!({"terms": {keyword_field(field): values}}));
            }
            FilterValue::Term(value) => match value {
                Value::Number(_) | Value::Bool(_) => {
                    clauses.push(json!({"term": {field.as_str(): value}}));
                }
                _ => {
                    clauses.push(json!({"term": {keyword_field(field): value}}));
                }
            },
        }
    }
    clauses
}

/// Variant used by the denormalized unit paths: exact fields, no keyword
/// suffixing, lists become `terms` and scalars `term`.
#[must_use]
pub fn build_unit_filter_clauses(filters: &Filters) -> Vec<Value> {
    let mut clauses = Vec::with_capacity(filters.len());
    for (field, condition) in filters.iter() {
        match condition {
            FilterValue::Range(bounds) => {
                clauses.push(json!({"range": {field.as_str(): bounds}}));
            }
            FilterValue::Terms(values) => {
                clauses.push(json!({"terms": {field.as_str(): values}}));
            }
            FilterValue::Term(value) => {
                clauses.push(json!({"term": {field.as_str(): value}}));
            }
        }
    }
    clauses
}

fn keyword_field(field: &str) -> String {
    if field.ends_with(".keyword") {
        field.to_string()
    } else {
        format!("{field}.keyword")
    }
}

fn coerce_int(value: &Value) -> Value {
    match value {
        Value::Number(n) => n.as_i64().map_or_else(
            || {
                n.as_f64()
                    .map_or_else(|| value.clone(), |f| json!(f as i64))
            },
            |i| json!(i),
        ),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_or_else(|_| value.clone(), |i| json!(i)),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filters_from(raw: Value) -> Filters {
        serde_json::from_value(raw).expect("filters decode")
    }

    #[test]
    fn publication_type_filters_use_raw_keyword_field() {
        let clauses = build_filter_clauses(&filters_from(json!({"publication_type": "article"})));
        assert_eq!(clauses, vec![json!({"term": {"publication_type": "article"}})]);

        let clauses = build_filter_clauses(&filters_from(
            json!({"publication_type": ["article", "chapter"]}),
        ));
        assert_eq!(
            clauses,
            vec![json!({"terms": {"publication_type": ["article", "chapter"]}})]
        );
    }

    #[test]
    fn year_range_bounds_are_integer_coerced() {
        let clauses = build_filter_clauses(&filters_from(
            json!({"publication_year": {"gte": "2018", "lte": 2022.0}}),
        ));
        assert_eq!(
            clauses,
            vec![json!({"range": {"publication_year": {"gte": 2018, "lte": 2022}}})]
        );
    }

    #[test]
    fn string_terms_get_keyword_suffix_once() {
        let clauses = build_filter_clauses(&filters_from(json!({"keywords": ["graphene"]})));
        assert_eq!(clauses, vec![json!({"terms": {"keywords.keyword": ["graphene"]}})]);

        let clauses =
            build_filter_clauses(&filters_from(json!({"keywords.keyword": ["graphene"]})));
        assert_eq!(clauses, vec![json!({"terms": {"keywords.keyword": ["graphene"]}})]);
    }

    #[test]
    fn numeric_scalars_filter_on_the_raw_field() {
        let clauses = build_filter_clauses(&filters_from(json!({"publication_year": 2020})));
        assert_eq!(clauses, vec![json!({"term": {"publication_year": 2020}})]);

        let clauses = build_filter_clauses(&filters_from(json!({"author_names": "Jan Kowalski"})));
        assert_eq!(
            clauses,
            vec![json!({"term": {"author_names.keyword": "Jan Kowalski"}})]
        );
    }

    #[test]
    fn unit_variant_never_suffixes_fields() {
        let clauses = build_unit_filter_clauses(&filters_from(
            json!({"publication_type": ["article"], "publication_year": {"gte": 2019}}),
        ));
        assert!(clauses.contains(&json!({"terms": {"publication_type": ["article"]}})));
        assert!(clauses.contains(&json!({"range": {"publication_year": {"gte": 2019}}})));
    }
}
