//! In-memory search backend for tests.
//!
//! Interprets the subset of the query DSL the service actually emits:
//! term/terms/range/exists/match_all, bool wrappers, multi_match as a
//! lowercase substring probe, function_score with cosine script scores,
//! native knn, and the histogram/terms aggregations the facet and
//! analytics paths read back.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use scholaris_index::{Embedder, IndexError, IndexErrorCode, IndexStats, SearchBackend};
use scholaris_model::EMBEDDING_DIM;

pub struct FakeBackend {
    pub article_index: String,
    pub author_index: String,
    pub articles: Mutex<Vec<Value>>,
    pub authors: Mutex<Vec<Value>>,
    /// Article mapping properties reported by `get_mapping`.
    pub article_properties: Value,
    pub reachable: bool,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            article_index: scholaris_model::ARTICLE_INDEX.to_string(),
            author_index: scholaris_model::AUTHOR_INDEX.to_string(),
            articles: Mutex::new(Vec::new()),
            authors: Mutex::new(Vec::new()),
            article_properties: scholaris_index::article_index_body()["mappings"]["properties"]
                .clone(),
            reachable: true,
        }
    }
}

impl FakeBackend {
    #[must_use]
    pub fn with_docs(articles: Vec<Value>, authors: Vec<Value>) -> Self {
        Self {
            articles: Mutex::new(articles),
            authors: Mutex::new(authors),
            ..Self::default()
        }
    }

    fn docs_for(&self, index: &str) -> Result<Vec<Value>, IndexError> {
        if index == self.article_index {
            Ok(self.articles.lock().map(|d| d.clone()).unwrap_or_default())
        } else if index == self.author_index {
            Ok(self.authors.lock().map(|d| d.clone()).unwrap_or_default())
        } else {
            Err(IndexError::new(
                IndexErrorCode::NotFound,
                format!("unknown index {index}"),
            ))
        }
    }

    fn run_query(&self, index: &str, body: &Value) -> Result<Value, IndexError> {
        let docs = self.docs_for(index)?;

        let mut scored: Vec<(Value, f64)> = Vec::new();
        if let Some(knn) = body.get("knn") {
            let vector = float_vec(&knn["query_vector"]);
            let field = knn["field"].as_str().unwrap_or("title_embedding");
            let k = knn["k"].as_u64().unwrap_or(10) as usize;
            for doc in &docs {
                if let Some(filter) = knn.get("filter") {
                    if !matches_query(doc, filter) {
                        continue;
                    }
                }
                if let Some(candidate) = doc.get(field).map(float_vec) {
                    scored.push((doc.clone(), cosine(&vector, &candidate)));
                }
            }
            scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(k);
        } else {
            let query = body.get("query").cloned().unwrap_or(json!({"match_all": {}}));
            for doc in &docs {
                if let Some(score) = score_query(doc, &query) {
                    scored.push((doc.clone(), score));
                }
            }
            if let Some(min_score) = query
                .get("function_score")
                .and_then(|fs| fs.get("min_score"))
                .and_then(Value::as_f64)
            {
                scored.retain(|(_, score)| *score >= min_score);
            }
            if body.get("sort").is_some() {
                scored.sort_by_key(|(doc, _)| {
                    std::cmp::Reverse(doc["publication_year"].as_i64().unwrap_or(i64::MIN))
                });
            } else {
                scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            }
        }

        let aggregations = body
            .get("aggs")
            .map(|aggs| run_aggregations(aggs, &scored))
            .unwrap_or(Value::Null);

        let from = body.get("from").and_then(Value::as_u64).unwrap_or(0) as usize;
        let size = body.get("size").and_then(Value::as_u64).unwrap_or(10) as usize;
        let total = scored.len();
        let projection = body.get("_source").cloned();
        let page: Vec<(Value, f64)> = scored
            .into_iter()
            .skip(from)
            .take(size)
            .map(|(doc, score)| (project(doc, projection.as_ref()), score))
            .collect();

        let hits: Vec<Value> = page
            .into_iter()
            .map(|(doc, score)| {
                json!({
                    "_id": doc.get("id").cloned().unwrap_or(Value::Null),
                    "_score": score,
                    "_source": doc
                })
            })
            .collect();

        let mut response = json!({
            "hits": {"total": {"value": total}, "hits": hits}
        });
        if !aggregations.is_null() {
            response["aggregations"] = aggregations;
        }
        Ok(response)
    }
}

#[async_trait]
impl SearchBackend for FakeBackend {
    fn backend_tag(&self) -> &'static str {
        "fake"
    }

    async fn ping(&self) -> bool {
        self.reachable
    }

    async fn count(&self, index: &str, body: Option<&Value>) -> Result<u64, IndexError> {
        let docs = self.docs_for(index)?;
        let Some(body) = body else {
            return Ok(docs.len() as u64);
        };
        let query = body.get("query").cloned().unwrap_or(json!({"match_all": {}}));
        Ok(docs.iter().filter(|doc| matches_query(doc, &query)).count() as u64)
    }

    async fn search(&self, index: &str, body: &Value) -> Result<Value, IndexError> {
        if !self.reachable {
            return Err(IndexError::new(IndexErrorCode::Network, "backend offline"));
        }
        self.run_query(index, body)
    }

    async fn scroll_all(
        &self,
        index: &str,
        body: Value,
        _keep_alive: &str,
    ) -> Result<Vec<Value>, IndexError> {
        let mut unbounded = body;
        unbounded["size"] = json!(u32::MAX);
        unbounded["from"] = json!(0);
        let response = self.run_query(index, &unbounded)?;
        Ok(response["hits"]["hits"].as_array().cloned().unwrap_or_default())
    }

    async fn get_doc(&self, index: &str, id: &str) -> Result<Option<Value>, IndexError> {
        let docs = self.docs_for(index)?;
        Ok(docs
            .into_iter()
            .find(|doc| doc["id"].as_str() == Some(id)))
    }

    async fn mget(&self, index: &str, ids: &[String]) -> Result<Vec<Value>, IndexError> {
        let docs = self.docs_for(index)?;
        Ok(ids
            .iter()
            .map(|id| {
                match docs.iter().find(|doc| doc["id"].as_str() == Some(id)) {
                    Some(doc) => json!({"_id": id, "found": true, "_source": doc}),
                    None => json!({"_id": id, "found": false}),
                }
            })
            .collect())
    }

    async fn get_mapping(&self, index: &str) -> Result<Value, IndexError> {
        if index == self.article_index {
            Ok(json!({
                index: {"mappings": {"properties": self.article_properties}}
            }))
        } else {
            Ok(json!({
                index: {"mappings": {"properties": {"id": {"type": "keyword"}}}}
            }))
        }
    }

    async fn index_exists(&self, index: &str) -> Result<bool, IndexError> {
        Ok(index == self.article_index || index == self.author_index)
    }

    async fn index_stats(&self, index: &str) -> Result<IndexStats, IndexError> {
        let docs = self.docs_for(index)?;
        Ok(IndexStats {
            index_name: index.to_string(),
            doc_count: docs.len() as u64,
            deleted_docs: 0,
            size_bytes: 1024 * docs.len() as u64,
            field_count: 7,
            shard_count: 1,
        })
    }
}

/// Deterministic embedder: one unit vector per distinct text.
#[derive(Default)]
pub struct FakeEmbedder;

#[async_trait]
impl Embedder for FakeEmbedder {
    fn embedder_tag(&self) -> &'static str {
        "fake"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexError> {
        Ok(texts.iter().map(|text| fake_vector(text)).collect())
    }
}

/// Hash-seeded unit vector of the model dimension.
#[must_use]
pub fn fake_vector(text: &str) -> Vec<f32> {
    let mut seed = text
        .bytes()
        .fold(0x9e37_79b9_u64, |acc, b| acc.wrapping_mul(131).wrapping_add(u64::from(b)));
    let mut vector = Vec::with_capacity(EMBEDDING_DIM);
    for _ in 0..EMBEDDING_DIM {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        vector.push(((seed >> 33) as f32 / (1u64 << 31) as f32) - 1.0);
    }
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

fn float_vec(value: &Value) -> Vec<f32> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_f64)
                .map(|v| v as f32)
                .collect()
        })
        .unwrap_or_default()
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let na: f64 = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let nb: f64 = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

/// None when the document does not match; the match score otherwise.
fn score_query(doc: &Value, query: &Value) -> Option<f64> {
    if let Some(fs) = query.get("function_score") {
        let base = fs.get("query").cloned().unwrap_or(json!({"match_all": {}}));
        if !matches_query(doc, &base) {
            return None;
        }
        let mut function_sum = 0.0;
        if let Some(functions) = fs.get("functions").and_then(Value::as_array) {
            for function in functions {
                let weight = function.get("weight").and_then(Value::as_f64).unwrap_or(1.0);
                let script = &function["script_score"]["script"];
                let source = script["source"].as_str().unwrap_or_default();
                let field = source
                    .split('\'')
                    .nth(1)
                    .unwrap_or("title_embedding");
                let vector = float_vec(&script["params"]["query_vector"]);
                if let Some(candidate) = doc.get(field).map(float_vec) {
                    if !candidate.is_empty() {
                        function_sum += weight * (cosine(&vector, &candidate) + 1.0);
                    }
                }
            }
        }
        let boost = fs.get("boost").and_then(Value::as_f64).unwrap_or(1.0);
        return match fs.get("boost_mode").and_then(Value::as_str) {
            Some("replace") => Some(function_sum),
            // multiply: base text score is flattened to 1.0 here.
            _ => Some(boost * function_sum),
        };
    }
    matches_query(doc, query).then_some(1.0)
}

fn matches_query(doc: &Value, query: &Value) -> bool {
    let Some(object) = query.as_object() else {
        return false;
    };
    let Some((kind, spec)) = object.iter().next() else {
        return true;
    };
    match kind.as_str() {
        "match_all" => true,
        "bool" => matches_bool(doc, spec),
        "term" => spec
            .as_object()
            .and_then(|m| m.iter().next())
            .is_some_and(|(field, expected)| field_contains(doc, field, expected)),
        "terms" => spec
            .as_object()
            .and_then(|m| m.iter().next())
            .and_then(|(field, values)| {
                values
                    .as_array()
                    .map(|vs| vs.iter().any(|v| field_contains(doc, field, v)))
            })
            .unwrap_or(false),
        "exists" => spec
            .get("field")
            .and_then(Value::as_str)
            .is_some_and(|field| !doc.get(field).unwrap_or(&Value::Null).is_null()),
        "range" => spec
            .as_object()
            .and_then(|m| m.iter().next())
            .is_some_and(|(field, bounds)| in_range(doc.get(field), bounds)),
        "multi_match" => {
            let needle = spec["query"].as_str().unwrap_or_default().to_lowercase();
            let fields = spec["fields"]
                .as_array()
                .map(|fs| {
                    fs.iter()
                        .filter_map(Value::as_str)
                        .map(|f| f.split('^').next().unwrap_or(f))
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            fields.iter().any(|field| text_contains(doc.get(*field), &needle))
        }
        "match" => spec
            .as_object()
            .and_then(|m| m.iter().next())
            .is_some_and(|(field, condition)| {
                let needle = condition
                    .get("query")
                    .and_then(Value::as_str)
                    .or_else(|| condition.as_str())
                    .unwrap_or_default()
                    .to_lowercase();
                text_contains(doc.get(field), &needle)
            }),
        "function_score" => score_query(doc, query).is_some(),
        _ => false,
    }
}

fn matches_bool(doc: &Value, spec: &Value) -> bool {
    for clause in ["must", "filter"] {
        if let Some(parts) = spec.get(clause) {
            let all = as_clause_list(parts).iter().all(|part| matches_query(doc, part));
            if !all {
                return false;
            }
        }
    }
    if let Some(parts) = spec.get("must_not") {
        if as_clause_list(parts).iter().any(|part| matches_query(doc, part)) {
            return false;
        }
    }
    if let Some(parts) = spec.get("should") {
        let minimum = spec
            .get("minimum_should_match")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;
        let matched = as_clause_list(parts)
            .iter()
            .filter(|part| matches_query(doc, part))
            .count();
        if minimum > 0 && matched < minimum {
            return false;
        }
    }
    true
}

fn as_clause_list(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

/// Equality on the raw field and on `.keyword` addressed sub-fields;
/// arrays match any element.
fn field_contains(doc: &Value, field: &str, expected: &Value) -> bool {
    let base = field.strip_suffix(".keyword").unwrap_or(field);
    match doc.get(base) {
        Some(Value::Array(items)) => items.iter().any(|item| item == expected),
        Some(value) => value == expected,
        None => false,
    }
}

fn text_contains(value: Option<&Value>, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    // A phrase or multi-word query matches when every token does.
    needle.split_whitespace().all(|token| match value {
        Some(Value::String(text)) => text.to_lowercase().contains(token),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .any(|item| item.to_lowercase().contains(token)),
        _ => false,
    })
}

fn in_range(value: Option<&Value>, bounds: &Value) -> bool {
    let Some(observed) = value.and_then(Value::as_f64) else {
        return false;
    };
    let Some(bounds) = bounds.as_object() else {
        return false;
    };
    for (bound, limit) in bounds {
        let Some(limit) = limit.as_f64() else {
            return false;
        };
        let holds = match bound.as_str() {
            "gte" => observed >= limit,
            "gt" => observed > limit,
            "lte" => observed <= limit,
            "lt" => observed < limit,
            _ => true,
        };
        if !holds {
            return false;
        }
    }
    true
}

fn run_aggregations(aggs: &Value, scored: &[(Value, f64)]) -> Value {
    let mut out = Map::new();
    let Some(aggs) = aggs.as_object() else {
        return Value::Object(out);
    };
    for (name, spec) in aggs {
        if let Some(histogram) = spec.get("histogram") {
            let field = histogram["field"].as_str().unwrap_or_default();
            let mut buckets: BTreeMap<i64, u64> = BTreeMap::new();
            for (doc, _) in scored {
                if let Some(value) = doc.get(field).and_then(Value::as_i64) {
                    *buckets.entry(value).or_insert(0) += 1;
                }
            }
            let rendered: Vec<Value> = buckets
                .into_iter()
                .map(|(key, count)| json!({"key": key as f64, "doc_count": count}))
                .collect();
            out.insert(name.clone(), json!({"buckets": rendered}));
        } else if let Some(terms) = spec.get("terms") {
            let field = terms["field"].as_str().unwrap_or_default();
            let base = field.strip_suffix(".keyword").unwrap_or(field);
            let size = terms["size"].as_u64().unwrap_or(10) as usize;
            let mut counts: BTreeMap<String, u64> = BTreeMap::new();
            for (doc, _) in scored {
                match doc.get(base) {
                    Some(Value::Array(items)) => {
                        for item in items.iter().filter_map(Value::as_str) {
                            *counts.entry(item.to_string()).or_insert(0) += 1;
                        }
                    }
                    Some(Value::String(item)) => {
                        *counts.entry(item.clone()).or_insert(0) += 1;
                    }
                    _ => {}
                }
            }
            let mut ranked: Vec<(String, u64)> = counts.into_iter().collect();
            ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            ranked.truncate(size);
            let rendered: Vec<Value> = ranked
                .into_iter()
                .map(|(key, count)| json!({"key": key, "doc_count": count}))
                .collect();
            out.insert(name.clone(), json!({"buckets": rendered}));
        }
    }
    Value::Object(out)
}

fn project(doc: Value, projection: Option<&Value>) -> Value {
    let Some(fields) = projection.and_then(Value::as_array) else {
        return doc;
    };
    let wanted: Vec<&str> = fields.iter().filter_map(Value::as_str).collect();
    let Value::Object(map) = doc else {
        return Value::Object(Map::new());
    };
    let kept: Map<String, Value> = map
        .into_iter()
        .filter(|(key, _)| wanted.contains(&key.as_str()))
        .collect();
    Value::Object(kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> FakeBackend {
        FakeBackend::with_docs(
            vec![
                json!({"id": "a1", "title": "Graphene oxide membranes", "publication_year": 2020,
                       "publication_type": "article", "keywords": ["graphene", "membranes"],
                       "authors": ["p1"], "author_units": ["Chemistry"]}),
                json!({"id": "a2", "title": "Deep learning for NLP", "publication_year": 2021,
                       "publication_type": "chapter", "keywords": ["deep learning"],
                       "authors": ["p2"], "author_units": ["Computing"]}),
            ],
            vec![json!({"id": "p1", "full_name": "Anna Kowalska", "unit": "Chemistry"})],
        )
    }

    #[tokio::test]
    async fn term_and_terms_probe_array_fields() {
        let backend = corpus();
        let hits = backend
            .search(
                scholaris_model::ARTICLE_INDEX,
                &json!({"query": {"term": {"authors": "p1"}}, "size": 10}),
            )
            .await
            .expect("search");
        assert_eq!(hits["hits"]["total"]["value"], 1);
        assert_eq!(hits["hits"]["hits"][0]["_source"]["id"], "a1");

        let count = backend
            .count(
                scholaris_model::ARTICLE_INDEX,
                Some(&json!({"query": {"terms": {"id": ["a1", "a2"]}}})),
            )
            .await
            .expect("count");
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn multi_match_is_a_substring_probe() {
        let backend = corpus();
        let hits = backend
            .search(
                scholaris_model::ARTICLE_INDEX,
                &json!({
                    "query": {"multi_match": {"query": "graphene", "fields": ["title^3", "abstract^2", "keywords"]}},
                    "size": 10
                }),
            )
            .await
            .expect("search");
        assert_eq!(hits["hits"]["total"]["value"], 1);
    }

    #[tokio::test]
    async fn terms_aggregation_counts_multivalued_fields() {
        let backend = corpus();
        let response = backend
            .search(
                scholaris_model::ARTICLE_INDEX,
                &json!({
                    "query": {"match_all": {}},
                    "size": 0,
                    "aggs": {"units": {"terms": {"field": "author_units", "size": 10}}}
                }),
            )
            .await
            .expect("search");
        let buckets = response["aggregations"]["units"]["buckets"]
            .as_array()
            .expect("buckets");
        assert_eq!(buckets.len(), 2);
    }

    #[test]
    fn fake_vectors_are_unit_norm_and_deterministic() {
        let a = fake_vector("graphene");
        let b = fake_vector("graphene");
        assert_eq!(a, b);
        assert_eq!(a.len(), EMBEDDING_DIM);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
        assert!(cosine(&a, &fake_vector("unrelated")) < 0.9);
    }
}
