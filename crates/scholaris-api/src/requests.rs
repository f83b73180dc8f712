//! Request body shapes, one per POST route.
//!
//! Each `*Body` struct mirrors the wire exactly (including the `from_`
//! key) and its `validate` method produces the checked `*Request` the
//! handlers operate on. Unknown body fields are ignored; wrong types and
//! out-of-range numbers are rejected with InvalidParameter.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::ApiError;
use scholaris_model::{FilterValue, Filters};
use scholaris_query::SearchMethod;

pub const MAX_SEARCH_SIZE: i64 = 10_000;

/// Anything that is not exactly `text` or `semantic` searches hybrid.
#[must_use]
pub fn search_method_or_hybrid(raw: &str) -> SearchMethod {
    match raw {
        "text" => SearchMethod::Text,
        "semantic" => SearchMethod::Semantic,
        _ => SearchMethod::Hybrid,
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StringOrList {
    One(String),
    Many(Vec<String>),
}

/// The structured filter object search-style routes accept.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchFilterBody {
    #[serde(default)]
    pub publication_year: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    pub keywords: Option<Vec<Value>>,
    #[serde(default)]
    pub publication_type: Option<StringOrList>,
}

impl SearchFilterBody {
    /// None when every field is absent, mirroring `exclude_none` dumps.
    pub fn into_filters(self) -> Result<Option<Filters>, ApiError> {
        let mut filters = Filters::default();
        if let Some(bounds) = self.publication_year {
            filters.insert("publication_year", FilterValue::Range(bounds));
        }
        if let Some(keywords) = self.keywords {
            filters.insert("keywords", FilterValue::Terms(keywords));
        }
        match self.publication_type {
            Some(StringOrList::One(value)) => {
                filters.insert("publication_type", FilterValue::Term(Value::String(value)));
            }
            Some(StringOrList::Many(values)) => {
                filters.insert(
                    "publication_type",
                    FilterValue::Terms(values.into_iter().map(Value::String).collect()),
                );
            }
            None => {}
        }
        if filters.is_empty() {
            return Ok(None);
        }
        filters
            .validate()
            .map_err(|e| ApiError::invalid_param("filters", &e.0))?;
        Ok(Some(filters))
    }
}

fn validate_free_filters(filters: Option<Filters>) -> Result<Option<Filters>, ApiError> {
    if let Some(filters) = &filters {
        filters
            .validate()
            .map_err(|e| ApiError::invalid_param("filters", &e.0))?;
    }
    Ok(filters)
}

fn size_in_range(size: i64, name: &str) -> Result<usize, ApiError> {
    if !(1..=MAX_SEARCH_SIZE).contains(&size) {
        return Err(ApiError::invalid_param(
            name,
            "must be between 1 and 10000",
        ));
    }
    Ok(size as usize)
}

fn non_negative(value: i64, name: &str) -> Result<usize, ApiError> {
    if value < 0 {
        return Err(ApiError::invalid_param(
            name,
            "Size or from parameter cannot be negative",
        ));
    }
    Ok(value as usize)
}

fn default_search_size() -> i64 {
    20
}

fn default_cluster_size() -> i64 {
    50
}

fn default_author_pub_size() -> i64 {
    100
}

fn default_topic_size() -> i64 {
    1000
}

fn default_top_n() -> i64 {
    10
}

fn default_method() -> String {
    "hybrid".to_owned()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchBody {
    pub query: String,
    #[serde(default = "default_search_size")]
    pub size: i64,
    #[serde(default, rename = "from_")]
    pub from: i64,
    #[serde(default = "default_method")]
    pub search_method: String,
    #[serde(default)]
    pub filters: Option<SearchFilterBody>,
    #[serde(default = "default_true")]
    pub include_facets: bool,
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub size: usize,
    pub from: usize,
    pub method: SearchMethod,
    pub filters: Option<Filters>,
    pub include_facets: bool,
}

impl SearchBody {
    pub fn validate(self) -> Result<SearchRequest, ApiError> {
        Ok(SearchRequest {
            query: self.query,
            size: size_in_range(self.size, "size")?,
            from: non_negative(self.from, "from_")?,
            method: search_method_or_hybrid(&self.search_method),
            filters: self.filters.map_or(Ok(None), SearchFilterBody::into_filters)?,
            include_facets: self.include_facets,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusteringParamsBody {
    #[serde(default = "default_auto")]
    pub method: String,
    #[serde(default = "default_max_clusters")]
    pub max_clusters: i64,
    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: i64,
}

fn default_auto() -> String {
    "auto".to_owned()
}

fn default_max_clusters() -> i64 {
    10
}

fn default_min_cluster_size() -> i64 {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterBody {
    pub query: String,
    #[serde(default = "default_cluster_size")]
    pub size: i64,
    #[serde(default = "default_method")]
    pub search_method: String,
    pub clustering_params: ClusteringParamsBody,
    #[serde(default)]
    pub filters: Option<SearchFilterBody>,
}

#[derive(Debug, Clone)]
pub struct ClusterRequest {
    pub query: String,
    pub size: usize,
    pub method: SearchMethod,
    pub clustering_method: String,
    pub max_clusters: i64,
    pub min_cluster_size: usize,
    pub filters: Option<Filters>,
}

impl ClusterBody {
    pub fn validate(self) -> Result<ClusterRequest, ApiError> {
        if self.clustering_params.max_clusters < 1 {
            return Err(ApiError::invalid_param("max_clusters", "must be at least 1"));
        }
        Ok(ClusterRequest {
            query: self.query,
            size: size_in_range(self.size, "size")?,
            method: search_method_or_hybrid(&self.search_method),
            clustering_method: self.clustering_params.method,
            max_clusters: self.clustering_params.max_clusters,
            min_cluster_size: non_negative(
                self.clustering_params.min_cluster_size,
                "min_cluster_size",
            )?,
            filters: self.filters.map_or(Ok(None), SearchFilterBody::into_filters)?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchAuthorsBody {
    pub query: String,
    #[serde(default = "default_search_size")]
    pub size: i64,
}

#[derive(Debug, Clone)]
pub struct SearchAuthorsRequest {
    pub query: String,
    pub size: usize,
}

impl SearchAuthorsBody {
    pub fn validate(self) -> Result<SearchAuthorsRequest, ApiError> {
        Ok(SearchAuthorsRequest {
            query: self.query,
            size: size_in_range(self.size, "size")?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorPublicationsBody {
    pub author_id: String,
    #[serde(default = "default_author_pub_size")]
    pub size: i64,
    #[serde(default, rename = "from_")]
    pub from: i64,
    #[serde(default)]
    pub filters: Option<Filters>,
}

#[derive(Debug, Clone)]
pub struct AuthorPublicationsRequest {
    pub author_id: String,
    /// None requests every publication (wire size 0).
    pub size: Option<usize>,
    pub from: usize,
    pub filters: Option<Filters>,
}

impl AuthorPublicationsBody {
    pub fn validate(self) -> Result<AuthorPublicationsRequest, ApiError> {
        let size = non_negative(self.size, "size")?;
        Ok(AuthorPublicationsRequest {
            author_id: self.author_id,
            size: if size == 0 { None } else { Some(size) },
            from: non_negative(self.from, "from_")?,
            filters: validate_free_filters(self.filters)?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorIdBody {
    pub author_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublicationsByIdsBody {
    pub ids: Vec<String>,
    #[serde(default)]
    pub filters: Option<Filters>,
}

impl PublicationsByIdsBody {
    pub fn validate(self) -> Result<(Vec<String>, Option<Filters>), ApiError> {
        Ok((self.ids, validate_free_filters(self.filters)?))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorsBulkBody {
    pub ids: Vec<String>,
    #[serde(default)]
    pub fields: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnitPublicationsBody {
    pub unit: String,
    #[serde(default)]
    pub size: Option<i64>,
    #[serde(default, rename = "from_")]
    pub from: i64,
    #[serde(default = "default_true")]
    pub cluster_results: bool,
    #[serde(default = "default_true")]
    pub lite: bool,
    #[serde(default)]
    pub filters: Option<SearchFilterBody>,
}

#[derive(Debug, Clone)]
pub struct UnitPublicationsRequest {
    pub unit: String,
    /// None or Some(0) both mean fetch everything.
    pub size: Option<usize>,
    pub from: usize,
    pub cluster_results: bool,
    pub lite: bool,
    pub filters: Option<Filters>,
}

impl UnitPublicationsBody {
    pub fn validate(self) -> Result<UnitPublicationsRequest, ApiError> {
        let size = match self.size {
            Some(raw) => Some(non_negative(raw, "size")?),
            None => None,
        };
        Ok(UnitPublicationsRequest {
            unit: self.unit,
            size,
            from: non_negative(self.from, "from_")?,
            cluster_results: self.cluster_results,
            lite: self.lite,
            filters: self.filters.map_or(Ok(None), SearchFilterBody::into_filters)?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnitBody {
    pub unit: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopicAnalysisBody {
    pub query: String,
    #[serde(default = "default_top_n")]
    pub top_n: i64,
    #[serde(default = "default_topic_size")]
    pub size: i64,
}

#[derive(Debug, Clone)]
pub struct TopicAnalysisRequest {
    pub query: String,
    pub top_n: usize,
    pub size: usize,
}

impl TopicAnalysisBody {
    pub fn validate(self) -> Result<TopicAnalysisRequest, ApiError> {
        if self.top_n < 1 {
            return Err(ApiError::invalid_param("top_n", "must be at least 1"));
        }
        Ok(TopicAnalysisRequest {
            query: self.query,
            top_n: self.top_n as usize,
            size: size_in_range(self.size, "size")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decode_body, ApiErrorCode};
    use serde_json::json;

    #[test]
    fn search_body_fills_defaults_and_reads_the_from_key() {
        let request = decode_body::<SearchBody>(json!({"query": "graphene"}))
            .expect("decode")
            .validate()
            .expect("validate");
        assert_eq!(request.size, 20);
        assert_eq!(request.from, 0);
        assert_eq!(request.method, SearchMethod::Hybrid);
        assert!(request.include_facets);
        assert!(request.filters.is_none());

        let paged = decode_body::<SearchBody>(json!({"query": "q", "from_": 40}))
            .expect("decode")
            .validate()
            .expect("validate");
        assert_eq!(paged.from, 40);
    }

    #[test]
    fn out_of_range_sizes_are_invalid_parameters() {
        let too_big = decode_body::<SearchBody>(json!({"query": "q", "size": 10001}))
            .expect("decode")
            .validate()
            .expect_err("size cap");
        assert_eq!(too_big.code, ApiErrorCode::InvalidParameter);

        let negative = decode_body::<SearchBody>(json!({"query": "q", "from_": -1}))
            .expect("decode")
            .validate()
            .expect_err("negative from");
        assert_eq!(negative.code, ApiErrorCode::InvalidParameter);
        assert_eq!(
            negative.details["reason"],
            "Size or from parameter cannot be negative"
        );
    }

    #[test]
    fn unknown_search_methods_fall_back_to_hybrid() {
        assert_eq!(search_method_or_hybrid("text"), SearchMethod::Text);
        assert_eq!(search_method_or_hybrid("semantic"), SearchMethod::Semantic);
        assert_eq!(search_method_or_hybrid("TEXT"), SearchMethod::Hybrid);
        assert_eq!(search_method_or_hybrid("anything"), SearchMethod::Hybrid);
    }

    #[test]
    fn filter_body_accepts_both_publication_type_shapes() {
        let single: SearchFilterBody =
            serde_json::from_value(json!({"publication_type": "article"})).expect("decode");
        let filters = single.into_filters().expect("convert").expect("present");
        assert!(matches!(
            filters.0.get("publication_type"),
            Some(FilterValue::Term(_))
        ));

        let many: SearchFilterBody =
            serde_json::from_value(json!({"publication_type": ["article", "chapter"]}))
                .expect("decode");
        let filters = many.into_filters().expect("convert").expect("present");
        assert!(matches!(
            filters.0.get("publication_type"),
            Some(FilterValue::Terms(_))
        ));
    }

    #[test]
    fn negative_year_bounds_are_rejected() {
        let body: SearchFilterBody =
            serde_json::from_value(json!({"publication_year": {"gte": -3}})).expect("decode");
        let error = body.into_filters().expect_err("negative year");
        assert_eq!(error.code, ApiErrorCode::InvalidParameter);
    }

    #[test]
    fn unknown_filter_fields_are_dropped() {
        let body: SearchFilterBody = serde_json::from_value(json!({
            "keywords": ["graphene"],
            "open_access": true
        }))
        .expect("decode");
        let filters = body.into_filters().expect("convert").expect("present");
        assert_eq!(filters.len(), 1);
    }

    #[test]
    fn empty_filter_body_collapses_to_none() {
        let body: SearchFilterBody = serde_json::from_value(json!({})).expect("decode");
        assert!(body.into_filters().expect("convert").is_none());
    }

    #[test]
    fn cluster_body_requires_clustering_params() {
        let missing = decode_body::<ClusterBody>(json!({"query": "q"}));
        assert!(missing.is_err());

        let request = decode_body::<ClusterBody>(json!({
            "query": "q",
            "clustering_params": {}
        }))
        .expect("decode")
        .validate()
        .expect("validate");
        assert_eq!(request.size, 50);
        assert_eq!(request.clustering_method, "auto");
        assert_eq!(request.max_clusters, 10);
        assert_eq!(request.min_cluster_size, 3);
    }

    #[test]
    fn author_publications_size_zero_means_fetch_all() {
        let all = decode_body::<AuthorPublicationsBody>(json!({"author_id": "a1", "size": 0}))
            .expect("decode")
            .validate()
            .expect("validate");
        assert!(all.size.is_none());

        let paged = decode_body::<AuthorPublicationsBody>(json!({
            "author_id": "a1",
            "size": 25,
            "from_": 50
        }))
        .expect("decode")
        .validate()
        .expect("validate");
        assert_eq!(paged.size, Some(25));
        assert_eq!(paged.from, 50);
    }

    #[test]
    fn unit_publications_defaults_cluster_and_lite_on() {
        let request = decode_body::<UnitPublicationsBody>(json!({"unit": "WEiTI"}))
            .expect("decode")
            .validate()
            .expect("validate");
        assert!(request.cluster_results);
        assert!(request.lite);
        assert!(request.size.is_none());
        assert_eq!(request.from, 0);
    }
}
