// SPDX-License-Identifier: Apache-2.0
//! Query construction for the article and author indices.
//!
//! Everything in this crate is a pure builder: functions take validated
//! domain values and return the JSON bodies the search backend executes.
//! No I/O happens here, which keeps the request planners testable without
//! a running cluster.

#![forbid(unsafe_code)]

use scholaris_model::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod authors;
pub mod facets;
pub mod filters;
pub mod knn;
pub mod lookups;
pub mod semantic;
pub mod text;

pub use authors::{
    article_by_id_body, paged_publications_body, plan_author_publications,
    publications_by_ids_body, scroll_publications_query, AuthorPublicationsPlan,
    PUBLICATION_ID_BATCH,
};
pub use facets::{facets_body, facets_for_ids_body, parse_facets, Facets};
pub use filters::{build_filter_clauses, build_unit_filter_clauses};
pub use knn::{filter_complexity, is_large_search, knn_search_body, knn_supported, KnnParams};
pub use lookups::{
    paged_query_body, parse_terms_agg, probe_body, topic_affiliation_agg_body,
    unit_collaboration_agg_body, unit_term_query, AffiliationLevel,
};
pub use semantic::{
    hybrid_search_body, normalize_semantic_score, semantic_search_body, total_semantic_weight,
    DEFAULT_MIN_SCORE,
};
pub use text::{author_search_body, split_query_terms, text_search_body};

pub const CRATE_NAME: &str = "scholaris-query";

/// Ranking strategy for article search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchMethod {
    #[default]
    Text,
    Semantic,
    Hybrid,
}

impl SearchMethod {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Semantic => "semantic",
            Self::Hybrid => "hybrid",
        }
    }

    /// True when executing this method requires a query embedding.
    #[must_use]
    pub fn needs_embedding(&self) -> bool {
        matches!(self, Self::Semantic | Self::Hybrid)
    }
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMethod {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "semantic" => Ok(Self::Semantic),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(ValidationError(format!(
                "unknown search method '{other}' (expected text, semantic, or hybrid)"
            ))),
        }
    }
}

/// Concurrency class a request is admitted under. Lookups and counts are
/// cheap, lexical search is medium, anything touching embeddings or
/// aggregating whole units is heavy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryClass {
    Cheap,
    Medium,
    Heavy,
}

impl QueryClass {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cheap => "cheap",
            Self::Medium => "medium",
            Self::Heavy => "heavy",
        }
    }
}

/// Maps a search method to its admission class.
#[must_use]
pub fn classify_search(method: SearchMethod) -> QueryClass {
    match method {
        SearchMethod::Text => QueryClass::Medium,
        SearchMethod::Semantic | SearchMethod::Hybrid => QueryClass::Heavy,
    }
}
