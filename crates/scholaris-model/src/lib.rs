#![forbid(unsafe_code)]
//! Scholaris domain model SSOT.

mod analytics;
mod document;
mod filters;
mod ids;

pub use analytics::{build_analytics, Analytics, TypeCount, ValueCount, YearCount, TOP_KEYWORDS};
pub use document::{strip_heavy, Article, Author, Embedding, EMBEDDING_DIM, HEAVY_FIELDS};
pub use filters::{FilterValue, Filters};
pub use ids::{ArticleId, AuthorId, UnitName, ValidationError, ID_MAX_LEN, UNIT_MAX_LEN};

pub const CRATE_NAME: &str = "scholaris-model";

/// Default Elasticsearch index names; overridable through server config.
pub const ARTICLE_INDEX: &str = "scientific_articles";
pub const AUTHOR_INDEX: &str = "authors";
