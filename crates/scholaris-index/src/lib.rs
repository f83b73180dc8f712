// SPDX-License-Identifier: Apache-2.0
//! Elasticsearch access for the publication catalog.
//!
//! [`EsClient`] speaks the REST API directly; read paths sit behind the
//! [`SearchBackend`] trait so the HTTP layer can run against a fake in
//! tests. [`bootstrap`] owns the index settings and mappings, and
//! [`embedder`] the sidecar service that turns text into vectors.

#![forbid(unsafe_code)]

use std::fmt::{Display, Formatter};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

pub mod bootstrap;
pub mod client;
pub mod embedder;

pub use bootstrap::{
    article_index_body, author_index_body, combined_embedding_properties, ensure_indices,
};
pub use client::{bulk_body, BulkOp, BulkResponse, EsClient, RetryPolicy, SCROLL_KEEP_ALIVE};
pub use embedder::{Embedder, HttpEmbedder, QUERY_EMBED_PREFIX};

pub const CRATE_NAME: &str = "scholaris-index";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum IndexErrorCode {
    NotFound,
    Validation,
    Network,
    Upstream,
    Internal,
}

impl IndexErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Validation => "validation_error",
            Self::Network => "network_error",
            Self::Upstream => "upstream_error",
            Self::Internal => "internal_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexError {
    pub code: IndexErrorCode,
    pub message: String,
}

impl IndexError {
    #[must_use]
    pub fn new(code: IndexErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl Display for IndexError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for IndexError {}

/// Size and layout snapshot of one index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub index_name: String,
    pub doc_count: u64,
    pub deleted_docs: u64,
    pub size_bytes: u64,
    pub field_count: usize,
    pub shard_count: u64,
}

/// Read-side index operations the query service depends on.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn backend_tag(&self) -> &'static str;

    /// True when the node answers at all; never errors.
    async fn ping(&self) -> bool;

    async fn count(&self, index: &str, body: Option<&Value>) -> Result<u64, IndexError>;

    async fn search(&self, index: &str, body: &Value) -> Result<Value, IndexError>;

    /// Runs a scroll to exhaustion and returns every hit object. The
    /// body must already carry its page size, sort and projection.
    async fn scroll_all(
        &self,
        index: &str,
        body: Value,
        keep_alive: &str,
    ) -> Result<Vec<Value>, IndexError>;

    /// `_source` of one document, or `None` when it does not exist.
    async fn get_doc(&self, index: &str, id: &str) -> Result<Option<Value>, IndexError>;

    /// Raw `_mget` doc entries, one per requested id, order preserved.
    async fn mget(&self, index: &str, ids: &[String]) -> Result<Vec<Value>, IndexError>;

    async fn get_mapping(&self, index: &str) -> Result<Value, IndexError>;

    async fn index_exists(&self, index: &str) -> Result<bool, IndexError>;

    async fn index_stats(&self, index: &str) -> Result<IndexStats, IndexError>;
}
