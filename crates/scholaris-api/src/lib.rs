// SPDX-License-Identifier: Apache-2.0
//! Wire contracts of the HTTP surface: error taxonomy, request body
//! parsing and the OpenAPI document. Everything here is pure; handlers
//! in the server crate do the I/O.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub mod openapi;
pub mod requests;

pub use openapi::openapi_v1_spec;
pub use requests::{
    search_method_or_hybrid, AuthorIdBody, AuthorPublicationsBody, AuthorPublicationsRequest,
    AuthorsBulkBody, ClusterBody, ClusterRequest, ClusteringParamsBody, PublicationsByIdsBody,
    SearchAuthorsBody, SearchAuthorsRequest, SearchBody, SearchFilterBody, SearchRequest,
    StringOrList, TopicAnalysisBody, TopicAnalysisRequest, UnitBody, UnitPublicationsBody,
    UnitPublicationsRequest,
};

pub const CRATE_NAME: &str = "scholaris-api";

/// Identity the root endpoint reports.
pub const SYSTEM_NAME: &str = "Scientific Article Search & Clustering API";
pub const API_VERSION: &str = "1.0.0";

/// `_mget` ceiling for bulk author lookups; longer ID lists are truncated.
pub const MAX_BULK_AUTHOR_IDS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ApiErrorCode {
    InvalidParameter,
    NotFound,
    RateLimited,
    NotReady,
    Upstream,
    Internal,
}

impl ApiErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidParameter => "InvalidParameter",
            Self::NotFound => "NotFound",
            Self::RateLimited => "RateLimited",
            Self::NotReady => "NotReady",
            Self::Upstream => "Upstream",
            Self::Internal => "Internal",
        }
    }

    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::InvalidParameter => 422,
            Self::NotFound => 404,
            Self::RateLimited => 429,
            Self::NotReady => 503,
            Self::Upstream => 502,
            Self::Internal => 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
    pub details: Value,
}

impl ApiError {
    #[must_use]
    pub fn new(code: ApiErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
        }
    }

    #[must_use]
    pub fn invalid_param(name: &str, reason: &str) -> Self {
        Self::new(
            ApiErrorCode::InvalidParameter,
            format!("invalid parameter: {name}"),
            json!({"parameter": name, "reason": reason}),
        )
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::NotFound, message, json!({}))
    }

    #[must_use]
    pub fn not_ready(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::NotReady, message, json!({}))
    }

    #[must_use]
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::Upstream, message, json!({}))
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::Internal, message, json!({}))
    }

    #[must_use]
    pub fn rate_limited(class: &str) -> Self {
        Self::new(
            ApiErrorCode::RateLimited,
            "request rejected by concurrency limits",
            json!({"class": class}),
        )
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for ApiError {}

/// Decodes a JSON request body into a typed wire struct. Shape errors
/// surface as InvalidParameter, matching validation-failure semantics.
pub fn decode_body<T: serde::de::DeserializeOwned>(body: Value) -> Result<T, ApiError> {
    serde_json::from_value(body).map_err(|e| {
        ApiError::new(
            ApiErrorCode::InvalidParameter,
            "request body validation failed",
            json!({"reason": e.to_string()}),
        )
    })
}
