// SPDX-License-Identifier: Apache-2.0
#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use scholaris_index::{Embedder, SearchBackend};

pub mod admission;
pub mod analytics;
pub mod config;
pub mod fake;
pub mod handlers;
pub mod search;
pub mod telemetry;

pub use admission::Admission;
pub use config::ServerConfig;
pub use fake::{fake_vector, FakeBackend, FakeEmbedder};
pub use telemetry::ServiceMetrics;

pub const CRATE_NAME: &str = "scholaris-server";

const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Shared handler state. Cheap to clone; every field is behind an Arc.
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn SearchBackend>,
    pub embedder: Option<Arc<dyn Embedder>>,
    pub config: Arc<ServerConfig>,
    pub admission: Arc<Admission>,
    pub metrics: Arc<ServiceMetrics>,
    /// Denormalization probe result, filled on first use.
    pub denorm_probe: Arc<RwLock<Option<bool>>>,
    /// AuthorId -> (unit, subunit), filled as authors get resolved.
    pub author_units: Arc<RwLock<HashMap<String, (Option<String>, Option<String>)>>>,
}

impl AppState {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        embedder: Option<Arc<dyn Embedder>>,
        config: ServerConfig,
    ) -> Self {
        let admission = Arc::new(Admission::new(
            config.cheap_permits,
            config.medium_permits,
            config.heavy_permits,
            config.rate_limit_rps,
            config.rate_limit_burst,
        ));
        Self {
            backend,
            embedder,
            config: Arc::new(config),
            admission,
            metrics: Arc::new(ServiceMetrics::default()),
            denorm_probe: Arc::new(RwLock::new(None)),
            author_units: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

async fn openapi_handler() -> Json<serde_json::Value> {
    Json(scholaris_api::openapi_v1_spec())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root_handler))
        .route("/healthz", get(handlers::healthz_handler))
        .route("/readyz", get(handlers::readyz_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/openapi.json", get(openapi_handler))
        .route("/api/search", post(handlers::search_handler))
        .route("/api/cluster", post(handlers::cluster_handler))
        .route("/api/search_authors", post(handlers::search_authors_handler))
        .route(
            "/api/author_publications",
            post(handlers::author_publications_handler),
        )
        .route(
            "/api/author_coauthors",
            post(handlers::author_coauthors_handler),
        )
        .route(
            "/api/publications_by_ids",
            post(handlers::publications_by_ids_handler),
        )
        .route("/api/authors_bulk", post(handlers::authors_bulk_handler))
        .route(
            "/api/unit_publications",
            post(handlers::unit_publications_handler),
        )
        .route(
            "/api/unit_collaborations",
            post(handlers::unit_collaborations_handler),
        )
        .route(
            "/api/unit_publications_count",
            post(handlers::unit_publications_count_handler),
        )
        .route("/api/topic_analysis", post(handlers::topic_analysis_handler))
        .route(
            "/api/publications/:publication_id",
            get(handlers::publication_by_id_handler),
        )
        .route("/api/authors/:author_id", get(handlers::author_by_id_handler))
        .route("/api/index_stats", get(handlers::index_stats_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            telemetry::track_requests,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}
