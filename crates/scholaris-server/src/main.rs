// SPDX-License-Identifier: Apache-2.0
#![forbid(unsafe_code)]

use std::sync::Arc;

use scholaris_index::{Embedder, EsClient, HttpEmbedder, RetryPolicy, SearchBackend};
use scholaris_server::{build_router, config::env_bool, AppState, ServerConfig};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if env_bool(scholaris_core::ENV_SCHOLARIS_LOG_JSON, true) {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("register SIGTERM");
        let mut sigint = signal(SignalKind::interrupt()).expect("register SIGINT");
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<(), String> {
    init_tracing();

    let config = ServerConfig::from_env();
    let retry = RetryPolicy::default();

    let backend: Arc<dyn SearchBackend> = Arc::new(
        EsClient::new(&config.es_url)
            .map_err(|e| format!("elasticsearch client for {}: {e}", config.es_url))?
            .with_retry(retry.clone()),
    );
    let embedder: Option<Arc<dyn Embedder>> = match &config.embedder_url {
        Some(url) => Some(Arc::new(
            HttpEmbedder::new(url)
                .map_err(|e| format!("embedder client for {url}: {e}"))?
                .with_retry(retry),
        )),
        None => {
            warn!("no embedder configured, semantic and hybrid search disabled");
            None
        }
    };

    if !backend.ping().await {
        warn!(es_url = %config.es_url, "elasticsearch unreachable at startup, serving anyway");
    }

    let bind_addr = config.bind_addr.clone();
    let shutdown_grace = config.shutdown_grace;
    let state = AppState::new(backend, embedder, config);
    let app = build_router(state);

    let addr: std::net::SocketAddr = bind_addr
        .parse()
        .map_err(|e| format!("invalid bind addr {bind_addr}: {e}"))?;
    let socket = if addr.is_ipv4() {
        tokio::net::TcpSocket::new_v4().map_err(|e| format!("socket v4 failed: {e}"))?
    } else {
        tokio::net::TcpSocket::new_v6().map_err(|e| format!("socket v6 failed: {e}"))?
    };
    socket
        .set_reuseaddr(true)
        .map_err(|e| format!("set_reuseaddr failed: {e}"))?;
    socket.bind(addr).map_err(|e| format!("bind failed: {e}"))?;
    let listener: TcpListener = socket
        .listen(1024)
        .map_err(|e| format!("listen failed: {e}"))?;
    info!("scholaris-server listening on {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            wait_for_shutdown_signal().await;
            info!("shutdown signal received, draining in-flight requests");
            tokio::time::sleep(shutdown_grace).await;
        })
        .await
        .map_err(|e| format!("server failed: {e}"))
}
