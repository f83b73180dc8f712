//! Request metrics and the tracing middleware.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use axum::extract::State;
use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use tracing::info;

use crate::AppState;

const METRIC_SUBSYSTEM: &str = "scholaris";
const METRIC_VERSION: &str = env!("CARGO_PKG_VERSION");
/// Latency samples kept for percentile exposition; older samples rotate out.
const LATENCY_WINDOW: usize = 4096;

#[derive(Default)]
pub struct ServiceMetrics {
    pub requests_total: AtomicU64,
    pub responses_2xx: AtomicU64,
    pub responses_4xx: AtomicU64,
    pub responses_5xx: AtomicU64,
    pub rejected_total: AtomicU64,
    pub searches_total: AtomicU64,
    pub cluster_runs_total: AtomicU64,
    pub backend_errors_total: AtomicU64,
    pub request_latency_ns: Mutex<Vec<u64>>,
    pub request_id_seed: AtomicU64,
}

impl ServiceMetrics {
    pub fn record_latency(&self, elapsed_ns: u64) {
        if let Ok(mut window) = self.request_latency_ns.lock() {
            if window.len() >= LATENCY_WINDOW {
                window.remove(0);
            }
            window.push(elapsed_ns);
        }
    }

    pub fn record_status(&self, status: u16) {
        match status {
            200..=299 => self.responses_2xx.fetch_add(1, Ordering::Relaxed),
            400..=499 => {
                if status == 429 {
                    self.rejected_total.fetch_add(1, Ordering::Relaxed);
                }
                self.responses_4xx.fetch_add(1, Ordering::Relaxed)
            }
            _ => self.responses_5xx.fetch_add(1, Ordering::Relaxed),
        };
    }

    #[must_use]
    pub fn next_request_id(&self) -> String {
        let id = self.request_id_seed.fetch_add(1, Ordering::Relaxed);
        format!("req-{id:016x}")
    }
}

fn percentile_ns(values: &[u64], pct: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let idx = ((sorted.len() as f64 - 1.0) * pct).round() as usize;
    sorted[idx]
}

/// Prometheus text exposition of the service counters.
#[must_use]
pub fn render_prometheus(metrics: &ServiceMetrics, ready: bool) -> String {
    let labels = format!("{{subsystem=\"{METRIC_SUBSYSTEM}\",version=\"{METRIC_VERSION}\"}}");
    let latency = metrics
        .request_latency_ns
        .lock()
        .map(|window| window.clone())
        .unwrap_or_default();
    let mut body = String::new();
    for (name, value) in [
        (
            "scholaris_requests_total",
            metrics.requests_total.load(Ordering::Relaxed),
        ),
        (
            "scholaris_responses_2xx_total",
            metrics.responses_2xx.load(Ordering::Relaxed),
        ),
        (
            "scholaris_responses_4xx_total",
            metrics.responses_4xx.load(Ordering::Relaxed),
        ),
        (
            "scholaris_responses_5xx_total",
            metrics.responses_5xx.load(Ordering::Relaxed),
        ),
        (
            "scholaris_rejected_total",
            metrics.rejected_total.load(Ordering::Relaxed),
        ),
        (
            "scholaris_searches_total",
            metrics.searches_total.load(Ordering::Relaxed),
        ),
        (
            "scholaris_cluster_runs_total",
            metrics.cluster_runs_total.load(Ordering::Relaxed),
        ),
        (
            "scholaris_backend_errors_total",
            metrics.backend_errors_total.load(Ordering::Relaxed),
        ),
        ("scholaris_ready", u64::from(ready)),
        (
            "scholaris_request_latency_p50_ns",
            percentile_ns(&latency, 0.50),
        ),
        (
            "scholaris_request_latency_p99_ns",
            percentile_ns(&latency, 0.99),
        ),
    ] {
        body.push_str(name);
        body.push_str(&labels);
        body.push(' ');
        body.push_str(&value.to_string());
        body.push('\n');
    }
    body
}

/// Counts, times and logs every request, and tags the response with an
/// `x-request-id`.
pub async fn track_requests(
    State(state): State<AppState>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = state.metrics.next_request_id();
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);

    let started = Instant::now();
    let mut response = next.run(request).await;
    let elapsed = started.elapsed();

    let status = response.status().as_u16();
    state.metrics.record_status(status);
    state.metrics.record_latency(elapsed.as_nanos() as u64);
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    info!(
        %method,
        path = %path,
        status,
        latency_ms = elapsed.as_millis() as u64,
        request_id = %request_id,
        "request"
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentiles_on_empty_and_singleton_windows() {
        assert_eq!(percentile_ns(&[], 0.99), 0);
        assert_eq!(percentile_ns(&[7], 0.50), 7);
        assert_eq!(percentile_ns(&[1, 2, 3, 4], 0.99), 4);
    }

    #[test]
    fn exposition_carries_every_counter_once() {
        let metrics = ServiceMetrics::default();
        metrics.requests_total.store(3, Ordering::Relaxed);
        metrics.record_status(200);
        metrics.record_status(429);
        metrics.record_status(502);
        let body = render_prometheus(&metrics, true);
        assert!(body.contains("scholaris_requests_total{subsystem=\"scholaris\""));
        assert!(body.contains("scholaris_responses_2xx_total"));
        assert!(body.contains("scholaris_rejected_total"));
        assert!(body.contains("scholaris_ready{subsystem=\"scholaris\""));
        assert_eq!(body.lines().count(), 11);
    }

    #[test]
    fn latency_window_is_bounded() {
        let metrics = ServiceMetrics::default();
        for i in 0..(LATENCY_WINDOW + 10) {
            metrics.record_latency(i as u64);
        }
        let len = metrics.request_latency_ns.lock().map(|w| w.len()).unwrap_or(0);
        assert_eq!(len, LATENCY_WINDOW);
    }
}
