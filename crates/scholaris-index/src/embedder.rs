//! Text embedding over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::instrument;

use crate::{IndexError, IndexErrorCode, RetryPolicy};
use scholaris_model::EMBEDDING_DIM;

/// Prefix the multilingual-e5 family expects on query-side texts.
/// Documents are embedded without it.
pub const QUERY_EMBED_PREFIX: &str = "query: ";

const EMBED_TIMEOUT: Duration = Duration::from_secs(120);

#[async_trait]
pub trait Embedder: Send + Sync {
    fn embedder_tag(&self) -> &'static str;

    /// One normalized vector per input text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexError>;
}

pub struct HttpEmbedder {
    base_url: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpEmbedder {
    pub fn new(base_url: &str) -> Result<Self, IndexError> {
        let parsed = reqwest::Url::parse(base_url).map_err(|e| {
            IndexError::new(
                IndexErrorCode::Validation,
                format!("invalid embedder url: {e}"),
            )
        })?;
        if parsed.host_str().is_none() {
            return Err(IndexError::new(
                IndexErrorCode::Validation,
                "embedder url is missing a host",
            ));
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            client: reqwest::Client::builder()
                .timeout(EMBED_TIMEOUT)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            retry: RetryPolicy::default(),
        })
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[instrument(name = "embed_with_retry", skip(self, texts), fields(text_count = texts.len()))]
    async fn request_embeddings(&self, texts: &[String]) -> Result<Value, IndexError> {
        let url = format!("{}/embed", self.base_url);
        let body = json!({"inputs": texts});
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.post(&url).json(&body).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return resp.json::<Value>().await.map_err(|e| {
                        IndexError::new(
                            IndexErrorCode::Upstream,
                            format!("unreadable embedder response: {e}"),
                        )
                    });
                }
                Ok(resp) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(IndexError::new(
                            IndexErrorCode::Upstream,
                            format!("embedder failed with status {}", resp.status()),
                        ));
                    }
                }
                Err(e) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(IndexError::new(
                            IndexErrorCode::Network,
                            format!("embedder request failed: {e}"),
                        ));
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(
                self.retry.base_backoff_ms.saturating_mul(attempt as u64),
            ))
            .await;
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn embedder_tag(&self) -> &'static str {
        "http"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let reply = self.request_embeddings(texts).await?;
        let rows = reply
            .get("embeddings")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                IndexError::new(
                    IndexErrorCode::Upstream,
                    "embedder reply carries no embeddings array",
                )
            })?;
        if rows.len() != texts.len() {
            return Err(IndexError::new(
                IndexErrorCode::Upstream,
                format!(
                    "embedder returned {} vectors for {} texts",
                    rows.len(),
                    texts.len()
                ),
            ));
        }
        rows.iter().map(parse_vector).collect()
    }
}

fn parse_vector(row: &Value) -> Result<Vec<f32>, IndexError> {
    let values = row.as_array().ok_or_else(|| {
        IndexError::new(IndexErrorCode::Upstream, "embedding row is not an array")
    })?;
    if values.len() != EMBEDDING_DIM {
        return Err(IndexError::new(
            IndexErrorCode::Validation,
            format!(
                "embedding has {} dimensions, expected {EMBEDDING_DIM}",
                values.len()
            ),
        ));
    }
    let mut vector = Vec::with_capacity(values.len());
    for value in values {
        let component = value.as_f64().ok_or_else(|| {
            IndexError::new(IndexErrorCode::Upstream, "non-numeric embedding component")
        })?;
        if !component.is_finite() {
            return Err(IndexError::new(
                IndexErrorCode::Validation,
                "embedding carries a non-finite component",
            ));
        }
        vector.push(component as f32);
    }
    Ok(normalize(vector))
}

fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|v| f64::from(*v) * f64::from(*v)).sum::<f64>().sqrt();
    if norm > 0.0 {
        for component in &mut vector {
            *component = (f64::from(*component) / norm) as f32;
        }
    }
    vector
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_yields_unit_vectors_and_keeps_zeros() {
        let unit = normalize(vec![3.0, 4.0]);
        assert!((unit[0] - 0.6).abs() < 1e-6);
        assert!((unit[1] - 0.8).abs() < 1e-6);
        assert_eq!(normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn parse_vector_rejects_wrong_dimensions() {
        let short = json!([0.1, 0.2, 0.3]);
        let error = parse_vector(&short).unwrap_err();
        assert_eq!(error.code, IndexErrorCode::Validation);

        let mut full = vec![0.0f64; EMBEDDING_DIM];
        full[0] = 1.0;
        let parsed = parse_vector(&json!(full)).unwrap();
        assert_eq!(parsed.len(), EMBEDDING_DIM);
        assert!((parsed[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn parse_vector_rejects_non_finite_components() {
        let mut row = vec![json!(0.1); EMBEDDING_DIM];
        row[7] = json!("NaN");
        let error = parse_vector(&Value::Array(row)).unwrap_err();
        assert_eq!(error.code, IndexErrorCode::Upstream);
    }
}
