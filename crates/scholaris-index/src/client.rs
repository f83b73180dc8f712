// SPDX-License-Identifier: Apache-2.0
//! Asynchronous Elasticsearch REST client.
//!
//! Reads retry with linear backoff; writes and scroll continuations go
//! out exactly once. Scroll continuations must not be replayed because
//! the server advances the cursor on every request it serves.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Method, StatusCode};
use serde_json::{json, Value};
use tracing::instrument;

use crate::{IndexError, IndexErrorCode, IndexStats, SearchBackend};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Scroll context lifetime used by the interactive query paths.
pub const SCROLL_KEEP_ALIVE: &str = "2m";

const SCROLL_PATH: &str = "/_search/scroll";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_backoff_ms: 120,
        }
    }
}

#[derive(Clone)]
pub struct EsClient {
    base_url: String,
    client: Client,
    retry: RetryPolicy,
}

impl EsClient {
    pub fn new(base_url: &str) -> Result<Self, IndexError> {
        let parsed = reqwest::Url::parse(base_url).map_err(|e| {
            IndexError::new(
                IndexErrorCode::Validation,
                format!("invalid elasticsearch url: {e}"),
            )
        })?;
        if parsed.host_str().is_none() {
            return Err(IndexError::new(
                IndexErrorCode::Validation,
                "elasticsearch url is missing a host",
            ));
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_else(|_| Client::new()),
            retry: RetryPolicy::default(),
        })
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    #[instrument(name = "es_read_with_retry", skip(self, body))]
    async fn read_with_retry(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value, IndexError> {
        let url = self.url(path);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut request = self.client.request(method.clone(), &url).query(query);
            if let Some(body) = body {
                request = request.json(body);
            }
            match request.send().await {
                Ok(resp) if resp.status() == StatusCode::NOT_FOUND => {
                    return Err(IndexError::new(
                        IndexErrorCode::NotFound,
                        format!("{path} returned 404"),
                    ));
                }
                Ok(resp) if resp.status().is_success() => {
                    return resp.json::<Value>().await.map_err(|e| {
                        IndexError::new(
                            IndexErrorCode::Upstream,
                            format!("unreadable response from {path}: {e}"),
                        )
                    });
                }
                Ok(resp) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(IndexError::new(
                            IndexErrorCode::Upstream,
                            format!("{path} failed with status {}", resp.status()),
                        ));
                    }
                }
                Err(e) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(IndexError::new(
                            IndexErrorCode::Network,
                            format!("{path} request failed: {e}"),
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

    async fn send_once(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<(StatusCode, Value), IndexError> {
        let mut request = self.client.request(method, self.url(path)).query(query);
        if let Some(body) = body {
            request = request.json(body);
        }
        let resp = request.send().await.map_err(|e| {
            IndexError::new(
                IndexErrorCode::Network,
                format!("{path} request failed: {e}"),
            )
        })?;
        let status = resp.status();
        let value = resp.json::<Value>().await.unwrap_or(Value::Null);
        Ok((status, value))
    }

    pub async fn ping(&self) -> bool {
        match self.client.get(self.url("/")).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    pub async fn count(&self, index: &str, body: Option<&Value>) -> Result<u64, IndexError> {
        let path = format!("/{index}/_count");
        let value = self.read_with_retry(Method::POST, &path, &[], body).await?;
        value.get("count").and_then(Value::as_u64).ok_or_else(|| {
            IndexError::new(
                IndexErrorCode::Upstream,
                format!("count response for {index} carries no count"),
            )
        })
    }

    pub async fn search(&self, index: &str, body: &Value) -> Result<Value, IndexError> {
        self.read_with_retry(Method::POST, &format!("/{index}/_search"), &[], Some(body))
            .await
    }

    pub async fn search_scroll_start(
        &self,
        index: &str,
        body: &Value,
        keep_alive: &str,
    ) -> Result<Value, IndexError> {
        self.read_with_retry(
            Method::POST,
            &format!("/{index}/_search"),
            &[("scroll", keep_alive)],
            Some(body),
        )
        .await
    }

    async fn scroll_next(&self, scroll_id: &str, keep_alive: &str) -> Result<Value, IndexError> {
        let body = json!({"scroll": keep_alive, "scroll_id": scroll_id});
        let (status, value) = self
            .send_once(Method::POST, SCROLL_PATH, &[], Some(&body))
            .await?;
        if !status.is_success() {
            return Err(IndexError::new(
                IndexErrorCode::Upstream,
                format!("scroll continuation failed with status {status}"),
            ));
        }
        Ok(value)
    }

    pub async fn clear_scroll(&self, scroll_id: &str) -> Result<(), IndexError> {
        let body = json!({"scroll_id": [scroll_id]});
        let (status, _) = self
            .send_once(Method::DELETE, SCROLL_PATH, &[], Some(&body))
            .await?;
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(IndexError::new(
                IndexErrorCode::Upstream,
                format!("clear scroll failed with status {status}"),
            ))
        }
    }

    /// Drains a scroll and returns every hit object. The context is
    /// cleared on both success and failure; cleanup problems are logged
    /// and swallowed since the context expires on its own.
    pub async fn scroll_all(
        &self,
        index: &str,
        body: Value,
        keep_alive: &str,
    ) -> Result<Vec<Value>, IndexError> {
        let first = self.search_scroll_start(index, &body, keep_alive).await?;
        let Some(mut scroll_id) = first
            .get("_scroll_id")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
        else {
            return Ok(page_hits(&first));
        };

        let mut collected = Vec::new();
        let mut page = page_hits(&first);
        while !page.is_empty() {
            collected.append(&mut page);
            let next = match self.scroll_next(&scroll_id, keep_alive).await {
                Ok(next) => next,
                Err(error) => {
                    self.clear_scroll_quietly(&scroll_id).await;
                    return Err(error);
                }
            };
            if let Some(sid) = next.get("_scroll_id").and_then(Value::as_str) {
                scroll_id = sid.to_owned();
            }
            page = page_hits(&next);
        }
        self.clear_scroll_quietly(&scroll_id).await;
        Ok(collected)
    }

    async fn clear_scroll_quietly(&self, scroll_id: &str) {
        if let Err(error) = self.clear_scroll(scroll_id).await {
            tracing::debug!(%error, "scroll cleanup failed");
        }
    }

    pub async fn get_doc(&self, index: &str, id: &str) -> Result<Option<Value>, IndexError> {
        let path = format!("/{index}/_doc/{id}");
        match self.read_with_retry(Method::GET, &path, &[], None).await {
            Ok(value) => {
                if value.get("found").and_then(Value::as_bool) == Some(true) {
                    Ok(Some(value.get("_source").cloned().unwrap_or_else(|| json!({}))))
                } else {
                    Ok(None)
                }
            }
            Err(error) if error.code == IndexErrorCode::NotFound => Ok(None),
            Err(error) => Err(error),
        }
    }

    pub async fn mget(&self, index: &str, ids: &[String]) -> Result<Vec<Value>, IndexError> {
        let body = json!({"ids": ids});
        let value = self
            .read_with_retry(Method::POST, &format!("/{index}/_mget"), &[], Some(&body))
            .await?;
        Ok(value
            .get("docs")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    pub async fn bulk(&self, ndjson: String, refresh: Option<&str>) -> Result<BulkResponse, IndexError> {
        let mut request = self
            .client
            .post(self.url("/_bulk"))
            .header(header::CONTENT_TYPE, "application/x-ndjson")
            .body(ndjson);
        if let Some(refresh) = refresh {
            request = request.query(&[("refresh", refresh)]);
        }
        let resp = request.send().await.map_err(|e| {
            IndexError::new(IndexErrorCode::Network, format!("bulk request failed: {e}"))
        })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(IndexError::new(
                IndexErrorCode::Upstream,
                format!("bulk failed with status {status}"),
            ));
        }
        let value: Value = resp.json().await.map_err(|e| {
            IndexError::new(
                IndexErrorCode::Upstream,
                format!("unreadable bulk response: {e}"),
            )
        })?;
        Ok(BulkResponse::from_value(&value))
    }

    pub async fn put_index(&self, index: &str, body: &Value) -> Result<(), IndexError> {
        let (status, reply) = self
            .send_once(Method::PUT, &format!("/{index}"), &[], Some(body))
            .await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(IndexError::new(
                IndexErrorCode::Upstream,
                format!("creating index {index} failed with status {status}: {reply}"),
            ))
        }
    }

    /// True when the index was present and is now gone.
    pub async fn delete_index(&self, index: &str) -> Result<bool, IndexError> {
        let (status, _) = self
            .send_once(Method::DELETE, &format!("/{index}"), &[], None)
            .await?;
        match status {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(IndexError::new(
                IndexErrorCode::Upstream,
                format!("deleting index {index} failed with status {s}"),
            )),
        }
    }

    pub async fn index_exists(&self, index: &str) -> Result<bool, IndexError> {
        let resp = self
            .client
            .head(self.url(&format!("/{index}")))
            .send()
            .await
            .map_err(|e| {
                IndexError::new(
                    IndexErrorCode::Network,
                    format!("index probe failed: {e}"),
                )
            })?;
        match resp.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(IndexError::new(
                IndexErrorCode::Upstream,
                format!("index probe for {index} failed with status {s}"),
            )),
        }
    }

    pub async fn refresh(&self, index: &str) -> Result<(), IndexError> {
        let (status, _) = self
            .send_once(Method::POST, &format!("/{index}/_refresh"), &[], None)
            .await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(IndexError::new(
                IndexErrorCode::Upstream,
                format!("refresh of {index} failed with status {status}"),
            ))
        }
    }

    pub async fn get_mapping(&self, index: &str) -> Result<Value, IndexError> {
        self.read_with_retry(Method::GET, &format!("/{index}/_mapping"), &[], None)
            .await
    }

    pub async fn put_mapping(&self, index: &str, properties: &Value) -> Result<(), IndexError> {
        let (status, reply) = self
            .send_once(Method::PUT, &format!("/{index}/_mapping"), &[], Some(properties))
            .await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(IndexError::new(
                IndexErrorCode::Upstream,
                format!("mapping update on {index} failed with status {status}: {reply}"),
            ))
        }
    }

    pub async fn update_doc(
        &self,
        index: &str,
        id: &str,
        doc: &Value,
        refresh: Option<&str>,
    ) -> Result<(), IndexError> {
        let body = json!({"doc": doc});
        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(refresh) = refresh {
            query.push(("refresh", refresh));
        }
        let (status, reply) = self
            .send_once(Method::POST, &format!("/{index}/_update/{id}"), &query, Some(&body))
            .await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(IndexError::new(
                IndexErrorCode::Upstream,
                format!("update of {index}/{id} failed with status {status}: {reply}"),
            ))
        }
    }

    pub async fn index_stats(&self, index: &str) -> Result<IndexStats, IndexError> {
        let stats = self
            .read_with_retry(Method::GET, &format!("/{index}/_stats"), &[], None)
            .await?;
        let mapping = self.get_mapping(index).await?;

        let primaries = &stats["_all"]["primaries"];
        Ok(IndexStats {
            index_name: index.to_owned(),
            doc_count: primaries["docs"]["count"].as_u64().unwrap_or(0),
            deleted_docs: primaries["docs"]["deleted"].as_u64().unwrap_or(0),
            size_bytes: primaries["store"]["size_in_bytes"].as_u64().unwrap_or(0),
            field_count: mapped_field_count(&mapping, index),
            shard_count: stats["_shards"]["total"].as_u64().unwrap_or(0),
        })
    }
}

#[async_trait]
impl SearchBackend for EsClient {
    fn backend_tag(&self) -> &'static str {
        "elasticsearch"
    }

    async fn ping(&self) -> bool {
        Self::ping(self).await
    }

    async fn count(&self, index: &str, body: Option<&Value>) -> Result<u64, IndexError> {
        Self::count(self, index, body).await
    }

    async fn search(&self, index: &str, body: &Value) -> Result<Value, IndexError> {
        Self::search(self, index, body).await
    }

    async fn scroll_all(
        &self,
        index: &str,
        body: Value,
        keep_alive: &str,
    ) -> Result<Vec<Value>, IndexError> {
        Self::scroll_all(self, index, body, keep_alive).await
    }

    async fn get_doc(&self, index: &str, id: &str) -> Result<Option<Value>, IndexError> {
        Self::get_doc(self, index, id).await
    }

    async fn mget(&self, index: &str, ids: &[String]) -> Result<Vec<Value>, IndexError> {
        Self::mget(self, index, ids).await
    }

    async fn get_mapping(&self, index: &str) -> Result<Value, IndexError> {
        Self::get_mapping(self, index).await
    }

    async fn index_exists(&self, index: &str) -> Result<bool, IndexError> {
        Self::index_exists(self, index).await
    }

    async fn index_stats(&self, index: &str) -> Result<IndexStats, IndexError> {
        Self::index_stats(self, index).await
    }
}

/// One line pair in a `_bulk` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkOp {
    Index { index: String, id: String, doc: Value },
    Update { index: String, id: String, doc: Value },
}

/// Newline-delimited `_bulk` body for the given operations.
pub fn bulk_body(ops: &[BulkOp]) -> Result<String, IndexError> {
    let mut out = String::new();
    for op in ops {
        let (action, payload) = match op {
            BulkOp::Index { index, id, doc } => {
                (json!({"index": {"_index": index, "_id": id}}), doc.clone())
            }
            BulkOp::Update { index, id, doc } => (
                json!({"update": {"_index": index, "_id": id}}),
                json!({"doc": doc}),
            ),
        };
        let action = serde_json::to_string(&action).map_err(|e| {
            IndexError::new(IndexErrorCode::Internal, format!("bulk action encode: {e}"))
        })?;
        let payload = serde_json::to_string(&payload).map_err(|e| {
            IndexError::new(IndexErrorCode::Internal, format!("bulk payload encode: {e}"))
        })?;
        out.push_str(&action);
        out.push('\n');
        out.push_str(&payload);
        out.push('\n');
    }
    Ok(out)
}

/// Outcome of a `_bulk` call with one HTTP status per item, in request
/// order. Callers decide which statuses count as accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkResponse {
    pub errors: bool,
    pub statuses: Vec<u16>,
}

impl BulkResponse {
    fn from_value(value: &Value) -> Self {
        let errors = value.get("errors").and_then(Value::as_bool).unwrap_or(false);
        let statuses = value
            .get("items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        item.as_object()
                            .and_then(|entry| entry.values().next())
                            .and_then(|op| op.get("status"))
                            .and_then(Value::as_u64)
                            .map(|status| status as u16)
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self { errors, statuses }
    }

    /// Items whose status satisfies the caller's acceptance rule.
    #[must_use]
    pub fn accepted(&self, accept: impl Fn(u16) -> bool) -> usize {
        self.statuses.iter().filter(|s| accept(**s)).count()
    }
}

fn page_hits(response: &Value) -> Vec<Value> {
    response["hits"]["hits"]
        .as_array()
        .cloned()
        .unwrap_or_default()
}

fn mapped_field_count(mapping: &Value, index: &str) -> usize {
    let entry = mapping
        .get(index)
        .or_else(|| mapping.as_object().and_then(|m| m.values().next()));
    entry
        .and_then(|e| e.get("mappings"))
        .and_then(|m| m.get("properties"))
        .and_then(Value::as_object)
        .map_or(0, |properties| properties.len())
}
