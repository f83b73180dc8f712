// SPDX-License-Identifier: Apache-2.0

//! Author enrichment: each author document gains the list of publication
//! ids that reference them.

use serde_json::{json, Value};
use tracing::{info, warn};

use scholaris_index::{bulk_body, BulkOp, EsClient, SCROLL_KEEP_ALIVE};
use scholaris_model::{AuthorId, ARTICLE_INDEX, AUTHOR_INDEX};
use scholaris_query::lookups::{author_pub_ids_body, exists_body};

use crate::{IngestError, ENRICH_BATCH};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichReport {
    pub updated: usize,
    pub skipped_existing: bool,
}

/// Whether any author already carries a publications list.
async fn already_enriched(client: &EsClient) -> bool {
    client
        .count(AUTHOR_INDEX, Some(&exists_body("publications")))
        .await
        .map(|count| count > 0)
        .unwrap_or(false)
}

/// Scrolls every author, resolves their publication ids via a term lookup
/// on the article index, and bulk-updates in batches. Skips entirely when
/// a probe shows authors already enriched.
pub async fn enrich_authors(client: &EsClient) -> Result<EnrichReport, IngestError> {
    if already_enriched(client).await {
        info!("authors already carry publications, skipping enrichment");
        return Ok(EnrichReport {
            updated: 0,
            skipped_existing: true,
        });
    }

    let author_count = client.count(AUTHOR_INDEX, None).await?;
    let article_count = client.count(ARTICLE_INDEX, None).await?;
    if author_count == 0 || article_count == 0 {
        return Err(IngestError(format!(
            "indices not populated: authors={author_count}, articles={article_count}"
        )));
    }

    let authors = client
        .scroll_all(
            AUTHOR_INDEX,
            json!({"query": {"match_all": {}}, "_source": ["id"], "size": 1000}),
            SCROLL_KEEP_ALIVE,
        )
        .await?;

    let mut report = EnrichReport::default();
    for batch in authors.chunks(ENRICH_BATCH) {
        let mut ops = Vec::new();
        for hit in batch {
            let Some(raw_id) = hit.pointer("/_source/id").and_then(Value::as_str) else {
                continue;
            };
            let Ok(author_id) = AuthorId::parse(raw_id) else {
                warn!(author = raw_id, "skipping author with unusable id");
                continue;
            };
            let response = client
                .search(ARTICLE_INDEX, &author_pub_ids_body(&author_id))
                .await?;
            let publication_ids: Vec<String> = response["hits"]["hits"]
                .as_array()
                .map(|hits| {
                    hits.iter()
                        .filter_map(|h| h.pointer("/_source/id").and_then(Value::as_str))
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            if publication_ids.is_empty() {
                continue;
            }
            ops.push(BulkOp::Update {
                index: AUTHOR_INDEX.to_string(),
                id: author_id.as_str().to_string(),
                doc: json!({"publications": publication_ids}),
            });
        }
        if ops.is_empty() {
            continue;
        }
        let response = client.bulk(bulk_body(&ops)?, Some("true")).await?;
        let accepted = response.accepted(|status| status < 300);
        report.updated += accepted;
        info!(batch = ops.len(), accepted, "enriched author batch");
    }

    info!(updated = report.updated, "author enrichment finished");
    Ok(report)
}
