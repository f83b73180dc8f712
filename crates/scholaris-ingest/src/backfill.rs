// SPDX-License-Identifier: Apache-2.0

//! Backfills combined-content embeddings from the combined part files into
//! already-indexed articles.

use std::collections::BTreeSet;

use serde_json::{json, Value};
use tracing::info;

use scholaris_index::{
    bulk_body, combined_embedding_properties, BulkOp, EsClient, SCROLL_KEEP_ALIVE,
};
use scholaris_model::ARTICLE_INDEX;
use scholaris_query::lookups::exists_body;

use crate::{read_part, DataLayout, IngestError, UPDATE_BATCH};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub updated: usize,
    pub skipped_existing: bool,
}

async fn ensure_combined_mapping(client: &EsClient) -> Result<(), IngestError> {
    let mapping = client.get_mapping(ARTICLE_INDEX).await?;
    let has_field = mapping
        .pointer(&format!(
            "/{ARTICLE_INDEX}/mappings/properties/combined_embedding"
        ))
        .is_some();
    if !has_field {
        client
            .put_mapping(ARTICLE_INDEX, &combined_embedding_properties())
            .await?;
        info!("added combined embedding fields to the article mapping");
    }
    Ok(())
}

async fn ids_with_combined(client: &EsClient) -> Result<BTreeSet<String>, IngestError> {
    let mut body = exists_body("combined_embedding");
    body["_source"] = json!(["id"]);
    body["size"] = json!(10000);
    let hits = client
        .scroll_all(ARTICLE_INDEX, body, SCROLL_KEEP_ALIVE)
        .await?;
    Ok(hits
        .iter()
        .filter_map(|hit| hit.pointer("/_source/id").and_then(Value::as_str))
        .map(str::to_string)
        .collect())
}

/// Pushes combined_content and combined_embedding from the part files onto
/// every indexed article that does not have them yet.
pub async fn backfill_combined_embeddings(
    client: &EsClient,
    layout: &DataLayout,
) -> Result<BackfillReport, IngestError> {
    let total = client.count(ARTICLE_INDEX, None).await?;
    let covered = client
        .count(ARTICLE_INDEX, Some(&exists_body("combined_embedding")))
        .await
        .unwrap_or(0);
    if total > 0 && covered >= total {
        info!(total, "all articles already carry combined embeddings, skipping");
        return Ok(BackfillReport {
            skipped_existing: true,
            ..BackfillReport::default()
        });
    }

    let parts = DataLayout::existing_parts(&layout.combined, "combined_part_");
    if parts.is_empty() {
        return Err(IngestError(format!(
            "no combined parts found in {}",
            layout.combined.display()
        )));
    }

    ensure_combined_mapping(client).await?;
    let done = ids_with_combined(client).await?;
    info!(already = done.len(), total, "backfilling combined embeddings");

    let mut report = BackfillReport::default();
    for part_path in &parts {
        let articles = read_part(part_path)?;
        for batch in articles.chunks(UPDATE_BATCH) {
            let mut ops = Vec::new();
            for article in batch {
                let Some(id) = article.get("id").and_then(Value::as_str) else {
                    continue;
                };
                if done.contains(id) {
                    continue;
                }
                let (Some(content), Some(embedding)) = (
                    article.get("combined_content"),
                    article.get("combined_embedding"),
                ) else {
                    continue;
                };
                ops.push(BulkOp::Update {
                    index: ARTICLE_INDEX.to_string(),
                    id: id.to_string(),
                    doc: json!({
                        "combined_content": content,
                        "combined_embedding": embedding
                    }),
                });
            }
            if ops.is_empty() {
                continue;
            }
            let response = client.bulk(bulk_body(&ops)?, None).await?;
            report.updated += response.accepted(|status| status < 300);
        }
    }

    client.refresh(ARTICLE_INDEX).await?;
    info!(updated = report.updated, "combined embedding backfill finished");
    Ok(report)
}
