// SPDX-License-Identifier: Apache-2.0

//! Bulk indexing of enriched articles and cleaned authors.

use serde_json::Value;
use tracing::{info, warn};

use scholaris_index::{bulk_body, BulkOp, EsClient};
use scholaris_model::{ARTICLE_INDEX, AUTHOR_INDEX};

use crate::{read_part, DataLayout, IngestError, INDEX_BATCH};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexingReport {
    pub indexed: usize,
    pub failed: usize,
    pub duplicates: usize,
    pub skipped_existing: bool,
}

async fn bulk_index_docs(
    client: &EsClient,
    index: &str,
    docs: &[Value],
    batch_size: usize,
) -> Result<IndexingReport, IngestError> {
    let mut report = IndexingReport::default();
    let mut seen = std::collections::BTreeSet::new();

    for batch in docs.chunks(batch_size.max(1)) {
        let mut ops = Vec::with_capacity(batch.len());
        for doc in batch {
            let Some(id) = doc.get("id").and_then(Value::as_str) else {
                warn!("skipping document without id");
                continue;
            };
            if !seen.insert(id.to_string()) {
                report.duplicates += 1;
                continue;
            }
            ops.push(BulkOp::Index {
                index: index.to_string(),
                id: id.to_string(),
                doc: doc.clone(),
            });
        }
        if ops.is_empty() {
            continue;
        }
        let response = client.bulk(bulk_body(&ops)?, Some("wait_for")).await?;
        let accepted = response.accepted(|status| status < 300);
        report.indexed += accepted;
        report.failed += ops.len() - accepted;
    }

    client.refresh(index).await?;
    Ok(report)
}

/// Streams every enriched part into the article index. Already-populated
/// indices short-circuit the stage.
pub async fn index_articles_from_parts(
    client: &EsClient,
    layout: &DataLayout,
) -> Result<IndexingReport, IngestError> {
    let existing = client.count(ARTICLE_INDEX, None).await.unwrap_or(0);
    if existing > 0 {
        info!(count = existing, "articles already indexed, skipping");
        return Ok(IndexingReport {
            skipped_existing: true,
            ..IndexingReport::default()
        });
    }

    let parts = DataLayout::existing_parts(&layout.enriched, "enriched_part_");
    if parts.is_empty() {
        return Err(IngestError(format!(
            "no enriched parts found in {}",
            layout.enriched.display()
        )));
    }

    let mut report = IndexingReport::default();
    for part_path in &parts {
        let articles = read_part(part_path)?;
        info!(part = %part_path.display(), count = articles.len(), "indexing articles");
        let part_report = bulk_index_docs(client, ARTICLE_INDEX, &articles, INDEX_BATCH).await?;
        report.indexed += part_report.indexed;
        report.failed += part_report.failed;
        report.duplicates += part_report.duplicates;
    }
    info!(
        indexed = report.indexed,
        failed = report.failed,
        duplicates = report.duplicates,
        "article indexing finished"
    );
    Ok(report)
}

/// Bulk-indexes cleaned authors, deduplicated on id. An already-populated
/// author index short-circuits the stage.
pub async fn index_authors(
    client: &EsClient,
    authors: &[Value],
) -> Result<IndexingReport, IngestError> {
    let existing = client.count(AUTHOR_INDEX, None).await.unwrap_or(0);
    if existing > 0 {
        info!(count = existing, "authors already indexed, skipping");
        return Ok(IndexingReport {
            skipped_existing: true,
            ..IndexingReport::default()
        });
    }

    let report = bulk_index_docs(client, AUTHOR_INDEX, authors, INDEX_BATCH).await?;
    info!(
        indexed = report.indexed,
        failed = report.failed,
        duplicates = report.duplicates,
        "author indexing finished"
    );
    Ok(report)
}
