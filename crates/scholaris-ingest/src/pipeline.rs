// SPDX-License-Identifier: Apache-2.0

//! Full initialization pipeline: layout, readiness, cleaning, embedding,
//! indices, indexing, enrichment, denormalization and embedding backfill.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{info, warn};

use scholaris_index::{ensure_indices, Embedder, EsClient};

use crate::backfill::backfill_combined_embeddings;
use crate::wait::{WAIT_INTERVAL, WAIT_TIMEOUT};
use crate::{
    clean_articles, clean_authors, enrich_authors, generate_combined_parts,
    generate_enriched_parts, index_articles_from_parts, index_authors, wait_for_elasticsearch,
    DataLayout, IngestError, DEFAULT_PARTS, EMBED_BATCH,
};

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub data_dir: PathBuf,
    pub parts: usize,
    pub batch_size: usize,
    pub recreate_indices: bool,
    pub skip_embeddings: bool,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            parts: DEFAULT_PARTS,
            batch_size: EMBED_BATCH,
            recreate_indices: false,
            skip_embeddings: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    pub stage: &'static str,
    pub summary: String,
    pub skipped: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub stages: Vec<StageOutcome>,
}

impl PipelineReport {
    fn record(&mut self, stage: &'static str, summary: impl Into<String>, skipped: bool) {
        let summary = summary.into();
        info!(stage, %summary, skipped, "pipeline stage finished");
        self.stages.push(StageOutcome {
            stage,
            summary,
            skipped,
        });
    }
}

fn load_json_array(path: &Path) -> Result<Vec<Value>, IngestError> {
    let payload = fs::read(path).map_err(|e| {
        IngestError(format!(
            "missing raw export {} (run the harvester first): {e}",
            path.display()
        ))
    })?;
    let value: Value = serde_json::from_slice(&payload)?;
    value
        .as_array()
        .cloned()
        .ok_or_else(|| IngestError(format!("{} is not a JSON array", path.display())))
}

fn write_json(path: &Path, records: &[Value]) -> Result<(), IngestError> {
    let payload = serde_json::to_vec_pretty(records)?;
    fs::write(path, payload)
        .map_err(|e| IngestError(format!("writing {}: {e}", path.display())))?;
    Ok(())
}

fn read_cleaned(path: &Path) -> Result<Vec<Value>, IngestError> {
    let payload =
        fs::read(path).map_err(|e| IngestError(format!("reading {}: {e}", path.display())))?;
    Ok(serde_json::from_slice(&payload)?)
}

/// Runs stages 1 through 10 in order. Every stage is idempotent, so a
/// failed run can simply be re-run.
pub async fn run_init(
    options: &InitOptions,
    client: &EsClient,
    embedder: Option<&dyn Embedder>,
) -> Result<PipelineReport, IngestError> {
    let mut report = PipelineReport::default();
    let layout = DataLayout::new(&options.data_dir);

    layout.ensure()?;
    report.record("layout", format!("directories under {}", layout.root.display()), false);

    wait_for_elasticsearch(client, WAIT_TIMEOUT, WAIT_INTERVAL).await?;
    report.record("wait", "elasticsearch reachable", false);

    // Clean articles and authors, reusing prior outputs when present.
    let cleaned_articles = if layout.cleaned_articles().is_file() {
        let records = read_cleaned(&layout.cleaned_articles())?;
        report.record("clean", format!("{} articles (cached)", records.len()), true);
        records
    } else {
        let raw = load_json_array(&layout.raw_articles())?;
        let outcome = clean_articles(&raw);
        write_json(&layout.cleaned_articles(), &outcome.records)?;
        report.record(
            "clean",
            format!("{} articles, {} skipped", outcome.records.len(), outcome.skipped),
            false,
        );
        outcome.records
    };

    let cleaned_authors = if layout.cleaned_authors().is_file() {
        read_cleaned(&layout.cleaned_authors())?
    } else {
        let raw = load_json_array(&layout.raw_authors())?;
        let outcome = clean_authors(&raw);
        write_json(&layout.cleaned_authors(), &outcome.records)?;
        outcome.records
    };

    if options.skip_embeddings || embedder.is_none() {
        if embedder.is_none() && !options.skip_embeddings {
            warn!("no embedder configured, skipping embedding stages");
        }
        report.record("embed", "skipped", true);
        report.record("combined", "skipped", true);
    } else if let Some(embedder) = embedder {
        let embed = generate_enriched_parts(
            &layout,
            embedder,
            &cleaned_articles,
            options.parts,
            options.batch_size,
        )
        .await?;
        report.record(
            "embed",
            format!("{} parts, {} articles", embed.parts_written, embed.articles),
            embed.skipped_existing,
        );

        let combined = generate_combined_parts(&layout, embedder, options.batch_size).await?;
        report.record(
            "combined",
            format!("{} parts, {} articles", combined.parts_written, combined.articles),
            combined.skipped_existing,
        );
    }

    let created = ensure_indices(client, options.recreate_indices).await?;
    report.record(
        "indices",
        if created.is_empty() {
            "all indices present".to_string()
        } else {
            format!("created {}", created.join(", "))
        },
        created.is_empty(),
    );

    let articles = index_articles_from_parts(client, &layout).await?;
    report.record(
        "index_articles",
        format!(
            "{} indexed, {} failed, {} duplicates",
            articles.indexed, articles.failed, articles.duplicates
        ),
        articles.skipped_existing,
    );

    let authors = index_authors(client, &cleaned_authors).await?;
    report.record(
        "index_authors",
        format!(
            "{} indexed, {} failed, {} duplicates",
            authors.indexed, authors.failed, authors.duplicates
        ),
        authors.skipped_existing,
    );

    let enriched = enrich_authors(client).await?;
    report.record(
        "enrich_authors",
        format!("{} authors updated", enriched.updated),
        enriched.skipped_existing,
    );

    let denorm = crate::denormalize_articles(client).await?;
    report.record(
        "denormalize",
        format!("{} processed, {} updated", denorm.processed, denorm.updated),
        denorm.skipped_existing,
    );

    if options.skip_embeddings || embedder.is_none() {
        report.record("combined_backfill", "skipped", true);
    } else {
        let backfill = backfill_combined_embeddings(client, &layout).await?;
        report.record(
            "combined_backfill",
            format!("{} articles updated", backfill.updated),
            backfill.skipped_existing,
        );
    }

    Ok(report)
}
