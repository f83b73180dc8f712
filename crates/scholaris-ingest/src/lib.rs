// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

mod backfill;
mod clean;
mod combined;
mod denormalize;
mod embed;
mod enrich;
mod indexing;
mod layout;
mod pipeline;
mod wait;

use std::fmt::{Display, Formatter};

use scholaris_index::IndexError;

pub const CRATE_NAME: &str = "scholaris-ingest";

pub use backfill::{backfill_combined_embeddings, BackfillReport};
pub use clean::{clean_articles, clean_authors, normalize_latex, CleanOutcome};
pub use combined::{combined_content, generate_combined_parts};
pub use denormalize::{denormalize_articles, DenormalizeReport};
pub use embed::{generate_enriched_parts, read_part, EmbedReport, PartManifest, PartRecord};
pub use enrich::{enrich_authors, EnrichReport};
pub use indexing::{index_articles_from_parts, index_authors, IndexingReport};
pub use layout::DataLayout;
pub use pipeline::{run_init, InitOptions, PipelineReport, StageOutcome};
pub use wait::wait_for_elasticsearch;

/// Batch of texts per embedder call.
pub const EMBED_BATCH: usize = 64;
/// Enriched and combined part files per corpus.
pub const DEFAULT_PARTS: usize = 5;
/// Articles or authors per `_bulk` request.
pub const INDEX_BATCH: usize = 500;
/// Author publication updates per `_bulk` request.
pub const ENRICH_BATCH: usize = 100;
/// Article updates per `_bulk` request in denormalization and backfill.
pub const UPDATE_BATCH: usize = 200;

#[derive(Debug)]
pub struct IngestError(pub String);

impl Display for IngestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for IngestError {}

impl From<IndexError> for IngestError {
    fn from(error: IndexError) -> Self {
        Self(error.to_string())
    }
}

impl From<std::io::Error> for IngestError {
    fn from(error: std::io::Error) -> Self {
        Self(format!("io error: {error}"))
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(error: serde_json::Error) -> Self {
        Self(format!("json error: {error}"))
    }
}
