// SPDX-License-Identifier: Apache-2.0

//! Per-field embedding of cleaned articles into gzipped part files.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use scholaris_core::sha256_hex;
use scholaris_index::Embedder;

use crate::{DataLayout, IngestError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartRecord {
    pub file: String,
    pub sha256: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartManifest {
    pub parts: Vec<PartRecord>,
    pub total: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbedReport {
    pub parts_written: usize,
    pub articles: usize,
    pub skipped_existing: bool,
}

pub(crate) fn write_part(path: &Path, articles: &[Value]) -> Result<PartRecord, IngestError> {
    let payload = serde_json::to_vec(articles)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&payload)?;
    let compressed = encoder.finish()?;
    fs::write(path, &compressed)
        .map_err(|e| IngestError(format!("writing {}: {e}", path.display())))?;
    Ok(PartRecord {
        file: path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string(),
        sha256: sha256_hex(&compressed),
        count: articles.len(),
    })
}

/// Reads one gzipped part file back into article values.
pub fn read_part(path: &Path) -> Result<Vec<Value>, IngestError> {
    let compressed =
        fs::read(path).map_err(|e| IngestError(format!("reading {}: {e}", path.display())))?;
    let mut decoder = GzDecoder::new(compressed.as_slice());
    let mut payload = Vec::new();
    decoder.read_to_end(&mut payload)?;
    Ok(serde_json::from_slice(&payload)?)
}

pub(crate) fn write_manifest(path: &Path, manifest: &PartManifest) -> Result<(), IngestError> {
    let payload = serde_json::to_vec_pretty(manifest)?;
    fs::write(path, payload)
        .map_err(|e| IngestError(format!("writing {}: {e}", path.display())))?;
    Ok(())
}

async fn embed_in_batches(
    embedder: &dyn Embedder,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>, IngestError> {
    let mut vectors = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size.max(1)) {
        vectors.extend(embedder.embed(batch).await?);
    }
    Ok(vectors)
}

fn joined_keywords(article: &Value) -> String {
    match article.get("keywords") {
        Some(Value::Array(kws)) => kws
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(", "),
        Some(Value::String(kw)) => kw.clone(),
        _ => String::new(),
    }
}

fn vector_json(vector: &[f32]) -> Value {
    Value::Array(vector.iter().map(|v| Value::from(f64::from(*v))).collect())
}

/// Splits cleaned articles into `parts` slices, embeds title, abstract and
/// joined keywords per slice, and writes `enriched_part_<i>.json.gz` files
/// plus a checksum manifest. Existing parts make the stage a no-op.
pub async fn generate_enriched_parts(
    layout: &DataLayout,
    embedder: &dyn Embedder,
    articles: &[Value],
    parts: usize,
    batch_size: usize,
) -> Result<EmbedReport, IngestError> {
    let existing = DataLayout::existing_parts(&layout.enriched, "enriched_part_");
    if !existing.is_empty() {
        info!(parts = existing.len(), "enriched parts already present, skipping embedding");
        return Ok(EmbedReport {
            parts_written: 0,
            articles: 0,
            skipped_existing: true,
        });
    }
    if articles.is_empty() {
        return Err(IngestError("no cleaned articles to embed".to_string()));
    }

    let parts = parts.max(1);
    let step = articles.len().div_ceil(parts);
    let mut manifest = PartManifest::default();

    for (index, slice) in articles.chunks(step).enumerate() {
        let part_no = index + 1;
        info!(part = part_no, count = slice.len(), "embedding part");

        let titles: Vec<String> = slice
            .iter()
            .map(|a| a["title"].as_str().unwrap_or("").to_string())
            .collect();
        let abstracts: Vec<String> = slice
            .iter()
            .map(|a| a["abstract"].as_str().unwrap_or("").to_string())
            .collect();
        let keywords: Vec<String> = slice.iter().map(joined_keywords).collect();

        let title_vectors = embed_in_batches(embedder, &titles, batch_size).await?;
        let abstract_vectors = embed_in_batches(embedder, &abstracts, batch_size).await?;
        let keyword_vectors = embed_in_batches(embedder, &keywords, batch_size).await?;

        let enriched: Vec<Value> = slice
            .iter()
            .enumerate()
            .map(|(j, article)| {
                let mut doc = article.clone();
                doc["title_embedding"] = vector_json(&title_vectors[j]);
                doc["abstract_embedding"] = vector_json(&abstract_vectors[j]);
                doc["keywords_embedding"] = vector_json(&keyword_vectors[j]);
                doc
            })
            .collect();

        let path = layout.enriched_part(part_no);
        let record = write_part(&path, &enriched)?;
        manifest.total += record.count;
        manifest.parts.push(record);
    }

    write_manifest(&layout.enriched_manifest(), &manifest)?;
    info!(
        parts = manifest.parts.len(),
        articles = manifest.total,
        "wrote enriched parts and manifest"
    );
    Ok(EmbedReport {
        parts_written: manifest.parts.len(),
        articles: manifest.total,
        skipped_existing: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use scholaris_index::IndexError;
    use serde_json::json;

    struct ConstantEmbedder;

    #[async_trait]
    impl Embedder for ConstantEmbedder {
        fn embedder_tag(&self) -> &'static str {
            "constant"
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn articles(n: usize) -> Vec<Value> {
        (0..n)
            .map(|i| {
                json!({
                    "id": format!("pub-{i}"),
                    "title": format!("Title {i}"),
                    "abstract": "Some abstract",
                    "keywords": ["a", "b"]
                })
            })
            .collect()
    }

    #[test]
    fn parts_round_trip_through_gzip() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("part.json.gz");
        let docs = articles(3);
        let record = write_part(&path, &docs).expect("write part");
        assert_eq!(record.count, 3);
        assert_eq!(record.sha256.len(), 64);
        let loaded = read_part(&path).expect("read part");
        assert_eq!(loaded, docs);
    }

    #[tokio::test]
    async fn enriched_parts_cover_all_articles_and_skip_on_rerun() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let layout = DataLayout::new(tmp.path().join("data"));
        layout.ensure().expect("layout");

        let docs = articles(7);
        let report = generate_enriched_parts(&layout, &ConstantEmbedder, &docs, 3, 2)
            .await
            .expect("generate parts");
        assert_eq!(report.parts_written, 3);
        assert_eq!(report.articles, 7);
        assert!(!report.skipped_existing);

        let manifest: PartManifest = serde_json::from_slice(
            &std::fs::read(layout.enriched_manifest()).expect("manifest"),
        )
        .expect("manifest json");
        assert_eq!(manifest.total, 7);

        let first = read_part(&layout.enriched_part(1)).expect("read part");
        assert!(first[0]["title_embedding"].is_array());
        assert!(first[0]["abstract_embedding"].is_array());
        assert!(first[0]["keywords_embedding"].is_array());

        let rerun = generate_enriched_parts(&layout, &ConstantEmbedder, &docs, 3, 2)
            .await
            .expect("rerun");
        assert!(rerun.skipped_existing);
    }
}
