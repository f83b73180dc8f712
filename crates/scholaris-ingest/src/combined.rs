// SPDX-License-Identifier: Apache-2.0

//! Combined-content embeddings built from the enriched part files.

use serde_json::Value;
use tracing::info;

use scholaris_index::Embedder;

use crate::embed::{write_manifest, write_part, EmbedReport, PartManifest};
use crate::{read_part, DataLayout, IngestError};

/// Title, abstract and keywords joined into one searchable text.
#[must_use]
pub fn combined_content(article: &Value) -> String {
    let mut text = String::new();
    if let Some(title) = article.get("title").and_then(Value::as_str) {
        if !title.is_empty() {
            text.push_str(title);
            text.push(' ');
        }
    }
    if let Some(abstract_text) = article.get("abstract").and_then(Value::as_str) {
        if !abstract_text.is_empty() {
            text.push_str(abstract_text);
            text.push(' ');
        }
    }
    match article.get("keywords") {
        Some(Value::Array(kws)) => {
            let joined = kws
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(" ");
            text.push_str(&joined);
        }
        Some(Value::String(kw)) => text.push_str(kw),
        _ => {}
    }
    text.trim().to_string()
}

/// For each enriched part, attaches `combined_content` and its embedding
/// and writes a matching `combined_part_<i>.json.gz`. Existing combined
/// parts make the stage a no-op.
pub async fn generate_combined_parts(
    layout: &DataLayout,
    embedder: &dyn Embedder,
    batch_size: usize,
) -> Result<EmbedReport, IngestError> {
    let existing = DataLayout::existing_parts(&layout.combined, "combined_part_");
    if !existing.is_empty() {
        info!(parts = existing.len(), "combined parts already present, skipping");
        return Ok(EmbedReport {
            parts_written: 0,
            articles: 0,
            skipped_existing: true,
        });
    }

    let enriched = DataLayout::existing_parts(&layout.enriched, "enriched_part_");
    if enriched.is_empty() {
        return Err(IngestError(format!(
            "no enriched parts found in {}",
            layout.enriched.display()
        )));
    }

    let mut manifest = PartManifest::default();
    for (index, part_path) in enriched.iter().enumerate() {
        let part_no = index + 1;
        let mut articles = read_part(part_path)?;
        let texts: Vec<String> = articles.iter().map(combined_content).collect();

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(batch_size.max(1)) {
            vectors.extend(embedder.embed(batch).await?);
        }

        for (article, (text, vector)) in articles.iter_mut().zip(texts.iter().zip(&vectors)) {
            article["combined_content"] = Value::from(text.clone());
            article["combined_embedding"] =
                Value::Array(vector.iter().map(|v| Value::from(f64::from(*v))).collect());
        }

        let record = write_part(&layout.combined_part(part_no), &articles)?;
        manifest.total += record.count;
        manifest.parts.push(record);
        info!(part = part_no, count = articles.len(), "wrote combined part");
    }

    write_manifest(&layout.combined_manifest(), &manifest)?;
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
            Ok(texts.iter().map(|_| vec![0.5, 0.5]).collect())
        }
    }

    #[test]
    fn combined_content_joins_present_fields() {
        let article = json!({
            "title": "Graphene",
            "abstract": "Layered carbon.",
            "keywords": ["2d", "carbon"]
        });
        assert_eq!(combined_content(&article), "Graphene Layered carbon. 2d carbon");

        let sparse = json!({"title": "Only title"});
        assert_eq!(combined_content(&sparse), "Only title");
    }

    #[tokio::test]
    async fn combined_parts_mirror_enriched_parts() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let layout = DataLayout::new(tmp.path().join("data"));
        layout.ensure().expect("layout");

        let docs = vec![
            json!({"id": "p1", "title": "A", "abstract": "x", "keywords": ["k"]}),
            json!({"id": "p2", "title": "B", "abstract": "y", "keywords": []}),
        ];
        crate::embed::write_part(&layout.enriched_part(1), &docs).expect("seed part");

        let report = generate_combined_parts(&layout, &ConstantEmbedder, 64)
            .await
            .expect("combined parts");
        assert_eq!(report.parts_written, 1);
        assert_eq!(report.articles, 2);

        let combined = read_part(&layout.combined_part(1)).expect("read combined");
        assert_eq!(combined[0]["combined_content"], "A x k");
        assert!(combined[0]["combined_embedding"].is_array());

        let rerun = generate_combined_parts(&layout, &ConstantEmbedder, 64)
            .await
            .expect("rerun");
        assert!(rerun.skipped_existing);
    }
}
