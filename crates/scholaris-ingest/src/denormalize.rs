// SPDX-License-Identifier: Apache-2.0

//! Article denormalization: author unit, subunit and name lists are copied
//! onto articles so analytics can aggregate without author joins.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Value};
use tracing::info;

use scholaris_index::{bulk_body, BulkOp, EsClient, SCROLL_KEEP_ALIVE};
use scholaris_model::{ARTICLE_INDEX, AUTHOR_INDEX};
use scholaris_query::lookups::missing_denorm_query;

use crate::{IngestError, UPDATE_BATCH};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DenormalizeReport {
    pub processed: usize,
    pub updated: usize,
    pub skipped_existing: bool,
}

#[derive(Debug, Clone, Default)]
struct AuthorFacts {
    full_name: Option<String>,
    unit: Option<String>,
    subunit: Option<String>,
}

async fn load_author_facts(
    client: &EsClient,
) -> Result<BTreeMap<String, AuthorFacts>, IngestError> {
    let hits = client
        .scroll_all(
            AUTHOR_INDEX,
            json!({
                "query": {"match_all": {}},
                "_source": ["id", "full_name", "unit", "subunit"],
                "size": 1000
            }),
            SCROLL_KEEP_ALIVE,
        )
        .await?;

    let mut facts = BTreeMap::new();
    for hit in hits {
        let Some(source) = hit.get("_source") else {
            continue;
        };
        let Some(id) = source.get("id").and_then(Value::as_str) else {
            continue;
        };
        let field = |name: &str| {
            source
                .get(name)
                .and_then(Value::as_str)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        facts.insert(
            id.to_string(),
            AuthorFacts {
                full_name: field("full_name"),
                unit: field("unit"),
                subunit: field("subunit"),
            },
        );
    }
    Ok(facts)
}

fn denorm_update(article: &Value, facts: &BTreeMap<String, AuthorFacts>) -> Option<Value> {
    let authors = article.get("authors").and_then(Value::as_array)?;

    let mut units = BTreeSet::new();
    let mut subunits = BTreeSet::new();
    let mut names = BTreeSet::new();
    for author_id in authors.iter().filter_map(Value::as_str) {
        if let Some(author) = facts.get(author_id) {
            if let Some(unit) = &author.unit {
                units.insert(unit.clone());
            }
            if let Some(subunit) = &author.subunit {
                subunits.insert(subunit.clone());
            }
            if let Some(name) = &author.full_name {
                names.insert(name.clone());
            }
        }
    }

    let mut doc = serde_json::Map::new();
    if !units.is_empty() {
        doc.insert("author_units".to_string(), json!(units));
    }
    if !subunits.is_empty() {
        doc.insert("author_subunits".to_string(), json!(subunits));
    }
    if !names.is_empty() {
        doc.insert("author_names".to_string(), json!(names));
    }
    if doc.is_empty() {
        None
    } else {
        Some(Value::Object(doc))
    }
}

/// Copies author unit data onto every article still missing `author_units`,
/// in bulk batches. Skips when no article is missing the field.
pub async fn denormalize_articles(client: &EsClient) -> Result<DenormalizeReport, IngestError> {
    let pending = client
        .count(ARTICLE_INDEX, Some(&json!({"query": missing_denorm_query()})))
        .await?;
    if pending == 0 {
        info!("all articles already denormalized, skipping");
        return Ok(DenormalizeReport {
            skipped_existing: true,
            ..DenormalizeReport::default()
        });
    }

    let facts = load_author_facts(client).await?;
    info!(authors = facts.len(), pending, "denormalizing articles");

    let articles = client
        .scroll_all(
            ARTICLE_INDEX,
            json!({
                "query": missing_denorm_query(),
                "_source": ["id", "authors"],
                "size": 1000
            }),
            SCROLL_KEEP_ALIVE,
        )
        .await?;

    let mut report = DenormalizeReport {
        processed: articles.len(),
        ..DenormalizeReport::default()
    };
    for batch in articles.chunks(UPDATE_BATCH) {
        let mut ops = Vec::new();
        for hit in batch {
            let Some(source) = hit.get("_source") else {
                continue;
            };
            let Some(id) = source.get("id").and_then(Value::as_str) else {
                continue;
            };
            if let Some(doc) = denorm_update(source, &facts) {
                ops.push(BulkOp::Update {
                    index: ARTICLE_INDEX.to_string(),
                    id: id.to_string(),
                    doc,
                });
            }
        }
        if ops.is_empty() {
            continue;
        }
        let response = client.bulk(bulk_body(&ops)?, None).await?;
        report.updated += response.accepted(|status| status == 200 || status == 201);
    }

    client.refresh(ARTICLE_INDEX).await?;
    info!(
        processed = report.processed,
        updated = report.updated,
        "denormalization finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts() -> BTreeMap<String, AuthorFacts> {
        BTreeMap::from([
            (
                "a-1".to_string(),
                AuthorFacts {
                    full_name: Some("Anna Kowalska".to_string()),
                    unit: Some("Chemistry".to_string()),
                    subunit: Some("Materials".to_string()),
                },
            ),
            (
                "a-2".to_string(),
                AuthorFacts {
                    full_name: Some("Jan Nowak".to_string()),
                    unit: Some("Chemistry".to_string()),
                    subunit: None,
                },
            ),
        ])
    }

    #[test]
    fn shared_units_deduplicate() {
        let article = json!({"id": "p", "authors": ["a-1", "a-2"]});
        let doc = denorm_update(&article, &facts()).expect("update doc");
        assert_eq!(doc["author_units"], json!(["Chemistry"]));
        assert_eq!(doc["author_subunits"], json!(["Materials"]));
        assert_eq!(
            doc["author_names"],
            json!(["Anna Kowalska", "Jan Nowak"])
        );
    }

    #[test]
    fn unknown_authors_produce_no_update() {
        let article = json!({"id": "p", "authors": ["ghost"]});
        assert!(denorm_update(&article, &facts()).is_none());
    }
}
