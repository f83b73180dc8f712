//! Index definitions and startup bootstrap.

use serde_json::{json, Value};

use crate::{EsClient, IndexError};
use scholaris_model::{ARTICLE_INDEX, AUTHOR_INDEX, EMBEDDING_DIM};

/// Article index definition. Text fields run through the multilingual
/// analyzer because abstracts arrive in both Polish and English.
#[must_use]
pub fn article_index_body() -> Value {
    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 0,
            "analysis": {
                "analyzer": {
                    "multilingual": {
                        "type": "custom",
                        "tokenizer": "standard",
                        "filter": ["lowercase", "asciifolding"]
                    }
                }
            }
        },
        "mappings": {
            "properties": {
                "id": {"type": "keyword"},
                "url": {"type": "keyword"},
                "title": {
                    "type": "text",
                    "analyzer": "multilingual",
                    "fields": {"keyword": {"type": "keyword"}}
                },
                "abstract": {"type": "text", "analyzer": "multilingual"},
                "authors": {"type": "keyword"},
                "author_units": {"type": "keyword"},
                "author_subunits": {"type": "keyword"},
                "author_names": {
                    "type": "text",
                    "fields": {"keyword": {"type": "keyword"}}
                },
                "keywords": {
                    "type": "text",
                    "fields": {"keyword": {"type": "keyword"}}
                },
                "publication_year": {"type": "integer"},
                "publication_type": {"type": "keyword"},
                "title_embedding": {
                    "type": "dense_vector",
                    "dims": EMBEDDING_DIM,
                    "index": true,
                    "similarity": "cosine"
                },
                "abstract_embedding": {
                    "type": "dense_vector",
                    "dims": EMBEDDING_DIM,
                    "index": true,
                    "similarity": "cosine"
                },
                "keywords_embedding": {
                    "type": "dense_vector",
                    "dims": EMBEDDING_DIM,
                    "index": true,
                    "similarity": "cosine"
                },
                "combined_embedding": {
                    "type": "dense_vector",
                    "dims": EMBEDDING_DIM,
                    "index": true,
                    "similarity": "cosine"
                },
                "combined_content": {"type": "text", "analyzer": "multilingual"}
            }
        }
    })
}

/// Author index definition.
#[must_use]
pub fn author_index_body() -> Value {
    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 0
        },
        "mappings": {
            "properties": {
                "id": {"type": "keyword"},
                "full_name": {
                    "type": "text",
                    "fields": {"keyword": {"type": "keyword"}}
                },
                "unit": {"type": "keyword"},
                "subunit": {"type": "keyword"},
                "link": {"type": "keyword"},
                "art_num": {"type": "integer"},
                "publications": {"type": "keyword"}
            }
        }
    })
}

/// Mapping fragment added to article indices created before the
/// combined-embedding backfill existed.
#[must_use]
pub fn combined_embedding_properties() -> Value {
    json!({
        "properties": {
            "combined_embedding": {
                "type": "dense_vector",
                "dims": EMBEDDING_DIM,
                "index": true,
                "similarity": "cosine"
            },
            "combined_content": {"type": "text", "analyzer": "multilingual"}
        }
    })
}

/// Creates any index that does not exist yet and returns the names it
/// created. With `recreate` set, existing indices are dropped first.
pub async fn ensure_indices(client: &EsClient, recreate: bool) -> Result<Vec<String>, IndexError> {
    let definitions = [
        (ARTICLE_INDEX, article_index_body()),
        (AUTHOR_INDEX, author_index_body()),
    ];
    let mut created = Vec::new();
    for (name, body) in definitions {
        if recreate && client.delete_index(name).await? {
            tracing::info!(index = name, "dropped existing index");
        }
        if client.index_exists(name).await? {
            tracing::debug!(index = name, "index already present");
            continue;
        }
        client.put_index(name, &body).await?;
        tracing::info!(index = name, "created index");
        created.push(name.to_owned());
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_body_declares_every_embedding_field() {
        let body = article_index_body();
        let props = &body["mappings"]["properties"];
        for field in [
            "title_embedding",
            "abstract_embedding",
            "keywords_embedding",
            "combined_embedding",
        ] {
            assert_eq!(props[field]["type"], "dense_vector", "{field}");
            assert_eq!(props[field]["dims"], EMBEDDING_DIM);
            assert_eq!(props[field]["similarity"], "cosine");
            assert_eq!(props[field]["index"], true);
        }
        assert_eq!(body["settings"]["number_of_shards"], 1);
        assert_eq!(body["settings"]["number_of_replicas"], 0);
        assert_eq!(
            body["settings"]["analysis"]["analyzer"]["multilingual"]["tokenizer"],
            "standard"
        );
    }

    #[test]
    fn text_fields_carry_keyword_subfields_where_facets_need_them() {
        let body = article_index_body();
        let props = &body["mappings"]["properties"];
        for field in ["title", "author_names", "keywords"] {
            assert_eq!(props[field]["fields"]["keyword"]["type"], "keyword", "{field}");
        }
        assert_eq!(props["publication_type"]["type"], "keyword");
        assert_eq!(props["publication_year"]["type"], "integer");
    }

    #[test]
    fn author_body_skips_analysis_settings() {
        let body = author_index_body();
        assert!(body["settings"].get("analysis").is_none());
        assert_eq!(
            body["mappings"]["properties"]["full_name"]["fields"]["keyword"]["type"],
            "keyword"
        );
        assert_eq!(body["mappings"]["properties"]["art_num"]["type"], "integer");
    }

    #[test]
    fn backfill_fragment_matches_the_index_definition() {
        let fragment = combined_embedding_properties();
        let full = article_index_body();
        assert_eq!(
            fragment["properties"]["combined_embedding"],
            full["mappings"]["properties"]["combined_embedding"]
        );
        assert_eq!(
            fragment["properties"]["combined_content"],
            full["mappings"]["properties"]["combined_content"]
        );
    }
}
