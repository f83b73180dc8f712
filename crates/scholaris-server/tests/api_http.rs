// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use serde_json::{json, Value};

use scholaris_server::{build_router, AppState, FakeBackend, FakeEmbedder, ServerConfig};

fn fixture_articles() -> Vec<Value> {
    vec![
        json!({
            "id": "pub-1",
            "title": "Graphene oxide membranes for water filtration",
            "abstract": "Layered graphene oxide separates salts from water.",
            "keywords": ["graphene", "membranes"],
            "publication_year": 2021,
            "publication_type": "article",
            "authors": ["a-1", "a-2"]
        }),
        json!({
            "id": "pub-2",
            "title": "Thermal transport in graphene nanoribbons",
            "abstract": "Phonon scattering limits conduction in narrow ribbons.",
            "keywords": ["graphene", "phonons"],
            "publication_year": 2022,
            "publication_type": "article",
            "authors": ["a-2"]
        }),
        json!({
            "id": "pub-3",
            "title": "Bayesian calibration of climate models",
            "abstract": "Posterior estimates over model ensembles.",
            "keywords": ["bayesian", "climate"],
            "publication_year": 2020,
            "publication_type": "conference",
            "authors": ["a-3"]
        }),
    ]
}

fn fixture_authors() -> Vec<Value> {
    vec![
        json!({
            "id": "a-1",
            "full_name": "Anna Kowalska",
            "unit": "Faculty of Chemistry",
            "subunit": "Department of Materials",
            "art_num": 1,
            "publications": ["pub-1"]
        }),
        json!({
            "id": "a-2",
            "full_name": "Jan Nowak",
            "unit": "Faculty of Physics",
            "subunit": "Department of Solid State",
            "art_num": 2,
            "publications": ["pub-1", "pub-2"]
        }),
        json!({
            "id": "a-3",
            "full_name": "Maria Wiśniewska",
            "unit": "Faculty of Mathematics",
            "subunit": "Department of Statistics",
            "art_num": 1,
            "publications": ["pub-3"]
        }),
    ]
}

async fn spawn_server() -> String {
    let backend = Arc::new(FakeBackend::with_docs(fixture_articles(), fixture_authors()));
    let state = AppState::new(backend, Some(Arc::new(FakeEmbedder)), ServerConfig::default());
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move { axum::serve(listener, app).await.expect("serve app") });
    format!("http://{addr}")
}

#[tokio::test]
async fn ops_endpoints_report_health_and_metrics() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let root: Value = client
        .get(&base)
        .send()
        .await
        .expect("root request")
        .json()
        .await
        .expect("root json");
    assert_eq!(root["status"], "ok");
    assert!(root["system"].as_str().is_some_and(|s| !s.is_empty()));

    let healthz = client
        .get(format!("{base}/healthz"))
        .send()
        .await
        .expect("healthz request");
    assert_eq!(healthz.status().as_u16(), 200);

    let readyz = client
        .get(format!("{base}/readyz"))
        .send()
        .await
        .expect("readyz request");
    assert_eq!(readyz.status().as_u16(), 200);

    let metrics = client
        .get(format!("{base}/metrics"))
        .send()
        .await
        .expect("metrics request");
    assert_eq!(metrics.status().as_u16(), 200);
    let body = metrics.text().await.expect("metrics body");
    assert!(body.contains("scholaris_requests_total"));
    assert!(body.contains("scholaris_ready"));

    let openapi: Value = client
        .get(format!("{base}/openapi.json"))
        .send()
        .await
        .expect("openapi request")
        .json()
        .await
        .expect("openapi json");
    assert_eq!(openapi["openapi"], "3.0.3");
    assert!(openapi["paths"]["/api/search"].is_object());
}

#[tokio::test]
async fn text_search_returns_hits_and_facets() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/api/search"))
        .json(&json!({"query": "graphene", "search_method": "text"}))
        .send()
        .await
        .expect("search request");
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.expect("search json");
    let hits = body["hits"].as_array().expect("hits array");
    assert_eq!(hits.len(), 2);
    for hit in hits {
        assert!(hit["_score"].as_f64().is_some());
        assert!(hit["title"]
            .as_str()
            .is_some_and(|t| t.to_lowercase().contains("graphene")));
    }
    assert!(body["facets"]["publication_years"].is_array());
}

#[tokio::test]
async fn invalid_search_sizes_are_rejected() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/api/search"))
        .json(&json!({"query": "graphene", "size": -5}))
        .send()
        .await
        .expect("search request");
    assert_eq!(response.status().as_u16(), 422);
    let body: Value = response.json().await.expect("error json");
    assert_eq!(body["error"]["code"], "InvalidParameter");
}

#[tokio::test]
async fn cluster_endpoint_returns_all_three_sections() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/api/cluster"))
        .json(&json!({
            "query": "graphene",
            "search_method": "text",
            "clustering_params": {"method": "kmeans", "max_clusters": 2, "min_cluster_size": 1}
        }))
        .send()
        .await
        .expect("cluster request");
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.expect("cluster json");
    assert!(body["search_results"]["hits"].is_array());
    assert!(body["clustering_results"].is_object());
    assert!(body["affiliation_analysis"].is_object());
}

#[tokio::test]
async fn publication_and_author_lookups_handle_missing_ids() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let found = client
        .get(format!("{base}/api/publications/pub-1"))
        .send()
        .await
        .expect("publication request");
    assert_eq!(found.status().as_u16(), 200);
    let body: Value = found.json().await.expect("publication json");
    assert_eq!(body["id"], "pub-1");

    let missing = client
        .get(format!("{base}/api/publications/pub-404"))
        .send()
        .await
        .expect("missing publication request");
    assert_eq!(missing.status().as_u16(), 404);

    let author = client
        .get(format!("{base}/api/authors/a-2"))
        .send()
        .await
        .expect("author request");
    assert_eq!(author.status().as_u16(), 200);
    let body: Value = author.json().await.expect("author json");
    assert_eq!(body["full_name"], "Jan Nowak");

    let missing_author = client
        .get(format!("{base}/api/authors/a-404"))
        .send()
        .await
        .expect("missing author request");
    assert_eq!(missing_author.status().as_u16(), 404);
}

#[tokio::test]
async fn authors_bulk_marks_unresolvable_ids() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/api/authors_bulk"))
        .json(&json!({"ids": ["a-1", "ghost"]}))
        .send()
        .await
        .expect("bulk request");
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.expect("bulk json");
    let authors = body["authors"].as_array().expect("authors array");
    assert_eq!(authors.len(), 2);
    assert_eq!(authors[0]["full_name"], "Anna Kowalska");
    assert_eq!(authors[1]["full_name"], "ID: ghost");
}

#[tokio::test]
async fn author_publications_resolves_through_stored_ids() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/api/author_publications"))
        .json(&json!({"author_id": "a-2"}))
        .send()
        .await
        .expect("author publications request");
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.expect("author publications json");
    assert_eq!(body["author_id"], "a-2");
    assert_eq!(body["total"], 2);
    assert!(body["execution_time"].as_f64().is_some());
}

#[tokio::test]
async fn unit_publication_count_counts_denormalized_or_author_paths() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/api/unit_publications_count"))
        .json(&json!({"unit": "Faculty of Physics"}))
        .send()
        .await
        .expect("count request");
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.expect("count json");
    assert_eq!(body["unit"], "Faculty of Physics");
    assert!(body["count"].as_u64().is_some());
}

#[tokio::test]
async fn coauthors_exclude_the_author_themselves() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/api/author_coauthors"))
        .json(&json!({"author_id": "a-1"}))
        .send()
        .await
        .expect("coauthors request");
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.expect("coauthors json");
    let coauthors = body["coauthors"].as_array().expect("coauthors array");
    assert_eq!(coauthors.len(), 1);
    assert_eq!(coauthors[0]["id"], "a-2");
}
