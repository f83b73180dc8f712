// SPDX-License-Identifier: Apache-2.0
//! End-to-end checks for `cluster_publications` on synthetic corpora.

use serde_json::{json, Value};

use scholaris_cluster::{cluster_publications, ClusterMethod, ClusterOptions};
use scholaris_model::EMBEDDING_DIM;

/// A publication whose embedding sits near one of three orthogonal
/// directions, offset per sample so vectors are distinct.
fn blob_doc(id: usize, blob: usize, jitter: f64) -> Value {
    let mut embedding = vec![0.0f64; EMBEDDING_DIM];
    embedding[blob] = 1.0;
    embedding[3 + (id % 5)] = jitter * (1.0 + id as f64 * 0.01);
    json!({
        "id": format!("pub-{id}"),
        "title": format!("Publication {id}"),
        "keywords": [format!("topic-{blob}"), "shared"],
        "publication_year": 2015 + (id % 6) as i64,
        "combined_embedding": embedding,
    })
}

fn corpus(per_blob: usize, blobs: usize) -> Vec<Value> {
    (0..per_blob * blobs)
        .map(|i| blob_doc(i, i % blobs, 0.05))
        .collect()
}

#[test]
fn adaptive_kmeans_recovers_three_topics() {
    let docs = corpus(15, 3);
    let result = cluster_publications(&docs, &ClusterOptions::default()).unwrap();

    assert_eq!(result.n_clusters, 3);
    assert_eq!(result.num_publications, 45);
    assert!(result.method.starts_with("kmeans_adaptive"));
    assert!(result.method.contains("variance=90.0%"));

    // Ids three apart share a blob, so they must share a cluster.
    for i in 0..45 {
        let a = result.publication_to_cluster[&format!("pub-{i}")];
        let b = result.publication_to_cluster[&format!("pub-{}", (i + 3) % 45)];
        assert_eq!(a, b);
    }

    let history = result.quality.parameter_metrics.as_ref().unwrap();
    assert_eq!(history.n_clusters_range, vec![3, 4, 5, 6]);
    assert_eq!(history.adjusted_scores.len(), 4);

    assert!(result.quality.silhouette.unwrap() > 0.5);
    assert_eq!(result.quality.share_noise, 0.0);
    assert_eq!(result.quality.visualization_method, "pca");
}

#[test]
fn small_corpora_switch_to_hierarchical() {
    let docs = corpus(4, 3);
    let result = cluster_publications(&docs, &ClusterOptions::default()).unwrap();

    assert!(result.method.starts_with("hierarchical_adaptive"));
    // Twelve documents cap the candidate range at two clusters.
    assert_eq!(result.n_clusters, 2);
    assert_eq!(result.quality.parameter_metrics.as_ref().unwrap().n_clusters_range, vec![1, 2]);
}

#[test]
fn plain_kmeans_reduces_and_names_its_projection() {
    let docs = corpus(10, 4);
    let options = ClusterOptions {
        method: ClusterMethod::KMeans,
        adaptive: false,
        ..ClusterOptions::default()
    };
    let result = cluster_publications(&docs, &options).unwrap();

    // 40 samples cap the projection below the usual 50 components, and
    // the fixed formula asks for min(10, sqrt(40 / 2)) clusters.
    assert_eq!(result.method, "kmeans (PCA=40)");
    assert_eq!(result.n_clusters, 4);
    assert!(result.quality.parameter_metrics.is_none());
}

#[test]
fn hdbscan_requests_fall_back_to_adaptive_kmeans() {
    let docs = corpus(12, 3);
    let options = ClusterOptions {
        method: ClusterMethod::parse_loose("hdbscan"),
        ..ClusterOptions::default()
    };
    let result = cluster_publications(&docs, &options).unwrap();
    assert!(result.method.starts_with("kmeans_adaptive"));
    assert!(result.quality.parameter_metrics.is_some());
}

#[test]
fn five_documents_degenerate_to_a_single_reported_cluster() {
    let docs = corpus(5, 1);
    let result = cluster_publications(&docs, &ClusterOptions::default()).unwrap();

    // The scan range collapses to sentinel candidates, so the method
    // reports zero clusters while every label is 0.
    assert_eq!(result.n_clusters, 0);
    assert_eq!(result.clusters.len(), 1);
    assert_eq!(result.clusters[0].size, 5);
    assert_eq!(result.quality.silhouette, None);
    assert_eq!(result.quality.share_noise, 0.0);
}

#[test]
fn missing_embeddings_produce_the_standard_error() {
    let docs = vec![
        json!({"id": "a", "title": "no vector"}),
        json!({"id": "b", "combined_embedding": [0.1, 0.2]}),
        blob_doc(0, 0, 0.05),
        blob_doc(1, 1, 0.05),
    ];
    let err = cluster_publications(&docs, &ClusterOptions::default()).unwrap_err();
    assert_eq!(err.to_string(), "Too few publications with valid combined_embedding");
}

#[test]
fn response_serializes_with_the_expected_shape() {
    let docs = corpus(15, 3);
    let result = cluster_publications(&docs, &ClusterOptions::default()).unwrap();
    let value = serde_json::to_value(&result).unwrap();

    let clusters = value["clusters"].as_array().unwrap();
    assert_eq!(clusters.len(), 3);
    for cluster in clusters {
        assert!(cluster["id"].is_i64());
        assert!(cluster["publications"].is_array());
        assert!(cluster["points"][0].as_array().unwrap().len() == 2);
        assert!(cluster["size"].as_u64().unwrap() >= 1);
        assert!(cluster["years"]["min"].is_i64());
        assert!(cluster["sample_titles"].as_array().unwrap().len() <= 5);
        // Keyword entries are [keyword, count] pairs.
        let first_keyword = cluster["keywords"][0].as_array().unwrap();
        assert!(first_keyword[0].is_string());
        assert!(first_keyword[1].is_u64());
    }

    assert!(value["quality"]["parameter_metrics"]["n_clusters_range"].is_array());
    assert_eq!(value["quality"]["visualization_method"], json!("pca"));
    assert!(value["publication_to_cluster"].is_object());
}

#[test]
fn clusters_sort_largest_first_and_share_the_blob_keyword() {
    let mut docs = corpus(8, 2);
    docs.extend((100..104).map(|i| blob_doc(i, 2, 0.05)));
    let result = cluster_publications(&docs, &ClusterOptions::default()).unwrap();

    let sizes: Vec<usize> = result.clusters.iter().map(|c| c.size).collect();
    let mut sorted = sizes.clone();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    assert_eq!(sizes, sorted);

    for cluster in &result.clusters {
        assert!(!cluster.keywords.is_empty());
        assert_eq!(cluster.publications.len(), cluster.size);
        assert_eq!(cluster.points.len(), cluster.size);
    }
}
