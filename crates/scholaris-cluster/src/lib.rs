// SPDX-License-Identifier: Apache-2.0
//! Embedding-space clustering of publications.
//!
//! The entry point is [`cluster_publications`]: it takes raw publication
//! documents, keeps the ones carrying a usable `combined_embedding`,
//! picks a clustering method, optionally scans for a good cluster count
//! and returns labeled clusters with validity scores and a 2-D layout
//! for plotting.

#![forbid(unsafe_code)]

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use scholaris_model::EMBEDDING_DIM;

pub mod adaptive;
pub mod hierarchy;
pub mod kmeans;
pub mod metrics;
pub mod pca;
pub mod summary;

pub use adaptive::{optimize_cluster_count, ParameterMetrics, ScanMethod, ScanOutcome};
pub use hierarchy::{agglomerate, Linkage};
pub use kmeans::{kmeans, KMeansRun};
pub use metrics::{calinski_harabasz_score, davies_bouldin_score, silhouette_score};
pub use pca::{optimize_dimensions, project_2d, PcaModel};
pub use summary::{build_summaries, ClusterSummary, YearSpan};

pub const CRATE_NAME: &str = "scholaris-cluster";

/// Fraction of variance the adaptive path keeps when reducing.
pub const ADAPTIVE_VARIANCE_THRESHOLD: f64 = 0.9;
/// Dimension cap for the adaptive reduction.
pub const ADAPTIVE_MAX_DIMS: usize = 100;
/// Fixed reduction width for plain k-means on wide inputs.
pub const NON_ADAPTIVE_PCA_DIMS: usize = 50;
/// Below this many publications `auto` switches to hierarchical.
pub const AUTO_HIERARCHICAL_BELOW: usize = 15;
/// Fewer valid embeddings than this cannot be clustered.
pub const MIN_CLUSTERABLE: usize = 3;
pub const KMEANS_SEED: u64 = 42;

/// Clustering failed outright; the message is user-facing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterError(pub String);

impl fmt::Display for ClusterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ClusterError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterMethod {
    Auto,
    KMeans,
    Hierarchical,
    Adaptive,
    Hdbscan,
}

impl ClusterMethod {
    /// Lenient parser for request input. Anything unrecognized lands on
    /// the hdbscan arm, which in turn falls back to adaptive k-means.
    #[must_use]
    pub fn parse_loose(text: &str) -> Self {
        match text.trim().to_ascii_lowercase().as_str() {
            "auto" => Self::Auto,
            "kmeans" => Self::KMeans,
            "hierarchical" => Self::Hierarchical,
            "adaptive" => Self::Adaptive,
            "hdbscan" => Self::Hdbscan,
            other => {
                tracing::warn!(method = other, "unknown clustering method");
                Self::Hdbscan
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClusterOptions {
    pub method: ClusterMethod,
    pub k_max: usize,
    /// Minimum density-cluster size; only meaningful to hdbscan, which
    /// has no backend here, so it is accepted and ignored.
    pub min_cluster_size: usize,
    pub adaptive: bool,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            method: ClusterMethod::Auto,
            k_max: 10,
            min_cluster_size: 3,
            adaptive: true,
        }
    }
}

/// Validity scores for the final partition plus, when the adaptive scan
/// ran, its per-candidate history.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterQuality {
    pub silhouette: Option<f64>,
    pub share_noise: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter_metrics: Option<ParameterMetrics>,
    pub visualization_method: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterResult {
    pub clusters: Vec<ClusterSummary>,
    /// Count the method settled on, not the count of labels in use;
    /// degenerate scans can report 0 here while one cluster exists.
    pub n_clusters: i64,
    pub method: String,
    pub num_publications: usize,
    pub quality: ClusterQuality,
    pub publication_to_cluster: BTreeMap<String, i32>,
}

struct RunOutcome {
    labels: Vec<i32>,
    n_clusters: i64,
    method_name: String,
    parameter_metrics: Option<ParameterMetrics>,
}

/// Clusters publications on their `combined_embedding` vectors.
///
/// Publications without an id or without a finite, non-zero embedding of
/// the expected width are dropped. A repeated id keeps its first
/// position but takes the latest embedding and document.
pub fn cluster_publications(
    publications: &[Value],
    options: &ClusterOptions,
) -> Result<ClusterResult, ClusterError> {
    let (ids, sources, x) = valid_embeddings(publications);
    let n = ids.len();
    if n < MIN_CLUSTERABLE {
        return Err(ClusterError(
            "Too few publications with valid combined_embedding".to_owned(),
        ));
    }

    // Plot coordinates come from the full vectors, before any method
    // specific reduction.
    let points = pca::project_2d(&x);

    let resolved = match options.method {
        ClusterMethod::Auto => {
            if n < AUTO_HIERARCHICAL_BELOW {
                ClusterMethod::Hierarchical
            } else {
                ClusterMethod::KMeans
            }
        }
        other => other,
    };

    let outcome = run_clustering(&x, resolved, options)?;
    let (silhouette, share_noise) = quality_stats(&x, &outcome.labels);
    let clusters = summary::build_summaries(&ids, &sources, &points, &outcome.labels);

    let publication_to_cluster: BTreeMap<String, i32> = ids
        .iter()
        .cloned()
        .zip(outcome.labels.iter().copied())
        .collect();

    Ok(ClusterResult {
        clusters,
        n_clusters: outcome.n_clusters,
        method: outcome.method_name,
        num_publications: n,
        quality: ClusterQuality {
            silhouette,
            share_noise,
            parameter_metrics: outcome.parameter_metrics,
            visualization_method: "pca".to_owned(),
        },
        publication_to_cluster,
    })
}

fn run_clustering(
    x: &[Vec<f64>],
    method: ClusterMethod,
    options: &ClusterOptions,
) -> Result<RunOutcome, ClusterError> {
    let n = x.len();
    let d = x.first().map_or(0, Vec::len);

    let resolved = match method {
        ClusterMethod::Auto => {
            if n < AUTO_HIERARCHICAL_BELOW {
                ClusterMethod::Hierarchical
            } else {
                ClusterMethod::KMeans
            }
        }
        other => other,
    };

    if matches!(resolved, ClusterMethod::Hdbscan) {
        tracing::warn!("hdbscan backend is not available, using adaptive k-means");
        let fallback = ClusterOptions {
            method: ClusterMethod::KMeans,
            adaptive: true,
            ..options.clone()
        };
        return run_clustering(x, ClusterMethod::KMeans, &fallback);
    }

    let adaptive_requested = matches!(resolved, ClusterMethod::Adaptive)
        || (options.adaptive
            && matches!(resolved, ClusterMethod::KMeans | ClusterMethod::Hierarchical));

    if adaptive_requested {
        let scan_method = match resolved {
            ClusterMethod::Hierarchical => ScanMethod::Hierarchical,
            _ => ScanMethod::KMeans,
        };
        let base = match scan_method {
            ScanMethod::KMeans => "kmeans",
            ScanMethod::Hierarchical => "hierarchical",
        };

        let (dims, reduced) =
            pca::optimize_dimensions(x, ADAPTIVE_VARIANCE_THRESHOLD, ADAPTIVE_MAX_DIMS);
        let reduced_from = d;

        let k_max = options.k_max as i64;
        let mut min_k = 2.max((k_max - 1).min(3));
        let mut max_k = k_max.min((n as f64).sqrt() as i64);
        if min_k >= max_k {
            min_k = 2;
            max_k = 3;
        }

        let scan = adaptive::optimize_cluster_count(&reduced, min_k, max_k, scan_method);

        let mut method_name = format!("{base}_adaptive");
        if dims < reduced_from {
            method_name.push_str(&format!(
                " (PCA={dims}, variance={:.1}%)",
                ADAPTIVE_VARIANCE_THRESHOLD * 100.0
            ));
        }

        return Ok(RunOutcome {
            labels: scan.labels,
            n_clusters: scan.n_clusters,
            method_name,
            parameter_metrics: Some(scan.history),
        });
    }

    let k = options
        .k_max
        .min(2.max((n as f64 / 2.0).sqrt() as usize));

    match resolved {
        ClusterMethod::KMeans => {
            let data = if d > NON_ADAPTIVE_PCA_DIMS {
                pca::fit_transform(x, NON_ADAPTIVE_PCA_DIMS)
            } else {
                x.to_vec()
            };
            // The label always carries the dimensionality the fit ran on,
            // reduced or not.
            let dims = data.first().map_or(0, Vec::len);
            let method_name = format!("kmeans (PCA={dims})");
            let run = kmeans::kmeans(&data, k, 10, 300, KMEANS_SEED)?;
            Ok(RunOutcome {
                labels: run.labels,
                n_clusters: k as i64,
                method_name,
                parameter_metrics: None,
            })
        }
        ClusterMethod::Hierarchical => {
            let labels = hierarchy::agglomerate(x, k, Linkage::Ward)?;
            Ok(RunOutcome {
                labels,
                n_clusters: k as i64,
                method_name: "hierarchical".to_owned(),
                parameter_metrics: None,
            })
        }
        // Auto and hdbscan were already rewritten above.
        ClusterMethod::Auto | ClusterMethod::Adaptive | ClusterMethod::Hdbscan => {
            Err(ClusterError(format!(
                "clustering method {resolved:?} has no direct execution path"
            )))
        }
    }
}

/// Silhouette over the non-noise subset plus the noise share. Both are
/// rounded to three places when computable; a degenerate partition
/// reports a null silhouette and the raw noise share.
fn quality_stats(x: &[Vec<f64>], labels: &[i32]) -> (Option<f64>, f64) {
    let n = labels.len();
    let kept: Vec<usize> = (0..n).filter(|&i| labels[i] >= 0).collect();
    let share_noise = if n > 0 {
        1.0 - kept.len() as f64 / n as f64
    } else {
        0.0
    };

    let mut distinct: Vec<i32> = Vec::new();
    for &index in &kept {
        if !distinct.contains(&labels[index]) {
            distinct.push(labels[index]);
        }
    }

    if kept.len() < MIN_CLUSTERABLE || distinct.len() < 2 {
        return (None, share_noise);
    }

    let masked_x: Vec<Vec<f64>> = kept.iter().map(|&i| x[i].clone()).collect();
    let masked_labels: Vec<i32> = kept.iter().map(|&i| labels[i]).collect();
    let silhouette = metrics::silhouette_score(&masked_x, &masked_labels).map(round3);
    (silhouette, round3(share_noise))
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Ordered id, document and normalized-vector triples for every
/// publication with a usable embedding.
fn valid_embeddings(publications: &[Value]) -> (Vec<String>, Vec<&Value>, Vec<Vec<f64>>) {
    let mut order: Vec<String> = Vec::new();
    let mut slots: HashMap<String, (usize, Option<Vec<f64>>)> = HashMap::new();

    for (index, publication) in publications.iter().enumerate() {
        let Some(id) = publication.get("id").and_then(Value::as_str) else {
            continue;
        };
        if id.is_empty() {
            continue;
        }
        let vector = embedding_vector(publication);
        if !slots.contains_key(id) {
            order.push(id.to_owned());
        }
        // Later occurrences replace the document and vector but keep
        // the first position.
        slots.insert(id.to_owned(), (index, vector));
    }

    let mut ids = Vec::new();
    let mut sources = Vec::new();
    let mut x = Vec::new();
    for id in order {
        let Some((index, Some(vector))) = slots.remove(&id) else {
            continue;
        };
        ids.push(id);
        sources.push(&publications[index]);
        x.push(vector);
    }
    (ids, sources, x)
}

/// Normalized embedding, or `None` when the field is missing, the wrong
/// width, non-numeric, non-finite or all zero.
fn embedding_vector(publication: &Value) -> Option<Vec<f64>> {
    let Some(Value::Array(raw)) = publication.get("combined_embedding") else {
        return None;
    };
    if raw.len() != EMBEDDING_DIM {
        return None;
    }
    let mut vector = Vec::with_capacity(raw.len());
    for value in raw {
        let number = value.as_f64()?;
        if !number.is_finite() {
            return None;
        }
        vector.push(number);
    }
    let norm: f64 = vector.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm == 0.0 {
        return None;
    }
    for value in &mut vector {
        *value /= norm;
    }
    Some(vector)
}
