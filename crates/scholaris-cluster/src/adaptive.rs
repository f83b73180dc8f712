// SPDX-License-Identifier: Apache-2.0
//! Cluster-count selection by scanning a candidate range and scoring
//! each partition with a weighted blend of validity metrics.

use serde::Serialize;

use crate::hierarchy::{agglomerate, Linkage};
use crate::kmeans::kmeans;
use crate::metrics::{calinski_harabasz_score, davies_bouldin_score, silhouette_score};
use crate::KMEANS_SEED;

const SILHOUETTE_WEIGHT: f64 = 0.6;
const CALINSKI_WEIGHT: f64 = 0.25;
const DAVIES_WEIGHT: f64 = 0.15;
/// Subtracted per candidate cluster so near-ties resolve downward.
const CLUSTER_COUNT_PENALTY: f64 = 0.01;

const SCAN_N_INIT: usize = 20;
const SCAN_MAX_ITER: usize = 500;

/// Which family the scan evaluates at every candidate count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMethod {
    KMeans,
    Hierarchical,
}

/// Raw and derived per-candidate scores, kept for the API response.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParameterMetrics {
    pub n_clusters_range: Vec<i64>,
    pub silhouette: Vec<f64>,
    pub calinski_harabasz: Vec<f64>,
    pub davies_bouldin: Vec<f64>,
    pub composite: Vec<f64>,
    pub adjusted_scores: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// Winning candidate count. Degenerate ranges can make this 0 or
    /// even negative; callers pass it through unchanged.
    pub n_clusters: i64,
    pub labels: Vec<i32>,
    pub history: ParameterMetrics,
}

struct Candidate {
    silhouette: f64,
    calinski: f64,
    davies: f64,
    labels: Vec<i32>,
}

impl Candidate {
    fn failed(n: usize) -> Self {
        Self {
            silhouette: -1.0,
            calinski: 0.0,
            davies: f64::INFINITY,
            labels: vec![0; n],
        }
    }
}

/// Scans candidate counts between the requested bounds, both clamped by
/// the sample count. Returns the first candidate with the highest
/// penalized composite score.
#[must_use]
pub fn optimize_cluster_count(
    x: &[Vec<f64>],
    min_requested: i64,
    max_requested: i64,
    method: ScanMethod,
) -> ScanOutcome {
    let n = x.len();

    let mut max_clusters = max_requested.min((n / 5) as i64).min(20);
    let mut min_clusters = min_requested.min(max_clusters - 1);
    if min_clusters >= max_clusters {
        min_clusters = 2;
        max_clusters = 3.max(((n / 5) as i64).min(20));
    }

    let mut candidates: Vec<Candidate> = Vec::new();
    for k in min_clusters..=max_clusters {
        candidates.push(evaluate(x, k, method));
    }

    let history = score_history(&candidates, min_clusters, max_clusters);
    let best_index = first_argmax(&history.adjusted_scores).unwrap_or(0);
    let labels = candidates
        .get(best_index)
        .map_or_else(|| vec![0; n], |c| c.labels.clone());

    ScanOutcome {
        n_clusters: min_clusters + best_index as i64,
        labels,
        history,
    }
}

fn evaluate(x: &[Vec<f64>], k: i64, method: ScanMethod) -> Candidate {
    let n = x.len();
    if k <= 0 {
        return Candidate::failed(n);
    }
    let k = k as usize;

    let labels = match method {
        ScanMethod::KMeans => match kmeans(x, k, SCAN_N_INIT, SCAN_MAX_ITER, KMEANS_SEED) {
            Ok(run) => run.labels,
            Err(_) => return Candidate::failed(n),
        },
        ScanMethod::Hierarchical => best_linkage(x, k),
    };

    if distinct_count(&labels) <= 1 {
        return Candidate {
            silhouette: -1.0,
            calinski: 0.0,
            davies: f64::INFINITY,
            labels,
        };
    }

    match (
        silhouette_score(x, &labels),
        calinski_harabasz_score(x, &labels),
        davies_bouldin_score(x, &labels),
    ) {
        (Some(silhouette), Some(calinski), Some(davies)) => Candidate {
            silhouette,
            calinski,
            davies,
            labels,
        },
        _ => Candidate::failed(n),
    }
}

/// Tries ward, complete and average linkage and keeps the partition
/// with the strictly best silhouette. All failures leave zeros.
fn best_linkage(x: &[Vec<f64>], k: usize) -> Vec<i32> {
    let n = x.len();
    let mut best_silhouette = -1.0;
    let mut best_labels = vec![0i32; n];
    for linkage in [Linkage::Ward, Linkage::Complete, Linkage::Average] {
        let Ok(labels) = agglomerate(x, k, linkage) else {
            continue;
        };
        let silhouette = if distinct_count(&labels) > 1 {
            silhouette_score(x, &labels).unwrap_or(-1.0)
        } else {
            -1.0
        };
        if silhouette > best_silhouette {
            best_silhouette = silhouette;
            best_labels = labels;
        }
    }
    best_labels
}

fn score_history(candidates: &[Candidate], min_clusters: i64, max_clusters: i64) -> ParameterMetrics {
    let silhouettes: Vec<f64> = candidates.iter().map(|c| c.silhouette).collect();
    let calinskis: Vec<f64> = candidates.iter().map(|c| c.calinski).collect();
    let davies: Vec<f64> = candidates.iter().map(|c| c.davies).collect();

    let silhouette_norm = normalize_silhouette(&silhouettes);
    let calinski_norm = normalize_calinski(&calinskis);
    let davies_norm = normalize_davies(&davies);

    let composite: Vec<f64> = (0..candidates.len())
        .map(|i| {
            SILHOUETTE_WEIGHT * silhouette_norm[i]
                + CALINSKI_WEIGHT * calinski_norm[i]
                + DAVIES_WEIGHT * davies_norm[i]
        })
        .collect();
    let adjusted: Vec<f64> = composite
        .iter()
        .enumerate()
        .map(|(i, score)| score - CLUSTER_COUNT_PENALTY * (min_clusters + i as i64) as f64)
        .collect();

    ParameterMetrics {
        n_clusters_range: (min_clusters..=max_clusters).collect(),
        silhouette: silhouettes,
        calinski_harabasz: calinskis,
        davies_bouldin: davies,
        composite,
        adjusted_scores: adjusted,
    }
}

/// Min-max over the whole list; sentinel entries at -1 or below map to
/// zero, and a spread-free list maps everything else to one.
fn normalize_silhouette(values: &[f64]) -> Vec<f64> {
    let Some(min) = values.iter().copied().reduce(f64::min) else {
        return Vec::new();
    };
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    values
        .iter()
        .map(|&s| {
            if s <= -1.0 {
                0.0
            } else if max > min {
                (s - min) / (max - min)
            } else {
                1.0
            }
        })
        .collect()
}

fn normalize_calinski(values: &[f64]) -> Vec<f64> {
    let max = values.iter().copied().fold(0.0f64, f64::max);
    if max > 0.0 {
        values.iter().map(|&c| c / max).collect()
    } else {
        vec![0.0; values.len()]
    }
}

/// Inverted min-max over the finite entries; infinities and spread-free
/// lists score zero. The range deliberately excludes the infinity
/// sentinels so finite candidates stay distinguishable when some
/// candidate failed.
fn normalize_davies(values: &[f64]) -> Vec<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let (Some(min), Some(max)) = (
        finite.iter().copied().reduce(f64::min),
        finite.iter().copied().reduce(f64::max),
    ) else {
        return vec![0.0; values.len()];
    };
    values
        .iter()
        .map(|&d| {
            if !d.is_finite() || max <= min {
                0.0
            } else {
                1.0 - (d - min) / (max - min)
            }
        })
        .collect()
}

fn first_argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, &value) in values.iter().enumerate() {
        let replace = match best {
            None => true,
            Some((_, current)) => value > current,
        };
        if replace {
            best = Some((index, value));
        }
    }
    best.map(|(index, _)| index)
}

fn distinct_count(labels: &[i32]) -> usize {
    let mut seen: Vec<i32> = Vec::new();
    for &label in labels {
        if !seen.contains(&label) {
            seen.push(label);
        }
    }
    seen.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs(per_blob: usize) -> Vec<Vec<f64>> {
        let mut data = Vec::new();
        for i in 0..per_blob {
            let jitter = i as f64 * 0.03;
            data.push(vec![0.0 + jitter, 0.0]);
            data.push(vec![40.0, 40.0 + jitter]);
            data.push(vec![80.0 + jitter, 0.0]);
        }
        data
    }

    #[test]
    fn scan_finds_three_blobs_with_kmeans() {
        let data = blobs(15);
        let outcome = optimize_cluster_count(&data, 2, 6, ScanMethod::KMeans);
        assert_eq!(outcome.n_clusters, 3);
        assert_eq!(distinct_count(&outcome.labels), 3);
        assert_eq!(outcome.history.n_clusters_range, vec![2, 3, 4, 5, 6]);
        assert_eq!(outcome.history.adjusted_scores.len(), 5);
    }

    #[test]
    fn scan_finds_three_blobs_with_hierarchical() {
        let data = blobs(12);
        let outcome = optimize_cluster_count(&data, 2, 6, ScanMethod::Hierarchical);
        assert_eq!(outcome.n_clusters, 3);
        assert_eq!(distinct_count(&outcome.labels), 3);
    }

    #[test]
    fn nine_samples_degenerate_to_a_zero_count() {
        // n // 5 caps the range at one cluster, so every candidate is a
        // sentinel and the first (zero) wins on the size penalty.
        let data: Vec<Vec<f64>> = (0..9).map(|i| vec![f64::from(i), 0.0]).collect();
        let outcome = optimize_cluster_count(&data, 2, 3, ScanMethod::KMeans);
        assert_eq!(outcome.history.n_clusters_range, vec![0, 1]);
        assert_eq!(outcome.n_clusters, 0);
        assert!(outcome.labels.iter().all(|&l| l == 0));
    }

    #[test]
    fn three_samples_walk_the_range_below_one() {
        let data = vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![2.0, 0.0]];
        let outcome = optimize_cluster_count(&data, 2, 3, ScanMethod::KMeans);
        assert_eq!(outcome.history.n_clusters_range, vec![-1, 0]);
        // The penalty rewards the smaller candidate, -1 included.
        assert_eq!(outcome.n_clusters, -1);
        assert_eq!(outcome.labels, vec![0, 0, 0]);
    }

    #[test]
    fn history_rows_stay_aligned() {
        let data = blobs(10);
        let outcome = optimize_cluster_count(&data, 2, 5, ScanMethod::KMeans);
        let len = outcome.history.n_clusters_range.len();
        assert_eq!(outcome.history.silhouette.len(), len);
        assert_eq!(outcome.history.calinski_harabasz.len(), len);
        assert_eq!(outcome.history.davies_bouldin.len(), len);
        assert_eq!(outcome.history.composite.len(), len);
        assert_eq!(outcome.history.adjusted_scores.len(), len);
    }

    #[test]
    fn sentinel_normalization_zeroes_failed_candidates() {
        let candidates = vec![
            Candidate {
                silhouette: 0.8,
                calinski: 120.0,
                davies: 0.4,
                labels: vec![0, 1],
            },
            Candidate::failed(2),
        ];
        let history = score_history(&candidates, 2, 3);
        // Silhouette and calinski both normalize to 1 for the real
        // candidate; the lone finite davies value has no spread, so its
        // term contributes nothing rather than the flat 1.0 a min-max
        // over the infinity sentinel would hand every finite candidate.
        assert!((history.composite[0] - 0.85).abs() < 1e-9);
        assert_eq!(history.composite[1], 0.0);
    }

    #[test]
    fn davies_spread_survives_failed_candidates() {
        let normalized = normalize_davies(&[0.4, 0.9, f64::INFINITY]);
        assert_eq!(normalized[0], 1.0);
        assert_eq!(normalized[1], 0.0);
        assert_eq!(normalized[2], 0.0);
    }

    #[test]
    fn first_argmax_breaks_ties_low() {
        assert_eq!(first_argmax(&[0.5, 0.5, 0.4]), Some(0));
        assert_eq!(first_argmax(&[0.1, 0.9, 0.9]), Some(1));
        assert_eq!(first_argmax(&[]), None);
    }
}
