//! Internal cluster validity scores.
//!
//! Every score needs more than one cluster and fewer clusters than
//! samples; outside that window the functions return `None` and callers
//! fall back to sentinel values.

use crate::kmeans::squared_distance;

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    squared_distance(a, b).sqrt()
}

/// Distinct labels in first-seen order plus per-sample cluster indices.
fn group(labels: &[i32]) -> (Vec<i32>, Vec<usize>) {
    let mut distinct: Vec<i32> = Vec::new();
    let mut assignment = Vec::with_capacity(labels.len());
    for &label in labels {
        let index = match distinct.iter().position(|&d| d == label) {
            Some(index) => index,
            None => {
                distinct.push(label);
                distinct.len() - 1
            }
        };
        assignment.push(index);
    }
    (distinct, assignment)
}

fn in_domain(n: usize, k: usize) -> bool {
    k > 1 && k < n
}

fn centroids(x: &[Vec<f64>], assignment: &[usize], k: usize) -> (Vec<Vec<f64>>, Vec<usize>) {
    let d = x.first().map_or(0, Vec::len);
    let mut sums = vec![vec![0.0; d]; k];
    let mut counts = vec![0usize; k];
    for (row, &cluster) in x.iter().zip(assignment) {
        counts[cluster] += 1;
        for (slot, v) in sums[cluster].iter_mut().zip(row) {
            *slot += v;
        }
    }
    for (sum, &count) in sums.iter_mut().zip(&counts) {
        if count > 0 {
            for slot in sum.iter_mut() {
                *slot /= count as f64;
            }
        }
    }
    (sums, counts)
}

/// Mean silhouette coefficient. Singleton members score zero, as does
/// any sample whose intra and nearest-cluster distances are both zero.
#[must_use]
pub fn silhouette_score(x: &[Vec<f64>], labels: &[i32]) -> Option<f64> {
    let n = x.len();
    if n == 0 || labels.len() != n {
        return None;
    }
    let (distinct, assignment) = group(labels);
    let k = distinct.len();
    if !in_domain(n, k) {
        return None;
    }

    let mut total = 0.0;
    for (i, row) in x.iter().enumerate() {
        let mut sums = vec![0.0f64; k];
        let mut counts = vec![0usize; k];
        for (j, other) in x.iter().enumerate() {
            if i == j {
                continue;
            }
            sums[assignment[j]] += euclidean(row, other);
            counts[assignment[j]] += 1;
        }
        let own = assignment[i];
        // counts[own] excludes the sample itself here.
        if counts[own] == 0 {
            continue;
        }
        let a = sums[own] / counts[own] as f64;
        let mut b = f64::INFINITY;
        for cluster in 0..k {
            if cluster == own || counts[cluster] == 0 {
                continue;
            }
            let mean = sums[cluster] / counts[cluster] as f64;
            if mean < b {
                b = mean;
            }
        }
        let denom = a.max(b);
        if denom > 0.0 {
            total += (b - a) / denom;
        }
    }
    Some(total / n as f64)
}

/// Ratio of between- to within-cluster dispersion. Perfectly collapsed
/// clusters (zero within-dispersion) score 1.0.
#[must_use]
pub fn calinski_harabasz_score(x: &[Vec<f64>], labels: &[i32]) -> Option<f64> {
    let n = x.len();
    if n == 0 || labels.len() != n {
        return None;
    }
    let (distinct, assignment) = group(labels);
    let k = distinct.len();
    if !in_domain(n, k) {
        return None;
    }

    let d = x[0].len();
    let overall: Vec<f64> = (0..d)
        .map(|j| x.iter().map(|row| row[j]).sum::<f64>() / n as f64)
        .collect();
    let (centers, counts) = centroids(x, &assignment, k);

    let extra: f64 = centers
        .iter()
        .zip(&counts)
        .map(|(center, &count)| count as f64 * squared_distance(center, &overall))
        .sum();
    let intra: f64 = x
        .iter()
        .zip(&assignment)
        .map(|(row, &cluster)| squared_distance(row, &centers[cluster]))
        .sum();

    if intra == 0.0 {
        return Some(1.0);
    }
    Some(extra * (n - k) as f64 / (intra * (k - 1) as f64))
}

/// Mean worst-case similarity between clusters; lower is better.
/// Coincident centroids contribute nothing rather than blowing up.
#[must_use]
pub fn davies_bouldin_score(x: &[Vec<f64>], labels: &[i32]) -> Option<f64> {
    let n = x.len();
    if n == 0 || labels.len() != n {
        return None;
    }
    let (distinct, assignment) = group(labels);
    let k = distinct.len();
    if !in_domain(n, k) {
        return None;
    }

    let (centers, counts) = centroids(x, &assignment, k);
    let mut spread = vec![0.0f64; k];
    for (row, &cluster) in x.iter().zip(&assignment) {
        spread[cluster] += euclidean(row, &centers[cluster]);
    }
    for (value, &count) in spread.iter_mut().zip(&counts) {
        if count > 0 {
            *value /= count as f64;
        }
    }

    let mut total = 0.0;
    for i in 0..k {
        let mut worst = 0.0f64;
        for j in 0..k {
            if i == j {
                continue;
            }
            let separation = euclidean(&centers[i], &centers[j]);
            if separation == 0.0 {
                continue;
            }
            let ratio = (spread[i] + spread[j]) / separation;
            if ratio > worst {
                worst = ratio;
            }
        }
        total += worst;
    }
    Some(total / k as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs(separation: f64) -> (Vec<Vec<f64>>, Vec<i32>) {
        let mut data = Vec::new();
        let mut labels = Vec::new();
        for i in 0..8 {
            let jitter = f64::from(i) * 0.05;
            data.push(vec![jitter, 0.0]);
            labels.push(0);
            data.push(vec![separation + jitter, 0.0]);
            labels.push(1);
        }
        (data, labels)
    }

    #[test]
    fn separated_blobs_score_well() {
        let (data, labels) = blobs(100.0);
        let silhouette = silhouette_score(&data, &labels).unwrap();
        let ch = calinski_harabasz_score(&data, &labels).unwrap();
        let db = davies_bouldin_score(&data, &labels).unwrap();
        assert!(silhouette > 0.95, "silhouette {silhouette}");
        assert!(ch > 1000.0, "calinski-harabasz {ch}");
        assert!(db < 0.05, "davies-bouldin {db}");
    }

    #[test]
    fn overlapping_blobs_score_worse() {
        let (far, labels) = blobs(100.0);
        let (near, _) = blobs(0.5);
        assert!(silhouette_score(&near, &labels).unwrap() < silhouette_score(&far, &labels).unwrap());
        assert!(davies_bouldin_score(&near, &labels).unwrap() > davies_bouldin_score(&far, &labels).unwrap());
    }

    #[test]
    fn degenerate_label_counts_are_rejected() {
        let (data, _) = blobs(10.0);
        let all_same = vec![0i32; data.len()];
        let all_distinct: Vec<i32> = (0..data.len() as i32).collect();
        for labels in [&all_same, &all_distinct] {
            assert!(silhouette_score(&data, labels).is_none());
            assert!(calinski_harabasz_score(&data, labels).is_none());
            assert!(davies_bouldin_score(&data, labels).is_none());
        }
    }

    #[test]
    fn collapsed_clusters_use_fixed_values() {
        // Two clusters of identical points at the same spot.
        let data = vec![vec![1.0, 1.0]; 6];
        let labels = vec![0, 0, 0, 1, 1, 1];
        assert_eq!(silhouette_score(&data, &labels), Some(0.0));
        assert_eq!(calinski_harabasz_score(&data, &labels), Some(1.0));
        assert_eq!(davies_bouldin_score(&data, &labels), Some(0.0));
    }

    #[test]
    fn singleton_cluster_contributes_zero_silhouette() {
        let data = vec![vec![0.0], vec![0.1], vec![50.0], vec![50.1], vec![100.0]];
        let labels = vec![0, 0, 1, 1, 2];
        let with_singleton = silhouette_score(&data, &labels).unwrap();
        // Four tight pair members near 1.0, the singleton adds 0.
        assert!(with_singleton > 0.75 && with_singleton < 0.85, "{with_singleton}");
    }
}
