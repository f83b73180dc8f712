//! Lloyd's algorithm with k-means++ seeding.
//!
//! Determinism contract: a given `(data, k, n_init, max_iter, seed)`
//! tuple always yields the same run. All restarts draw from one seeded
//! generator in sequence.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::ClusterError;

/// Relative tolerance on the squared center shift, scaled by the mean
/// per-feature variance of the input.
const SHIFT_TOL: f64 = 1e-4;

/// Outcome of the best restart.
#[derive(Debug, Clone)]
pub struct KMeansRun {
    pub labels: Vec<i32>,
    pub centers: Vec<Vec<f64>>,
    /// Sum of squared distances from each sample to its center.
    pub inertia: f64,
}

/// Runs `n_init` seeded restarts and keeps the lowest-inertia one.
pub fn kmeans(
    x: &[Vec<f64>],
    k: usize,
    n_init: usize,
    max_iter: usize,
    seed: u64,
) -> Result<KMeansRun, ClusterError> {
    let n = x.len();
    if k == 0 || k > n {
        return Err(ClusterError(format!(
            "k-means needs 1..={n} clusters for {n} samples, got {k}"
        )));
    }

    let tol = SHIFT_TOL * mean_feature_variance(x);
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut best: Option<KMeansRun> = None;

    for _ in 0..n_init.max(1) {
        let run = single_run(x, k, max_iter, tol, &mut rng);
        let improved = best.as_ref().map_or(true, |b| run.inertia < b.inertia);
        if improved {
            best = Some(run);
        }
    }

    // k >= 1 guarantees at least one restart ran.
    best.ok_or_else(|| ClusterError("k-means produced no candidate run".to_owned()))
}

fn single_run(x: &[Vec<f64>], k: usize, max_iter: usize, tol: f64, rng: &mut SmallRng) -> KMeansRun {
    let n = x.len();
    let mut centers = plus_plus_init(x, k, rng);
    let mut labels = vec![0usize; n];

    for _ in 0..max_iter {
        for (label, row) in labels.iter_mut().zip(x) {
            *label = nearest(row, &centers).0;
        }

        let mut sums = vec![vec![0.0; x[0].len()]; k];
        let mut counts = vec![0usize; k];
        for (label, row) in labels.iter().zip(x) {
            counts[*label] += 1;
            for (slot, v) in sums[*label].iter_mut().zip(row) {
                *slot += v;
            }
        }

        let mut new_centers: Vec<Vec<f64>> = sums
            .into_iter()
            .zip(&counts)
            .zip(&centers)
            .map(|((sum, &count), old)| {
                if count > 0 {
                    sum.into_iter().map(|v| v / count as f64).collect()
                } else {
                    old.clone()
                }
            })
            .collect();

        // A cluster that lost every member restarts at the sample
        // furthest from its current center.
        let mut relocated: Vec<usize> = Vec::new();
        for cluster in 0..k {
            if counts[cluster] > 0 {
                continue;
            }
            let candidate = (0..n)
                .filter(|i| !relocated.contains(i))
                .max_by(|&a, &b| {
                    let da = squared_distance(&x[a], &new_centers[labels[a]]);
                    let db = squared_distance(&x[b], &new_centers[labels[b]]);
                    da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
                });
            if let Some(index) = candidate {
                new_centers[cluster] = x[index].clone();
                labels[index] = cluster;
                relocated.push(index);
            }
        }

        let shift: f64 = centers
            .iter()
            .zip(&new_centers)
            .map(|(old, new)| squared_distance(old, new))
            .sum();
        centers = new_centers;
        if shift <= tol {
            break;
        }
    }

    let mut inertia = 0.0;
    let mut final_labels = Vec::with_capacity(n);
    for row in x {
        let (label, distance) = nearest(row, &centers);
        inertia += distance;
        final_labels.push(label as i32);
    }

    KMeansRun {
        labels: final_labels,
        centers,
        inertia,
    }
}

/// k-means++: first center uniform, the rest sampled proportionally to
/// the squared distance from the nearest chosen center.
fn plus_plus_init(x: &[Vec<f64>], k: usize, rng: &mut SmallRng) -> Vec<Vec<f64>> {
    let n = x.len();
    let mut centers: Vec<Vec<f64>> = Vec::with_capacity(k);
    centers.push(x[rng.gen_range(0..n)].clone());

    let mut weights: Vec<f64> = x
        .iter()
        .map(|row| squared_distance(row, &centers[0]))
        .collect();

    while centers.len() < k {
        let total: f64 = weights.iter().sum();
        let index = if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            let mut chosen = n - 1;
            for (i, w) in weights.iter().enumerate() {
                target -= w;
                if target <= 0.0 {
                    chosen = i;
                    break;
                }
            }
            chosen
        } else {
            // Every remaining sample coincides with a center.
            rng.gen_range(0..n)
        };

        centers.push(x[index].clone());
        for (w, row) in weights.iter_mut().zip(x) {
            let d = squared_distance(row, centers.last().map_or(&[][..], Vec::as_slice));
            if d < *w {
                *w = d;
            }
        }
    }
    centers
}

/// Index and squared distance of the closest center, first on ties.
fn nearest(row: &[f64], centers: &[Vec<f64>]) -> (usize, f64) {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (index, center) in centers.iter().enumerate() {
        let d = squared_distance(row, center);
        if d < best_distance {
            best_distance = d;
            best = index;
        }
    }
    (best, best_distance)
}

pub(crate) fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn mean_feature_variance(x: &[Vec<f64>]) -> f64 {
    let n = x.len();
    let d = x.first().map_or(0, Vec::len);
    if n == 0 || d == 0 {
        return 0.0;
    }
    let mut total = 0.0;
    for j in 0..d {
        let mean = x.iter().map(|row| row[j]).sum::<f64>() / n as f64;
        total += x.iter().map(|row| (row[j] - mean).powi(2)).sum::<f64>() / n as f64;
    }
    total / d as f64
}
