// SPDX-License-Identifier: Apache-2.0
//! Principal component analysis by power iteration with deflation.
//!
//! Components are extracted from whichever of the covariance or Gram
//! matrix is smaller, so the cost is bounded by `min(n, d)` rather than
//! the embedding width. The handful of components clustering needs never
//! justifies a linear-algebra dependency.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

const POWER_SEED: u64 = 42;
const POWER_MAX_ITER: usize = 500;
const POWER_TOL: f64 = 1e-10;

/// A fitted set of principal axes.
#[derive(Debug, Clone)]
pub struct PcaModel {
    pub mean: Vec<f64>,
    /// Unit-length principal axes, strongest first.
    pub components: Vec<Vec<f64>>,
    /// Fraction of total variance along each axis, same order.
    pub explained_variance_ratio: Vec<f64>,
}

impl PcaModel {
    /// Projects rows onto the first `dims` fitted axes.
    #[must_use]
    pub fn transform(&self, x: &[Vec<f64>], dims: usize) -> Vec<Vec<f64>> {
        let dims = dims.min(self.components.len());
        x.iter()
            .map(|row| {
                let centered: Vec<f64> = row
                    .iter()
                    .zip(&self.mean)
                    .map(|(value, mean)| value - mean)
                    .collect();
                self.components[..dims]
                    .iter()
                    .map(|axis| dot(&centered, axis))
                    .collect()
            })
            .collect()
    }
}

/// Fits up to `n_components` principal axes. More components than the
/// data can support come back with zero explained variance.
#[must_use]
pub fn fit(x: &[Vec<f64>], n_components: usize) -> PcaModel {
    let n = x.len();
    let d = x.first().map_or(0, Vec::len);
    if n < 2 || d == 0 || n_components == 0 {
        return PcaModel {
            mean: vec![0.0; d],
            components: Vec::new(),
            explained_variance_ratio: Vec::new(),
        };
    }

    let mean: Vec<f64> = (0..d)
        .map(|j| x.iter().map(|row| row[j]).sum::<f64>() / n as f64)
        .collect();
    let centered: Vec<Vec<f64>> = x
        .iter()
        .map(|row| row.iter().zip(&mean).map(|(v, m)| v - m).collect())
        .collect();

    let denom = (n - 1) as f64;
    let total_variance: f64 = centered
        .iter()
        .flat_map(|row| row.iter().map(|v| v * v))
        .sum::<f64>()
        / denom;

    let k = n_components.min(n).min(d);
    let mut rng = SmallRng::seed_from_u64(POWER_SEED);

    let (eigenvalues, components) = if d <= n {
        let cov = gram_of_columns(&centered, denom);
        let pairs = top_eigenpairs(&cov, k, &mut rng);
        let values: Vec<f64> = pairs.iter().map(|(value, _)| *value).collect();
        let axes: Vec<Vec<f64>> = pairs.into_iter().map(|(_, axis)| axis).collect();
        (values, axes)
    } else {
        // Gram trick: the n-by-n matrix shares the covariance spectrum,
        // and each covariance eigenvector is X^T u renormalized.
        let gram = gram_of_rows(&centered, denom);
        let pairs = top_eigenpairs(&gram, k, &mut rng);
        let mut values = Vec::with_capacity(pairs.len());
        let mut axes = Vec::with_capacity(pairs.len());
        for (value, u) in pairs {
            let mut axis = vec![0.0; d];
            for (row, weight) in centered.iter().zip(&u) {
                for (slot, v) in axis.iter_mut().zip(row) {
                    *slot += weight * v;
                }
            }
            let norm = dot(&axis, &axis).sqrt();
            if norm > 0.0 {
                for slot in &mut axis {
                    *slot /= norm;
                }
            }
            values.push(value);
            axes.push(axis);
        }
        (values, axes)
    };

    let explained_variance_ratio = eigenvalues
        .iter()
        .map(|value| {
            if total_variance > 0.0 {
                (value / total_variance).max(0.0)
            } else {
                0.0
            }
        })
        .collect();

    PcaModel {
        mean,
        components,
        explained_variance_ratio,
    }
}

/// Fit and project in one step.
#[must_use]
pub fn fit_transform(x: &[Vec<f64>], n_components: usize) -> Vec<Vec<f64>> {
    let model = fit(x, n_components);
    model.transform(x, n_components)
}

/// Picks how many dimensions retain `variance_threshold` of the variance
/// and reduces to them. Inputs at 50 features or fewer pass through
/// untouched; the dimension count is floored at 2 and capped at
/// `max_dims`. Reduction only happens when it actually shrinks the data.
#[must_use]
pub fn optimize_dimensions(
    x: &[Vec<f64>],
    variance_threshold: f64,
    max_dims: usize,
) -> (usize, Vec<Vec<f64>>) {
    let n = x.len();
    let d = x.first().map_or(0, Vec::len);

    if d <= 50 {
        return (d, x.to_vec());
    }

    let max_possible = n.min(d).min(max_dims);
    let model = fit(x, max_possible);

    let mut cumulative = 0.0;
    let mut reached = None;
    for (index, ratio) in model.explained_variance_ratio.iter().enumerate() {
        cumulative += ratio;
        if cumulative >= variance_threshold {
            reached = Some(index + 1);
            break;
        }
    }
    let dims = reached.unwrap_or(1).max(2);

    if dims < d {
        (dims, model.transform(x, dims))
    } else {
        (d, x.to_vec())
    }
}

/// Two-dimensional layout for visualization. Below five samples the first
/// two coordinates stand in for a projection, zero-padded if the data is
/// narrower than that.
#[must_use]
pub fn project_2d(x: &[Vec<f64>]) -> Vec<[f64; 2]> {
    let n = x.len();
    if n < 5 {
        return x
            .iter()
            .map(|row| {
                [
                    row.first().copied().unwrap_or(0.0),
                    row.get(1).copied().unwrap_or(0.0),
                ]
            })
            .collect();
    }
    fit_transform(x, 2)
        .into_iter()
        .map(|row| {
            [
                row.first().copied().unwrap_or(0.0),
                row.get(1).copied().unwrap_or(0.0),
            ]
        })
        .collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// d-by-d column covariance of already-centered rows.
fn gram_of_columns(centered: &[Vec<f64>], denom: f64) -> Vec<Vec<f64>> {
    let d = centered.first().map_or(0, Vec::len);
    let mut matrix = vec![vec![0.0; d]; d];
    for row in centered {
        for i in 0..d {
            let vi = row[i];
            if vi == 0.0 {
                continue;
            }
            for j in i..d {
                matrix[i][j] += vi * row[j];
            }
        }
    }
    for i in 0..d {
        for j in i..d {
            let value = matrix[i][j] / denom;
            matrix[i][j] = value;
            matrix[j][i] = value;
        }
    }
    matrix
}

/// n-by-n row Gram matrix of already-centered rows.
fn gram_of_rows(centered: &[Vec<f64>], denom: f64) -> Vec<Vec<f64>> {
    let n = centered.len();
    let mut matrix = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in i..n {
            let value = dot(&centered[i], &centered[j]) / denom;
            matrix[i][j] = value;
            matrix[j][i] = value;
        }
    }
    matrix
}

/// Leading eigenpairs of a symmetric PSD matrix, strongest first. Each
/// iterate is re-orthogonalized against the pairs already found, which
/// doubles as deflation.
fn top_eigenpairs(matrix: &[Vec<f64>], k: usize, rng: &mut SmallRng) -> Vec<(f64, Vec<f64>)> {
    let size = matrix.len();
    let mut pairs: Vec<(f64, Vec<f64>)> = Vec::with_capacity(k.min(size));

    for _ in 0..k.min(size) {
        let mut vector: Vec<f64> = (0..size).map(|_| rng.gen::<f64>() - 0.5).collect();
        orthogonalize(&mut vector, &pairs);
        if !normalize(&mut vector) {
            break;
        }

        let mut eigenvalue = 0.0;
        for _ in 0..POWER_MAX_ITER {
            let mut next = multiply(matrix, &vector);
            orthogonalize(&mut next, &pairs);
            let norm = dot(&next, &next).sqrt();
            if norm <= f64::EPSILON {
                // Remaining spectrum is numerically zero.
                eigenvalue = 0.0;
                break;
            }
            for value in &mut next {
                *value /= norm;
            }
            let delta = (norm - eigenvalue).abs();
            eigenvalue = norm;
            vector = next;
            if delta <= POWER_TOL * eigenvalue.max(1.0) {
                break;
            }
        }
        pairs.push((eigenvalue, vector));
    }
    pairs
}

fn multiply(matrix: &[Vec<f64>], vector: &[f64]) -> Vec<f64> {
    matrix.iter().map(|row| dot(row, vector)).collect()
}

fn orthogonalize(vector: &mut [f64], pairs: &[(f64, Vec<f64>)]) {
    for (_, basis) in pairs {
        let projection = dot(vector, basis);
        for (value, b) in vector.iter_mut().zip(basis) {
            *value -= projection * b;
        }
    }
}

fn normalize(vector: &mut [f64]) -> bool {
    let norm = dot(vector, vector).sqrt();
    if norm <= f64::EPSILON {
        return false;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_data() -> Vec<Vec<f64>> {
        // Points along the (1, 1) diagonal with tiny off-axis noise: one
        // dominant component.
        (0..20)
            .map(|i| {
                let t = f64::from(i);
                vec![t, t + if i % 2 == 0 { 0.01 } else { -0.01 }]
            })
            .collect()
    }

    #[test]
    fn first_component_captures_dominant_direction() {
        let model = fit(&line_data(), 2);
        assert_eq!(model.components.len(), 2);
        assert!(model.explained_variance_ratio[0] > 0.99);
        let axis = &model.components[0];
        // Direction is (1, 1)/sqrt(2) up to sign.
        assert!((axis[0].abs() - axis[1].abs()).abs() < 1e-3);
    }

    #[test]
    fn ratios_sum_to_at_most_one_and_descend() {
        let data: Vec<Vec<f64>> = (0..30)
            .map(|i| {
                let t = f64::from(i);
                vec![t, (t * 0.7).sin() * 3.0, t * 0.1, 0.5]
            })
            .collect();
        let model = fit(&data, 4);
        let total: f64 = model.explained_variance_ratio.iter().sum();
        assert!(total <= 1.0 + 1e-6);
        for window in model.explained_variance_ratio.windows(2) {
            assert!(window[0] >= window[1] - 1e-9);
        }
    }

    #[test]
    fn gram_route_matches_covariance_route() {
        // 3 samples in 8 dims forces the Gram path; projecting onto one
        // component must preserve pairwise ordering along the spread.
        let wide: Vec<Vec<f64>> = (0..3)
            .map(|i| (0..8).map(|j| f64::from(i) * f64::from(j + 1)).collect())
            .collect();
        let projected = fit_transform(&wide, 1);
        assert_eq!(projected.len(), 3);
        let spread01 = (projected[0][0] - projected[1][0]).abs();
        let spread02 = (projected[0][0] - projected[2][0]).abs();
        assert!(spread02 > spread01);
    }

    #[test]
    fn narrow_input_skips_reduction() {
        let data = vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]];
        let (dims, reduced) = optimize_dimensions(&data, 0.9, 100);
        assert_eq!(dims, 2);
        assert_eq!(reduced, data);
    }

    #[test]
    fn threshold_prefers_few_dimensions_for_low_rank_data() {
        // 60 features but rank ~1: the 90% threshold lands on 2 (the floor).
        let data: Vec<Vec<f64>> = (0..25)
            .map(|i| (0..60).map(|j| f64::from(i) * f64::from(j + 1) * 0.01).collect())
            .collect();
        let (dims, reduced) = optimize_dimensions(&data, 0.9, 100);
        assert_eq!(dims, 2);
        assert_eq!(reduced.len(), 25);
        assert_eq!(reduced[0].len(), 2);
    }

    #[test]
    fn tiny_sets_project_to_leading_coordinates() {
        let data = vec![vec![3.0, 4.0, 5.0], vec![6.0, 7.0, 8.0]];
        let points = project_2d(&data);
        assert_eq!(points, vec![[3.0, 4.0], [6.0, 7.0]]);
    }

    #[test]
    fn projection_is_deterministic() {
        let data = line_data();
        assert_eq!(project_2d(&data), project_2d(&data));
    }
}
