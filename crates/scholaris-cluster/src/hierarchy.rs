// SPDX-License-Identifier: Apache-2.0
//! Agglomerative clustering over Euclidean embeddings.
//!
//! Classic greedy scheme: start from singletons, repeatedly merge the
//! closest pair, update the remaining distances with the Lance-Williams
//! recurrence for the chosen linkage. Ward operates on squared
//! distances; ties always resolve to the earliest pair.

use crate::kmeans::squared_distance;
use crate::ClusterError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    Ward,
    Complete,
    Average,
}

/// Cuts the merge tree at `k` clusters. Labels are numbered by the
/// smallest sample index each cluster contains, so sample 0 is always
/// in cluster 0.
pub fn agglomerate(x: &[Vec<f64>], k: usize, linkage: Linkage) -> Result<Vec<i32>, ClusterError> {
    let n = x.len();
    if k == 0 || k > n {
        return Err(ClusterError(format!(
            "hierarchical clustering needs 1..={n} clusters for {n} samples, got {k}"
        )));
    }
    if k == n {
        return Ok((0..n).map(|i| i as i32).collect());
    }

    // Squared distances for ward, plain Euclidean otherwise.
    let mut distance = vec![0.0f64; n * n];
    for i in 0..n {
        for j in (i + 1)..n {
            let squared = squared_distance(&x[i], &x[j]);
            let value = match linkage {
                Linkage::Ward => squared,
                Linkage::Complete | Linkage::Average => squared.sqrt(),
            };
            distance[i * n + j] = value;
            distance[j * n + i] = value;
        }
    }

    let mut active = vec![true; n];
    let mut size = vec![1usize; n];
    let mut members: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();
    // nearest[i] = (best distance, partner) over active partners.
    let mut nearest: Vec<(f64, usize)> = (0..n)
        .map(|i| nearest_partner(&distance, &active, n, i))
        .collect();

    let mut remaining = n;
    while remaining > k {
        let mut best = (f64::INFINITY, usize::MAX);
        for i in 0..n {
            if active[i] && nearest[i].0 < best.0 {
                best = (nearest[i].0, i);
            }
        }
        let i = best.1;
        let j = nearest[i].1;
        let (i, j) = (i.min(j), i.max(j));

        // Lance-Williams update of d(merged, other) in slot i.
        let d_ij = distance[i * n + j];
        for other in 0..n {
            if !active[other] || other == i || other == j {
                continue;
            }
            let d_ik = distance[i * n + other];
            let d_jk = distance[j * n + other];
            let updated = match linkage {
                Linkage::Ward => {
                    let ni = size[i] as f64;
                    let nj = size[j] as f64;
                    let nk = size[other] as f64;
                    ((ni + nk) * d_ik + (nj + nk) * d_jk - nk * d_ij) / (ni + nj + nk)
                }
                Linkage::Complete => d_ik.max(d_jk),
                Linkage::Average => {
                    let ni = size[i] as f64;
                    let nj = size[j] as f64;
                    (ni * d_ik + nj * d_jk) / (ni + nj)
                }
            };
            distance[i * n + other] = updated;
            distance[other * n + i] = updated;
        }

        active[j] = false;
        size[i] += size[j];
        let absorbed = std::mem::take(&mut members[j]);
        members[i].extend(absorbed);
        remaining -= 1;

        nearest[i] = nearest_partner(&distance, &active, n, i);
        for other in 0..n {
            if !active[other] || other == i {
                continue;
            }
            let stale = nearest[other].1 == i || nearest[other].1 == j;
            let closer = distance[other * n + i] < nearest[other].0;
            if stale {
                nearest[other] = nearest_partner(&distance, &active, n, other);
            } else if closer {
                nearest[other] = (distance[other * n + i], i);
            }
        }
    }

    let mut labels = vec![0i32; n];
    let mut clusters: Vec<&Vec<usize>> = (0..n).filter(|&i| active[i]).map(|i| &members[i]).collect();
    clusters.sort_by_key(|cluster| cluster.iter().copied().min().unwrap_or(usize::MAX));
    for (label, cluster) in clusters.iter().enumerate() {
        for &sample in cluster.iter() {
            labels[sample] = label as i32;
        }
    }
    Ok(labels)
}

fn nearest_partner(distance: &[f64], active: &[bool], n: usize, i: usize) -> (f64, usize) {
    let mut best = (f64::INFINITY, usize::MAX);
    for j in 0..n {
        if j == i || !active[j] {
            continue;
        }
        let d = distance[i * n + j];
        if d < best.0 {
            best = (d, j);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_blobs() -> Vec<Vec<f64>> {
        let mut data = Vec::new();
        for i in 0..6 {
            let jitter = f64::from(i) * 0.02;
            data.push(vec![0.0 + jitter, 0.0]);
            data.push(vec![50.0, 50.0 + jitter]);
            data.push(vec![100.0 + jitter, 0.0]);
        }
        data
    }

    #[test]
    fn every_linkage_recovers_separated_blobs() {
        let data = three_blobs();
        for linkage in [Linkage::Ward, Linkage::Complete, Linkage::Average] {
            let labels = agglomerate(&data, 3, linkage).unwrap();
            for (i, label) in labels.iter().enumerate() {
                assert_eq!(*label, labels[i % 3], "linkage {linkage:?}");
            }
            let mut distinct = labels.clone();
            distinct.sort_unstable();
            distinct.dedup();
            assert_eq!(distinct.len(), 3);
        }
    }

    #[test]
    fn labels_are_numbered_by_first_sample() {
        let data = three_blobs();
        let labels = agglomerate(&data, 3, Linkage::Ward).unwrap();
        assert_eq!(labels[0], 0);
        assert_eq!(labels[1], 1);
        assert_eq!(labels[2], 2);
    }

    #[test]
    fn single_cluster_and_identity_cuts() {
        let data = vec![vec![0.0], vec![1.0], vec![5.0], vec![6.0]];
        assert_eq!(agglomerate(&data, 1, Linkage::Average).unwrap(), vec![0, 0, 0, 0]);
        assert_eq!(agglomerate(&data, 4, Linkage::Average).unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn pairs_merge_before_distant_points() {
        // Two tight pairs plus an outlier: at k=3 the outlier stays alone.
        let data = vec![
            vec![0.0, 0.0],
            vec![0.1, 0.0],
            vec![10.0, 0.0],
            vec![10.1, 0.0],
            vec![100.0, 0.0],
        ];
        let labels = agglomerate(&data, 3, Linkage::Ward).unwrap();
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[2], labels[3]);
        assert_ne!(labels[0], labels[2]);
        assert_ne!(labels[4], labels[0]);
        assert_ne!(labels[4], labels[2]);
    }

    #[test]
    fn rejects_bad_cluster_counts() {
        let data = vec![vec![0.0], vec![1.0]];
        assert!(agglomerate(&data, 0, Linkage::Ward).is_err());
        assert!(agglomerate(&data, 3, Linkage::Ward).is_err());
    }
}
