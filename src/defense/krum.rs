//! Multi-Krum selection over layered model updates.
//!
//! Implements the Krum criterion (Blanchard et al., 2017): each update is
//! scored by the sum of distances to its `m` nearest neighbours, and the `m`
//! updates with the lowest scores are kept. An honest majority clusters, so
//! outliers accumulate large scores.
//!
//! Reference: "Machine Learning with Adversaries: Byzantine Tolerant Gradient Descent"

use std::cmp::Ordering;

use rayon::prelude::*;

use crate::math::norms::rms_distance;
use crate::update::Layer;
use crate::verification::krum_condition::krum_keep_count;

/// Pairwise RMS distance matrix (symmetric, zero diagonal).
pub fn distance_matrix(updates: &[&[Layer]]) -> Vec<Vec<f64>> {
    (0..updates.len())
        .into_par_iter()
        .map(|i| {
            (0..updates.len())
                .map(|j| {
                    if i == j {
                        0.0
                    } else {
                        rms_distance(updates[i], updates[j])
                    }
                })
                .collect()
        })
        .collect()
}

/// Krum score of every row: sum of its `m` smallest off-diagonal distances.
pub fn krum_scores(distances: &[Vec<f64>], m: usize) -> Vec<f64> {
    distances
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut others: Vec<f64> = row
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(_, &d)| d)
                .collect();
            others.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
            others.iter().take(m).sum()
        })
        .collect()
}

/// Indices of the updates multi-Krum keeps, in submission order.
///
/// With `n` updates, `f = (n - 1) / 2` and `m = n - f - 2`. When `m <= 0`
/// every index is returned unfiltered. Ties between equal scores go to the
/// lower index.
pub fn multi_krum(updates: &[&[Layer]]) -> Vec<usize> {
    let n = updates.len();
    let Some(m) = krum_keep_count(n) else {
        return (0..n).collect();
    };

    let scores = krum_scores(&distance_matrix(updates), m);

    let mut order: Vec<usize> = (0..n).collect();
    // Stable sort keeps index order among equal scores
    order.sort_by(|&a, &b| scores[a].partial_cmp(&scores[b]).unwrap_or(Ordering::Equal));

    let mut kept: Vec<usize> = order.into_iter().take(m).collect();
    kept.sort_unstable();
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    fn layers(values: &[Vec<Layer>]) -> Vec<&[Layer]> {
        values.iter().map(|w| w.as_slice()).collect()
    }

    #[test]
    fn test_distance_matrix_symmetric() {
        let updates = vec![
            vec![array![0.0f32, 0.0]],
            vec![array![3.0f32, 4.0]],
            vec![array![0.0f32, 1.0]],
        ];
        let d = distance_matrix(&layers(&updates));
        for i in 0..3 {
            assert_eq!(d[i][i], 0.0);
            for j in 0..3 {
                assert!((d[i][j] - d[j][i]).abs() < 1e-12);
            }
        }
        // RMS over 2 coordinates: sqrt(25 / 2)
        assert!((d[0][1] - 12.5f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_krum_scores_sum_nearest() {
        let distances = vec![
            vec![0.0, 1.0, 2.0, 9.0],
            vec![1.0, 0.0, 1.0, 9.0],
            vec![2.0, 1.0, 0.0, 9.0],
            vec![9.0, 9.0, 9.0, 0.0],
        ];
        let scores = krum_scores(&distances, 2);
        assert_eq!(scores, vec![3.0, 2.0, 3.0, 18.0]);
    }

    #[test]
    fn test_degenerate_returns_all() {
        for n in 0..=3 {
            let updates: Vec<Vec<Layer>> =
                (0..n).map(|i| vec![array![i as f32 * 100.0]]).collect();
            assert_eq!(multi_krum(&layers(&updates)), (0..n).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_rejects_far_update() {
        let mut updates: Vec<Vec<Layer>> = (0..4)
            .map(|i| vec![Array1::from_elem(10, 1.0 + i as f32 * 0.01)])
            .collect();
        updates.insert(2, vec![Array1::from_elem(10, 100.0)]);

        let kept = multi_krum(&layers(&updates));
        // n = 5 -> f = 2, m = 1
        assert_eq!(kept.len(), 1);
        assert!(!kept.contains(&2));
    }

    #[test]
    fn test_keeps_cluster_with_larger_batch() {
        // n = 10 -> f = 4, m = 4
        let mut updates: Vec<Vec<Layer>> = (0..7)
            .map(|i| vec![array![1.0 + i as f32 * 0.01, -1.0]])
            .collect();
        for _ in 0..3 {
            updates.push(vec![array![50.0, 50.0]]);
        }
        let kept = multi_krum(&layers(&updates));
        assert_eq!(kept.len(), 4);
        assert!(kept.iter().all(|&i| i < 7));
    }

    #[test]
    fn test_ties_go_to_lower_index() {
        let updates: Vec<Vec<Layer>> = (0..6).map(|_| vec![array![1.0f32]]).collect();
        // n = 6 -> m = 2, every score is 0
        assert_eq!(multi_krum(&layers(&updates)), vec![0, 1]);
    }

    #[test]
    fn test_deterministic() {
        let updates: Vec<Vec<Layer>> = vec![
            vec![array![1.0, 2.0]],
            vec![array![1.1, 2.1]],
            vec![array![0.9, 1.9]],
            vec![array![1.05, 2.05]],
            vec![array![50.0, 50.0]],
        ];
        let first = multi_krum(&layers(&updates));
        for _ in 0..3 {
            assert_eq!(multi_krum(&layers(&updates)), first);
        }
    }
}
