//! Byzantine suspicion scoring.
//!
//! Three independent signals are combined into a score in \[0, 1\]:
//!
//! | Signal | Trigger | Weight |
//! |--------|---------|--------|
//! | Coordinates opposing the historical mean gradient | fraction > 0.8 | 0.5 |
//! | Coordinates with \|z\| > 2 x outlier threshold | fraction > 0.1 | 0.3 |
//! | Mean RMS distance to historical updates | > 3 x outlier threshold | 0.2 |

use serde::{Deserialize, Serialize};

use crate::defense::history::HistorySnapshot;
use crate::math::norms::rms_distance;
use crate::update::ClientUpdate;

const OPPOSITE_SIGN_TRIGGER: f64 = 0.8;
const OPPOSITE_SIGN_WEIGHT: f32 = 0.5;

const MAGNITUDE_TRIGGER: f64 = 0.1;
const MAGNITUDE_WEIGHT: f32 = 0.3;

const DISTANCE_WEIGHT: f32 = 0.2;

/// Raw signals behind a Byzantine suspicion score.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ByzantineSignals {
    /// Fraction of coordinates whose sign opposes the historical mean
    pub opposite_sign_fraction: f64,
    /// Fraction of coordinates beyond twice the outlier threshold
    pub magnitude_outlier_fraction: f64,
    /// Mean RMS distance to every historical update
    pub mean_distance: f64,
    /// Weighted suspicion in \[0, 1\]
    pub score: f32,
}

/// Score how Byzantine `update` looks against `snapshot`.
pub fn assess(
    update: &ClientUpdate,
    snapshot: &HistorySnapshot<'_>,
    outlier_threshold: f64,
) -> ByzantineSignals {
    let total = update.num_params();
    if total == 0 {
        return ByzantineSignals::default();
    }

    let mut opposite = 0usize;
    let mut extreme = 0usize;
    for ((layer, mean), stats) in update
        .weights
        .iter()
        .zip(snapshot.mean_gradient.iter())
        .zip(snapshot.layer_stats.iter())
    {
        for (&x, &m) in layer.iter().zip(mean.iter()) {
            let x = x as f64;
            if x * m < 0.0 {
                opposite += 1;
            }
            if stats.z_score(x).abs() > 2.0 * outlier_threshold {
                extreme += 1;
            }
        }
    }

    let opposite_sign_fraction = opposite as f64 / total as f64;
    let magnitude_outlier_fraction = extreme as f64 / total as f64;
    let mean_distance = snapshot
        .updates()
        .map(|h| rms_distance(&update.weights, &h.weights))
        .sum::<f64>()
        / snapshot.len() as f64;

    let mut score = 0.0f32;
    if opposite_sign_fraction > OPPOSITE_SIGN_TRIGGER {
        score += OPPOSITE_SIGN_WEIGHT;
    }
    if magnitude_outlier_fraction > MAGNITUDE_TRIGGER {
        score += MAGNITUDE_WEIGHT;
    }
    if mean_distance > 3.0 * outlier_threshold {
        score += DISTANCE_WEIGHT;
    }

    ByzantineSignals {
        opposite_sign_fraction,
        magnitude_outlier_fraction,
        mean_distance,
        score: score.min(1.0),
    }
}
