//! Client model updates as delivered to the coordinator core.

use chrono::{DateTime, Utc};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::GuardError;

/// One dense layer of model weights.
pub type Layer = Array1<f32>;

/// Ordered per-layer weights of a model.
pub type Weights = Vec<Layer>;

/// Training metrics reported alongside a client update.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    /// Training loss (>= 0)
    pub loss: f32,
    /// Accuracy in \[0, 1\]
    pub accuracy: f32,
    /// Wall-clock training time in seconds
    pub training_duration: f32,
}

impl Default for TrainingMetrics {
    fn default() -> Self {
        Self {
            loss: 0.0,
            accuracy: 1.0,
            training_duration: 0.0,
        }
    }
}

/// One participant's contribution for one round.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientUpdate {
    /// Opaque client identifier
    pub client_id: String,
    /// Training round the update belongs to
    pub round: u64,
    /// Per-layer weights
    pub weights: Weights,
    /// Reported training metrics
    pub metrics: TrainingMetrics,
    /// When the update was produced
    pub timestamp: DateTime<Utc>,
}

impl ClientUpdate {
    /// Create an update stamped with the current time.
    pub fn new(
        client_id: impl Into<String>,
        round: u64,
        weights: Weights,
        metrics: TrainingMetrics,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            round,
            weights,
            metrics,
            timestamp: Utc::now(),
        }
    }

    /// Per-layer lengths of this update.
    pub fn shape(&self) -> Vec<usize> {
        layer_shape(&self.weights)
    }

    /// Total number of scalar coordinates across all layers.
    pub fn num_params(&self) -> usize {
        self.weights.iter().map(|l| l.len()).sum()
    }
}

/// Per-layer lengths of a weight set.
pub fn layer_shape(weights: &[Layer]) -> Vec<usize> {
    weights.iter().map(|l| l.len()).collect()
}

/// Check that `weights` has exactly the per-layer lengths in `expected`.
pub fn ensure_shape(client_id: &str, weights: &[Layer], expected: &[usize]) -> Result<(), GuardError> {
    let matches = weights.len() == expected.len()
        && weights.iter().zip(expected).all(|(l, &n)| l.len() == n);
    if matches {
        Ok(())
    } else {
        Err(GuardError::ShapeMismatch {
            client_id: client_id.to_string(),
            expected: expected.to_vec(),
            actual: layer_shape(weights),
        })
    }
}
