//! Statistical anomaly checks against the update history.
//!
//! Weights are z-scored per layer against the pooled values of every
//! historical update; the first offending coordinate flags the layer.
//! Reported accuracy and loss are z-scored against their own history.

use crate::defense::history::HistorySnapshot;
use crate::update::ClientUpdate;

/// Describe every statistical anomaly of `update`; empty when none.
pub fn detect_anomalies(
    update: &ClientUpdate,
    snapshot: &HistorySnapshot<'_>,
    outlier_threshold: f64,
) -> Vec<String> {
    let mut anomalies = Vec::new();

    for (layer_idx, (layer, stats)) in update
        .weights
        .iter()
        .zip(snapshot.layer_stats.iter())
        .enumerate()
    {
        let outlier = layer
            .iter()
            .enumerate()
            .map(|(i, &x)| (i, stats.z_score(x as f64)))
            .find(|(_, z)| z.abs() > outlier_threshold);
        if let Some((coord, z)) = outlier {
            anomalies.push(format!(
                "Weight outlier in layer {} at index {}: z-score {:.2}",
                layer_idx, coord, z
            ));
        }
    }

    let accuracy_z = snapshot.accuracy.z_score(update.metrics.accuracy as f64);
    if accuracy_z.abs() > outlier_threshold {
        anomalies.push(format!(
            "Accuracy anomaly: {:.4} (z-score {:.2})",
            update.metrics.accuracy, accuracy_z
        ));
    }

    let loss_z = snapshot.loss.z_score(update.metrics.loss as f64);
    if loss_z.abs() > outlier_threshold {
        anomalies.push(format!(
            "Loss anomaly: {:.4} (z-score {:.2})",
            update.metrics.loss, loss_z
        ));
    }

    anomalies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defense::history::UpdateHistory;
    use crate::update::TrainingMetrics;
    use ndarray::{array, Array1};

    fn metrics(accuracy: f32, loss: f32) -> TrainingMetrics {
        TrainingMetrics {
            loss,
            accuracy,
            training_duration: 1.0,
        }
    }

    fn noisy_history(capacity: usize) -> UpdateHistory {
        let mut history = UpdateHistory::new(capacity);
        for i in 0..capacity {
            let jitter = (i % 3) as f32 * 0.01;
            history.push(ClientUpdate::new(
                format!("c{}", i),
                0,
                vec![array![1.0 + jitter, 2.0 - jitter, 0.5 + jitter]],
                metrics(0.9 - jitter, 0.3 + jitter),
            ));
        }
        history
    }

    #[test]
    fn test_in_distribution_update_is_clean() {
        let history = noisy_history(20);
        let update = ClientUpdate::new("x", 0, vec![array![1.0, 2.0, 0.5]], metrics(0.9, 0.3));
        assert!(detect_anomalies(&update, &history.snapshot(), 3.0).is_empty());
    }

    #[test]
    fn test_weight_outlier_reported_once_per_layer() {
        let mut history = noisy_history(20);
        // Two extreme coordinates in the same layer: one finding
        let update = ClientUpdate::new("x", 0, vec![array![50.0, 50.0, 0.5]], metrics(0.9, 0.3));
        history.push(update.clone());
        let anomalies = detect_anomalies(&update, &history.snapshot(), 3.0);
        assert_eq!(anomalies.len(), 1);
        assert!(anomalies[0].contains("layer 0 at index 0"));
    }

    #[test]
    fn test_metric_anomalies() {
        let mut history = noisy_history(30);
        let update = ClientUpdate::new("x", 0, vec![array![1.0, 2.0, 0.5]], metrics(0.0, 40.0));
        history.push(update.clone());
        let anomalies = detect_anomalies(&update, &history.snapshot(), 3.0);
        assert!(anomalies.iter().any(|a| a.starts_with("Accuracy anomaly")));
        assert!(anomalies.iter().any(|a| a.starts_with("Loss anomaly")));
    }

    #[test]
    fn test_zero_spread_history_never_flags() {
        let mut history = UpdateHistory::new(5);
        for _ in 0..5 {
            history.push(ClientUpdate::new("c", 0, vec![Array1::from_elem(4, 1.0)], metrics(0.9, 0.3)));
        }
        let update = ClientUpdate::new("c", 0, vec![Array1::from_elem(4, 1.0)], metrics(0.9, 0.3));
        assert!(detect_anomalies(&update, &history.snapshot(), 3.0).is_empty());
    }
}
