//! Client reputation tracking.
//!
//! Two independent exponential moving averages are kept per client, both
//! backed by [`ScoreStore`]:
//!
//! - **Client score**: trust in the client's reported training quality.
//!   Starts at 0.5 and moves toward 1.0 for every update passing the local
//!   accuracy/loss checks, toward 0.0 otherwise.
//! - **Byzantine score**: suspicion of adversarial behaviour. Starts at 0.0
//!   and folds in the instantaneous suspicion of each validated update.
//!
//! Both use the same smoothing: `new = 0.3 * observation + 0.7 * old`.
//! The client score does not see anomaly or Byzantine findings.

pub mod store;

pub use store::ScoreStore;

use serde::{Deserialize, Serialize};

/// Weight of the newest observation in both moving averages.
pub const EMA_WEIGHT: f32 = 0.3;

/// First-touch client score.
pub const DEFAULT_CLIENT_SCORE: f32 = 0.5;

/// First-touch Byzantine score.
pub const DEFAULT_BYZANTINE_SCORE: f32 = 0.0;

/// Clients whose score is below this are dropped by the defense filter.
pub const TRUST_THRESHOLD: f32 = 0.5;

/// Per-client trust and Byzantine suspicion scores.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReputationTracker {
    client_scores: ScoreStore<String>,
    byzantine_scores: ScoreStore<String>,
}

impl Default for ReputationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ReputationTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self {
            client_scores: ScoreStore::new(DEFAULT_CLIENT_SCORE),
            byzantine_scores: ScoreStore::new(DEFAULT_BYZANTINE_SCORE),
        }
    }

    /// Make a client known at the neutral score without scoring anything.
    pub fn register(&mut self, client_id: &str) {
        self.client_scores.touch(client_id.to_string());
        self.byzantine_scores.touch(client_id.to_string());
    }

    /// Fold one local validation outcome into the client score.
    pub fn record_validation(&mut self, client_id: &str, passed: bool) -> f32 {
        let observation = if passed { 1.0 } else { 0.0 };
        self.client_scores
            .ema_update(client_id.to_string(), observation, EMA_WEIGHT)
    }

    /// Fold an instantaneous suspicion in \[0, 1\] into the Byzantine score.
    pub fn record_suspicion(&mut self, client_id: &str, suspicion: f32) -> f32 {
        self.byzantine_scores.ema_update(
            client_id.to_string(),
            suspicion.clamp(0.0, 1.0),
            EMA_WEIGHT,
        )
    }

    /// Client score; 0.0 for clients never seen.
    pub fn client_score(&self, client_id: &str) -> f32 {
        self.client_scores.get(client_id).unwrap_or(0.0)
    }

    /// Byzantine score; 0.0 for clients never seen.
    pub fn byzantine_score(&self, client_id: &str) -> f32 {
        self.byzantine_scores
            .get(client_id)
            .unwrap_or(DEFAULT_BYZANTINE_SCORE)
    }

    /// Whether a client may contribute to aggregation.
    pub fn is_trusted(&self, client_id: &str) -> bool {
        self.client_score(client_id) >= TRUST_THRESHOLD
    }

    /// Move every client score toward the neutral default by `rate`.
    pub fn decay_client_scores(&mut self, rate: f32) {
        self.client_scores.decay_toward(DEFAULT_CLIENT_SCORE, rate);
    }

    /// Number of clients with a client score.
    pub fn client_count(&self) -> usize {
        self.client_scores.len()
    }

    /// Number of known clients below the trust threshold.
    pub fn untrusted_count(&self) -> usize {
        self.client_scores.count_below(TRUST_THRESHOLD)
    }

    /// `(client_id, client_score)` pairs in id order.
    pub fn client_scores(&self) -> impl Iterator<Item = (&String, &f32)> {
        self.client_scores.iter()
    }

    /// Forget every score.
    pub fn reset(&mut self) {
        self.client_scores.clear();
        self.byzantine_scores.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unseen_client_reads_zero() {
        let tracker = ReputationTracker::new();
        assert_eq!(tracker.client_score("ghost"), 0.0);
        assert_eq!(tracker.byzantine_score("ghost"), 0.0);
        assert!(!tracker.is_trusted("ghost"));
    }

    #[test]
    fn test_register_is_neutral_and_trusted() {
        let mut tracker = ReputationTracker::new();
        tracker.register("a");
        assert_eq!(tracker.client_score("a"), 0.5);
        assert_eq!(tracker.byzantine_score("a"), 0.0);
        assert!(tracker.is_trusted("a"));
    }

    #[test]
    fn test_validation_ema() {
        let mut tracker = ReputationTracker::new();
        let s = tracker.record_validation("a", true);
        assert!((s - 0.65).abs() < 1e-6);
        let s = tracker.record_validation("a", false);
        assert!((s - 0.455).abs() < 1e-6);
        assert!(!tracker.is_trusted("a"));
        assert_eq!(tracker.untrusted_count(), 1);
    }

    #[test]
    fn test_suspicion_ema_from_zero() {
        let mut tracker = ReputationTracker::new();
        let s = tracker.record_suspicion("a", 0.5);
        assert!((s - 0.15).abs() < 1e-6);
        let s = tracker.record_suspicion("a", 0.0);
        assert!((s - 0.105).abs() < 1e-6);
    }

    #[test]
    fn test_suspicion_clamped() {
        let mut tracker = ReputationTracker::new();
        let s = tracker.record_suspicion("a", 7.0);
        assert!((s - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_decay_toward_neutral() {
        let mut tracker = ReputationTracker::new();
        tracker.record_validation("a", false);
        tracker.record_validation("a", false);
        assert!(!tracker.is_trusted("a"));
        for _ in 0..50 {
            tracker.decay_client_scores(0.2);
        }
        assert!((tracker.client_score("a") - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_reset() {
        let mut tracker = ReputationTracker::new();
        tracker.register("a");
        tracker.reset();
        assert_eq!(tracker.client_count(), 0);
        assert_eq!(tracker.client_score("a"), 0.0);
    }
}
