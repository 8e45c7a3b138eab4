//! Generic score store shared by the client-trust and Byzantine-suspicion
//! tracks of [`ReputationTracker`](super::ReputationTracker).

use std::borrow::Borrow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Per-identifier scores in \[0.0, 1.0\] with an explicit first-touch default.
///
/// Wraps a `BTreeMap<ID, f32>`: entries are created only through
/// [`touch`](Self::touch) or [`ema_update`](Self::ema_update), which seed
/// them with `default_score`. Lookups never insert.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScoreStore<ID: Ord> {
    scores: BTreeMap<ID, f32>,
    default_score: f32,
}

impl<ID: Ord + Clone> ScoreStore<ID> {
    /// Create an empty store whose new entries start at `default_score`.
    pub fn new(default_score: f32) -> Self {
        Self {
            scores: BTreeMap::new(),
            default_score: default_score.clamp(0.0, 1.0),
        }
    }

    /// Score new entries start at.
    pub fn default_score(&self) -> f32 {
        self.default_score
    }

    /// Score for an identifier, `None` if never touched.
    pub fn get<Q>(&self, id: &Q) -> Option<f32>
    where
        ID: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.scores.get(id).copied()
    }

    /// Create the entry at the default score if missing; return its score.
    pub fn touch(&mut self, id: ID) -> f32 {
        *self.scores.entry(id).or_insert(self.default_score)
    }

    /// Set a score (clamped to \[0.0, 1.0\]).
    pub fn set_score(&mut self, id: ID, score: f32) {
        self.scores.insert(id, score.clamp(0.0, 1.0));
    }

    /// Fold `observation` into the score: `weight * obs + (1 - weight) * old`.
    ///
    /// Missing entries start from the default score. Returns the new score.
    pub fn ema_update(&mut self, id: ID, observation: f32, weight: f32) -> f32 {
        let default = self.default_score;
        let score = self.scores.entry(id).or_insert(default);
        *score = (weight * observation + (1.0 - weight) * *score).clamp(0.0, 1.0);
        *score
    }

    /// Move all scores toward `target` by `rate` in \[0, 1\].
    pub fn decay_toward(&mut self, target: f32, rate: f32) {
        let rate = rate.clamp(0.0, 1.0);
        for score in self.scores.values_mut() {
            *score += rate * (target - *score);
        }
    }

    /// Number of identifiers whose score is strictly below `threshold`.
    pub fn count_below(&self, threshold: f32) -> usize {
        self.scores.values().filter(|&&s| s < threshold).count()
    }

    /// Remove all entries.
    pub fn clear(&mut self) {
        self.scores.clear();
    }

    /// Number of tracked entries.
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Iterate over `(id, score)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&ID, &f32)> {
        self.scores.iter()
    }
}
