//! Bounded FIFO of recent updates and the statistics derived from it.

use std::collections::VecDeque;

use ndarray::Array1;

use crate::math::stats::RunningStats;
use crate::update::{layer_shape, ClientUpdate};

/// The most recent updates, oldest evicted first once over capacity.
#[derive(Clone, Debug)]
pub struct UpdateHistory {
    updates: VecDeque<ClientUpdate>,
    capacity: usize,
}

impl UpdateHistory {
    /// Create an empty history holding at most `capacity` updates.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "history capacity must be positive");
        Self {
            updates: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Append an update, returning the evicted one if over capacity.
    pub fn push(&mut self, update: ClientUpdate) -> Option<ClientUpdate> {
        self.updates.push_back(update);
        if self.updates.len() > self.capacity {
            self.updates.pop_front()
        } else {
            None
        }
    }

    /// Number of stored updates.
    pub fn len(&self) -> usize {
        self.updates.len()
    }

    /// Whether no updates are stored.
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Maximum number of stored updates.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the history is full enough for detection.
    pub fn is_ready(&self) -> bool {
        self.updates.len() >= self.capacity
    }

    /// Layer shape of the stored updates, if any.
    pub fn shape(&self) -> Option<Vec<usize>> {
        self.updates.front().map(|u| layer_shape(&u.weights))
    }

    /// Iterate from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &ClientUpdate> {
        self.updates.iter()
    }

    /// Drop every stored update.
    pub fn clear(&mut self) {
        self.updates.clear();
    }

    /// Compute reference statistics over the stored updates.
    ///
    /// # Panics
    ///
    /// Panics if the history is empty; callers run the cold-start check first.
    pub fn snapshot(&self) -> HistorySnapshot<'_> {
        assert!(
            !self.updates.is_empty(),
            "history snapshot requested before any update was recorded"
        );
        HistorySnapshot::compute(&self.updates)
    }

    /// Like [`snapshot`](Self::snapshot), but `None` for an empty history.
    pub fn try_snapshot(&self) -> Option<HistorySnapshot<'_>> {
        if self.updates.is_empty() {
            None
        } else {
            Some(HistorySnapshot::compute(&self.updates))
        }
    }
}

/// Reference distribution computed from an [`UpdateHistory`].
#[derive(Debug)]
pub struct HistorySnapshot<'a> {
    updates: &'a VecDeque<ClientUpdate>,
    /// Pooled mean/std of every scalar in each layer
    pub layer_stats: Vec<RunningStats>,
    /// Element-wise mean of each layer
    pub mean_gradient: Vec<Array1<f64>>,
    /// Distribution of reported accuracy
    pub accuracy: RunningStats,
    /// Distribution of reported loss
    pub loss: RunningStats,
}

impl<'a> HistorySnapshot<'a> {
    fn compute(updates: &'a VecDeque<ClientUpdate>) -> Self {
        let shape = updates.front().map(|u| layer_shape(&u.weights)).unwrap_or_default();
        let n = updates.len() as f64;

        let mut layer_stats = vec![RunningStats::new(); shape.len()];
        let mut mean_gradient: Vec<Array1<f64>> =
            shape.iter().map(|&len| Array1::zeros(len)).collect();
        let mut accuracy = RunningStats::new();
        let mut loss = RunningStats::new();

        for update in updates {
            for ((layer, stats), sum) in update
                .weights
                .iter()
                .zip(layer_stats.iter_mut())
                .zip(mean_gradient.iter_mut())
            {
                for (acc, &x) in sum.iter_mut().zip(layer.iter()) {
                    stats.push(x as f64);
                    *acc += x as f64;
                }
            }
            // Non-finite metrics stay out of the reference distribution
            if update.metrics.accuracy.is_finite() {
                accuracy.push(update.metrics.accuracy as f64);
            }
            if update.metrics.loss.is_finite() {
                loss.push(update.metrics.loss as f64);
            }
        }
        for sum in mean_gradient.iter_mut() {
            sum.mapv_inplace(|s| s / n);
        }

        Self {
            updates,
            layer_stats,
            mean_gradient,
            accuracy,
            loss,
        }
    }

    /// Updates the snapshot was computed from.
    pub fn updates(&self) -> impl Iterator<Item = &'a ClientUpdate> + 'a {
        let updates: &'a VecDeque<ClientUpdate> = self.updates;
        updates.iter()
    }

    /// Number of updates in the snapshot.
    pub fn len(&self) -> usize {
        self.updates.len()
    }

    /// Whether the snapshot is empty (never true for a constructed snapshot).
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}
