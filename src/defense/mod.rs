//! Robust aggregation engine: anomaly detection, Byzantine scoring, and
//! multi-Krum filtering of client updates.
//!
//! | Stage | What it checks |
//! |-------|----------------|
//! | [`anomaly`] | Per-layer weight z-scores, accuracy/loss z-scores |
//! | [`byzantine`] | Sign flips, extreme coordinates, distance to history |
//! | [`krum`] | Batch-level nearest-neighbour selection |
//!
//! The first `min_updates_for_detection - 1` validations are a cold start:
//! they fill the history and are accepted without statistical checks.
//!
//! # Example
//!
//! ```rust
//! use ndarray::array;
//! use qora_guard::config::DefenseConfig;
//! use qora_guard::defense::RobustAggregationEngine;
//! use qora_guard::update::{ClientUpdate, TrainingMetrics};
//!
//! let engine = RobustAggregationEngine::new(DefenseConfig::default()).unwrap();
//! let global = vec![array![0.0f32, 0.0]];
//! let update = ClientUpdate::new("client_0", 1, vec![array![0.1, -0.1]], TrainingMetrics::default());
//!
//! let result = engine.validate(&update, &global).unwrap();
//! assert!(result.is_valid);
//! assert!(result.anomalies.is_empty());
//! ```

pub mod anomaly;
pub mod byzantine;
pub mod history;
pub mod krum;

pub use byzantine::ByzantineSignals;
pub use history::{HistorySnapshot, UpdateHistory};

use std::sync::Arc;

use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::alerts::{Alert, AlertSink, TracingSink};
use crate::config::DefenseConfig;
use crate::error::GuardError;
use crate::math::norms::rms_distance;
use crate::reputation::ReputationTracker;
use crate::update::{ensure_shape, layer_shape, ClientUpdate, Layer, TrainingMetrics};
use crate::verification::audit::{AuditLog, DefenseAuditEntry};

/// Metrics reported with every validation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetrics {
    /// Reported accuracy
    pub accuracy: f32,
    /// Reported loss
    pub loss: f32,
    /// RMS distance to the global model
    pub divergence: f64,
}

/// Verdict for one update.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Accept the update for aggregation
    pub is_valid: bool,
    /// Reported and derived metrics
    pub metrics: ValidationMetrics,
    /// Human-readable findings, in detection order
    pub anomalies: Vec<String>,
    /// Client's Byzantine score after this update
    pub byzantine_score: f32,
    /// Whether the history was too short for statistical checks
    pub cold_start: bool,
}

/// Statistical findings for one update, computed from a history snapshot.
#[derive(Clone, Debug)]
struct Findings {
    anomalies: Vec<String>,
    signals: ByzantineSignals,
}

impl Findings {
    fn compute(update: &ClientUpdate, snapshot: &HistorySnapshot<'_>, config: &DefenseConfig) -> Self {
        Self {
            anomalies: anomaly::detect_anomalies(update, snapshot, config.outlier_threshold),
            signals: byzantine::assess(update, snapshot, config.outlier_threshold),
        }
    }
}

struct DefenseState {
    history: UpdateHistory,
    reputation: ReputationTracker,
    audit: AuditLog,
}

/// Robust aggregation engine owning the update history and client scores.
pub struct RobustAggregationEngine {
    config: DefenseConfig,
    sink: Arc<dyn AlertSink>,
    state: Mutex<DefenseState>,
}

impl std::fmt::Debug for RobustAggregationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RobustAggregationEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RobustAggregationEngine {
    /// Validate `config` and build an engine that logs alerts via `tracing`.
    pub fn new(config: DefenseConfig) -> Result<Self, GuardError> {
        Self::with_sink(config, Arc::new(TracingSink))
    }

    /// Validate `config` and build an engine reporting to `sink`.
    pub fn with_sink(config: DefenseConfig, sink: Arc<dyn AlertSink>) -> Result<Self, GuardError> {
        config.validate()?;
        tracing::info!(
            outlier_threshold = config.outlier_threshold,
            min_updates = config.min_updates_for_detection,
            byzantine_threshold = config.byzantine_threshold,
            use_krum = config.use_krum,
            "defense engine initialized"
        );
        Ok(Self {
            state: Mutex::new(DefenseState {
                history: UpdateHistory::new(config.min_updates_for_detection),
                reputation: ReputationTracker::new(),
                audit: AuditLog::new(),
            }),
            sink,
            config,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &DefenseConfig {
        &self.config
    }

    /// Validate one update against the history and the global model.
    ///
    /// The update joins the history before it is judged. Shape mismatches
    /// against `global_weights` or the history are structural errors and
    /// leave all state untouched.
    pub fn validate(
        &self,
        update: &ClientUpdate,
        global_weights: &[Layer],
    ) -> Result<ValidationResult, GuardError> {
        let expected = layer_shape(global_weights);
        ensure_shape(&update.client_id, &update.weights, &expected)?;

        let result = {
            let mut state = self.state.lock();
            if let Some(shape) = state.history.shape() {
                ensure_shape(&update.client_id, &update.weights, &shape)?;
            }

            state.history.push(update.clone());
            let divergence = rms_distance(&update.weights, global_weights);

            if state.history.is_ready() {
                let findings = Findings::compute(update, &state.history.snapshot(), &self.config);
                self.apply_findings(&mut state.reputation, update, findings, divergence)
            } else {
                cold_start(&mut state.reputation, update, divergence)
            }
        };

        self.report(update, &result);
        Ok(result)
    }

    /// Validate a round's updates against one shared history snapshot.
    ///
    /// All updates join the history first (in order), findings are computed
    /// in parallel from the resulting snapshot, then score updates are
    /// applied in submission order. Updates that would still be in cold
    /// start under sequential validation are reported as such.
    pub fn validate_batch(
        &self,
        updates: &[ClientUpdate],
        global_weights: &[Layer],
    ) -> Result<Vec<ValidationResult>, GuardError> {
        let expected = layer_shape(global_weights);
        for update in updates {
            ensure_shape(&update.client_id, &update.weights, &expected)?;
        }

        let results = {
            let mut state = self.state.lock();
            if let Some(shape) = state.history.shape() {
                for update in updates {
                    ensure_shape(&update.client_id, &update.weights, &shape)?;
                }
            }

            let len_before = state.history.len();
            for update in updates {
                state.history.push(update.clone());
            }

            let min_updates = self.config.min_updates_for_detection;
            let ready: Vec<bool> = (0..updates.len())
                .map(|i| len_before + i + 1 >= min_updates)
                .collect();

            let findings: Vec<Option<Findings>> = {
                let snapshot = state.history.try_snapshot();
                updates
                    .par_iter()
                    .zip(ready.par_iter())
                    .map(|(update, &ready)| match (&snapshot, ready) {
                        (Some(snapshot), true) => {
                            Some(Findings::compute(update, snapshot, &self.config))
                        }
                        _ => None,
                    })
                    .collect()
            };

            let DefenseState { reputation, .. } = &mut *state;
            updates
                .iter()
                .zip(findings)
                .map(|(update, findings)| {
                    let divergence = rms_distance(&update.weights, global_weights);
                    match findings {
                        Some(findings) => self.apply_findings(reputation, update, findings, divergence),
                        None => cold_start(reputation, update, divergence),
                    }
                })
                .collect::<Vec<_>>()
        };

        for (update, result) in updates.iter().zip(&results) {
            self.report(update, result);
        }
        Ok(results)
    }

    /// Filter a round's updates down to the subset safe to aggregate.
    ///
    /// Applies multi-Krum when enabled, then drops every client whose score
    /// is below 0.5 (clients never validated read 0.0).
    pub fn aggregate_defense(
        &self,
        updates: Vec<ClientUpdate>,
        global_weights: &[Layer],
    ) -> Result<Vec<ClientUpdate>, GuardError> {
        if updates.is_empty() {
            return Err(GuardError::EmptyUpdates);
        }
        let expected = layer_shape(global_weights);
        for update in &updates {
            ensure_shape(&update.client_id, &update.weights, &expected)?;
        }

        let n_submitted = updates.len();
        let round = updates.first().map(|u| u.round);

        let selected = if self.config.use_krum {
            let weights: Vec<&[Layer]> = updates.iter().map(|u| u.weights.as_slice()).collect();
            let keep = krum::multi_krum(&weights);
            let mut keep = keep.into_iter().peekable();
            updates
                .into_iter()
                .enumerate()
                .filter_map(|(i, u)| {
                    if keep.peek() == Some(&i) {
                        keep.next();
                        Some(u)
                    } else {
                        None
                    }
                })
                .collect::<Vec<_>>()
        } else {
            updates
        };
        let n_after_krum = selected.len();

        let mut state = self.state.lock();
        let kept: Vec<ClientUpdate> = selected
            .into_iter()
            .filter(|u| state.reputation.is_trusted(&u.client_id))
            .collect();

        let entry = DefenseAuditEntry {
            round,
            n_submitted,
            n_after_krum,
            n_low_reputation: n_after_krum - kept.len(),
            used_krum: self.config.use_krum,
        };
        tracing::debug!(
            round = ?round,
            n_submitted,
            n_after_krum,
            n_low_reputation = entry.n_low_reputation,
            "defense filter applied"
        );
        state.audit.push(entry);
        drop(state);

        self.sink.emit(&Alert::DefenseApplied {
            round,
            submitted: n_submitted,
            kept: kept.len(),
        });
        Ok(kept)
    }

    /// Client score; 0.0 for clients never validated.
    pub fn get_client_score(&self, client_id: &str) -> f64 {
        f64::from(self.state.lock().reputation.client_score(client_id))
    }

    /// Byzantine score; 0.0 for clients never validated.
    pub fn get_byzantine_score(&self, client_id: &str) -> f64 {
        f64::from(self.state.lock().reputation.byzantine_score(client_id))
    }

    /// Move every client score toward the neutral 0.5 by `rate`.
    pub fn decay_client_scores(&self, rate: f32) {
        self.state.lock().reputation.decay_client_scores(rate);
    }

    /// Number of updates currently in the history.
    pub fn history_len(&self) -> usize {
        self.state.lock().history.len()
    }

    /// Snapshot of the defense audit log.
    pub fn audit_log(&self) -> AuditLog {
        self.state.lock().audit.clone()
    }

    /// Snapshot of all client and Byzantine scores.
    pub fn reputation(&self) -> ReputationTracker {
        self.state.lock().reputation.clone()
    }

    fn apply_findings(
        &self,
        reputation: &mut ReputationTracker,
        update: &ClientUpdate,
        findings: Findings,
        divergence: f64,
    ) -> ValidationResult {
        let Findings {
            mut anomalies,
            signals,
        } = findings;
        let is_anomalous = !anomalies.is_empty();

        let byzantine_score = reputation.record_suspicion(&update.client_id, signals.score);
        let is_byzantine = byzantine_score > self.config.byzantine_threshold;
        if is_byzantine {
            tracing::warn!(
                client_id = %update.client_id,
                round = update.round,
                byzantine_score,
                "byzantine behaviour suspected"
            );
            anomalies.push(format!(
                "Byzantine behavior suspected: score {:.3} exceeds threshold {:.3}",
                byzantine_score, self.config.byzantine_threshold
            ));
        }

        let locally_valid = self.check_metrics(update, &mut anomalies);

        reputation.record_validation(&update.client_id, locally_valid);

        tracing::debug!(
            client_id = %update.client_id,
            opposite_sign = signals.opposite_sign_fraction,
            magnitude_outliers = signals.magnitude_outlier_fraction,
            mean_distance = signals.mean_distance,
            suspicion = signals.score,
            byzantine_score,
            "update assessed"
        );

        ValidationResult {
            is_valid: locally_valid && !is_anomalous && !is_byzantine,
            metrics: metrics_for(update, divergence),
            anomalies,
            byzantine_score,
            cold_start: false,
        }
    }

    /// Local accuracy/loss checks. Non-finite or out-of-range metrics fail.
    fn check_metrics(&self, update: &ClientUpdate, anomalies: &mut Vec<String>) -> bool {
        let TrainingMetrics { accuracy, loss, .. } = update.metrics;
        let mut passed = true;

        if !(0.0..=1.0).contains(&accuracy) {
            passed = false;
            anomalies.push(format!("Accuracy {} outside [0, 1]", accuracy));
        } else if accuracy < self.config.accuracy_threshold {
            passed = false;
            anomalies.push(format!(
                "Accuracy {:.4} below threshold {:.4}",
                accuracy, self.config.accuracy_threshold
            ));
        }

        if !(loss.is_finite() && loss >= 0.0) {
            passed = false;
            anomalies.push(format!("Loss {} is not a finite non-negative value", loss));
        } else if loss > self.config.loss_threshold {
            passed = false;
            anomalies.push(format!(
                "Loss {:.4} above threshold {:.4}",
                loss, self.config.loss_threshold
            ));
        }

        passed
    }

    fn report(&self, update: &ClientUpdate, result: &ValidationResult) {
        if !result.anomalies.is_empty() {
            self.sink.emit(&Alert::AnomalyDetected {
                client_id: update.client_id.clone(),
                round: update.round,
                anomalies: result.anomalies.clone(),
            });
        }
    }
}

fn cold_start(reputation: &mut ReputationTracker, update: &ClientUpdate, divergence: f64) -> ValidationResult {
    reputation.register(&update.client_id);
    ValidationResult {
        is_valid: true,
        metrics: metrics_for(update, divergence),
        anomalies: Vec::new(),
        byzantine_score: reputation.byzantine_score(&update.client_id),
        cold_start: true,
    }
}

fn metrics_for(update: &ClientUpdate, divergence: f64) -> ValidationMetrics {
    ValidationMetrics {
        accuracy: update.metrics.accuracy,
        loss: update.metrics.loss,
        divergence,
    }
}
