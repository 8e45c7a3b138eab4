//! Differential privacy engine.
//!
//! Clips each layer of a client update to an L2 bound, adds calibrated
//! Gaussian noise, and charges the client's cumulative budget under basic
//! composition.
//!
//! # Example
//!
//! ```rust
//! use ndarray::array;
//! use qora_guard::config::PrivacyConfig;
//! use qora_guard::privacy::DifferentialPrivacyEngine;
//! use qora_guard::update::{ClientUpdate, TrainingMetrics};
//!
//! let engine = DifferentialPrivacyEngine::initialize(PrivacyConfig::default()).unwrap();
//! let update = ClientUpdate::new("client_0", 1, vec![array![3.0, 4.0]], TrainingMetrics::default());
//!
//! let processed = engine.process(update).unwrap();
//! assert_eq!(processed.metrics.gradient_norm, 5.0);
//! assert_eq!(engine.get_privacy_budget("client_0").unwrap().epsilon, 1.0);
//! ```

pub mod budget;
pub mod mechanism;
pub mod secure_sum;

pub use budget::{BudgetLedger, PrivacyBudget};
pub use mechanism::{gaussian_noise_scale, ClipNorm};
pub use secure_sum::{PassThroughSummation, SecureSummation};

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::alerts::{Alert, AlertSink, TracingSink};
use crate::config::{BudgetPolicy, PrivacyConfig};
use crate::error::GuardError;
use crate::update::{ensure_shape, ClientUpdate};

/// Description of one privacy transform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrivacyMetrics {
    /// Epsilon charged for this update
    pub epsilon: f64,
    /// Delta charged for this update
    pub delta: f64,
    /// Clip norm applied
    pub clip_norm: f64,
    /// Noise standard deviation applied
    pub noise_scale: f64,
    /// Largest pre-clip layer L2 norm
    pub gradient_norm: f64,
}

/// Result of [`DifferentialPrivacyEngine::process`].
#[derive(Clone, Debug)]
pub struct ProcessedUpdate {
    /// The privatised update (raw weights are gone)
    pub update: ClientUpdate,
    /// Transform metrics
    pub metrics: PrivacyMetrics,
    /// Client budget after this charge (`None` when DP is disabled)
    pub budget: Option<PrivacyBudget>,
    /// Whether the budget is now over its ceiling
    pub budget_exceeded: bool,
}

struct PrivacyState {
    ledger: BudgetLedger,
    rng: StdRng,
    clip: ClipNorm,
    /// Layer shape pinned by the first processed update
    model_shape: Option<Vec<usize>>,
}

/// Differential privacy engine owning the budget ledger.
pub struct DifferentialPrivacyEngine {
    config: PrivacyConfig,
    noise_scale: f64,
    secure_summation: Option<Box<dyn SecureSummation>>,
    sink: Arc<dyn AlertSink>,
    state: Mutex<PrivacyState>,
}

impl std::fmt::Debug for DifferentialPrivacyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DifferentialPrivacyEngine")
            .field("config", &self.config)
            .field("noise_scale", &self.noise_scale)
            .finish_non_exhaustive()
    }
}

impl DifferentialPrivacyEngine {
    /// Validate `config` and build an engine that logs alerts via `tracing`.
    pub fn initialize(config: PrivacyConfig) -> Result<Self, GuardError> {
        Self::initialize_with_sink(config, Arc::new(TracingSink))
    }

    /// Validate `config` and build an engine reporting to `sink`.
    pub fn initialize_with_sink(
        config: PrivacyConfig,
        sink: Arc<dyn AlertSink>,
    ) -> Result<Self, GuardError> {
        config.validate()?;

        let dp = &config.differential_privacy;
        let noise_scale = gaussian_noise_scale(dp.epsilon, dp.delta);
        let rng = match dp.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let clip = ClipNorm::new(dp.clip_norm, dp.adaptive_clipping.clone());

        let secure_summation: Option<Box<dyn SecureSummation>> =
            if config.secure_summation.enabled {
                Some(Box::new(PassThroughSummation::new(
                    config.secure_summation.threshold,
                )))
            } else {
                None
            };

        sink.emit(&Alert::Initialized {
            dp_enabled: dp.enabled,
            secure_summation_enabled: config.secure_summation.enabled,
            noise_scale,
            clip_norm: dp.clip_norm,
        });

        Ok(Self {
            noise_scale,
            secure_summation,
            sink,
            state: Mutex::new(PrivacyState {
                ledger: BudgetLedger::new(),
                rng,
                clip,
                model_shape: None,
            }),
            config,
        })
    }

    /// Replace the secure summation stage. Only used when secure summation is enabled.
    pub fn with_secure_summation(mut self, stage: Box<dyn SecureSummation>) -> Self {
        if self.config.secure_summation.enabled {
            self.secure_summation = Some(stage);
        }
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &PrivacyConfig {
        &self.config
    }

    /// Calibrated Gaussian noise standard deviation.
    pub fn noise_scale(&self) -> f64 {
        self.noise_scale
    }

    /// Clip norm that will be applied to the next update.
    pub fn clip_norm(&self) -> f64 {
        self.state.lock().clip.current()
    }

    /// Clip, noise, and charge one update.
    ///
    /// Consumes the raw update and returns the privatised one. Exceeding the
    /// budget raises [`Alert::PrivacyBudgetExceeded`]; under
    /// [`BudgetPolicy::HardStop`] an update that would cross the ceiling is
    /// rejected with [`GuardError::BudgetExhausted`] before any spend.
    pub fn process(&self, update: ClientUpdate) -> Result<ProcessedUpdate, GuardError> {
        let result = self.process_inner(update);
        if let Err(e) = &result {
            self.sink.emit(&Alert::Error {
                client_id: error_client(e),
                message: e.to_string(),
            });
        }
        result
    }

    /// Process a round's updates in parallel, preserving input order.
    pub fn process_batch(
        &self,
        updates: Vec<ClientUpdate>,
    ) -> Vec<Result<ProcessedUpdate, GuardError>> {
        updates
            .into_par_iter()
            .map(|update| self.process(update))
            .collect()
    }

    fn process_inner(&self, mut update: ClientUpdate) -> Result<ProcessedUpdate, GuardError> {
        let dp = &self.config.differential_privacy;
        let mut alerts = Vec::new();

        let mut state = self.state.lock();

        match &state.model_shape {
            Some(shape) => ensure_shape(&update.client_id, &update.weights, shape)?,
            None => state.model_shape = Some(update.shape()),
        }

        if dp.enabled && dp.budget_policy == BudgetPolicy::HardStop {
            let (spent_epsilon, spent_delta) = state
                .ledger
                .get(&update.client_id)
                .map_or((0.0, 0.0), |b| (b.epsilon, b.delta));
            let next_epsilon = spent_epsilon + dp.epsilon;
            let next_delta = spent_delta + dp.delta;
            if next_epsilon > dp.epsilon_ceiling() || next_delta > dp.delta_ceiling() {
                return Err(GuardError::BudgetExhausted {
                    client_id: update.client_id,
                    epsilon: spent_epsilon,
                    delta: spent_delta,
                });
            }
        }

        let (clip_norm, noise_scale) = if dp.enabled {
            (state.clip.current(), self.noise_scale)
        } else {
            (f64::INFINITY, 0.0)
        };

        let mut layer_norms = Vec::with_capacity(update.weights.len());
        {
            let PrivacyState { rng, .. } = &mut *state;
            for layer in update.weights.iter_mut() {
                let norm = mechanism::clip_layer(layer, clip_norm);
                mechanism::add_gaussian_noise(layer, noise_scale, rng);
                layer_norms.push(norm);
            }
        }
        let gradient_norm = layer_norms.iter().copied().fold(0.0f64, f64::max);

        if let Some(stage) = &self.secure_summation {
            update = stage.mask(update)?;
        }

        let (metrics, budget, budget_exceeded) = if dp.enabled {
            state.clip.observe(&layer_norms);
            let budget = state
                .ledger
                .charge(&update.client_id, dp.epsilon, dp.delta, Utc::now());
            let exceeded = budget.exceeds(dp.epsilon_ceiling(), dp.delta_ceiling());
            if exceeded {
                alerts.push(Alert::PrivacyBudgetExceeded {
                    client_id: update.client_id.clone(),
                    budget: budget.clone(),
                    epsilon_ceiling: dp.epsilon_ceiling(),
                    delta_ceiling: dp.delta_ceiling(),
                });
            }
            let metrics = PrivacyMetrics {
                epsilon: dp.epsilon,
                delta: dp.delta,
                clip_norm,
                noise_scale,
                gradient_norm,
            };
            (metrics, Some(budget), exceeded)
        } else {
            let metrics = PrivacyMetrics {
                epsilon: 0.0,
                delta: 0.0,
                clip_norm: 0.0,
                noise_scale: 0.0,
                gradient_norm,
            };
            (metrics, None, false)
        };
        drop(state);

        tracing::debug!(
            client_id = %update.client_id,
            round = update.round,
            layers = layer_norms.len(),
            gradient_norm,
            "privacy transform applied"
        );

        alerts.push(Alert::UpdateProcessed {
            client_id: update.client_id.clone(),
            round: update.round,
            metrics: metrics.clone(),
        });
        for alert in &alerts {
            self.sink.emit(alert);
        }

        Ok(ProcessedUpdate {
            update,
            metrics,
            budget,
            budget_exceeded,
        })
    }

    /// Snapshot of a client's cumulative spend.
    pub fn get_privacy_budget(&self, client_id: &str) -> Option<PrivacyBudget> {
        self.state.lock().ledger.get(client_id)
    }

    /// Remaining `(epsilon, delta)` headroom before the ceiling, floored at 0.
    pub fn remaining_budget(&self, client_id: &str) -> (f64, f64) {
        let dp = &self.config.differential_privacy;
        let (spent_eps, spent_delta) = self
            .get_privacy_budget(client_id)
            .map(|b| (b.epsilon, b.delta))
            .unwrap_or((0.0, 0.0));
        (
            (dp.epsilon_ceiling() - spent_eps).max(0.0),
            (dp.delta_ceiling() - spent_delta).max(0.0),
        )
    }

    /// Snapshot of the whole ledger.
    pub fn ledger(&self) -> BudgetLedger {
        self.state.lock().ledger.clone()
    }
}

fn error_client(e: &GuardError) -> Option<String> {
    match e {
        GuardError::ShapeMismatch { client_id, .. } | GuardError::BudgetExhausted { client_id, .. } => {
            Some(client_id.clone())
        }
        _ => None,
    }
}
