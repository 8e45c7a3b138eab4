//! Notifications raised by the engines.
//!
//! Engines report lifecycle events, budget exhaustion, and defense outcomes
//! to an [`AlertSink`] supplied by the caller. The default sink,
//! [`TracingSink`], forwards everything to `tracing`.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::privacy::{PrivacyBudget, PrivacyMetrics};

/// A notification emitted by one of the engines.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Alert {
    /// Privacy engine configured and ready
    Initialized {
        /// Whether clipping and noise are applied
        dp_enabled: bool,
        /// Whether the secure summation hook runs
        secure_summation_enabled: bool,
        /// Calibrated Gaussian noise standard deviation
        noise_scale: f64,
        /// Initial clip norm
        clip_norm: f64,
    },
    /// One update was privatised
    UpdateProcessed {
        /// Source client
        client_id: String,
        /// Round of the update
        round: u64,
        /// Transform metrics
        metrics: PrivacyMetrics,
    },
    /// A client's cumulative spend crossed the ceiling
    PrivacyBudgetExceeded {
        /// Client over budget
        client_id: String,
        /// Budget after this round's charge
        budget: PrivacyBudget,
        /// Cumulative epsilon ceiling
        epsilon_ceiling: f64,
        /// Cumulative delta ceiling
        delta_ceiling: f64,
    },
    /// An operation failed
    Error {
        /// Client involved, if known
        client_id: Option<String>,
        /// Rendered error
        message: String,
    },
    /// Validation produced findings for an update
    AnomalyDetected {
        /// Source client
        client_id: String,
        /// Round of the update
        round: u64,
        /// Human-readable findings
        anomalies: Vec<String>,
    },
    /// A round's batch went through the defense filter
    DefenseApplied {
        /// Round of the first update in the batch
        round: Option<u64>,
        /// Updates submitted
        submitted: usize,
        /// Updates kept
        kept: usize,
    },
}

/// Receiver of [`Alert`]s.
pub trait AlertSink: Send + Sync {
    /// Handle one alert. Must not call back into the emitting engine.
    fn emit(&self, alert: &Alert);
}

/// Logs every alert through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl AlertSink for TracingSink {
    fn emit(&self, alert: &Alert) {
        match alert {
            Alert::Initialized {
                dp_enabled,
                secure_summation_enabled,
                noise_scale,
                clip_norm,
            } => tracing::info!(
                dp_enabled,
                secure_summation_enabled,
                noise_scale,
                clip_norm,
                "privacy engine initialized"
            ),
            Alert::UpdateProcessed {
                client_id,
                round,
                metrics,
            } => tracing::debug!(
                client_id = %client_id,
                round,
                gradient_norm = metrics.gradient_norm,
                clip_norm = metrics.clip_norm,
                "update processed"
            ),
            Alert::PrivacyBudgetExceeded {
                client_id,
                budget,
                epsilon_ceiling,
                delta_ceiling,
            } => tracing::warn!(
                client_id = %client_id,
                epsilon = budget.epsilon,
                delta = budget.delta,
                epsilon_ceiling,
                delta_ceiling,
                "privacy budget exceeded"
            ),
            Alert::Error { client_id, message } => tracing::error!(
                client_id = client_id.as_deref().unwrap_or("-"),
                error = %message,
                "privacy engine error"
            ),
            Alert::AnomalyDetected {
                client_id,
                round,
                anomalies,
            } => tracing::warn!(
                client_id = %client_id,
                round,
                count = anomalies.len(),
                "anomalous update: {}",
                anomalies.join("; ")
            ),
            Alert::DefenseApplied {
                round,
                submitted,
                kept,
            } => tracing::info!(
                round = ?round,
                submitted,
                kept,
                removed = submitted.saturating_sub(*kept),
                "defense applied"
            ),
        }
    }
}

/// Buffers alerts in memory; handy for tests and for callers that poll.
#[derive(Debug, Default)]
pub struct CollectingSink {
    alerts: Mutex<Vec<Alert>>,
}

impl CollectingSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every buffered alert.
    pub fn drain(&self) -> Vec<Alert> {
        std::mem::take(&mut *self.alerts.lock())
    }

    /// Number of buffered alerts.
    pub fn len(&self) -> usize {
        self.alerts.lock().len()
    }

    /// Whether no alerts are buffered.
    pub fn is_empty(&self) -> bool {
        self.alerts.lock().is_empty()
    }
}

impl AlertSink for CollectingSink {
    fn emit(&self, alert: &Alert) {
        self.alerts.lock().push(alert.clone());
    }
}
