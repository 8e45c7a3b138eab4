//! # Qora-Guard: Privacy and Robustness Core for Federated Learning
//!
//! Qora-Guard screens client model updates before they reach aggregation
//! and privatises the ones that survive.
//!
//! ## Engines
//!
//! - [`RobustAggregationEngine`] - History-based anomaly detection, Byzantine
//!   scoring, multi-Krum selection and reputation filtering
//! - [`DifferentialPrivacyEngine`] - Per-layer L2 clipping, Gaussian noise and
//!   per-client (epsilon, delta) accounting under basic composition
//!
//! ## High-Level API
//!
//! Use [`GuardPipeline`] to run a whole round (validate, filter, privatise)
//! in one call. The final weighted average is left to the caller.
//!
//! ```rust
//! use ndarray::Array1;
//! use qora_guard::{ClientUpdate, GuardConfig, GuardPipeline, TrainingMetrics};
//!
//! let config = GuardConfig::from_json(r#"{ "use_krum": false }"#).unwrap();
//! let pipeline = GuardPipeline::new(config).unwrap();
//!
//! let global = vec![Array1::<f32>::zeros(3)];
//! let updates = (0..4)
//!     .map(|i| {
//!         ClientUpdate::new(
//!             format!("client_{}", i),
//!             1,
//!             vec![Array1::from_elem(3, 0.05)],
//!             TrainingMetrics::default(),
//!         )
//!     })
//!     .collect();
//!
//! let outcome = pipeline.run_round(updates, &global).unwrap();
//! assert_eq!(outcome.processed.len(), 4);
//! ```

#![deny(missing_docs)]

pub mod alerts;
pub mod config;
pub mod defense;
pub mod error;
pub mod math;
pub mod pipeline;
pub mod privacy;
pub mod reputation;
pub mod update;
pub mod verification;

// Re-exports
pub use alerts::{Alert, AlertSink, CollectingSink, TracingSink};
pub use config::{BudgetPolicy, DefenseConfig, GuardConfig, PrivacyConfig};
pub use defense::{RobustAggregationEngine, ValidationMetrics, ValidationResult};
pub use error::GuardError;
pub use pipeline::{GuardPipeline, RoundOutcome};
pub use privacy::{DifferentialPrivacyEngine, PrivacyBudget, PrivacyMetrics, ProcessedUpdate};
pub use reputation::ReputationTracker;
pub use update::{ClientUpdate, Layer, TrainingMetrics, Weights};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
