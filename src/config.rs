//! Configuration for the privacy and defense engines.
//!
//! All structs deserialize from JSON with every field optional; missing
//! fields fall back to [`Default`]. Call [`GuardConfig::validate`] (or the
//! engine constructors, which do it for you) before use.
//!
//! ```rust
//! use qora_guard::config::GuardConfig;
//!
//! let config = GuardConfig::from_json(r#"{
//!     "differential_privacy": { "enabled": true, "epsilon": 2.0, "delta": 1e-5 },
//!     "min_updates_for_detection": 6,
//!     "use_krum": false
//! }"#).unwrap();
//!
//! assert_eq!(config.privacy.differential_privacy.epsilon, 2.0);
//! assert_eq!(config.defense.min_updates_for_detection, 6);
//! assert!(!config.defense.use_krum);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::GuardError;

/// What happens when a client's cumulative budget crosses its ceiling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetPolicy {
    /// Raise an alert but keep processing
    #[default]
    Warn,
    /// Reject further updates from the client once the ceiling is reached
    HardStop,
}

/// Adaptive clip-norm tracking.
///
/// After every processed update the clip norm moves geometrically toward the
/// value at which a `target_quantile` fraction of layers goes unclipped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveClipping {
    /// Fraction of layers that should fall under the clip norm
    pub target_quantile: f64,
    /// Step size of the geometric update
    pub learning_rate: f64,
}

impl Default for AdaptiveClipping {
    fn default() -> Self {
        Self {
            target_quantile: 0.5,
            learning_rate: 0.2,
        }
    }
}

/// Gaussian-mechanism parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DifferentialPrivacyConfig {
    /// Apply clipping and noise
    pub enabled: bool,
    /// Per-round privacy parameter epsilon
    pub epsilon: f64,
    /// Per-round privacy parameter delta
    pub delta: f64,
    /// L2 clipping threshold applied per layer
    pub clip_norm: f64,
    /// Cumulative epsilon ceiling (defaults to `epsilon`)
    pub total_epsilon: Option<f64>,
    /// Cumulative delta ceiling (defaults to `delta`)
    pub total_delta: Option<f64>,
    /// Exhaustion handling
    pub budget_policy: BudgetPolicy,
    /// Seed for the noise generator; entropy-seeded when absent
    pub seed: Option<u64>,
    /// Adaptive clip norm; fixed clip norm when absent
    pub adaptive_clipping: Option<AdaptiveClipping>,
}

impl Default for DifferentialPrivacyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            epsilon: 1.0,
            delta: 1e-5,
            clip_norm: 1.0,
            total_epsilon: None,
            total_delta: None,
            budget_policy: BudgetPolicy::Warn,
            seed: None,
            adaptive_clipping: None,
        }
    }
}

impl DifferentialPrivacyConfig {
    /// Cumulative epsilon ceiling.
    pub fn epsilon_ceiling(&self) -> f64 {
        self.total_epsilon.unwrap_or(self.epsilon)
    }

    /// Cumulative delta ceiling.
    pub fn delta_ceiling(&self) -> f64 {
        self.total_delta.unwrap_or(self.delta)
    }

    /// Reject parameters for which the noise scale is undefined.
    pub fn validate(&self) -> Result<(), GuardError> {
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(GuardError::invalid_config(
                "differential_privacy.epsilon",
                self.epsilon,
                "must be finite and > 0",
            ));
        }
        if !(self.delta > 0.0 && self.delta < 1.0) {
            return Err(GuardError::invalid_config(
                "differential_privacy.delta",
                self.delta,
                "must be in (0, 1)",
            ));
        }
        if !(self.clip_norm.is_finite() && self.clip_norm > 0.0) {
            return Err(GuardError::invalid_config(
                "differential_privacy.clip_norm",
                self.clip_norm,
                "must be finite and > 0",
            ));
        }
        if let Some(total) = self.total_epsilon {
            if !(total.is_finite() && total > 0.0) {
                return Err(GuardError::invalid_config(
                    "differential_privacy.total_epsilon",
                    total,
                    "must be finite and > 0",
                ));
            }
        }
        if let Some(total) = self.total_delta {
            if !(total > 0.0 && total.is_finite()) {
                return Err(GuardError::invalid_config(
                    "differential_privacy.total_delta",
                    total,
                    "must be finite and > 0",
                ));
            }
        }
        if let Some(adaptive) = &self.adaptive_clipping {
            if !(adaptive.target_quantile > 0.0 && adaptive.target_quantile < 1.0) {
                return Err(GuardError::invalid_config(
                    "differential_privacy.adaptive_clipping.target_quantile",
                    adaptive.target_quantile,
                    "must be in (0, 1)",
                ));
            }
            if !(adaptive.learning_rate > 0.0 && adaptive.learning_rate.is_finite()) {
                return Err(GuardError::invalid_config(
                    "differential_privacy.adaptive_clipping.learning_rate",
                    adaptive.learning_rate,
                    "must be finite and > 0",
                ));
            }
        }
        Ok(())
    }
}

/// Secure summation stage settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecureSummationConfig {
    /// Run the secure summation hook after noising
    pub enabled: bool,
    /// Minimum participants the protocol needs
    pub threshold: usize,
}

impl Default for SecureSummationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 3,
        }
    }
}

impl SecureSummationConfig {
    /// Validate the threshold when the stage is enabled.
    pub fn validate(&self) -> Result<(), GuardError> {
        if self.enabled && self.threshold == 0 {
            return Err(GuardError::invalid_config(
                "secure_summation.threshold",
                self.threshold,
                "must be >= 1 when enabled",
            ));
        }
        Ok(())
    }
}

/// Configuration of the [`DifferentialPrivacyEngine`](crate::privacy::DifferentialPrivacyEngine).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivacyConfig {
    /// Gaussian mechanism
    pub differential_privacy: DifferentialPrivacyConfig,
    /// Secure summation hook
    pub secure_summation: SecureSummationConfig,
}

impl PrivacyConfig {
    /// Validate both sub-policies.
    pub fn validate(&self) -> Result<(), GuardError> {
        self.differential_privacy.validate()?;
        self.secure_summation.validate()
    }
}

/// Configuration of the [`RobustAggregationEngine`](crate::defense::RobustAggregationEngine).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefenseConfig {
    /// Z-score cutoff for weight and metric outliers
    pub outlier_threshold: f64,
    /// History capacity and cold-start length
    pub min_updates_for_detection: usize,
    /// Byzantine score cutoff in \[0, 1\]
    pub byzantine_threshold: f32,
    /// Apply multi-Krum selection in `aggregate_defense`
    pub use_krum: bool,
    /// Minimum reported accuracy
    pub accuracy_threshold: f32,
    /// Maximum reported loss
    pub loss_threshold: f32,
}

impl Default for DefenseConfig {
    fn default() -> Self {
        Self {
            outlier_threshold: 3.0,
            min_updates_for_detection: 10,
            byzantine_threshold: 0.1,
            use_krum: true,
            accuracy_threshold: 0.1,
            loss_threshold: 10.0,
        }
    }
}

impl DefenseConfig {
    /// Validate thresholds.
    pub fn validate(&self) -> Result<(), GuardError> {
        if !(self.outlier_threshold.is_finite() && self.outlier_threshold > 0.0) {
            return Err(GuardError::invalid_config(
                "outlier_threshold",
                self.outlier_threshold,
                "must be finite and > 0",
            ));
        }
        if self.min_updates_for_detection == 0 {
            return Err(GuardError::invalid_config(
                "min_updates_for_detection",
                self.min_updates_for_detection,
                "must be >= 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.byzantine_threshold) {
            return Err(GuardError::invalid_config(
                "byzantine_threshold",
                self.byzantine_threshold,
                "must be in [0, 1]",
            ));
        }
        if !self.accuracy_threshold.is_finite() {
            return Err(GuardError::invalid_config(
                "accuracy_threshold",
                self.accuracy_threshold,
                "must be finite",
            ));
        }
        if self.loss_threshold.is_nan() {
            return Err(GuardError::invalid_config(
                "loss_threshold",
                self.loss_threshold,
                "must not be NaN",
            ));
        }
        Ok(())
    }
}

/// Full configuration surface of the core.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Privacy engine options (`differential_privacy`, `secure_summation`)
    #[serde(flatten)]
    pub privacy: PrivacyConfig,
    /// Defense engine options (top-level keys)
    #[serde(flatten)]
    pub defense: DefenseConfig,
}

impl GuardConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self, GuardError> {
        let config: GuardConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), GuardError> {
        self.privacy.validate()?;
        self.defense.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(GuardConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_non_positive_epsilon() {
        for eps in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let config = DifferentialPrivacyConfig {
                epsilon: eps,
                ..Default::default()
            };
            assert!(
                matches!(config.validate(), Err(GuardError::InvalidConfig { field, .. }) if field == "differential_privacy.epsilon"),
                "epsilon {} should be rejected",
                eps
            );
        }
    }

    #[test]
    fn test_rejects_bad_delta() {
        for delta in [0.0, -1e-5, 1.0] {
            let config = DifferentialPrivacyConfig {
                delta,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "delta {} should be rejected", delta);
        }
    }

    #[test]
    fn test_rejects_bad_clip_norm() {
        let config = DifferentialPrivacyConfig {
            clip_norm: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ceilings_default_to_round_values() {
        let config = DifferentialPrivacyConfig::default();
        assert_eq!(config.epsilon_ceiling(), 1.0);
        assert_eq!(config.delta_ceiling(), 1e-5);

        let config = DifferentialPrivacyConfig {
            total_epsilon: Some(8.0),
            ..Default::default()
        };
        assert_eq!(config.epsilon_ceiling(), 8.0);
    }

    #[test]
    fn test_secure_summation_threshold() {
        let config = SecureSummationConfig {
            enabled: true,
            threshold: 0,
        };
        assert!(config.validate().is_err());
        let disabled = SecureSummationConfig {
            enabled: false,
            threshold: 0,
        };
        assert!(disabled.validate().is_ok());
    }

    #[test]
    fn test_defense_validation() {
        let config = DefenseConfig {
            min_updates_for_detection: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = DefenseConfig {
            byzantine_threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = DefenseConfig {
            outlier_threshold: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json_full_surface() {
        let config = GuardConfig::from_json(
            r#"{
                "differential_privacy": {
                    "enabled": true,
                    "epsilon": 0.5,
                    "delta": 1e-6,
                    "budget_policy": "hard_stop",
                    "seed": 7
                },
                "secure_summation": { "enabled": true, "threshold": 5 },
                "outlier_threshold": 2.5,
                "min_updates_for_detection": 6,
                "byzantine_threshold": 0.4,
                "use_krum": false,
                "accuracy_threshold": 0.2,
                "loss_threshold": 5.0
            }"#,
        )
        .unwrap();

        let dp = &config.privacy.differential_privacy;
        assert_eq!(dp.epsilon, 0.5);
        assert_eq!(dp.delta, 1e-6);
        assert_eq!(dp.budget_policy, BudgetPolicy::HardStop);
        assert_eq!(dp.seed, Some(7));
        assert!(config.privacy.secure_summation.enabled);
        assert_eq!(config.privacy.secure_summation.threshold, 5);
        assert_eq!(config.defense.outlier_threshold, 2.5);
        assert_eq!(config.defense.min_updates_for_detection, 6);
        assert_eq!(config.defense.byzantine_threshold, 0.4);
        assert!(!config.defense.use_krum);
        assert_eq!(config.defense.accuracy_threshold, 0.2);
        assert_eq!(config.defense.loss_threshold, 5.0);
    }

    #[test]
    fn test_from_json_empty_uses_defaults() {
        let config = GuardConfig::from_json("{}").unwrap();
        assert_eq!(config, GuardConfig::default());
    }

    #[test]
    fn test_from_json_rejects_invalid_values() {
        let err = GuardConfig::from_json(r#"{ "differential_privacy": { "epsilon": 0.0 } }"#)
            .unwrap_err();
        assert!(matches!(err, GuardError::InvalidConfig { .. }));

        let err = GuardConfig::from_json("not json").unwrap_err();
        assert!(matches!(err, GuardError::ConfigParse(_)));
    }
}
