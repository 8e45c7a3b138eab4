//! Error types for Qora-Guard

use thiserror::Error;

/// All possible errors in Qora-Guard.
///
/// Statistical findings (anomalies, Byzantine flags) are never errors; they
/// are reported through [`ValidationResult`](crate::defense::ValidationResult).
#[derive(Error, Debug)]
pub enum GuardError {
    /// A configuration value is outside its valid range
    #[error("Invalid configuration: {field} = {value} ({reason})")]
    InvalidConfig {
        /// Name of the offending option
        field: &'static str,
        /// Rendered value that was rejected
        value: String,
        /// Why the value was rejected
        reason: &'static str,
    },

    /// Configuration could not be parsed
    #[error("Configuration parse error: {0}")]
    ConfigParse(String),

    /// No updates were provided
    #[error("Empty updates provided")]
    EmptyUpdates,

    /// Weight arrays disagree on layer count or layer length
    #[error("Shape mismatch for client '{client_id}': expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Client whose update had the wrong shape
        client_id: String,
        /// Per-layer lengths the update was checked against
        expected: Vec<usize>,
        /// Per-layer lengths of the offending update
        actual: Vec<usize>,
    },

    /// Client has spent its privacy budget and the engine runs in hard-stop mode
    #[error("Privacy budget exhausted for client '{client_id}': epsilon {epsilon:.4}, delta {delta:.2e}")]
    BudgetExhausted {
        /// Client whose budget is exhausted
        client_id: String,
        /// Cumulative epsilon already spent
        epsilon: f64,
        /// Cumulative delta already spent
        delta: f64,
    },
}

impl GuardError {
    pub(crate) fn invalid_config(
        field: &'static str,
        value: impl ToString,
        reason: &'static str,
    ) -> Self {
        GuardError::InvalidConfig {
            field,
            value: value.to_string(),
            reason,
        }
    }
}

impl From<serde_json::Error> for GuardError {
    fn from(e: serde_json::Error) -> Self {
        GuardError::ConfigParse(e.to_string())
    }
}
