//! One-call round processing over both engines.
//!
//! A round runs validation, the defense filter, and the privacy transform in
//! that order. Averaging the surviving updates is left to the caller.

use std::sync::Arc;

use crate::alerts::{AlertSink, TracingSink};
use crate::config::GuardConfig;
use crate::defense::{RobustAggregationEngine, ValidationResult};
use crate::error::GuardError;
use crate::privacy::{DifferentialPrivacyEngine, ProcessedUpdate};
use crate::update::{ClientUpdate, Layer};

/// Everything that happened to a round's updates.
#[derive(Debug)]
pub struct RoundOutcome {
    /// Round number of the first submitted update
    pub round: Option<u64>,
    /// `(client_id, verdict)` for every submitted update, in order
    pub validations: Vec<(String, ValidationResult)>,
    /// Privatised updates ready for aggregation
    pub processed: Vec<ProcessedUpdate>,
    /// Updates that passed the defense but failed the privacy transform
    pub privacy_failures: Vec<(String, GuardError)>,
}

impl RoundOutcome {
    /// Number of updates that failed validation.
    pub fn rejected(&self) -> usize {
        self.validations.iter().filter(|(_, v)| !v.is_valid).count()
    }

    /// Client ids of the privatised updates.
    pub fn accepted_clients(&self) -> Vec<&str> {
        self.processed
            .iter()
            .map(|p| p.update.client_id.as_str())
            .collect()
    }
}

/// Defense and privacy engines driven together.
#[derive(Debug)]
pub struct GuardPipeline {
    defense: RobustAggregationEngine,
    privacy: DifferentialPrivacyEngine,
}

impl GuardPipeline {
    /// Build both engines from one configuration, logging via `tracing`.
    pub fn new(config: GuardConfig) -> Result<Self, GuardError> {
        Self::with_sink(config, Arc::new(TracingSink))
    }

    /// Build both engines reporting to a shared sink.
    pub fn with_sink(config: GuardConfig, sink: Arc<dyn AlertSink>) -> Result<Self, GuardError> {
        config.validate()?;
        Ok(Self {
            defense: RobustAggregationEngine::with_sink(config.defense, sink.clone())?,
            privacy: DifferentialPrivacyEngine::initialize_with_sink(config.privacy, sink)?,
        })
    }

    /// Assemble a pipeline from engines built separately.
    pub fn from_engines(defense: RobustAggregationEngine, privacy: DifferentialPrivacyEngine) -> Self {
        Self { defense, privacy }
    }

    /// The defense engine.
    pub fn defense(&self) -> &RobustAggregationEngine {
        &self.defense
    }

    /// The privacy engine.
    pub fn privacy(&self) -> &DifferentialPrivacyEngine {
        &self.privacy
    }

    /// Validate, filter, and privatise one round of updates.
    ///
    /// Valid updates pass through
    /// [`aggregate_defense`](RobustAggregationEngine::aggregate_defense)
    /// before privatisation. With multi-Krum enabled (the default) a round
    /// of `n >= 4` updates privatises at most `n - (n - 1) / 2 - 2` of them,
    /// e.g. one out of five, and only those clients are charged privacy
    /// budget.
    /// Callers wanting every valid update privatised either disable
    /// `use_krum` or drive [`RobustAggregationEngine::validate`] and
    /// [`DifferentialPrivacyEngine::process`] directly.
    ///
    /// Structural errors (empty round, shape mismatch) abort the round.
    /// Per-update privacy failures, such as an exhausted budget under
    /// [`BudgetPolicy::HardStop`](crate::config::BudgetPolicy::HardStop),
    /// are reported in [`RoundOutcome::privacy_failures`].
    pub fn run_round(
        &self,
        updates: Vec<ClientUpdate>,
        global_weights: &[Layer],
    ) -> Result<RoundOutcome, GuardError> {
        if updates.is_empty() {
            return Err(GuardError::EmptyUpdates);
        }
        let round = updates.first().map(|u| u.round);

        let verdicts = self.defense.validate_batch(&updates, global_weights)?;
        let valid: Vec<ClientUpdate> = updates
            .iter()
            .zip(&verdicts)
            .filter(|(_, v)| v.is_valid)
            .map(|(u, _)| u.clone())
            .collect();
        let validations: Vec<(String, ValidationResult)> = updates
            .into_iter()
            .map(|u| u.client_id)
            .zip(verdicts)
            .collect();

        let survivors = if valid.is_empty() {
            Vec::new()
        } else {
            self.defense.aggregate_defense(valid, global_weights)?
        };

        let ids: Vec<String> = survivors.iter().map(|u| u.client_id.clone()).collect();
        let mut processed = Vec::with_capacity(survivors.len());
        let mut privacy_failures = Vec::new();
        for (client_id, result) in ids.into_iter().zip(self.privacy.process_batch(survivors)) {
            match result {
                Ok(p) => processed.push(p),
                Err(e) => privacy_failures.push((client_id, e)),
            }
        }

        tracing::info!(
            round = ?round,
            submitted = validations.len(),
            accepted = processed.len(),
            privacy_failures = privacy_failures.len(),
            "round complete"
        );

        Ok(RoundOutcome {
            round,
            validations,
            processed,
            privacy_failures,
        })
    }
}
