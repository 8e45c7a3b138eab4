//! Secure summation stage run after noising.
//!
//! The cryptographic protocol lives downstream; the core only exposes the
//! hook. [`PassThroughSummation`] returns updates unchanged.

use crate::error::GuardError;
use crate::update::ClientUpdate;

/// Masks a privatised update before it leaves the core.
pub trait SecureSummation: Send + Sync {
    /// Minimum number of participants the protocol needs per round.
    fn threshold(&self) -> usize;

    /// Transform one update for secure aggregation.
    fn mask(&self, update: ClientUpdate) -> Result<ClientUpdate, GuardError>;
}

/// Identity secure summation stage.
#[derive(Clone, Copy, Debug)]
pub struct PassThroughSummation {
    threshold: usize,
}

impl PassThroughSummation {
    /// Create a pass-through stage advertising `threshold` participants.
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }
}

impl SecureSummation for PassThroughSummation {
    fn threshold(&self) -> usize {
        self.threshold
    }

    fn mask(&self, update: ClientUpdate) -> Result<ClientUpdate, GuardError> {
        Ok(update)
    }
}
