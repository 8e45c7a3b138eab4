//! Per-client privacy budget ledger under basic composition.
//!
//! Each processed update adds its `(epsilon, delta)` to the client's running
//! totals. Totals only ever grow; entries are created on first charge.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cumulative privacy spend of one client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrivacyBudget {
    /// Total epsilon spent
    pub epsilon: f64,
    /// Total delta spent
    pub delta: f64,
    /// Time of the most recent charge
    pub last_update: DateTime<Utc>,
    /// Number of charged updates
    pub rounds: u64,
}

impl PrivacyBudget {
    fn empty(now: DateTime<Utc>) -> Self {
        Self {
            epsilon: 0.0,
            delta: 0.0,
            last_update: now,
            rounds: 0,
        }
    }

    /// Whether either total has crossed its ceiling.
    pub fn exceeds(&self, epsilon_ceiling: f64, delta_ceiling: f64) -> bool {
        self.epsilon > epsilon_ceiling || self.delta > delta_ceiling
    }
}

/// Ledger of [`PrivacyBudget`]s keyed by client id.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BudgetLedger {
    budgets: BTreeMap<String, PrivacyBudget>,
}

impl BudgetLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one round's spend to `client_id`, creating the entry on first use.
    ///
    /// Returns a snapshot of the updated budget.
    pub fn charge(
        &mut self,
        client_id: &str,
        epsilon: f64,
        delta: f64,
        now: DateTime<Utc>,
    ) -> PrivacyBudget {
        debug_assert!(epsilon >= 0.0 && delta >= 0.0);
        let budget = self
            .budgets
            .entry(client_id.to_string())
            .or_insert_with(|| PrivacyBudget::empty(now));
        budget.epsilon += epsilon;
        budget.delta += delta;
        budget.last_update = now;
        budget.rounds += 1;
        budget.clone()
    }

    /// Snapshot of a client's budget, if it has ever been charged.
    pub fn get(&self, client_id: &str) -> Option<PrivacyBudget> {
        self.budgets.get(client_id).cloned()
    }

    /// Number of clients with a budget entry.
    pub fn len(&self) -> usize {
        self.budgets.len()
    }

    /// Whether the ledger is empty.
    pub fn is_empty(&self) -> bool {
        self.budgets.is_empty()
    }

    /// Iterate over `(client_id, budget)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &PrivacyBudget)> {
        self.budgets.iter()
    }
}
