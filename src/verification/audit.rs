//! Record of what the defense filter did to each submitted batch.
//!
//! Persisting the log is up to the caller; [`AuditLog::to_json`] renders it.

use serde::{Deserialize, Serialize};

/// Outcome of one `aggregate_defense` call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DefenseAuditEntry {
    /// Round of the first update in the batch
    pub round: Option<u64>,
    /// Number of updates submitted
    pub n_submitted: usize,
    /// Number of updates left after Krum selection
    pub n_after_krum: usize,
    /// Number of updates dropped for low client score
    pub n_low_reputation: usize,
    /// Whether Krum selection ran
    pub used_krum: bool,
}

impl DefenseAuditEntry {
    /// Updates that survived the whole filter.
    pub fn n_kept(&self) -> usize {
        self.n_after_krum - self.n_low_reputation
    }
}

/// Append-only audit log of defense rounds.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditLog {
    entries: Vec<DefenseAuditEntry>,
}

impl AuditLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one defense pass.
    pub fn push(&mut self, entry: DefenseAuditEntry) {
        self.entries.push(entry);
    }

    /// Entries in recording order.
    pub fn entries(&self) -> &[DefenseAuditEntry] {
        &self.entries
    }

    /// Most recent entry.
    pub fn last(&self) -> Option<&DefenseAuditEntry> {
        self.entries.last()
    }

    /// Number of recorded defense passes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was recorded yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Updates submitted over all passes.
    pub fn total_submitted(&self) -> usize {
        self.entries.iter().map(|e| e.n_submitted).sum()
    }

    /// Updates dropped over all passes, by Krum or by reputation.
    pub fn total_dropped(&self) -> usize {
        self.entries
            .iter()
            .map(|e| e.n_submitted - e.n_kept())
            .sum()
    }

    /// Render the log as a pretty-printed JSON array.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
