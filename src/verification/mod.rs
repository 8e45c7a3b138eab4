//! Verification helpers for the defense filter:
//!
//! - [`krum_condition`]: Krum tolerance and keep-count sizing
//! - [`audit`]: Append-only defense audit log

pub mod audit;
pub mod krum_condition;

pub use audit::{AuditLog, DefenseAuditEntry};
pub use krum_condition::{krum_keep_count, krum_tolerance};
