//! Mathematical primitives for Qora-Guard.
//!
//! Provides shared math utilities used by the privacy and defense engines:
//!
//! - [`norms`]: L2 norms and RMS distances over layered weights
//! - [`stats`]: Running mean/std and z-scores

pub mod norms;
pub mod stats;

pub use norms::{l2_norm, rms_distance, sum_sq_distance};
pub use stats::{z_score, RunningStats};
