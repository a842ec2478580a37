//! Shared types and helpers used across the courier workspace.

pub mod backoff;
pub mod types;

use std::time::{SystemTime, UNIX_EPOCH};

pub use types::{JobOutcome, JobSource, OutboundJob, SessionStatus};

/// Current time as epoch milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
