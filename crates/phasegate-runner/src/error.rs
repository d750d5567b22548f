//! Error types for process execution

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Failed to spawn '{program}': {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("Failed to wait for process: {reason}")]
    WaitFailed { reason: String },

    #[error("Execution timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("Execution was cancelled")]
    Cancelled,
}

impl RunnerError {
    /// Whether the program could not be started at all (as opposed to failing while running).
    #[must_use]
    pub const fn is_spawn_failure(&self) -> bool {
        matches!(self, Self::SpawnFailed { .. })
    }
}

/// Whole milliseconds in `timeout`, saturating.
#[must_use]
pub fn timeout_millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}
