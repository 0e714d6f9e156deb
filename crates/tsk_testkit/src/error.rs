//! Error types for harness operations.

use thiserror::Error;
use tsk_core::CoreError;

/// Failure surfaced by the harness to a test.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Expectations were still pending when the deadline elapsed.
    #[error("timed out after {timeout_ms}ms waiting for {}", unmet.join(", "))]
    ExpectationTimeout {
        /// Configured timeout in milliseconds
        timeout_ms: u64,
        /// Descriptions of every expectation that did not fulfill
        unmet: Vec<String>,
    },

    /// Configuration error (loading, parsing, invalid values).
    #[error("configuration error: {0}")]
    Config(String),

    /// A seed value could not be parsed.
    #[error("invalid seed: {0}")]
    InvalidSeed(String),

    /// Engine error while building or driving a fixture.
    #[error("engine error: {0}")]
    Core(#[from] CoreError),
}

impl HarnessError {
    /// Returns a suggestion for reproducing or fixing the failure, if available.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Self::ExpectationTimeout { .. } => Some(
                "Re-run with TSK_TEST_SEED set to the seed logged for this test to reproduce it.",
            ),
            Self::InvalidSeed(_) => Some("TSK_TEST_SEED must be an unsigned 64-bit integer."),
            _ => None,
        }
    }
}

/// Convenience Result type for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;
