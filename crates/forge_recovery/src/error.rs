//! Error types for recovery.

use thiserror::Error;

/// Result type alias for recovery operations.
pub type RecoveryResult<T> = Result<T, RecoveryError>;

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("Invalid fix pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Suggestion has no pattern to apply")]
    NoPattern,

    #[error("Fix pattern did not match anything in {0}")]
    NoMatch(String),
}
