//! Error types for the core module.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur during core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Sandbox error: {0}")]
    Sandbox(#[from] forge_sandbox::SandboxError),

    #[error("Recovery error: {0}")]
    Recovery(#[from] forge_recovery::RecoveryError),

    #[error("Action not found: {0}")]
    ActionNotFound(u64),

    #[error("Executor has been disposed")]
    Disposed,

    #[error("Stream transport failed: {0}")]
    Transport(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
