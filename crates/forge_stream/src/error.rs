//! Error types for stream decoding.

use thiserror::Error;

/// Result type alias for stream operations.
pub type StreamResult<T> = Result<T, StreamError>;

/// Errors raised while decoding a completion stream.
///
/// The tag parser itself never fails: malformed markup is absorbed through
/// defaults. These errors come from the transport framing around it.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Malformed stream line: {0}")]
    MalformedLine(String),

    #[error("Stream payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
