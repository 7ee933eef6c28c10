//! Error types for Trapgate

use thiserror::Error;

/// Errors that can occur while driving a verification session
///
/// Service rejections (a well-formed non-success verdict) are NOT errors:
/// they are first-class state transitions carried in the reply types. These
/// variants cover transport failures, malformed data, and local validation.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("Connection failed: {0}")]
    Transport(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Failed to parse event script: {0}")]
    ParseError(String),

    #[error("Invalid interaction event: {0}")]
    InvalidEvent(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid session config: {0}")]
    InvalidConfig(String),
}
