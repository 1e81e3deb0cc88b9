//! Client error types.

use stravajson_api::ApiError;
use stravajson_core::TimeError;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can end a `stravajson` run.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Missing credentials, bad environment values, invalid input to `init`.
    #[error("configuration error: {0}")]
    Config(String),

    /// Token, authorization or activity request failure.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Malformed or conflicting time window flags.
    #[error(transparent)]
    Time(#[from] TimeError),

    /// Reading or writing local files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serializing the output file.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
