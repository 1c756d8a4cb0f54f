//! Error types for `dappgate` core library.

use thiserror::Error;

/// Result type alias using `dappgate` Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `dappgate` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed protocol frame
    #[error("Failed to parse message: {0}")]
    Protocol(String),

    /// Chain id could not be interpreted
    #[error("Invalid chain id: {0}")]
    ChainId(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
