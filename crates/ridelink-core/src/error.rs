//! Error types for `RideLink` core library.

use thiserror::Error;

/// Result type alias using `RideLink` Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `RideLink` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Channel message could not be decoded or failed validation
    #[error("Invalid channel message: {0}")]
    Protocol(String),

    /// Location sample outside the valid coordinate range
    #[error("Invalid location: {0}")]
    InvalidLocation(String),

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
