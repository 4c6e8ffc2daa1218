//! # Error Types
//!
//! Custom error types for Cell Telemetry Sync using `thiserror`.

use thiserror::Error;

/// Main error type for Cell Telemetry Sync
#[derive(Debug, Error)]
pub enum SyncError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors (queue file, snapshot file, sockets)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No reply (or no write progress) within the configured window
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Collector unreachable, refused, or connection dropped
    #[error("Connection error: {0}")]
    Connection(String),

    /// Reply received but empty or unrecognizable
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl SyncError {
    /// Returns true for the failures folded into a single "delivery failed"
    /// outcome: timeout, connection failure, protocol failure.
    #[must_use]
    pub fn is_delivery_failure(&self) -> bool {
        matches!(
            self,
            SyncError::Timeout(_) | SyncError::Connection(_) | SyncError::Protocol(_)
        )
    }
}

/// Result type alias for Cell Telemetry Sync
pub type Result<T> = std::result::Result<T, SyncError>;
