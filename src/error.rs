//! Error types for segwire.

use thiserror::Error;

/// Main error type for all segwire operations.
#[derive(Debug, Error)]
pub enum SegwireError {
    /// I/O error during socket or file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Magic tag mismatch. The stream is out of sync and cannot be
    /// resynchronized; the connection must be torn down.
    #[error("invalid magic tag")]
    InvalidMagic,

    /// Protocol error (oversized frame, truncated header, bad field, etc.).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Config file parse error.
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),

    /// Segmentation or post-processing backend failure.
    #[error("engine error: {0}")]
    Engine(String),
}

impl SegwireError {
    /// Whether this error means the peer's byte stream can no longer be
    /// trusted and the socket must be closed without a response.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, SegwireError::InvalidMagic | SegwireError::Protocol(_))
    }
}

/// Result type alias using SegwireError.
pub type Result<T> = std::result::Result<T, SegwireError>;
