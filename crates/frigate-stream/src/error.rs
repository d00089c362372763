//! Event stream error types.

use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, StreamError>;

/// Errors that can occur while consuming the event stream.
#[derive(Error, Debug)]
pub enum StreamError {
    /// Connection-related errors (handshake, read failure, closed socket).
    #[error("Connection error: {0}")]
    Connection(String),

    /// Frame-level protocol errors (undecodable frame, bad envelope).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// An event record that parsed but violates the event invariants.
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// JSON decoding errors.
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The operation did not finish in time.
    #[error("Timed out: {0}")]
    Timeout(String),
}

impl StreamError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create an invalid event error.
    pub fn invalid_event(msg: impl Into<String>) -> Self {
        Self::InvalidEvent(msg.into())
    }

    /// Create a timeout error.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }
}
