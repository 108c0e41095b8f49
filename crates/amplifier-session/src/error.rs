//! Error types for the session layer.

/// Errors a command can be rejected with before anything reaches the wire.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    /// The device address was empty or whitespace.
    #[error("invalid device address: {0:?}")]
    InvalidAddress(String),

    /// The audio file path was empty or whitespace.
    #[error("invalid file path: {0:?}")]
    InvalidPath(String),
}
