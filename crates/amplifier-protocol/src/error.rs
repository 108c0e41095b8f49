//! Error types for the protocol layer.
//!
//! Each crate in the workspace defines its own error enum. A
//! `ProtocolError` always means the problem is in turning messages into
//! bytes or back, never in networking or session state.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a message into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The inbound bytes are not a structurally valid envelope.
    ///
    /// Common causes: invalid UTF-8, malformed JSON, a missing `type`
    /// field, or a `data` field that is not an object.
    #[error("malformed message: {0}")]
    Malformed(serde_json::Error),

    /// The message parsed but violates protocol rules, e.g. an empty
    /// message type.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
