//! Unified error type for the Amplifier client.

use amplifier_session::SessionError;

/// Errors returned by [`Client`](crate::Client) methods.
///
/// Transport and protocol failures never reach the caller: the supervisor
/// handles them and reports the outcome through notifications.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A command was rejected before reaching the wire.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A command was issued while the backend link is not up.
    #[error("not connected to the backend")]
    NotConnected,

    /// The client has been shut down.
    #[error("client is closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_session_error() {
        let err = SessionError::InvalidAddress(String::new());
        let client_err: ClientError = err.into();
        assert!(matches!(client_err, ClientError::Session(_)));
    }

    #[test]
    fn test_session_error_display_is_transparent() {
        let err = ClientError::from(SessionError::InvalidAddress(" ".into()));
        assert_eq!(err.to_string(), SessionError::InvalidAddress(" ".into()).to_string());
    }

    #[test]
    fn test_not_connected_display() {
        assert_eq!(
            ClientError::NotConnected.to_string(),
            "not connected to the backend"
        );
    }
}
