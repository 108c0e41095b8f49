//! Duplex channel layer for the Amplifier remote.
//!
//! Provides the [`Connector`] and [`Connection`] traits that abstract over
//! the physical link to the audio backend, plus a WebSocket client
//! implementation.
//!
//! The transport moves opaque byte messages. It never retries on its own:
//! a failed connect or a terminal receive error is reported to the caller,
//! and re-establishing the link is the job of the layer above.
//!
//! # Feature Flags
//!
//! - `websocket` (default) — WebSocket client via `tokio-tungstenite`

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketConnector};

use std::fmt;
use std::future::Future;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Establishes outgoing connections to a backend endpoint.
///
/// The returned futures are `Send` so a connector can be driven from a
/// spawned Tokio task without knowing the concrete type.
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced by this connector.
    type Connection: Connection;

    /// Opens a new connection to `endpoint`.
    fn connect(
        &self,
        endpoint: &str,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}

/// A single live connection that can send and receive whole messages.
///
/// `send` may be called from one task while another task is parked in
/// `recv`. Concurrent `send` calls are serialized so two messages never
/// interleave on the wire.
pub trait Connection: Send + Sync + 'static {
    /// Sends one message to the remote peer.
    fn send(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next message from the remote peer.
    ///
    /// Returns `Ok(None)` when the peer closes the connection cleanly.
    /// After [`close`](Self::close) a pending or later `recv` fails with
    /// [`TransportError::ConnectionClosed`].
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send;

    /// Closes the connection and wakes any pending `recv`.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
