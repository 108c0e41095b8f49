//! # Amplifier
//!
//! Remote-control client for an audio-network backend.
//!
//! A [`Client`] keeps a WebSocket link to a local backend that does the
//! actual audio work: hosting a broadcast, discovering and joining hosts,
//! loading a track and controlling playback. The client mirrors the
//! backend's reports into a [`SessionState`], sends user commands, and
//! re-establishes the link with bounded backoff when it drops.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use amplifier::prelude::*;
//!
//! # async fn run() -> Result<(), ClientError> {
//! let (client, mut notifications) = Client::open(ClientConfig::default());
//!
//! while let Some(notification) = notifications.recv().await {
//!     match notification {
//!         Notification::Phase(ConnectionPhase::ConnectedToBackend) => {
//!             client.connect_device("192.168.1.10:9090")?;
//!         }
//!         Notification::State { snapshot, .. } => {
//!             println!("{}", snapshot.status);
//!         }
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod dispatcher;
mod error;
mod notify;
mod supervisor;

pub use client::Client;
pub use config::{ClientConfig, DEFAULT_BACKEND_URL, ReconnectPolicy};
pub use dispatcher::apply_event;
pub use error::ClientError;
pub use notify::{Notification, Notifications};

pub use amplifier_protocol as protocol;
pub use amplifier_session as session;
pub use amplifier_transport as transport;

pub use amplifier_session::{
    ActivityEntry, Change, ConnectionPhase, Device, DeviceState, PlaybackPhase, Role,
    SessionState,
};

pub mod prelude {
    pub use crate::{
        Change, Client, ClientConfig, ClientError, ConnectionPhase, Notification,
        Notifications, PlaybackPhase, ReconnectPolicy, Role, SessionState,
    };
}
