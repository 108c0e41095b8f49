//! Wire protocol for the Amplifier remote.
//!
//! This crate defines the "language" the client and the audio backend
//! speak:
//!
//! - **Types** ([`Envelope`], [`Command`], [`Event`], [`EventKind`]) —
//!   the message structures that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how those messages
//!   are converted to/from bytes.
//! - **Errors** ([`ProtocolError`]) — what can go wrong during
//!   encoding/decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and session
//! (client-side state). It doesn't know about connections or playback —
//! it only knows how to serialize and deserialize messages.
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope → Event) → Session (state)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{Command, Envelope, Event, EventKind, Payload};
