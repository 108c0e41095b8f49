//! Client-side session state for the Amplifier remote.
//!
//! This crate holds everything the client believes about the world:
//!
//! 1. **Link** — whether the backend channel is up ([`ConnectionPhase`])
//! 2. **Network** — this device's [`Role`], discovered and joined devices
//! 3. **Playback** — play/pause/stop, progress, volume, loaded track
//!
//! All of it lives in one [`SessionState`] owned by a [`SessionMachine`].
//! The machine is pure bookkeeping: no I/O, no clocks beyond activity
//! timestamps, no async. Callers feed it commands and decoded events and
//! get back the [`Change`]s to report.
//!
//! # How it fits in the stack
//!
//! ```text
//! Client (above)  ← dispatches events, sends commands, notifies consumers
//!     ↕
//! Session Layer (this crate)  ← owns state, validates commands
//!     ↕
//! Protocol Layer (below)  ← provides Command and Event
//! ```

mod error;
mod machine;
mod session;

pub use error::SessionError;
pub use machine::{HOST_ENTRY, Request, SessionMachine, progress_fraction, track_name};
pub use session::{
    ActivityEntry, Change, ConnectionPhase, Device, DeviceState, PlaybackPhase, Role,
    SessionConfig, SessionState,
};
