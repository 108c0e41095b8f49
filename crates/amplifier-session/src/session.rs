//! Session types: the client's view of the backend and the audio network.
//!
//! Everything here is derived from protocol messages. The
//! [`SessionMachine`](crate::SessionMachine) owns the live
//! [`SessionState`]; everyone else works with cloned snapshots.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::time::SystemTime;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for session bookkeeping.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximum number of activity entries kept. Oldest entries are evicted
    /// first. Values below 1 are treated as 1.
    pub activity_capacity: usize,

    /// Volume shown before the backend reports one.
    pub initial_volume: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            activity_capacity: 200,
            initial_volume: 70,
        }
    }
}

// ---------------------------------------------------------------------------
// Phases and roles
// ---------------------------------------------------------------------------

/// State of the local link to the backend.
///
/// ```text
///   Disconnected ──(attempt)──→ ConnectingToBackend ──(ok)──→ ConnectedToBackend
///        ↑                              │                            │
///        └──────────(failure)───────────┘                            │
///        └──────────────────────────(loss / error)───────────────────┘
/// ```
///
/// Independent of the audio-network [`Role`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    #[default]
    Disconnected,
    ConnectingToBackend,
    ConnectedToBackend,
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::ConnectingToBackend => write!(f, "ConnectingToBackend"),
            Self::ConnectedToBackend => write!(f, "ConnectedToBackend"),
        }
    }
}

/// This device's part in the audio network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    #[default]
    None,
    /// Broadcasting audio to listeners.
    Host,
    /// Consuming audio from a host.
    Listener,
}

/// Playback state machine.
///
/// ```text
///   Stopped ──play──→ Playing ──pause──→ Paused ──play──→ Playing
///   Playing | Paused ──stop──→ Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackPhase {
    #[default]
    Stopped,
    Playing,
    Paused,
}

// ---------------------------------------------------------------------------
// Devices
// ---------------------------------------------------------------------------

/// Whether a device has only been seen or is part of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Discovered,
    Connected,
}

/// A device on the audio network. Identity is the `address`; name and type
/// are descriptive only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub name: String,
    /// `host:port`, unique per device.
    pub address: String,
    pub device_type: String,
    pub state: DeviceState,
}

// ---------------------------------------------------------------------------
// Activity
// ---------------------------------------------------------------------------

/// One line of the activity record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityEntry {
    pub at: SystemTime,
    pub message: String,
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// The client's complete view of the session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub connection_phase: ConnectionPhase,
    pub role: Role,
    /// Devices keyed by address.
    pub discovered: BTreeMap<String, Device>,
    /// Display names of joined devices in arrival order. Includes this
    /// device's own entry while hosting.
    pub joined: Vec<String>,
    pub playback: PlaybackPhase,
    /// Always within `0.0..=1.0`.
    pub progress_fraction: f64,
    /// Always within `0..=100`.
    pub volume_percent: u8,
    /// Last file name the backend confirmed loading.
    pub loaded_track_name: Option<String>,
    /// Track length in seconds, when the backend reported one.
    pub track_duration: Option<f64>,
    /// `address:port` this device is hosting on.
    pub host_address: Option<String>,
    /// Human-readable status line.
    pub status: String,
    pub activity: VecDeque<ActivityEntry>,
}

impl SessionState {
    pub(crate) fn new(config: &SessionConfig) -> Self {
        Self {
            connection_phase: ConnectionPhase::Disconnected,
            role: Role::None,
            discovered: BTreeMap::new(),
            joined: Vec::new(),
            playback: PlaybackPhase::Stopped,
            progress_fraction: 0.0,
            volume_percent: config.initial_volume.min(100),
            loaded_track_name: None,
            track_duration: None,
            host_address: None,
            status: "Ready to connect".to_string(),
            activity: VecDeque::new(),
        }
    }

    /// Looks up a device by address.
    pub fn device(&self, address: &str) -> Option<&Device> {
        self.discovered.get(address)
    }

    /// The most recent activity message, if any.
    pub fn last_activity(&self) -> Option<&str> {
        self.activity.back().map(|entry| entry.message.as_str())
    }
}

// ---------------------------------------------------------------------------
// Change
// ---------------------------------------------------------------------------

/// One field-level change to [`SessionState`], reported to consumers so
/// they can redraw only what moved.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    ConnectionPhase(ConnectionPhase),
    Status(String),
    Role(Role),
    /// A device was added or its state changed.
    Device(Device),
    /// All devices and joined names were cleared.
    DevicesCleared,
    Joined(String),
    Playback(PlaybackPhase),
    Progress(f64),
    Volume(u8),
    TrackLoaded {
        name: String,
        duration: Option<f64>,
    },
    /// The address this device hosts at; `None` once hosting ends.
    HostAddress(Option<String>),
    Activity(String),
}
