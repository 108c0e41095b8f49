//! Core protocol types for the remote's wire format.
//!
//! Every message on the channel is an [`Envelope`]: a message type plus a
//! flat JSON object of fields. On top of that untyped shape this module
//! defines the two closed sets the client actually works with:
//!
//! - [`Command`] — what the client sends to the backend.
//! - [`Event`] — what the backend reports back.
//!
//! The backend does not guarantee fully populated payloads, so building an
//! [`Event`] never fails: a missing or wrong-typed field becomes `None`
//! and the consumer decides what that means.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// The field mapping carried inside an envelope.
pub type Payload = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// Envelope — the top-level wire format
// ---------------------------------------------------------------------------

/// The top-level message wrapper. Every message on the wire is an Envelope.
///
/// ```text
/// { "type": "connect_device", "data": { "address": "192.168.1.10:9090" } }
/// ```
///
/// Peers have been seen sending `Type`/`Data` as well as `kind`/`payload`,
/// so all of those spellings are accepted on decode. Encoding always writes
/// `type`/`data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The message type, e.g. `"play"` or `"device_found"`.
    #[serde(rename = "type", alias = "Type", alias = "kind", alias = "Kind")]
    pub kind: String,

    /// Message fields. Defaults to an empty object when absent or `null`.
    #[serde(
        rename = "data",
        alias = "Data",
        alias = "payload",
        alias = "Payload",
        default,
        deserialize_with = "null_as_empty"
    )]
    pub payload: Payload,
}

impl Envelope {
    /// Creates an envelope from a message type and its fields.
    pub fn new(kind: impl Into<String>, payload: Payload) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Payload, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Payload>::deserialize(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Command — client → backend
// ---------------------------------------------------------------------------

/// A control message sent to the backend.
///
/// Arguments are assumed to be validated already; the session layer is the
/// only place that constructs these from user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start broadcasting audio from this device.
    BecomeHost,
    /// Browse the local network for hosts.
    ScanDevices,
    /// Join the host at `address` (`host:port`).
    ConnectDevice { address: String },
    /// Load a local audio file on the backend.
    SelectFile { path: String },
    Play,
    Pause,
    Stop,
    /// Set output volume, `0..=100`.
    Volume { level: u8 },
}

impl Command {
    /// The wire message type for this command.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BecomeHost => "become_host",
            Self::ScanDevices => "scan_devices",
            Self::ConnectDevice { .. } => "connect_device",
            Self::SelectFile { .. } => "select_file",
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Stop => "stop",
            Self::Volume { .. } => "volume",
        }
    }

    /// Converts the command into its wire envelope.
    pub fn into_envelope(self) -> Envelope {
        let kind = self.kind();
        let mut payload = Payload::new();
        match self {
            Self::ConnectDevice { address } => {
                payload.insert("address".into(), Value::String(address));
            }
            Self::SelectFile { path } => {
                payload.insert("path".into(), Value::String(path));
            }
            Self::Volume { level } => {
                payload.insert("level".into(), Value::from(level));
            }
            Self::BecomeHost
            | Self::ScanDevices
            | Self::Play
            | Self::Pause
            | Self::Stop => {}
        }
        Envelope::new(kind, payload)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

// ---------------------------------------------------------------------------
// EventKind / Event — backend → client
// ---------------------------------------------------------------------------

/// The closed set of message types the backend may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Status,
    HostStarted,
    DeviceFound,
    Connected,
    PlaybackStarted,
    PlaybackPaused,
    PlaybackStopped,
    ProgressUpdate,
    VolumeChanged,
    FileLoaded,
    Log,
    TestPacket,
    TestPacketReceived,
    ClientConnected,
    ClientFound,
}

impl EventKind {
    /// Every known kind, in wire-table order.
    pub const ALL: [EventKind; 15] = [
        Self::Status,
        Self::HostStarted,
        Self::DeviceFound,
        Self::Connected,
        Self::PlaybackStarted,
        Self::PlaybackPaused,
        Self::PlaybackStopped,
        Self::ProgressUpdate,
        Self::VolumeChanged,
        Self::FileLoaded,
        Self::Log,
        Self::TestPacket,
        Self::TestPacketReceived,
        Self::ClientConnected,
        Self::ClientFound,
    ];

    /// Parses a wire message type. Returns `None` for unknown types.
    pub fn from_wire(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == kind)
    }

    /// The wire spelling of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::HostStarted => "host_started",
            Self::DeviceFound => "device_found",
            Self::Connected => "connected",
            Self::PlaybackStarted => "playback_started",
            Self::PlaybackPaused => "playback_paused",
            Self::PlaybackStopped => "playback_stopped",
            Self::ProgressUpdate => "progress_update",
            Self::VolumeChanged => "volume_changed",
            Self::FileLoaded => "file_loaded",
            Self::Log => "log",
            Self::TestPacket => "test_packet",
            Self::TestPacketReceived => "test_packet_received",
            Self::ClientConnected => "client_connected",
            Self::ClientFound => "client_found",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded backend message with its fields extracted.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Status {
        message: Option<String>,
    },
    HostStarted {
        address: Option<String>,
        port: Option<u16>,
    },
    DeviceFound {
        name: Option<String>,
        address: Option<String>,
        device_type: Option<String>,
    },
    Connected {
        name: Option<String>,
        address: Option<String>,
    },
    PlaybackStarted {
        position: Option<f64>,
    },
    PlaybackPaused,
    PlaybackStopped,
    ProgressUpdate {
        position: Option<f64>,
        total: Option<f64>,
    },
    VolumeChanged {
        level: Option<f64>,
    },
    FileLoaded {
        filename: Option<String>,
        duration: Option<f64>,
    },
    Log {
        message: Option<String>,
    },
    /// Diagnostic packets carry arbitrary fields; they are kept as-is.
    TestPacket {
        payload: Payload,
    },
    TestPacketReceived {
        payload: Payload,
    },
    ClientConnected {
        name: Option<String>,
        address: Option<String>,
    },
    ClientFound {
        name: Option<String>,
        address: Option<String>,
    },
    /// A message type this client does not know. Kept for logging only.
    Unknown {
        kind: String,
    },
}

impl Event {
    /// Builds an event from an envelope. Never fails: unknown types map to
    /// [`Event::Unknown`] and bad fields map to `None`.
    pub fn from_envelope(envelope: Envelope) -> Self {
        let Some(kind) = EventKind::from_wire(&envelope.kind) else {
            return Self::Unknown {
                kind: envelope.kind,
            };
        };
        let p = &envelope.payload;

        match kind {
            EventKind::Status => Self::Status {
                message: str_field(p, "message"),
            },
            EventKind::HostStarted => Self::HostStarted {
                address: str_field(p, "address"),
                port: num_field(p, "port")
                    .filter(|port| port.fract() == 0.0)
                    .and_then(|port| u16::try_from(port as i64).ok()),
            },
            EventKind::DeviceFound => Self::DeviceFound {
                name: str_field(p, "name"),
                address: str_field(p, "address"),
                device_type: str_field(p, "type"),
            },
            EventKind::Connected => Self::Connected {
                name: str_field(p, "name"),
                address: str_field(p, "address"),
            },
            EventKind::PlaybackStarted => Self::PlaybackStarted {
                position: num_field(p, "position"),
            },
            EventKind::PlaybackPaused => Self::PlaybackPaused,
            EventKind::PlaybackStopped => Self::PlaybackStopped,
            EventKind::ProgressUpdate => Self::ProgressUpdate {
                position: num_field(p, "position"),
                total: num_field(p, "total"),
            },
            EventKind::VolumeChanged => Self::VolumeChanged {
                level: num_field(p, "level"),
            },
            EventKind::FileLoaded => Self::FileLoaded {
                filename: str_field(p, "filename"),
                duration: num_field(p, "duration"),
            },
            EventKind::Log => Self::Log {
                message: str_field(p, "message"),
            },
            EventKind::TestPacket => Self::TestPacket {
                payload: envelope.payload,
            },
            EventKind::TestPacketReceived => Self::TestPacketReceived {
                payload: envelope.payload,
            },
            EventKind::ClientConnected => Self::ClientConnected {
                name: str_field(p, "name"),
                address: str_field(p, "address"),
            },
            EventKind::ClientFound => Self::ClientFound {
                name: str_field(p, "name"),
                address: str_field(p, "address"),
            },
        }
    }

    /// The kind of this event, or `None` for [`Event::Unknown`].
    pub fn kind(&self) -> Option<EventKind> {
        Some(match self {
            Self::Status { .. } => EventKind::Status,
            Self::HostStarted { .. } => EventKind::HostStarted,
            Self::DeviceFound { .. } => EventKind::DeviceFound,
            Self::Connected { .. } => EventKind::Connected,
            Self::PlaybackStarted { .. } => EventKind::PlaybackStarted,
            Self::PlaybackPaused => EventKind::PlaybackPaused,
            Self::PlaybackStopped => EventKind::PlaybackStopped,
            Self::ProgressUpdate { .. } => EventKind::ProgressUpdate,
            Self::VolumeChanged { .. } => EventKind::VolumeChanged,
            Self::FileLoaded { .. } => EventKind::FileLoaded,
            Self::Log { .. } => EventKind::Log,
            Self::TestPacket { .. } => EventKind::TestPacket,
            Self::TestPacketReceived { .. } => EventKind::TestPacketReceived,
            Self::ClientConnected { .. } => EventKind::ClientConnected,
            Self::ClientFound { .. } => EventKind::ClientFound,
            Self::Unknown { .. } => return None,
        })
    }
}

impl From<Envelope> for Event {
    fn from(envelope: Envelope) -> Self {
        Self::from_envelope(envelope)
    }
}

// ---------------------------------------------------------------------------
// Field extraction
// ---------------------------------------------------------------------------

/// Looks up `key` exactly, then case-insensitively.
fn field<'a>(payload: &'a Payload, key: &str) -> Option<&'a Value> {
    payload.get(key).or_else(|| {
        payload
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })
}

fn str_field(payload: &Payload, key: &str) -> Option<String> {
    match field(payload, key)? {
        Value::String(s) => Some(s.clone()),
        other => {
            tracing::trace!(key, value = %other, "ignoring non-string field");
            None
        }
    }
}

fn num_field(payload: &Payload, key: &str) -> Option<f64> {
    match field(payload, key)? {
        Value::Number(n) => n.as_f64(),
        other => {
            tracing::trace!(key, value = %other, "ignoring non-numeric field");
            None
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The backend is a separate program, so these tests pin the exact JSON
    //! shapes it reads and writes.

    use serde_json::json;

    use super::*;

    fn envelope(value: serde_json::Value) -> Envelope {
        serde_json::from_value(value).expect("valid envelope")
    }

    // =====================================================================
    // Envelope
    // =====================================================================

    #[test]
    fn test_envelope_serializes_with_type_and_data_keys() {
        let env = Command::Play.into_envelope();
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json, json!({"type": "play", "data": {}}));
    }

    #[test]
    fn test_envelope_accepts_capitalized_keys() {
        let env = envelope(json!({"Type": "status", "Data": {"message": "Backend Ready"}}));
        assert_eq!(env.kind, "status");
        assert_eq!(env.payload["message"], "Backend Ready");
    }

    #[test]
    fn test_envelope_accepts_kind_and_payload_keys() {
        let env = envelope(json!({"kind": "connected", "payload": {"name": "Kitchen Speaker"}}));
        assert_eq!(env.kind, "connected");
        assert_eq!(env.payload["name"], "Kitchen Speaker");

        let env = envelope(json!({"Kind": "log", "Payload": {}}));
        assert_eq!(env.kind, "log");
    }

    #[test]
    fn test_envelope_missing_data_defaults_to_empty() {
        let env = envelope(json!({"type": "playback_paused"}));
        assert!(env.payload.is_empty());
    }

    #[test]
    fn test_envelope_null_data_defaults_to_empty() {
        let env = envelope(json!({"type": "playback_stopped", "data": null}));
        assert!(env.payload.is_empty());
    }

    // =====================================================================
    // Command
    // =====================================================================

    #[test]
    fn test_command_connect_device_json_format() {
        let env = Command::ConnectDevice {
            address: "192.168.1.10:9090".into(),
        }
        .into_envelope();
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(
            json,
            json!({"type": "connect_device", "data": {"address": "192.168.1.10:9090"}})
        );
    }

    #[test]
    fn test_command_select_file_json_format() {
        let env = Command::SelectFile {
            path: "/music/song.mp3".into(),
        }
        .into_envelope();
        assert_eq!(env.kind, "select_file");
        assert_eq!(env.payload["path"], "/music/song.mp3");
    }

    #[test]
    fn test_command_volume_level_is_a_number() {
        let env = Command::Volume { level: 70 }.into_envelope();
        assert_eq!(env.kind, "volume");
        assert_eq!(env.payload["level"], json!(70));
    }

    #[test]
    fn test_command_kinds_match_wire_names() {
        let kinds: Vec<&str> = [
            Command::BecomeHost,
            Command::ScanDevices,
            Command::Play,
            Command::Pause,
            Command::Stop,
        ]
        .iter()
        .map(Command::kind)
        .collect();
        assert_eq!(
            kinds,
            ["become_host", "scan_devices", "play", "pause", "stop"]
        );
    }

    // =====================================================================
    // EventKind
    // =====================================================================

    #[test]
    fn test_event_kind_wire_names_round_trip() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_wire(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_event_kind_is_case_sensitive() {
        assert_eq!(EventKind::from_wire("Status"), None);
        assert_eq!(EventKind::from_wire("fly_to_moon"), None);
    }

    // =====================================================================
    // Event
    // =====================================================================

    #[test]
    fn test_event_device_found_extracts_fields() {
        let event = Event::from_envelope(envelope(json!({
            "type": "device_found",
            "data": {"name": "Kitchen-10.0.0.4", "address": "10.0.0.4:9090", "type": "host"}
        })));
        assert_eq!(
            event,
            Event::DeviceFound {
                name: Some("Kitchen-10.0.0.4".into()),
                address: Some("10.0.0.4:9090".into()),
                device_type: Some("host".into()),
            }
        );
    }

    #[test]
    fn test_event_host_started_reads_port() {
        let event = Event::from_envelope(envelope(json!({
            "type": "host_started",
            "data": {"address": "10.0.0.2", "port": 9090}
        })));
        assert_eq!(
            event,
            Event::HostStarted {
                address: Some("10.0.0.2".into()),
                port: Some(9090),
            }
        );
    }

    #[test]
    fn test_event_host_started_out_of_range_port_is_dropped() {
        let event = Event::from_envelope(envelope(json!({
            "type": "host_started",
            "data": {"address": "10.0.0.2", "port": 70000}
        })));
        assert!(matches!(event, Event::HostStarted { port: None, .. }));
    }

    #[test]
    fn test_event_wrong_typed_field_degrades_to_none() {
        let event = Event::from_envelope(envelope(json!({
            "type": "volume_changed",
            "data": {"level": "loud"}
        })));
        assert_eq!(event, Event::VolumeChanged { level: None });
    }

    #[test]
    fn test_event_missing_fields_degrade_to_none() {
        let event = Event::from_envelope(envelope(json!({"type": "progress_update"})));
        assert_eq!(
            event,
            Event::ProgressUpdate {
                position: None,
                total: None
            }
        );
    }

    #[test]
    fn test_event_field_lookup_falls_back_to_any_case() {
        let event = Event::from_envelope(envelope(json!({
            "type": "file_loaded",
            "data": {"Filename": "C:\\music\\song.wav", "Duration": 12.5}
        })));
        assert_eq!(
            event,
            Event::FileLoaded {
                filename: Some("C:\\music\\song.wav".into()),
                duration: Some(12.5),
            }
        );
    }

    #[test]
    fn test_event_test_packet_keeps_whole_payload() {
        let event = Event::from_envelope(envelope(json!({
            "type": "test_packet",
            "data": {"seq": 4, "from": "10.0.0.7"}
        })));
        match event {
            Event::TestPacket { payload } => {
                assert_eq!(payload["seq"], 4);
                assert_eq!(payload["from"], "10.0.0.7");
            }
            other => panic!("expected TestPacket, got {other:?}"),
        }
    }

    #[test]
    fn test_event_unknown_type_is_kept_for_logging() {
        let event = Event::from_envelope(envelope(json!({"type": "fly_to_moon", "data": {}})));
        assert_eq!(
            event,
            Event::Unknown {
                kind: "fly_to_moon".into()
            }
        );
        assert_eq!(event.kind(), None);
    }

    #[test]
    fn test_event_kind_matches_source_type() {
        let event: Event = envelope(json!({"type": "client_connected", "data": {"name": "Den"}})).into();
        assert_eq!(event.kind(), Some(EventKind::ClientConnected));
    }
}
