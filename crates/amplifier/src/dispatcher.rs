//! Routes inbound backend messages to the session state machine.
//!
//! ```text
//! bytes ─decode─→ Envelope ─→ Event ─apply_event─→ SessionMachine ─→ Notifier
//! ```
//!
//! A frame that fails to decode is logged and discarded; it never ends the
//! receive loop. Unknown message types are logged at debug level.
//! Frames that arrive once the session has left `ConnectedToBackend`
//! (after `disconnect_all`, or while a new link is being set up) belong
//! to a link that is already gone and are dropped.

use amplifier_protocol::{Codec, Event, JsonCodec, Payload};
use amplifier_session::{Change, ConnectionPhase, SessionMachine};
use amplifier_transport::Connection;

use crate::client::Shared;

/// Applies one decoded event to `machine` and returns what changed.
pub fn apply_event(machine: &mut SessionMachine, event: Event) -> Vec<Change> {
    match event {
        Event::Status { message } => machine.on_status(message.as_deref()),
        Event::HostStarted { address, port } => {
            machine.on_host_started(address.as_deref(), port)
        }
        Event::DeviceFound {
            name,
            address,
            device_type,
        } => machine.on_device_found(
            name.as_deref(),
            address.as_deref(),
            device_type.as_deref(),
        ),
        Event::Connected { name, address } => {
            machine.on_connected(name.as_deref(), address.as_deref())
        }
        Event::PlaybackStarted { .. } => machine.on_playback_started(),
        Event::PlaybackPaused => machine.on_playback_paused(),
        Event::PlaybackStopped => machine.on_playback_stopped(),
        Event::ProgressUpdate { position, total } => {
            machine.on_progress_update(position, total)
        }
        Event::VolumeChanged { level } => machine.on_volume_changed(level),
        Event::FileLoaded { filename, duration } => {
            machine.on_file_loaded(filename.as_deref(), duration)
        }
        Event::Log { message } => match message {
            Some(message) => machine.on_notice(message),
            None => Vec::new(),
        },
        Event::TestPacket { payload } => {
            machine.on_notice(format!("Test packet: {}", describe(&payload)))
        }
        Event::TestPacketReceived { payload } => machine.on_notice(format!(
            "Test packet received: {}",
            describe(&payload)
        )),
        Event::ClientConnected { name, address } => {
            machine.on_client_connected(name.as_deref(), address.as_deref())
        }
        Event::ClientFound { name, address } => {
            let who = match (name, address) {
                (Some(name), Some(address)) => format!("{name} ({address})"),
                (Some(who), None) | (None, Some(who)) => who,
                (None, None) => "unknown".to_string(),
            };
            machine.on_notice(format!("Client found: {who}"))
        }
        Event::Unknown { kind } => {
            tracing::debug!(%kind, "ignoring unknown message type");
            Vec::new()
        }
    }
}

fn describe(payload: &Payload) -> String {
    if payload.is_empty() {
        return "(empty)".to_string();
    }
    serde_json::Value::Object(payload.clone()).to_string()
}

/// Decodes frames and applies them to the shared session.
#[derive(Debug, Clone, Default)]
pub(crate) struct Dispatcher<C: Codec = JsonCodec> {
    codec: C,
}

impl<C: Codec> Dispatcher<C> {
    /// Handles one inbound frame. Publishes a notification if anything
    /// changed.
    pub(crate) fn dispatch<T: Connection>(&self, shared: &Shared<T>, data: &[u8]) {
        let envelope = match self.codec.decode_envelope(data) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    len = data.len(),
                    "discarding malformed backend message"
                );
                return;
            }
        };
        tracing::trace!(kind = %envelope.kind, "backend message");
        let event = Event::from_envelope(envelope);
        shared.update(|machine| apply_live(machine, event));
    }
}

/// [`apply_event`], but only while the backend link is up.
fn apply_live(machine: &mut SessionMachine, event: Event) -> Vec<Change> {
    if machine.state().connection_phase != ConnectionPhase::ConnectedToBackend {
        tracing::debug!(
            kind = ?event.kind(),
            phase = %machine.state().connection_phase,
            "link no longer current, dropping backend message"
        );
        return Vec::new();
    }
    apply_event(machine, event)
}
