//! The session state machine: the only writer of [`SessionState`].
//!
//! Three families of operations mutate the state:
//!
//! - **Commands** (`request_*`) — user intent. They validate arguments,
//!   apply an optimistic local effect where one makes sense, and hand back
//!   the [`Command`] to put on the wire.
//! - **Events** (`on_*`) — backend reports, one per inbound message type.
//!   These are authoritative and always override an optimistic guess.
//! - **Link** (`begin_connect`, `connection_established`,
//!   `connection_lost`) — driven by the reconnection supervisor.
//!
//! Every operation returns the list of [`Change`]s it made. An empty list
//! means nothing changed and nobody needs to be told.
//!
//! # Concurrency note
//!
//! `SessionMachine` is not thread-safe by itself. The client keeps it
//! behind one mutex so the receive path and the command path take turns.

use amplifier_protocol::Command;

use crate::{
    ActivityEntry, Change, ConnectionPhase, Device, DeviceState,
    PlaybackPhase, Role, SessionConfig, SessionError, SessionState,
};

/// Name shown in the joined list for this device while hosting.
pub const HOST_ENTRY: &str = "This device (Host)";

/// An accepted command: what to send, and what changed locally.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub command: Command,
    /// Optimistic changes already applied to the state.
    pub changes: Vec<Change>,
}

impl Request {
    fn new(command: Command, changes: Vec<Change>) -> Self {
        Self { command, changes }
    }
}

/// Owns the client-side [`SessionState`] and every transition on it.
#[derive(Debug)]
pub struct SessionMachine {
    state: SessionState,
    config: SessionConfig,
}

impl SessionMachine {
    /// Creates a machine in the initial `Disconnected` state.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            state: SessionState::new(&config),
            config,
        }
    }

    /// Read access to the live state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// A cloned snapshot for handing to consumers.
    pub fn snapshot(&self) -> SessionState {
        self.state.clone()
    }

    // =====================================================================
    // Commands
    // =====================================================================

    /// Ask the backend to start hosting. Role changes only once the
    /// backend confirms with `host_started`.
    pub fn request_become_host(&mut self) -> Request {
        let changes = vec![self.log("Requesting host mode")];
        Request::new(Command::BecomeHost, changes)
    }

    /// Ask the backend to browse for hosts. Previously discovered devices
    /// are forgotten; the joined list is left alone.
    pub fn request_scan_devices(&mut self) -> Request {
        let mut changes = Vec::new();
        if !self.state.discovered.is_empty() {
            self.state.discovered.clear();
            changes.push(Change::DevicesCleared);
        }
        changes.push(self.log("Scanning for nearby devices..."));
        Request::new(Command::ScanDevices, changes)
    }

    /// Ask the backend to join the host at `address`.
    ///
    /// # Errors
    /// [`SessionError::InvalidAddress`] if `address` is blank.
    pub fn request_connect(
        &mut self,
        address: &str,
    ) -> Result<Request, SessionError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(SessionError::InvalidAddress(address.to_string()));
        }
        let changes = vec![self.log(format!("Connecting to {address}"))];
        Ok(Request::new(
            Command::ConnectDevice {
                address: address.to_string(),
            },
            changes,
        ))
    }

    /// Leave the audio network: forget role, devices, and playback, and
    /// mark the backend link as down.
    ///
    /// There is no wire message for this; the caller tears down the
    /// backend channel.
    pub fn request_disconnect_all(&mut self) -> Vec<Change> {
        let mut changes = self.set_phase(ConnectionPhase::Disconnected);
        changes.extend(self.reset_network());
        changes.extend(self.set_status("Disconnected"));
        changes.push(self.log("Disconnected from all devices"));
        changes
    }

    /// Ask the backend to load `path`. `loaded_track_name` changes only
    /// once the backend reports `file_loaded`.
    ///
    /// # Errors
    /// [`SessionError::InvalidPath`] if `path` is blank.
    pub fn request_select_file(
        &mut self,
        path: &str,
    ) -> Result<Request, SessionError> {
        if path.trim().is_empty() {
            return Err(SessionError::InvalidPath(path.to_string()));
        }
        let shown = track_name(path).unwrap_or(path);
        let changes = vec![self.log(format!("Selected audio file: {shown}"))];
        Ok(Request::new(
            Command::SelectFile {
                path: path.to_string(),
            },
            changes,
        ))
    }

    /// Optimistically `Playing`.
    pub fn request_play(&mut self) -> Request {
        let changes = self.set_playback(PlaybackPhase::Playing).into_iter().collect();
        Request::new(Command::Play, changes)
    }

    /// Optimistically `Paused`, but only from `Playing`.
    pub fn request_pause(&mut self) -> Request {
        let changes = if self.state.playback == PlaybackPhase::Playing {
            self.set_playback(PlaybackPhase::Paused).into_iter().collect()
        } else {
            Vec::new()
        };
        Request::new(Command::Pause, changes)
    }

    /// `Stopped` with progress reset, immediately.
    pub fn request_stop(&mut self) -> Request {
        Request::new(Command::Stop, self.stop_playback())
    }

    /// Clamps `percent` into `0..=100` and applies it locally before the
    /// backend acknowledges.
    pub fn request_set_volume(&mut self, percent: i32) -> Request {
        let level = percent.clamp(0, 100) as u8;
        let changes = self.set_volume(level).into_iter().collect();
        Request::new(Command::Volume { level }, changes)
    }

    // =====================================================================
    // Events
    // =====================================================================

    /// `status`: replace the status line.
    pub fn on_status(&mut self, message: Option<&str>) -> Vec<Change> {
        match message {
            Some(message) => self.set_status(message).into_iter().collect(),
            None => Vec::new(),
        }
    }

    /// `host_started`: this device is now the host.
    pub fn on_host_started(
        &mut self,
        address: Option<&str>,
        port: Option<u16>,
    ) -> Vec<Change> {
        let mut changes = Vec::new();
        changes.extend(self.set_role(Role::Host));
        changes.extend(self.join(HOST_ENTRY));

        if let Some(address) = address.filter(|a| !a.is_empty()) {
            let host = match port {
                Some(port) => format!("{address}:{port}"),
                None => address.to_string(),
            };
            if self.state.host_address.as_deref() != Some(host.as_str()) {
                self.state.host_address = Some(host.clone());
                changes.push(Change::HostAddress(Some(host)));
            }
        }

        changes.extend(self.set_status("Hosting - Waiting for connections"));
        changes.push(self.log("Started as host device"));
        changes
    }

    /// `device_found`: first sighting of an address wins; later sightings
    /// of the same address are ignored.
    pub fn on_device_found(
        &mut self,
        name: Option<&str>,
        address: Option<&str>,
        device_type: Option<&str>,
    ) -> Vec<Change> {
        let Some(address) = address.filter(|a| !a.is_empty()) else {
            tracing::debug!(?name, "device_found without address, ignoring");
            return Vec::new();
        };
        if self.state.discovered.contains_key(address) {
            return Vec::new();
        }

        let device = Device {
            name: name.unwrap_or(address).to_string(),
            address: address.to_string(),
            device_type: device_type.unwrap_or("unknown").to_string(),
            state: DeviceState::Discovered,
        };
        self.state
            .discovered
            .insert(device.address.clone(), device.clone());
        let message = format!("Found device: {} ({})", device.name, device.address);
        vec![Change::Device(device), self.log(message)]
    }

    /// `connected`: we joined a host as a listener.
    pub fn on_connected(
        &mut self,
        name: Option<&str>,
        address: Option<&str>,
    ) -> Vec<Change> {
        let address = address.filter(|a| !a.is_empty());
        let name = name
            .filter(|n| !n.is_empty())
            .or(address)
            .unwrap_or("Remote Host");

        let mut changes = Vec::new();
        changes.extend(self.set_role(Role::Listener));
        changes.extend(self.join(name));

        if let Some(address) = address {
            let device = self
                .state
                .discovered
                .entry(address.to_string())
                .or_insert_with(|| Device {
                    name: name.to_string(),
                    address: address.to_string(),
                    device_type: "host".to_string(),
                    state: DeviceState::Discovered,
                });
            if device.state != DeviceState::Connected {
                device.state = DeviceState::Connected;
                changes.push(Change::Device(device.clone()));
            }
        }

        changes.extend(self.set_status(&format!("Connected to: {name}")));
        changes.push(self.log(format!("Connected to host: {name}")));
        changes
    }

    /// `playback_started`: authoritative `Playing`, progress from zero.
    pub fn on_playback_started(&mut self) -> Vec<Change> {
        let mut changes: Vec<Change> =
            self.set_playback(PlaybackPhase::Playing).into_iter().collect();
        changes.extend(self.set_progress(0.0));
        changes.push(self.log("Audio streaming started"));
        changes
    }

    /// `playback_paused`: authoritative `Paused`.
    pub fn on_playback_paused(&mut self) -> Vec<Change> {
        let mut changes: Vec<Change> =
            self.set_playback(PlaybackPhase::Paused).into_iter().collect();
        changes.push(self.log("Audio streaming paused"));
        changes
    }

    /// `playback_stopped`: authoritative `Stopped`, progress reset.
    pub fn on_playback_stopped(&mut self) -> Vec<Change> {
        let mut changes = self.stop_playback();
        changes.push(self.log("Audio streaming stopped"));
        changes
    }

    /// `progress_update`: needs both numbers; otherwise a no-op.
    pub fn on_progress_update(
        &mut self,
        position: Option<f64>,
        total: Option<f64>,
    ) -> Vec<Change> {
        match (position, total) {
            (Some(position), Some(total)) => self
                .set_progress(progress_fraction(position, total))
                .into_iter()
                .collect(),
            _ => Vec::new(),
        }
    }

    /// `volume_changed`: rounded and clamped; absent level is ignored.
    pub fn on_volume_changed(&mut self, level: Option<f64>) -> Vec<Change> {
        match level.filter(|l| l.is_finite()) {
            Some(level) => {
                let level = level.round().clamp(0.0, 100.0) as u8;
                self.set_volume(level).into_iter().collect()
            }
            None => Vec::new(),
        }
    }

    /// `file_loaded`: keep only the last path segment as the track name.
    pub fn on_file_loaded(
        &mut self,
        filename: Option<&str>,
        duration: Option<f64>,
    ) -> Vec<Change> {
        let Some(name) = filename.and_then(track_name) else {
            return Vec::new();
        };
        let name = name.to_string();
        let duration = duration.filter(|d| d.is_finite() && *d >= 0.0);

        self.state.loaded_track_name = Some(name.clone());
        self.state.track_duration = duration;
        let message = format!("Loaded audio file: {name}");
        vec![Change::TrackLoaded { name, duration }, self.log(message)]
    }

    /// `client_connected`: a listener joined our broadcast.
    pub fn on_client_connected(
        &mut self,
        name: Option<&str>,
        address: Option<&str>,
    ) -> Vec<Change> {
        let Some(name) = name.filter(|n| !n.is_empty()).or(address) else {
            return Vec::new();
        };
        let mut changes: Vec<Change> = self.join(name).into_iter().collect();
        changes.push(self.log(format!("Client connected: {name}")));
        changes
    }

    /// `log`, `test_packet`, `test_packet_received`, `client_found`: record
    /// the message without touching anything else.
    pub fn on_notice(&mut self, message: impl Into<String>) -> Vec<Change> {
        vec![self.log(message)]
    }

    // =====================================================================
    // Link
    // =====================================================================

    /// A connection attempt is starting. Only valid from `Disconnected`.
    pub fn begin_connect(&mut self) -> Vec<Change> {
        if self.state.connection_phase != ConnectionPhase::Disconnected {
            tracing::debug!(
                phase = %self.state.connection_phase,
                "begin_connect outside Disconnected, ignoring"
            );
            return Vec::new();
        }
        let mut changes = self.set_phase(ConnectionPhase::ConnectingToBackend);
        changes.extend(self.set_status("Connecting to backend..."));
        changes
    }

    /// The attempt succeeded.
    pub fn connection_established(&mut self) -> Vec<Change> {
        let mut changes = self.set_phase(ConnectionPhase::ConnectedToBackend);
        changes.extend(self.set_status("Connected to backend"));
        changes.push(self.log("Backend connection established"));
        changes
    }

    /// The attempt failed or the live connection was lost.
    ///
    /// Nothing about the audio network survives a lost channel: role,
    /// devices, and playback are reset. Volume, loaded track and the
    /// activity record are kept.
    pub fn connection_lost(&mut self, reason: &str) -> Vec<Change> {
        let was_connected =
            self.state.connection_phase == ConnectionPhase::ConnectedToBackend;
        let mut changes = self.set_phase(ConnectionPhase::Disconnected);
        if was_connected {
            changes.extend(self.reset_network());
        }
        changes.extend(self.set_status(&format!("Disconnected: {reason}")));
        changes.push(self.log(format!("Backend connection lost: {reason}")));
        changes
    }

    // =====================================================================
    // Helpers
    // =====================================================================

    fn set_phase(&mut self, phase: ConnectionPhase) -> Vec<Change> {
        if self.state.connection_phase == phase {
            return Vec::new();
        }
        self.state.connection_phase = phase;
        vec![Change::ConnectionPhase(phase)]
    }

    fn set_status(&mut self, status: &str) -> Option<Change> {
        if self.state.status == status {
            return None;
        }
        self.state.status = status.to_string();
        Some(Change::Status(status.to_string()))
    }

    fn set_role(&mut self, role: Role) -> Option<Change> {
        if self.state.role == role {
            return None;
        }
        self.state.role = role;
        Some(Change::Role(role))
    }

    fn set_playback(&mut self, phase: PlaybackPhase) -> Option<Change> {
        if self.state.playback == phase {
            return None;
        }
        self.state.playback = phase;
        Some(Change::Playback(phase))
    }

    fn set_progress(&mut self, fraction: f64) -> Option<Change> {
        if self.state.progress_fraction == fraction {
            return None;
        }
        self.state.progress_fraction = fraction;
        Some(Change::Progress(fraction))
    }

    fn set_volume(&mut self, level: u8) -> Option<Change> {
        if self.state.volume_percent == level {
            return None;
        }
        self.state.volume_percent = level;
        Some(Change::Volume(level))
    }

    fn stop_playback(&mut self) -> Vec<Change> {
        let mut changes: Vec<Change> =
            self.set_playback(PlaybackPhase::Stopped).into_iter().collect();
        changes.extend(self.set_progress(0.0));
        changes
    }

    /// Appends `name` to the joined list unless it is already there.
    fn join(&mut self, name: &str) -> Option<Change> {
        if self.state.joined.iter().any(|joined| joined == name) {
            return None;
        }
        self.state.joined.push(name.to_string());
        Some(Change::Joined(name.to_string()))
    }

    fn reset_network(&mut self) -> Vec<Change> {
        let mut changes = Vec::new();
        changes.extend(self.set_role(Role::None));
        if !self.state.discovered.is_empty() || !self.state.joined.is_empty() {
            self.state.discovered.clear();
            self.state.joined.clear();
            changes.push(Change::DevicesCleared);
        }
        if self.state.host_address.take().is_some() {
            changes.push(Change::HostAddress(None));
        }
        changes.extend(self.stop_playback());
        changes
    }

    fn log(&mut self, message: impl Into<String>) -> Change {
        let message = message.into();
        let capacity = self.config.activity_capacity.max(1);
        while self.state.activity.len() >= capacity {
            self.state.activity.pop_front();
        }
        self.state.activity.push_back(ActivityEntry {
            at: std::time::SystemTime::now(),
            message: message.clone(),
        });
        Change::Activity(message)
    }
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

/// `position / total`, clamped into `0.0..=1.0`. A zero, negative, or
/// non-finite total yields `0.0`.
pub fn progress_fraction(position: f64, total: f64) -> f64 {
    if !total.is_finite() || total <= 0.0 {
        return 0.0;
    }
    let fraction = position / total;
    if fraction.is_nan() {
        return 0.0;
    }
    fraction.clamp(0.0, 1.0)
}

/// The last path segment of `path`, accepting both `/` and `\` separators.
pub fn track_name(path: &str) -> Option<&str> {
    path.trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

// =========================================================================
// Tests
// =========================================================================
