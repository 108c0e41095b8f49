//! The [`Client`]: one owned handle on the backend session.
//!
//! `Client::open` spawns two Tokio tasks:
//!
//! 1. **Supervisor** — connects, receives, dispatches, and reconnects.
//!    It never sends.
//! 2. **Writer** — drains the outbound command queue and sends through
//!    whichever connection is current.
//!
//! Command methods are synchronous: they update the session under its
//! lock, enqueue the wire command, and return. They never wait on I/O.

use std::sync::Arc;

use amplifier_protocol::{Codec, Command, JsonCodec};
use amplifier_session::{
    Change, ConnectionPhase, Request, SessionError, SessionMachine, SessionState,
};
use amplifier_transport::{Connection, Connector, WebSocketConnector};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::notify::{Notifications, Notifier};
use crate::supervisor::{Control, Supervisor};
use crate::{ClientConfig, ClientError};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// State shared by the command path, the supervisor and the writer.
pub(crate) struct Shared<T> {
    machine: Mutex<SessionMachine>,
    notifier: Notifier,
    /// The live connection, if any. The writer sends through it.
    link: Mutex<Option<Arc<T>>>,
}

impl<T: Connection> Shared<T> {
    pub(crate) fn new(machine: SessionMachine, notifier: Notifier) -> Self {
        Self {
            machine: Mutex::new(machine),
            notifier,
            link: Mutex::new(None),
        }
    }

    /// Runs `f` on the session and publishes whatever it changed.
    ///
    /// Publishing happens under the lock so notification order matches
    /// mutation order.
    pub(crate) fn update(&self, f: impl FnOnce(&mut SessionMachine) -> Vec<Change>) {
        let mut machine = self.machine.lock();
        let changes = f(&mut machine);
        self.notifier.publish(machine.state(), changes);
    }

    pub(crate) fn snapshot(&self) -> SessionState {
        self.machine.lock().snapshot()
    }

    pub(crate) fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub(crate) fn set_link(&self, conn: Option<Arc<T>>) {
        *self.link.lock() = conn;
    }

    pub(crate) fn link(&self) -> Option<Arc<T>> {
        self.link.lock().clone()
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Remote control for an audio backend.
///
/// ```rust,no_run
/// use amplifier::prelude::*;
///
/// # async fn run() -> Result<(), ClientError> {
/// let (client, mut notifications) = Client::open(ClientConfig::default());
///
/// while let Some(notification) = notifications.recv().await {
///     if notification == Notification::Phase(ConnectionPhase::ConnectedToBackend) {
///         client.scan_devices()?;
///     }
/// }
/// client.close().await;
/// # Ok(())
/// # }
/// ```
pub struct Client<C: Connector = WebSocketConnector> {
    shared: Arc<Shared<C::Connection>>,
    commands: mpsc::UnboundedSender<Command>,
    control: mpsc::UnboundedSender<Control>,
    supervisor: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Client<WebSocketConnector> {
    /// Opens a client that talks WebSocket to `config.backend_url`.
    ///
    /// Must be called from within a Tokio runtime. The first connection
    /// attempt starts immediately; watch the returned [`Notifications`]
    /// for [`ConnectionPhase::ConnectedToBackend`].
    pub fn open(config: ClientConfig) -> (Self, Notifications) {
        Self::open_with(WebSocketConnector, config)
    }
}

impl<C: Connector> Client<C> {
    /// Opens a client over a custom [`Connector`].
    pub fn open_with(connector: C, config: ClientConfig) -> (Self, Notifications) {
        let config = config.validated();
        let (notifier, notifications) = Notifier::channel(config.notification_capacity);
        let shared = Arc::new(Shared::new(
            SessionMachine::new(config.session_config()),
            notifier,
        ));

        let (commands, command_rx) = mpsc::unbounded_channel();
        let (control, control_rx) = mpsc::unbounded_channel();

        tracing::info!(url = %config.backend_url, "opening amplifier client");

        let supervisor = Supervisor::new(connector, config, Arc::clone(&shared), control_rx);
        let supervisor = tokio::spawn(supervisor.run());
        let writer = tokio::spawn(run_writer(Arc::clone(&shared), command_rx, JsonCodec));

        let client = Self {
            shared,
            commands,
            control,
            supervisor,
            writer,
        };
        (client, notifications)
    }

    /// A snapshot of the current session state.
    pub fn state(&self) -> SessionState {
        self.shared.snapshot()
    }

    /// Asks the backend to start hosting.
    pub fn become_host(&self) -> Result<(), ClientError> {
        self.submit(|m| Ok(m.request_become_host()))
    }

    /// Asks the backend to browse for hosts.
    pub fn scan_devices(&self) -> Result<(), ClientError> {
        self.submit(|m| Ok(m.request_scan_devices()))
    }

    /// Joins the host at `address` (`host:port`).
    pub fn connect_device(&self, address: &str) -> Result<(), ClientError> {
        self.submit(|m| m.request_connect(address))
    }

    /// Loads the audio file at `path` on the backend.
    pub fn select_file(&self, path: &str) -> Result<(), ClientError> {
        self.submit(|m| m.request_select_file(path))
    }

    pub fn play(&self) -> Result<(), ClientError> {
        self.submit(|m| Ok(m.request_play()))
    }

    pub fn pause(&self) -> Result<(), ClientError> {
        self.submit(|m| Ok(m.request_pause()))
    }

    pub fn stop(&self) -> Result<(), ClientError> {
        self.submit(|m| Ok(m.request_stop()))
    }

    /// Sets the output volume. Values outside `0..=100` are clamped.
    pub fn set_volume(&self, percent: i32) -> Result<(), ClientError> {
        self.submit(|m| Ok(m.request_set_volume(percent)))
    }

    /// Leaves the audio network and closes the backend link.
    ///
    /// The supervisor stays idle afterwards until [`reconnect`](Self::reconnect).
    pub fn disconnect_all(&self) -> Result<(), ClientError> {
        if self.control.is_closed() {
            return Err(ClientError::Closed);
        }
        self.shared.update(|m| m.request_disconnect_all());
        self.control
            .send(Control::Disconnect)
            .map_err(|_| ClientError::Closed)
    }

    /// Starts a fresh connection attempt with the backoff reset. Use after
    /// [`disconnect_all`](Self::disconnect_all) or a
    /// [`ReconnectAbandoned`](crate::Notification::ReconnectAbandoned).
    pub fn reconnect(&self) -> Result<(), ClientError> {
        self.control
            .send(Control::Reconnect)
            .map_err(|_| ClientError::Closed)
    }

    /// Shuts down both tasks and closes the backend link.
    pub async fn close(self) {
        let Self {
            shared,
            commands,
            control,
            supervisor,
            writer,
        } = self;

        let _ = control.send(Control::Shutdown);
        drop(commands);

        if let Err(e) = supervisor.await {
            tracing::warn!(error = %e, "supervisor task failed");
        }
        if let Err(e) = writer.await {
            tracing::warn!(error = %e, "writer task failed");
        }
        shared.set_link(None);
        tracing::info!("amplifier client closed");
    }

    fn submit(
        &self,
        f: impl FnOnce(&mut SessionMachine) -> Result<Request, SessionError>,
    ) -> Result<(), ClientError> {
        if self.commands.is_closed() {
            return Err(ClientError::Closed);
        }
        let mut machine = self.shared.machine.lock();
        if machine.state().connection_phase != ConnectionPhase::ConnectedToBackend {
            return Err(ClientError::NotConnected);
        }
        let Request { command, changes } = f(&mut machine)?;
        tracing::debug!(%command, "queueing command");
        self.commands
            .send(command)
            .map_err(|_| ClientError::Closed)?;
        self.shared.notifier.publish(machine.state(), changes);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Sends queued commands until the queue closes. A command that finds no
/// live connection, or fails to send, is dropped.
async fn run_writer<T: Connection, K: Codec>(
    shared: Arc<Shared<T>>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    codec: K,
) {
    while let Some(command) = commands.recv().await {
        let Some(conn) = shared.link() else {
            tracing::warn!(%command, "no backend connection, dropping command");
            continue;
        };
        let bytes = match codec.encode(&command.clone().into_envelope()) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(%command, error = %e, "failed to encode command");
                continue;
            }
        };
        match conn.send(&bytes).await {
            Ok(()) => tracing::debug!(conn_id = %conn.id(), %command, "command sent"),
            Err(e) => tracing::warn!(
                conn_id = %conn.id(),
                %command,
                error = %e,
                "failed to send command"
            ),
        }
    }
    tracing::debug!("command queue closed, writer exiting");
}
