//! Connection supervisor: owns the backend link for the client's lifetime.
//!
//! ```text
//!        ┌──────────── Reconnect ────────────┐
//!        ↓                                   │
//!    connect ──ok──→ receive loop ──lost──→ backoff ──→ connect ...
//!        │                 │                   │
//!        └──fail──→ backoff│                   └─ too many failures ─→ parked
//!                          └── Disconnect ─────────────────────────────→ parked
//! ```
//!
//! Every loss re-enters `Disconnected` before the next attempt, and only
//! one attempt is ever in flight. Consecutive failures are counted; a
//! successful connection resets the count.

use std::sync::Arc;

use amplifier_session::ConnectionPhase;
use amplifier_transport::{Connection, Connector};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::client::Shared;
use crate::dispatcher::Dispatcher;
use crate::notify::Notification;
use crate::ClientConfig;

/// Requests from the [`Client`](crate::Client) to the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Control {
    /// Start a fresh attempt now, with the failure count reset.
    Reconnect,
    /// Close the link and stay idle until `Reconnect`.
    Disconnect,
    /// Close the link and exit.
    Shutdown,
}

/// How a stretch of supervised work ended.
#[derive(Debug)]
enum Outcome {
    /// The attempt failed or the live link was lost.
    Lost,
    /// Go idle until told to reconnect.
    Park,
    /// Start over immediately.
    Restart,
    Shutdown,
}

pub(crate) struct Supervisor<C: Connector> {
    connector: C,
    config: ClientConfig,
    shared: Arc<Shared<C::Connection>>,
    control: mpsc::UnboundedReceiver<Control>,
    dispatcher: Dispatcher,
    /// Consecutive failed attempts.
    failures: u32,
}

impl<C: Connector> Supervisor<C> {
    pub(crate) fn new(
        connector: C,
        config: ClientConfig,
        shared: Arc<Shared<C::Connection>>,
        control: mpsc::UnboundedReceiver<Control>,
    ) -> Self {
        Self {
            connector,
            config,
            shared,
            control,
            dispatcher: Dispatcher::default(),
            failures: 0,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            let outcome = match self.connect().await {
                Ok(conn) => {
                    self.failures = 0;
                    self.serve(conn).await
                }
                Err(outcome) => outcome,
            };

            let next = match outcome {
                Outcome::Lost => self.backoff().await,
                other => other,
            };

            match next {
                Outcome::Lost | Outcome::Restart => {}
                Outcome::Park => {
                    if !self.park().await {
                        break;
                    }
                }
                Outcome::Shutdown => break,
            }
        }
        debug!("supervisor exiting");
    }

    /// One connection attempt, bounded by `connect_timeout`.
    async fn connect(&mut self) -> Result<Arc<C::Connection>, Outcome> {
        self.shared.update(|m| m.begin_connect());
        let url = self.config.backend_url.clone();
        debug!(%url, attempt = self.failures + 1, "connecting to backend");

        let attempt = tokio::time::timeout(
            self.config.connect_timeout,
            self.connector.connect(&url),
        );
        tokio::pin!(attempt);
        let result = loop {
            tokio::select! {
                result = &mut attempt => break result,
                control = self.control.recv() => match interrupt(control) {
                    Outcome::Restart => {
                        debug!("reconnect requested while connecting, ignoring");
                    }
                    other => {
                        self.mark_down(&other);
                        return Err(other);
                    }
                },
            }
        };

        match result {
            Ok(Ok(conn)) => {
                info!(conn_id = %conn.id(), %url, "connected to backend");
                // The link must be in place before consumers hear
                // `ConnectedToBackend` and start issuing commands.
                let conn = Arc::new(conn);
                self.shared.set_link(Some(Arc::clone(&conn)));
                self.shared.update(|m| m.connection_established());
                Ok(conn)
            }
            Ok(Err(e)) => {
                warn!(%url, error = %e, "backend connection failed");
                let reason = e.to_string();
                self.shared.update(|m| m.connection_lost(&reason));
                Err(Outcome::Lost)
            }
            Err(_) => {
                warn!(%url, timeout_ms = self.config.connect_timeout.as_millis() as u64, "backend connection timed out");
                self.shared.update(|m| m.connection_lost("connect timed out"));
                Err(Outcome::Lost)
            }
        }
    }

    /// Receive loop for a live connection.
    async fn serve(&mut self, conn: Arc<C::Connection>) -> Outcome {
        let conn_id = conn.id();
        let outcome = loop {
            tokio::select! {
                control = self.control.recv() => match interrupt(control) {
                    Outcome::Restart => {
                        debug!(%conn_id, "reconnect requested while connected, ignoring");
                    }
                    other => break other,
                },
                frame = conn.recv() => match frame {
                    Ok(Some(data)) => self.dispatcher.dispatch(&*self.shared, &data),
                    Ok(None) => {
                        info!(%conn_id, "backend closed the connection");
                        self.lose("closed by backend");
                        break Outcome::Lost;
                    }
                    Err(e) => {
                        warn!(%conn_id, error = %e, "backend receive failed");
                        self.lose(&e.to_string());
                        break Outcome::Lost;
                    }
                },
            }
        };

        self.shared.set_link(None);
        if !matches!(outcome, Outcome::Lost) {
            if let Err(e) = conn.close().await {
                debug!(%conn_id, error = %e, "error closing backend connection");
            }
            self.mark_down(&outcome);
        }
        outcome
    }

    fn lose(&self, reason: &str) {
        self.shared.set_link(None);
        self.shared.update(|m| m.connection_lost(reason));
    }

    /// Marks the link down unless `disconnect_all` already did.
    fn mark_down(&self, outcome: &Outcome) {
        let reason = match outcome {
            Outcome::Shutdown => "client closed",
            _ => "disconnected by user",
        };
        self.shared.update(|m| {
            if m.state().connection_phase == ConnectionPhase::Disconnected {
                Vec::new()
            } else {
                m.connection_lost(reason)
            }
        });
    }

    /// Counts a failure and waits out the backoff delay, or gives up.
    async fn backoff(&mut self) -> Outcome {
        self.failures = self.failures.saturating_add(1);
        let policy = &self.config.reconnect;

        if !policy.allows(self.failures) {
            let attempts = self.failures - 1;
            warn!(attempts, "giving up on backend reconnection");
            self.shared
                .update(|m| m.on_notice(format!("Reconnection abandoned after {attempts} attempts")));
            self.shared
                .notifier()
                .send(Notification::ReconnectAbandoned { attempts });
            return Outcome::Park;
        }

        let attempt = self.failures;
        let delay = policy.delay_for(attempt);
        info!(attempt, delay_ms = delay.as_millis() as u64, "scheduling backend reconnection");
        self.shared
            .notifier()
            .send(Notification::ReconnectScheduled { attempt, delay });

        tokio::select! {
            _ = tokio::time::sleep(delay) => Outcome::Lost,
            control = self.control.recv() => match interrupt(control) {
                Outcome::Restart => {
                    self.failures = 0;
                    Outcome::Restart
                }
                other => other,
            },
        }
    }

    /// Waits for `Reconnect`. Returns `false` on shutdown.
    async fn park(&mut self) -> bool {
        debug!("supervisor parked");
        loop {
            match interrupt(self.control.recv().await) {
                Outcome::Restart => {
                    info!("manual reconnect requested");
                    self.failures = 0;
                    return true;
                }
                Outcome::Shutdown => return false,
                Outcome::Park | Outcome::Lost => {}
            }
        }
    }
}

/// Maps a control message to the outcome it forces. A dropped control
/// sender means the client is gone.
fn interrupt(control: Option<Control>) -> Outcome {
    match control {
        Some(Control::Reconnect) => Outcome::Restart,
        Some(Control::Disconnect) => Outcome::Park,
        Some(Control::Shutdown) | None => Outcome::Shutdown,
    }
}
