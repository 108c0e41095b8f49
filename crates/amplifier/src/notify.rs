//! Notifications from the client to its consumer.
//!
//! The client never calls back into consumer code. Every state transition
//! is pushed onto a bounded channel and the consumer drains it on its own
//! schedule: `recv().await` from async code, [`Notifications::try_recv`]
//! from a UI tick, or [`Notifications::blocking_recv`] from a plain thread.
//!
//! Sending never blocks. When the channel is full, `Phase` and
//! `ReconnectAbandoned` notifications move to an overflow queue that the
//! consumer reads after the channel. Consecutive `State` notifications in
//! that queue collapse into the newest one. `ReconnectScheduled` is dropped.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use amplifier_session::{Change, ConnectionPhase, SessionState};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Something the consumer may want to redraw.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// The backend link changed phase.
    Phase(ConnectionPhase),
    /// The session state changed. `snapshot` is the full state after the
    /// changes were applied.
    State {
        snapshot: Box<SessionState>,
        changes: Vec<Change>,
    },
    /// A reconnection attempt will start after `delay`.
    ReconnectScheduled { attempt: u32, delay: Duration },
    /// The supervisor gave up after `attempts` failed attempts and waits
    /// for [`Client::reconnect`](crate::Client::reconnect).
    ReconnectAbandoned { attempts: u32 },
}

type Overflow = Arc<Mutex<VecDeque<Notification>>>;

/// Receiving half of the notification channel.
#[derive(Debug)]
pub struct Notifications {
    rx: mpsc::Receiver<Notification>,
    overflow: Overflow,
}

impl Notifications {
    /// Waits for the next notification. Returns `None` once the client is
    /// closed and every queued notification has been taken.
    pub async fn recv(&mut self) -> Option<Notification> {
        if let Some(notification) = self.try_recv() {
            return Some(notification);
        }
        match self.rx.recv().await {
            Some(notification) => Some(notification),
            None => self.overflow.lock().pop_front(),
        }
    }

    /// Takes a queued notification without waiting.
    pub fn try_recv(&mut self) -> Option<Notification> {
        // Everything in the channel predates the overflow queue.
        match self.rx.try_recv() {
            Ok(notification) => Some(notification),
            Err(_) => self.overflow.lock().pop_front(),
        }
    }

    /// Blocking variant of [`recv`](Self::recv) for non-async consumers.
    ///
    /// # Panics
    /// Panics if called from inside an async execution context.
    pub fn blocking_recv(&mut self) -> Option<Notification> {
        if let Some(notification) = self.try_recv() {
            return Some(notification);
        }
        match self.rx.blocking_recv() {
            Some(notification) => Some(notification),
            None => self.overflow.lock().pop_front(),
        }
    }
}

/// Sending half. Never blocks.
#[derive(Debug, Clone)]
pub(crate) struct Notifier {
    tx: mpsc::Sender<Notification>,
    overflow: Overflow,
    overflow_limit: usize,
}

impl Notifier {
    pub(crate) fn channel(capacity: usize) -> (Self, Notifications) {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let overflow = Overflow::default();
        let notifier = Self {
            tx,
            overflow: Arc::clone(&overflow),
            overflow_limit: capacity,
        };
        (notifier, Notifications { rx, overflow })
    }

    pub(crate) fn send(&self, notification: Notification) {
        if self.tx.is_closed() {
            debug!(
                kind = notification.label(),
                "notification channel closed, receiver dropped"
            );
            return;
        }

        let mut overflow = self.overflow.lock();
        // Once anything has overflowed, later notifications queue behind it
        // so the consumer sees them in order.
        let notification = if overflow.is_empty() {
            match self.tx.try_send(notification) {
                Ok(()) => return,
                Err(mpsc::error::TrySendError::Full(n)) => n,
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("notification channel closed, receiver dropped");
                    return;
                }
            }
        } else {
            notification
        };
        self.hold(&mut overflow, notification);
    }

    fn hold(&self, overflow: &mut VecDeque<Notification>, notification: Notification) {
        match notification {
            Notification::ReconnectScheduled { .. } => {
                warn!(
                    kind = notification.label(),
                    "notification channel full, dropping notification"
                );
                return;
            }
            Notification::State { .. } => {
                if let Some(last) = overflow.back_mut() {
                    if matches!(last, Notification::State { .. }) {
                        debug!("notification channel full, superseding queued state");
                        *last = notification;
                        return;
                    }
                }
                overflow.push_back(notification);
            }
            Notification::Phase(_) | Notification::ReconnectAbandoned { .. } => {
                overflow.push_back(notification);
            }
        }

        if overflow.len() > self.overflow_limit {
            // Shed the oldest state snapshot first; phases are kept longest.
            let index = overflow
                .iter()
                .position(|n| matches!(n, Notification::State { .. }))
                .unwrap_or(0);
            if let Some(dropped) = overflow.remove(index) {
                warn!(
                    kind = dropped.label(),
                    "notification overflow full, dropping oldest notification"
                );
            }
        }
    }

    /// Publishes a state transition. Nothing is sent for an empty change
    /// list; a phase change also yields a [`Notification::Phase`].
    pub(crate) fn publish(&self, state: &SessionState, changes: Vec<Change>) {
        if changes.is_empty() {
            return;
        }
        for change in &changes {
            if let Change::ConnectionPhase(phase) = change {
                self.send(Notification::Phase(*phase));
            }
        }
        self.send(Notification::State {
            snapshot: Box::new(state.clone()),
            changes,
        });
    }
}

impl Notification {
    fn label(&self) -> &'static str {
        match self {
            Self::Phase(_) => "phase",
            Self::State { .. } => "state",
            Self::ReconnectScheduled { .. } => "reconnect_scheduled",
            Self::ReconnectAbandoned { .. } => "reconnect_abandoned",
        }
    }
}
