//! Reconnection and command-path behaviour, driven by a scripted in-memory
//! connector so failures can be injected exactly where needed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use amplifier::prelude::*;
use amplifier::transport::{Connection, ConnectionId, Connector, TransportError};
use tokio::sync::{mpsc, watch};

type Inbound = Result<Option<Vec<u8>>, TransportError>;

// =========================================================================
// Mock transport
// =========================================================================

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

struct MockConnection {
    id: ConnectionId,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Inbound>>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    closed: watch::Sender<bool>,
}

/// The test's end of a [`MockConnection`].
struct Backend {
    inbound: mpsc::UnboundedSender<Inbound>,
    outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    closed: watch::Receiver<bool>,
}

impl Backend {
    fn push(&self, json: &str) {
        self.inbound
            .send(Ok(Some(json.as_bytes().to_vec())))
            .expect("connection alive");
    }

    fn fail(&self) {
        self.inbound
            .send(Err(TransportError::ReceiveFailed(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset by peer",
            ))))
            .expect("connection alive");
    }

    async fn next_sent(&mut self) -> serde_json::Value {
        let bytes = tokio::time::timeout(Duration::from_secs(2), self.outbound.recv())
            .await
            .expect("timed out waiting for outbound message")
            .expect("outbound channel open");
        serde_json::from_slice(&bytes).expect("outbound message is JSON")
    }

    async fn wait_closed(&mut self) {
        tokio::time::timeout(Duration::from_secs(2), self.closed.wait_for(|c| *c))
            .await
            .expect("timed out waiting for close")
            .expect("connection dropped without closing");
    }
}

fn mock_pair() -> (MockConnection, Backend) {
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (closed_tx, closed_rx) = watch::channel(false);
    let conn = MockConnection {
        id: ConnectionId::new(NEXT_ID.fetch_add(1, Ordering::Relaxed)),
        inbound: tokio::sync::Mutex::new(in_rx),
        outbound: out_tx,
        closed: closed_tx,
    };
    let backend = Backend {
        inbound: in_tx,
        outbound: out_rx,
        closed: closed_rx,
    };
    (conn, backend)
}

fn closed_locally() -> TransportError {
    TransportError::ConnectionClosed("closed locally".into())
}

impl Connection for MockConnection {
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        if *self.closed.borrow() {
            return Err(closed_locally());
        }
        self.outbound.send(data.to_vec()).map_err(|_| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "backend gone",
            ))
        })
    }

    async fn recv(&self) -> Inbound {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return Err(closed_locally());
        }
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            _ = closed.changed() => Err(closed_locally()),
            item = inbound.recv() => item.unwrap_or(Ok(None)),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.send_replace(true);
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

enum Step {
    Refuse,
    Accept(MockConnection),
}

/// Plays back a script of connect outcomes. An exhausted script refuses.
#[derive(Clone, Default)]
struct ScriptedConnector {
    steps: Arc<Mutex<VecDeque<Step>>>,
    attempts: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    fn refuse(&self) {
        self.steps.lock().unwrap().push_back(Step::Refuse);
    }

    fn accept(&self) -> Backend {
        let (conn, backend) = mock_pair();
        self.steps.lock().unwrap().push_back(Step::Accept(conn));
        backend
    }

    fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Connector for ScriptedConnector {
    type Connection = MockConnection;

    async fn connect(&self, endpoint: &str) -> Result<MockConnection, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Accept(conn)) => Ok(conn),
            Some(Step::Refuse) | None => Err(TransportError::ConnectFailed {
                endpoint: endpoint.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "refused",
                ),
            }),
        }
    }
}

// =========================================================================
// Helpers
// =========================================================================

fn fast_config(max_attempts: Option<u32>) -> ClientConfig {
    ClientConfig::default()
        .with_connect_timeout(Duration::from_secs(1))
        .with_reconnect(ReconnectPolicy {
            initial_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(100),
            jitter: Duration::ZERO,
            max_attempts,
        })
}

/// Collects notifications until one satisfies `done`, returning all of
/// them (the matching one last).
async fn collect_until(
    notifications: &mut Notifications,
    mut done: impl FnMut(&Notification) -> bool,
) -> Vec<Notification> {
    tokio::time::timeout(Duration::from_secs(3), async {
        let mut seen = Vec::new();
        loop {
            let n = notifications.recv().await.expect("notification channel open");
            let stop = done(&n);
            seen.push(n);
            if stop {
                return seen;
            }
        }
    })
    .await
    .expect("timed out waiting for notification")
}

async fn wait_phase(notifications: &mut Notifications, phase: ConnectionPhase) {
    collect_until(notifications, |n| *n == Notification::Phase(phase)).await;
}

async fn wait_state(
    notifications: &mut Notifications,
    mut pred: impl FnMut(&SessionState) -> bool,
) -> SessionState {
    let seen = collect_until(notifications, |n| {
        matches!(n, Notification::State { snapshot, .. } if pred(snapshot))
    })
    .await;
    match seen.into_iter().last() {
        Some(Notification::State { snapshot, .. }) => *snapshot,
        other => panic!("expected State, got {other:?}"),
    }
}

fn scheduled(seen: &[Notification]) -> Vec<u32> {
    seen.iter()
        .filter_map(|n| match n {
            Notification::ReconnectScheduled { attempt, .. } => Some(*attempt),
            _ => None,
        })
        .collect()
}

// =========================================================================
// Reconnection
// =========================================================================

#[tokio::test]
async fn test_receive_error_schedules_exactly_one_reconnect() {
    let connector = ScriptedConnector::default();
    let first = connector.accept();
    let _second = connector.accept();

    let (client, mut notifications) = Client::open_with(connector.clone(), fast_config(Some(3)));
    wait_phase(&mut notifications, ConnectionPhase::ConnectedToBackend).await;

    first.fail();

    let seen = collect_until(&mut notifications, |n| {
        *n == Notification::Phase(ConnectionPhase::ConnectedToBackend)
    })
    .await;

    let phases: Vec<ConnectionPhase> = seen
        .iter()
        .filter_map(|n| match n {
            Notification::Phase(phase) => Some(*phase),
            _ => None,
        })
        .collect();
    assert_eq!(
        phases,
        vec![
            ConnectionPhase::Disconnected,
            ConnectionPhase::ConnectingToBackend,
            ConnectionPhase::ConnectedToBackend,
        ],
        "every loss re-enters Disconnected before the next attempt"
    );
    assert_eq!(scheduled(&seen), vec![1]);
    assert_eq!(connector.attempts(), 2);
    assert_eq!(client.state().connection_phase, ConnectionPhase::ConnectedToBackend);

    client.close().await;
}

#[tokio::test]
async fn test_loss_resets_network_state() {
    let connector = ScriptedConnector::default();
    let first = connector.accept();

    let (client, mut notifications) = Client::open_with(connector.clone(), fast_config(Some(3)));
    wait_phase(&mut notifications, ConnectionPhase::ConnectedToBackend).await;

    first.push(r#"{"type":"host_started","data":{"address":"10.0.0.2","port":9090}}"#);
    first.push(r#"{"type":"volume_changed","data":{"level":40}}"#);
    wait_state(&mut notifications, |s| s.volume_percent == 40).await;
    assert_eq!(client.state().role, Role::Host);

    first.fail();
    let state = wait_state(&mut notifications, |s| {
        s.connection_phase == ConnectionPhase::Disconnected
    })
    .await;

    assert_eq!(state.role, Role::None);
    assert!(state.joined.is_empty());
    assert_eq!(state.volume_percent, 40);

    client.close().await;
}

#[tokio::test]
async fn test_first_connect_failure_is_retried() {
    let connector = ScriptedConnector::default();
    connector.refuse();
    let _backend = connector.accept();

    let (client, mut notifications) = Client::open_with(connector.clone(), fast_config(Some(3)));
    let seen = collect_until(&mut notifications, |n| {
        *n == Notification::Phase(ConnectionPhase::ConnectedToBackend)
    })
    .await;

    assert_eq!(scheduled(&seen), vec![1]);
    assert_eq!(connector.attempts(), 2);

    client.close().await;
}

#[tokio::test]
async fn test_gives_up_after_max_attempts_until_manual_reconnect() {
    let connector = ScriptedConnector::default();
    connector.refuse();
    connector.refuse();
    connector.refuse();

    let (client, mut notifications) = Client::open_with(connector.clone(), fast_config(Some(2)));
    let seen = collect_until(&mut notifications, |n| {
        matches!(n, Notification::ReconnectAbandoned { .. })
    })
    .await;

    assert_eq!(scheduled(&seen), vec![1, 2]);
    assert_eq!(seen.last(), Some(&Notification::ReconnectAbandoned { attempts: 2 }));
    assert_eq!(connector.attempts(), 3);

    // Parked: nothing happens on its own.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(connector.attempts(), 3);

    let _backend = connector.accept();
    client.reconnect().unwrap();
    wait_phase(&mut notifications, ConnectionPhase::ConnectedToBackend).await;
    assert_eq!(connector.attempts(), 4);

    client.close().await;
}

#[tokio::test]
async fn test_disconnect_all_parks_until_reconnect() {
    let connector = ScriptedConnector::default();
    let mut first = connector.accept();
    let _second = connector.accept();

    let (client, mut notifications) = Client::open_with(connector.clone(), fast_config(Some(3)));
    wait_phase(&mut notifications, ConnectionPhase::ConnectedToBackend).await;

    first.push(r#"{"type":"connected","data":{"name":"Kitchen Speaker"}}"#);
    wait_state(&mut notifications, |s| s.role == Role::Listener).await;

    client.disconnect_all().unwrap();
    first.wait_closed().await;

    let state = client.state();
    assert_eq!(state.connection_phase, ConnectionPhase::Disconnected);
    assert_eq!(state.role, Role::None);
    assert!(state.joined.is_empty());
    assert_eq!(state.status, "Disconnected");

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(connector.attempts(), 1, "no automatic reconnect after disconnect_all");

    client.reconnect().unwrap();
    wait_phase(&mut notifications, ConnectionPhase::ConnectedToBackend).await;
    assert_eq!(connector.attempts(), 2);

    client.close().await;
}

#[tokio::test]
async fn test_disconnect_all_discards_frames_still_in_flight() {
    // A frame queued just before disconnect_all races the Disconnect
    // control message; whichever wins, nothing may survive the reset.
    for _ in 0..20 {
        let connector = ScriptedConnector::default();
        let mut first = connector.accept();

        let (client, mut notifications) =
            Client::open_with(connector.clone(), fast_config(Some(3)));
        wait_phase(&mut notifications, ConnectionPhase::ConnectedToBackend).await;

        first.push(r#"{"type":"host_started","data":{"address":"10.0.0.2","port":9090}}"#);
        client.disconnect_all().unwrap();
        first.wait_closed().await;

        let state = client.state();
        assert_eq!(state.connection_phase, ConnectionPhase::Disconnected);
        assert_eq!(state.role, Role::None);
        assert!(state.joined.is_empty(), "stale joined: {:?}", state.joined);
        assert_eq!(state.host_address, None);

        client.close().await;
    }
}

// =========================================================================
// Command path
// =========================================================================

#[tokio::test]
async fn test_commands_rejected_while_not_connected() {
    let connector = ScriptedConnector::default();
    let (client, _notifications) = Client::open_with(connector, fast_config(Some(1)));

    assert!(matches!(client.play(), Err(ClientError::NotConnected)));
    assert!(matches!(client.set_volume(10), Err(ClientError::NotConnected)));
    assert_eq!(client.state().volume_percent, 70, "rejected command changes nothing");

    client.close().await;
}

#[tokio::test]
async fn test_set_volume_clamps_before_wire() {
    let connector = ScriptedConnector::default();
    let mut backend = connector.accept();

    let (client, mut notifications) = Client::open_with(connector, fast_config(Some(1)));
    wait_phase(&mut notifications, ConnectionPhase::ConnectedToBackend).await;

    client.set_volume(150).unwrap();
    assert_eq!(client.state().volume_percent, 100);

    let sent = backend.next_sent().await;
    assert_eq!(sent, serde_json::json!({"type": "volume", "data": {"level": 100}}));

    client.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_command_issued_on_connect_reaches_wire() {
    for _ in 0..10 {
        let connector = ScriptedConnector::default();
        let mut backend = connector.accept();

        let (client, mut notifications) = Client::open_with(connector, fast_config(Some(1)));
        wait_phase(&mut notifications, ConnectionPhase::ConnectedToBackend).await;

        client.play().unwrap();
        assert_eq!(backend.next_sent().await["type"], "play");

        client.close().await;
    }
}

#[tokio::test]
async fn test_invalid_address_never_reaches_wire() {
    let connector = ScriptedConnector::default();
    let mut backend = connector.accept();

    let (client, mut notifications) = Client::open_with(connector, fast_config(Some(1)));
    wait_phase(&mut notifications, ConnectionPhase::ConnectedToBackend).await;

    assert!(matches!(
        client.connect_device("   "),
        Err(ClientError::Session(_))
    ));
    client.stop().unwrap();

    // The first thing on the wire is the stop, not the rejected connect.
    let sent = backend.next_sent().await;
    assert_eq!(sent["type"], "stop");

    client.close().await;
}

#[tokio::test]
async fn test_malformed_frames_are_ignored() {
    let connector = ScriptedConnector::default();
    let backend = connector.accept();

    let (client, mut notifications) = Client::open_with(connector.clone(), fast_config(Some(1)));
    wait_phase(&mut notifications, ConnectionPhase::ConnectedToBackend).await;

    backend.push("not json at all");
    backend.push(r#"{"data":{"message":"no type"}}"#);
    backend.push(r#"{"type":"status","data":{"message":"Backend Ready"}}"#);

    let seen = collect_until(&mut notifications, |n| {
        matches!(n, Notification::State { snapshot, .. } if snapshot.status == "Backend Ready")
    })
    .await;

    assert!(
        !seen.iter().any(|n| matches!(n, Notification::Phase(_))),
        "malformed frames must not drop the link"
    );
    assert_eq!(connector.attempts(), 1);

    client.close().await;
}

#[tokio::test]
async fn test_close_closes_connection_and_ends_notifications() {
    let connector = ScriptedConnector::default();
    let mut backend = connector.accept();

    let (client, mut notifications) = Client::open_with(connector, fast_config(Some(1)));
    wait_phase(&mut notifications, ConnectionPhase::ConnectedToBackend).await;

    tokio::time::timeout(Duration::from_secs(2), client.close())
        .await
        .expect("close should finish promptly");
    backend.wait_closed().await;

    // Drain whatever is left; the channel must then report closed.
    let end = tokio::time::timeout(Duration::from_secs(2), async {
        while notifications.recv().await.is_some() {}
    })
    .await;
    assert!(end.is_ok(), "notification channel should close with the client");
}

// =========================================================================
// Notifications
// =========================================================================

#[tokio::test]
async fn test_loss_and_give_up_survive_full_notification_channel() {
    let connector = ScriptedConnector::default();
    let first = connector.accept();

    let config = fast_config(Some(1)).with_notification_capacity(8);
    let (client, mut notifications) = Client::open_with(connector.clone(), config);
    wait_phase(&mut notifications, ConnectionPhase::ConnectedToBackend).await;

    // Flood the channel while nobody drains it, then drop the link.
    for seq in 0..20 {
        first.push(&format!(r#"{{"type":"log","data":{{"message":"line {seq}"}}}}"#));
    }
    first.fail();

    // One refused retry, then the supervisor gives up and parks.
    tokio::time::timeout(Duration::from_secs(3), async {
        while connector.attempts() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timed out waiting for the retry");
    tokio::time::sleep(Duration::from_millis(150)).await;

    let seen: Vec<Notification> = std::iter::from_fn(|| notifications.try_recv()).collect();

    let last_phase = seen.iter().rev().find_map(|n| match n {
        Notification::Phase(phase) => Some(*phase),
        _ => None,
    });
    assert_eq!(last_phase, Some(ConnectionPhase::Disconnected));
    assert_eq!(seen.last(), Some(&Notification::ReconnectAbandoned { attempts: 1 }));

    let last_state = seen.iter().rev().find_map(|n| match n {
        Notification::State { snapshot, .. } => Some(snapshot.connection_phase),
        _ => None,
    });
    assert_eq!(last_state, Some(ConnectionPhase::Disconnected));
    assert_eq!(client.state().connection_phase, ConnectionPhase::Disconnected);

    client.close().await;
}
