use super::*;
use crate::api::test_helpers::MockAuthApi;
use crate::error::ApiError;
use crate::types::test_helpers::user;
use serde_json::json;
use std::sync::atomic::AtomicUsize;
use tokio::time::timeout;

// =============================================================================
// FAKE TRANSPORT
// =============================================================================

/// The server side of one fake channel.
struct RemoteEnd {
    /// Frames the manager sent.
    inbound: mpsc::UnboundedReceiver<String>,
    /// Events to deliver to the manager.
    events: mpsc::UnboundedSender<ChannelEvent>,
}

impl RemoteEnd {
    fn push(&self, frame: &Value) {
        let _ = self.events.send(ChannelEvent::Message(frame.to_string()));
    }

    fn close(&self) {
        let _ = self.events.send(ChannelEvent::Closed);
    }
}

struct MockConnector {
    opens: AtomicUsize,
    fail: AtomicBool,
    open_delay: Duration,
    remotes: mpsc::UnboundedSender<RemoteEnd>,
}

impl MockConnector {
    fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PushConnector for MockConnector {
    async fn open(&self, _url: &str) -> Result<PushChannel, ApiError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ApiError::Transport("refused".into()));
        }
        let (outbound, inbound) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let _ = self.remotes.send(RemoteEnd { inbound, events: events_tx });
        Ok(PushChannel { outbound, events })
    }
}

struct Harness {
    manager: ConnectionManager,
    connector: Arc<MockConnector>,
    remotes: mpsc::UnboundedReceiver<RemoteEnd>,
    store: Arc<SessionStore>,
    api: Arc<MockAuthApi>,
}

struct Options {
    reconnect_base: Duration,
    max_attempts: u32,
    open_delay: Duration,
    api: MockAuthApi,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            reconnect_base: Duration::from_millis(100),
            max_attempts: 5,
            open_delay: Duration::ZERO,
            api: MockAuthApi::renewing_to(Ok(Some(user("u1", &[])))),
        }
    }
}

fn harness(opts: Options) -> Harness {
    let mut config = SessionConfig::for_base_url("http://127.0.0.1:9").unwrap();
    config.reconnect_base = opts.reconnect_base;
    config.max_reconnect_attempts = opts.max_attempts;
    config.refresh_reconnect_delay = Duration::from_millis(20);

    let (remotes_tx, remotes) = mpsc::unbounded_channel();
    let connector = Arc::new(MockConnector {
        opens: AtomicUsize::new(0),
        fail: AtomicBool::new(false),
        open_delay: opts.open_delay,
        remotes: remotes_tx,
    });
    let api = Arc::new(opts.api);
    let store = Arc::new(SessionStore::new(api.clone()));
    store.set_authenticated(user("u1", &[]));
    let manager = ConnectionManager::new(config, connector.clone(), store.clone());
    Harness { manager, connector, remotes, store, api }
}

async fn wait_state(manager: &ConnectionManager, want: ConnectionState) {
    let mut rx = manager.subscribe_state();
    timeout(Duration::from_secs(2), rx.wait_for(|s| *s == want))
        .await
        .unwrap_or_else(|_| panic!("never reached {want:?}, stuck at {:?}", manager.state()))
        .unwrap();
}

async fn next_remote(remotes: &mut mpsc::UnboundedReceiver<RemoteEnd>) -> RemoteEnd {
    timeout(Duration::from_secs(2), remotes.recv())
        .await
        .expect("channel opened within 2s")
        .unwrap()
}

async fn connected(h: &mut Harness) -> RemoteEnd {
    h.manager.connect();
    let remote = next_remote(&mut h.remotes).await;
    wait_state(&h.manager, ConnectionState::Connected).await;
    remote
}

// =============================================================================
// LIFECYCLE
// =============================================================================

#[tokio::test]
async fn starts_disconnected() {
    let h = harness(Options::default());
    assert_eq!(h.manager.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn connect_is_idempotent() {
    let mut h = harness(Options::default());
    h.manager.connect();
    h.manager.connect();
    let _remote = next_remote(&mut h.remotes).await;
    wait_state(&h.manager, ConnectionState::Connected).await;
    h.manager.connect();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.connector.opens(), 1);
}

#[tokio::test]
async fn transport_error_sets_error_state() {
    let mut h = harness(Options::default());
    let remote = connected(&mut h).await;
    let _ = remote.events.send(ChannelEvent::Error("reset".into()));
    wait_state(&h.manager, ConnectionState::Error).await;
}

#[tokio::test]
async fn unexpected_close_reconnects_and_resets_attempts() {
    let mut h = harness(Options::default());
    let remote = connected(&mut h).await;

    remote.close();
    wait_state(&h.manager, ConnectionState::Reconnecting).await;
    assert_eq!(h.manager.lock().attempts, 1);

    let _second = next_remote(&mut h.remotes).await;
    wait_state(&h.manager, ConnectionState::Connected).await;
    assert_eq!(h.connector.opens(), 2);
    assert_eq!(h.manager.lock().attempts, 0);
}

#[tokio::test]
async fn manual_disconnect_suppresses_reconnect() {
    let mut h = harness(Options { reconnect_base: Duration::from_millis(10), ..Options::default() });
    let remote = connected(&mut h).await;

    h.manager.disconnect();
    remote.close();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(h.manager.state(), ConnectionState::Disconnected);
    assert_eq!(h.connector.opens(), 1);
}

#[tokio::test]
async fn disconnect_cancels_pending_reconnect() {
    let mut h = harness(Options { reconnect_base: Duration::from_millis(80), ..Options::default() });
    let remote = connected(&mut h).await;

    remote.close();
    wait_state(&h.manager, ConnectionState::Reconnecting).await;
    h.manager.disconnect();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(h.manager.state(), ConnectionState::Disconnected);
    assert_eq!(h.connector.opens(), 1);
}

#[tokio::test]
async fn exhausted_attempts_settle_disconnected() {
    let h = harness(Options {
        reconnect_base: Duration::from_millis(10),
        max_attempts: 2,
        ..Options::default()
    });
    h.connector.fail.store(true, Ordering::SeqCst);

    h.manager.connect();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(h.connector.opens(), 3, "initial open plus two retries");
    assert_eq!(h.manager.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn connect_after_exhaustion_starts_a_fresh_backoff_series() {
    let h = harness(Options {
        reconnect_base: Duration::from_millis(10),
        max_attempts: 2,
        ..Options::default()
    });
    h.connector.fail.store(true, Ordering::SeqCst);

    h.manager.connect();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(h.manager.state(), ConnectionState::Disconnected);

    h.manager.connect();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(h.connector.opens(), 6, "each connect gets the full retry series");
    assert_eq!(h.manager.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn reconnect_skipped_once_session_ends() {
    let mut h = harness(Options::default());
    let remote = connected(&mut h).await;

    remote.close();
    wait_state(&h.manager, ConnectionState::Reconnecting).await;
    h.store.set_logged_out();
    tokio::time::sleep(Duration::from_millis(250)).await;

    assert_eq!(h.connector.opens(), 1);
    assert_eq!(h.manager.state(), ConnectionState::Disconnected);
}

// =============================================================================
// OUTBOUND
// =============================================================================

#[tokio::test]
async fn send_while_disconnected_is_dropped() {
    let h = harness(Options::default());
    assert!(!h.manager.send(&json!({ "type": "note" })));
}

#[tokio::test]
async fn send_while_connected_reaches_server() {
    let mut h = harness(Options::default());
    let mut remote = connected(&mut h).await;

    assert!(h.manager.send(&json!({ "type": "note", "n": 3 })));
    let frame = timeout(Duration::from_secs(1), remote.inbound.recv()).await.unwrap().unwrap();
    assert_eq!(serde_json::from_str::<Value>(&frame).unwrap(), json!({ "type": "note", "n": 3 }));
}

// =============================================================================
// INBOUND
// =============================================================================

#[tokio::test]
async fn ping_is_answered_with_pong() {
    let mut h = harness(Options::default());
    let mut remote = connected(&mut h).await;

    remote.push(&json!({ "type": "ping", "timestamp": 1_700_000_000_000_u64 }));
    let frame = timeout(Duration::from_secs(1), remote.inbound.recv()).await.unwrap().unwrap();
    assert_eq!(
        serde_json::from_str::<Value>(&frame).unwrap(),
        json!({ "type": "pong", "timestamp": 1_700_000_000_000_u64 })
    );
}

#[tokio::test]
async fn application_messages_are_forwarded() {
    let mut h = harness(Options::default());
    let remote = connected(&mut h).await;
    let mut messages = h.manager.messages();

    let update = json!({ "type": "project_update", "id": 9 });
    remote.push(&update);
    let got = timeout(Duration::from_secs(1), messages.recv()).await.unwrap().unwrap();
    assert_eq!(got, update);
}

#[tokio::test]
async fn malformed_frames_are_dropped() {
    let mut h = harness(Options::default());
    let remote = connected(&mut h).await;
    let mut messages = h.manager.messages();

    let _ = remote.events.send(ChannelEvent::Message("not json".into()));
    remote.push(&json!({ "no": "type" }));
    remote.push(&json!([1, 2]));
    remote.push(&json!({ "type": "news" }));

    let got = timeout(Duration::from_secs(1), messages.recv()).await.unwrap().unwrap();
    assert_eq!(got, json!({ "type": "news" }));
    assert_eq!(h.manager.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn server_shutdown_reconnects_after_given_delay() {
    let mut h = harness(Options::default());
    let remote = connected(&mut h).await;

    remote.push(&json!({ "type": "server_shutdown", "reconnect_in": 0.05 }));
    wait_state(&h.manager, ConnectionState::Disconnected).await;

    let _second = next_remote(&mut h.remotes).await;
    wait_state(&h.manager, ConnectionState::Connected).await;
    assert_eq!(h.connector.opens(), 2);
}

#[tokio::test]
async fn oversized_shutdown_delay_falls_back_to_default() {
    let mut h = harness(Options::default());
    let remote = connected(&mut h).await;

    remote.push(&json!({ "type": "server_shutdown", "reconnect_in": 1e300 }));
    wait_state(&h.manager, ConnectionState::Disconnected).await;

    assert!(h.manager.lock().reconnect.is_some(), "reconnect scheduled with the default delay");
}

#[tokio::test]
async fn refresh_request_renews_once_and_reconnects() {
    let mut h = harness(Options {
        api: MockAuthApi::renewing_to(Ok(Some(user("u1", &["admin"])))).with_delay(Duration::from_millis(50)),
        ..Options::default()
    });
    let remote = connected(&mut h).await;

    remote.push(&json!({ "type": "token_refresh_required" }));
    remote.push(&json!({ "type": "token_refresh_required" }));

    let _second = next_remote(&mut h.remotes).await;
    wait_state(&h.manager, ConnectionState::Connected).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(h.api.renew_count(), 1);
    assert_eq!(h.connector.opens(), 2);
    assert_eq!(h.store.current().user.map(|u| u.roles), Some(vec!["admin".to_owned()]));
    assert!(!h.manager.inner.refreshing.load(Ordering::SeqCst));
}

#[tokio::test]
async fn failed_refresh_leaves_channel_closed() {
    let mut h = harness(Options { api: MockAuthApi::anonymous(), ..Options::default() });
    let remote = connected(&mut h).await;

    remote.push(&json!({ "type": "token_refresh_required" }));
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(!h.store.is_authenticated());
    assert_eq!(h.manager.state(), ConnectionState::Disconnected);
    assert_eq!(h.connector.opens(), 1);
}

// =============================================================================
// SESSION FOLLOWING
// =============================================================================

#[tokio::test]
async fn follows_session_transitions() {
    let mut h = harness(Options { open_delay: Duration::from_millis(30), ..Options::default() });
    h.store.set_logged_out();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = {
        let seen = seen.clone();
        let mut rx = h.manager.subscribe_state();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let state = *rx.borrow_and_update();
                seen.lock().unwrap().push(state);
            }
        })
    };
    let follower = h.manager.follow_session();
    tokio::time::sleep(Duration::from_millis(20)).await;

    h.store.set_authenticated(user("u1", &[]));
    let _remote = next_remote(&mut h.remotes).await;
    wait_state(&h.manager, ConnectionState::Connected).await;

    h.store.set_logged_out();
    wait_state(&h.manager, ConnectionState::Disconnected).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    follower.abort();
    recorder.abort();
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnected,
        ]
    );
}

#[tokio::test]
async fn loading_snapshots_do_not_toggle_the_channel() {
    let h = harness(Options::default());
    let follower = h.manager.follow_session();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let opens = h.connector.opens();

    // refresh_user_state passes through a loading snapshot on its way back.
    h.store.refresh_user_state().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    follower.abort();
    assert_eq!(h.connector.opens(), opens);
    assert_eq!(h.manager.state(), ConnectionState::Connected);
}
