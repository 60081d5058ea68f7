//! Realtime Connection Manager: owns the single push channel.
//!
//! LIFECYCLE
//! =========
//! ```text
//! Disconnected --connect()--> Connecting --handshake--> Connected
//! Connecting/Connected --transport error--> Error
//! Connected/Error --unexpected close, attempts < max--> Reconnecting
//! Reconnecting --timer fires--> Connecting
//! any --disconnect()--> Disconnected
//! attempts exhausted --> Disconnected
//! ```
//!
//! DESIGN
//! ======
//! Each `connect()` bumps a generation counter and spawns one pump task for
//! that generation. Events from a pump whose generation is no longer current
//! are ignored, so a manual `disconnect()` (which also bumps the generation)
//! always wins over a close event racing in behind it. Scheduled reconnects
//! are stored `JoinHandle`s, aborted by `disconnect()`.
//!
//! The manager follows the session store (`follow_session`): authenticated
//! and settled means connect, anonymous and settled means disconnect. Both
//! calls are idempotent.
//!
//! ERROR HANDLING
//! ==============
//! Malformed inbound frames and sends on a closed channel are dropped
//! silently. Transport failures only surface as state transitions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::channel::{ChannelEvent, PushChannel, PushConnector};
use super::message::{Inbound, parse_inbound, pong};
use crate::config::SessionConfig;
use crate::store::SessionStore;

const MESSAGE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
}

/// Mutable link bookkeeping, private to the manager.
#[derive(Default)]
struct Link {
    /// Bumped by every connect and disconnect; identifies the live pump.
    generation: u64,
    /// Identifies the live scheduled reconnect.
    schedule: u64,
    outbound: Option<mpsc::UnboundedSender<String>>,
    pump: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
    attempts: u32,
    /// Set by `disconnect()` so the next close does not schedule a reconnect.
    manual_close: bool,
}

struct ManagerInner {
    config: SessionConfig,
    connector: Arc<dyn PushConnector>,
    store: Arc<SessionStore>,
    state: watch::Sender<ConnectionState>,
    messages: broadcast::Sender<Value>,
    link: Mutex<Link>,
    /// Single-flight flag for server-requested credential renewal.
    refreshing: AtomicBool,
}

#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl ConnectionManager {
    #[must_use]
    pub fn new(config: SessionConfig, connector: Arc<dyn PushConnector>, store: Arc<SessionStore>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (messages, _) = broadcast::channel(MESSAGE_CAPACITY);
        Self {
            inner: Arc::new(ManagerInner {
                config,
                connector,
                store,
                state,
                messages,
                link: Mutex::new(Link::default()),
                refreshing: AtomicBool::new(false),
            }),
        }
    }

    // =========================================================================
    // READ ACCESS
    // =========================================================================

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Connection-state stream; the current state is replayed on the first
    /// `changed()`.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        let mut rx = self.inner.state.subscribe();
        rx.mark_changed();
        rx
    }

    /// Forwarded (non-control) push messages.
    #[must_use]
    pub fn messages(&self) -> broadcast::Receiver<Value> {
        self.inner.messages.subscribe()
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Open the channel. No-op while already connecting or connected.
    pub fn connect(&self) {
        let mut link = self.lock();
        let current = self.state();
        if matches!(current, ConnectionState::Connecting | ConnectionState::Connected) {
            debug!(state = ?current, "realtime: connect ignored");
            return;
        }

        if let Some(handle) = link.reconnect.take() {
            handle.abort();
        }
        if let Some(handle) = link.pump.take() {
            handle.abort();
        }
        link.outbound = None;
        link.manual_close = false;
        if current == ConnectionState::Disconnected {
            // Fresh start: a new backoff series, even after exhaustion.
            link.attempts = 0;
        }
        link.generation += 1;
        let generation = link.generation;

        self.set_state(ConnectionState::Connecting);
        let manager = self.clone();
        link.pump = Some(tokio::spawn(async move { manager.run_link(generation).await }));
    }

    /// Close the channel and cancel any pending reconnect. Always ends in
    /// `Disconnected`.
    pub fn disconnect(&self) {
        let mut link = self.lock();
        link.manual_close = true;
        link.generation += 1;
        link.schedule += 1;
        link.attempts = 0;
        if let Some(handle) = link.reconnect.take() {
            handle.abort();
        }
        if let Some(handle) = link.pump.take() {
            handle.abort();
        }
        if link.outbound.take().is_some() {
            info!("realtime: disconnected");
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Send a JSON frame. Returns `false` (and drops the frame) unless
    /// connected.
    pub fn send(&self, frame: &Value) -> bool {
        let link = self.lock();
        if self.state() != ConnectionState::Connected {
            debug!("realtime: send dropped, not connected");
            return false;
        }
        match &link.outbound {
            Some(tx) => tx.send(frame.to_string()).is_ok(),
            None => false,
        }
    }

    /// Drive connect/disconnect from the session store until the returned
    /// task is aborted.
    #[must_use]
    pub fn follow_session(&self) -> JoinHandle<()> {
        let mut rx = self.inner.store.subscribe();
        let manager = self.clone();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let session = rx.borrow_and_update().clone();
                if session.is_loading {
                    continue;
                }
                if session.is_authenticated {
                    manager.connect();
                } else {
                    manager.disconnect();
                }
            }
        })
    }

    // =========================================================================
    // PUMP
    // =========================================================================

    async fn run_link(&self, generation: u64) {
        let connection_id = Uuid::new_v4();
        let url = self.inner.config.ws_url.clone();

        let channel = match self.inner.connector.open(&url).await {
            Ok(channel) => channel,
            Err(e) => {
                warn!(%connection_id, error = %e, "realtime: open failed");
                if self.is_current(generation) {
                    self.set_state(ConnectionState::Error);
                }
                self.handle_close(generation);
                return;
            }
        };

        let PushChannel { outbound, mut events } = channel;
        {
            let mut link = self.lock();
            if link.generation != generation {
                return;
            }
            link.outbound = Some(outbound);
            link.attempts = 0;
            self.set_state(ConnectionState::Connected);
        }
        info!(%connection_id, %url, "realtime: connected");

        while let Some(event) = events.recv().await {
            if !self.is_current(generation) {
                return;
            }
            match event {
                ChannelEvent::Message(text) => self.handle_inbound(&text),
                ChannelEvent::Error(e) => {
                    warn!(%connection_id, error = %e, "realtime: transport error");
                    self.set_state(ConnectionState::Error);
                }
                ChannelEvent::Closed => break,
            }
        }

        info!(%connection_id, "realtime: channel closed");
        self.handle_close(generation);
    }

    fn handle_close(&self, generation: u64) {
        let mut link = self.lock();
        if link.generation != generation {
            return;
        }
        link.outbound = None;
        link.pump = None;
        if link.manual_close {
            return;
        }

        let max = self.inner.config.max_reconnect_attempts;
        if link.attempts >= max {
            warn!(attempts = link.attempts, "realtime: reconnect attempts exhausted");
            self.set_state(ConnectionState::Disconnected);
            return;
        }

        link.attempts += 1;
        let attempt = link.attempts;
        let delay = self.inner.config.reconnect_delay(attempt);
        info!(attempt, max, delay_ms = delay.as_millis(), "realtime: scheduling reconnect");
        self.set_state(ConnectionState::Reconnecting);
        self.schedule_reconnect(&mut link, delay);
    }

    fn schedule_reconnect(&self, link: &mut Link, delay: Duration) {
        if let Some(handle) = link.reconnect.take() {
            handle.abort();
        }
        link.schedule += 1;
        let token = link.schedule;
        let manager = self.clone();
        link.reconnect = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            manager.fire_reconnect(token);
        }));
    }

    fn fire_reconnect(&self, token: u64) {
        {
            let mut link = self.lock();
            if link.schedule != token {
                return;
            }
            // Detach rather than abort: this is the running task's own handle.
            link.reconnect = None;
        }
        if !self.inner.store.is_authenticated() {
            debug!("realtime: reconnect skipped, session ended");
            self.set_state(ConnectionState::Disconnected);
            return;
        }
        self.connect();
    }

    // =========================================================================
    // INBOUND
    // =========================================================================

    fn handle_inbound(&self, text: &str) {
        let Some(inbound) = parse_inbound(text) else {
            debug!(len = text.len(), "realtime: dropped malformed frame");
            return;
        };

        match inbound {
            Inbound::Ping { timestamp } => {
                self.send(&pong(&timestamp));
            }
            Inbound::RefreshRequired => self.refresh_credential(),
            Inbound::ServerShutdown { reconnect_in } => {
                info!(delay_ms = reconnect_in.as_millis(), "realtime: server shutting down");
                self.disconnect();
                let mut link = self.lock();
                self.schedule_reconnect(&mut link, reconnect_in);
            }
            Inbound::Forward(value) => {
                let _ = self.inner.messages.send(value);
            }
        }
    }

    /// Renew the credential, then reconnect so the next handshake carries it.
    fn refresh_credential(&self) {
        if self.inner.refreshing.swap(true, Ordering::SeqCst) {
            debug!("realtime: credential refresh already running");
            return;
        }

        let manager = self.clone();
        tokio::spawn(async move {
            info!("realtime: server requested credential renewal");
            manager.inner.store.refresh_user_state().await;
            manager.disconnect();
            tokio::time::sleep(manager.inner.config.refresh_reconnect_delay).await;
            if manager.inner.store.is_authenticated() {
                manager.connect();
            }
            manager.inner.refreshing.store(false, Ordering::SeqCst);
        });
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    fn lock(&self) -> MutexGuard<'_, Link> {
        self.inner.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    fn set_state(&self, next: ConnectionState) {
        let mut previous = next;
        let changed = self.inner.state.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                previous = *state;
                *state = next;
                true
            }
        });
        if changed {
            debug!(from = ?previous, to = ?next, "realtime: state");
        }
    }
}

#[cfg(test)]
#[path = "manager_test.rs"]
mod tests;
