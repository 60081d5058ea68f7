//! Session State Store: the single source of truth for who is logged in.
//!
//! DESIGN
//! ======
//! The current `SessionState` lives in a `tokio::sync::watch` channel, which is
//! a cached-last-value wrapper around publish/subscribe: every subscriber can
//! read the latest snapshot, and `subscribe()` marks it unseen so a late
//! subscriber's first `changed()` replays it.
//!
//! The store is constructed explicitly and shared by `Arc`; each test builds
//! its own instance.
//!
//! ERROR HANDLING
//! ==============
//! Bootstrap and `refresh_user_state` swallow backend failures and always
//! settle in a defined state with `is_loading == false`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::AuthApi;
use crate::types::{SessionState, UserProfile};

pub struct SessionStore {
    state: watch::Sender<SessionState>,
    api: Arc<dyn AuthApi>,
    /// Latch for the one bootstrap restoration per process.
    initialized: AtomicBool,
}

impl SessionStore {
    #[must_use]
    pub fn new(api: Arc<dyn AuthApi>) -> Self {
        let (state, _) = watch::channel(SessionState::initial());
        Self { state, api, initialized: AtomicBool::new(false) }
    }

    /// Attempt to restore a session from the cookie credential.
    ///
    /// Runs at most once; later calls return immediately without touching
    /// the network.
    pub async fn initialize(&self) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            debug!("session: initialize already ran");
            return;
        }

        self.replace(SessionState::initial());
        match self.api.renew_credential().await {
            Ok(Some(user)) => {
                info!(user_id = %user.id, "session: restored");
                self.set_authenticated(user);
            }
            Ok(None) => {
                debug!("session: no session to restore");
                self.set_logged_out();
            }
            Err(e) => {
                warn!(error = %e, "session: restore failed");
                self.set_logged_out();
            }
        }
    }

    pub fn set_authenticated(&self, user: UserProfile) {
        self.replace(SessionState::authenticated(user));
    }

    pub fn set_logged_out(&self) {
        self.replace(SessionState::logged_out());
    }

    /// Pull fresh user data for the current session.
    ///
    /// No-op unless authenticated. Logs out on any failure rather than keep
    /// stale data.
    pub async fn refresh_user_state(&self) {
        let current = self.current();
        if !current.is_authenticated {
            return;
        }

        self.replace(current.loading());
        match self.api.renew_credential().await {
            Ok(Some(user)) => {
                debug!(user_id = %user.id, "session: user state refreshed");
                self.set_authenticated(user);
            }
            Ok(None) => {
                debug!("session: refresh found no session");
                self.set_logged_out();
            }
            Err(e) => {
                warn!(error = %e, "session: refresh failed");
                self.set_logged_out();
            }
        }
    }

    #[must_use]
    pub fn current(&self) -> SessionState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated
    }

    /// Subscribe to state changes. The current snapshot is replayed: the
    /// first `changed().await` on the returned receiver resolves immediately.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        let mut rx = self.state.subscribe();
        rx.mark_changed();
        rx
    }

    /// Current state once loading has finished, or after `limit` elapses,
    /// whichever comes first. Never blocks past `limit`.
    pub async fn settled(&self, limit: Duration) -> SessionState {
        let mut rx = self.state.subscribe();
        let wait = async { rx.wait_for(|s| !s.is_loading).await.map(|s| s.clone()) };
        match tokio::time::timeout(limit, wait).await {
            Ok(Ok(state)) => state,
            Ok(Err(_)) => self.current(),
            Err(_) => {
                warn!(limit_ms = limit.as_millis(), "session: still loading, proceeding with current state");
                self.current()
            }
        }
    }

    fn replace(&self, next: SessionState) {
        self.state.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
