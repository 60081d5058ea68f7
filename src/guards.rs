//! Access Guards: route gates evaluated before a protected view is entered.
//!
//! DESIGN
//! ======
//! Every guard first waits, bounded by `guard_wait`, for the store to leave
//! the loading state, then evaluates its rule against the settled snapshot.
//! A guard that times out proceeds with whatever state is current.
//!
//! ERROR HANDLING
//! ==============
//! Guards never fail. They resolve to [`GuardOutcome::Allow`] or a
//! [`GuardOutcome::Redirect`] the navigation layer follows instead of the
//! requested view.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::navigation::Redirect;
use crate::renewal::RenewalCoordinator;
use crate::store::SessionStore;
use crate::types::SessionState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    Allow,
    Redirect(Redirect),
}

impl GuardOutcome {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

pub struct Guards {
    store: Arc<SessionStore>,
    coordinator: Arc<RenewalCoordinator>,
    guard_wait: Duration,
    guest_renew_timeout: Duration,
}

impl Guards {
    #[must_use]
    pub fn new(store: Arc<SessionStore>, coordinator: Arc<RenewalCoordinator>, config: &SessionConfig) -> Self {
        Self {
            store,
            coordinator,
            guard_wait: config.guard_wait,
            guest_renew_timeout: config.guest_renew_timeout,
        }
    }

    /// Must be authenticated.
    pub async fn auth_guard(&self, path: &str) -> GuardOutcome {
        let state = self.settled().await;
        if state.is_authenticated {
            return GuardOutcome::Allow;
        }
        deny(path, sign_in(path))
    }

    /// Must be authenticated and hold at least one of `roles`.
    pub async fn role_guard(&self, path: &str, roles: &[&str]) -> GuardOutcome {
        let state = self.settled().await;
        match &state.user {
            Some(user) if state.is_authenticated => {
                if user.has_any_role(roles) {
                    GuardOutcome::Allow
                } else {
                    deny(path, Redirect::Home)
                }
            }
            _ => deny(path, sign_in(path)),
        }
    }

    /// Must be authenticated with a verified email address.
    pub async fn verified_guard(&self, path: &str) -> GuardOutcome {
        let state = self.settled().await;
        match &state.user {
            Some(user) if state.is_authenticated => {
                if user.email_verified {
                    GuardOutcome::Allow
                } else {
                    deny(path, Redirect::VerificationPending { email: Some(user.email.clone()) })
                }
            }
            _ => deny(path, sign_in(path)),
        }
    }

    /// Must be anonymous. A logged-out store gets one bounded silent renewal
    /// first, in case the cookie is still valid.
    pub async fn guest_guard(&self, path: &str) -> GuardOutcome {
        let state = self.settled().await;
        if state.is_authenticated {
            return deny(path, Redirect::Home);
        }
        if state.is_loading {
            return GuardOutcome::Allow;
        }

        // The renewal runs detached: the timeout bounds this guard's wait,
        // never the shared renewal other callers may be parked behind.
        let coordinator = Arc::clone(&self.coordinator);
        let renewal = tokio::spawn(async move { coordinator.renew_silently().await });

        match tokio::time::timeout(self.guest_renew_timeout, renewal).await {
            Ok(Ok(Some(user))) => {
                info!(user_id = %user.id, %path, "guard: session recovered, leaving guest view");
                GuardOutcome::Redirect(Redirect::Home)
            }
            Ok(Ok(None)) => GuardOutcome::Allow,
            Ok(Err(e)) => {
                warn!(%path, error = %e, "guard: silent renewal task failed");
                GuardOutcome::Allow
            }
            Err(_) => {
                debug!(%path, "guard: silent renewal still running, allowing entry");
                GuardOutcome::Allow
            }
        }
    }

    async fn settled(&self) -> SessionState {
        self.store.settled(self.guard_wait).await
    }
}

fn sign_in(path: &str) -> Redirect {
    Redirect::SignIn { return_to: Some(path.to_owned()) }
}

fn deny(path: &str, redirect: Redirect) -> GuardOutcome {
    debug!(%path, target = %redirect, "guard: denied");
    GuardOutcome::Redirect(redirect)
}

#[cfg(test)]
#[path = "guards_test.rs"]
mod tests;
