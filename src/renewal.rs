//! Credential Renewal Coordinator: makes expired-credential failures
//! invisible to callers.
//!
//! DESIGN
//! ======
//! Every application call goes through [`RenewalCoordinator::send`]. When one
//! fails with 401, the coordinator renews the credential once and retries.
//! Calls that fail while a renewal is already running are parked in a FIFO
//! queue and re-issued, in the order they failed, once the renewal succeeds.
//! If it fails, every parked call fails with [`ApiError::SessionExpired`]
//! without a second renewal.
//!
//! INVARIANTS
//! ==========
//! - `RenewalQueue::in_flight` is true for exactly as long as one renewal call
//!   is outstanding. It is set under the queue lock by the caller that becomes
//!   the leader and cleared by that leader, including when the leader's future
//!   is dropped (see `InFlight`).
//! - `RenewalQueue::pending` is empty whenever `in_flight` is false.
//! - The queue lock is never held across an `.await`.
//!
//! The guest guard's best-effort renewal joins the same single flight through
//! [`RenewalCoordinator::renew_silently`], so the two call sites never race.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::{ApiRequest, ApiResponse, AuthApi, HttpTransport};
use crate::config::SessionConfig;
use crate::error::ApiError;
use crate::navigation::{Navigator, Redirect};
use crate::store::SessionStore;
use crate::types::UserProfile;

const SIGNAL_CAPACITY: usize = 16;

/// Outcome broadcast after every renewal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalSignal {
    Succeeded(UserProfile),
    Failed,
}

/// What started a renewal. Decides the failure policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RenewalTrigger {
    /// An application call hit 401: failure logs out and redirects to sign-in.
    Request,
    /// Best-effort check (guest guard): failure only broadcasts.
    Silent,
}

/// A caller parked behind the in-flight renewal.
enum Waiter {
    /// A failed call to re-issue on success.
    Request { request: ApiRequest, reply: oneshot::Sender<Result<ApiResponse, ApiError>> },
    /// A silent renewal that only wants the outcome.
    Outcome { reply: oneshot::Sender<Option<UserProfile>> },
}

impl Waiter {
    fn is_request(&self) -> bool {
        matches!(self, Self::Request { .. })
    }

    fn abort(self) {
        match self {
            Self::Request { reply, .. } => {
                let _ = reply.send(Err(ApiError::RenewalAborted));
            }
            Self::Outcome { reply } => {
                let _ = reply.send(None);
            }
        }
    }
}

#[derive(Default)]
struct RenewalQueue {
    in_flight: bool,
    pending: VecDeque<Waiter>,
}

enum Ticket<T> {
    Leader,
    Queued(oneshot::Receiver<T>),
}

/// Leadership of the in-flight renewal. Dropping it without `release`
/// (the leader's future was cancelled) clears the flag and aborts waiters.
struct InFlight<'a> {
    queue: &'a Mutex<RenewalQueue>,
    armed: bool,
}

impl InFlight<'_> {
    fn release(mut self) -> Vec<Waiter> {
        self.armed = false;
        take_pending(self.queue)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("renewal: leader dropped before completing");
            for waiter in take_pending(self.queue) {
                waiter.abort();
            }
        }
    }
}

fn lock_queue(queue: &Mutex<RenewalQueue>) -> MutexGuard<'_, RenewalQueue> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

fn take_pending(queue: &Mutex<RenewalQueue>) -> Vec<Waiter> {
    let mut q = lock_queue(queue);
    q.in_flight = false;
    q.pending.drain(..).collect()
}

pub struct RenewalCoordinator {
    transport: Arc<dyn HttpTransport>,
    api: Arc<dyn AuthApi>,
    store: Arc<SessionStore>,
    navigator: Arc<dyn Navigator>,
    queue: Mutex<RenewalQueue>,
    signals: broadcast::Sender<RenewalSignal>,
}

impl RenewalCoordinator {
    #[must_use]
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        api: Arc<dyn AuthApi>,
        store: Arc<SessionStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self { transport, api, store, navigator, queue: Mutex::new(RenewalQueue::default()), signals }
    }

    #[must_use]
    pub fn signals(&self) -> broadcast::Receiver<RenewalSignal> {
        self.signals.subscribe()
    }

    /// Issue an application call, renewing the credential on 401.
    ///
    /// # Errors
    ///
    /// Returns the transport's error for non-auth failures,
    /// [`ApiError::SessionExpired`] when renewal fails or the retried call is
    /// still unauthorized, and [`ApiError::EmailNotVerified`] for the
    /// verification-required 403.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        if SessionConfig::bypasses_renewal(&request.path) {
            return self.transport.send(&request).await;
        }

        match self.transport.send(&request).await {
            Err(e) if e.is_email_not_verified() => {
                self.end_unverified();
                Err(ApiError::EmailNotVerified)
            }
            Err(ApiError::Unauthorized) => self.renew_and_retry(request).await,
            other => other,
        }
    }

    /// Best-effort renewal that joins any in-flight renewal. Failure is
    /// silent: no logout, no redirect.
    pub async fn renew_silently(&self) -> Option<UserProfile> {
        let ticket = {
            let mut q = lock_queue(&self.queue);
            if q.in_flight {
                let (reply, rx) = oneshot::channel();
                q.pending.push_back(Waiter::Outcome { reply });
                Ticket::Queued(rx)
            } else {
                q.in_flight = true;
                Ticket::Leader
            }
        };

        match ticket {
            Ticket::Queued(rx) => rx.await.unwrap_or(None),
            Ticket::Leader => {
                let (user, waiters) = self.lead(RenewalTrigger::Silent).await;
                self.settle(user.as_ref(), waiters).await;
                user
            }
        }
    }

    async fn renew_and_retry(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let ticket = {
            let mut q = lock_queue(&self.queue);
            if q.in_flight {
                let (reply, rx) = oneshot::channel();
                debug!(path = %request.path, queued = q.pending.len() + 1, "renewal: parked behind in-flight renewal");
                q.pending.push_back(Waiter::Request { request: request.clone(), reply });
                Ticket::Queued(rx)
            } else {
                q.in_flight = true;
                Ticket::Leader
            }
        };

        match ticket {
            Ticket::Queued(rx) => rx.await.unwrap_or(Err(ApiError::RenewalAborted)),
            Ticket::Leader => {
                let (user, waiters) = self.lead(RenewalTrigger::Request).await;
                if user.is_none() {
                    self.settle(None, waiters).await;
                    return Err(ApiError::SessionExpired);
                }
                // The leader failed first, so its retry starts first.
                let (own, ()) = futures::join!(self.retry(&request), self.settle(user.as_ref(), waiters));
                own
            }
        }
    }

    /// Perform the renewal call as leader and apply its outcome to the store.
    /// Returns the renewed user (if any) and the waiters parked meanwhile.
    async fn lead(&self, trigger: RenewalTrigger) -> (Option<UserProfile>, Vec<Waiter>) {
        let leadership = InFlight { queue: &self.queue, armed: true };
        let renewal_id = Uuid::new_v4();
        debug!(%renewal_id, ?trigger, "renewal: started");

        let result = self.api.renew_credential().await;

        match result {
            Ok(Some(user)) => {
                self.store.set_authenticated(user.clone());
                let waiters = leadership.release();
                info!(%renewal_id, user_id = %user.id, parked = waiters.len(), "renewal: succeeded");
                let _ = self.signals.send(RenewalSignal::Succeeded(user.clone()));
                (Some(user), waiters)
            }
            failed => {
                let waiters = leadership.release();
                match &failed {
                    Err(e) => warn!(%renewal_id, error = %e, parked = waiters.len(), "renewal: failed"),
                    _ => debug!(%renewal_id, parked = waiters.len(), "renewal: no valid session"),
                }
                let _ = self.signals.send(RenewalSignal::Failed);
                if trigger == RenewalTrigger::Request || waiters.iter().any(Waiter::is_request) {
                    self.end_session();
                }
                (None, waiters)
            }
        }
    }

    /// Resume parked waiters in arrival order.
    async fn settle(&self, user: Option<&UserProfile>, waiters: Vec<Waiter>) {
        let mut replays = Vec::new();
        for waiter in waiters {
            match (waiter, user) {
                (Waiter::Outcome { reply }, _) => {
                    let _ = reply.send(user.cloned());
                }
                (Waiter::Request { reply, .. }, None) => {
                    let _ = reply.send(Err(ApiError::SessionExpired));
                }
                (Waiter::Request { request, reply }, Some(_)) => replays.push((request, reply)),
            }
        }

        // join_all polls in order, so re-issues start in FIFO order.
        join_all(replays.into_iter().map(|(request, reply)| async move {
            let result = self.retry(&request).await;
            let _ = reply.send(result);
        }))
        .await;
    }

    /// Re-issue a call after a successful renewal. Never renews again.
    async fn retry(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        match self.transport.send(request).await {
            Err(ApiError::Unauthorized) => {
                warn!(path = %request.path, "renewal: retried call still unauthorized");
                Err(ApiError::SessionExpired)
            }
            Err(e) if e.is_email_not_verified() => {
                self.end_unverified();
                Err(ApiError::EmailNotVerified)
            }
            other => other,
        }
    }

    fn end_session(&self) {
        self.store.set_logged_out();
        let current = self.navigator.current_path();
        let return_to = (current != "/" && !current.starts_with("/login")).then_some(current);
        self.navigator.navigate(Redirect::SignIn { return_to });
    }

    fn end_unverified(&self) {
        let email = self.store.current().email().map(str::to_owned);
        info!("renewal: email not verified, ending session");
        self.store.set_logged_out();
        self.navigator.navigate(Redirect::VerificationPending { email });
    }
}

#[cfg(test)]
#[path = "renewal_test.rs"]
mod tests;
