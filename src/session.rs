//! Explicit wiring of the session core.
//!
//! ARCHITECTURE
//! ============
//! ```text
//! Session
//!   ├── SessionStore         (who is logged in)
//!   ├── RenewalCoordinator   (401 → renew once → retry)
//!   ├── ConnectionManager    (push channel, follows the store)
//!   └── Guards               (route gates)
//! ```
//!
//! One `Session` per process. Every component is constructed here and shared
//! by `Arc`; nothing is global.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::api::{ApiRequest, ApiResponse, AuthApi, HttpTransport};
use crate::config::SessionConfig;
use crate::error::ApiError;
use crate::guards::Guards;
use crate::navigation::Navigator;
use crate::realtime::{ConnectionManager, PushConnector};
use crate::renewal::RenewalCoordinator;
use crate::store::SessionStore;
use crate::types::{LoginRequest, RegisterRequest, UserProfile};

pub struct Session {
    api: Arc<dyn AuthApi>,
    store: Arc<SessionStore>,
    coordinator: Arc<RenewalCoordinator>,
    connection: ConnectionManager,
    guards: Guards,
    follower: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    #[must_use]
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn HttpTransport>,
        api: Arc<dyn AuthApi>,
        connector: Arc<dyn PushConnector>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let store = Arc::new(SessionStore::new(api.clone()));
        let coordinator =
            Arc::new(RenewalCoordinator::new(transport, api.clone(), store.clone(), navigator));
        let guards = Guards::new(store.clone(), coordinator.clone(), &config);
        let connection = ConnectionManager::new(config, connector, store.clone());
        Self { api, store, coordinator, connection, guards, follower: Mutex::new(None) }
    }

    /// Restore any existing session and start the push channel follower.
    /// Returns once the bootstrap has settled.
    pub async fn start(&self) {
        {
            let mut follower = self.follower.lock().unwrap_or_else(PoisonError::into_inner);
            if follower.is_none() {
                *follower = Some(self.connection.follow_session());
            }
        }
        self.store.initialize().await;
        info!(authenticated = self.store.is_authenticated(), "session: started");
    }

    /// # Errors
    ///
    /// Returns the backend's error; the store is left untouched.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, ApiError> {
        let request = LoginRequest { email: email.to_owned(), password: password.to_owned() };
        let user = self.api.login(&request).await?;
        info!(user_id = %user.id, "session: logged in");
        self.store.set_authenticated(user.clone());
        Ok(user)
    }

    /// Register an account. Authenticates when the backend returns a user
    /// (accounts needing email verification come back without one).
    ///
    /// # Errors
    ///
    /// Returns the backend's error.
    pub async fn register(&self, request: &RegisterRequest) -> Result<Option<UserProfile>, ApiError> {
        let user = self.api.register(request).await?;
        match &user {
            Some(user) => {
                info!(user_id = %user.id, "session: registered");
                self.store.set_authenticated(user.clone());
            }
            None => info!("session: registered, verification pending"),
        }
        Ok(user)
    }

    /// End the session. The backend call is best-effort; the local session
    /// always ends.
    pub async fn logout(&self) {
        if let Err(e) = self.api.logout().await {
            warn!(error = %e, "session: backend logout failed");
        }
        self.store.set_logged_out();
        info!("session: logged out");
    }

    /// Issue an application call with transparent credential renewal.
    ///
    /// # Errors
    ///
    /// See [`RenewalCoordinator::send`].
    pub async fn request(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        self.coordinator.send(request).await
    }

    /// Stop following the session and close the push channel.
    pub fn shutdown(&self) {
        if let Some(handle) = self.follower.lock().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
        self.connection.disconnect();
    }

    #[must_use]
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    #[must_use]
    pub fn coordinator(&self) -> &Arc<RenewalCoordinator> {
        &self.coordinator
    }

    #[must_use]
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    #[must_use]
    pub fn guards(&self) -> &Guards {
        &self.guards
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
