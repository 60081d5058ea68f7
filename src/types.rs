//! Shared session types: the user profile and the session snapshot.
//!
//! DESIGN
//! ======
//! `SessionState` is a value object. The store replaces it wholesale on every
//! change; consumers only ever see immutable snapshots.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

// =============================================================================
// USER PROFILE
// =============================================================================

/// Profile of the authenticated user as returned by the auth endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub enabled: bool,
    pub email_verified: bool,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default)]
    pub notifications_enabled: bool,
}

impl UserProfile {
    /// True when the user holds at least one of `required` (case-insensitive).
    #[must_use]
    pub fn has_any_role(&self, required: &[&str]) -> bool {
        self.roles
            .iter()
            .any(|role| required.iter().any(|r| role.eq_ignore_ascii_case(r)))
    }

    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_owned()
    }
}

// =============================================================================
// SESSION STATE
// =============================================================================

/// Snapshot of who is logged in.
///
/// `is_authenticated` implies `user.is_some()`; the constructors below are the
/// only way the store builds snapshots, so the invariant holds by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub is_authenticated: bool,
    pub user: Option<UserProfile>,
    pub is_loading: bool,
}

impl SessionState {
    /// Shape at process start, before the bootstrap restoration resolves.
    #[must_use]
    pub fn initial() -> Self {
        Self { is_authenticated: false, user: None, is_loading: true }
    }

    #[must_use]
    pub fn authenticated(user: UserProfile) -> Self {
        Self { is_authenticated: true, user: Some(user), is_loading: false }
    }

    #[must_use]
    pub fn logged_out() -> Self {
        Self { is_authenticated: false, user: None, is_loading: false }
    }

    /// Copy of `self` with `is_loading` set, used for explicit re-checks.
    #[must_use]
    pub fn loading(&self) -> Self {
        Self { is_loading: true, ..self.clone() }
    }

    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.email.as_str())
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::initial()
    }
}

// =============================================================================
// WIRE PAYLOADS
// =============================================================================

/// Body of `POST /api/auth/refresh`, `/login` and `/register`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub user: Option<UserProfile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
