//! Navigation seam: where the core sends the user when a session ends.

use std::fmt;
use std::fmt::Write;

use tracing::info;

/// A redirect target plus the context the target view needs to resume the
/// user's original intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirect {
    /// Sign-in view; `return_to` is the path to resume after login.
    SignIn { return_to: Option<String> },
    Home,
    /// Verification-pending view, pre-filled with the account email.
    VerificationPending { email: Option<String> },
}

impl Redirect {
    /// Route path for the redirect, query string included.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::SignIn { return_to: Some(path) } => format!("/login?returnUrl={}", encode_component(path)),
            Self::SignIn { return_to: None } => "/login".to_owned(),
            Self::Home => "/".to_owned(),
            Self::VerificationPending { email: Some(email) } => {
                format!("/verify-email-pending?email={}", encode_component(email))
            }
            Self::VerificationPending { email: None } => "/verify-email-pending".to_owned(),
        }
    }
}

impl fmt::Display for Redirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
fn encode_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(char::from(b));
        } else {
            let _ = write!(out, "%{b:02X}");
        }
    }
    out
}

/// Implemented by the embedding application's router.
pub trait Navigator: Send + Sync {
    /// Path of the view currently shown, used as the sign-in return target.
    fn current_path(&self) -> String;

    fn navigate(&self, redirect: Redirect);
}

/// Navigator for headless processes: records the path and logs redirects.
#[derive(Debug, Default)]
pub struct TracingNavigator {
    current: std::sync::Mutex<String>,
}

impl TracingNavigator {
    #[must_use]
    pub fn new(start: &str) -> Self {
        Self { current: std::sync::Mutex::new(start.to_owned()) }
    }
}

impl Navigator for TracingNavigator {
    fn current_path(&self) -> String {
        self.current
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn navigate(&self, redirect: Redirect) {
        let path = redirect.path();
        info!(%path, "navigation: redirect");
        *self.current.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = path;
    }
}


#[cfg(test)]
#[path = "navigation_test.rs"]
mod tests;
