//! Session core configuration parsed from environment variables.

use std::time::Duration;

use crate::error::ApiError;

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:3000";
pub const DEFAULT_RECONNECT_BASE_MS: u64 = 3000;
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_REFRESH_RECONNECT_MS: u64 = 1000;
pub const DEFAULT_GUARD_WAIT_MS: u64 = 5000;
pub const DEFAULT_GUEST_RENEW_MS: u64 = 4000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

pub const LOGIN_PATH: &str = "/api/auth/login";
pub const REGISTER_PATH: &str = "/api/auth/register";
pub const REFRESH_PATH: &str = "/api/auth/refresh";
pub const LOGOUT_PATH: &str = "/api/auth/logout";
const WS_PATH: &str = "/ws";

/// Paths that must never trigger a renewal when they fail with 401.
pub const RENEWAL_BYPASS_PATHS: [&str; 3] = [LOGIN_PATH, REGISTER_PATH, REFRESH_PATH];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub api_base_url: String,
    pub ws_url: String,
    /// Linear backoff base: attempt `n` waits `reconnect_base * n`.
    pub reconnect_base: Duration,
    pub max_reconnect_attempts: u32,
    /// Pause between the forced disconnect and the reconnect after a
    /// server-requested credential renewal.
    pub refresh_reconnect_delay: Duration,
    /// Upper bound guards wait for the store to finish loading.
    pub guard_wait: Duration,
    /// Upper bound for the guest guard's best-effort silent renewal.
    pub guest_renew_timeout: Duration,
    pub request_timeout: Duration,
}

impl SessionConfig {
    /// Build config from process environment variables.
    ///
    /// Optional:
    /// - `SESSION_API_BASE_URL`: default `http://127.0.0.1:3000`
    /// - `SESSION_WS_URL`: derived from the base URL when absent
    /// - `SESSION_RECONNECT_BASE_MS`: default 3000
    /// - `SESSION_RECONNECT_MAX_ATTEMPTS`: default 5
    /// - `SESSION_REFRESH_RECONNECT_MS`: default 1000
    /// - `SESSION_GUARD_WAIT_MS`: default 5000
    /// - `SESSION_GUEST_RENEW_MS`: default 4000
    /// - `SESSION_REQUEST_TIMEOUT_SECS`: default 30
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is not `http://` or `https://`.
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is not `http://` or `https://`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ApiError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_base_url = lookup("SESSION_API_BASE_URL")
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_owned())
            .trim_end_matches('/')
            .to_owned();
        let ws_url = match lookup("SESSION_WS_URL") {
            Some(url) => url,
            None => derive_ws_url(&api_base_url)?,
        };

        Ok(Self {
            ws_url,
            reconnect_base: Duration::from_millis(parse_or(&lookup, "SESSION_RECONNECT_BASE_MS", DEFAULT_RECONNECT_BASE_MS)),
            max_reconnect_attempts: parse_or(&lookup, "SESSION_RECONNECT_MAX_ATTEMPTS", DEFAULT_MAX_RECONNECT_ATTEMPTS),
            refresh_reconnect_delay: Duration::from_millis(parse_or(
                &lookup,
                "SESSION_REFRESH_RECONNECT_MS",
                DEFAULT_REFRESH_RECONNECT_MS,
            )),
            guard_wait: Duration::from_millis(parse_or(&lookup, "SESSION_GUARD_WAIT_MS", DEFAULT_GUARD_WAIT_MS)),
            guest_renew_timeout: Duration::from_millis(parse_or(&lookup, "SESSION_GUEST_RENEW_MS", DEFAULT_GUEST_RENEW_MS)),
            request_timeout: Duration::from_secs(parse_or(
                &lookup,
                "SESSION_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )),
            api_base_url,
        })
    }

    /// Config pointing at `api_base_url` with every timing at its default.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is not `http://` or `https://`.
    pub fn for_base_url(api_base_url: &str) -> Result<Self, ApiError> {
        let base = api_base_url.to_owned();
        Self::from_lookup(|key| (key == "SESSION_API_BASE_URL").then(|| base.clone()))
    }

    /// Absolute URL for an API path.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url, path)
    }

    #[must_use]
    pub fn bypasses_renewal(path: &str) -> bool {
        RENEWAL_BYPASS_PATHS.contains(&path)
    }

    /// Reconnect delay before attempt number `attempt` (1-based).
    #[must_use]
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        self.reconnect_base.saturating_mul(attempt)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn derive_ws_url(base_url: &str) -> Result<String, ApiError> {
    if let Some(rest) = base_url.strip_prefix("http://") {
        return Ok(format!("ws://{rest}{WS_PATH}"));
    }
    if let Some(rest) = base_url.strip_prefix("https://") {
        return Ok(format!("wss://{rest}{WS_PATH}"));
    }
    Err(ApiError::InvalidConfig(format!("unsupported base URL: {base_url}")))
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
