//! Error taxonomy for calls made through the session core.
//!
//! ERROR HANDLING
//! ==============
//! Expected-unauthenticated outcomes are not errors: a renewal that finds no
//! session resolves to `Ok(None)`. Everything here is either a transport
//! failure (logged, never surfaced as a modal) or a forced session end that the
//! coordinator turns into a redirect.

/// Marker the backend puts in a 403 payload when the account's email address
/// has not been verified yet.
pub const EMAIL_NOT_VERIFIED_MARKER: &str = "EMAIL_NOT_VERIFIED";

/// Grepable error code and retryable flag, shared by every error the core
/// exposes.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The credential was missing or expired (HTTP 401).
    #[error("unauthorized")]
    Unauthorized,

    /// The server refused the request (HTTP 403).
    #[error("forbidden: {body}")]
    Forbidden { body: String },

    /// Any other non-success HTTP status.
    #[error("request failed with status {status}")]
    Status { status: u16, body: String },

    /// Connection, timeout, or other transport-level failure.
    #[error("transport failed: {0}")]
    Transport(String),

    /// The response body could not be decoded.
    #[error("response decode failed: {0}")]
    Decode(String),

    /// Renewal was attempted and failed; the session is over.
    #[error("session expired")]
    SessionExpired,

    /// The account must verify its email address before continuing.
    #[error("email address not verified")]
    EmailNotVerified,

    /// The renewal this request was queued behind was dropped before resolving.
    #[error("renewal aborted before completing")]
    RenewalAborted,

    /// A configuration value was rejected.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl ApiError {
    /// True for a 403 whose payload carries [`EMAIL_NOT_VERIFIED_MARKER`].
    #[must_use]
    pub fn is_email_not_verified(&self) -> bool {
        match self {
            Self::Forbidden { body } => body.contains(EMAIL_NOT_VERIFIED_MARKER),
            Self::EmailNotVerified => true,
            _ => false,
        }
    }
}

impl ErrorCode for ApiError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "E_UNAUTHORIZED",
            Self::Forbidden { .. } => "E_FORBIDDEN",
            Self::Status { .. } => "E_STATUS",
            Self::Transport(_) => "E_TRANSPORT",
            Self::Decode(_) => "E_DECODE",
            Self::SessionExpired => "E_SESSION_EXPIRED",
            Self::EmailNotVerified => "E_EMAIL_NOT_VERIFIED",
            Self::RenewalAborted => "E_RENEWAL_ABORTED",
            Self::InvalidConfig(_) => "E_INVALID_CONFIG",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::RenewalAborted | Self::Status { status: 429 | 500..=599, .. })
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
