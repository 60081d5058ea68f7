//! Seams to the backend: generic request transport and the auth operations.
//!
//! DESIGN
//! ======
//! The core never talks HTTP directly. Application calls are `ApiRequest`
//! values handed to an `HttpTransport`; the session boundary operations live
//! on `AuthApi`. `crate::http::HttpClient` implements both over reqwest, and
//! tests substitute in-memory fakes.

use serde::Serialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::types::{LoginRequest, RegisterRequest, UserProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

/// Description of an outbound call. Cloneable so it can be re-issued after a
/// credential renewal.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self { method: Method::Get, path: path.into(), body: None }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self { method: Method::Delete, path: path.into(), body: None }
    }

    /// # Errors
    ///
    /// Returns an error if `body` cannot be serialised to JSON.
    pub fn post<T: Serialize>(path: impl Into<String>, body: &T) -> Result<Self, ApiError> {
        Self::with_body(Method::Post, path, body)
    }

    /// # Errors
    ///
    /// Returns an error if `body` cannot be serialised to JSON.
    pub fn put<T: Serialize>(path: impl Into<String>, body: &T) -> Result<Self, ApiError> {
        Self::with_body(Method::Put, path, body)
    }

    /// # Errors
    ///
    /// Returns an error if `body` cannot be serialised to JSON.
    pub fn patch<T: Serialize>(path: impl Into<String>, body: &T) -> Result<Self, ApiError> {
        Self::with_body(Method::Patch, path, body)
    }

    fn with_body<T: Serialize>(method: Method, path: impl Into<String>, body: &T) -> Result<Self, ApiError> {
        let body = serde_json::to_value(body).map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(Self { method, path: path.into(), body: Some(body) })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

/// Generic request/response plumbing.
///
/// Implementations map HTTP 401 to [`ApiError::Unauthorized`] and 403 to
/// [`ApiError::Forbidden`] so the renewal coordinator can recognise them.
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError>;
}

/// Backend session boundary operations.
#[async_trait::async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchange the cookie credential for fresh user data.
    ///
    /// `Ok(None)` means there is no valid session; that is the normal
    /// anonymous outcome, not an error.
    async fn renew_credential(&self) -> Result<Option<UserProfile>, ApiError>;

    async fn login(&self, request: &LoginRequest) -> Result<UserProfile, ApiError>;

    async fn register(&self, request: &RegisterRequest) -> Result<Option<UserProfile>, ApiError>;

    async fn logout(&self) -> Result<(), ApiError>;
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
