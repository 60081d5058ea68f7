//! reqwest-backed implementation of the backend seams.
//!
//! The credential lives in an http-only cookie, so the client keeps a cookie
//! jar. The same jar feeds the `Cookie` header of the push-channel upgrade
//! request (see `crate::realtime::ws`).

use std::sync::Arc;

use reqwest::cookie::{CookieStore, Jar};
use serde_json::Value;
use tracing::debug;

use crate::api::{ApiRequest, ApiResponse, AuthApi, HttpTransport, Method};
use crate::config::{LOGIN_PATH, LOGOUT_PATH, REFRESH_PATH, REGISTER_PATH, SessionConfig};
use crate::error::ApiError;
use crate::types::{AuthResponse, LoginRequest, RegisterRequest, UserProfile};

#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    jar: Arc<Jar>,
    base_url: String,
}

impl HttpClient {
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client cannot be built.
    pub fn new(config: &SessionConfig) -> Result<Self, ApiError> {
        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiError::InvalidConfig(e.to_string()))?;
        Ok(Self { client, jar, base_url: config.api_base_url.clone() })
    }

    /// `Cookie` header value the jar would send to `url`, if any.
    #[must_use]
    pub fn cookie_header(&self, url: &str) -> Option<String> {
        let url = reqwest::Url::parse(&http_equivalent(url)).ok()?;
        let value = self.jar.cookies(&url)?;
        value.to_str().ok().map(str::to_owned)
    }

    async fn post_auth(&self, path: &str, body: Option<Value>) -> Result<ApiResponse, ApiError> {
        let request = ApiRequest { method: Method::Post, path: path.to_owned(), body };
        self.send(&request).await
    }
}

/// Cookies are scoped by host, so a `ws(s)://` URL is looked up as its
/// `http(s)://` twin.
fn http_equivalent(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("ws://") {
        format!("http://{rest}")
    } else if let Some(rest) = url.strip_prefix("wss://") {
        format!("https://{rest}")
    } else {
        url.to_owned()
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

/// Map a response status onto the error taxonomy. 2xx passes.
pub(crate) fn classify_status(status: u16, body: &str) -> Result<(), ApiError> {
    match status {
        200..=299 => Ok(()),
        401 => Err(ApiError::Unauthorized),
        403 => Err(ApiError::Forbidden { body: body.to_owned() }),
        _ => Err(ApiError::Status { status, body: body.to_owned() }),
    }
}

/// Parse a response body; empty bodies become `null`, non-JSON text is kept
/// as a string.
pub(crate) fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_owned()))
}

fn decode_auth(response: &ApiResponse) -> Result<AuthResponse, ApiError> {
    if response.body.is_null() {
        return Ok(AuthResponse::default());
    }
    serde_json::from_value(response.body.clone()).map_err(|e| ApiError::Decode(e.to_string()))
}

#[async_trait::async_trait]
impl HttpTransport for HttpClient {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let url = format!("{}{}", self.base_url, request.path);
        let builder = self.client.request(to_reqwest_method(request.method), &url);
        let builder = match &request.body {
            Some(json) => builder.json(json),
            None => builder,
        };

        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        let text = resp.text().await?;
        debug!(path = %request.path, status, "http: response");

        classify_status(status, &text)?;
        Ok(ApiResponse { status, body: parse_body(&text) })
    }
}

#[async_trait::async_trait]
impl AuthApi for HttpClient {
    async fn renew_credential(&self) -> Result<Option<UserProfile>, ApiError> {
        match self.post_auth(REFRESH_PATH, None).await {
            Ok(resp) => Ok(decode_auth(&resp)?.user),
            Err(ApiError::Unauthorized) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn login(&self, request: &LoginRequest) -> Result<UserProfile, ApiError> {
        let body = serde_json::to_value(request).map_err(|e| ApiError::Decode(e.to_string()))?;
        let resp = self.post_auth(LOGIN_PATH, Some(body)).await?;
        decode_auth(&resp)?
            .user
            .ok_or_else(|| ApiError::Decode("login response carried no user".to_owned()))
    }

    async fn register(&self, request: &RegisterRequest) -> Result<Option<UserProfile>, ApiError> {
        let body = serde_json::to_value(request).map_err(|e| ApiError::Decode(e.to_string()))?;
        let resp = self.post_auth(REGISTER_PATH, Some(body)).await?;
        Ok(decode_auth(&resp)?.user)
    }

    async fn logout(&self) -> Result<(), ApiError> {
        self.post_auth(LOGOUT_PATH, None).await.map(|_| ())
    }
}

#[cfg(test)]
#[path = "http_test.rs"]
mod tests;
