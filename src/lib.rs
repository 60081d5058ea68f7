//! Session and realtime-connection core for the portfolio client.
//!
//! ARCHITECTURE
//! ============
//! - `store`: who is logged in, replayed to every subscriber
//! - `renewal`: transparent credential renewal with a single-flight FIFO queue
//! - `realtime`: the push channel, whose lifecycle follows the store
//! - `guards`: route gates that wait for the store to settle
//! - `session`: explicit wiring of all of the above
//!
//! The backend is reached only through the `api` traits (`http` implements
//! them over reqwest) and the `realtime::PushConnector` trait (`realtime::ws`
//! implements it over tokio-tungstenite).

pub mod api;
pub mod config;
pub mod error;
pub mod guards;
pub mod http;
pub mod navigation;
pub mod realtime;
pub mod renewal;
pub mod session;
pub mod store;
pub mod types;

#[cfg(test)]
mod test_helpers;

pub use api::{ApiRequest, ApiResponse, AuthApi, HttpTransport, Method};
pub use config::SessionConfig;
pub use error::{ApiError, ErrorCode};
pub use guards::{GuardOutcome, Guards};
pub use http::HttpClient;
pub use navigation::{Navigator, Redirect, TracingNavigator};
pub use realtime::{ConnectionManager, ConnectionState, PushConnector, WsConnector};
pub use renewal::{RenewalCoordinator, RenewalSignal};
pub use session::Session;
pub use store::SessionStore;
pub use types::{LoginRequest, RegisterRequest, SessionState, UserProfile};
