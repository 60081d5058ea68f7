//! Inbound push frames: JSON objects discriminated by a string `type`.
//!
//! Control messages are handled by the connection manager itself; everything
//! else is forwarded verbatim to subscribers.

use std::time::Duration;

use serde_json::{Value, json};

pub const PING: &str = "ping";
pub const PONG: &str = "pong";
pub const TOKEN_REFRESH_REQUIRED: &str = "token_refresh_required";
pub const SERVER_SHUTDOWN: &str = "server_shutdown";

/// Reconnect delay when a shutdown notice omits `reconnect_in`.
pub const DEFAULT_SHUTDOWN_RECONNECT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Keep-alive ping; echo the timestamp back.
    Ping { timestamp: Value },
    /// The server wants a fresh credential on a fresh handshake.
    RefreshRequired,
    /// The server is going away; reconnect after the delay.
    ServerShutdown { reconnect_in: Duration },
    /// Anything else, untouched.
    Forward(Value),
}

/// Classify a text frame. `None` for anything that is not a JSON object with
/// a string `type`.
#[must_use]
pub fn parse_inbound(text: &str) -> Option<Inbound> {
    let value: Value = serde_json::from_str(text).ok()?;
    let kind = value.as_object()?.get("type")?.as_str()?;

    let inbound = match kind {
        PING => Inbound::Ping { timestamp: value.get("timestamp").cloned().unwrap_or(Value::Null) },
        TOKEN_REFRESH_REQUIRED => Inbound::RefreshRequired,
        SERVER_SHUTDOWN => Inbound::ServerShutdown { reconnect_in: reconnect_delay(&value) },
        _ => Inbound::Forward(value),
    };
    Some(inbound)
}

fn reconnect_delay(value: &Value) -> Duration {
    value
        .get("reconnect_in")
        .and_then(Value::as_f64)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .unwrap_or(DEFAULT_SHUTDOWN_RECONNECT)
}

/// Keep-alive acknowledgement carrying the ping's timestamp.
#[must_use]
pub fn pong(timestamp: &Value) -> Value {
    json!({ "type": PONG, "timestamp": timestamp })
}

#[cfg(test)]
#[path = "message_test.rs"]
mod tests;
