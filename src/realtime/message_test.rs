use super::*;

#[test]
fn ping_keeps_timestamp() {
    let msg = parse_inbound(r#"{"type":"ping","timestamp":1717171717}"#).unwrap();
    assert_eq!(msg, Inbound::Ping { timestamp: json!(1_717_171_717) });
}

#[test]
fn ping_without_timestamp_echoes_null() {
    assert_eq!(parse_inbound(r#"{"type":"ping"}"#), Some(Inbound::Ping { timestamp: Value::Null }));
}

#[test]
fn pong_echoes_timestamp() {
    assert_eq!(pong(&json!(42)), json!({ "type": "pong", "timestamp": 42 }));
}

#[test]
fn token_refresh_required_is_recognised() {
    assert_eq!(parse_inbound(r#"{"type":"token_refresh_required"}"#), Some(Inbound::RefreshRequired));
}

#[test]
fn shutdown_reads_delay_seconds() {
    let msg = parse_inbound(r#"{"type":"server_shutdown","reconnect_in":2}"#).unwrap();
    assert_eq!(msg, Inbound::ServerShutdown { reconnect_in: Duration::from_secs(2) });
}

#[test]
fn shutdown_accepts_fractional_delay() {
    let msg = parse_inbound(r#"{"type":"server_shutdown","reconnect_in":0.25}"#).unwrap();
    assert_eq!(msg, Inbound::ServerShutdown { reconnect_in: Duration::from_millis(250) });
}

#[test]
fn shutdown_defaults_missing_or_negative_delay() {
    let missing = parse_inbound(r#"{"type":"server_shutdown"}"#).unwrap();
    assert_eq!(missing, Inbound::ServerShutdown { reconnect_in: DEFAULT_SHUTDOWN_RECONNECT });
    let negative = parse_inbound(r#"{"type":"server_shutdown","reconnect_in":-3}"#).unwrap();
    assert_eq!(negative, Inbound::ServerShutdown { reconnect_in: DEFAULT_SHUTDOWN_RECONNECT });
}

#[test]
fn shutdown_defaults_unrepresentable_delay() {
    for text in [
        r#"{"type":"server_shutdown","reconnect_in":1e300}"#,
        r#"{"type":"server_shutdown","reconnect_in":1.8446744073709552e19}"#,
    ] {
        let msg = parse_inbound(text).unwrap();
        assert_eq!(msg, Inbound::ServerShutdown { reconnect_in: DEFAULT_SHUTDOWN_RECONNECT }, "{text}");
    }
}

#[test]
fn shutdown_defaults_non_numeric_delay() {
    let msg = parse_inbound(r#"{"type":"server_shutdown","reconnect_in":"soon"}"#).unwrap();
    assert_eq!(msg, Inbound::ServerShutdown { reconnect_in: DEFAULT_SHUTDOWN_RECONNECT });
}

#[test]
fn domain_messages_forward_verbatim() {
    let text = r#"{"type":"notification","payload":{"id":7,"title":"New job"}}"#;
    let Some(Inbound::Forward(value)) = parse_inbound(text) else {
        panic!("expected forward");
    };
    assert_eq!(value, serde_json::from_str::<Value>(text).unwrap());
}

#[test]
fn malformed_frames_are_rejected() {
    assert_eq!(parse_inbound("not json"), None);
    assert_eq!(parse_inbound("[1,2,3]"), None);
    assert_eq!(parse_inbound(r#"{"kind":"ping"}"#), None);
    assert_eq!(parse_inbound(r#"{"type":5}"#), None);
    assert_eq!(parse_inbound(""), None);
}
