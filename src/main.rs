use std::sync::Arc;

use clap::Parser;
use portfolio_session::{
    ApiError, HttpClient, RenewalSignal, Session, SessionConfig, TracingNavigator, WsConnector,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "session-cli", about = "Drive a session and its push channel against a live backend")]
struct Cli {
    #[arg(long, env = "SESSION_API_BASE_URL", default_value = "http://127.0.0.1:3000")]
    base_url: String,

    /// Push channel URL; derived from the base URL when omitted.
    #[arg(long, env = "SESSION_WS_URL")]
    ws_url: Option<String>,

    #[arg(long, env = "SESSION_CLI_EMAIL")]
    email: Option<String>,

    #[arg(long, env = "SESSION_CLI_PASSWORD")]
    password: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let config = SessionConfig::from_lookup(|key| match key {
        "SESSION_API_BASE_URL" => Some(cli.base_url.clone()),
        "SESSION_WS_URL" => cli.ws_url.clone(),
        _ => std::env::var(key).ok(),
    })?;
    info!(base_url = %config.api_base_url, ws_url = %config.ws_url, "session-cli starting");

    let http = HttpClient::new(&config)?;
    let session = Session::new(
        config,
        Arc::new(http.clone()),
        Arc::new(http.clone()),
        Arc::new(WsConnector::with_cookies(http)),
        Arc::new(TracingNavigator::new("/")),
    );
    session.start().await;

    if let (Some(email), Some(password)) = (cli.email.as_deref(), cli.password.as_deref()) {
        if !session.store().is_authenticated() {
            let user = session.login(email, password).await?;
            info!(user_id = %user.id, name = %user.display_name(), "logged in");
        }
    }

    watch_until_interrupted(&session).await;

    if session.store().is_authenticated() {
        session.logout().await;
    }
    session.shutdown();
    info!("session-cli stopped");
    Ok(())
}

async fn watch_until_interrupted(session: &Session) {
    let mut states = session.store().subscribe();
    let mut connection = session.connection().subscribe_state();
    let mut messages = session.connection().messages();
    let mut renewals = session.coordinator().signals();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                return;
            }
            changed = states.changed() => {
                if changed.is_err() {
                    return;
                }
                let state = states.borrow_and_update().clone();
                info!(
                    authenticated = state.is_authenticated,
                    loading = state.is_loading,
                    email = state.email().unwrap_or("-"),
                    "session state"
                );
            }
            changed = connection.changed() => {
                if changed.is_err() {
                    return;
                }
                let state = *connection.borrow_and_update();
                info!(?state, "connection state");
            }
            message = messages.recv() => match message {
                Ok(frame) => info!(%frame, "push message"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "push messages dropped"),
                Err(RecvError::Closed) => return,
            },
            signal = renewals.recv() => match signal {
                Ok(RenewalSignal::Succeeded(user)) => info!(user_id = %user.id, "credential renewed"),
                Ok(RenewalSignal::Failed) => warn!("credential renewal failed"),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return,
            },
        }
    }
}
