//! HTTP and WebSocket front end.

pub mod connection;
pub mod http;
pub mod protocol;
pub mod ws;

use crate::config::Config;
use crate::error::{Result, VocaliveError};
use crate::session::registry::SessionRegistry;
use axum::Router;
use axum::routing::{delete, get, post};
use std::sync::Arc;

pub use connection::serve_connection;
pub use protocol::{ClientMessage, ConfigEcho, InboundFrame, OutboundFrame, ServerEvent};

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub config: Arc<Config>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(http::health))
        .route("/start-session", post(http::start_session))
        .route("/sessions", get(http::list_sessions))
        .route("/sessions/:session_id", delete(http::delete_session))
        .route("/ws/:session_id", get(ws::ws_handler))
        .with_state(state)
}

/// Serve until Ctrl-C or SIGTERM, then drop every session.
pub async fn run_server(state: AppState) -> Result<()> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| VocaliveError::Other(format!("Failed to bind {}: {}", addr, e)))?;
    tracing::info!(address = %addr, "Listening");

    let registry = Arc::clone(&state.registry);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let open = registry.len();
            registry.shutdown();
            tracing::info!(sessions = open, "Closed all sessions");
        })
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    tokio::select! {
        res = tokio::signal::ctrl_c() => match res {
            Ok(()) => tracing::info!("Received SIGINT, shutting down"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C"),
        },
        res = wait_for_sigterm() => match res {
            Ok(()) => tracing::info!("Received SIGTERM, shutting down"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for SIGTERM"),
        },
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| VocaliveError::Other(format!("Failed to register SIGTERM handler: {}", e)))?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    std::future::pending::<()>().await;
    Ok(())
}
