use crate::config::ServerConfig;
use crate::connection::handle_socket;
use crate::error::RelayError;
use crate::metrics::counters;
use crate::registry::Registry;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use sigrelay_common::types::WS_PATH;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::services::ServeDir;
use tracing::{info, warn};

/// Shared state for the relay server.
pub struct ServerState {
    /// Live connections, keyed by identifier.
    pub registry: Registry,
    /// Runtime server configuration.
    pub config: ServerConfig,
}

impl ServerState {
    /// State with an empty registry.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            registry: Registry::new(),
            config,
        }
    }
}

/// The relay's HTTP surface: the WebSocket endpoint at [`WS_PATH`], static
/// files from the configured directory everywhere else.
pub fn app(state: Arc<ServerState>) -> Router {
    let static_files = ServeDir::new(&state.config.static_dir);
    Router::new()
        .route(WS_PATH, get(ws_handler))
        .fallback_service(static_files)
        .with_state(state)
}

async fn ws_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<Arc<ServerState>>,
) -> Response {
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            counters::upgrades_rejected_total("bad_request");
            warn!("upgrade error: {}", rejection);
            return rejection.into_response();
        }
    };

    if state.registry.len() >= state.config.max_conns {
        counters::upgrades_rejected_total("max_conns");
        warn!(
            limit = state.config.max_conns,
            "max connections reached, rejecting upgrade"
        );
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    ws.max_message_size(state.config.max_message_size)
        .on_failed_upgrade(|e| {
            counters::upgrades_rejected_total("upgrade_failed");
            warn!("upgrade error: {}", e);
        })
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// # Errors
///
/// Returns an error if serving the listener fails.
pub async fn run(listener: TcpListener, state: Arc<ServerState>) -> Result<(), RelayError> {
    let (_shutdown_tx, shutdown_rx) = watch::channel(());
    run_with_shutdown(listener, state, shutdown_rx).await
}

/// Serve the relay until `shutdown` fires.
///
/// A send on the paired sender, or dropping it, stops accepting new
/// requests. Connections already upgraded to WebSocket keep running until
/// their clients leave or the process exits.
///
/// # Errors
///
/// Returns an error if serving the listener fails.
pub async fn run_with_shutdown(
    listener: TcpListener,
    state: Arc<ServerState>,
    mut shutdown: watch::Receiver<()>,
) -> Result<(), RelayError> {
    let local_addr = listener.local_addr()?;
    info!(
        "signaling relay listening on {} (relay endpoint {})",
        local_addr, WS_PATH
    );

    axum::serve(listener, app(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
            info!("shutdown signal received, no longer accepting connections");
        })
        .await?;

    info!("server shut down gracefully");
    Ok(())
}
