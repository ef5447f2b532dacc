use crate::server::ServerState;
use axum::extract::State;
use axum::{http::StatusCode, response::Json, routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    peers: usize,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    ready: bool,
}

/// Readiness flag flipped by the relay as it starts and drains.
#[derive(Clone, Default)]
pub struct HealthState {
    ready: Arc<AtomicBool>,
}

impl HealthState {
    /// Create a health state that reports not-ready until [`set_ready`](Self::set_ready).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the relay as accepting (or no longer accepting) connections.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    /// Whether the relay is accepting connections.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
struct MetricsContext {
    prometheus: PrometheusHandle,
    health: HealthState,
    relay: Arc<ServerState>,
}

/// Routes for `/metrics`, `/health` and `/ready`.
pub fn metrics_router(
    prometheus: PrometheusHandle,
    health: HealthState,
    relay: Arc<ServerState>,
) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .with_state(MetricsContext {
            prometheus,
            health,
            relay,
        })
}

/// Install the global Prometheus recorder and serve the metrics routes.
///
/// # Errors
///
/// Returns an error if the recorder is already installed or binding fails.
pub async fn start_metrics_server(
    addr: SocketAddr,
    health: HealthState,
    relay: Arc<ServerState>,
) -> anyhow::Result<()> {
    let prometheus = PrometheusBuilder::new().install_recorder()?;
    let app = metrics_router(prometheus, health, relay);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("metrics server listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn metrics_handler(State(ctx): State<MetricsContext>) -> String {
    ctx.prometheus.render()
}

async fn health_handler(State(ctx): State<MetricsContext>) -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy",
            peers: ctx.relay.registry.len(),
        }),
    )
}

/// 200 while accepting connections, 503 before startup completes and while draining.
async fn ready_handler(State(ctx): State<MetricsContext>) -> (StatusCode, Json<ReadyResponse>) {
    if ctx.health.is_ready() {
        (
            StatusCode::OK,
            Json(ReadyResponse {
                status: "ready",
                ready: true,
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse {
                status: "not ready",
                ready: false,
            }),
        )
    }
}

/// Connection count gauges.
pub mod gauges {
    /// Increment the active connections gauge.
    pub fn inc_connections_active() {
        metrics::gauge!("sigrelay_connections_active").increment(1.0);
    }

    /// Decrement the active connections gauge.
    pub fn dec_connections_active() {
        metrics::gauge!("sigrelay_connections_active").decrement(1.0);
    }
}

/// Event counters.
pub mod counters {
    /// Record a rejected WebSocket upgrade with the given reason label.
    pub fn upgrades_rejected_total(reason: &'static str) {
        metrics::counter!("sigrelay_upgrades_rejected_total", "reason" => reason).increment(1);
    }

    /// Increment the relayed-messages counter for the given message type.
    pub fn messages_relayed_total(kind: &'static str) {
        metrics::counter!("sigrelay_messages_relayed_total", "type" => kind).increment(1);
    }

    /// Increment the dropped-messages counter with the given reason label.
    pub fn messages_dropped_total(reason: &'static str) {
        metrics::counter!("sigrelay_messages_dropped_total", "reason" => reason).increment(1);
    }

    /// Increment the peer-count broadcast counter.
    pub fn peer_count_broadcasts_total() {
        metrics::counter!("sigrelay_peer_count_broadcasts_total").increment(1);
    }

    /// Increment the dropped-notification counter with the given reason label.
    pub fn notifications_dropped_total(reason: &'static str) {
        metrics::counter!("sigrelay_notifications_dropped_total", "reason" => reason).increment(1);
    }
}

/// Latency histograms.
pub mod histograms {
    /// Record a frame dispatch latency observation in seconds.
    pub fn dispatch_latency_seconds(value: f64) {
        metrics::histogram!("sigrelay_dispatch_latency_seconds").record(value);
    }
}
