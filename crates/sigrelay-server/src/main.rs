#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use sigrelay_server::config::{Args, ServerConfig};
use sigrelay_server::metrics::{start_metrics_server, HealthState};
use sigrelay_server::run_with_shutdown;
use sigrelay_server::server::ServerState;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let directive = match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        EnvFilter::new(directive)
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config: ServerConfig = args.into();

    // Validate configuration before starting
    if let Err(e) = config.validate() {
        anyhow::bail!("configuration error: {}", e);
    }

    let state = Arc::new(ServerState::new(config.clone()));

    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to listen on {}", config.listen))?;
    info!(
        static_dir = %config.static_dir.display(),
        "signaling relay running at http://localhost:{}",
        config.listen.port()
    );

    let health_state = HealthState::new();

    tokio::spawn({
        let health_state = health_state.clone();
        let state = Arc::clone(&state);
        async move {
            if let Err(e) = start_metrics_server(config.metrics_addr, health_state, state).await {
                warn!("metrics server error: {}", e);
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let server = run_with_shutdown(listener, state, shutdown_rx);
    tokio::pin!(server);
    health_state.set_ready(true);

    tokio::select! {
        result = &mut server => {
            result?;
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
            health_state.set_ready(false);
            let _ = shutdown_tx.send(());
        }
    }

    server.await?;
    Ok(())
}
