//! Ride coordination server.
//!
//! # Usage
//!
//! ```bash
//! AUTH_USERS_FILE=./users.json cargo run --bin rideshare-server
//! ```

use anyhow::Context;
use rideshare_runtime::metrics::PrometheusMetrics;
use rideshare_server::app::{build_state, shutdown_signal, spawn_idle_reaper};
use rideshare_server::Config;
use rideshare_web::build_router;
use std::future::IntoFuture;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,rideshare=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ride coordination server");

    // Load configuration
    let config = Config::from_env();
    info!(
        address = %config.bind_address(),
        users_file = ?config.auth.users_file,
        "Configuration loaded"
    );

    let metrics = PrometheusMetrics::install().context("failed to install metrics recorder")?;
    let state = build_state(&config, metrics)?;
    let settings = state.settings;

    let reaper = spawn_idle_reaper(
        Arc::clone(&state.registry),
        settings.ping_interval,
        settings.idle_timeout,
    );

    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    info!(address = %config.bind_address(), "HTTP server listening");

    // Closing live sockets lets their tasks finish so the drain can complete.
    let registry = Arc::clone(&state.registry);
    let (signalled_tx, signalled_rx) = oneshot::channel::<()>();
    let shutdown = async move {
        shutdown_signal().await;
        let _ = signalled_tx.send(());
        registry.close_all().await;
    };

    let server = axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .into_future();

    let drain_deadline = async {
        if signalled_rx.await.is_ok() {
            tokio::time::sleep(config.shutdown_timeout()).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = server => result.context("server error")?,
        () = drain_deadline => {
            warn!(timeout_secs = config.server.shutdown_timeout, "Shutdown timed out, dropping open connections");
        }
    }

    reaper.abort();
    info!("Server stopped");
    Ok(())
}
