//! Application bootstrap: wiring, background tasks and shutdown.

use crate::config::Config;
use crate::identity::TokenTable;
use rideshare_core::environment::{Clock, SystemClock};
use rideshare_runtime::metrics::PrometheusMetrics;
use rideshare_runtime::ConnectionRegistry;
use rideshare_web::{AppState, Identity};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Builds the application state from configuration.
///
/// # Errors
///
/// Fails if the configured token table cannot be loaded.
pub fn build_state(config: &Config, metrics: PrometheusMetrics) -> anyhow::Result<AppState> {
    let table = match &config.auth.users_file {
        Some(path) => {
            let table = TokenTable::load(path)?;
            info!(path = %path.display(), tokens = table.len(), "Token table loaded");
            table
        }
        None => {
            tracing::warn!("AUTH_USERS_FILE not set; every credential will be rejected");
            TokenTable::empty()
        }
    };
    let table = Arc::new(table);
    let identity = Identity {
        authenticator: Arc::clone(&table) as _,
        directory: table,
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    Ok(AppState::in_memory(
        identity,
        clock,
        metrics,
        config.realtime_settings(),
    ))
}

/// Periodically closes connections idle for longer than `max_idle`.
///
/// Socket tasks time out on their own; this catches connections whose task
/// is stuck or gone.
pub fn spawn_idle_reaper(
    registry: Arc<ConnectionRegistry>,
    every: Duration,
    max_idle: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            registry.reap_idle(max_idle).await;
        }
    })
}

/// Resolves on Ctrl+C or SIGTERM.
///
/// If a handler cannot be installed the failure is logged and that signal
/// is ignored.
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        () = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
