//! Prometheus metrics for rides and the real-time channel.
//!
//! Recorders are zero-sized structs with associated functions so call sites
//! stay one line. Installing the exporter is optional: without it the
//! `metrics` macros are no-ops.
//!
//! # Example
//!
//! ```rust,no_run
//! use rideshare_runtime::metrics::PrometheusMetrics;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = PrometheusMetrics::install()?;
//! // Serve metrics.render() at GET /metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

pub use metrics::{counter, gauge};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Installed Prometheus recorder.
#[derive(Clone, Default)]
pub struct PrometheusMetrics {
    handle: Option<PrometheusHandle>,
}

impl PrometheusMetrics {
    /// Registers metric descriptions and installs the global recorder.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Install`] if the recorder cannot be installed
    /// for a reason other than one already being present.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (several test apps in one process),
    /// the returned value renders nothing but recording keeps working.
    pub fn install() -> Result<Self, MetricsError> {
        register_metrics();

        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                tracing::info!("Prometheus recorder installed");
                Ok(Self {
                    handle: Some(handle),
                })
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(Self::default())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Current metrics in Prometheus text format.
    ///
    /// Returns `None` if this instance did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Ride metrics
    describe_counter!("rides_created_total", "Total number of rides created");
    describe_counter!(
        "ride_transitions_total",
        "Lifecycle events committed, labelled by event"
    );
    describe_counter!(
        "ride_rejections_total",
        "Control-plane requests rejected, labelled by error code"
    );

    // Real-time metrics
    describe_gauge!(
        "realtime_connections_active",
        "Currently registered real-time connections"
    );
    describe_counter!(
        "realtime_envelopes_delivered_total",
        "Envelopes accepted by a live transport"
    );
    describe_counter!(
        "realtime_connections_pruned_total",
        "Connections dropped after a failed send or idle timeout"
    );

    // Notification metrics
    describe_counter!(
        "push_notifications_total",
        "Push notifications handed to the notifier, labelled by kind"
    );
}

/// Ride lifecycle metrics recorder.
pub struct RideMetrics;

impl RideMetrics {
    /// Record a committed lifecycle event.
    pub fn record_transition(event: &'static str) {
        if event == "ride_created" {
            counter!("rides_created_total").increment(1);
        }
        counter!("ride_transitions_total", "transition" => event).increment(1);
    }

    /// Record a rejected request.
    pub fn record_rejection(code: &'static str) {
        counter!("ride_rejections_total", "code" => code).increment(1);
    }
}

/// Real-time channel metrics recorder.
pub struct RealtimeMetrics;

impl RealtimeMetrics {
    /// Record the number of live connections.
    #[allow(clippy::cast_precision_loss)] // Connection counts stay far below 2^52
    pub fn record_active(count: usize) {
        gauge!("realtime_connections_active").set(count as f64);
    }

    /// Record envelopes accepted by transports.
    pub fn record_delivered(count: usize) {
        counter!("realtime_envelopes_delivered_total").increment(count as u64);
    }

    /// Record connections dropped by the server.
    pub fn record_pruned(count: usize) {
        counter!("realtime_connections_pruned_total").increment(count as u64);
    }
}

/// Push notification metrics recorder.
pub struct PushMetrics;

impl PushMetrics {
    /// Record a notification handed to the notifier.
    pub fn record_push(kind: &'static str) {
        counter!("push_notifications_total", "kind" => kind).increment(1);
    }
}
