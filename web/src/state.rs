//! Application state for Axum handlers.
//!
//! Every service is constructed once, at startup, and shared by cloning
//! [`AppState`] (all fields are `Arc`s or cheap clones).

use rideshare_core::auth::{Authenticator, UserDirectory};
use rideshare_core::environment::Clock;
use rideshare_core::geo::{GeoQuery, ProximityIndex, DEFAULT_RADIUS_KM};
use rideshare_core::helmet::{HelmetCheckStore, HelmetVerifier};
use rideshare_core::lifecycle::LifecycleController;
use rideshare_core::notify::{DeviceRegistry, Notifier};
use rideshare_core::store::RideStore;
use rideshare_runtime::metrics::PrometheusMetrics;
use rideshare_runtime::notifications::{InMemoryDeviceRegistry, TracingNotifier};
use rideshare_runtime::{
    BroadcastDispatcher, ConnectionRegistry, EventPipeline, InMemoryHelmetCheckStore,
    InMemoryRideStore,
};
use std::sync::Arc;
use std::time::Duration;

/// Tunables for the real-time endpoint and ride search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RealtimeSettings {
    /// How often the server pings each socket
    pub ping_interval: Duration,
    /// Silence after which a socket is closed
    pub idle_timeout: Duration,
    /// Outbound frames buffered per connection before it counts as dead
    pub channel_capacity: usize,
    /// Radius used when a nearby query omits one
    pub default_radius_km: f64,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(300),
            channel_capacity: 64,
            default_radius_km: DEFAULT_RADIUS_KM,
        }
    }
}

/// Identity collaborators handed in by the process that owns them.
#[derive(Clone)]
pub struct Identity {
    /// Credential verification
    pub authenticator: Arc<dyn Authenticator>,
    /// Subject to user lookup
    pub directory: Arc<dyn UserDirectory>,
}

/// Application state shared across all HTTP and WebSocket handlers.
#[derive(Clone)]
pub struct AppState {
    /// Ride lifecycle operations
    pub controller: Arc<LifecycleController>,
    /// Nearby ride search
    pub geo: Arc<dyn GeoQuery>,
    /// Helmet verification records
    pub helmet: Arc<HelmetVerifier>,
    /// Live connections and subscriptions
    pub registry: Arc<ConnectionRegistry>,
    /// Inbound frame handling and event fan-out
    pub dispatcher: Arc<BroadcastDispatcher>,
    /// Push token storage
    pub devices: Arc<dyn DeviceRegistry>,
    /// Credential verification and user lookup
    pub identity: Identity,
    /// Prometheus exposition handle
    pub metrics: PrometheusMetrics,
    /// Real-time tunables
    pub settings: RealtimeSettings,
    rides: Arc<dyn RideStore>,
    clock: Arc<dyn Clock>,
}

impl AppState {
    /// Wires the in-process services: an [`InMemoryRideStore`], the
    /// in-process [`ProximityIndex`], an [`InMemoryDeviceRegistry`] and the
    /// logging [`TracingNotifier`]. Helmet checks start in an
    /// [`InMemoryHelmetCheckStore`].
    #[must_use]
    pub fn in_memory(
        identity: Identity,
        clock: Arc<dyn Clock>,
        metrics: PrometheusMetrics,
        settings: RealtimeSettings,
    ) -> Self {
        let store: Arc<dyn RideStore> = Arc::new(InMemoryRideStore::new());
        let devices: Arc<dyn DeviceRegistry> = Arc::new(InMemoryDeviceRegistry::new());
        let notifier: Arc<dyn Notifier> = Arc::new(TracingNotifier::new(Arc::clone(&devices)));
        Self::with_services(store, devices, notifier, identity, clock, metrics, settings)
    }

    /// Wires the state around externally provided store, devices and notifier.
    ///
    /// Helmet checks are kept in memory; see
    /// [`with_helmet_checks`](Self::with_helmet_checks).
    #[must_use]
    pub fn with_services(
        store: Arc<dyn RideStore>,
        devices: Arc<dyn DeviceRegistry>,
        notifier: Arc<dyn Notifier>,
        identity: Identity,
        clock: Arc<dyn Clock>,
        metrics: PrometheusMetrics,
        settings: RealtimeSettings,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(Arc::clone(&clock)));
        let dispatcher = Arc::new(BroadcastDispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&notifier),
            Arc::clone(&clock),
        ));
        let pipeline = Arc::new(EventPipeline::new(Arc::clone(&dispatcher), notifier));
        let controller = Arc::new(LifecycleController::new(
            Arc::clone(&store),
            pipeline,
            Arc::clone(&clock),
        ));
        let helmet = Arc::new(HelmetVerifier::new(
            Arc::new(InMemoryHelmetCheckStore::new()),
            Arc::clone(&store),
            Arc::clone(&clock),
        ));

        Self {
            controller,
            helmet,
            geo: Arc::new(ProximityIndex::new(Arc::clone(&store))),
            registry,
            dispatcher,
            devices,
            identity,
            metrics,
            settings,
            rides: store,
            clock,
        }
    }

    /// Replaces the helmet check store.
    #[must_use]
    pub fn with_helmet_checks(mut self, checks: Arc<dyn HelmetCheckStore>) -> Self {
        self.helmet = Arc::new(HelmetVerifier::new(
            checks,
            Arc::clone(&self.rides),
            Arc::clone(&self.clock),
        ));
        self
    }
}
