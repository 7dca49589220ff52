//! Runtime services for shared-ride coordination.
//!
//! This crate holds the stateful pieces the core only describes:
//!
//! - [`memory_store::InMemoryRideStore`]: a [`RideStore`](rideshare_core::store::RideStore)
//!   with per-ride locking
//! - [`helmet_store::InMemoryHelmetCheckStore`]: helmet verifications
//! - [`registry::ConnectionRegistry`] and [`registry::SubscriptionHub`]: who is
//!   connected and who listens to which ride
//! - [`dispatcher::BroadcastDispatcher`]: event fan-out and inbound frame handling
//! - [`pipeline::EventPipeline`]: the event sink that ties broadcast and push together
//! - [`notifications`]: push planning, device tokens, the reference notifier
//! - [`metrics`]: Prometheus recorders
//!
//! Every service is an explicitly constructed value; wire them once at
//! startup and share them through `Arc`s.
//!
//! # Example
//!
//! ```ignore
//! let clock: Arc<dyn Clock> = Arc::new(SystemClock);
//! let registry = Arc::new(ConnectionRegistry::new(clock.clone()));
//! let dispatcher = Arc::new(BroadcastDispatcher::new(registry, notifier.clone(), clock.clone()));
//! let pipeline = Arc::new(EventPipeline::new(dispatcher, notifier));
//! let controller = LifecycleController::new(store, pipeline, clock);
//! ```

pub mod dispatcher;
pub mod helmet_store;
pub mod memory_store;
pub mod metrics;
pub mod notifications;
pub mod pipeline;
pub mod registry;

pub use dispatcher::BroadcastDispatcher;
pub use helmet_store::InMemoryHelmetCheckStore;
pub use memory_store::InMemoryRideStore;
pub use pipeline::EventPipeline;
pub use registry::{ConnectionHandle, ConnectionRegistry, DeliveryReport, RegistryStats};
