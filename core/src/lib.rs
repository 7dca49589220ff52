//! # Rideshare Core
//!
//! Domain types, contracts and the lifecycle state machine for shared-ride
//! coordination.
//!
//! A host offers a ride with a fixed number of seats, riders ask to join, the
//! host confirms, starts and completes it. Every interested client keeps a
//! live view of the ride over a real-time channel.
//!
//! ## Core Concepts
//!
//! - **Ride / Participant**: the records the [`lifecycle::LifecycleController`] owns
//! - **`RideStore`**: external persistence with a per-ride atomic mutation primitive
//! - **`RideEvent`**: one fact per successful mutation, handed to a [`event::RideEventSink`]
//! - **Envelope**: the JSON frame exchanged over the real-time channel
//! - **Environment**: clock, authenticator, user directory and notifier injected as traits
//!
//! The connection registry, broadcast dispatcher and in-memory store live in
//! `rideshare-runtime`; this crate holds no mutable global state.
//!
//! ## Example
//!
//! ```ignore
//! use rideshare_core::lifecycle::LifecycleController;
//!
//! let controller = LifecycleController::new(store, sink, Arc::new(SystemClock));
//! let ride = controller.create(&host, new_ride).await?;
//! controller.join(&rider, ride.id).await?;
//! controller.confirm(&host, ride.id).await?;
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

pub mod auth;
pub mod envelope;
pub mod error;
pub mod event;
pub mod geo;
pub mod helmet;
pub mod lifecycle;
pub mod notify;
pub mod store;
pub mod transport;
pub mod types;

pub use error::{ConflictReason, RideError};

/// Environment module - injected dependencies shared by every component
///
/// External effects the core needs but does not own are abstracted behind
/// traits so tests can substitute deterministic versions.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Test - fixed time for deterministic tests
    /// struct FixedClock { time: DateTime<Utc> }
    /// impl Clock for FixedClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         self.time
    ///     }
    /// }
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
