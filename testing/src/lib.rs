//! # Rideshare Testing
//!
//! Testing utilities for the ride coordination service.
//!
//! This crate provides:
//! - Deterministic fixtures for users and rides
//! - Mock implementations of the collaborator traits (clock, transport,
//!   notifier, event sink, identity)
//! - A Given-When-Then harness for pure lifecycle transitions
//! - proptest strategies for domain types
//!
//! ## Example
//!
//! ```ignore
//! use rideshare_testing::{TransitionTest, fixtures};
//!
//! TransitionTest::given(fixtures::record(RideId::new(1), 2))
//!     .when(|record| join_ride(record, fixtures::ALICE, fixtures::epoch()))
//!     .then_record(|record| assert_eq!(record.ride.status, RideStatus::Requested))
//!     .run();
//! ```

pub mod fixtures;
pub mod mocks;
pub mod transition_test;

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;
    use rideshare_core::types::GeoPoint;

    /// Any valid coordinate.
    pub fn geo_point() -> impl Strategy<Value = GeoPoint> {
        (-90.0f64..=90.0, -180.0f64..=180.0).prop_map(|(lat, lng)| GeoPoint { lat, lng })
    }

    /// A coordinate within roughly `spread` degrees of `center`, clamped to
    /// the valid range.
    pub fn geo_point_near(center: GeoPoint, spread: f64) -> impl Strategy<Value = GeoPoint> {
        (-spread..=spread, -spread..=spread).prop_map(move |(dlat, dlng)| GeoPoint {
            lat: (center.lat + dlat).clamp(-90.0, 90.0),
            lng: (center.lng + dlng).clamp(-180.0, 180.0),
        })
    }

    /// A non-negative search radius up to `max_km`.
    pub fn radius_km(max_km: f64) -> impl Strategy<Value = f64> {
        0.0f64..=max_km
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, test_clock};
pub use transition_test::TransitionTest;
