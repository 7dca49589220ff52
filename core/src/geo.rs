//! Great-circle proximity filtering.
//!
//! [`ProximityIndex`] computes distances in-process with the haversine
//! formula. A store with native distance queries can implement [`GeoQuery`]
//! directly instead; both must treat the radius as inclusive.

use crate::error::RideError;
use crate::store::{RideStore, StoreFuture};
use crate::types::{GeoPoint, Ride, RideStatus};
use std::collections::HashSet;
use std::sync::Arc;

/// Mean Earth radius used for all distance computations.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Radius used when a client does not supply one.
pub const DEFAULT_RADIUS_KM: f64 = 5.0;

/// Great-circle distance between two points in kilometres.
#[must_use]
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    // Rounding can push h a hair past 1 for antipodal points.
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Checks a client-supplied radius.
///
/// # Errors
///
/// Returns [`RideError::Validation`] for negative or non-finite values.
pub fn validate_radius(radius_km: f64) -> Result<(), RideError> {
    if radius_km.is_finite() && radius_km >= 0.0 {
        Ok(())
    } else {
        Err(RideError::Validation(format!(
            "radius_km must be a finite non-negative number, got {radius_km}"
        )))
    }
}

/// Finds joinable rides near a point.
pub trait GeoQuery: Send + Sync {
    /// Rides in `Created` or `Requested` whose start lies within `radius_km`
    /// (inclusive) of `point`. Each ride appears at most once.
    ///
    /// # Errors
    ///
    /// - [`RideError::Validation`] for a bad point or radius
    /// - [`RideError::Storage`] on collaborator failure
    fn nearby(&self, point: GeoPoint, radius_km: f64) -> StoreFuture<'_, Vec<Ride>>;
}

/// In-process haversine filter over the store's joinable rides.
#[derive(Clone)]
pub struct ProximityIndex {
    store: Arc<dyn RideStore>,
}

impl ProximityIndex {
    /// Creates an index reading from `store`.
    #[must_use]
    pub fn new(store: Arc<dyn RideStore>) -> Self {
        Self { store }
    }

    /// Applies the distance filter to an already-loaded candidate list.
    ///
    /// Results are ordered nearest first; duplicates by ride id are dropped.
    #[must_use]
    pub fn filter(candidates: Vec<Ride>, point: GeoPoint, radius_km: f64) -> Vec<Ride> {
        let mut seen = HashSet::new();
        let mut hits: Vec<(f64, Ride)> = candidates
            .into_iter()
            .filter(|ride| ride.status.is_joinable())
            .filter(|ride| seen.insert(ride.id))
            .filter_map(|ride| {
                let distance = haversine_km(point, ride.start);
                (distance <= radius_km).then_some((distance, ride))
            })
            .collect();

        hits.sort_by(|a, b| a.0.total_cmp(&b.0));
        hits.into_iter().map(|(_, ride)| ride).collect()
    }
}

impl GeoQuery for ProximityIndex {
    fn nearby(&self, point: GeoPoint, radius_km: f64) -> StoreFuture<'_, Vec<Ride>> {
        Box::pin(async move {
            point.validate()?;
            validate_radius(radius_km)?;

            let candidates = self.store.rides_with_status(&RideStatus::JOINABLE).await?;
            let total = candidates.len();
            let rides = Self::filter(candidates, point, radius_km);

            tracing::debug!(
                lat = point.lat,
                lng = point.lng,
                radius_km,
                candidates = total,
                matches = rides.len(),
                "Nearby ride query"
            );
            Ok(rides)
        })
    }
}
