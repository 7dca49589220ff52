//! Ride control-plane endpoints.
//!
//! - POST /api/rides - Offer a ride (host or admin)
//! - GET /api/rides/nearby - Joinable rides near a point (query string)
//! - POST /api/rides/nearby - Same, JSON body
//! - GET /api/rides/mine - Rides the caller hosts or joined
//! - GET /api/rides/:id - Ride with participants
//! - POST /api/rides/:id/{join,confirm,start,complete,cancel} - Lifecycle steps
//!
//! Every endpoint requires `Authorization: Bearer <credential>`. Lifecycle
//! steps return the ride with its participants after the change.

use crate::error::AppError;
use crate::extractors::{AppJson, AppQuery, CurrentUser};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rideshare_core::types::{GeoPoint, NewRide, Ride, RideId, RideRecord};
use serde::Deserialize;

// ============================================================================
// Request Types
// ============================================================================

/// Nearby search parameters, as query string or JSON body.
#[derive(Debug, Deserialize)]
pub struct NearbyQuery {
    /// Latitude of the search center
    pub lat: f64,
    /// Longitude of the search center
    pub lng: f64,
    /// Search radius in kilometres (server default when omitted)
    pub radius_km: Option<f64>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Offer a new ride.
///
/// The caller becomes the host and must hold the host or admin role.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/rides \
///   -H "Authorization: Bearer <token>" \
///   -H "Content-Type: application/json" \
///   -d '{
///     "title": "Airport run",
///     "start": {"lat": 12.90, "lng": 77.60},
///     "end": {"lat": 13.19, "lng": 77.70},
///     "start_address": "HSR Layout",
///     "end_address": "KIA",
///     "departure_time": "2025-06-01T06:00:00Z",
///     "max_passengers": 2
///   }'
/// ```
///
/// # Errors
///
/// - 400 for a malformed body
/// - 403 if the caller cannot host
/// - 422 for an invalid ride
pub async fn create_ride(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppJson(spec): AppJson<NewRide>,
) -> Result<(StatusCode, Json<Ride>), AppError> {
    let ride = state.controller.create(&user, spec).await?;
    Ok((StatusCode::CREATED, Json(ride)))
}

/// Joinable rides within a radius, via query string.
///
/// ```text
/// GET /api/rides/nearby?lat=12.91&lng=77.61&radius_km=5
/// ```
///
/// # Errors
///
/// Returns 422 for an out-of-range point or a negative radius.
pub async fn nearby_rides(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    AppQuery(query): AppQuery<NearbyQuery>,
) -> Result<Json<Vec<Ride>>, AppError> {
    nearby(&state, &query).await
}

/// Joinable rides within a radius, via JSON body.
///
/// # Errors
///
/// Returns 422 for an out-of-range point or a negative radius.
pub async fn search_nearby(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    AppJson(query): AppJson<NearbyQuery>,
) -> Result<Json<Vec<Ride>>, AppError> {
    nearby(&state, &query).await
}

async fn nearby(state: &AppState, query: &NearbyQuery) -> Result<Json<Vec<Ride>>, AppError> {
    let point = GeoPoint::new(query.lat, query.lng)?;
    let radius_km = query.radius_km.unwrap_or(state.settings.default_radius_km);
    Ok(Json(state.geo.nearby(point, radius_km).await?))
}

/// Rides the caller hosts or has joined, in id order.
///
/// # Errors
///
/// Returns 500 on store failure.
pub async fn my_rides(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<RideRecord>>, AppError> {
    Ok(Json(state.controller.rides_for(&user).await?))
}

/// One ride with its participants.
///
/// # Errors
///
/// Returns 404 if the ride does not exist.
pub async fn get_ride(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(ride_id): Path<RideId>,
) -> Result<Json<RideRecord>, AppError> {
    Ok(Json(state.controller.get(ride_id).await?))
}

/// Ask to join a ride.
///
/// # Errors
///
/// - 404 if the ride does not exist
/// - 409 for self-join, duplicate join, a full ride or a ride past joining
pub async fn join_ride(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(ride_id): Path<RideId>,
) -> Result<Json<RideRecord>, AppError> {
    Ok(Json(state.controller.join(&user, ride_id).await?))
}

/// Confirm the pending riders (host only).
///
/// # Errors
///
/// - 403 if the caller is not the host
/// - 409 unless the ride has pending requests
pub async fn confirm_ride(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(ride_id): Path<RideId>,
) -> Result<Json<RideRecord>, AppError> {
    Ok(Json(state.controller.confirm(&user, ride_id).await?))
}

/// Start a confirmed ride (host only).
///
/// # Errors
///
/// - 403 if the caller is not the host
/// - 409 unless the ride is confirmed
pub async fn start_ride(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(ride_id): Path<RideId>,
) -> Result<Json<RideRecord>, AppError> {
    Ok(Json(state.controller.start(&user, ride_id).await?))
}

/// Complete an ongoing ride (host only).
///
/// # Errors
///
/// - 403 if the caller is not the host
/// - 409 unless the ride is ongoing
pub async fn complete_ride(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(ride_id): Path<RideId>,
) -> Result<Json<RideRecord>, AppError> {
    Ok(Json(state.controller.complete(&user, ride_id).await?))
}

/// Call off a ride (host or admin).
///
/// # Errors
///
/// - 403 if the caller may not cancel
/// - 409 if the ride already finished or was cancelled
pub async fn cancel_ride(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(ride_id): Path<RideId>,
) -> Result<Json<RideRecord>, AppError> {
    Ok(Json(state.controller.cancel(&user, ride_id).await?))
}
