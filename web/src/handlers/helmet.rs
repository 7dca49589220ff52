//! Helmet verification endpoints.
//!
//! - POST /api/helmet/verify - Record the caller's helmet check for a ride
//! - GET /api/helmet/check/:ride_id - The caller's check for a ride
//! - DELETE /api/helmet/check/:check_id - Remove a check (owner or admin)
//! - GET /api/helmet/user-checks - The caller's checks, newest first
//!
//! The photo itself is uploaded elsewhere; requests carry its URL.

use crate::error::AppError;
use crate::extractors::{AppJson, CurrentUser};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rideshare_core::helmet::{HelmetCheck, HelmetCheckId, NewHelmetCheck};
use rideshare_core::types::RideId;

/// Record a helmet verification.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/helmet/verify \
///   -H "Authorization: Bearer <token>" \
///   -H "Content-Type: application/json" \
///   -d '{"ride_id": 42, "image_url": "/uploads/helmets/3f2c.jpg"}'
/// ```
///
/// # Errors
///
/// - 404 if the ride does not exist
/// - 409 if the caller already verified for this ride
/// - 422 for a blank image URL
pub async fn verify_helmet(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppJson(check): AppJson<NewHelmetCheck>,
) -> Result<(StatusCode, Json<HelmetCheck>), AppError> {
    let stored = state.helmet.verify(&user, check).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

/// The caller's verification for a ride.
///
/// # Errors
///
/// Returns 404 if the caller has none for this ride.
pub async fn helmet_check(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(ride_id): Path<RideId>,
) -> Result<Json<HelmetCheck>, AppError> {
    Ok(Json(state.helmet.check_for(&user, ride_id).await?))
}

/// The caller's verifications, newest first.
///
/// # Errors
///
/// Returns 500 on store failure.
pub async fn user_checks(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<HelmetCheck>>, AppError> {
    Ok(Json(state.helmet.checks_of(&user).await?))
}

/// Remove a verification.
///
/// # Errors
///
/// - 403 unless the caller owns the check or is an admin
/// - 404 if the check does not exist
pub async fn delete_check(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(check_id): Path<HelmetCheckId>,
) -> Result<StatusCode, AppError> {
    state.helmet.delete(&user, check_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
