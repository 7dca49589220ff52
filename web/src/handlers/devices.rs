//! Push device registration.
//!
//! - POST /api/devices - Store the caller's push token
//! - DELETE /api/devices - Forget it

use crate::error::AppError;
use crate::extractors::{AppJson, CurrentUser};
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

/// Request to register a push token.
#[derive(Debug, Deserialize)]
pub struct RegisterDeviceRequest {
    /// Token issued by the mobile push service
    pub token: String,
}

/// Result of removing a push token.
#[derive(Debug, Serialize, Deserialize)]
pub struct UnregisterDeviceResponse {
    /// Whether a token was stored
    pub removed: bool,
}

/// Registers (or replaces) the caller's push token.
///
/// # Errors
///
/// Returns 422 for an empty token.
pub async fn register_device(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppJson(request): AppJson<RegisterDeviceRequest>,
) -> Result<StatusCode, AppError> {
    state.devices.register(user.id, request.token).await?;
    tracing::info!(user_id = %user.id, "Push token registered");
    Ok(StatusCode::NO_CONTENT)
}

/// Removes the caller's push token.
///
/// # Errors
///
/// Returns 500 on registry failure.
pub async fn unregister_device(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<UnregisterDeviceResponse>, AppError> {
    let removed = state.devices.unregister(user.id).await?;
    Ok(Json(UnregisterDeviceResponse { removed }))
}
