//! Router configuration for the ride coordination service.

use crate::handlers::{devices, health, helmet, rides, websocket};
use crate::middleware::with_request_tracking;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

/// Build the complete Axum router.
///
/// Configures:
/// - Health and metrics (no authentication)
/// - Ride control plane under `/api/rides`
/// - Helmet verification under `/api/helmet`
/// - Push device registration under `/api/devices`
/// - The real-time channel under `/api/ws`
///
/// Every route gets a correlation id and a request span.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Rides
        .route("/rides", post(rides::create_ride))
        .route(
            "/rides/nearby",
            get(rides::nearby_rides).post(rides::search_nearby),
        )
        .route("/rides/mine", get(rides::my_rides))
        .route("/rides/:id", get(rides::get_ride))
        .route("/rides/:id/join", post(rides::join_ride))
        .route("/rides/:id/confirm", post(rides::confirm_ride))
        .route("/rides/:id/start", post(rides::start_ride))
        .route("/rides/:id/complete", post(rides::complete_ride))
        .route("/rides/:id/cancel", post(rides::cancel_ride))
        // Helmet checks; the path segment is a ride id for GET and a check id for DELETE
        .route("/helmet/verify", post(helmet::verify_helmet))
        .route(
            "/helmet/check/:id",
            get(helmet::helmet_check).delete(helmet::delete_check),
        )
        .route("/helmet/user-checks", get(helmet::user_checks))
        // Push devices
        .route(
            "/devices",
            post(devices::register_device).delete(devices::unregister_device),
        )
        // Real-time channel
        .route("/ws/status", get(websocket::connection_status))
        .route("/ws/:credential", get(websocket::ride_updates));

    let router = Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics))
        .nest("/api", api_routes)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    with_request_tracking(router)
}
