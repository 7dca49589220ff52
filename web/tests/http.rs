//! HTTP API integration tests.
//!
//! Drives the full router (extractors, handlers, error mapping, middleware)
//! against the in-memory services.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code

use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum_test::{TestRequest, TestServer};
use rideshare_core::types::{ParticipantStatus, Ride, RideRecord, RideStatus};
use rideshare_runtime::metrics::PrometheusMetrics;
use rideshare_runtime::InMemoryHelmetCheckStore;
use rideshare_testing::fixtures::{self, ADMIN, ALICE, BOB, HOST};
use rideshare_testing::mocks::{test_clock, InMemoryUserDirectory, StaticAuthenticator};
use rideshare_web::{build_router, AppState, Identity, RealtimeSettings, CORRELATION_ID_HEADER};
use serde_json::{json, Value};
use std::sync::Arc;

const HOST_TOKEN: &str = "t-host";
const ALICE_TOKEN: &str = "t-alice";
const BOB_TOKEN: &str = "t-bob";
const GHOST_TOKEN: &str = "t-ghost";
const ADMIN_TOKEN: &str = "t-admin";

fn identity() -> Identity {
    Identity {
        authenticator: Arc::new(
            StaticAuthenticator::new()
                .with_token(HOST_TOKEN, "sub-host")
                .with_token(ALICE_TOKEN, "sub-alice")
                .with_token(BOB_TOKEN, "sub-bob")
                .with_token(GHOST_TOKEN, "sub-ghost")
                .with_token(ADMIN_TOKEN, "sub-admin"),
        ),
        directory: Arc::new(
            InMemoryUserDirectory::new()
                .with_user("sub-host", fixtures::host(HOST))
                .with_user("sub-alice", fixtures::rider(ALICE))
                .with_user("sub-bob", fixtures::rider(BOB))
                .with_user("sub-admin", fixtures::admin(ADMIN)),
        ),
    }
}

fn server() -> TestServer {
    let state = AppState::in_memory(
        identity(),
        Arc::new(test_clock()),
        PrometheusMetrics::default(),
        RealtimeSettings::default(),
    );
    TestServer::new(build_router(state)).unwrap()
}

fn as_user(request: TestRequest, token: &str) -> TestRequest {
    request.add_header(
        header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    )
}

async fn create_ride(server: &TestServer, seats: u32) -> Ride {
    let response = as_user(server.post("/api/rides"), HOST_TOKEN)
        .json(&fixtures::new_ride(seats))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json::<Ride>()
}

async fn lifecycle(server: &TestServer, ride: &Ride, step: &str, token: &str) -> axum_test::TestResponse {
    as_user(server.post(&format!("/api/rides/{}/{step}", ride.id)), token).await
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn missing_credential_is_unauthorized() {
    let server = server();

    let response = server.get("/api/rides/mine").await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn unknown_token_and_unknown_subject_are_unauthorized() {
    let server = server();

    for token in ["t-nobody", GHOST_TOKEN] {
        as_user(server.get("/api/rides/mine"), token)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }
}

// ============================================================================
// Control plane
// ============================================================================

#[tokio::test]
async fn host_creates_ride() {
    let server = server();

    let ride = create_ride(&server, 2).await;

    assert_eq!(ride.host_id, HOST);
    assert_eq!(ride.status, RideStatus::Created);
    assert_eq!(ride.max_passengers, 2);
}

#[tokio::test]
async fn rider_cannot_create_ride() {
    let server = server();

    let response = as_user(server.post("/api/rides"), ALICE_TOKEN)
        .json(&fixtures::new_ride(2))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(response.json::<Value>()["code"], "FORBIDDEN");
}

#[tokio::test]
async fn invalid_ride_is_unprocessable() {
    let server = server();
    let response = as_user(server.post("/api/rides"), HOST_TOKEN)
        .json(&fixtures::new_ride(0))
        .await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json::<Value>()["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn join_confirm_start_complete() {
    let server = server();
    let ride = create_ride(&server, 1).await;

    let joined = lifecycle(&server, &ride, "join", ALICE_TOKEN).await;
    joined.assert_status_ok();
    let record = joined.json::<RideRecord>();
    assert_eq!(record.ride.status, RideStatus::Requested);
    assert_eq!(record.participants.len(), 1);

    lifecycle(&server, &ride, "join", BOB_TOKEN)
        .await
        .assert_status_ok();

    let confirmed = lifecycle(&server, &ride, "confirm", HOST_TOKEN)
        .await
        .json::<RideRecord>();
    assert_eq!(confirmed.ride.status, RideStatus::Confirmed);
    let statuses: Vec<_> = confirmed
        .participants
        .iter()
        .map(|p| (p.rider_id, p.status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            (ALICE, ParticipantStatus::Confirmed),
            (BOB, ParticipantStatus::Cancelled),
        ]
    );

    let started = lifecycle(&server, &ride, "start", HOST_TOKEN)
        .await
        .json::<RideRecord>();
    assert_eq!(started.ride.status, RideStatus::Ongoing);

    let completed = lifecycle(&server, &ride, "complete", HOST_TOKEN)
        .await
        .json::<RideRecord>();
    assert_eq!(completed.ride.status, RideStatus::Completed);
}

#[tokio::test]
async fn rejected_joins_are_conflicts() {
    let server = server();
    let ride = create_ride(&server, 1).await;

    let self_join = lifecycle(&server, &ride, "join", HOST_TOKEN).await;
    self_join.assert_status(StatusCode::CONFLICT);
    assert_eq!(self_join.json::<Value>()["code"], "CONFLICT");

    lifecycle(&server, &ride, "join", ALICE_TOKEN)
        .await
        .assert_status_ok();
    lifecycle(&server, &ride, "join", ALICE_TOKEN)
        .await
        .assert_status(StatusCode::CONFLICT);

    lifecycle(&server, &ride, "confirm", HOST_TOKEN)
        .await
        .assert_status_ok();
    lifecycle(&server, &ride, "join", BOB_TOKEN)
        .await
        .assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn only_host_drives_lifecycle() {
    let server = server();
    let ride = create_ride(&server, 2).await;
    lifecycle(&server, &ride, "join", ALICE_TOKEN)
        .await
        .assert_status_ok();

    for step in ["confirm", "cancel"] {
        lifecycle(&server, &ride, step, ALICE_TOKEN)
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }
}

#[tokio::test]
async fn out_of_order_step_is_conflict() {
    let server = server();
    let ride = create_ride(&server, 2).await;

    let response = lifecycle(&server, &ride, "start", HOST_TOKEN).await;

    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(response.json::<Value>()["code"], "CONFLICT");
}

#[tokio::test]
async fn cancel_then_cancel_again() {
    let server = server();
    let ride = create_ride(&server, 2).await;
    lifecycle(&server, &ride, "join", ALICE_TOKEN)
        .await
        .assert_status_ok();

    let cancelled = lifecycle(&server, &ride, "cancel", HOST_TOKEN)
        .await
        .json::<RideRecord>();
    assert_eq!(cancelled.ride.status, RideStatus::Cancelled);
    assert!(cancelled
        .participants
        .iter()
        .all(|p| p.status == ParticipantStatus::Cancelled));

    lifecycle(&server, &ride, "cancel", HOST_TOKEN)
        .await
        .assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_ride_is_not_found() {
    let server = server();

    for path in ["/api/rides/404", "/api/rides/404/join"] {
        let request = if path.ends_with("join") {
            server.post(path)
        } else {
            server.get(path)
        };
        let response = as_user(request, ALICE_TOKEN).await;
        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(response.json::<Value>()["code"], "NOT_FOUND");
    }
}

#[tokio::test]
async fn get_ride_includes_participants() {
    let server = server();
    let ride = create_ride(&server, 2).await;
    lifecycle(&server, &ride, "join", BOB_TOKEN)
        .await
        .assert_status_ok();

    let record = as_user(server.get(&format!("/api/rides/{}", ride.id)), ALICE_TOKEN)
        .await
        .json::<RideRecord>();

    assert_eq!(record.ride.id, ride.id);
    assert_eq!(record.participants[0].rider_id, BOB);
}

#[tokio::test]
async fn my_rides_covers_hosted_and_joined() {
    let server = server();
    let first = create_ride(&server, 2).await;
    let second = create_ride(&server, 2).await;
    lifecycle(&server, &second, "join", ALICE_TOKEN)
        .await
        .assert_status_ok();

    let hosted = as_user(server.get("/api/rides/mine"), HOST_TOKEN)
        .await
        .json::<Vec<RideRecord>>();
    let joined = as_user(server.get("/api/rides/mine"), ALICE_TOKEN)
        .await
        .json::<Vec<RideRecord>>();
    let none = as_user(server.get("/api/rides/mine"), BOB_TOKEN)
        .await
        .json::<Vec<RideRecord>>();

    let hosted: Vec<_> = hosted.iter().map(|r| r.ride.id).collect();
    assert_eq!(hosted, vec![first.id, second.id]);
    assert_eq!(joined.len(), 1);
    assert_eq!(joined[0].ride.id, second.id);
    assert!(none.is_empty());
}

// ============================================================================
// Nearby search
// ============================================================================

#[tokio::test]
async fn nearby_by_query_and_body() {
    let server = server();
    let ride = create_ride(&server, 2).await;
    let (lat, lng) = (fixtures::PICKUP.lat + 0.01, fixtures::PICKUP.lng);

    let by_query = as_user(
        server.get(&format!("/api/rides/nearby?lat={lat}&lng={lng}")),
        ALICE_TOKEN,
    )
    .await
    .json::<Vec<Ride>>();
    assert_eq!(by_query.len(), 1);
    assert_eq!(by_query[0].id, ride.id);

    let too_tight = as_user(server.post("/api/rides/nearby"), ALICE_TOKEN)
        .json(&json!({"lat": lat, "lng": lng, "radius_km": 0.1}))
        .await
        .json::<Vec<Ride>>();
    assert!(too_tight.is_empty());
}

#[tokio::test]
async fn nearby_hides_rides_past_joining() {
    let server = server();
    let ride = create_ride(&server, 1).await;
    lifecycle(&server, &ride, "join", ALICE_TOKEN)
        .await
        .assert_status_ok();
    lifecycle(&server, &ride, "confirm", HOST_TOKEN)
        .await
        .assert_status_ok();

    let found = as_user(server.post("/api/rides/nearby"), BOB_TOKEN)
        .json(&json!({"lat": fixtures::PICKUP.lat, "lng": fixtures::PICKUP.lng}))
        .await
        .json::<Vec<Ride>>();

    assert!(found.is_empty());
}

#[tokio::test]
async fn nearby_rejects_bad_coordinates() {
    let server = server();

    let response = as_user(server.get("/api/rides/nearby?lat=91&lng=0"), ALICE_TOKEN).await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    as_user(server.get("/api/rides/nearby?lat=0&lng=0&radius_km=-1"), ALICE_TOKEN)
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

// ============================================================================
// Devices, health, status
// ============================================================================

#[tokio::test]
async fn device_token_lifecycle() {
    let server = server();

    as_user(server.post("/api/devices"), ALICE_TOKEN)
        .json(&json!({"token": "fcm-alice"}))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let removed = as_user(server.delete("/api/devices"), ALICE_TOKEN)
        .await
        .json::<Value>();
    assert_eq!(removed["removed"], true);

    let again = as_user(server.delete("/api/devices"), ALICE_TOKEN)
        .await
        .json::<Value>();
    assert_eq!(again["removed"], false);
}

#[tokio::test]
async fn health_is_public() {
    let server = server();

    let response = server.get("/health").await;

    response.assert_status_ok();
    response.assert_text("ok");
}

#[tokio::test]
async fn metrics_unavailable_without_recorder() {
    let server = server();

    server
        .get("/metrics")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn ws_status_reports_empty_registry() {
    let server = server();

    let stats = server.get("/api/ws/status").await.json::<Value>();

    assert_eq!(stats["active_connections"], 0);
    assert_eq!(stats["total_subscriptions"], 0);
}

#[tokio::test]
async fn responses_carry_correlation_id() {
    let server = server();

    let response = server
        .get("/health")
        .add_header(
            HeaderName::from_static(CORRELATION_ID_HEADER),
            HeaderValue::from_static("trace-me"),
        )
        .await;

    assert_eq!(response.header(CORRELATION_ID_HEADER), "trace-me");
}

// ============================================================================
// Malformed input
// ============================================================================

#[tokio::test]
async fn malformed_bodies_get_error_shape() {
    let server = server();

    let response = as_user(server.post("/api/rides"), HOST_TOKEN)
        .content_type("application/json")
        .bytes("{not json".into())
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "BAD_REQUEST");

    let response = as_user(server.post("/api/devices"), ALICE_TOKEN)
        .json(&json!({"device": "fcm"}))
        .await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json::<Value>()["code"], "VALIDATION_ERROR");

    let response = as_user(server.get("/api/rides/nearby?lat=north&lng=0"), ALICE_TOKEN).await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body = response.json::<Value>();
    assert_eq!(body["code"], "BAD_REQUEST");
    assert!(body["message"].is_string());
}

// ============================================================================
// Helmet checks
// ============================================================================

fn helmet_server() -> TestServer {
    let state = AppState::in_memory(
        identity(),
        Arc::new(test_clock()),
        PrometheusMetrics::default(),
        RealtimeSettings::default(),
    )
    .with_helmet_checks(Arc::new(InMemoryHelmetCheckStore::new()));
    TestServer::new(build_router(state)).unwrap()
}

async fn verify_helmet(server: &TestServer, ride: &Ride, token: &str) -> axum_test::TestResponse {
    as_user(server.post("/api/helmet/verify"), token)
        .json(&json!({"ride_id": ride.id, "image_url": format!("/uploads/helmets/{}.jpg", ride.id)}))
        .await
}

#[tokio::test]
async fn helmet_check_once_per_ride() {
    let server = helmet_server();
    let ride = create_ride(&server, 2).await;

    let response = verify_helmet(&server, &ride, ALICE_TOKEN).await;
    response.assert_status(StatusCode::CREATED);
    let check = response.json::<Value>();
    assert_eq!(check["user_id"], json!(ALICE));
    assert_eq!(check["is_verified"], true);

    let again = verify_helmet(&server, &ride, ALICE_TOKEN).await;
    again.assert_status(StatusCode::CONFLICT);
    assert_eq!(again.json::<Value>()["code"], "CONFLICT");

    verify_helmet(&server, &ride, BOB_TOKEN)
        .await
        .assert_status(StatusCode::CREATED);

    let fetched = as_user(server.get(&format!("/api/helmet/check/{}", ride.id)), ALICE_TOKEN)
        .await
        .json::<Value>();
    assert_eq!(fetched["id"], check["id"]);
}

#[tokio::test]
async fn helmet_check_rejects_unknown_ride_and_blank_image() {
    let server = helmet_server();
    let ride = create_ride(&server, 1).await;

    as_user(server.post("/api/helmet/verify"), ALICE_TOKEN)
        .json(&json!({"ride_id": 999, "image_url": "/uploads/helmets/x.jpg"}))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    as_user(server.post("/api/helmet/verify"), ALICE_TOKEN)
        .json(&json!({"ride_id": ride.id, "image_url": " "}))
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    as_user(server.get(&format!("/api/helmet/check/{}", ride.id)), ALICE_TOKEN)
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn user_checks_are_newest_first() {
    let server = helmet_server();
    let first = create_ride(&server, 1).await;
    let second = create_ride(&server, 1).await;
    verify_helmet(&server, &first, ALICE_TOKEN).await;
    verify_helmet(&server, &second, ALICE_TOKEN).await;
    verify_helmet(&server, &first, BOB_TOKEN).await;

    let checks = as_user(server.get("/api/helmet/user-checks"), ALICE_TOKEN)
        .await
        .json::<Vec<Value>>();

    let rides: Vec<Value> = checks.iter().map(|c| c["ride_id"].clone()).collect();
    assert_eq!(rides, vec![json!(second.id), json!(first.id)]);
}

#[tokio::test]
async fn only_owner_or_admin_deletes_helmet_check() {
    let server = helmet_server();
    let ride = create_ride(&server, 1).await;
    let alice_check = verify_helmet(&server, &ride, ALICE_TOKEN).await.json::<Value>();
    let bob_check = verify_helmet(&server, &ride, BOB_TOKEN).await.json::<Value>();

    let alice_path = format!("/api/helmet/check/{}", alice_check["id"]);
    let bob_path = format!("/api/helmet/check/{}", bob_check["id"]);

    as_user(server.delete(&alice_path), BOB_TOKEN)
        .await
        .assert_status(StatusCode::FORBIDDEN);
    as_user(server.delete(&alice_path), ALICE_TOKEN)
        .await
        .assert_status(StatusCode::NO_CONTENT);
    as_user(server.delete(&bob_path), ADMIN_TOKEN)
        .await
        .assert_status(StatusCode::NO_CONTENT);
    as_user(server.delete(&bob_path), ADMIN_TOKEN)
        .await
        .assert_status(StatusCode::NOT_FOUND);
}
