//! Boots the configured application from a token table file.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code

use axum::http::{header, HeaderValue, StatusCode};
use axum_test::TestServer;
use rideshare_runtime::metrics::PrometheusMetrics;
use rideshare_server::app::build_state;
use rideshare_server::Config;
use rideshare_testing::fixtures;
use rideshare_web::build_router;
use serde_json::Value;
use std::path::{Path, PathBuf};

const USERS: &str = r#"[
    {"token": "boot-host", "subject_id": "idp|host", "user_id": 1, "roles": ["host"]},
    {"token": "boot-rider", "subject_id": "idp|rider", "user_id": 2, "roles": ["rider"]}
]"#;

fn users_file(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("rideshare-{}-{name}.json", std::process::id()));
    std::fs::write(&path, USERS).unwrap();
    path
}

fn server(users: &Path) -> TestServer {
    let users = users.display().to_string();
    let config = Config::from_lookup(|key| (key == "AUTH_USERS_FILE").then(|| users.clone()));
    let state = build_state(&config, PrometheusMetrics::default()).unwrap();
    TestServer::new(build_router(state)).unwrap()
}

fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {token}")).unwrap()
}

#[tokio::test]
async fn configured_users_drive_the_api() {
    let path = users_file("drive");
    let server = server(&path);

    let created = server
        .post("/api/rides")
        .add_header(header::AUTHORIZATION, bearer("boot-host"))
        .json(&fixtures::new_ride(2))
        .await;
    created.assert_status(StatusCode::CREATED);
    let ride_id = created.json::<Value>()["id"].as_u64().unwrap();

    let joined = server
        .post(&format!("/api/rides/{ride_id}/join"))
        .add_header(header::AUTHORIZATION, bearer("boot-rider"))
        .await;
    joined.assert_status_ok();
    assert_eq!(joined.json::<Value>()["ride"]["status"], "requested");

    server
        .post("/api/rides")
        .add_header(header::AUTHORIZATION, bearer("boot-rider"))
        .json(&fixtures::new_ride(2))
        .await
        .assert_status(StatusCode::FORBIDDEN);

    std::fs::remove_file(path).unwrap();
}

#[tokio::test]
async fn unlisted_token_is_rejected() {
    let path = users_file("reject");
    let server = server(&path);

    server
        .get("/api/rides/mine")
        .add_header(header::AUTHORIZATION, bearer("boot-admin"))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    std::fs::remove_file(path).unwrap();
}
