//! Router-level tests: authentication is enforced before the upgrade and
//! rejected requests leave the connection registry untouched.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;

use chathub_api::http::create_router;
use chathub_core::auth::JwtService;
use chathub_core::models::UserId;
use chathub_fanout::{MessagePublisher, RoomHub};

const TEST_SECRET: &[u8] = b"test-secret";

fn test_app() -> (Router, Arc<RoomHub>, JwtService) {
    let hub = Arc::new(RoomHub::new());
    let publisher = Arc::new(
        MessagePublisher::new("127.0.0.1:9092", "messages").expect("create publisher"),
    );
    let jwt_service = JwtService::new(TEST_SECRET);
    let router = create_router(hub.clone(), publisher, jwt_service.clone());
    (router, hub, jwt_service)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("build request")
}

#[tokio::test]
async fn health_check_responds_ok() {
    let (app, _, _) = test_app();

    let response = app.oneshot(get("/health")).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.expect("body").to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).expect("json body");
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn upgrade_without_token_is_unauthorized() {
    let (app, hub, _) = test_app();

    let response = app.oneshot(get("/ws/r1")).await.expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(hub.connection_count(), 0);
    assert_eq!(hub.room_count(), 0);
}

#[tokio::test]
async fn upgrade_with_malformed_token_is_unauthorized() {
    let (app, hub, _) = test_app();

    let response = app
        .oneshot(get("/ws/r1?token=not-a-jwt"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(hub.connection_count(), 0);
}

#[tokio::test]
async fn upgrade_with_expired_token_is_unauthorized() {
    let (app, hub, jwt_service) = test_app();

    let token = jwt_service
        .sign_token(
            &UserId::from_string("u1".to_string()),
            "alice",
            chrono::Duration::seconds(-120),
        )
        .expect("sign token");

    let response = app
        .oneshot(get(&format!("/ws/r1?token={token}")))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(hub.connection_count(), 0);
}

#[tokio::test]
async fn upgrade_with_foreign_signature_is_unauthorized() {
    let (app, hub, _) = test_app();

    let other = JwtService::new(b"some-other-secret");
    let token = other
        .sign_token(
            &UserId::from_string("u1".to_string()),
            "mallory",
            chrono::Duration::hours(1),
        )
        .expect("sign token");

    let response = app
        .oneshot(get(&format!("/ws/r1?token={token}")))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(hub.connection_count(), 0);
}

#[tokio::test]
async fn valid_token_passes_auth_but_plain_get_cannot_upgrade() {
    let (app, hub, jwt_service) = test_app();

    let token = jwt_service
        .sign_token(
            &UserId::from_string("u1".to_string()),
            "alice",
            chrono::Duration::hours(1),
        )
        .expect("sign token");

    // Not a websocket handshake, so the upgrade extractor rejects it, but
    // authentication must already have passed (anything but 401).
    let response = app
        .oneshot(get(&format!("/ws/r1?token={token}")))
        .await
        .expect("response");
    assert_ne!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.status().is_client_error());
    assert_eq!(hub.connection_count(), 0);
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let (app, _, _) = test_app();

    let response = app.oneshot(get("/ws")).await.expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
