mod common;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use availability_cell::handlers::AvailabilityState;
use availability_cell::router::availability_routes;
use common::{harness, FakeCalendar};
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

fn app() -> (Router, TestConfig) {
    let test_config = TestConfig::default();
    let h = harness(FakeCalendar::empty());
    let state = Arc::new(AvailabilityState {
        config: test_config.to_arc(),
        slots: Arc::new(h.slots),
    });
    (availability_routes(state), test_config)
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn slot_body(start: &str, end: &str) -> String {
    json!({
        "date": (Utc::now() + Duration::days(2)).format("%Y-%m-%d").to_string(),
        "start_time": start,
        "end_time": end,
        "timezone": "Asia/Kolkata",
        "status": "available_online"
    })
    .to_string()
}

#[tokio::test]
async fn test_create_slot_requires_authentication() {
    let (app, _) = app();
    let partner = TestUser::partner("partner@example.com");

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/partners/{}/slots", partner.id))
                .header("content-type", "application/json")
                .body(Body::from(slot_body("10:00", "11:00")))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_partner_creates_publishes_and_client_sees_slot() {
    let (app, config) = app();
    let partner = TestUser::partner("partner@example.com");
    let token = JwtTestUtils::create_test_token(&partner, &config.jwt_secret, Some(1));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/partners/{}/slots", partner.id))
                .header("content-type", "application/json")
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::from(slot_body("10:00", "11:00")))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created = body_json(response).await;
    assert_eq!(created["slot"]["is_published"], false);
    assert_eq!(created["slot"]["timezone"], "Asia/Kolkata");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/partners/{}/slots/publish", partner.id))
                .header("content-type", "application/json")
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["published"], 1);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/partners/{}/slots", partner.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listing = body_json(response).await;
    assert_eq!(listing["total"], 1);
    assert_eq!(listing["slots"][0]["local_start_time"], "10:00");
}

#[tokio::test]
async fn test_invalid_timezone_is_a_bad_request() {
    let (app, config) = app();
    let partner = TestUser::partner("partner@example.com");
    let token = JwtTestUtils::create_test_token(&partner, &config.jwt_secret, Some(1));

    let body = json!({
        "date": "2030-01-01",
        "start_time": "10:00",
        "end_time": "11:00",
        "timezone": "Not/AZone",
        "status": "available_online"
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/partners/{}/slots", partner.id))
                .header("content-type", "application/json")
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error = body_json(response).await;
    assert!(error["error"].as_str().unwrap().contains("Not/AZone"));
}
