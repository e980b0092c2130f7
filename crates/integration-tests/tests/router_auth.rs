//! Authentication and capability checks, driven through the full router.
//!
//! The app runs in-process on a pool that never connects, so only requests
//! rejected before any query are exercised here.

#![allow(clippy::unwrap_used)]

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use freshmilk_api::services::auth::jwt::TokenType;
use freshmilk_integration_tests::{test_app, token_for};
use serde_json::Value;
use tower::ServiceExt;

async fn send(request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = test_app().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn get_with_auth(uri: &str, authorization: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, authorization)
        .body(Body::empty())
        .unwrap()
}

fn error_message(body: &[u8]) -> String {
    let json: Value = serde_json::from_slice(body).unwrap();
    json["error"].as_str().unwrap_or_default().to_owned()
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_is_ok() {
    let (status, body) = send(get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
}

#[tokio::test]
async fn test_readiness_reports_unreachable_database() {
    let (status, _) = send(get("/health/ready")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

// ============================================================================
// Customer routes
// ============================================================================

#[tokio::test]
async fn test_profile_requires_login() {
    let (status, body) = send(get("/api/v1/users/me")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_message(&body), "身份认证信息未提供");
}

#[tokio::test]
async fn test_garbage_token_is_rejected() {
    let (status, body) = send(get_with_auth("/api/v1/users/me", "Bearer not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(!error_message(&body).is_empty());
}

#[tokio::test]
async fn test_non_bearer_scheme_is_rejected() {
    let (status, _) = send(get_with_auth("/api/v1/users/me", "Basic dXNlcjpwYXNz")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_token_cannot_authenticate() {
    let refresh = token_for(1, TokenType::Refresh);
    let (status, _) = send(get_with_auth(
        "/api/v1/users/me",
        &format!("Bearer {refresh}"),
    ))
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_bad_token_rejected_even_on_public_routes() {
    let (status, _) = send(get_with_auth("/api/v1/products", "Bearer not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Admin routes
// ============================================================================

#[tokio::test]
async fn test_admin_routes_require_login() {
    for uri in [
        "/api/v1/admin/users",
        "/api/v1/admin/orders",
        "/api/v1/admin/statistics/dashboard",
        "/api/v1/express/admin/companies",
        "/api/v1/express/admin/pickup-times",
    ] {
        let (status, _) = send(get(uri)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
    }
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let (status, _) = send(get("/no-such-page")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
