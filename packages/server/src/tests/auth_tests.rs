use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::json;

use super::api_tests::{send, test_app, test_settings};

fn containers_request(auth: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri("/containers");
    if let Some(value) = auth {
        builder = builder.header("authorization", value);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let app = test_app(test_settings(Some("secret")));
    let (status, body) = send(&app, containers_request(None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_wrong_token_is_unauthorized() {
    let app = test_app(test_settings(Some("secret")));
    let (status, _) = send(&app, containers_request(Some("Bearer nope"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, containers_request(Some("secret"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_valid_token_is_accepted() {
    let app = test_app(test_settings(Some("secret")));
    let (status, body) = send(&app, containers_request(Some("Bearer secret"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));
}

#[tokio::test]
async fn test_health_endpoints_skip_auth() {
    let app = test_app(test_settings(Some("secret")));
    for path in ["/healthz", "/health"] {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK, "{}", path);
    }
}

#[tokio::test]
async fn test_no_configured_token_allows_everything() {
    let app = test_app(test_settings(None));
    let (status, _) = send(&app, containers_request(None)).await;
    assert_eq!(status, StatusCode::OK);
}
