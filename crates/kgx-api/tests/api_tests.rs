//! API Integration Tests
//!
//! Run against `create_router_for_testing`, whose collaborators are
//! in-process stubs.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
};
use kgx_api::create_router_for_testing;
use serde_json::{json, Value};
use tower::ServiceExt;

/// Helper to create a test request
fn create_json_request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");

    match body {
        Some(json_body) => builder
            .body(Body::from(serde_json::to_string(&json_body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_text(response: Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

// =============================================================================
// Health Check Tests
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let app = create_router_for_testing();

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_openapi_document() {
    let app = create_router_for_testing();

    let response = app.oneshot(get("/api-docs/openapi.json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert!(json["paths"]["/"].is_object());
    assert!(json["paths"]["/api/v1/extract"].is_object());
}

// =============================================================================
// GET / Tests
// =============================================================================

#[tokio::test]
async fn test_extract_with_coreference() {
    let app = create_router_for_testing();

    let response = app
        .oneshot(get("/?text=Alice%20founded%20Acme.%20She%20is%20the%20CEO."))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(
        json,
        json!({
            "entities": [
                {"title": "Acme Corporation", "id": "Q3", "label": "Organization"},
                {"title": "Alice", "id": "Q1", "label": "Person"}
            ],
            "relations": [
                {"source": "Q1", "target": "Q3", "type": "founder of"}
            ]
        })
    );
}

#[tokio::test]
async fn test_extract_relation_threshold_is_exclusive() {
    let app = create_router_for_testing();

    let response = app
        .oneshot(get("/?text=Alice%20founded%20Acme.&relation_threshold=0.9"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["entities"].as_array().unwrap().len(), 2);
    assert!(json["relations"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_extract_without_entities() {
    let app = create_router_for_testing();

    let response = app.oneshot(get("/?text=Nothing%20here.")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json, json!({"entities": [], "relations": []}));
}

#[tokio::test]
async fn test_missing_text() {
    let app = create_router_for_testing();

    let response = app.oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(response).await, "Missing text parameter");
}

#[tokio::test]
async fn test_invalid_parameters() {
    for uri in [
        "/?text=Alice&entities_threshold=high",
        "/?text=Alice&relation_threshold=-0.1",
        "/?text=Alice&coref=maybe",
    ] {
        let app = create_router_for_testing();
        let response = app.oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
    }
}

#[tokio::test]
async fn test_pipeline_failure_is_generic() {
    let app = create_router_for_testing();

    let response = app
        .oneshot(get("/?text=Alice%20founded%20Acme.%20Explode%20now."))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_text(response).await, "Extraction failed");
}

// =============================================================================
// POST /api/v1/extract Tests
// =============================================================================

#[tokio::test]
async fn test_extract_json_without_coreference() {
    let app = create_router_for_testing();

    let response = app
        .oneshot(create_json_request(
            "POST",
            "/api/v1/extract",
            Some(json!({
                "text": "Bob met Alice. She founded Acme.",
                "coref": false
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    // Without rewriting, the second sentence has no founder to pair with Acme
    assert_eq!(json["entities"].as_array().unwrap().len(), 3);
    assert!(json["relations"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_extract_json_empty_text() {
    let app = create_router_for_testing();

    let response = app
        .oneshot(create_json_request(
            "POST",
            "/api/v1/extract",
            Some(json!({"text": "   "})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
