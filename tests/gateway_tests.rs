//! HTTP gateway tests driving the router directly.

#![cfg(feature = "server")]

mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::*;
use license_gateway::config::ForceMode;
use license_gateway::server::{build_router, AppState};

const KEY: &str = "38b1460a-5104-4067-a91d-77b872934d51";

async fn gateway(mock: &MockRemote) -> Router {
    let url = spawn_mock_remote(mock.clone()).await;
    let orch = orchestrator_with_force(&url, memory_store(), ForceMode::Sentinel);
    build_router(AppState::new(orch))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn deactivated_ok() -> Value {
    json!({ "deactivated": true, "error": null, "license_key": null, "meta": null })
}

#[tokio::test]
async fn check_activates_and_returns_verdict() {
    let mock = MockRemote::default();
    mock.respond_json("activate", StatusCode::OK, activate_ok(KEY, "abc", "active", None));
    let app = gateway(&mock).await;

    let (status, body) = send(
        &app,
        post_json("/api/check", json!({ "license_key": KEY, "instance_name": "host-1" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["premium"], true);
    assert_eq!(body["instance_id"], "abc");
    assert_eq!(body["expires_at"], "");
    assert!(body.get("error").is_none());
    assert_eq!(mock.last_call("activate").unwrap().form["instance_name"], "host-1");
}

#[tokio::test]
async fn check_reports_remote_failure_in_verdict() {
    let mock = MockRemote::default();
    mock.respond_json(
        "activate",
        StatusCode::NOT_FOUND,
        json!({ "error": "license_key not found." }),
    );
    let app = gateway(&mock).await;

    let (status, body) = send(&app, post_json("/api/check", json!({ "license_key": KEY }))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["premium"], false);
    assert_eq!(body["error"], "activation failed: license_key not found.");
}

#[tokio::test]
async fn check_with_force_uses_sentinel_instance() {
    let mock = MockRemote::default();
    mock.respond_json(
        "validate",
        StatusCode::NOT_FOUND,
        validate_invalid("license_key not found."),
    );
    let app = gateway(&mock).await;

    let (status, body) = send(
        &app,
        post_json("/api/check?force=true", json!({ "license_key": KEY })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["premium"], false);
    assert_eq!(mock.ops(), vec!["validate"]);
    assert_eq!(
        mock.last_call("validate").unwrap().form["instance_id"],
        "invalid-instance-id"
    );
}

#[tokio::test]
async fn force_other_than_true_is_a_normal_check() {
    let mock = MockRemote::default();
    mock.respond_json("activate", StatusCode::OK, activate_ok(KEY, "abc", "active", None));
    let app = gateway(&mock).await;

    send(
        &app,
        post_json("/api/check?force=1", json!({ "license_key": KEY })),
    )
    .await;

    assert_eq!(mock.ops(), vec!["activate"]);
}

#[tokio::test]
async fn check_rejects_missing_license_key() {
    let mock = MockRemote::default();
    let app = gateway(&mock).await;

    let (status, body) = send(&app, post_json("/api/check", json!({ "license_key": "  " }))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "MISSING_FIELD");
    assert!(mock.ops().is_empty());
}

#[tokio::test]
async fn check_rejects_undecodable_body() {
    let mock = MockRemote::default();
    let app = gateway(&mock).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/check")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");
    assert!(mock.ops().is_empty());
}

#[tokio::test]
async fn license_endpoint_follows_activation_lifecycle() {
    let mock = MockRemote::default();
    mock.respond_json("activate", StatusCode::OK, activate_ok(KEY, "abc", "active", None));
    mock.respond_json("deactivate", StatusCode::OK, deactivated_ok());
    let app = gateway(&mock).await;

    let (status, body) = send(&app, get("/api/license")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "LICENSE_NOT_FOUND");

    send(&app, post_json("/api/check", json!({ "license_key": KEY }))).await;

    let (status, body) = send(&app, get("/api/license")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["key"], KEY);

    let (status, body) = send(
        &app,
        post_json("/api/deactivate", json!({ "license_key": KEY })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deactivated"], true);
    assert_eq!(mock.last_call("deactivate").unwrap().form["instance_id"], "abc");

    let (status, _) = send(&app, get("/api/license")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deactivate_without_instance_is_bad_request() {
    let mock = MockRemote::default();
    let app = gateway(&mock).await;

    let (status, body) = send(
        &app,
        post_json("/api/deactivate", json!({ "license_key": KEY })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "NO_STORED_INSTANCE");
    assert!(mock.ops().is_empty());
}

#[tokio::test]
async fn deactivate_refused_by_remote_is_reported() {
    let mock = MockRemote::default();
    mock.respond_json("activate", StatusCode::OK, activate_ok(KEY, "abc", "active", None));
    mock.respond_json(
        "deactivate",
        StatusCode::NOT_FOUND,
        json!({ "deactivated": false, "error": "instance_id not found." }),
    );
    let app = gateway(&mock).await;

    send(&app, post_json("/api/check", json!({ "license_key": KEY }))).await;
    let (status, body) = send(
        &app,
        post_json("/api/deactivate", json!({ "license_key": KEY })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "REMOTE_REJECTED");
    assert_eq!(
        body["error"]["message"],
        "failed to deactivate: instance_id not found."
    );

    // Records survive a refused deactivation.
    let (status, _) = send(&app, get("/api/license")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn health_reports_activation_state_and_request_id() {
    let mock = MockRemote::default();
    mock.respond_json("activate", StatusCode::OK, activate_ok(KEY, "abc", "active", None));
    let app = gateway(&mock).await;

    let response = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "license-gateway");
    assert_eq!(body["activated"], false);

    send(&app, post_json("/api/check", json!({ "license_key": KEY }))).await;

    let (_, body) = send(&app, get("/health")).await;
    assert_eq!(body["activated"], true);
}
