// Integration tests for the HTTP API

mod common;

use area_engine::api::{create_router, ApiState};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use common::{Harness, LOCKED_ACTION, SLOW_ACTION};
use serde_json::{json, Value};
use tower::ServiceExt;

fn create_test_app(h: &Harness) -> Router {
    create_router(ApiState {
        areas: h.service.clone(),
        tokens: h.tokens.clone(),
        sessions: h.sessions.clone(),
    })
}

fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, value)
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", bearer(token));
    }
    builder.body(Body::empty()).unwrap()
}

fn with_json(method: &str, uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", bearer(token))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn delete(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .header("authorization", bearer(token))
        .body(Body::empty())
        .unwrap()
}

fn area_body(h: &Harness, action: &str) -> Value {
    let new = h.new_area(action, 0);
    json!({
        "title": new.title,
        "action_id": new.action_id,
        "reaction_id": new.reaction_id,
    })
}

/// Area routes reject callers without a session token.
#[tokio::test]
async fn test_areas_require_token() {
    let h = Harness::new();
    let app = create_test_app(&h);

    let (status, body) = send(&app, get("/api/areas", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("Authorization token not provided"));

    let (status, _) = send(&app, get("/api/areas", Some("not-a-jwt"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

/// The catalog is public.
#[tokio::test]
async fn test_list_services() {
    let h = Harness::new();
    let app = create_test_app(&h);

    let (status, body) = send(&app, get("/api/services", None)).await;
    assert_eq!(status, StatusCode::OK);

    let services = body.as_array().unwrap();
    assert_eq!(services.len(), 2);
    assert_eq!(services[1]["name"], "script");
    assert_eq!(services[1]["actions"].as_array().unwrap().len(), 2);
    assert_eq!(services[0]["oauth"], true);
}

/// Create, read, list, update, results and delete an Area over HTTP.
#[tokio::test]
async fn test_area_crud() {
    let h = Harness::new();
    let app = create_test_app(&h);
    let (_, token) = h.user("alice");

    let (status, created) = send(
        &app,
        with_json("POST", "/api/areas", &token, area_body(&h, SLOW_ACTION)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_i64().unwrap();
    assert_eq!(created["enabled"], true);
    assert_eq!(created["cursor"], json!({}));

    let (status, listed) = send(&app, get("/api/areas", Some(token.as_str()))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, view) = send(&app, get(&format!("/api/areas/{}", id), Some(token.as_str()))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["id"], id);
    assert_eq!(view["running"], true);

    let (status, updated) = send(
        &app,
        with_json(
            "PATCH",
            &format!("/api/areas/{}", id),
            &token,
            json!({"enabled": false, "title": "paused"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["enabled"], false);
    assert_eq!(updated["title"], "paused");
    assert!(!h.engine.is_running(id));

    let (status, results) = send(
        &app,
        get(&format!("/api/areas/{}/results", id), Some(token.as_str())),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(results, json!([]));

    let (status, _) = send(&app, delete(&format!("/api/areas/{}", id), &token)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, get(&format!("/api/areas/{}", id), Some(token.as_str()))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// Another user's Area looks like it does not exist.
#[tokio::test]
async fn test_foreign_area_is_not_found() {
    let h = Harness::new();
    let app = create_test_app(&h);
    let (alice, _) = h.user("alice");
    let (_, bob_token) = h.user("bob");

    let area = h.service.create(alice, &h.new_area(SLOW_ACTION, 0)).unwrap();

    let (status, _) = send(&app, get(&format!("/api/areas/{}", area.id), Some(bob_token.as_str()))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, delete(&format!("/api/areas/{}", area.id), &bob_token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(h.engine.is_running(area.id));

    h.engine.shutdown().await;
}

/// Binding an OAuth service the user never connected is a client error.
#[tokio::test]
async fn test_create_with_unconnected_service() {
    let h = Harness::new();
    let app = create_test_app(&h);
    let (_, token) = h.user("alice");

    let (status, body) = send(
        &app,
        with_json("POST", "/api/areas", &token, area_body(&h, LOCKED_ACTION)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("service locked is not connected"));
}

/// A callback without a code fails before touching the provider.
#[tokio::test]
async fn test_callback_without_code() {
    let h = Harness::new();
    let app = create_test_app(&h);
    let state = h.tokens.states().create_state("locked", None);

    let (status, body) = send(
        &app,
        get(
            &format!("/api/services/locked/oauth/callback?state={}", state),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("missing authentication code"));

    // The state was not burned by the rejected request.
    assert_eq!(h.tokens.states().count(), 1);
}

/// A callback with an unknown state is rejected.
#[tokio::test]
async fn test_callback_with_unknown_state() {
    let h = Harness::new();
    let app = create_test_app(&h);

    let (status, body) = send(
        &app,
        get("/api/services/locked/oauth/callback?code=abc&state=forged", None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("OAuth state"));
}

/// Starting OAuth needs a service that uses it and a configured client.
#[tokio::test]
async fn test_oauth_start_errors() {
    let h = Harness::new();
    let app = create_test_app(&h);

    let (status, _) = send(&app, get("/api/services/script/oauth/start", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, get("/api/services/locked/oauth/start", None)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let (status, _) = send(&app, get("/api/services/nope/oauth/start", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// Connected services are listed and can be disconnected.
#[tokio::test]
async fn test_connections() {
    let h = Harness::new();
    let app = create_test_app(&h);
    let (user_id, token) = h.user("alice");

    h.credentials
        .save(
            user_id,
            "locked",
            &area::credentials::Credentials::bearer("token"),
        )
        .unwrap();

    let (status, body) = send(&app, get("/api/me/services", Some(token.as_str()))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["services"], json!(["locked"]));

    let (status, _) = send(&app, delete("/api/services/locked/connection", &token)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, delete("/api/services/locked/connection", &token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
