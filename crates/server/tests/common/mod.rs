// All functions in this module are shared test helpers. Not every test binary
// uses every helper, so we suppress dead_code warnings at the item level.
#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use aegis_server::config::ServerConfig;
use aegis_server::router::build_app_router;
use aegis_server::state::AppState;
use aegis_store::ClientStore;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        data_file: String::new(),
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 75,
    }
}

/// A router wired to a temp-dir-backed store, plus direct store access for
/// tests that mutate behind the API's back.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<ClientStore>,
    _dir: tempfile::TempDir,
}

/// Build the full application router with all middleware layers over a
/// fresh store, so integration tests exercise the same stack production
/// uses.
pub async fn build_test_app() -> TestApp {
    let dir = tempfile::tempdir().expect("create temp dir");
    let store = Arc::new(
        ClientStore::load(dir.path().join("clients.json"))
            .await
            .expect("load empty store"),
    );

    let config = test_config();
    let state = AppState {
        store: Arc::clone(&store),
        config: Arc::new(config.clone()),
    };

    TestApp {
        router: build_app_router(state, &config),
        store,
        _dir: dir,
    }
}

// ---------------------------------------------------------------------------
// Shared HTTP test helpers
// ---------------------------------------------------------------------------

/// Collect the response body into a `serde_json::Value`.
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Collect the raw response body bytes.
pub async fn body_bytes(response: axum::response::Response) -> axum::body::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

/// GET the given URI and return the response.
pub async fn get(app: &Router, uri: &str) -> axum::response::Response {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

/// DELETE the given URI and return the response.
pub async fn delete(app: &Router, uri: &str) -> axum::response::Response {
    let request = Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

/// Send a JSON request with the given HTTP method.
pub async fn send_json(
    app: &Router,
    method: Method,
    uri: &str,
    body: serde_json::Value,
) -> axum::response::Response {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

/// POST JSON to the given URI and return the response.
pub async fn post_json(
    app: &Router,
    uri: &str,
    body: serde_json::Value,
) -> axum::response::Response {
    send_json(app, Method::POST, uri, body).await
}

/// PUT JSON to the given URI and return the response.
pub async fn put_json(
    app: &Router,
    uri: &str,
    body: serde_json::Value,
) -> axum::response::Response {
    send_json(app, Method::PUT, uri, body).await
}

// ---------------------------------------------------------------------------
// Seeding helpers
// ---------------------------------------------------------------------------

/// Create a client through the API and return its id.
pub async fn create_client(app: &Router, name: &str) -> String {
    let response = post_json(app, "/api/clients", serde_json::json!({ "name": name })).await;
    assert_eq!(response.status(), axum::http::StatusCode::OK);
    let json = body_json(response).await;
    json["data"]["id"].as_str().expect("client id").to_string()
}

/// Add a user with an all-week 08:00-20:00 schedule; returns the user id.
pub async fn add_user(app: &Router, client_id: &str, username: &str) -> String {
    let response = post_json(
        app,
        &format!("/api/clients/{client_id}/users"),
        serde_json::json!({
            "name": username,
            "username": username,
            "schedule": all_week_schedule(),
        }),
    )
    .await;
    assert_eq!(response.status(), axum::http::StatusCode::OK);
    let json = body_json(response).await;
    json["data"]["id"].as_str().expect("user id").to_string()
}

/// An 08:00-20:00 window on every day of the week, as the admin UI sends it.
pub fn all_week_schedule() -> serde_json::Value {
    let mut schedule = serde_json::Map::new();
    for day in aegis_core::schedule::DAY_KEYS {
        schedule.insert(
            day.to_string(),
            serde_json::json!([{ "start": "08:00", "end": "20:00" }]),
        );
    }
    serde_json::Value::Object(schedule)
}

/// The client's current config version, read through the preview endpoint.
pub async fn current_version(app: &Router, client_id: &str) -> String {
    let response = get(app, &format!("/api/clients/{client_id}/preview")).await;
    assert_eq!(response.status(), axum::http::StatusCode::OK);
    let json = body_json(response).await;
    json["data"]["version"]
        .as_str()
        .expect("config version")
        .to_string()
}
