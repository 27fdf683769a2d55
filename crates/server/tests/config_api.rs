//! Integration tests for the agent-facing config endpoint: immediate
//! responses, long-poll wake-ups, boundary-driven deadlines, and the empty
//! timeout close.

mod common;

use axum::http::StatusCode;
use common::{body_bytes, body_json, build_test_app, get};

// ---------------------------------------------------------------------------
// Immediate responses
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_client_id_returns_400() {
    let app = build_test_app().await;
    let response = get(&app.router, "/api/config").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_client_returns_403() {
    let app = build_test_app().await;
    let response = get(&app.router, "/api/config?client_id=ghost").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn first_call_without_version_returns_config_immediately() {
    let app = build_test_app().await;
    let client_id = common::create_client(&app.router, "Kids PC").await;
    common::add_user(&app.router, &client_id, "alice").await;

    let response = get(&app.router, &format!("/api/config?client_id={client_id}")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["users"][0]["username"], "alice");
    assert!(json["users"][0]["allowed_intervals"].is_array());
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn stale_version_returns_config_immediately() {
    let app = build_test_app().await;
    let client_id = common::create_client(&app.router, "Kids PC").await;
    common::add_user(&app.router, &client_id, "alice").await;

    let response = get(
        &app.router,
        &format!("/api/config?client_id={client_id}&version=stale"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert!(json["version"].is_string());
    assert_ne!(json["version"], "stale");
}

#[tokio::test]
async fn empty_version_parameter_counts_as_absent() {
    let app = build_test_app().await;
    let client_id = common::create_client(&app.router, "Kids PC").await;

    let response = get(
        &app.router,
        &format!("/api/config?client_id={client_id}&version="),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn repeated_calls_at_the_same_state_return_the_same_body() {
    let app = build_test_app().await;
    let client_id = common::create_client(&app.router, "Kids PC").await;
    common::add_user(&app.router, &client_id, "alice").await;

    let uri = format!("/api/config?client_id={client_id}");
    let first = body_bytes(get(&app.router, &uri).await).await;
    let second = body_bytes(get(&app.router, &uri).await).await;
    assert_eq!(first, second);
}

// ---------------------------------------------------------------------------
// Long-poll behaviour
// ---------------------------------------------------------------------------

#[tokio::test]
async fn long_poll_wakes_when_the_admin_mutates() {
    let app = build_test_app().await;
    let client_id = common::create_client(&app.router, "Kids PC").await;
    common::add_user(&app.router, &client_id, "alice").await;

    let version = common::current_version(&app.router, &client_id).await;
    let uri = format!("/api/config?client_id={client_id}&version={version}");

    let store = std::sync::Arc::clone(&app.store);
    let bump_id = client_id.clone();
    let bumper = async move {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        store.bump_version(&bump_id).await.expect("bump");
    };

    let (response, ()) = tokio::join!(
        tokio::time::timeout(std::time::Duration::from_secs(10), get(&app.router, &uri)),
        bumper,
    );
    let response = response.expect("long-poll must wake well before its ceiling");

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["version"].is_string());
    assert_ne!(json["version"].as_str().unwrap(), version);
}

#[tokio::test]
async fn long_poll_returns_403_when_client_is_deleted_mid_wait() {
    let app = build_test_app().await;
    let client_id = common::create_client(&app.router, "Kids PC").await;

    let version = common::current_version(&app.router, &client_id).await;
    let uri = format!("/api/config?client_id={client_id}&version={version}");

    let store = std::sync::Arc::clone(&app.store);
    let delete_id = client_id.clone();
    let deleter = async move {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        store.delete(&delete_id).await.expect("delete");
    };

    let (response, ()) = tokio::join!(
        tokio::time::timeout(std::time::Duration::from_secs(10), get(&app.router, &uri)),
        deleter,
    );
    let response = response.expect("channel close must wake the waiter");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test(start_paused = true)]
async fn long_poll_times_out_with_an_empty_body() {
    let app = build_test_app().await;
    // No users: the next-change boundary is 48 h away, so the 55 s hold
    // ceiling is the binding deadline.
    let client_id = common::create_client(&app.router, "Kids PC").await;
    let version = common::current_version(&app.router, &client_id).await;

    let started = tokio::time::Instant::now();
    let response = get(
        &app.router,
        &format!("/api/config?client_id={client_id}&version={version}"),
    )
    .await;
    let elapsed = started.elapsed();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_bytes(response).await.is_empty(), "timeout closes empty");
    assert!(
        elapsed >= std::time::Duration::from_secs(50),
        "held close to the 55 s ceiling, got {elapsed:?}"
    );
    assert!(elapsed <= std::time::Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn long_poll_wakes_at_the_next_change_boundary() {
    let app = build_test_app().await;
    let client_id = common::create_client(&app.router, "Kids PC").await;

    // A user with no schedule plus a grant that expires in ~20 s: the
    // grant's end is the next-change boundary, well under the 55 s ceiling.
    let user_id = {
        let response = common::post_json(
            &app.router,
            &format!("/api/clients/{client_id}/users"),
            serde_json::json!({ "name": "alice", "username": "alice", "schedule": {} }),
        )
        .await;
        body_json(response).await["data"]["id"]
            .as_str()
            .unwrap()
            .to_string()
    };
    app.store
        .grant_temp(
            &client_id,
            &user_id,
            chrono::Local::now() + chrono::Duration::seconds(20),
        )
        .await
        .expect("grant");
    app.store.bump_version(&client_id).await.expect("bump");

    let version = common::current_version(&app.router, &client_id).await;

    let started = tokio::time::Instant::now();
    let response = get(
        &app.router,
        &format!("/api/config?client_id={client_id}&version={version}"),
    )
    .await;
    let elapsed = started.elapsed();

    // No admin change happened, so the wake produces an empty close -- but
    // at the boundary, not at the hold ceiling.
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_bytes(response).await.is_empty());
    assert!(
        elapsed <= std::time::Duration::from_secs(30),
        "woke at the grant-end boundary, got {elapsed:?}"
    );
}
