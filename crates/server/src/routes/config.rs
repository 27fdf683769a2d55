//! The agent-facing config endpoint with long-poll semantics.
//!
//! `GET /api/config?client_id=<id>[&version=<opaque>]`
//!
//! - Missing `client_id` -> 400; unknown client -> 403 (agents must be
//!   registered by the admin first, never auto-created).
//! - No `version`, or a `version` different from the stored one -> the
//!   cached config is returned immediately.
//! - Same `version` -> the request is held until the client's state
//!   changes, the next computed schedule boundary passes, or the hold
//!   ceiling expires -- whichever comes first. If the version still has
//!   not moved, the response is an empty 200 and the agent reconnects.
//!
//! The endpoint never retries internally and updating the advisory
//! last-sent bookkeeping does not touch the version.

use std::collections::BTreeMap;

use aegis_core::{compute_client_config, ClientConfig};
use aegis_store::ClientState;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Duration, Local};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Upper bound of the long-poll wait, in seconds.
const LONG_POLL_TIMEOUT_SECS: i64 = 60;

/// Ceiling that keeps held sockets well under intermediary idle timeouts.
const MAX_LONG_POLL_HOLD_SECS: i64 = 55;

#[derive(Debug, Deserialize)]
pub struct ConfigQuery {
    pub client_id: Option<String>,
    pub version: Option<String>,
}

/// GET /api/config -- serve the client's config, long-polling when the
/// agent is already up to date.
pub async fn serve_config(
    State(state): State<AppState>,
    Query(query): Query<ConfigQuery>,
) -> AppResult<Response> {
    let client_id = query
        .client_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("client_id required".to_string()))?;

    let snapshot = get_registered(&state, &client_id).await?;
    let config = cached_config(&snapshot)?;

    // An agent without a version (first call, old client, curl) or with a
    // stale one gets the cached config immediately.
    let known_version = query.version.unwrap_or_default();
    if known_version.is_empty() || known_version != config.version {
        return Ok(send_config(&state, &client_id, config).await);
    }

    // The agent is current: hold the request. The wake-up deadline is the
    // earliest of the poll timeout, the next computed schedule boundary,
    // and the hold ceiling.
    let now = Local::now();
    let (_, next_change) = compute_client_config(
        now,
        &snapshot.users,
        &snapshot.temp_grants,
        &snapshot.blocks,
        snapshot.version.clone(),
        true,
    );
    let deadline = poll_deadline(now, next_change);

    let mut wakeup = state.store.subscribe(&client_id);

    // A mutation may have landed between the version check and the
    // subscription; re-read once so the signal-after-publish guarantee
    // covers the whole wait.
    let fresh = get_registered(&state, &client_id).await?;
    let fresh_config = cached_config(&fresh)?;
    if fresh_config.version != config.version {
        return Ok(send_config(&state, &client_id, fresh_config).await);
    }

    let wait = (deadline - Local::now())
        .to_std()
        .unwrap_or(std::time::Duration::ZERO);
    tokio::select! {
        // A store signal, or the channel closing because the client was
        // deleted mid-wait; either way we re-read below.
        _ = wakeup.recv() => {}
        // Next-change boundary or hold ceiling.
        () = tokio::time::sleep(wait) => {}
        // Peer disconnects drop this future; no side effect.
    }

    let fresh = get_registered(&state, &client_id).await?;
    let fresh_config = cached_config(&fresh)?;
    if fresh_config.version != config.version {
        return Ok(send_config(&state, &client_id, fresh_config).await);
    }

    // Nothing changed: close empty, the agent reconnects immediately.
    Ok(StatusCode::OK.into_response())
}

/// Fetch a client snapshot, mapping "not registered" to 403.
async fn get_registered(state: &AppState, client_id: &str) -> AppResult<ClientState> {
    state
        .store
        .get(client_id)
        .await?
        .ok_or_else(|| AppError::Forbidden("client not registered".to_string()))
}

/// The cached `(config, version)` pair; its absence after the load
/// migration path is an internal error.
fn cached_config(snapshot: &ClientState) -> AppResult<ClientConfig> {
    snapshot
        .computed_config
        .clone()
        .ok_or_else(|| AppError::Internal("config not computed".to_string()))
}

/// `min(now + 60 s, next_change, now + 55 s)`.
fn poll_deadline(now: DateTime<Local>, next_change: DateTime<Local>) -> DateTime<Local> {
    let mut deadline = now + Duration::seconds(LONG_POLL_TIMEOUT_SECS);
    if next_change < deadline {
        deadline = next_change;
    }
    let ceiling = now + Duration::seconds(MAX_LONG_POLL_HOLD_SECS);
    if deadline > ceiling {
        deadline = ceiling;
    }
    deadline
}

/// Emit a config body and record what this agent observed. The bookkeeping
/// is advisory only and does not alter the version.
async fn send_config(state: &AppState, client_id: &str, config: ClientConfig) -> Response {
    let intervals: BTreeMap<_, _> = config
        .users
        .iter()
        .map(|u| (u.username.clone(), u.allowed_intervals.clone()))
        .collect();
    state.store.update_last_sent(client_id, intervals).await;

    tracing::debug!(
        %client_id,
        version = %config.version,
        users = config.users.len(),
        "Serving config"
    );
    Json(config).into_response()
}
