//! The admin REST surface: clients, users, schedules, temporary access,
//! and blocks.
//!
//! Input is validated up front (malformed schedules and non-positive
//! durations are refused with a user-visible message) and every mutating
//! endpoint finishes by rotating the client's config version, which wakes
//! any held long-poll.

use aegis_core::config::{Block, TempGrant, User};
use aegis_core::schedule::validate_week_schedule;
use aegis_core::{ClientConfig, WeekSchedule};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{Duration, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Clients
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ClientInfo {
    pub id: String,
    pub name: String,
}

/// GET /api/clients -- shallow list of all clients.
pub async fn list_clients(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let clients: Vec<ClientInfo> = state
        .store
        .list()
        .await
        .into_iter()
        .map(|c| ClientInfo {
            id: c.id,
            name: c.name,
        })
        .collect();

    Ok(Json(DataResponse { data: clients }))
}

#[derive(Debug, Deserialize)]
pub struct CreateClientRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub id: String,
}

/// POST /api/clients -- register a new managed computer.
pub async fn create_client(
    State(state): State<AppState>,
    Json(input): Json<CreateClientRequest>,
) -> AppResult<impl IntoResponse> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("name must not be empty".to_string()));
    }

    let id = Uuid::new_v4().to_string();
    state
        .store
        .save(aegis_store::ClientState::new(&id, name))
        .await?;

    tracing::info!(client_id = %id, name, "Client created");
    Ok(Json(DataResponse {
        data: CreatedResponse { id },
    }))
}

#[derive(Debug, Serialize)]
pub struct ClientDetail {
    pub id: String,
    pub name: String,
    pub users: Vec<User>,
    pub block_requests: Vec<Block>,
    pub temporary_access_requests: Vec<TempGrant>,
}

/// GET /api/clients/{id} -- full client state for the admin UI.
pub async fn get_client(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let snapshot = require_client(&state, &client_id).await?;

    Ok(Json(DataResponse {
        data: ClientDetail {
            id: snapshot.id,
            name: snapshot.name,
            users: snapshot.users,
            block_requests: snapshot.blocks,
            temporary_access_requests: snapshot.temp_grants,
        },
    }))
}

/// GET /api/clients/{id}/preview -- the cached config exactly as an agent
/// would receive it.
pub async fn preview_client(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let snapshot = require_client(&state, &client_id).await?;
    let config: ClientConfig = snapshot
        .computed_config
        .ok_or_else(|| AppError::Internal("config not computed".to_string()))?;

    Ok(Json(DataResponse { data: config }))
}

/// DELETE /api/clients/{id} -- remove a client and everything under it.
pub async fn delete_client(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.store.delete(&client_id).await?;
    Ok(StatusCode::OK)
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AddUserRequest {
    pub name: String,
    pub username: String,
    #[serde(default)]
    pub schedule: WeekSchedule,
}

/// POST /api/clients/{id}/users -- add a controlled user account.
pub async fn add_user(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    Json(input): Json<AddUserRequest>,
) -> AppResult<impl IntoResponse> {
    if input.username.trim().is_empty() {
        return Err(AppError::BadRequest(
            "username must not be empty".to_string(),
        ));
    }
    validate_week_schedule(&input.schedule)?;

    let user_id = state
        .store
        .add_user(
            &client_id,
            aegis_store::NewUser {
                name: input.name,
                username: input.username,
                schedule: input.schedule,
            },
        )
        .await?;
    state.store.bump_version(&client_id).await?;

    tracing::info!(%client_id, %user_id, "User added");
    Ok(Json(DataResponse {
        data: CreatedResponse { id: user_id },
    }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateScheduleRequest {
    pub schedule: WeekSchedule,
}

/// PUT /api/clients/{id}/users/{uid}/schedule -- replace a user's weekly
/// schedule.
pub async fn update_schedule(
    State(state): State<AppState>,
    Path((client_id, user_id)): Path<(String, String)>,
    Json(input): Json<UpdateScheduleRequest>,
) -> AppResult<impl IntoResponse> {
    validate_week_schedule(&input.schedule)?;

    state
        .store
        .update_schedule(&client_id, &user_id, input.schedule)
        .await?;
    state.store.bump_version(&client_id).await?;

    tracing::info!(%client_id, %user_id, "Schedule updated");
    Ok(StatusCode::OK)
}

/// DELETE /api/clients/{id}/users/{uid} -- remove a user.
pub async fn delete_user(
    State(state): State<AppState>,
    Path((client_id, user_id)): Path<(String, String)>,
) -> AppResult<impl IntoResponse> {
    state.store.delete_user(&client_id, &user_id).await?;
    state.store.bump_version(&client_id).await?;

    tracing::info!(%client_id, %user_id, "User deleted");
    Ok(StatusCode::OK)
}

// ---------------------------------------------------------------------------
// Temporary access
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct TemporaryAccessRequest {
    pub user_id: String,
    /// Minutes from now; must be positive.
    pub duration: i64,
}

/// POST /api/clients/{id}/temporary-access -- grant extra access starting
/// now.
pub async fn grant_temporary_access(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    Json(input): Json<TemporaryAccessRequest>,
) -> AppResult<impl IntoResponse> {
    if input.duration <= 0 {
        return Err(AppError::BadRequest(
            "duration must be positive".to_string(),
        ));
    }

    let until = Local::now() + Duration::minutes(input.duration);
    let request_id = state
        .store
        .grant_temp(&client_id, &input.user_id, until)
        .await?;
    state.store.bump_version(&client_id).await?;

    tracing::info!(
        %client_id,
        user_id = %input.user_id,
        minutes = input.duration,
        "Temporary access granted"
    );
    Ok(Json(DataResponse {
        data: CreatedResponse { id: request_id },
    }))
}

/// DELETE /api/clients/{id}/temporary-access/{rid} -- revoke a grant early.
pub async fn delete_temporary_access(
    State(state): State<AppState>,
    Path((client_id, request_id)): Path<(String, String)>,
) -> AppResult<impl IntoResponse> {
    state.store.delete_temp(&client_id, &request_id).await?;
    state.store.bump_version(&client_id).await?;

    tracing::info!(%client_id, %request_id, "Temporary access revoked");
    Ok(StatusCode::OK)
}

// ---------------------------------------------------------------------------
// Blocks
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct BlockRequest {
    /// Absent means every user on the computer.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Minutes from now; must be positive.
    pub duration: i64,
}

/// POST /api/clients/{id}/block -- block one user, or the whole computer,
/// starting now.
pub async fn create_block(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    Json(input): Json<BlockRequest>,
) -> AppResult<impl IntoResponse> {
    if input.duration <= 0 {
        return Err(AppError::BadRequest(
            "duration must be positive".to_string(),
        ));
    }

    let now = Local::now();
    let until = now + Duration::minutes(input.duration);
    let request_id = state
        .store
        .block(&client_id, input.user_id.as_deref(), now, until)
        .await?;
    state.store.bump_version(&client_id).await?;

    tracing::info!(
        %client_id,
        user_id = input.user_id.as_deref().unwrap_or("<all>"),
        minutes = input.duration,
        "Block created"
    );
    Ok(Json(DataResponse {
        data: CreatedResponse { id: request_id },
    }))
}

/// DELETE /api/clients/{id}/block/{rid} -- lift a block early.
pub async fn delete_block(
    State(state): State<AppState>,
    Path((client_id, request_id)): Path<(String, String)>,
) -> AppResult<impl IntoResponse> {
    state.store.delete_block(&client_id, &request_id).await?;
    state.store.bump_version(&client_id).await?;

    tracing::info!(%client_id, %request_id, "Block deleted");
    Ok(StatusCode::OK)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Fetch a client for the admin surface, mapping absence to 404.
async fn require_client(
    state: &AppState,
    client_id: &str,
) -> AppResult<aegis_store::ClientState> {
    state
        .store
        .get(client_id)
        .await?
        .ok_or_else(|| AppError::Store(aegis_store::StoreError::UnknownClient(client_id.to_string())))
}
