pub mod clients;
pub mod config;
pub mod health;

use axum::routing::{delete, get, post, put};
use axum::Router;

use crate::state::AppState;

/// Build the `/api` route tree.
///
/// ```text
/// /config                                   agent long-poll (GET)
///
/// /clients                                  list (GET), create (POST)
/// /clients/{id}                             get (GET), delete (DELETE)
/// /clients/{id}/preview                     cached config (GET)
/// /clients/{id}/users                       add user (POST)
/// /clients/{id}/users/{uid}                 delete user (DELETE)
/// /clients/{id}/users/{uid}/schedule        replace schedule (PUT)
/// /clients/{id}/temporary-access            grant (POST)
/// /clients/{id}/temporary-access/{rid}      revoke (DELETE)
/// /clients/{id}/block                       block (POST)
/// /clients/{id}/block/{rid}                 unblock (DELETE)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/config", get(config::serve_config))
        .route(
            "/clients",
            get(clients::list_clients).post(clients::create_client),
        )
        .route(
            "/clients/{id}",
            get(clients::get_client).delete(clients::delete_client),
        )
        .route("/clients/{id}/preview", get(clients::preview_client))
        .route("/clients/{id}/users", post(clients::add_user))
        .route("/clients/{id}/users/{uid}", delete(clients::delete_user))
        .route(
            "/clients/{id}/users/{uid}/schedule",
            put(clients::update_schedule),
        )
        .route(
            "/clients/{id}/temporary-access",
            post(clients::grant_temporary_access),
        )
        .route(
            "/clients/{id}/temporary-access/{rid}",
            delete(clients::delete_temporary_access),
        )
        .route("/clients/{id}/block", post(clients::create_block))
        .route("/clients/{id}/block/{rid}", delete(clients::delete_block))
}
