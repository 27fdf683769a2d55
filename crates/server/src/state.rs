use std::sync::Arc;

use aegis_store::ClientStore;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// The client store: single source of truth for all clients.
    pub store: Arc<ClientStore>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
}
