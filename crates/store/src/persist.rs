//! The persisted JSON document and its atomic writer.
//!
//! One document holds every client:
//!
//! ```json
//! {"clients": {"<id>": {"id", "name", "users": [..],
//!   "block_requests": [..], "temporary_access_requests": [..]}}}
//! ```
//!
//! `version`, `computed_config`, and `last_sent_intervals` are never
//! written; they are regenerated after load.

use std::collections::HashMap;
use std::path::Path;

use aegis_core::config::{Block, TempGrant, User};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::client::ClientState;
use crate::error::StoreError;

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct PersistedData {
    pub clients: HashMap<String, PersistedClient>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct PersistedClient {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub users: Vec<PersistedUser>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub block_requests: Vec<PersistedBlock>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub temporary_access_requests: Vec<PersistedGrant>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct PersistedUser {
    pub id: String,
    pub name: String,
    pub username: String,
    #[serde(default)]
    pub schedule: aegis_core::WeekSchedule,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct PersistedBlock {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub start: DateTime<Local>,
    pub until: DateTime<Local>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct PersistedGrant {
    #[serde(default)]
    pub id: String,
    pub user_id: String,
    pub start: DateTime<Local>,
    pub until: DateTime<Local>,
}

impl PersistedData {
    /// Snapshot the persisted projection of a set of client states.
    pub fn from_clients<'a>(clients: impl Iterator<Item = &'a ClientState>) -> Self {
        let clients = clients
            .map(|state| (state.id.clone(), PersistedClient::from_state(state)))
            .collect();
        Self { clients }
    }
}

impl PersistedClient {
    fn from_state(state: &ClientState) -> Self {
        Self {
            id: state.id.clone(),
            name: state.name.clone(),
            users: state
                .users
                .iter()
                .map(|u| PersistedUser {
                    id: u.id.clone(),
                    name: u.name.clone(),
                    username: u.username.clone(),
                    schedule: u.schedule.clone(),
                })
                .collect(),
            block_requests: state
                .blocks
                .iter()
                .map(|b| PersistedBlock {
                    id: b.id.clone(),
                    user_id: b.user_id.clone(),
                    start: b.start,
                    until: b.end,
                })
                .collect(),
            temporary_access_requests: state
                .temp_grants
                .iter()
                .map(|g| PersistedGrant {
                    id: g.id.clone(),
                    user_id: g.user_id.clone(),
                    start: g.start,
                    until: g.end,
                })
                .collect(),
        }
    }

    /// Rehydrate into live state. Version and cached config are left empty
    /// and regenerated on first read; entries written before ids existed
    /// get one assigned here.
    pub fn into_state(self) -> ClientState {
        let mut state = ClientState::new(self.id, self.name);
        state.users = self
            .users
            .into_iter()
            .map(|u| User {
                id: u.id,
                name: u.name,
                username: u.username,
                schedule: u.schedule,
            })
            .collect();
        state.blocks = self
            .block_requests
            .into_iter()
            .map(|b| Block {
                id: ensure_id(b.id),
                user_id: b.user_id,
                start: b.start,
                end: b.until,
            })
            .collect();
        state.temp_grants = self
            .temporary_access_requests
            .into_iter()
            .map(|g| TempGrant {
                id: ensure_id(g.id),
                user_id: g.user_id,
                start: g.start,
                end: g.until,
            })
            .collect();
        state
    }
}

fn ensure_id(id: String) -> String {
    if id.is_empty() {
        Uuid::new_v4().to_string()
    } else {
        id
    }
}

/// Read the document; a missing file is an empty store.
pub(crate) async fn read_document(path: &Path) -> Result<Option<PersistedData>, StoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write the document atomically: temp file in the same directory, then
/// rename over the target.
pub(crate) async fn write_document(path: &Path, doc: &PersistedData) -> Result<(), StoreError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            tokio::fs::create_dir_all(dir).await?;
        }
    }
    let bytes = serde_json::to_vec_pretty(doc)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
