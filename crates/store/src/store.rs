//! The store itself: serialized mutations, cached config recomputation,
//! atomic persistence, and capacity-1 wake-up fan-out.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use aegis_core::compute_client_config;
use aegis_core::config::{Block, TempGrant, User};
use aegis_core::{AllowedInterval, WeekSchedule};
use chrono::{DateTime, Local};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::client::{ClientState, ClientSummary, NewUser};
use crate::error::StoreError;
use crate::persist::{self, PersistedData};

/// Bound on the temporary-access and block queues; the oldest entry is
/// evicted past this.
const MAX_REQUESTS: usize = 10;

/// Single source of truth for all clients.
///
/// One `RwLock` over the client map serializes mutations; subscriber
/// channels live under a separate mutex so fan-out never holds the store
/// lock and never blocks.
pub struct ClientStore {
    path: PathBuf,
    clients: tokio::sync::RwLock<HashMap<String, ClientState>>,
    subscribers: Mutex<HashMap<String, Vec<mpsc::Sender<()>>>>,
}

impl ClientStore {
    /// Open a store backed by the given JSON document. A missing file is an
    /// empty store; versions and cached configs are regenerated lazily on
    /// first read.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let mut clients = HashMap::new();
        if let Some(doc) = persist::read_document(&path).await? {
            for (id, persisted) in doc.clients {
                clients.insert(id, persisted.into_state());
            }
        }
        tracing::info!(path = %path.display(), clients = clients.len(), "Client store loaded");
        Ok(Self {
            path,
            clients: tokio::sync::RwLock::new(clients),
            subscribers: Mutex::new(HashMap::new()),
        })
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Deep-copied snapshot of one client, or `None`.
    ///
    /// Prunes expired grants and blocks and regenerates a missing version /
    /// cached config (the migration path for freshly loaded documents).
    pub async fn get(&self, client_id: &str) -> Result<Option<ClientState>, StoreError> {
        let mut clients = self.clients.write().await;
        if !clients.contains_key(client_id) {
            return Ok(None);
        }

        let now = Local::now();
        let mut pruned = false;
        if let Some(state) = clients.get_mut(client_id) {
            let before = state.temp_grants.len() + state.blocks.len();
            state.temp_grants.retain(|g| g.end > now);
            state.blocks.retain(|b| b.end > now);
            pruned = state.temp_grants.len() + state.blocks.len() != before;

            if state.computed_config.is_none() {
                if state.version.is_empty() {
                    state.version = fresh_version();
                }
                refresh_config(state, now);
            }
        }

        if pruned {
            // Opportunistic: this is a read path, so a failed write is
            // logged and retried by the next mutation.
            let doc = PersistedData::from_clients(clients.values());
            if let Err(e) = persist::write_document(&self.path, &doc).await {
                tracing::warn!(client_id, error = %e, "Failed to persist pruned requests");
            }
        }

        Ok(clients.get(client_id).cloned())
    }

    /// Shallow `(id, name)` list of every client, sorted by name.
    pub async fn list(&self) -> Vec<ClientSummary> {
        let clients = self.clients.read().await;
        let mut summaries: Vec<ClientSummary> = clients
            .values()
            .map(|c| ClientSummary {
                id: c.id.clone(),
                name: c.name.clone(),
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// Number of known clients (health reporting).
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    // -----------------------------------------------------------------------
    // Whole-client lifecycle
    // -----------------------------------------------------------------------

    /// Upsert a client. Assigns a fresh version if the state carries none
    /// and recomputes the cached config, but does not fan out -- this is
    /// the admin set-up path, not a change notification.
    pub async fn save(&self, mut state: ClientState) -> Result<(), StoreError> {
        let mut clients = self.clients.write().await;
        if state.version.is_empty() {
            state.version = fresh_version();
        }
        refresh_config(&mut state, Local::now());

        let doc = PersistedData::from_clients(
            clients.values().filter(|c| c.id != state.id).chain([&state]),
        );
        persist::write_document(&self.path, &doc).await?;
        clients.insert(state.id.clone(), state);
        Ok(())
    }

    /// Remove a client and tear down its subscribers.
    pub async fn delete(&self, client_id: &str) -> Result<(), StoreError> {
        let mut clients = self.clients.write().await;
        if !clients.contains_key(client_id) {
            return Err(StoreError::UnknownClient(client_id.to_string()));
        }

        let doc = PersistedData::from_clients(clients.values().filter(|c| c.id != client_id));
        persist::write_document(&self.path, &doc).await?;
        clients.remove(client_id);
        drop(clients);

        // Dropping the senders closes every subscribed channel; waiters
        // wake, re-read, and find the client gone.
        self.subscribers_lock().remove(client_id);
        tracing::info!(client_id, "Client deleted");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // User mutations
    // -----------------------------------------------------------------------

    /// Add a user; the id is assigned here. Refuses a duplicate OS account
    /// name within the client.
    pub async fn add_user(&self, client_id: &str, new_user: NewUser) -> Result<String, StoreError> {
        self.apply(client_id, |state| {
            if state.users.iter().any(|u| u.username == new_user.username) {
                return Err(StoreError::DuplicateUser(new_user.username.clone()));
            }
            let id = Uuid::new_v4().to_string();
            state.users.push(User {
                id: id.clone(),
                name: new_user.name.clone(),
                username: new_user.username.clone(),
                schedule: new_user.schedule.clone(),
            });
            Ok(id)
        })
        .await
    }

    /// Replace one user's weekly schedule.
    pub async fn update_schedule(
        &self,
        client_id: &str,
        user_id: &str,
        schedule: WeekSchedule,
    ) -> Result<(), StoreError> {
        self.apply(client_id, |state| {
            let user = state
                .users
                .iter_mut()
                .find(|u| u.id == user_id)
                .ok_or_else(|| StoreError::UnknownUser(user_id.to_string()))?;
            user.schedule = schedule.clone();
            Ok(())
        })
        .await
    }

    /// Remove a user, together with their pending temporary grants.
    pub async fn delete_user(&self, client_id: &str, user_id: &str) -> Result<(), StoreError> {
        self.apply(client_id, |state| {
            let idx = state
                .users
                .iter()
                .position(|u| u.id == user_id)
                .ok_or_else(|| StoreError::UnknownUser(user_id.to_string()))?;
            state.users.remove(idx);
            state.temp_grants.retain(|g| g.user_id != user_id);
            Ok(())
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Grants and blocks
    // -----------------------------------------------------------------------

    /// Append a temporary access grant `[now, until)` for one user,
    /// evicting the oldest entry past the queue bound.
    pub async fn grant_temp(
        &self,
        client_id: &str,
        user_id: &str,
        until: DateTime<Local>,
    ) -> Result<String, StoreError> {
        let now = Local::now();
        self.apply(client_id, |state| {
            if !state.users.iter().any(|u| u.id == user_id) {
                return Err(StoreError::UnknownUser(user_id.to_string()));
            }
            let id = Uuid::new_v4().to_string();
            state.temp_grants.push(TempGrant {
                id: id.clone(),
                user_id: user_id.to_string(),
                start: now,
                end: until,
            });
            trim_front(&mut state.temp_grants);
            Ok(id)
        })
        .await
    }

    /// Append a block `[start, until)`; `user_id` `None` blocks every user
    /// on the computer.
    pub async fn block(
        &self,
        client_id: &str,
        user_id: Option<&str>,
        start: DateTime<Local>,
        until: DateTime<Local>,
    ) -> Result<String, StoreError> {
        self.apply(client_id, |state| {
            if let Some(user_id) = user_id {
                if !state.users.iter().any(|u| u.id == user_id) {
                    return Err(StoreError::UnknownUser(user_id.to_string()));
                }
            }
            let id = Uuid::new_v4().to_string();
            state.blocks.push(Block {
                id: id.clone(),
                user_id: user_id.map(str::to_string),
                start,
                end: until,
            });
            trim_front(&mut state.blocks);
            Ok(id)
        })
        .await
    }

    /// Remove a temporary grant by id.
    pub async fn delete_temp(&self, client_id: &str, request_id: &str) -> Result<(), StoreError> {
        self.apply(client_id, |state| {
            let idx = state
                .temp_grants
                .iter()
                .position(|g| g.id == request_id)
                .ok_or_else(|| StoreError::UnknownRequest(request_id.to_string()))?;
            state.temp_grants.remove(idx);
            Ok(())
        })
        .await
    }

    /// Remove a block by id.
    pub async fn delete_block(&self, client_id: &str, request_id: &str) -> Result<(), StoreError> {
        self.apply(client_id, |state| {
            let idx = state
                .blocks
                .iter()
                .position(|b| b.id == request_id)
                .ok_or_else(|| StoreError::UnknownRequest(request_id.to_string()))?;
            state.blocks.remove(idx);
            Ok(())
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Versioning and bookkeeping
    // -----------------------------------------------------------------------

    /// Assign a fresh opaque version, recompute, and fan out. The admin
    /// surface calls this once after every mutating endpoint.
    pub async fn bump_version(&self, client_id: &str) -> Result<(), StoreError> {
        self.apply(client_id, |state| {
            state.version = fresh_version();
            Ok(())
        })
        .await
    }

    /// Record what an agent most recently observed. Advisory only: no
    /// version change, no fan-out, not persisted.
    pub async fn update_last_sent(
        &self,
        client_id: &str,
        intervals: std::collections::BTreeMap<String, Vec<AllowedInterval>>,
    ) {
        let mut clients = self.clients.write().await;
        if let Some(state) = clients.get_mut(client_id) {
            state.last_sent_intervals = intervals;
        }
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    /// Subscribe to change wake-ups for one client.
    ///
    /// The channel has capacity 1 and is fed with non-blocking sends, so
    /// rapid mutations coalesce into a single signal; the waiter re-reads
    /// the version after waking. The channel closes when the client is
    /// deleted.
    pub fn subscribe(&self, client_id: &str) -> mpsc::Receiver<()> {
        let (tx, rx) = mpsc::channel(1);
        self.subscribers_lock()
            .entry(client_id.to_string())
            .or_default()
            .push(tx);
        rx
    }

    fn notify(&self, client_id: &str) {
        let mut subscribers = self.subscribers_lock();
        let Some(channels) = subscribers.get_mut(client_id) else {
            return;
        };
        channels.retain(|tx| match tx.try_send(()) {
            Ok(()) => true,
            // Full means a wake-up is already pending; it coalesces.
            Err(TrySendError::Full(())) => true,
            Err(TrySendError::Closed(())) => false,
        });
        if channels.is_empty() {
            subscribers.remove(client_id);
        }
    }

    fn subscribers_lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<mpsc::Sender<()>>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // -----------------------------------------------------------------------
    // Mutation plumbing
    // -----------------------------------------------------------------------

    /// Run a mutation against a clone of the client state, recompute its
    /// cached config, persist, and only then commit and fan out. A failed
    /// persist leaves memory untouched and propagates to the caller.
    async fn apply<T>(
        &self,
        client_id: &str,
        mutate: impl FnOnce(&mut ClientState) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut clients = self.clients.write().await;
        let current = clients
            .get(client_id)
            .ok_or_else(|| StoreError::UnknownClient(client_id.to_string()))?;

        let now = Local::now();
        let mut updated = current.clone();
        // A freshly loaded client has no version yet (it is never
        // persisted); give it one before the recompute pairs them.
        if updated.version.is_empty() {
            updated.version = fresh_version();
        }
        updated.temp_grants.retain(|g| g.end > now);
        updated.blocks.retain(|b| b.end > now);

        let out = mutate(&mut updated)?;
        refresh_config(&mut updated, now);

        let doc = PersistedData::from_clients(
            clients.values().filter(|c| c.id != client_id).chain([&updated]),
        );
        persist::write_document(&self.path, &doc).await?;

        clients.insert(client_id.to_string(), updated);
        drop(clients);

        self.notify(client_id);
        Ok(out)
    }
}

/// Recompute the cached config from the state's current fields, pairing it
/// with the current version.
fn refresh_config(state: &mut ClientState, now: DateTime<Local>) {
    let (config, _) = compute_client_config(
        now,
        &state.users,
        &state.temp_grants,
        &state.blocks,
        state.version.clone(),
        true,
    );
    state.computed_config = Some(config);
}

fn fresh_version() -> String {
    Uuid::new_v4().to_string()
}

/// Drop the oldest entries until the queue fits the bound.
fn trim_front<T>(queue: &mut Vec<T>) {
    if queue.len() > MAX_REQUESTS {
        let excess = queue.len() - MAX_REQUESTS;
        queue.drain(..excess);
    }
}
