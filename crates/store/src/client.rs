//! Store-owned client state and the shapes handed across the store API.

use std::collections::BTreeMap;

use aegis_core::config::{Block, TempGrant, User};
use aegis_core::{AllowedInterval, ClientConfig, WeekSchedule};

/// Everything the store knows about one managed computer.
///
/// The store owns the only mutable copy; everything handed out is a deep
/// clone. `version` and `computed_config` are regenerated on load and so
/// never persisted; `last_sent_intervals` is advisory bookkeeping only.
#[derive(Debug, Clone)]
pub struct ClientState {
    pub id: String,
    pub name: String,
    pub users: Vec<User>,
    /// Last 10 temporary access grants, oldest first.
    pub temp_grants: Vec<TempGrant>,
    /// Last 10 blocks, oldest first.
    pub blocks: Vec<Block>,
    /// Per-OS-account intervals most recently emitted to an agent.
    pub last_sent_intervals: BTreeMap<String, Vec<AllowedInterval>>,
    /// Opaque config version; a fresh value on every admin mutation.
    pub version: String,
    /// Cached wire config, always paired with `version`.
    pub computed_config: Option<ClientConfig>,
}

impl ClientState {
    /// A brand-new client with no users and no overrides.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            users: Vec::new(),
            temp_grants: Vec::new(),
            blocks: Vec::new(),
            last_sent_intervals: BTreeMap::new(),
            version: String::new(),
            computed_config: None,
        }
    }
}

/// Shallow `(id, name)` listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSummary {
    pub id: String,
    pub name: String,
}

/// Input for adding a user to a client; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub username: String,
    pub schedule: WeekSchedule,
}
