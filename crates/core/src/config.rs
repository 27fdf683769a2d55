//! Per-client config assembly and the wire types delivered to agents.
//!
//! [`compute_client_config`] resolves one client's users, temporary grants,
//! and blocks into the declarative [`ClientConfig`] an agent enforces:
//! per-user allowed intervals plus the opaque config version. Grants apply
//! to their one user; blocks apply to their one user or, when `user_id` is
//! absent, to every user on the computer.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Local, TimeZone};
use serde::{Deserialize, Serialize};

use crate::intervals::{compute_allowed_intervals, AllowedInterval, TimeRange, WINDOW_HOURS};
use crate::schedule::WeekSchedule;

/// A controlled user account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Stable opaque id.
    pub id: String,
    /// Display name shown in the admin UI.
    pub name: String,
    /// OS account name on the managed computer.
    pub username: String,
    /// Weekly allowed windows.
    pub schedule: WeekSchedule,
}

/// An admin-granted window of extra access for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "DateTime<Tz>: Serialize",
    deserialize = "DateTime<Tz>: Deserialize<'de>"
))]
pub struct TempGrant<Tz: TimeZone = Local> {
    pub id: String,
    pub user_id: String,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

/// An admin override forbidding access over an absolute range.
///
/// `user_id` absent means the block applies to every user on the computer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "DateTime<Tz>: Serialize",
    deserialize = "DateTime<Tz>: Deserialize<'de>"
))]
pub struct Block<Tz: TimeZone = Local> {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

/// Per-user slice of the wire config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "DateTime<Tz>: Serialize",
    deserialize = "DateTime<Tz>: Deserialize<'de>"
))]
pub struct UserAccessConfig<Tz: TimeZone = Local> {
    /// OS account name.
    pub username: String,
    pub allowed_intervals: Vec<AllowedInterval<Tz>>,
}

/// The full declarative config sent to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "DateTime<Tz>: Serialize",
    deserialize = "DateTime<Tz>: Deserialize<'de>"
))]
pub struct ClientConfig<Tz: TimeZone = Local> {
    pub users: Vec<UserAccessConfig<Tz>>,
    /// Opaque; agents only compare it for equality.
    pub version: String,
}

/// Resolve a client's state into the wire config and the next-change
/// instant (the minimum across users; `now + 48 h` for zero users).
pub fn compute_client_config<Tz: TimeZone>(
    now: DateTime<Tz>,
    users: &[User],
    temp_grants: &[TempGrant<Tz>],
    blocks: &[Block<Tz>],
    version: String,
    include_past: bool,
) -> (ClientConfig<Tz>, DateTime<Tz>) {
    let mut grants_by_user: HashMap<&str, Vec<TimeRange<Tz>>> = HashMap::new();
    for grant in temp_grants {
        grants_by_user
            .entry(grant.user_id.as_str())
            .or_default()
            .push(TimeRange {
                start: grant.start.clone(),
                end: grant.end.clone(),
            });
    }

    let mut global_blocks: Vec<TimeRange<Tz>> = Vec::new();
    let mut blocks_by_user: HashMap<&str, Vec<TimeRange<Tz>>> = HashMap::new();
    for block in blocks {
        let range = TimeRange {
            start: block.start.clone(),
            end: block.end.clone(),
        };
        match block.user_id.as_deref() {
            None => global_blocks.push(range),
            Some(user_id) => blocks_by_user.entry(user_id).or_default().push(range),
        }
    }

    let mut user_configs = Vec::with_capacity(users.len());
    let mut next_change: Option<DateTime<Tz>> = None;

    for user in users {
        let grants = match grants_by_user.get(user.id.as_str()) {
            Some(grants) => grants.as_slice(),
            None => &[],
        };

        let mut user_blocks = global_blocks.clone();
        if let Some(extra) = blocks_by_user.get(user.id.as_str()) {
            user_blocks.extend(extra.iter().cloned());
        }

        let (intervals, user_next) = compute_allowed_intervals(
            now.clone(),
            &user.schedule,
            grants,
            &user_blocks,
            include_past,
        );

        user_configs.push(UserAccessConfig {
            username: user.username.clone(),
            allowed_intervals: intervals,
        });

        next_change = match next_change {
            Some(current) if current <= user_next => Some(current),
            _ => Some(user_next),
        };
    }

    let next_change = next_change.unwrap_or_else(|| now + Duration::hours(WINDOW_HOURS));

    (
        ClientConfig {
            users: user_configs,
            version,
        },
        next_change,
    )
}
