//! The Aegis client store: the single source of truth for every managed
//! computer's users, schedules, temporary grants, and blocks.
//!
//! All mutations are serialized through one write lock, recompute the
//! client's cached [`aegis_core::ClientConfig`], persist the whole document
//! atomically, and only then fan out a wake-up signal to subscribed
//! long-poll waiters. Readers get deep-copied snapshots.

mod client;
mod error;
mod persist;
mod store;

pub use client::{ClientState, ClientSummary, NewUser};
pub use error::StoreError;
pub use store::ClientStore;
