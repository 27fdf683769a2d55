//! Aegis domain model and pure computation.
//!
//! This crate has zero internal deps so it can be used by the control-plane
//! server, the client store, and the enforcement agent alike. It contains:
//!
//! - [`schedule`] -- `HH:MM` weekly schedules and their validation
//! - [`intervals`] -- the allowed-interval engine (48 h window, merge,
//!   block subtraction, next-change computation)
//! - [`config`] -- per-client config assembly and the wire types sent to
//!   agents
//! - [`error`] -- domain error type

pub mod config;
pub mod error;
pub mod intervals;
pub mod schedule;

pub use config::{compute_client_config, Block, ClientConfig, TempGrant, User, UserAccessConfig};
pub use error::CoreError;
pub use intervals::{compute_allowed_intervals, is_within_intervals, AllowedInterval, TimeRange};
pub use schedule::{DayInterval, WeekSchedule};
