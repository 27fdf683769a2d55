//! Shared response envelope for the admin API.
//!
//! Admin responses use a `{ "data": ... }` envelope. The agent-facing
//! config endpoint is the exception: its wire format is fixed (bare
//! `ClientConfig`) and bypasses the envelope.

use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}
