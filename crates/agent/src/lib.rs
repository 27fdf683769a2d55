//! `aegis-agent` library crate.
//!
//! Runs on each managed computer: long-polls the control plane for the
//! current access config and reconciles local account state against it.
//! Re-exports internal modules for integration testing; the binary
//! entrypoint lives in `main.rs`.

pub mod config;
pub mod control;
pub mod enforcer;
pub mod fetcher;
