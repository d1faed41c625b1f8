//! Relay service for metarelay forwarder deployments.
//!
//! Accepts signed forward requests over HTTP, relays them through the
//! configured forwarders with a fee-paying key, and keeps a reconciled
//! projection of registry events per deployment.
//!
//! # Modules
//!
//! - [`config`] - TOML configuration with environment variable expansion
//! - [`handlers`] - Axum route handlers and router builder
//! - [`error`] - HTTP error mapping
//! - [`state`] - Per-deployment service state
//! - [`poller`] - Background event reconciliation task
//! - [`shutdown`] - Signal handling and task draining

pub mod config;
pub mod error;
pub mod handlers;
pub mod poller;
pub mod shutdown;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use config::RelayerConfig;
pub use handlers::relayer_router;
pub use state::{Relayer, RelayerState};
