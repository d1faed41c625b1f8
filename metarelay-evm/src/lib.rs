#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Alloy-backed chain access and signing providers for `metarelay`.
//!
//! [`AlloyChainRpc`] implements [`metarelay::ChainRpc`] over an HTTP JSON-RPC
//! endpoint, with the relayer's key in the provider's wallet filler and a
//! pending-aware nonce manager for the relayer account. Signing is either
//! local ([`LocalSigningProvider`]) or delegated to a wallet endpoint
//! ([`RpcSigningProvider`]).
//!
//! # Modules
//!
//! - [`contract`] - Forwarder and registry ABI bindings
//! - [`provider`] - Provider construction and error classification
//! - [`nonce`] - Relayer account nonce management
//! - [`signer`] - Signing providers
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation

pub mod contract;
pub mod nonce;
pub mod provider;
pub mod signer;

#[cfg(test)]
pub(crate) mod testing;

pub use nonce::RelayerNonceManager;
pub use provider::{AlloyChainRpc, RelayProvider, classify};
pub use signer::{LocalSigningProvider, RpcSigningProvider};
