#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types and relay pipeline for EIP-712 forwarded meta-transactions.
//!
//! An account holder signs a typed `ForwardRequest` off-chain; a relaying
//! party submits it to a forwarder contract which checks the signature and the
//! replay-protection nonce, then executes the call on the holder's behalf.
//! This crate builds, signs, submits and reconciles those requests. It is
//! chain-client agnostic: the node is reached through [`rpc::ChainRpc`] and
//! the wallet through [`signer::SigningProvider`].
//!
//! # Pipeline
//!
//! ```text
//! Intent ─► ForwardRequestFactory ─► TypedDataBuilder ─► SigningCoordinator ─► RelaySubmitter
//!              ▲ NonceTracker                                                      │
//!              ▲ gas estimation                                                    ▼
//!                                                           EventReconciler (periodic, independent)
//! ```
//!
//! # Modules
//!
//! - [`request`] - Intents, forward requests and signed requests
//! - [`typed_data`] - EIP-712 envelope construction and hashing
//! - [`factory`] - Forward request assembly and gas estimation
//! - [`nonce`] - Forwarder nonce reads
//! - [`coordinator`] - Single-flight signing rounds
//! - [`submitter`] - Relay submission and receipt classification
//! - [`receipt`] - Relay receipts
//! - [`events`] - Paged event queries and the registration ledger
//! - [`session`] - Holder session context and full signing rounds
//! - [`rpc`] - Chain node abstraction
//! - [`signer`] - Wallet abstraction
//! - [`retry`] - Backoff for transient node failures
//! - [`config`] - Deployment and relay policy configuration
//! - [`encoding`] - Wire format serde helpers
//! - [`error`] - Error taxonomy
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation

/// Awaits a future, optionally instrumenting it with a tracing span.
macro_rules! traced {
    ($fut:expr, $span:expr) => {{
        #[cfg(feature = "telemetry")]
        {
            use tracing::Instrument;
            $fut.instrument($span).await
        }
        #[cfg(not(feature = "telemetry"))]
        {
            $fut.await
        }
    }};
}

pub mod config;
pub mod coordinator;
pub mod encoding;
pub mod error;
pub mod events;
pub mod factory;
pub mod nonce;
pub mod receipt;
pub mod request;
pub mod retry;
pub mod rpc;
pub mod session;
pub mod signer;
pub mod submitter;
pub mod typed_data;

#[cfg(test)]
pub(crate) mod mock;

pub use config::{DeploymentConfig, DomainConfig, RelayPolicy};
pub use coordinator::SigningCoordinator;
pub use error::{MetaTxError, RpcError};
pub use events::{EventPoller, EventReconciler, RegistrationEvent, RegistrationLedger};
pub use factory::ForwardRequestFactory;
pub use nonce::NonceTracker;
pub use receipt::{RelayReceipt, RelayStatus};
pub use request::{ForwardRequest, Intent, SignedRequest};
pub use retry::RetryPolicy;
pub use rpc::ChainRpc;
pub use session::{Pipeline, Session};
pub use signer::{SigningError, SigningProvider};
pub use submitter::RelaySubmitter;
pub use typed_data::{TypedDataBuilder, TypedDataEnvelope};
