//! Deployment configuration.
//!
//! A deployment is one forwarder contract on one chain together with the
//! target contract whose events are reconciled. The relay service keeps a
//! tagged map of these instead of hard-wiring addresses per page.

use std::time::Duration;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::encoding::lowercase_address;
use crate::error::MetaTxError;
use crate::retry::RetryPolicy;
use crate::request::ForwardRequest;
use crate::typed_data::{TypedDataBuilder, TypedDataEnvelope};

/// Event emitted by the registry contract.
pub const DEFAULT_EVENT_SIGNATURE: &str = "Registered(string,address)";

/// Longest accepted receipt deadline, one day.
pub const MAX_RECEIPT_TIMEOUT_SECS: u64 = 86_400;

/// The forwarder's EIP-712 domain name and version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainConfig {
    /// e.g. `MinimalForwarder`.
    pub name: String,
    /// e.g. `0.0.1`.
    pub version: String,
}

/// Timing and paging knobs shared by the relay components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayPolicy {
    /// How long the submitter waits for a receipt before reporting `unknown`.
    pub receipt_timeout_secs: u64,
    /// Delay between receipt polls.
    pub receipt_poll_interval_ms: u64,
    /// How long a holder's broadcast without a receipt blocks further
    /// submissions from that holder.
    pub unresolved_hold_secs: u64,
    /// Largest block span requested in one `eth_getLogs` call.
    pub max_log_block_span: u64,
    /// Backoff applied to transport failures on reads.
    pub retry: RetryPolicy,
}

impl Default for RelayPolicy {
    fn default() -> Self {
        Self {
            receipt_timeout_secs: 60,
            receipt_poll_interval_ms: 1_000,
            unresolved_hold_secs: 900,
            max_log_block_span: 5_000,
            retry: RetryPolicy::default(),
        }
    }
}

impl RelayPolicy {
    /// Receipt deadline as a [`Duration`].
    #[must_use]
    pub const fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }

    /// Receipt poll interval as a [`Duration`].
    #[must_use]
    pub const fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }

    /// Unresolved broadcast hold as a [`Duration`].
    #[must_use]
    pub const fn unresolved_hold(&self) -> Duration {
        Duration::from_secs(self.unresolved_hold_secs)
    }
}

/// One forwarder deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// EIP-155 chain id.
    pub chain_id: u64,
    /// Forwarder contract; also the EIP-712 verifying contract.
    #[serde(with = "lowercase_address")]
    pub forwarder: Address,
    /// Contract whose events are reconciled (the registry).
    #[serde(with = "lowercase_address")]
    pub target: Address,
    /// Forwarder's EIP-712 domain.
    pub domain: DomainConfig,
    /// Block the target contract was deployed at; event scans never start earlier.
    pub event_scan_from_block: u64,
    /// Solidity signature of the reconciled event.
    #[serde(default = "default_event_signature")]
    pub event_signature: String,
    /// Relay timing and paging.
    #[serde(default)]
    pub policy: RelayPolicy,
}

fn default_event_signature() -> String {
    DEFAULT_EVENT_SIGNATURE.to_owned()
}

impl DeploymentConfig {
    /// Checks the values that would otherwise fail late and confusingly.
    ///
    /// # Errors
    ///
    /// Returns [`MetaTxError::Config`] when an address is zero, the scan start
    /// block is zero (a scan from genesis), a policy value is zero, or the
    /// receipt deadline exceeds [`MAX_RECEIPT_TIMEOUT_SECS`].
    pub fn validate(&self) -> Result<(), MetaTxError> {
        if self.forwarder.is_zero() {
            return Err(MetaTxError::Config("forwarder address must be set".into()));
        }
        if self.target.is_zero() {
            return Err(MetaTxError::Config("target address must be set".into()));
        }
        if self.chain_id == 0 {
            return Err(MetaTxError::Config("chain id must be non-zero".into()));
        }
        if self.event_scan_from_block == 0 {
            return Err(MetaTxError::Config(
                "event_scan_from_block must be the target's deployment block, not genesis".into(),
            ));
        }
        if self.domain.name.is_empty() || self.domain.version.is_empty() {
            return Err(MetaTxError::Config(
                "domain name and version must be set".into(),
            ));
        }
        if self.policy.max_log_block_span == 0 {
            return Err(MetaTxError::Config(
                "max_log_block_span must be at least 1".into(),
            ));
        }
        if self.policy.receipt_poll_interval_ms == 0 {
            return Err(MetaTxError::Config(
                "receipt_poll_interval_ms must be at least 1".into(),
            ));
        }
        if self.policy.receipt_timeout_secs > MAX_RECEIPT_TIMEOUT_SECS {
            return Err(MetaTxError::Config(format!(
                "receipt_timeout_secs must be at most {MAX_RECEIPT_TIMEOUT_SECS}"
            )));
        }
        Ok(())
    }

    /// Typed-data envelope for `request` under this deployment's domain.
    #[must_use]
    pub fn envelope(&self, request: ForwardRequest) -> TypedDataEnvelope {
        TypedDataBuilder::build(
            &self.domain.name,
            &self.domain.version,
            self.chain_id,
            self.forwarder,
            request,
        )
    }
}
