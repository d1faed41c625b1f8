//! Error taxonomy for the meta-transaction pipeline.
//!
//! [`RpcError`] is what a [`ChainRpc`](crate::rpc::ChainRpc) implementation
//! reports for a single node call. Components translate it into a
//! [`MetaTxError`] with the meaning of the call site: a revert during gas
//! estimation is an [`MetaTxError::Estimation`], a revert while relaying is a
//! [`MetaTxError::RelayReverted`].

use alloy_primitives::{Address, TxHash, U256};
use alloy_sol_types::{Revert, SolError, decode_revert_reason};

use crate::signer::SigningError;

/// Decodes revert data into the reason a caller should see.
///
/// `Error(string)` yields the string exactly as the contract wrote it. Panics
/// and custom errors fall back to alloy's rendering of the data. Empty data
/// carries no reason.
#[must_use]
pub fn revert_reason(data: &[u8]) -> Option<String> {
    match Revert::abi_decode(data) {
        Ok(revert) => Some(revert.reason),
        Err(_) => decode_revert_reason(data).filter(|reason| !reason.is_empty()),
    }
}

fn reason_or_unknown(reason: Option<&str>) -> &str {
    reason.unwrap_or("no revert reason provided")
}

/// Failure of a single call against the chain node.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    /// The node could not be reached or answered with a transport-level failure.
    #[error("transport failure: {0}")]
    Unavailable(String),
    /// The call would revert (or reverted); carries the decoded reason when the node sent one.
    #[error("execution reverted: {}", reason_or_unknown(.reason.as_deref()))]
    Reverted {
        /// Decoded revert reason.
        reason: Option<String>,
    },
    /// The node refused a log query because the block range or result set is too large.
    #[error("log query range too large: {0}")]
    RangeTooLarge(String),
    /// Any other JSON-RPC error response.
    #[error("request rejected by node: {0}")]
    Rejected(String),
}

impl RpcError {
    /// Whether retrying the identical call may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Errors surfaced by the meta-transaction pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetaTxError {
    /// Gas estimation for the target call reverted; the call itself would revert too.
    #[error("gas estimation reverted: {}", reason_or_unknown(.reason.as_deref()))]
    Estimation {
        /// Revert reason reported by the node.
        reason: Option<String>,
    },
    /// The chain node stayed unreachable after bounded retries.
    #[error("chain rpc unavailable: {0}")]
    RpcUnavailable(String),
    /// The node rejected a request for a non-transport reason.
    #[error("chain rpc error: {0}")]
    Rpc(String),
    /// The signing provider could not be reached.
    #[error("signing provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// The holder declined to sign.
    #[error("holder rejected the signing request")]
    UserRejected,
    /// Another round is already in flight for this signer and forwarder.
    #[error("a signing round is already in flight for {signer} at forwarder {forwarder}")]
    SigningInProgress {
        /// Signing account.
        signer: Address,
        /// Forwarder the round targets.
        forwarder: Address,
    },
    /// The request's nonce no longer matches the forwarder's counter.
    #[error("stale nonce: request carries {signed}, forwarder expects {current}")]
    StaleNonce {
        /// Nonce embedded in the signed request.
        signed: U256,
        /// Nonce currently stored by the forwarder.
        current: U256,
    },
    /// The forwarded call reverted on-chain (or in simulation).
    #[error("relay reverted: {}", reason_or_unknown(.reason.as_deref()))]
    RelayReverted {
        /// Transaction hash, when the relay transaction was mined.
        tx_hash: Option<TxHash>,
        /// Revert reason, verbatim.
        reason: Option<String>,
    },
    /// The relay transaction was not mined before the deadline; poll it, never resubmit.
    #[error("transaction {tx_hash} still pending after the receipt deadline")]
    SubmissionTimeout {
        /// Hash of the broadcast transaction.
        tx_hash: TxHash,
    },
    /// An earlier broadcast for the same holder has no receipt yet; poll it
    /// instead of submitting again.
    #[error("transaction {tx_hash} for this holder is still unresolved")]
    SubmissionPending {
        /// Hash of the earlier broadcast.
        tx_hash: TxHash,
    },
    /// The signature does not recover to the expected account.
    #[error("signature does not recover to {expected}")]
    InvalidSignature {
        /// Account the signature should belong to.
        expected: Address,
        /// Account actually recovered, if recovery succeeded at all.
        recovered: Option<Address>,
    },
    /// The request's `from` is not the account asked to sign it.
    #[error("request sender {from} does not match signer {signer}")]
    SignerMismatch {
        /// `from` field of the request.
        from: Address,
        /// Account asked to sign.
        signer: Address,
    },
    /// No deployment is configured under this tag.
    #[error("unknown deployment '{0}'")]
    UnknownDeployment(String),
    /// Configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl MetaTxError {
    /// Stable machine-readable name of the error kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Estimation { .. } => "estimation_error",
            Self::RpcUnavailable(_) => "rpc_unavailable",
            Self::Rpc(_) => "rpc_error",
            Self::ProviderUnavailable(_) => "provider_unavailable",
            Self::UserRejected => "user_rejected",
            Self::SigningInProgress { .. } => "signing_in_progress",
            Self::StaleNonce { .. } => "stale_nonce",
            Self::RelayReverted { .. } => "relay_reverted",
            Self::SubmissionTimeout { .. } => "submission_timeout",
            Self::SubmissionPending { .. } => "submission_pending",
            Self::InvalidSignature { .. } => "invalid_signature",
            Self::SignerMismatch { .. } => "signer_mismatch",
            Self::UnknownDeployment(_) => "unknown_deployment",
            Self::Config(_) => "config_error",
        }
    }

    /// The on-chain revert reason, when this error carries one.
    #[must_use]
    pub fn revert_reason(&self) -> Option<&str> {
        match self {
            Self::Estimation { reason } | Self::RelayReverted { reason, .. } => reason.as_deref(),
            _ => None,
        }
    }

    /// Whether the caller may retry the same operation after a delay.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RpcUnavailable(_) | Self::ProviderUnavailable(_))
    }
}

impl From<RpcError> for MetaTxError {
    fn from(value: RpcError) -> Self {
        match value {
            RpcError::Unavailable(e) => Self::RpcUnavailable(e),
            RpcError::Reverted { .. } | RpcError::RangeTooLarge(_) | RpcError::Rejected(_) => {
                Self::Rpc(value.to_string())
            }
        }
    }
}

impl From<SigningError> for MetaTxError {
    fn from(value: SigningError) -> Self {
        match value {
            SigningError::UserRejected => Self::UserRejected,
            SigningError::Unavailable(e) => Self::ProviderUnavailable(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_sol_types::Panic;

    #[test]
    fn test_error_string_is_decoded_verbatim() {
        let data = Revert {
            reason: "Registry: name taken".to_owned(),
        }
        .abi_encode();
        assert_eq!(revert_reason(&data).as_deref(), Some("Registry: name taken"));
    }

    #[test]
    fn test_panic_falls_back_to_rendered_form() {
        let data = Panic {
            code: U256::from(0x11),
        }
        .abi_encode();
        let reason = revert_reason(&data).unwrap();
        assert!(reason.contains("overflow"), "{reason}");
    }

    #[test]
    fn test_empty_revert_data_has_no_reason() {
        assert_eq!(revert_reason(&[]), None);
    }

    #[test]
    fn test_revert_reason_is_carried() {
        let err = MetaTxError::RelayReverted {
            tx_hash: None,
            reason: Some("ERC20: insufficient allowance".into()),
        };
        assert_eq!(err.revert_reason(), Some("ERC20: insufficient allowance"));
        assert_eq!(err.to_string(), "relay reverted: ERC20: insufficient allowance");
        assert_eq!(err.kind(), "relay_reverted");
    }

    #[test]
    fn test_missing_reason_is_explicit() {
        let err = MetaTxError::Estimation { reason: None };
        assert_eq!(
            err.to_string(),
            "gas estimation reverted: no revert reason provided"
        );
    }

    #[test]
    fn test_transport_errors_are_retryable() {
        let err: MetaTxError = RpcError::Unavailable("connection reset".into()).into();
        assert!(err.is_retryable());
        let err: MetaTxError = RpcError::Rejected("method not found".into()).into();
        assert!(!err.is_retryable());
        assert!(!MetaTxError::UserRejected.is_retryable());
    }

    #[test]
    fn test_signing_errors_map_to_taxonomy() {
        assert_eq!(
            MetaTxError::from(SigningError::UserRejected),
            MetaTxError::UserRejected
        );
        assert_eq!(
            MetaTxError::from(SigningError::Unavailable("locked".into())),
            MetaTxError::ProviderUnavailable("locked".into())
        );
    }
}
