//! Relay receipts and their classification.

use alloy_primitives::TxHash;
use serde::{Deserialize, Serialize};

use crate::error::MetaTxError;

/// Confirmation state of a relay transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelayStatus {
    /// Broadcast, no receipt yet.
    Pending,
    /// Mined, and the forwarder's `execute` did not revert.
    ///
    /// The forwarder reports a failing inner call through its return value,
    /// which a receipt does not carry. Submissions are simulated first, so
    /// this only hides inner calls that started failing between simulation
    /// and inclusion.
    Success,
    /// Mined, execution reverted.
    Reverted,
    /// Receipt deadline elapsed while the transaction was still pending.
    Unknown,
}

impl RelayStatus {
    /// Terminal states never change again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Reverted)
    }
}

/// Outcome of relaying a signed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayReceipt {
    /// Hash of the `execute` transaction.
    pub transaction_hash: TxHash,
    /// Block the transaction was mined in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    /// Current classification.
    pub status: RelayStatus,
    /// Revert reason, verbatim, when the node provided one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revert_reason: Option<String>,
}

impl RelayReceipt {
    /// A freshly broadcast transaction.
    #[must_use]
    pub const fn pending(transaction_hash: TxHash) -> Self {
        Self {
            transaction_hash,
            block_number: None,
            status: RelayStatus::Pending,
            revert_reason: None,
        }
    }

    /// Applies a newer observation. Terminal receipts are left untouched.
    pub fn observe(&mut self, status: RelayStatus, block_number: Option<u64>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = status;
        if block_number.is_some() {
            self.block_number = block_number;
        }
    }

    /// Converts the receipt into the error taxonomy.
    ///
    /// # Errors
    ///
    /// - [`MetaTxError::RelayReverted`] for reverted receipts
    /// - [`MetaTxError::SubmissionTimeout`] for pending or unknown receipts
    pub fn into_outcome(self) -> Result<Self, MetaTxError> {
        match self.status {
            RelayStatus::Success => Ok(self),
            RelayStatus::Reverted => Err(MetaTxError::RelayReverted {
                tx_hash: Some(self.transaction_hash),
                reason: self.revert_reason,
            }),
            RelayStatus::Pending | RelayStatus::Unknown => Err(MetaTxError::SubmissionTimeout {
                tx_hash: self.transaction_hash,
            }),
        }
    }
}
