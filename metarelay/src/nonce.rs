//! Forwarder nonce reads.

use alloy_primitives::{Address, U256};

use crate::error::MetaTxError;
use crate::retry::RetryPolicy;
use crate::rpc::ChainRpc;

/// Reads the holder's replay-protection counter from the forwarder.
///
/// Nothing is cached: every round asks the contract, so a request signed in
/// another tab or by another relayer is always accounted for.
#[derive(Debug, Clone)]
pub struct NonceTracker<R> {
    rpc: R,
    retry: RetryPolicy,
}

impl<R: ChainRpc> NonceTracker<R> {
    /// Creates a tracker over `rpc`.
    pub const fn new(rpc: R, retry: RetryPolicy) -> Self {
        Self { rpc, retry }
    }

    /// The nonce the forwarder expects next from `owner`.
    ///
    /// # Errors
    ///
    /// - [`MetaTxError::RpcUnavailable`] when the node stays unreachable
    /// - [`MetaTxError::Rpc`] when the node rejects the call
    pub async fn current_nonce(
        &self,
        forwarder: Address,
        owner: Address,
    ) -> Result<U256, MetaTxError> {
        let nonce = traced!(
            self.retry
                .run("forwarder_nonce", || self.rpc.forwarder_nonce(forwarder, owner)),
            tracing::debug_span!("forwarder_nonce", %forwarder, %owner)
        )?;
        Ok(nonce)
    }
}
