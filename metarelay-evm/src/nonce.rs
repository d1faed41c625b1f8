//! Relayer account nonce management.
//!
//! Every `execute` is paid from the relayer's account. Its nonces are handed
//! out locally so concurrent sends for different holders get consecutive
//! nonces without a node round trip each. The sequence is seeded from the
//! node's pending transaction count and re-seeded whenever the local view may
//! have drifted: after a failed send, and after a broadcast whose receipt never
//! arrived (the node may have dropped it, leaving a gap).

use std::sync::Arc;

use alloy_network::Network;
use alloy_primitives::Address;
use alloy_provider::Provider;
use alloy_provider::fillers::NonceManager;
use alloy_transport::TransportResult;
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

/// Last nonce handed out for an account; `None` until seeded from the node.
type Sequence = Arc<Mutex<Option<u64>>>;

/// Local nonce sequences for relayer accounts, shared by clones.
#[derive(Clone, Debug, Default)]
pub struct RelayerNonceManager {
    accounts: Arc<DashMap<Address, Sequence>>,
}

impl RelayerNonceManager {
    fn sequence(&self, account: Address) -> Sequence {
        Arc::clone(self.accounts.entry(account).or_default().value())
    }

    /// Last nonce handed out for `account`, if its sequence is seeded.
    pub async fn last_assigned(&self, account: Address) -> Option<u64> {
        let sequence = self.accounts.get(&account).map(|entry| Arc::clone(entry.value()))?;
        *sequence.lock().await
    }

    /// Forgets the local sequence of `account`; the next nonce comes from the node.
    pub async fn resync(&self, account: Address) {
        let Some(sequence) = self.accounts.get(&account).map(|entry| Arc::clone(entry.value()))
        else {
            return;
        };
        #[cfg(feature = "telemetry")]
        tracing::debug!(%account, "relayer nonce sequence dropped");
        *sequence.lock().await = None;
    }
}

#[async_trait]
impl NonceManager for RelayerNonceManager {
    async fn get_next_nonce<P, N>(&self, provider: &P, address: Address) -> TransportResult<u64>
    where
        P: Provider<N>,
        N: Network,
    {
        let sequence = self.sequence(address);
        let mut last = sequence.lock().await;
        let next = match *last {
            Some(nonce) => nonce + 1,
            None => {
                let pending = provider.get_transaction_count(address).pending().await?;
                #[cfg(feature = "telemetry")]
                tracing::debug!(%address, pending, "relayer nonce sequence seeded");
                pending
            }
        };
        *last = Some(next);
        Ok(next)
    }
}
