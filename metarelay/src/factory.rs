//! Forward request assembly.

use alloy_primitives::{Address, U256};

use crate::error::{MetaTxError, RpcError};
use crate::nonce::NonceTracker;
use crate::request::{ForwardRequest, Intent};
use crate::retry::RetryPolicy;
use crate::rpc::{CallRequest, ChainRpc};

/// Turns holder intents into forward requests.
///
/// The gas limit is the node's raw estimate for the target call made directly
/// by the holder; no headroom is added.
#[derive(Debug, Clone)]
pub struct ForwardRequestFactory<R> {
    rpc: R,
    retry: RetryPolicy,
}

impl<R: ChainRpc> ForwardRequestFactory<R> {
    /// Creates a factory estimating gas through `rpc`.
    pub const fn new(rpc: R, retry: RetryPolicy) -> Self {
        Self { rpc, retry }
    }

    /// Assembles a request from an intent, a nonce and a gas estimate.
    ///
    /// Pure: identical inputs always give identical requests.
    #[must_use]
    pub fn build(intent: &Intent, nonce: U256, gas_estimate: U256) -> ForwardRequest {
        ForwardRequest {
            from: intent.sender,
            to: intent.target,
            value: intent.value_or_zero(),
            gas_limit: gas_estimate,
            nonce,
            data: intent.call_data.clone(),
        }
    }

    /// Estimates gas for the target call as if the holder sent it.
    ///
    /// # Errors
    ///
    /// - [`MetaTxError::Estimation`] when the call would revert; never retried
    /// - [`MetaTxError::RpcUnavailable`] when the node stays unreachable
    pub async fn estimate_gas(&self, intent: &Intent) -> Result<U256, MetaTxError> {
        let call = CallRequest {
            from: intent.sender,
            to: intent.target,
            value: intent.value_or_zero(),
            data: intent.call_data.clone(),
        };
        let estimate = traced!(
            self.retry.run("estimate_gas", || self.rpc.estimate_gas(&call)),
            tracing::debug_span!("estimate_gas", from = %intent.sender, to = %intent.target)
        );
        match estimate {
            Ok(gas) => Ok(gas),
            Err(RpcError::Reverted { reason }) => {
                #[cfg(feature = "telemetry")]
                tracing::info!(reason = ?reason, "target call would revert");
                Err(MetaTxError::Estimation { reason })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Reads the nonce, estimates gas and builds the request.
    ///
    /// No request is produced when either step fails.
    ///
    /// # Errors
    ///
    /// Propagates [`NonceTracker::current_nonce`] and [`Self::estimate_gas`] errors.
    pub async fn prepare<N: ChainRpc>(
        &self,
        nonces: &NonceTracker<N>,
        forwarder: Address,
        intent: &Intent,
    ) -> Result<ForwardRequest, MetaTxError> {
        let nonce = nonces.current_nonce(forwarder, intent.sender).await?;
        let gas = self.estimate_gas(intent).await?;
        Ok(Self::build(intent, nonce, gas))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRpc;
    use crate::mock::fixtures::FORWARDER;
    use alloy_primitives::{Bytes, address, bytes};

    const HOLDER: Address = address!("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
    const TOKEN: Address = address!("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");

    /// `approve(0xccc…ccc, 1000)`.
    fn approve_calldata() -> Bytes {
        bytes!(
            "095ea7b3"
            "000000000000000000000000cccccccccccccccccccccccccccccccccccccccc"
            "00000000000000000000000000000000000000000000000000000000000003e8"
        )
    }

    fn setup() -> (MockRpc, ForwardRequestFactory<MockRpc>, NonceTracker<MockRpc>) {
        let rpc = MockRpc::new();
        let factory = ForwardRequestFactory::new(rpc.clone(), RetryPolicy::no_retry());
        let nonces = NonceTracker::new(rpc.clone(), RetryPolicy::no_retry());
        (rpc, factory, nonces)
    }

    #[tokio::test]
    async fn test_prepare_approve_intent() {
        let (rpc, factory, nonces) = setup();
        rpc.set_nonce(HOLDER, 3);
        rpc.set_estimate(Ok(U256::from(46_123)));

        let intent = Intent::new(HOLDER, TOKEN, approve_calldata());
        let request = factory.prepare(&nonces, FORWARDER, &intent).await.unwrap();

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({
                "from": "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
                "to": "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb",
                "value": "0",
                "gas": "46123",
                "nonce": "3",
                "data": approve_calldata().to_string(),
            })
        );
        assert!(request.data.to_string().starts_with("0x095ea7b3"));
    }

    #[tokio::test]
    async fn test_estimation_revert_produces_no_request() {
        let (rpc, factory, nonces) = setup();
        rpc.set_estimate(Err(RpcError::Reverted {
            reason: Some("ERC20: transfer amount exceeds balance".into()),
        }));

        let intent = Intent::new(HOLDER, TOKEN, approve_calldata());
        let result = factory.prepare(&nonces, FORWARDER, &intent).await;

        assert_eq!(
            result,
            Err(MetaTxError::Estimation {
                reason: Some("ERC20: transfer amount exceeds balance".into())
            })
        );
    }

    #[test]
    fn test_build_is_pure() {
        let intent = Intent::new(HOLDER, TOKEN, approve_calldata()).with_value(U256::from(5));
        let a = ForwardRequestFactory::<MockRpc>::build(&intent, U256::from(1), U256::from(21_000));
        let b = ForwardRequestFactory::<MockRpc>::build(&intent, U256::from(1), U256::from(21_000));
        assert_eq!(a, b);
        assert_eq!(a.value, U256::from(5));
    }
}
