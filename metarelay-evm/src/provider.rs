//! Alloy-backed [`ChainRpc`].
//!
//! Node failures are classified once, here, into [`RpcError`]; retrying is
//! left to the pipeline.

use alloy_network::{EthereumWallet, TransactionBuilder};
use alloy_primitives::{Address, Bytes, TxHash, U256};
use alloy_provider::fillers::{
    BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller, WalletFiller,
};
use alloy_provider::{Identity, Provider, ProviderBuilder, RootProvider};
use alloy_rpc_client::ClientBuilder;
use alloy_rpc_types_eth::{Filter, TransactionRequest};
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::SolCall;
use alloy_transport::TransportError;
use alloy_transport::layers::ThrottleLayer;
use metarelay::error::revert_reason;
use metarelay::rpc::{CallRequest, ExecuteOutcome, LogFilter, RawLog, ReceiptSummary};
use metarelay::{ChainRpc, RpcError, SignedRequest};
use url::Url;

use crate::contract::IForwarder;
use crate::nonce::RelayerNonceManager;

/// Combined filler type for gas, blob gas, nonce, and chain ID.
pub type InnerFiller = JoinFill<
    GasFiller,
    JoinFill<BlobGasFiller, JoinFill<NonceFiller<RelayerNonceManager>, ChainIdFiller>>,
>;

/// The relayer's provider: fillers, the fee-paying wallet and a JSON-RPC root.
pub type RelayProvider = FillProvider<
    JoinFill<JoinFill<Identity, InnerFiller>, WalletFiller<EthereumWallet>>,
    RootProvider,
>;

/// JSON-RPC codes and message fragments nodes use to refuse oversized log queries.
const RANGE_TOO_LARGE_CODES: [i64; 2] = [-32005, -32602];
const RANGE_TOO_LARGE_MESSAGES: [&str; 6] = [
    "block range",
    "range too large",
    "query returned more than",
    "too many results",
    "response size exceeded",
    "limit exceeded",
];

/// Classifies an alloy transport error.
///
/// JSON-RPC error responses are reverts, oversized log queries or plain
/// rejections; everything else (HTTP, timeouts, malformed responses) is a
/// transport failure and may be retried.
pub fn classify(error: &TransportError) -> RpcError {
    let Some(payload) = error.as_error_resp() else {
        return RpcError::Unavailable(error.to_string());
    };
    if let Some(data) = payload.as_revert_data() {
        return RpcError::Reverted {
            reason: revert_reason(&data).or_else(|| message_reason(&payload.message)),
        };
    }
    let message = payload.message.to_lowercase();
    if message.contains("revert") {
        return RpcError::Reverted {
            reason: message_reason(&payload.message),
        };
    }
    if RANGE_TOO_LARGE_MESSAGES.iter().any(|m| message.contains(m))
        || (RANGE_TOO_LARGE_CODES.contains(&payload.code) && message.contains("range"))
    {
        return RpcError::RangeTooLarge(payload.message.to_string());
    }
    RpcError::Rejected(format!("{} (code {})", payload.message, payload.code))
}

/// `execution reverted: Foo` carries `Foo`; a bare `execution reverted` carries nothing.
fn message_reason(message: &str) -> Option<String> {
    message
        .split_once("reverted:")
        .map(|(_, reason)| reason.trim())
        .filter(|reason| !reason.is_empty())
        .map(str::to_owned)
}

/// [`ChainRpc`] over an alloy provider.
///
/// `relayer` is the account that pays for `execute`; `nonce_manager` is the
/// manager its provider's nonce filler uses, resynced after a failed send or
/// an overdue receipt.
#[derive(Debug, Clone)]
pub struct AlloyChainRpc<P = RelayProvider> {
    provider: P,
    relayer: Address,
    nonce_manager: RelayerNonceManager,
}

impl AlloyChainRpc<RelayProvider> {
    /// Connects to `rpc_url` with `signer` as the fee-paying relayer.
    ///
    /// `rate_limit` caps requests per second to the endpoint.
    #[must_use]
    pub fn connect(rpc_url: Url, signer: PrivateKeySigner, rate_limit: Option<u32>) -> Self {
        let relayer = signer.address();
        #[cfg(feature = "telemetry")]
        tracing::info!(rpc_url = %rpc_url, %relayer, rate_limit = ?rate_limit, "Using EVM provider");
        let client = ClientBuilder::default()
            .layer(ThrottleLayer::new(rate_limit.unwrap_or(u32::MAX)))
            .http(rpc_url);

        let nonce_manager = RelayerNonceManager::default();
        let filler = JoinFill::new(
            GasFiller,
            JoinFill::new(
                BlobGasFiller::default(),
                JoinFill::new(
                    NonceFiller::new(nonce_manager.clone()),
                    ChainIdFiller::default(),
                ),
            ),
        );
        let provider: RelayProvider = ProviderBuilder::default()
            .filler(filler)
            .wallet(EthereumWallet::from(signer))
            .connect_client(client);
        Self::new(provider, relayer, nonce_manager)
    }
}

impl<P: Provider> AlloyChainRpc<P> {
    /// Wraps an existing provider.
    pub const fn new(provider: P, relayer: Address, nonce_manager: RelayerNonceManager) -> Self {
        Self {
            provider,
            relayer,
            nonce_manager,
        }
    }

    /// The fee-paying account.
    pub const fn relayer(&self) -> Address {
        self.relayer
    }

    fn execute_tx(&self, forwarder: Address, signed: &SignedRequest) -> TransactionRequest {
        let call = IForwarder::executeCall {
            req: (&signed.request).into(),
            signature: signed.signature.clone(),
        };
        TransactionRequest::default()
            .with_from(self.relayer)
            .with_to(forwarder)
            .with_value(signed.request.value)
            .with_input(call.abi_encode())
    }
}

impl<P: Provider> ChainRpc for AlloyChainRpc<P> {
    async fn forwarder_nonce(&self, forwarder: Address, owner: Address) -> Result<U256, RpcError> {
        let call = IForwarder::getNonceCall { from: owner };
        let tx = TransactionRequest::default()
            .with_to(forwarder)
            .with_input(call.abi_encode());
        let output = self.provider.call(tx).await.map_err(|e| classify(&e))?;
        IForwarder::getNonceCall::abi_decode_returns(&output)
            .map_err(|e| RpcError::Rejected(format!("malformed getNonce output: {e}")))
    }

    async fn estimate_gas(&self, call: &CallRequest) -> Result<U256, RpcError> {
        let tx = TransactionRequest::default()
            .with_from(call.from)
            .with_to(call.to)
            .with_value(call.value)
            .with_input(call.data.clone());
        let gas = self.provider.estimate_gas(tx).await.map_err(|e| classify(&e))?;
        Ok(U256::from(gas))
    }

    async fn simulate_execute(
        &self,
        forwarder: Address,
        signed: &SignedRequest,
    ) -> Result<ExecuteOutcome, RpcError> {
        let tx = self.execute_tx(forwarder, signed);
        let output = self.provider.call(tx).await.map_err(|e| classify(&e))?;
        let returns = IForwarder::executeCall::abi_decode_returns(&output)
            .map_err(|e| RpcError::Rejected(format!("malformed execute output: {e}")))?;
        Ok(ExecuteOutcome {
            success: returns.success,
            return_data: returns.ret,
        })
    }

    async fn send_execute(&self, forwarder: Address, signed: &SignedRequest) -> Result<TxHash, RpcError> {
        let tx = self.execute_tx(forwarder, signed);
        match self.provider.send_transaction(tx).await {
            Ok(pending) => Ok(*pending.tx_hash()),
            Err(e) => {
                self.nonce_manager.resync(self.relayer).await;
                Err(classify(&e))
            }
        }
    }

    async fn receipt_overdue(&self, tx_hash: TxHash) {
        #[cfg(feature = "telemetry")]
        tracing::info!(%tx_hash, relayer = %self.relayer, "receipt overdue, resyncing relayer nonce");
        #[cfg(not(feature = "telemetry"))]
        let _ = tx_hash;
        self.nonce_manager.resync(self.relayer).await;
    }

    async fn transaction_receipt(&self, tx_hash: TxHash) -> Result<Option<ReceiptSummary>, RpcError> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| classify(&e))?;
        Ok(receipt.and_then(|receipt| {
            Some(ReceiptSummary {
                transaction_hash: receipt.transaction_hash,
                block_number: receipt.block_number?,
                success: receipt.status(),
            })
        }))
    }

    async fn block_number(&self) -> Result<u64, RpcError> {
        self.provider.get_block_number().await.map_err(|e| classify(&e))
    }

    async fn logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, RpcError> {
        let query = Filter::new()
            .address(filter.address)
            .event_signature(filter.topic0)
            .from_block(filter.from_block)
            .to_block(filter.to_block);
        let logs = self.provider.get_logs(&query).await.map_err(|e| classify(&e))?;
        // Pending logs carry no position and are picked up once mined.
        Ok(logs
            .into_iter()
            .filter_map(|log| {
                Some(RawLog {
                    address: log.address(),
                    topics: log.topics().to_vec(),
                    data: Bytes::clone(&log.data().data),
                    block_number: log.block_number?,
                    log_index: log.log_index?,
                    transaction_hash: log.transaction_hash?,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::node;
    use alloy_primitives::address;
    use alloy_provider::fillers::NonceManager;
    use alloy_sol_types::{Revert, SolError, SolValue};
    use serde_json::json;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FORWARDER: Address = address!("0x4da46ba4dbe3c49b51fea12e1d9ae71021768db0");
    const HOLDER: Address = address!("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");

    fn rpc(server: &MockServer) -> AlloyChainRpc<RootProvider> {
        let url: Url = server.uri().parse().unwrap();
        AlloyChainRpc::new(RootProvider::new_http(url), Address::ZERO, RelayerNonceManager::default())
    }

    #[tokio::test]
    async fn test_forwarder_nonce_decodes_call_output() {
        let output = U256::from(4).abi_encode();
        let server = node("eth_call", json!({ "result": Bytes::from(output) })).await;

        let nonce = rpc(&server).forwarder_nonce(FORWARDER, HOLDER).await.unwrap();
        assert_eq!(nonce, U256::from(4));
    }

    #[tokio::test]
    async fn test_estimation_revert_is_classified() {
        let revert = Revert {
            reason: "ERC20: insufficient allowance".to_owned(),
        }
        .abi_encode();
        let server = node(
            "eth_estimateGas",
            json!({ "error": { "code": 3, "message": "execution reverted", "data": Bytes::from(revert) } }),
        )
        .await;

        let call = CallRequest {
            from: HOLDER,
            to: FORWARDER,
            value: U256::ZERO,
            data: Bytes::new(),
        };
        assert_eq!(
            rpc(&server).estimate_gas(&call).await,
            Err(RpcError::Reverted {
                reason: Some("ERC20: insufficient allowance".into())
            })
        );
    }

    #[tokio::test]
    async fn test_oversized_log_query_is_classified() {
        let server = node(
            "eth_getLogs",
            json!({ "error": { "code": -32005, "message": "query returned more than 10000 results" } }),
        )
        .await;

        let filter = LogFilter {
            address: FORWARDER,
            topic0: alloy_primitives::B256::ZERO,
            from_block: 1,
            to_block: 1_000_000,
        };
        assert!(matches!(
            rpc(&server).logs(&filter).await,
            Err(RpcError::RangeTooLarge(_))
        ));
    }

    #[tokio::test]
    async fn test_http_failure_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = rpc(&server).block_number().await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_overdue_receipt_resyncs_relayer_nonce() {
        let relayer = address!("0x70997970c51812dc3a010c7d01b50e0d17dc79c8");
        let server = node("eth_getTransactionCount", json!({ "result": "0x9" })).await;
        let url: Url = server.uri().parse().unwrap();
        let provider: RootProvider = RootProvider::new_http(url);
        let nonces = RelayerNonceManager::default();
        nonces.get_next_nonce(&provider, relayer).await.unwrap();

        let rpc = AlloyChainRpc::new(provider, relayer, nonces.clone());
        rpc.receipt_overdue(TxHash::ZERO).await;

        assert_eq!(nonces.last_assigned(relayer).await, None);
    }

    #[test]
    fn test_message_reason() {
        assert_eq!(
            message_reason("execution reverted: Registry: name taken"),
            Some("Registry: name taken".into())
        );
        assert_eq!(message_reason("execution reverted"), None);
    }
}
