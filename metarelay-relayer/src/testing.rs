//! In-memory chain for service tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use alloy_primitives::{Address, Bytes, TxHash, U256, address, keccak256};
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::SolValue;
use metarelay::config::{DEFAULT_EVENT_SIGNATURE, DomainConfig};
use metarelay::rpc::{CallRequest, ExecuteOutcome, LogFilter, RawLog, ReceiptSummary};
use metarelay::{
    ChainRpc, DeploymentConfig, ForwardRequest, RelayPolicy, RpcError, SignedRequest,
    SigningProvider,
};
use metarelay_evm::LocalSigningProvider;

pub(crate) const HOLDER: Address = address!("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266");

pub(crate) fn holder_key() -> PrivateKeySigner {
    "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
        .parse()
        .unwrap()
}

pub(crate) fn deployment() -> DeploymentConfig {
    DeploymentConfig {
        chain_id: 80001,
        forwarder: address!("0x4da46ba4dbe3c49b51fea12e1d9ae71021768db0"),
        target: address!("0xf6182b90ef0fed5b838918e7ed0bea3159577b0c"),
        domain: DomainConfig {
            name: "MinimalForwarder".into(),
            version: "0.0.1".into(),
        },
        event_scan_from_block: 1000,
        event_signature: DEFAULT_EVENT_SIGNATURE.into(),
        policy: RelayPolicy::default(),
    }
}

/// A request from [`HOLDER`] at `nonce`, signed with [`holder_key`].
pub(crate) async fn signed_request(nonce: u64) -> SignedRequest {
    let config = deployment();
    let request = ForwardRequest {
        from: HOLDER,
        to: config.target,
        value: U256::ZERO,
        gas_limit: U256::from(52_000),
        nonce: U256::from(nonce),
        data: Bytes::from_static(&[0xf2, 0xc2, 0x98, 0xbe]),
    };
    let signature = LocalSigningProvider::new(holder_key())
        .sign_typed_data(HOLDER, &config.envelope(request.clone()))
        .await
        .unwrap();
    SignedRequest { request, signature }
}

/// A `Registered(name, who)` log as the registry emits it.
pub(crate) fn registered_log(name: &str, who: Address, block: u64, index: u64) -> RawLog {
    RawLog {
        address: deployment().target,
        topics: vec![keccak256(DEFAULT_EVENT_SIGNATURE)],
        data: (name.to_owned(), who).abi_encode_params().into(),
        block_number: block,
        log_index: index,
        transaction_hash: TxHash::with_last_byte(u8::try_from(index).unwrap()),
    }
}

#[derive(Debug, Default)]
struct State {
    nonces: HashMap<Address, u64>,
    sent: Vec<TxHash>,
    head: u64,
    logs: Vec<RawLog>,
}

/// Forwarder that executes everything it is sent and mines it at once.
#[derive(Debug, Clone, Default)]
pub(crate) struct StubChain {
    state: Arc<Mutex<State>>,
}

impl StubChain {
    fn with<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        f(&mut self.state.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub(crate) fn set_nonce(&self, owner: Address, nonce: u64) {
        self.with(|s| s.nonces.insert(owner, nonce));
    }

    pub(crate) fn set_head(&self, head: u64) {
        self.with(|s| s.head = head);
    }

    pub(crate) fn push_log(&self, log: RawLog) {
        self.with(|s| s.logs.push(log));
    }

    pub(crate) fn sent(&self) -> usize {
        self.with(|s| s.sent.len())
    }
}

impl ChainRpc for StubChain {
    async fn forwarder_nonce(&self, _forwarder: Address, owner: Address) -> Result<U256, RpcError> {
        Ok(U256::from(self.with(|s| s.nonces.get(&owner).copied().unwrap_or(0))))
    }

    async fn estimate_gas(&self, _call: &CallRequest) -> Result<U256, RpcError> {
        Ok(U256::from(46_000))
    }

    async fn simulate_execute(
        &self,
        _forwarder: Address,
        _signed: &SignedRequest,
    ) -> Result<ExecuteOutcome, RpcError> {
        Ok(ExecuteOutcome {
            success: true,
            return_data: Bytes::new(),
        })
    }

    async fn send_execute(&self, _forwarder: Address, signed: &SignedRequest) -> Result<TxHash, RpcError> {
        Ok(self.with(|s| {
            *s.nonces.entry(signed.request.from).or_default() += 1;
            let hash = keccak256(s.sent.len().to_be_bytes());
            s.sent.push(hash);
            hash
        }))
    }

    async fn transaction_receipt(&self, tx_hash: TxHash) -> Result<Option<ReceiptSummary>, RpcError> {
        Ok(self.with(|s| {
            s.sent.contains(&tx_hash).then_some(ReceiptSummary {
                transaction_hash: tx_hash,
                block_number: 1500,
                success: true,
            })
        }))
    }

    async fn block_number(&self) -> Result<u64, RpcError> {
        Ok(self.with(|s| s.head))
    }

    async fn logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, RpcError> {
        Ok(self.with(|s| {
            s.logs
                .iter()
                .filter(|log| {
                    log.address == filter.address
                        && log.topics.first() == Some(&filter.topic0)
                        && (filter.from_block..=filter.to_block).contains(&log.block_number)
                })
                .cloned()
                .collect()
        }))
    }
}
