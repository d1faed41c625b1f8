//! In-memory chain and wallet used by unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use alloy_primitives::{Address, Bytes, TxHash, U256, keccak256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use tokio::sync::Notify;

use crate::error::RpcError;
use crate::request::SignedRequest;
use crate::rpc::{CallRequest, ChainRpc, ExecuteOutcome, LogFilter, RawLog, ReceiptSummary};
use crate::signer::{SigningError, SigningProvider};
use crate::typed_data::TypedDataEnvelope;

pub mod fixtures {
    use alloy_primitives::{Address, address};
    use alloy_signer_local::PrivateKeySigner;

    use crate::config::{DEFAULT_EVENT_SIGNATURE, DeploymentConfig, DomainConfig, RelayPolicy};
    use crate::retry::RetryPolicy;

    pub const FORWARDER: Address = address!("0x4da46ba4dbe3c49b51fea12e1d9ae71021768db0");
    pub const REGISTRY: Address = address!("0xf6182b90ef0fed5b838918e7ed0bea3159577b0c");
    /// Address of [`holder_key`].
    pub const HOLDER: Address = address!("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266");

    pub fn holder_key() -> PrivateKeySigner {
        "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
            .parse()
            .unwrap()
    }

    pub fn deployment() -> DeploymentConfig {
        DeploymentConfig {
            chain_id: 80001,
            forwarder: FORWARDER,
            target: REGISTRY,
            domain: DomainConfig {
                name: "MinimalForwarder".into(),
                version: "0.0.1".into(),
            },
            event_scan_from_block: 1_000,
            event_signature: DEFAULT_EVENT_SIGNATURE.into(),
            policy: RelayPolicy {
                receipt_timeout_secs: 10,
                receipt_poll_interval_ms: 500,
                unresolved_hold_secs: 120,
                max_log_block_span: 5_000,
                retry: RetryPolicy::default(),
            },
        }
    }
}

/// How a broadcast transaction ends up.
#[derive(Debug, Clone, Copy)]
pub enum Mining {
    /// Mined after this many empty receipt polls.
    After { polls: u32, success: bool },
    /// Never mined.
    Never,
}

#[derive(Debug)]
struct State {
    nonces: HashMap<Address, U256>,
    nonce_failures: u32,
    estimate: Result<U256, RpcError>,
    simulation: Result<ExecuteOutcome, RpcError>,
    sent: Vec<SignedRequest>,
    send_attempts: u32,
    send_failures: u32,
    overdue: Vec<TxHash>,
    mining: Mining,
    receipt_polls: HashMap<TxHash, u32>,
    receipt_failures: u32,
    head: u64,
    logs: Vec<RawLog>,
    max_log_span: Option<u64>,
    log_queries: Vec<(u64, u64)>,
}

/// Scripted [`ChainRpc`]. Clones share state.
#[derive(Debug, Clone)]
pub struct MockRpc {
    state: Arc<Mutex<State>>,
}

impl MockRpc {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                nonces: HashMap::new(),
                nonce_failures: 0,
                estimate: Ok(U256::from(46_000)),
                simulation: Ok(ExecuteOutcome {
                    success: true,
                    return_data: Bytes::new(),
                }),
                sent: Vec::new(),
                send_attempts: 0,
                send_failures: 0,
                overdue: Vec::new(),
                mining: Mining::After {
                    polls: 0,
                    success: true,
                },
                receipt_polls: HashMap::new(),
                receipt_failures: 0,
                head: 0,
                logs: Vec::new(),
                max_log_span: None,
                log_queries: Vec::new(),
            })),
        }
    }

    fn with<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub fn set_nonce(&self, owner: Address, nonce: u64) {
        self.with(|s| s.nonces.insert(owner, U256::from(nonce)));
    }

    pub fn fail_next_nonce_reads(&self, count: u32) {
        self.with(|s| s.nonce_failures = count);
    }

    pub fn set_estimate(&self, estimate: Result<U256, RpcError>) {
        self.with(|s| s.estimate = estimate);
    }

    pub fn set_simulation(&self, simulation: Result<ExecuteOutcome, RpcError>) {
        self.with(|s| s.simulation = simulation);
    }

    pub fn set_mining(&self, mining: Mining) {
        self.with(|s| s.mining = mining);
    }

    pub fn fail_next_receipt_reads(&self, count: u32) {
        self.with(|s| s.receipt_failures = count);
    }

    pub fn fail_next_sends(&self, count: u32) {
        self.with(|s| s.send_failures = count);
    }

    pub fn send_attempts(&self) -> u32 {
        self.with(|s| s.send_attempts)
    }

    pub fn overdue(&self) -> Vec<TxHash> {
        self.with(|s| s.overdue.clone())
    }

    pub fn sent(&self) -> Vec<SignedRequest> {
        self.with(|s| s.sent.clone())
    }

    pub fn set_head(&self, head: u64) {
        self.with(|s| s.head = head);
    }

    pub fn push_log(&self, log: RawLog) {
        self.with(|s| s.logs.push(log));
    }

    pub fn set_max_log_span(&self, span: Option<u64>) {
        self.with(|s| s.max_log_span = span);
    }

    pub fn log_queries(&self) -> Vec<(u64, u64)> {
        self.with(|s| s.log_queries.clone())
    }
}

fn tx_hash_for(index: usize) -> TxHash {
    keccak256(index.to_be_bytes())
}

impl ChainRpc for MockRpc {
    async fn forwarder_nonce(&self, _forwarder: Address, owner: Address) -> Result<U256, RpcError> {
        self.with(|s| {
            if s.nonce_failures > 0 {
                s.nonce_failures -= 1;
                return Err(RpcError::Unavailable("connection reset".into()));
            }
            Ok(s.nonces.get(&owner).copied().unwrap_or(U256::ZERO))
        })
    }

    async fn estimate_gas(&self, _call: &CallRequest) -> Result<U256, RpcError> {
        self.with(|s| s.estimate.clone())
    }

    async fn simulate_execute(
        &self,
        _forwarder: Address,
        _signed: &SignedRequest,
    ) -> Result<ExecuteOutcome, RpcError> {
        self.with(|s| s.simulation.clone())
    }

    async fn send_execute(
        &self,
        _forwarder: Address,
        signed: &SignedRequest,
    ) -> Result<TxHash, RpcError> {
        self.with(|s| {
            s.send_attempts += 1;
            if s.send_failures > 0 {
                s.send_failures -= 1;
                return Err(RpcError::Unavailable("connection reset".into()));
            }
            let from = signed.request.from;
            let next = s.nonces.get(&from).copied().unwrap_or(U256::ZERO) + U256::from(1);
            s.nonces.insert(from, next);
            s.sent.push(signed.clone());
            let hash = tx_hash_for(s.sent.len());
            s.receipt_polls.insert(hash, 0);
            Ok(hash)
        })
    }

    async fn transaction_receipt(&self, tx_hash: TxHash) -> Result<Option<ReceiptSummary>, RpcError> {
        self.with(|s| {
            if s.receipt_failures > 0 {
                s.receipt_failures -= 1;
                return Err(RpcError::Unavailable("timeout".into()));
            }
            let Some(polls) = s.receipt_polls.get_mut(&tx_hash) else {
                return Ok(None);
            };
            match s.mining {
                Mining::Never => Ok(None),
                Mining::After { polls: wait, success } => {
                    if *polls < wait {
                        *polls += 1;
                        return Ok(None);
                    }
                    Ok(Some(ReceiptSummary {
                        transaction_hash: tx_hash,
                        block_number: 1_234,
                        success,
                    }))
                }
            }
        })
    }

    async fn receipt_overdue(&self, tx_hash: TxHash) {
        self.with(|s| s.overdue.push(tx_hash));
    }

    async fn block_number(&self) -> Result<u64, RpcError> {
        Ok(self.with(|s| s.head))
    }

    async fn logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, RpcError> {
        self.with(|s| {
            s.log_queries.push((filter.from_block, filter.to_block));
            let span = filter.to_block - filter.from_block + 1;
            if s.max_log_span.is_some_and(|max| span > max) {
                return Err(RpcError::RangeTooLarge("query returned more than 10000 results".into()));
            }
            // Nodes return logs in chain order; reverse to prove callers sort.
            let mut logs: Vec<RawLog> = s
                .logs
                .iter()
                .filter(|log| {
                    log.address == filter.address
                        && log.topics.first() == Some(&filter.topic0)
                        && (filter.from_block..=filter.to_block).contains(&log.block_number)
                })
                .cloned()
                .collect();
            logs.reverse();
            Ok(logs)
        })
    }
}

/// What [`ScriptedSigner`] answers.
#[derive(Debug, Clone)]
pub enum Answer {
    Sign(PrivateKeySigner),
    Reject,
    Unavailable,
}

/// Scripted [`SigningProvider`], optionally held until [`ScriptedSigner::release`].
#[derive(Debug, Clone)]
pub struct ScriptedSigner {
    answer: Answer,
    gate: Option<Arc<Notify>>,
}

impl ScriptedSigner {
    pub const fn new(answer: Answer) -> Self {
        Self { answer, gate: None }
    }

    pub fn gated(answer: Answer) -> Self {
        Self {
            answer,
            gate: Some(Arc::new(Notify::new())),
        }
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }
}

impl SigningProvider for ScriptedSigner {
    async fn sign_typed_data(
        &self,
        _signer: Address,
        envelope: &TypedDataEnvelope,
    ) -> Result<Bytes, SigningError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        match &self.answer {
            Answer::Sign(key) => {
                let signature = key
                    .sign_hash_sync(&envelope.signing_hash())
                    .map_err(|e| SigningError::Unavailable(e.to_string()))?;
                Ok(Bytes::from(signature.as_bytes()))
            }
            Answer::Reject => Err(SigningError::UserRejected),
            Answer::Unavailable => Err(SigningError::Unavailable("wallet locked".into())),
        }
    }
}
