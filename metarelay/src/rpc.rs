//! Chain node abstraction.
//!
//! Everything the pipeline needs from the ledger goes through [`ChainRpc`].
//! Implementations classify node failures into [`RpcError`]; they do not
//! retry. Retrying is the caller's decision and depends on the operation.

use std::future::Future;
use std::sync::Arc;

use alloy_primitives::{Address, B256, Bytes, TxHash, U256};

use crate::error::RpcError;
use crate::request::SignedRequest;

/// A read-only call as the holder would send it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    /// Caller.
    pub from: Address,
    /// Callee.
    pub to: Address,
    /// Native value attached.
    pub value: U256,
    /// Encoded call.
    pub data: Bytes,
}

/// Result of simulating `execute` on the forwarder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteOutcome {
    /// Whether the inner call succeeded.
    pub success: bool,
    /// Return data of the inner call; revert data when `success` is false.
    pub return_data: Bytes,
}

/// The parts of a transaction receipt the submitter looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptSummary {
    /// Transaction hash.
    pub transaction_hash: TxHash,
    /// Block the transaction was included in.
    pub block_number: u64,
    /// Execution status.
    pub success: bool,
}

/// Inclusive block range query for one event on one contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogFilter {
    /// Emitting contract.
    pub address: Address,
    /// Event selector.
    pub topic0: B256,
    /// First block, inclusive.
    pub from_block: u64,
    /// Last block, inclusive.
    pub to_block: u64,
}

/// A log as returned by the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    /// Emitting contract.
    pub address: Address,
    /// Indexed topics, selector first.
    pub topics: Vec<B256>,
    /// Non-indexed data.
    pub data: Bytes,
    /// Block number.
    pub block_number: u64,
    /// Position within the block.
    pub log_index: u64,
    /// Emitting transaction.
    pub transaction_hash: TxHash,
}

/// Chain node operations used by the pipeline.
pub trait ChainRpc: Send + Sync {
    /// `getNonce(owner)` on the forwarder.
    fn forwarder_nonce(
        &self,
        forwarder: Address,
        owner: Address,
    ) -> impl Future<Output = Result<U256, RpcError>> + Send;

    /// `eth_estimateGas` for a direct call.
    fn estimate_gas(
        &self,
        call: &CallRequest,
    ) -> impl Future<Output = Result<U256, RpcError>> + Send;

    /// `eth_call` of `execute(request, signature)` on the forwarder.
    ///
    /// A reverting `execute` (bad signature, stale nonce) is an
    /// [`RpcError::Reverted`]; a failing inner call is a successful
    /// simulation with `success == false`.
    fn simulate_execute(
        &self,
        forwarder: Address,
        signed: &SignedRequest,
    ) -> impl Future<Output = Result<ExecuteOutcome, RpcError>> + Send;

    /// Broadcasts `execute(request, signature)`, paid by the relayer.
    fn send_execute(
        &self,
        forwarder: Address,
        signed: &SignedRequest,
    ) -> impl Future<Output = Result<TxHash, RpcError>> + Send;

    /// `eth_getTransactionReceipt`; `None` while pending.
    fn transaction_receipt(
        &self,
        tx_hash: TxHash,
    ) -> impl Future<Output = Result<Option<ReceiptSummary>, RpcError>> + Send;

    /// Called once when `tx_hash` has no receipt by the submitter's deadline.
    ///
    /// Implementations that allocate sender nonces locally drop that state
    /// here, so the next send starts from the node's view.
    fn receipt_overdue(&self, tx_hash: TxHash) -> impl Future<Output = ()> + Send {
        let _ = tx_hash;
        std::future::ready(())
    }

    /// Latest block number.
    fn block_number(&self) -> impl Future<Output = Result<u64, RpcError>> + Send;

    /// `eth_getLogs`.
    fn logs(
        &self,
        filter: &LogFilter,
    ) -> impl Future<Output = Result<Vec<RawLog>, RpcError>> + Send;
}

impl<T: ChainRpc> ChainRpc for Arc<T> {
    fn forwarder_nonce(
        &self,
        forwarder: Address,
        owner: Address,
    ) -> impl Future<Output = Result<U256, RpcError>> + Send {
        (**self).forwarder_nonce(forwarder, owner)
    }

    fn estimate_gas(
        &self,
        call: &CallRequest,
    ) -> impl Future<Output = Result<U256, RpcError>> + Send {
        (**self).estimate_gas(call)
    }

    fn simulate_execute(
        &self,
        forwarder: Address,
        signed: &SignedRequest,
    ) -> impl Future<Output = Result<ExecuteOutcome, RpcError>> + Send {
        (**self).simulate_execute(forwarder, signed)
    }

    fn send_execute(
        &self,
        forwarder: Address,
        signed: &SignedRequest,
    ) -> impl Future<Output = Result<TxHash, RpcError>> + Send {
        (**self).send_execute(forwarder, signed)
    }

    fn transaction_receipt(
        &self,
        tx_hash: TxHash,
    ) -> impl Future<Output = Result<Option<ReceiptSummary>, RpcError>> + Send {
        (**self).transaction_receipt(tx_hash)
    }

    fn receipt_overdue(&self, tx_hash: TxHash) -> impl Future<Output = ()> + Send {
        (**self).receipt_overdue(tx_hash)
    }

    fn block_number(&self) -> impl Future<Output = Result<u64, RpcError>> + Send {
        (**self).block_number()
    }

    fn logs(
        &self,
        filter: &LogFilter,
    ) -> impl Future<Output = Result<Vec<RawLog>, RpcError>> + Send {
        (**self).logs(filter)
    }
}
