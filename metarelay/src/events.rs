//! Event reconciliation.
//!
//! Registry events are read back from the chain in bounded pages and folded
//! into a [`RegistrationLedger`], the local projection of what the chain says
//! happened. Pages are requested lazily, one `eth_getLogs` call per page, and
//! every page comes out ordered by `(block_number, log_index)`.
//!
//! Nodes cap the size of log queries in different ways (block span, result
//! count). When a query is refused as too large the span is halved and the
//! same window is retried; only a single-block window that is still refused is
//! reported as an error.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use alloy_primitives::{Address, B256, TxHash, keccak256};
use alloy_sol_types::SolValue;
use futures_util::{Stream, TryStreamExt, stream};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::DeploymentConfig;
use crate::encoding::lowercase_address;
use crate::error::{MetaTxError, RpcError};
use crate::retry::RetryPolicy;
use crate::rpc::{ChainRpc, LogFilter, RawLog};

/// One `Registered(name, who)` event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationEvent {
    /// Registered name.
    pub name: String,
    /// Account that registered it.
    #[serde(with = "lowercase_address")]
    pub who: Address,
    /// Block the event was emitted in.
    pub block_number: u64,
    /// Emitting transaction.
    pub transaction_hash: TxHash,
    /// Position of the log within its block.
    pub log_index: u64,
}

impl RegistrationEvent {
    /// Decodes a `Registered(string name, address who)` log.
    ///
    /// Both layouts are accepted: `who` in the data after `name`, or `who` as
    /// the first indexed topic. Returns `None` for anything else.
    #[must_use]
    pub fn from_log(log: &RawLog) -> Option<Self> {
        let (name, who) = match log.topics.len() {
            1 => <(String, Address)>::abi_decode_params(&log.data).ok()?,
            2 => {
                let (name,) = <(String,)>::abi_decode_params(&log.data).ok()?;
                (name, Address::from_word(log.topics[1]))
            }
            _ => return None,
        };
        Some(Self {
            name,
            who,
            block_number: log.block_number,
            transaction_hash: log.transaction_hash,
            log_index: log.log_index,
        })
    }
}

/// One page of logs and the inclusive block window it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPage {
    /// First block of the window.
    pub from_block: u64,
    /// Last block of the window.
    pub to_block: u64,
    /// Logs in `(block_number, log_index)` order.
    pub logs: Vec<RawLog>,
}

impl LogPage {
    /// Decodes the page's registration events, skipping foreign logs.
    #[must_use]
    pub fn registrations(&self) -> Vec<RegistrationEvent> {
        self.logs
            .iter()
            .filter_map(|log| {
                let event = RegistrationEvent::from_log(log);
                #[cfg(feature = "telemetry")]
                {
                    if event.is_none() {
                        tracing::warn!(tx = %log.transaction_hash, index = log.log_index, "undecodable registration log");
                    }
                }
                event
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
struct Cursor {
    next: u64,
    to: u64,
    span: u64,
    done: bool,
}

/// Paged, ordered event queries against one chain.
#[derive(Debug, Clone)]
pub struct EventReconciler<R> {
    rpc: R,
    lower_bound: u64,
    max_span: u64,
    retry: RetryPolicy,
}

impl<R: ChainRpc> EventReconciler<R> {
    /// Creates a reconciler that never scans below `deployment.event_scan_from_block`.
    pub const fn new(rpc: R, deployment: &DeploymentConfig) -> Self {
        Self {
            rpc,
            lower_bound: deployment.event_scan_from_block,
            max_span: deployment.policy.max_log_block_span,
            retry: deployment.policy.retry,
        }
    }

    /// Current chain head.
    ///
    /// # Errors
    ///
    /// Returns [`MetaTxError::RpcUnavailable`] when the node stays unreachable.
    pub async fn head(&self) -> Result<u64, MetaTxError> {
        Ok(self.retry.run("block_number", || self.rpc.block_number()).await?)
    }

    /// Lazily pages through `event_signature` logs of `contract` in
    /// `[from_block, to_block]`.
    ///
    /// `from_block` is raised to the configured lower bound. The stream ends
    /// after the page containing `to_block`, or at the first error.
    pub fn fetch(
        &self,
        contract: Address,
        event_signature: &str,
        from_block: u64,
        to_block: u64,
    ) -> impl Stream<Item = Result<LogPage, MetaTxError>> + Send + '_ {
        let topic0 = keccak256(event_signature.as_bytes());
        let next = from_block.max(self.lower_bound);
        let cursor = Cursor {
            next,
            to: to_block,
            span: self.max_span.max(1),
            done: next > to_block,
        };
        stream::try_unfold(cursor, move |cursor| self.next_page(contract, topic0, cursor))
    }

    /// [`Self::fetch`] decoded into registration events, one batch per page.
    pub fn registrations(
        &self,
        contract: Address,
        event_signature: &str,
        from_block: u64,
        to_block: u64,
    ) -> impl Stream<Item = Result<Vec<RegistrationEvent>, MetaTxError>> + Send + '_ {
        self.fetch(contract, event_signature, from_block, to_block)
            .map_ok(|page| page.registrations())
    }

    async fn next_page(
        &self,
        contract: Address,
        topic0: B256,
        mut cursor: Cursor,
    ) -> Result<Option<(LogPage, Cursor)>, MetaTxError> {
        if cursor.done {
            return Ok(None);
        }
        loop {
            let end = cursor.to.min(cursor.next.saturating_add(cursor.span - 1));
            let filter = LogFilter {
                address: contract,
                topic0,
                from_block: cursor.next,
                to_block: end,
            };
            let fetched = traced!(
                self.retry.run("get_logs", || self.rpc.logs(&filter)),
                tracing::debug_span!("get_logs", from = filter.from_block, to = filter.to_block)
            );
            match fetched {
                Ok(mut logs) => {
                    logs.sort_by_key(|log| (log.block_number, log.log_index));
                    let page = LogPage {
                        from_block: cursor.next,
                        to_block: end,
                        logs,
                    };
                    cursor.done = end >= cursor.to;
                    cursor.next = end.saturating_add(1);
                    return Ok(Some((page, cursor)));
                }
                Err(RpcError::RangeTooLarge(reason)) if end > cursor.next => {
                    cursor.span = ((end - cursor.next + 1) / 2).max(1);
                    #[cfg(feature = "telemetry")]
                    tracing::debug!(%reason, span = cursor.span, "log range refused, halving");
                    #[cfg(not(feature = "telemetry"))]
                    let _ = reason;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Deduplicated, ordered projection of registration events.
///
/// Events are keyed by `(transaction_hash, log_index)`, so applying
/// overlapping ranges in any order converges on the same set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationLedger {
    ordered: BTreeMap<(u64, u64), RegistrationEvent>,
    seen: HashSet<(TxHash, u64)>,
}

impl RegistrationLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds `events` in; returns how many were new.
    pub fn apply(&mut self, events: impl IntoIterator<Item = RegistrationEvent>) -> usize {
        let mut added = 0;
        for event in events {
            if self.seen.insert((event.transaction_hash, event.log_index)) {
                self.ordered
                    .insert((event.block_number, event.log_index), event);
                added += 1;
            }
        }
        added
    }

    /// All events in chain order.
    pub fn events(&self) -> impl Iterator<Item = &RegistrationEvent> {
        self.ordered.values()
    }

    /// Events registered by `who`, in chain order.
    pub fn by_account(&self, who: Address) -> impl Iterator<Item = &RegistrationEvent> {
        self.events().filter(move |event| event.who == who)
    }

    /// Number of distinct events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// Whether no events were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

/// Incremental scanner that follows the chain head.
#[derive(Debug)]
pub struct EventPoller<R> {
    reconciler: EventReconciler<R>,
    contract: Address,
    event_signature: String,
    cursor: u64,
    ledger: Arc<RwLock<RegistrationLedger>>,
}

impl<R: ChainRpc> EventPoller<R> {
    /// Starts at the deployment's scan block with an empty ledger.
    pub fn new(rpc: R, deployment: &DeploymentConfig) -> Self {
        Self {
            reconciler: EventReconciler::new(rpc, deployment),
            contract: deployment.target,
            event_signature: deployment.event_signature.clone(),
            cursor: deployment.event_scan_from_block,
            ledger: Arc::new(RwLock::new(RegistrationLedger::new())),
        }
    }

    /// Next block that will be scanned.
    #[must_use]
    pub const fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Shared handle to the projection.
    #[must_use]
    pub fn ledger(&self) -> Arc<RwLock<RegistrationLedger>> {
        Arc::clone(&self.ledger)
    }

    /// Scans from the cursor to the current head.
    ///
    /// The cursor advances page by page, so a failure part-way keeps the
    /// progress made so far.
    ///
    /// # Errors
    ///
    /// Returns the first node error; the cursor stays on the failed page.
    pub async fn poll(&mut self) -> Result<usize, MetaTxError> {
        let head = self.reconciler.head().await?;
        if head < self.cursor {
            return Ok(0);
        }
        let mut added = 0;
        let mut pages = std::pin::pin!(self.reconciler.fetch(
            self.contract,
            &self.event_signature,
            self.cursor,
            head
        ));
        while let Some(page) = pages.try_next().await? {
            added += self.ledger.write().await.apply(page.registrations());
            self.cursor = page.to_block.saturating_add(1);
        }
        #[cfg(feature = "telemetry")]
        tracing::debug!(head, added, cursor = self.cursor, "event poll complete");
        Ok(added)
    }
}
