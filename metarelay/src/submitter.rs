//! Relay submission and confirmation.
//!
//! The signature is checked first, against the deployment's domain. The
//! remaining work runs under a per-holder lock and goes through the same
//! checks the forwarder will make, in the same order, before anything is
//! broadcast:
//!
//! 1. no earlier broadcast for the holder is still unresolved;
//! 2. the request nonce equals the forwarder's current nonce;
//! 3. `execute` simulated with `eth_call` succeeds and reports a successful
//!    inner call.
//!
//! Only then is `execute` sent, exactly once. A broadcast transaction is never
//! re-sent: if its receipt does not arrive before the deadline the outcome is
//! reported as [`RelayStatus::Unknown`], the holder is held back until the
//! transaction resolves, and it can be re-checked with
//! [`RelaySubmitter::poll_receipt`].

use std::sync::Arc;

use alloy_primitives::{Address, TxHash, U256};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::DeploymentConfig;
use crate::error::{MetaTxError, RpcError, revert_reason};
use crate::nonce::NonceTracker;
use crate::receipt::{RelayReceipt, RelayStatus};
use crate::request::SignedRequest;
use crate::rpc::{ChainRpc, ReceiptSummary};

/// A broadcast whose receipt deadline passed.
#[derive(Debug, Clone, Copy)]
struct Unresolved {
    nonce: U256,
    tx_hash: TxHash,
    since: Instant,
}

/// Submits signed requests to one forwarder deployment.
#[derive(Debug)]
pub struct RelaySubmitter<R> {
    rpc: R,
    nonces: NonceTracker<R>,
    deployment: DeploymentConfig,
    /// One lock per holder with a submission in progress.
    holders: DashMap<Address, Arc<Mutex<()>>>,
    unresolved: DashMap<Address, Unresolved>,
}

impl<R: ChainRpc + Clone> RelaySubmitter<R> {
    /// Creates a submitter for `deployment`.
    pub fn new(rpc: R, deployment: DeploymentConfig) -> Self {
        Self {
            nonces: NonceTracker::new(rpc.clone(), deployment.policy.retry),
            rpc,
            deployment,
            holders: DashMap::new(),
            unresolved: DashMap::new(),
        }
    }
}

impl<R: ChainRpc> RelaySubmitter<R> {
    /// The deployment this submitter relays to.
    pub const fn deployment(&self) -> &DeploymentConfig {
        &self.deployment
    }

    /// Hash of the holder's broadcast that is still waiting for a receipt.
    #[must_use]
    pub fn unresolved(&self, holder: Address) -> Option<TxHash> {
        self.unresolved.get(&holder).map(|entry| entry.tx_hash)
    }

    fn holder_lock(&self, holder: Address) -> Arc<Mutex<()>> {
        let entry = self.holders.entry(holder).or_default();
        Arc::clone(entry.value())
    }

    /// Drops the holder's lock once nobody else waits on it.
    fn release_holder(&self, holder: Address, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.holders
            .remove_if(&holder, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Validates, simulates, sends and confirms `signed`.
    ///
    /// Returns a receipt whose status is `success`, `reverted` or `unknown`.
    ///
    /// # Errors
    ///
    /// - [`MetaTxError::InvalidSignature`] if the signature does not recover to `request.from`
    /// - [`MetaTxError::SubmissionPending`] while the holder's previous broadcast is unresolved
    /// - [`MetaTxError::StaleNonce`] if the forwarder's nonce moved on
    /// - [`MetaTxError::RelayReverted`] if simulation fails; nothing is sent
    /// - [`MetaTxError::RpcUnavailable`] / [`MetaTxError::Rpc`] on node failures
    #[cfg_attr(feature = "telemetry", tracing::instrument(
        name = "relay_submit",
        skip_all,
        fields(from = %signed.request.from, nonce = %signed.request.nonce),
        err
    ))]
    pub async fn submit(&self, signed: SignedRequest) -> Result<RelayReceipt, MetaTxError> {
        self.verify_signature(&signed)?;

        let holder = signed.request.from;
        let lock = self.holder_lock(holder);
        let serial = lock.lock().await;
        let result = self.relay(&signed).await;
        drop(serial);
        self.release_holder(holder, lock);
        result
    }

    async fn relay(&self, signed: &SignedRequest) -> Result<RelayReceipt, MetaTxError> {
        let holder = signed.request.from;
        self.check_unresolved(holder).await?;
        self.check_nonce(signed).await?;
        self.simulate(signed).await?;

        let forwarder = self.deployment.forwarder;
        let tx_hash = traced!(
            self.rpc.send_execute(forwarder, signed),
            tracing::info_span!("send_execute", %forwarder)
        )
        .map_err(|e| match e {
            RpcError::Reverted { reason } => MetaTxError::RelayReverted {
                tx_hash: None,
                reason,
            },
            other => other.into(),
        })?;

        #[cfg(feature = "telemetry")]
        tracing::info!(%tx_hash, "relay transaction broadcast");

        let receipt = self.await_receipt(tx_hash).await?;
        if receipt.status == RelayStatus::Unknown {
            self.unresolved.insert(
                holder,
                Unresolved {
                    nonce: signed.request.nonce,
                    tx_hash,
                    since: Instant::now(),
                },
            );
            self.rpc.receipt_overdue(tx_hash).await;
        }
        Ok(receipt)
    }

    /// Re-queries a previously broadcast transaction once.
    ///
    /// A transaction without a receipt is reported as `pending`.
    ///
    /// # Errors
    ///
    /// Returns [`MetaTxError::RpcUnavailable`] / [`MetaTxError::Rpc`] on node failures.
    pub async fn poll_receipt(&self, tx_hash: TxHash) -> Result<RelayReceipt, MetaTxError> {
        let mut receipt = RelayReceipt::pending(tx_hash);
        if let Some(summary) = self.fetch_receipt(tx_hash).await? {
            apply(&mut receipt, summary);
            self.unresolved.retain(|_, prior| prior.tx_hash != tx_hash);
        }
        Ok(receipt)
    }

    /// Refuses a new submission while the holder's last broadcast has no
    /// receipt, unless the hold expired or the forwarder consumed its nonce.
    async fn check_unresolved(&self, holder: Address) -> Result<(), MetaTxError> {
        let Some(prior) = self.unresolved.get(&holder).map(|entry| *entry.value()) else {
            return Ok(());
        };
        if prior.since.elapsed() >= self.deployment.policy.unresolved_hold() {
            #[cfg(feature = "telemetry")]
            tracing::warn!(tx_hash = %prior.tx_hash, "unresolved broadcast hold expired");
            self.unresolved.remove(&holder);
            return Ok(());
        }
        if self.poll_receipt(prior.tx_hash).await?.status.is_terminal() {
            return Ok(());
        }
        let current = self
            .nonces
            .current_nonce(self.deployment.forwarder, holder)
            .await?;
        if current > prior.nonce {
            self.unresolved.remove(&holder);
            return Ok(());
        }
        #[cfg(feature = "telemetry")]
        tracing::warn!(tx_hash = %prior.tx_hash, "previous broadcast unresolved, not submitting");
        Err(MetaTxError::SubmissionPending {
            tx_hash: prior.tx_hash,
        })
    }

    fn verify_signature(&self, signed: &SignedRequest) -> Result<(), MetaTxError> {
        let expected = signed.request.from;
        let recovered = self
            .deployment
            .envelope(signed.request.clone())
            .recover_signer(&signed.signature);
        if recovered == Some(expected) {
            Ok(())
        } else {
            Err(MetaTxError::InvalidSignature {
                expected,
                recovered,
            })
        }
    }

    async fn check_nonce(&self, signed: &SignedRequest) -> Result<(), MetaTxError> {
        let current = self
            .nonces
            .current_nonce(self.deployment.forwarder, signed.request.from)
            .await?;
        if current == signed.request.nonce {
            return Ok(());
        }
        #[cfg(feature = "telemetry")]
        tracing::warn!(signed = %signed.request.nonce, %current, "stale nonce, not submitting");
        Err(MetaTxError::StaleNonce {
            signed: signed.request.nonce,
            current,
        })
    }

    async fn simulate(&self, signed: &SignedRequest) -> Result<(), MetaTxError> {
        let forwarder = self.deployment.forwarder;
        let simulated = traced!(
            self.deployment
                .policy
                .retry
                .run("simulate_execute", || self.rpc.simulate_execute(forwarder, signed)),
            tracing::debug_span!("simulate_execute", %forwarder)
        );
        match simulated {
            Ok(outcome) if outcome.success => Ok(()),
            Ok(outcome) => Err(MetaTxError::RelayReverted {
                tx_hash: None,
                reason: revert_reason(&outcome.return_data),
            }),
            Err(RpcError::Reverted { reason }) => Err(MetaTxError::RelayReverted {
                tx_hash: None,
                reason,
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch_receipt(&self, tx_hash: TxHash) -> Result<Option<ReceiptSummary>, MetaTxError> {
        let summary = self
            .deployment
            .policy
            .retry
            .run("transaction_receipt", || self.rpc.transaction_receipt(tx_hash))
            .await?;
        Ok(summary)
    }

    /// Polls until the transaction is mined or the receipt deadline passes.
    ///
    /// Transport failures count as "not yet" and are retried with backoff
    /// until the deadline; any other node error is returned.
    async fn await_receipt(&self, tx_hash: TxHash) -> Result<RelayReceipt, MetaTxError> {
        let policy = self.deployment.policy;
        // No deadline at all if it would not fit in an `Instant`.
        let deadline = Instant::now().checked_add(policy.receipt_timeout());
        let mut receipt = RelayReceipt::pending(tx_hash);
        let mut failures = 0u32;
        loop {
            let wait = match self.rpc.transaction_receipt(tx_hash).await {
                Ok(Some(summary)) => {
                    apply(&mut receipt, summary);
                    return Ok(receipt);
                }
                Ok(None) => {
                    failures = 0;
                    policy.receipt_poll_interval()
                }
                Err(e) if e.is_transient() => {
                    failures = failures.saturating_add(1);
                    let delay = policy.retry.backoff(failures).max(policy.receipt_poll_interval());
                    #[cfg(feature = "telemetry")]
                    tracing::warn!(%tx_hash, failures, ?delay, error = %e, "receipt poll failed");
                    delay
                }
                Err(e) => return Err(e.into()),
            };
            let wait = match deadline {
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        #[cfg(feature = "telemetry")]
                        tracing::warn!(%tx_hash, "receipt deadline elapsed, outcome unknown");
                        receipt.observe(RelayStatus::Unknown, None);
                        return Ok(receipt);
                    }
                    wait.min(left)
                }
                None => wait,
            };
            tokio::time::sleep(wait).await;
        }
    }
}

/// Classifies a mined `execute`.
///
/// `Success` means the forwarder's `execute` did not revert. The inner call's
/// own result is not in the receipt: an inner call that fails because state
/// changed between simulation and inclusion is still reported as `Success`.
fn apply(receipt: &mut RelayReceipt, summary: ReceiptSummary) {
    let status = if summary.success {
        RelayStatus::Success
    } else {
        RelayStatus::Reverted
    };
    receipt.observe(status, Some(summary.block_number));
}
