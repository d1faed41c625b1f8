//! Holder sessions and complete signing rounds.
//!
//! A [`Session`] exists from wallet connect to disconnect and is the only
//! place the holder's identity lives; every core call takes it explicitly.
//! A round is nonce read, gas estimate, signature, submission and receipt.
//! A session runs at most one round at a time.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::config::DeploymentConfig;
use crate::coordinator::SigningCoordinator;
use crate::error::MetaTxError;
use crate::factory::ForwardRequestFactory;
use crate::nonce::NonceTracker;
use crate::receipt::RelayReceipt;
use crate::request::{Intent, SignedRequest};
use crate::rpc::ChainRpc;
use crate::signer::SigningProvider;
use crate::submitter::RelaySubmitter;

/// Held for the duration of one round.
#[derive(Debug)]
pub struct RoundGuard {
    _lock: OwnedMutexGuard<()>,
}

/// A connected holder bound to one deployment.
#[derive(Debug, Clone)]
pub struct Session {
    holder: Address,
    deployment: DeploymentConfig,
    round: Arc<Mutex<()>>,
}

impl Session {
    /// Opens a session for `holder`.
    ///
    /// # Errors
    ///
    /// Returns [`MetaTxError::Config`] if the deployment is invalid.
    pub fn connect(holder: Address, deployment: DeploymentConfig) -> Result<Self, MetaTxError> {
        deployment.validate()?;
        #[cfg(feature = "telemetry")]
        tracing::info!(%holder, forwarder = %deployment.forwarder, "session opened");
        Ok(Self {
            holder,
            deployment,
            round: Arc::new(Mutex::new(())),
        })
    }

    /// The connected account.
    #[must_use]
    pub const fn holder(&self) -> Address {
        self.holder
    }

    /// The deployment this session talks to.
    #[must_use]
    pub const fn deployment(&self) -> &DeploymentConfig {
        &self.deployment
    }

    /// An intent from the holder to `target`.
    #[must_use]
    pub const fn intent(&self, target: Address, call_data: Bytes) -> Intent {
        Intent::new(self.holder, target, call_data)
    }

    /// An intent from the holder to the deployment's target contract.
    #[must_use]
    pub const fn target_intent(&self, call_data: Bytes) -> Intent {
        self.intent(self.deployment.target, call_data)
    }

    /// Marks the start of a round.
    ///
    /// # Errors
    ///
    /// Returns [`MetaTxError::SigningInProgress`] while the previous round is
    /// still unresolved.
    pub fn begin_round(&self) -> Result<RoundGuard, MetaTxError> {
        Arc::clone(&self.round)
            .try_lock_owned()
            .map(|lock| RoundGuard { _lock: lock })
            .map_err(|_| MetaTxError::SigningInProgress {
                signer: self.holder,
                forwarder: self.deployment.forwarder,
            })
    }

    /// Whether a round is currently open.
    #[must_use]
    pub fn in_round(&self) -> bool {
        self.round.try_lock().is_err()
    }
}

/// The full pipeline for one deployment.
#[derive(Debug)]
pub struct Pipeline<R, S> {
    deployment: DeploymentConfig,
    factory: ForwardRequestFactory<R>,
    nonces: NonceTracker<R>,
    coordinator: SigningCoordinator<S>,
    submitter: RelaySubmitter<R>,
}

impl<R, S> Pipeline<R, S>
where
    R: ChainRpc + Clone,
    S: SigningProvider,
{
    /// Wires the components for `deployment`.
    pub fn new(rpc: R, signer: S, deployment: DeploymentConfig) -> Self {
        let retry = deployment.policy.retry;
        Self {
            factory: ForwardRequestFactory::new(rpc.clone(), retry),
            nonces: NonceTracker::new(rpc.clone(), retry),
            coordinator: SigningCoordinator::new(signer),
            submitter: RelaySubmitter::new(rpc, deployment.clone()),
            deployment,
        }
    }

    /// Opens a session for `holder` on this pipeline's deployment.
    ///
    /// # Errors
    ///
    /// Returns [`MetaTxError::Config`] if the deployment is invalid.
    pub fn connect(&self, holder: Address) -> Result<Session, MetaTxError> {
        Session::connect(holder, self.deployment.clone())
    }

    /// The relay half, for callers that receive already signed requests.
    pub const fn submitter(&self) -> &RelaySubmitter<R> {
        &self.submitter
    }

    /// Builds and signs `intent` without submitting it.
    ///
    /// # Errors
    ///
    /// Any error of [`ForwardRequestFactory::prepare`] or
    /// [`SigningCoordinator::sign`]; [`MetaTxError::Config`] if the session
    /// belongs to another deployment.
    pub async fn authorize(
        &self,
        session: &Session,
        intent: &Intent,
    ) -> Result<SignedRequest, MetaTxError> {
        if session.deployment.forwarder != self.deployment.forwarder {
            return Err(MetaTxError::Config(
                "session belongs to a different deployment".into(),
            ));
        }
        let request = self
            .factory
            .prepare(&self.nonces, self.deployment.forwarder, intent)
            .await?;
        let envelope = self.deployment.envelope(request);
        self.coordinator.sign(envelope, session.holder).await
    }

    /// Runs one complete round: prepare, sign, submit, confirm.
    ///
    /// # Errors
    ///
    /// [`MetaTxError::SigningInProgress`] if the session is mid-round, then
    /// any error of [`Self::authorize`] or [`RelaySubmitter::submit`].
    #[cfg_attr(feature = "telemetry", tracing::instrument(
        name = "meta_tx_round",
        skip_all,
        fields(holder = %session.holder, target = %intent.target),
        err
    ))]
    pub async fn execute_round(
        &self,
        session: &Session,
        intent: &Intent,
    ) -> Result<RelayReceipt, MetaTxError> {
        let _round = session.begin_round()?;
        let signed = self.authorize(session, intent).await?;
        self.submitter.submit(signed).await
    }
}
