//! Shared relay service state.

use std::collections::BTreeMap;
use std::sync::Arc;

use metarelay::{
    ChainRpc, DeploymentConfig, MetaTxError, NonceTracker, RegistrationLedger, RelaySubmitter,
};
use tokio::sync::RwLock;

/// Everything the service keeps for one deployment.
#[derive(Debug)]
pub struct Deployment<R> {
    /// Contracts, domain and policy.
    pub config: DeploymentConfig,
    /// Forwarder nonce reads.
    pub nonces: NonceTracker<R>,
    /// Relay submission.
    pub submitter: RelaySubmitter<R>,
    /// Registration projection fed by the background poller.
    pub ledger: Arc<RwLock<RegistrationLedger>>,
}

/// Deployments served by this relayer, keyed by tag.
#[derive(Debug)]
pub struct Relayer<R> {
    deployments: BTreeMap<String, Deployment<R>>,
}

impl<R> Default for Relayer<R> {
    fn default() -> Self {
        Self {
            deployments: BTreeMap::new(),
        }
    }
}

impl<R: ChainRpc + Clone> Relayer<R> {
    /// An empty relayer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `config` under `tag`, reading its events into `ledger`.
    pub fn insert(
        &mut self,
        tag: impl Into<String>,
        rpc: R,
        config: DeploymentConfig,
        ledger: Arc<RwLock<RegistrationLedger>>,
    ) {
        let deployment = Deployment {
            nonces: NonceTracker::new(rpc.clone(), config.policy.retry),
            submitter: RelaySubmitter::new(rpc, config.clone()),
            config,
            ledger,
        };
        self.deployments.insert(tag.into(), deployment);
    }
}

impl<R> Relayer<R> {
    /// Looks up a deployment.
    ///
    /// # Errors
    ///
    /// Returns [`MetaTxError::UnknownDeployment`] for unknown tags.
    pub fn get(&self, tag: &str) -> Result<&Deployment<R>, MetaTxError> {
        self.deployments
            .get(tag)
            .ok_or_else(|| MetaTxError::UnknownDeployment(tag.to_owned()))
    }

    /// All deployments in tag order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Deployment<R>)> {
        self.deployments.iter().map(|(tag, d)| (tag.as_str(), d))
    }

    /// Number of deployments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.deployments.len()
    }

    /// Whether no deployment is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deployments.is_empty()
    }
}

/// Shared handle passed to handlers.
pub type RelayerState<R> = Arc<Relayer<R>>;
