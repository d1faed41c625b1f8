//! Single-flight signing rounds.

use alloy_primitives::Address;
use dashmap::DashSet;

use crate::error::MetaTxError;
use crate::request::SignedRequest;
use crate::signer::SigningProvider;
use crate::typed_data::TypedDataEnvelope;

/// Removes the in-flight marker when the round ends, including when the
/// signing future is dropped mid-await.
struct InFlight<'a> {
    rounds: &'a DashSet<(Address, Address)>,
    key: (Address, Address),
}

impl<'a> InFlight<'a> {
    fn acquire(rounds: &'a DashSet<(Address, Address)>, key: (Address, Address)) -> Option<Self> {
        rounds.insert(key).then_some(Self { rounds, key })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.rounds.remove(&self.key);
    }
}

/// Obtains holder signatures, one round at a time per signer and forwarder.
///
/// A second request for the same `(signer, verifyingContract)` while a
/// wallet prompt is open is rejected rather than queued, so a holder never
/// sees two prompts for the same nonce.
#[derive(Debug)]
pub struct SigningCoordinator<S> {
    provider: S,
    rounds: DashSet<(Address, Address)>,
}

impl<S: SigningProvider> SigningCoordinator<S> {
    /// Creates a coordinator over `provider`.
    pub fn new(provider: S) -> Self {
        Self {
            provider,
            rounds: DashSet::new(),
        }
    }

    /// Whether a round is open for `signer` at `forwarder`.
    #[must_use]
    pub fn is_signing(&self, signer: Address, forwarder: Address) -> bool {
        self.rounds.contains(&(signer, forwarder))
    }

    /// Asks `signer` to sign `envelope` and checks the result.
    ///
    /// # Errors
    ///
    /// - [`MetaTxError::SignerMismatch`] if `envelope.message.from` is not `signer`
    /// - [`MetaTxError::SigningInProgress`] if a round is already open
    /// - [`MetaTxError::UserRejected`] / [`MetaTxError::ProviderUnavailable`] from the wallet
    /// - [`MetaTxError::InvalidSignature`] if the signature does not recover to `signer`
    pub async fn sign(
        &self,
        envelope: TypedDataEnvelope,
        signer: Address,
    ) -> Result<SignedRequest, MetaTxError> {
        if envelope.message.from != signer {
            return Err(MetaTxError::SignerMismatch {
                from: envelope.message.from,
                signer,
            });
        }
        let forwarder = envelope.domain.verifying_contract;
        let _round = InFlight::acquire(&self.rounds, (signer, forwarder))
            .ok_or(MetaTxError::SigningInProgress { signer, forwarder })?;

        let signature = traced!(
            self.provider.sign_typed_data(signer, &envelope),
            tracing::info_span!("sign_typed_data", %signer, %forwarder, nonce = %envelope.message.nonce)
        )?;

        match envelope.recover_signer(&signature) {
            Some(recovered) if recovered == signer => Ok(SignedRequest {
                request: envelope.message,
                signature,
            }),
            recovered => Err(MetaTxError::InvalidSignature {
                expected: signer,
                recovered,
            }),
        }
    }
}
