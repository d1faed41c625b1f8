//! Wallet abstraction.
//!
//! Signing is a suspending call that yields a signature or a rejection. No
//! callbacks, no partial states.

use std::future::Future;
use std::sync::Arc;

use alloy_primitives::{Address, Bytes};

use crate::typed_data::TypedDataEnvelope;

/// Failure reported by a signing provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SigningError {
    /// The holder declined the request.
    #[error("user rejected the signing request")]
    UserRejected,
    /// The wallet could not be reached or failed to answer.
    #[error("signing provider unavailable: {0}")]
    Unavailable(String),
}

/// Produces holder signatures over typed-data envelopes.
pub trait SigningProvider: Send + Sync {
    /// Asks `signer` to sign `envelope` (`eth_signTypedData_v4` semantics).
    ///
    /// Returns the raw 65-byte signature.
    fn sign_typed_data(
        &self,
        signer: Address,
        envelope: &TypedDataEnvelope,
    ) -> impl Future<Output = Result<Bytes, SigningError>> + Send;
}

impl<T: SigningProvider> SigningProvider for Arc<T> {
    fn sign_typed_data(
        &self,
        signer: Address,
        envelope: &TypedDataEnvelope,
    ) -> impl Future<Output = Result<Bytes, SigningError>> + Send {
        (**self).sign_typed_data(signer, envelope)
    }
}
