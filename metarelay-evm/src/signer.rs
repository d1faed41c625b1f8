//! Signing providers.
//!
//! [`LocalSigningProvider`] signs with a private key held in-process (tests,
//! scripts, the CLI). [`RpcSigningProvider`] forwards the envelope to a
//! wallet endpoint with `eth_signTypedData_v4`.

use alloy_primitives::{Address, Bytes};
use alloy_rpc_client::RpcClient;
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use metarelay::{SigningError, SigningProvider, TypedDataEnvelope};
use url::Url;

/// EIP-1193 "user rejected request".
pub const USER_REJECTED_CODE: i64 = 4001;

/// Signs with a local private key.
#[derive(Debug, Clone)]
pub struct LocalSigningProvider {
    signer: PrivateKeySigner,
}

impl LocalSigningProvider {
    /// Wraps `signer`.
    #[must_use]
    pub const fn new(signer: PrivateKeySigner) -> Self {
        Self { signer }
    }

    /// Account this provider signs for.
    #[must_use]
    pub fn address(&self) -> Address {
        self.signer.address()
    }
}

impl SigningProvider for LocalSigningProvider {
    async fn sign_typed_data(
        &self,
        signer: Address,
        envelope: &TypedDataEnvelope,
    ) -> Result<Bytes, SigningError> {
        if signer != self.signer.address() {
            return Err(SigningError::Unavailable(format!("no key loaded for {signer}")));
        }
        let signature = self
            .signer
            .sign_hash(&envelope.signing_hash())
            .await
            .map_err(|e| SigningError::Unavailable(e.to_string()))?;
        Ok(Bytes::copy_from_slice(&signature.as_bytes()))
    }
}

/// Asks a remote wallet to sign through `eth_signTypedData_v4`.
#[derive(Debug, Clone)]
pub struct RpcSigningProvider {
    client: RpcClient,
}

impl RpcSigningProvider {
    /// Connects to the wallet endpoint at `url`.
    #[must_use]
    pub fn new_http(url: Url) -> Self {
        Self {
            client: RpcClient::new_http(url),
        }
    }
}

impl SigningProvider for RpcSigningProvider {
    async fn sign_typed_data(
        &self,
        signer: Address,
        envelope: &TypedDataEnvelope,
    ) -> Result<Bytes, SigningError> {
        let typed_data = envelope
            .to_canonical_json()
            .map_err(|e| SigningError::Unavailable(e.to_string()))?;
        let response: Result<Bytes, _> = self
            .client
            .request("eth_signTypedData_v4", (format!("{signer:#x}"), typed_data))
            .await;
        response.map_err(|e| match e.as_error_resp() {
            Some(payload) if payload.code == USER_REJECTED_CODE => SigningError::UserRejected,
            _ => SigningError::Unavailable(e.to_string()),
        })
    }
}
