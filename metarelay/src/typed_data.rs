//! EIP-712 typed data for forward requests.
//!
//! The envelope produced here is what a wallet receives through
//! `eth_signTypedData_v4`. Its schema is a fixed constant whose field order is
//! the one the forwarder contract hashes; the digest is computed through a
//! `sol!` struct declared with the same order, and a test keeps the two in
//! lockstep.

use alloy_primitives::{Address, B256, Signature};
use alloy_sol_types::{Eip712Domain, SolStruct, eip712_domain};
use serde::Serialize;

use crate::encoding::lowercase_address;
use crate::request::ForwardRequest;

/// Solidity mirrors of the signed structures.
pub mod eip712 {
    use alloy_sol_types::sol;

    sol! {
        /// Forward request as hashed by the forwarder contract.
        ///
        /// Field order MUST match the forwarder's `_TYPEHASH`.
        #[derive(Debug, PartialEq, Eq)]
        struct ForwardRequest {
            address from;
            address to;
            uint256 value;
            uint256 gas;
            uint256 nonce;
            bytes data;
        }
    }
}

impl From<&ForwardRequest> for eip712::ForwardRequest {
    fn from(request: &ForwardRequest) -> Self {
        Self {
            from: request.from,
            to: request.to,
            value: request.value,
            gas: request.gas_limit,
            nonce: request.nonce,
            data: request.data.clone(),
        }
    }
}

/// Primary type of every envelope.
pub const PRIMARY_TYPE: &str = "ForwardRequest";

/// One `{ name, type }` entry of a typed-data schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TypeField {
    /// Field name.
    pub name: &'static str,
    /// Solidity type.
    #[serde(rename = "type")]
    pub ty: &'static str,
}

const fn field(name: &'static str, ty: &'static str) -> TypeField {
    TypeField { name, ty }
}

/// Fields of the `EIP712Domain` type.
pub const EIP712_DOMAIN_FIELDS: [TypeField; 4] = [
    field("name", "string"),
    field("version", "string"),
    field("chainId", "uint256"),
    field("verifyingContract", "address"),
];

/// Fields of the `ForwardRequest` type, in forwarder order.
pub const FORWARD_REQUEST_FIELDS: [TypeField; 6] = [
    field("from", "address"),
    field("to", "address"),
    field("value", "uint256"),
    field("gas", "uint256"),
    field("nonce", "uint256"),
    field("data", "bytes"),
];

/// The `types` member of the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TypeSchema {
    /// Domain type.
    #[serde(rename = "EIP712Domain")]
    pub domain: &'static [TypeField],
    /// Message type.
    #[serde(rename = "ForwardRequest")]
    pub forward_request: &'static [TypeField],
}

/// The one schema every forward request is signed under.
pub const FORWARD_REQUEST_SCHEMA: TypeSchema = TypeSchema {
    domain: &EIP712_DOMAIN_FIELDS,
    forward_request: &FORWARD_REQUEST_FIELDS,
};

impl TypeSchema {
    /// EIP-712 `encodeType` of the primary type, e.g.
    /// `ForwardRequest(address from,address to,...)`.
    #[must_use]
    pub fn encode_primary_type(&self) -> String {
        let fields = self
            .forward_request
            .iter()
            .map(|f| format!("{} {}", f.ty, f.name))
            .collect::<Vec<_>>()
            .join(",");
        format!("{PRIMARY_TYPE}({fields})")
    }
}

/// Domain separator values.
///
/// `verifying_contract` must be the forwarder that will execute the request;
/// a mismatch yields a signature the contract silently fails to recover.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedDataDomain {
    /// Forwarder's EIP-712 name.
    pub name: String,
    /// Forwarder's EIP-712 version.
    pub version: String,
    /// EIP-155 chain id.
    pub chain_id: u64,
    /// Forwarder address.
    #[serde(with = "lowercase_address")]
    pub verifying_contract: Address,
}

impl TypedDataDomain {
    /// The equivalent alloy domain used for hashing.
    #[must_use]
    pub fn to_eip712(&self) -> Eip712Domain {
        eip712_domain! {
            name: self.name.clone(),
            version: self.version.clone(),
            chain_id: self.chain_id,
            verifying_contract: self.verifying_contract,
        }
    }

    /// EIP-712 domain separator.
    #[must_use]
    pub fn separator(&self) -> B256 {
        self.to_eip712().separator()
    }
}

/// The complete structure handed to a wallet for signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedDataEnvelope {
    /// Fixed type schema.
    pub types: TypeSchema,
    /// Domain values.
    pub domain: TypedDataDomain,
    /// Always [`PRIMARY_TYPE`].
    pub primary_type: &'static str,
    /// The request being authorized.
    pub message: ForwardRequest,
}

impl TypedDataEnvelope {
    /// The 32-byte digest the holder signs.
    #[must_use]
    pub fn signing_hash(&self) -> B256 {
        eip712::ForwardRequest::from(&self.message).eip712_signing_hash(&self.domain.to_eip712())
    }

    /// Canonical JSON, as sent to `eth_signTypedData_v4`.
    ///
    /// # Errors
    ///
    /// Returns a serialization error; the envelope contains nothing that can
    /// fail to serialize in practice.
    pub fn to_canonical_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Recovers the EOA that produced `signature` over this envelope.
    ///
    /// Accepts 65-byte signatures (`v` as 0/1 or 27/28) and 64-byte
    /// EIP-2098 compact signatures.
    #[must_use]
    pub fn recover_signer(&self, signature: &[u8]) -> Option<Address> {
        let signature = match signature.len() {
            65 => Signature::from_raw(signature).ok()?,
            64 => Signature::from_erc2098(signature),
            _ => return None,
        };
        signature
            .recover_address_from_prehash(&self.signing_hash())
            .ok()
    }
}

/// Builds typed-data envelopes. Pure and deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypedDataBuilder;

impl TypedDataBuilder {
    /// Wraps `request` in the forwarder's typed-data envelope.
    #[must_use]
    pub fn build(
        domain_name: &str,
        domain_version: &str,
        chain_id: u64,
        verifying_contract: Address,
        request: ForwardRequest,
    ) -> TypedDataEnvelope {
        TypedDataEnvelope {
            types: FORWARD_REQUEST_SCHEMA,
            domain: TypedDataDomain {
                name: domain_name.to_owned(),
                version: domain_version.to_owned(),
                chain_id,
                verifying_contract,
            },
            primary_type: PRIMARY_TYPE,
            message: request,
        }
    }
}
