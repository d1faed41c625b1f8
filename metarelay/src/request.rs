//! Intents, forward requests and signed requests.

use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::encoding::{decimal_u256, lowercase_address};

/// What the holder wants executed, as handed over by the UI layer.
///
/// `call_data` is already ABI-encoded for the target method (selector plus
/// arguments); encoding belongs to the contract-binding layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    /// Holder account that will sign the request.
    #[serde(with = "lowercase_address")]
    pub sender: Address,
    /// Contract the forwarder will call.
    #[serde(with = "lowercase_address")]
    pub target: Address,
    /// Encoded call (selector + arguments).
    pub call_data: Bytes,
    /// Native value to forward; absent means a non-payable relay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
}

impl Intent {
    /// Creates a non-payable intent.
    #[must_use]
    pub const fn new(sender: Address, target: Address, call_data: Bytes) -> Self {
        Self {
            sender,
            target,
            call_data,
            value: None,
        }
    }

    /// Funds the forwarded call with `value` wei.
    #[must_use]
    pub const fn with_value(mut self, value: U256) -> Self {
        self.value = Some(value);
        self
    }

    /// Value to forward, zero unless the intent explicitly funds the call.
    #[must_use]
    pub fn value_or_zero(&self) -> U256 {
        self.value.unwrap_or(U256::ZERO)
    }
}

/// The request the forwarder verifies and executes.
///
/// Field order and names follow the forwarder's `ForwardRequest` struct; the
/// gas limit is called `gas` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForwardRequest {
    /// Signing holder.
    #[serde(with = "lowercase_address")]
    pub from: Address,
    /// Target contract.
    #[serde(with = "lowercase_address")]
    pub to: Address,
    /// Native value forwarded with the call.
    #[serde(with = "decimal_u256")]
    pub value: U256,
    /// Gas limit the forwarder passes to the inner call.
    #[serde(rename = "gas", with = "decimal_u256")]
    pub gas_limit: U256,
    /// Replay-protection counter of `from` at the forwarder.
    #[serde(with = "decimal_u256")]
    pub nonce: U256,
    /// Encoded call.
    pub data: Bytes,
}

/// A forward request together with the holder's signature over it.
///
/// Consumed exactly once by the relay submitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedRequest {
    /// The signed request snapshot.
    pub request: ForwardRequest,
    /// 65-byte `r || s || v` signature (64-byte compact signatures are accepted too).
    pub signature: Bytes,
}
