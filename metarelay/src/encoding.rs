//! Serde helpers for the forwarder wire format.
//!
//! Large integers travel as decimal strings so that `JavaScript`-side wallets
//! never round them through a float, and addresses are always rendered in one
//! canonical form: lowercase, `0x`-prefixed hex. Deserialization is lenient
//! (decimal or `0x` hex strings, plain JSON integers, any address casing).

/// `U256` as a decimal string.
pub mod decimal_u256 {
    use std::str::FromStr;

    use alloy_primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer, de};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Number(u64),
    }

    /// Serializes `value` as a base-10 string.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    /// Parses a decimal string, a `0x` hex string or a JSON integer.
    ///
    /// # Errors
    ///
    /// Fails when the input is not a non-negative integer that fits 256 bits.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(U256::from(n)),
            Repr::Text(s) => U256::from_str(s.trim())
                .map_err(|_| de::Error::custom(format!("invalid uint256 value: {s}"))),
        }
    }
}

/// `Address` as lowercase `0x` hex.
pub mod lowercase_address {
    use alloy_primitives::Address;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Renders the canonical lowercase form.
    #[must_use]
    pub fn render(address: &Address) -> String {
        format!("{address:#x}")
    }

    /// Serializes `address` as lowercase hex.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(address: &Address, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&render(address))
    }

    /// Accepts any casing; checksums are not enforced.
    ///
    /// # Errors
    ///
    /// Fails when the input is not 20 bytes of hex.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Address, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<Address>().map_err(serde::de::Error::custom)
    }
}
