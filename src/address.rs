//! Account addresses.
//!
//! An address is a 20-byte account identifier. Its canonical printable form
//! is lowercase hex, and that form is what genesis configuration files and
//! tally maps use. The byte ordering of addresses equals the ordering of
//! their canonical strings, so sorting by either is interchangeable.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Length of an account address in bytes.
pub const ADDRESS_LEN: usize = 20;

/// Errors from decoding address bytes or strings.
#[derive(Clone, Debug, thiserror::Error)]
pub enum AddressError {
    #[error("address must be {ADDRESS_LEN} bytes, got {0}")]
    InvalidLength(usize),
    #[error("address is not valid hex: {0}")]
    InvalidHex(String),
}

/// A 20-byte account identifier.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    /// Decode an address from raw bytes, e.g. a trie key or value.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AddressError> {
        let arr: [u8; ADDRESS_LEN] = bytes
            .try_into()
            .map_err(|_| AddressError::InvalidLength(bytes.len()))?;
        Ok(Address(arr))
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        Address::from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_parse_round_trip() {
        let addr = Address::from_bytes(&[0xab; ADDRESS_LEN]).unwrap();
        let text = addr.to_string();
        assert_eq!(text.len(), ADDRESS_LEN * 2);
        assert_eq!(text.parse::<Address>().unwrap(), addr);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(matches!(
            Address::from_bytes(&[0u8; 19]),
            Err(AddressError::InvalidLength(19))
        ));
        assert!(matches!(
            "ab".parse::<Address>(),
            Err(AddressError::InvalidLength(1))
        ));
    }

    #[test]
    fn rejects_non_hex() {
        assert!(matches!(
            "zz".repeat(ADDRESS_LEN).parse::<Address>(),
            Err(AddressError::InvalidHex(_))
        ));
    }

    #[test]
    fn byte_order_matches_string_order() {
        let a = Address::from_bytes(&[0x01; ADDRESS_LEN]).unwrap();
        let b = Address::from_bytes(&[0xf0; ADDRESS_LEN]).unwrap();
        assert!(a < b);
        assert!(a.to_string() < b.to_string());
    }
}
