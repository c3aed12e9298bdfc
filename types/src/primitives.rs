// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Fixed-width primitives shared by every crate: addresses, digests and
//! signatures.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{IstanbulError, IstanbulResult};

/// Length of a validator address in bytes.
pub const ADDRESS_LENGTH: usize = 20;

/// Length of a digest in bytes.
pub const HASH_LENGTH: usize = 32;

/// Length of a signature in bytes.
pub const SIGNATURE_LENGTH: usize = 64;

fn decode_hex(s: &str) -> IstanbulResult<Vec<u8>> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(s).map_err(|e| IstanbulError::InvalidData(format!("Invalid hex: {}", e)))
}

/// A validator identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    /// The all-zero address. Used as the "no vote" sentinel in headers.
    pub const ZERO: Address = Address([0u8; ADDRESS_LENGTH]);

    pub const fn new(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> IstanbulResult<Self> {
        if bytes.len() != ADDRESS_LENGTH {
            return Err(IstanbulError::InvalidLength {
                what: "address",
                expected: ADDRESS_LENGTH,
                got: bytes.len(),
            });
        }
        let mut arr = [0u8; ADDRESS_LENGTH];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LENGTH]
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = IstanbulError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_slice(&decode_hex(s)?)
    }
}

impl From<[u8; ADDRESS_LENGTH]> for Address {
    fn from(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }
}

/// A 256-bit blake3 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Hash([u8; HASH_LENGTH]);

impl Hash {
    pub const ZERO: Hash = Hash([0u8; HASH_LENGTH]);

    pub const fn new(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Hash arbitrary bytes.
    pub fn of(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Hash the bcs encoding of a value.
    pub fn of_encoded<T: Serialize + ?Sized>(value: &T) -> IstanbulResult<Self> {
        let bytes = bcs::to_bytes(value)?;
        Ok(Self::of(&bytes))
    }

    pub fn from_slice(bytes: &[u8]) -> IstanbulResult<Self> {
        if bytes.len() != HASH_LENGTH {
            return Err(IstanbulError::InvalidLength {
                what: "hash",
                expected: HASH_LENGTH,
                got: bytes.len(),
            });
        }
        let mut arr = [0u8; HASH_LENGTH];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }

    /// Short form for log fields.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self)
    }
}

impl FromStr for Hash {
    type Err = IstanbulError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_slice(&decode_hex(s)?)
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A fixed-size signature, stored as its two 32-byte halves so the bcs
/// encoding is exactly 64 bytes with no length prefix.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    r: [u8; 32],
    s: [u8; 32],
}

impl Signature {
    pub fn from_bytes(bytes: &[u8; SIGNATURE_LENGTH]) -> Self {
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Self { r, s }
    }

    pub fn from_slice(bytes: &[u8]) -> IstanbulResult<Self> {
        let arr: &[u8; SIGNATURE_LENGTH] =
            bytes.try_into().map_err(|_| IstanbulError::InvalidLength {
                what: "signature",
                expected: SIGNATURE_LENGTH,
                got: bytes.len(),
            })?;
        Ok(Self::from_bytes(arr))
    }

    pub fn to_bytes(&self) -> [u8; SIGNATURE_LENGTH] {
        let mut out = [0u8; SIGNATURE_LENGTH];
        out[..32].copy_from_slice(&self.r);
        out[32..].copy_from_slice(&self.s);
        out
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature(0x{}..)", hex::encode(&self.r[..4]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_hex_roundtrip() {
        let addr = Address::new([0xAB; ADDRESS_LENGTH]);
        let parsed: Address = addr.to_string().parse().unwrap();
        assert_eq!(parsed, addr);
        assert!("0x1234".parse::<Address>().is_err());
    }

    #[test]
    fn test_zero_address() {
        assert!(Address::ZERO.is_zero());
        assert!(!Address::new([1; ADDRESS_LENGTH]).is_zero());
    }

    #[test]
    fn test_signature_encoding_is_fixed_width() {
        let sig = Signature::from_bytes(&[7u8; SIGNATURE_LENGTH]);
        let encoded = bcs::to_bytes(&sig).unwrap();
        assert_eq!(encoded.len(), SIGNATURE_LENGTH);
        assert_eq!(sig.to_bytes(), [7u8; SIGNATURE_LENGTH]);
        assert!(Signature::from_slice(&[0u8; 10]).is_err());
    }

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(Hash::of(b"istanbul"), Hash::of(b"istanbul"));
        assert_ne!(Hash::of(b"istanbul"), Hash::of(b"constantinople"));
    }
}
