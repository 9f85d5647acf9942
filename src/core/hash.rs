//! SHA-256 based hashing used by Bitcoin headers and the proof circuit

use num_bigint::BigUint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A 32-byte SHA-256 digest
pub type Hash256 = [u8; 32];

/// Single-pass SHA-256
pub fn sha256(data: &[u8]) -> Hash256 {
    Sha256::digest(data).into()
}

/// Bitcoin block hash: SHA-256 applied twice.
///
/// The digest is returned in natural output order. Block explorers display
/// the byte-reversed form, see [`swap_bytes`].
pub fn btc_hash(data: &[u8]) -> Hash256 {
    sha256(&sha256(data))
}

/// Reverse the byte order of a buffer
pub fn swap_bytes(data: &[u8]) -> Vec<u8> {
    data.iter().rev().copied().collect()
}

/// Reverse the byte order of a buffer in place
pub fn swap_bytes_in_place(data: &mut [u8]) {
    data.reverse();
}

/// Swap the endianness of a 32-bit word
pub fn swap32(value: u32) -> u32 {
    value.swap_bytes()
}

/// Byte order in which a digest is handed to the verifier
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    /// Digest bytes exactly as SHA-256 produced them
    #[default]
    Natural,
    /// Byte-reversed digest (block explorer display order)
    Swapped,
}

impl ByteOrder {
    /// Reorder a digest
    pub fn apply(self, digest: Hash256) -> Hash256 {
        match self {
            ByteOrder::Natural => digest,
            ByteOrder::Swapped => {
                let mut out = digest;
                out.reverse();
                out
            }
        }
    }

    /// Hex encode a digest in this order
    pub fn to_hex(self, digest: Hash256) -> String {
        hex::encode(self.apply(digest))
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteOrder::Natural => write!(f, "natural"),
            ByteOrder::Swapped => write!(f, "swapped"),
        }
    }
}

impl FromStr for ByteOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "natural" => Ok(ByteOrder::Natural),
            "swapped" => Ok(ByteOrder::Swapped),
            other => Err(Error::malformed_input(format!("Unknown byte order: {}", other))),
        }
    }
}

/// A digest truncated to its low 31 bytes, read as a big-endian integer.
///
/// Always below 2^248 so it fits in a single BN254 field element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash248(BigUint);

impl Hash248 {
    /// Integer value
    pub fn value(&self) -> &BigUint {
        &self.0
    }

    /// Consume into the integer value
    pub fn into_inner(self) -> BigUint {
        self.0
    }

    /// The 31 bytes the value was built from
    pub fn to_bytes(&self) -> [u8; 31] {
        let raw = self.0.to_bytes_be();
        let mut out = [0u8; 31];
        out[31 - raw.len()..].copy_from_slice(&raw);
        out
    }
}

impl fmt::Display for Hash248 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Hash248 {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let value = BigUint::parse_bytes(s.trim().as_bytes(), 10)
            .ok_or_else(|| Error::malformed_input(format!("Invalid decimal hash: {}", s)))?;
        if value.bits() > 248 {
            return Err(Error::malformed_input("Hash248 value exceeds 248 bits"));
        }
        Ok(Hash248(value))
    }
}

impl Serialize for Hash248 {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_str_radix(10))
    }
}

impl<'de> Deserialize<'de> for Hash248 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Drop the first byte of a digest and read the remaining 31 bytes as a
/// big-endian integer
pub fn truncate_to_248(digest: &Hash256) -> Hash248 {
    Hash248(BigUint::from_bytes_be(&digest[1..]))
}

/// Reorder a digest, then truncate it to 248 bits
pub fn hash248(digest: Hash256, order: ByteOrder) -> Hash248 {
    truncate_to_248(&order.apply(digest))
}
