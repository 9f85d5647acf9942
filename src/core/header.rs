//! Bitcoin block header codec

use serde::Serialize;

use super::hash::{btc_hash, Hash256};
use super::HEADER_SIZE;
use crate::error::{Error, Result};

const VERSION: std::ops::Range<usize> = 0..4;
const HASH_PREV: std::ops::Range<usize> = 4..36;
const MERKLE_ROOT: std::ops::Range<usize> = 36..68;
const TIMESTAMP: std::ops::Range<usize> = 68..72;
const NBITS: std::ops::Range<usize> = 72..76;
const NONCE: std::ops::Range<usize> = 76..80;

/// A decoded 80-byte block header.
///
/// Fields keep their wire bytes; the `*_u32` accessors decode the
/// little-endian integers. `block_number` is the position in the header log
/// the record was read from, not a consensus field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockHeader {
    /// Index in the header log
    pub block_number: u64,
    /// Block version, wire bytes
    #[serde(with = "hex_bytes")]
    pub version: [u8; 4],
    /// Previous block hash, wire order
    #[serde(with = "hex_bytes")]
    pub hash_prev: [u8; 32],
    /// Merkle root, wire order
    #[serde(with = "hex_bytes")]
    pub merkle_root: [u8; 32],
    /// Block time, little-endian seconds since epoch
    #[serde(with = "hex_bytes")]
    pub timestamp: [u8; 4],
    /// Compact difficulty target, little-endian
    #[serde(with = "hex_bytes")]
    pub nbits: [u8; 4],
    /// Nonce, little-endian
    #[serde(with = "hex_bytes")]
    pub nonce: [u8; 4],
}

impl BlockHeader {
    /// Decode a header from exactly 80 bytes
    pub fn from_bytes(block_number: u64, bytes: &[u8]) -> Result<Self> {
        if bytes.len() != HEADER_SIZE {
            return Err(Error::malformed_input(format!(
                "Block header must be {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }

        Ok(Self {
            block_number,
            version: field(bytes, VERSION),
            hash_prev: field(bytes, HASH_PREV),
            merkle_root: field(bytes, MERKLE_ROOT),
            timestamp: field(bytes, TIMESTAMP),
            nbits: field(bytes, NBITS),
            nonce: field(bytes, NONCE),
        })
    }

    /// Encode back to the 80-byte wire form
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[VERSION].copy_from_slice(&self.version);
        out[HASH_PREV].copy_from_slice(&self.hash_prev);
        out[MERKLE_ROOT].copy_from_slice(&self.merkle_root);
        out[TIMESTAMP].copy_from_slice(&self.timestamp);
        out[NBITS].copy_from_slice(&self.nbits);
        out[NONCE].copy_from_slice(&self.nonce);
        out
    }

    /// Block version as an integer
    pub fn version_u32(&self) -> u32 {
        u32::from_le_bytes(self.version)
    }

    /// Block time in seconds since the epoch
    pub fn timestamp_u32(&self) -> u32 {
        u32::from_le_bytes(self.timestamp)
    }

    /// Compact difficulty target
    pub fn nbits_u32(&self) -> u32 {
        u32::from_le_bytes(self.nbits)
    }

    /// Nonce as an integer
    pub fn nonce_u32(&self) -> u32 {
        u32::from_le_bytes(self.nonce)
    }

    /// Double SHA-256 of the encoded header, natural order
    pub fn hash(&self) -> Hash256 {
        btc_hash(&self.to_bytes())
    }
}

fn field<const N: usize>(bytes: &[u8], range: std::ops::Range<usize>) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[range]);
    out
}

mod hex_bytes {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }
}
