//! Chain-of-proof witness assembly
//!
//! The header store contract keeps a "last verified block" watermark. One
//! proof advances it by `n_headers` and takes five public inputs, in this
//! exact order:
//!
//! `[timestamp, last_verified_block, start_hash248, concat_hash248, n_headers]`
//!
//! Circuit versions disagree on concatenation order, what gets concatenated
//! and the byte order of the start hash, so all three are pinned through
//! [`WitnessConvention`] instead of being left to call sites.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::hash::{btc_hash, hash248, sha256, truncate_to_248, ByteOrder, Hash248};
use super::store::HeaderStore;
use super::RETARGET_INTERVAL;
use crate::error::{Error, Result};

/// Order of the group headers in the concatenation
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum ConcatOrder {
    /// Newest block first
    #[default]
    HighestFirst,
    /// Oldest block first
    LowestFirst,
}

/// What each group member contributes to the concatenation
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum ConcatInput {
    /// The raw 80-byte header
    #[default]
    RawHeaders,
    /// The double SHA-256 of the header
    BlockHashes,
}

/// Hash depth used for the start block hash
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum HashDepth {
    /// SHA-256 twice (the Bitcoin block hash)
    #[default]
    Double,
    /// SHA-256 once
    Single,
}

/// Encoding choices a verifier circuit version expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WitnessConvention {
    /// Group order
    pub order: ConcatOrder,
    /// Group member encoding
    pub input: ConcatInput,
    /// Byte order of the start hash before truncation
    pub start_hash_order: ByteOrder,
    /// Hash depth of the start hash
    pub start_hash_depth: HashDepth,
}

/// Public inputs of one chain-of-proof submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofWitness {
    /// Timestamp of the last retarget block at or below the new watermark
    pub timestamp: u32,
    /// Current watermark
    pub last_verified_block: u64,
    /// Truncated hash of the watermark block
    pub start_hash: Hash248,
    /// Truncated hash over the group
    pub concat_hash: Hash248,
    /// Number of headers the proof covers
    pub n_headers: u64,
}

impl ProofWitness {
    /// Inputs in the order the verifier contract takes them
    pub fn inputs(&self) -> Vec<BigUint> {
        vec![
            BigUint::from(self.timestamp),
            BigUint::from(self.last_verified_block),
            self.start_hash.value().clone(),
            self.concat_hash.value().clone(),
            BigUint::from(self.n_headers),
        ]
    }

    /// Space separated inputs, as `zokrates compute-witness -a` takes them
    pub fn to_zokrates_args(&self) -> String {
        self.inputs()
            .iter()
            .map(|v| v.to_str_radix(10))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Single SHA-256 over raw headers concatenated in the given order,
/// truncated to 248 bits
pub fn concat_hash248<I>(headers: I) -> Hash248
where
    I: IntoIterator,
    I::Item: AsRef<[u8]>,
{
    let mut hasher = Sha256::new();
    for header in headers {
        hasher.update(header.as_ref());
    }
    let digest: [u8; 32] = hasher.finalize().into();
    truncate_to_248(&digest)
}

/// Single SHA-256 over the block hashes of the given headers, truncated to
/// 248 bits
pub fn concat_block_hashes248<I>(headers: I) -> Hash248
where
    I: IntoIterator,
    I::Item: AsRef<[u8]>,
{
    concat_hash248(headers.into_iter().map(|h| btc_hash(h.as_ref())))
}

/// Timestamp of the retarget block that starts the interval containing
/// `block_number`
pub fn last_retarget_timestamp(block_number: u64, store: &HeaderStore) -> Result<u32> {
    let anchor = block_number - block_number % RETARGET_INTERVAL;
    let index = i64::try_from(anchor)
        .map_err(|_| Error::malformed_input(format!("Block number {} too large", anchor)))?;
    Ok(store.read_header(index)?.timestamp_u32())
}

/// Build the witness that advances the watermark from `last_verified_block`
/// by `n_headers`
pub fn assemble_witness(
    store: &HeaderStore,
    last_verified_block: u64,
    n_headers: u64,
    convention: &WitnessConvention,
) -> Result<ProofWitness> {
    if n_headers == 0 {
        return Err(Error::malformed_input("A proof must cover at least one header"));
    }
    let last = last_verified_block
        .checked_add(n_headers)
        .ok_or_else(|| Error::malformed_input("Block range overflows"))?;

    let start_raw = raw_block(store, last_verified_block)?;
    let start_digest = match convention.start_hash_depth {
        HashDepth::Double => btc_hash(start_raw),
        HashDepth::Single => sha256(start_raw),
    };
    let start_hash = hash248(start_digest, convention.start_hash_order);

    let mut group = (last_verified_block + 1..=last)
        .map(|i| raw_block(store, i))
        .collect::<Result<Vec<_>>>()?;
    if convention.order == ConcatOrder::HighestFirst {
        group.reverse();
    }

    let concat_hash = match convention.input {
        ConcatInput::RawHeaders => concat_hash248(&group),
        ConcatInput::BlockHashes => concat_block_hashes248(&group),
    };

    let timestamp = last_retarget_timestamp(last, store)?;

    debug!(
        last_verified_block,
        n_headers,
        timestamp,
        "Assembled proof witness"
    );

    Ok(ProofWitness {
        timestamp,
        last_verified_block,
        start_hash,
        concat_hash,
        n_headers,
    })
}

fn raw_block(store: &HeaderStore, block_number: u64) -> Result<&[u8]> {
    store.raw(block_number).ok_or_else(|| {
        Error::out_of_range(
            i64::try_from(block_number).unwrap_or(i64::MAX),
            store.nblocks(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::HEADER_SIZE;
    use pretty_assertions::assert_eq;

    fn record(block: u32, timestamp: u32) -> Vec<u8> {
        let mut raw = vec![0u8; HEADER_SIZE];
        raw[0..4].copy_from_slice(&1u32.to_le_bytes());
        raw[4..8].copy_from_slice(&block.to_be_bytes());
        raw[68..72].copy_from_slice(&timestamp.to_le_bytes());
        raw[72..76].copy_from_slice(&0x1d00ffffu32.to_le_bytes());
        raw[76..80].copy_from_slice(&(block * 7).to_le_bytes());
        raw
    }

    fn store(records: u32) -> HeaderStore {
        let data = (0..records)
            .flat_map(|i| record(i, 1_500_000_000 + i * 600))
            .collect();
        HeaderStore::from_bytes(data).unwrap()
    }

    #[test]
    fn test_concat_hash_is_single_sha256() {
        let a = record(3, 10);
        let b = record(2, 20);
        let joined = [a.clone(), b.clone()].concat();

        assert_eq!(concat_hash248([&a, &b]), truncate_to_248(&sha256(&joined)));
        assert_ne!(concat_hash248([&a, &b]), truncate_to_248(&btc_hash(&joined)));
        assert_ne!(concat_hash248([&a, &b]), concat_hash248([&b, &a]));
    }

    #[test]
    fn test_concat_block_hashes() {
        let a = record(1, 10);
        let b = record(2, 20);
        let joined = [btc_hash(&a), btc_hash(&b)].concat();
        assert_eq!(concat_block_hashes248([&a, &b]), truncate_to_248(&sha256(&joined)));
    }

    #[test]
    fn test_last_retarget_timestamp() {
        let store = store(4);
        assert_eq!(last_retarget_timestamp(2, &store).unwrap(), 1_500_000_000);
        assert!(matches!(
            last_retarget_timestamp(2_016, &store),
            Err(Error::OutOfRange { index: 2_016, .. })
        ));
    }

    #[test]
    fn test_assemble_default_convention() {
        let store = store(5);
        let witness = assemble_witness(&store, 1, 2, &WitnessConvention::default()).unwrap();

        assert_eq!(witness.timestamp, 1_500_000_000);
        assert_eq!(witness.last_verified_block, 1);
        assert_eq!(
            witness.start_hash.to_string(),
            "166028297787233376369201001286361074632945841132840460567391918639632521650"
        );
        assert_eq!(
            witness.concat_hash.to_string(),
            "294214677102716141734313399364976898483273616311247450586006726455118717981"
        );
        assert_eq!(witness.n_headers, 2);
        assert_eq!(witness.inputs().len(), 5);
        assert_eq!(witness.inputs()[0], BigUint::from(1_500_000_000u32));
    }

    #[test]
    fn test_assemble_alternate_convention() {
        let store = store(5);
        let convention = WitnessConvention {
            order: ConcatOrder::LowestFirst,
            input: ConcatInput::BlockHashes,
            start_hash_order: ByteOrder::Swapped,
            start_hash_depth: HashDepth::Single,
        };
        let witness = assemble_witness(&store, 1, 2, &convention).unwrap();

        let b2 = record(2, 1_500_001_200);
        let b3 = record(3, 1_500_001_800);
        assert_eq!(witness.concat_hash, concat_block_hashes248([&b2, &b3]));
        assert_eq!(
            witness.start_hash,
            hash248(sha256(&record(1, 1_500_000_600)), ByteOrder::Swapped)
        );
    }

    #[test]
    fn test_assemble_errors() {
        let store = store(4);
        let convention = WitnessConvention::default();

        assert!(matches!(
            assemble_witness(&store, 1, 0, &convention),
            Err(Error::MalformedInput(_))
        ));
        // block 3 is the reserved slot
        assert!(matches!(
            assemble_witness(&store, 2, 1, &convention),
            Err(Error::OutOfRange { index: 3, nblocks: 3 })
        ));
        assert!(assemble_witness(&store, u64::MAX, 1, &convention).is_err());
    }

    #[test]
    fn test_witness_serialization() {
        let witness = assemble_witness(&store(4), 0, 2, &WitnessConvention::default()).unwrap();
        let json = serde_json::to_value(&witness).unwrap();
        assert!(json["start_hash"].is_string());
        assert_eq!(json["n_headers"], 2);

        let args = witness.to_zokrates_args();
        let parts: Vec<&str> = args.split(' ').collect();
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[1], "0");
        assert_eq!(parts[4], "2");
        assert_eq!(parts[2], witness.start_hash.to_string());
    }

    #[test]
    fn test_convention_from_toml() {
        let convention: WitnessConvention =
            toml::from_str("order = \"lowest-first\"\nstart_hash_order = \"swapped\"").unwrap();
        assert_eq!(convention.order, ConcatOrder::LowestFirst);
        assert_eq!(convention.input, ConcatInput::RawHeaders);
        assert_eq!(convention.start_hash_order, ByteOrder::Swapped);
    }
}
