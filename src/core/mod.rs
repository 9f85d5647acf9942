//! Bitcoin header-chain math
//!
//! Everything in here is pure and synchronous: given header bytes, produce
//! the exact numbers a SNARK verifier contract expects. File loading is a
//! one-shot read done by [`HeaderStore`]; no I/O happens past that point.

pub mod bits;
pub mod difficulty;
pub mod hash;
pub mod header;
pub mod proof;
pub mod store;
pub mod target;

pub use difficulty::{compute_next_nbits, is_retarget_boundary, DifficultyWindow, Retarget};
pub use hash::{btc_hash, hash248, sha256, swap_bytes, truncate_to_248, ByteOrder, Hash248};
pub use header::BlockHeader;
pub use proof::{
    assemble_witness, concat_block_hashes248, concat_hash248, last_retarget_timestamp,
    ConcatInput, ConcatOrder, HashDepth, ProofWitness, WitnessConvention,
};
pub use store::{read_header, HeaderStore};
pub use target::{compact_from_uint256, difficulty, target_from_bits, CompactTarget};

/// Size of a serialized Bitcoin block header
pub const HEADER_SIZE: usize = 80;

/// Number of blocks between difficulty adjustments
pub const RETARGET_INTERVAL: u64 = 2016;

/// Expected duration of one retarget interval in seconds (two weeks)
pub const TARGET_TIMESPAN: i64 = 14 * 24 * 60 * 60;
