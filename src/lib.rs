//! BTC SNARK Relay
//!
//! Tooling for relaying Bitcoin block headers to an Ethereum header store
//! whose advances are checked by a SNARK verifier contract:
//! - Header log access and header field decoding
//! - Bitcoin hashing and 248-bit field truncation
//! - Compact target codec and difficulty retargeting
//! - Chain-of-proof witness assembly
//! - JSON-RPC relay client with receipt polling
//! - Verifier contract augmentation

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod augment;
pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod utils;

pub use config::Config;
pub use error::{Error, Result};

/// Commonly used types
pub mod prelude {
    pub use crate::core::{
        assemble_witness, btc_hash, BlockHeader, CompactTarget, DifficultyWindow, Hash248,
        HeaderStore, ProofWitness, WitnessConvention,
    };
    pub use crate::error::{Error, Result};
    pub use crate::protocol::{EthRpcClient, RelayClient, RelayRpc};
}

/// Application name
pub const APP_NAME: &str = "btc-relay";
/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
