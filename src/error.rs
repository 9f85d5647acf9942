//! Error types for the relay tooling
//!
//! The core (header codec, hashing, difficulty, witness assembly) only ever
//! produces [`Error::OutOfRange`] and [`Error::MalformedInput`]. The remaining
//! variants belong to configuration, file loading and the RPC collaborator.

use thiserror::Error;

/// Main error type
#[derive(Error, Debug)]
pub enum Error {
    /// Block index outside the usable range of a header log
    #[error("Block {index} out of range (usable blocks: {nblocks})")]
    OutOfRange {
        /// Requested index
        index: i64,
        /// Number of usable blocks in the log
        nblocks: u64,
    },

    /// Input that cannot be decoded without producing garbage
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP transport errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON-RPC error object returned by the node
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code
        code: i64,
        /// Error message reported by the node
        message: String,
    },

    /// Contract ABI loading or encoding errors
    #[error("ABI error: {0}")]
    Abi(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Transaction mined with a failure status
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an out-of-range error
    pub fn out_of_range(index: i64, nblocks: u64) -> Self {
        Self::OutOfRange { index, nblocks }
    }

    /// Create a malformed input error
    pub fn malformed_input(msg: impl Into<String>) -> Self {
        Self::MalformedInput(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an RPC error
    pub fn rpc(code: i64, msg: impl Into<String>) -> Self {
        Self::Rpc {
            code,
            message: msg.into(),
        }
    }

    /// Create an ABI error
    pub fn abi(msg: impl Into<String>) -> Self {
        Self::Abi(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a transaction failure error
    pub fn transaction_failed(msg: impl Into<String>) -> Self {
        Self::TransactionFailed(msg.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Whether the caller can treat this error as an empty result rather
    /// than a failure
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::OutOfRange { .. })
    }
}
