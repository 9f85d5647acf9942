//! Configuration management for the relay tooling
//!
//! Settings come from an optional TOML file, environment variables and
//! command line flags, in increasing order of precedence.

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::core::{ByteOrder, CompactTarget, ConcatInput, ConcatOrder, HashDepth, WitnessConvention};
use crate::error::{Error, Result};
use crate::protocol::{GasParams, RetryPolicy, WaitOptions};
use crate::utils::logging::LogFormat;
use crate::utils::parse_timestamp;

/// Command line arguments
#[derive(Debug, Clone, Parser)]
#[command(
    name = "btc-relay",
    version = env!("CARGO_PKG_VERSION"),
    about = "Bitcoin header tooling and relay client for a SNARK-verified BTC header store",
    long_about = "Reads Bitcoin headers from a flat header log, computes hashes, difficulty \
                  and proof witnesses, and drives the header store and verifier contracts \
                  over Ethereum JSON-RPC"
)]
pub struct Args {
    /// TOML configuration file
    #[arg(short, long, global = true, env = "BTC_RELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Ethereum JSON-RPC endpoint
    #[arg(long, global = true, env = "BTC_RELAY_RPC_URL")]
    pub rpc_url: Option<String>,

    /// Flat header log, 80 bytes per block
    #[arg(long, global = true, env = "BTC_RELAY_HEADERS_FILE")]
    pub headers_file: Option<PathBuf>,

    /// Directory holding `<Name>.abi` and `<Name>.bin`
    #[arg(long, global = true, env = "BTC_RELAY_CONTRACTS_DIR")]
    pub contracts_dir: Option<PathBuf>,

    /// Log filter, e.g. `info` or `btc_snark_relay=debug`
    #[arg(long, global = true, env = "BTC_RELAY_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Console log format
    #[arg(long, global = true, value_enum, env = "BTC_RELAY_LOG_FORMAT")]
    pub log_format: Option<LogFormat>,

    /// Also write debug logs to this file
    #[arg(long, global = true, env = "BTC_RELAY_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Print a header's fields and hashes
    Header {
        /// Block number
        #[arg(allow_negative_numbers = true)]
        block_number: i64,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
        /// Also print the header as a bit string
        #[arg(long)]
        bits: bool,
    },

    /// Hash a group of headers the way the chain-of-proof circuit does
    ConcatHash {
        /// Block numbers, in concatenation order
        #[arg(required = true, num_args = 1..)]
        block_numbers: Vec<u64>,
        /// What each block contributes
        #[arg(long, value_enum)]
        input: Option<ConcatInput>,
    },

    /// Assemble the public inputs advancing the verified watermark
    Witness {
        /// Current watermark
        last_verified_block: u64,
        /// Number of headers covered by the proof
        n_headers: u64,
        /// Group order
        #[arg(long, value_enum)]
        order: Option<ConcatOrder>,
        /// Group member encoding
        #[arg(long, value_enum)]
        input: Option<ConcatInput>,
        /// Byte order of the start hash
        #[arg(long, value_enum)]
        start_hash_order: Option<ByteOrder>,
        /// Hash depth of the start hash
        #[arg(long, value_enum)]
        start_hash_depth: Option<HashDepth>,
        /// Print space separated inputs for `zokrates compute-witness -a`
        #[arg(long)]
        zokrates: bool,
    },

    /// Compute the compact target of the block after `prev_block`
    NextNbits {
        /// Height of the previous block
        prev_block: u64,
        /// Previous block time, epoch seconds or `YYYY-MM-DD HH:MM:SS`
        #[arg(long, value_parser = parse_timestamp)]
        prev_time: Option<u32>,
        /// Interval start time, epoch seconds or `YYYY-MM-DD HH:MM:SS`
        #[arg(long, value_parser = parse_timestamp)]
        start_time: Option<u32>,
        /// Previous compact target
        #[arg(long)]
        prev_nbits: Option<CompactTarget>,
    },

    /// Show target and difficulty of a compact target
    Difficulty {
        /// Compact target, hex or decimal
        nbits: CompactTarget,
    },

    /// Convert hex to the bit vector a circuit takes
    HexToBits {
        /// Hex string, `0x` optional
        hex: String,
    },

    /// Read a 256-bit hash from circuit output (`~out_0` .. `~out_255`)
    ReadHash {
        /// JSON file with the circuit output
        file: PathBuf,
    },

    /// Deploy a contract
    Deploy {
        /// Contract name, looked up in the contracts directory
        #[arg(required_unless_present = "abi")]
        name: Option<String>,
        /// Explicit ABI path
        #[arg(long, requires = "bin")]
        abi: Option<PathBuf>,
        /// Explicit bytecode path
        #[arg(long, requires = "abi")]
        bin: Option<PathBuf>,
    },

    /// Submit a header to the header store
    StoreHeader {
        /// Header store address
        store: String,
        /// Block number
        block_number: i64,
        /// Also call `get_header_hash` for the stored block
        #[arg(long)]
        get_hash: bool,
    },

    /// Submit a chain-of-proof to the verifier
    Verify {
        /// Verifier address
        verifier: String,
        /// Current watermark
        last_verified_block: u64,
        /// Number of headers covered by the proof
        n_headers: u64,
        /// Proof file
        #[arg(long)]
        proof: Option<PathBuf>,
        /// Link the verifier to this header store first
        #[arg(long)]
        link_store: Option<String>,
        /// Upload the verification key first
        #[arg(long)]
        update_vk: bool,
    },

    /// Add the header store hooks to a generated verifier contract
    AugmentVerifier {
        /// Generated `verifier.sol`
        input: PathBuf,
        /// Output path, must differ from the input
        output: PathBuf,
    },

    /// Print the effective configuration and exit
    PrintConfig,
}

/// `[rpc]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// JSON-RPC endpoint
    pub url: String,
    /// HTTP request timeout in seconds
    pub timeout_secs: u64,
    /// Seconds between receipt polls
    pub poll_interval_secs: u64,
    /// Give up waiting for a transaction after this many seconds
    pub wait_timeout_secs: Option<u64>,
    /// Gas limit; unset lets the node estimate
    pub gas: Option<u64>,
    /// Gas price in wei
    pub gas_price: u64,
    /// Attempts for RPC reads
    pub max_retries: usize,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8545".to_string(),
            timeout_secs: 30,
            poll_interval_secs: 5,
            wait_timeout_secs: None,
            gas: None,
            gas_price: 2_500_000_000,
            max_retries: 10,
        }
    }
}

/// `[data]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Flat header log
    pub headers_file: PathBuf,
    /// Compiled contracts directory
    pub contracts_dir: PathBuf,
    /// Proof file
    pub proof_file: PathBuf,
    /// Verification key file
    pub verification_key_file: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            headers_file: PathBuf::from("./data/btc_headers"),
            contracts_dir: PathBuf::from("../contracts/target"),
            proof_file: PathBuf::from("../contracts/proof_params.txt"),
            verification_key_file: PathBuf::from("../contracts/verification.key"),
        }
    }
}

/// `[logging]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive
    pub level: String,
    /// Console format
    pub format: LogFormat,
    /// Optional debug log file
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Plain,
            file: None,
        }
    }
}

/// Effective configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// RPC settings
    pub rpc: RpcConfig,
    /// File locations
    pub data: DataConfig,
    /// Witness encoding
    pub witness: WitnessConvention,
    /// Logging
    pub logging: LoggingConfig,
}

impl Config {
    /// Build the effective configuration from parsed arguments
    pub async fn load(args: &Args) -> Result<Self> {
        let config = match &args.config {
            Some(path) => Self::load_from_file(path).await?,
            None => Self::default(),
        };
        let config = config.merge_with_args(args);
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file
    pub async fn load_from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(format!("Invalid config file: {}", e)))
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::config(format!("Failed to serialize config: {}", e)))
    }

    /// Apply command line overrides
    fn merge_with_args(mut self, args: &Args) -> Self {
        if let Some(url) = &args.rpc_url {
            self.rpc.url = url.clone();
        }
        if let Some(path) = &args.headers_file {
            self.data.headers_file = path.clone();
        }
        if let Some(path) = &args.contracts_dir {
            self.data.contracts_dir = path.clone();
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if let Some(format) = args.log_format {
            self.logging.format = format;
        }
        if let Some(path) = &args.log_file {
            self.logging.file = Some(path.clone());
        }

        if let Command::Witness {
            order,
            input,
            start_hash_order,
            start_hash_depth,
            ..
        } = &args.command
        {
            self.witness = WitnessConvention {
                order: order.unwrap_or(self.witness.order),
                input: input.unwrap_or(self.witness.input),
                start_hash_order: start_hash_order.unwrap_or(self.witness.start_hash_order),
                start_hash_depth: start_hash_depth.unwrap_or(self.witness.start_hash_depth),
            };
        }

        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.rpc.url)
            .map_err(|e| Error::config(format!("Invalid RPC URL: {}", e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "RPC URL must be http or https, got {}",
                url.scheme()
            )));
        }

        if self.rpc.timeout_secs == 0 {
            return Err(Error::config("RPC timeout must be greater than 0"));
        }
        if self.rpc.poll_interval_secs == 0 {
            return Err(Error::config("Poll interval must be greater than 0"));
        }
        if self.rpc.gas == Some(0) {
            return Err(Error::config("Gas limit must be greater than 0"));
        }
        if self.rpc.max_retries == 0 {
            return Err(Error::config("max_retries must be at least 1"));
        }

        Ok(())
    }

    /// Gas settings for transactions
    pub fn gas_params(&self) -> GasParams {
        GasParams {
            gas: self.rpc.gas,
            gas_price: self.rpc.gas_price,
        }
    }

    /// Receipt polling settings
    pub fn wait_options(&self) -> WaitOptions {
        WaitOptions {
            poll_interval: Duration::from_secs(self.rpc.poll_interval_secs),
            timeout: self.rpc.wait_timeout_secs.map(Duration::from_secs),
        }
    }

    /// HTTP request timeout
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc.timeout_secs)
    }

    /// Retry policy for RPC reads
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.rpc.max_retries,
            Duration::from_millis(100),
            Duration::from_secs(5),
        )
    }
}
