//! Structured logging with context tags
//!
//! Console output goes through `tracing-subscriber` in one of three formats.
//! An optional log file always receives debug level events, whatever the
//! console filter says.

use std::path::Path;
use std::str::FromStr;
use tracing::{field, span, Level, Span};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::error::{Error, Result};

/// Console log format
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    serde::Serialize,
    serde::Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line human readable
    #[default]
    Plain,
    /// Multi-line with source locations
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "plain" => Ok(LogFormat::Plain),
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(Error::config(format!("Unknown log format: {}", other))),
        }
    }
}

/// Context tags attached to relay operations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogContext {
    /// Operation being performed (deploy, store_header, verify, ...)
    pub operation: Option<String>,
    /// Contract the operation targets
    pub contract: Option<String>,
    /// Account sending transactions
    pub account: Option<String>,
    /// Transaction hash
    pub tx_hash: Option<String>,
    /// Bitcoin block number involved
    pub block_number: Option<u64>,
}

impl LogContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context for an operation
    pub fn for_operation(operation: &str) -> Self {
        Self {
            operation: Some(operation.to_string()),
            ..Self::new()
        }
    }

    /// Add contract to context
    pub fn with_contract(mut self, contract: &str) -> Self {
        self.contract = Some(contract.to_string());
        self
    }

    /// Add sending account to context
    pub fn with_account(mut self, account: &str) -> Self {
        self.account = Some(account.to_string());
        self
    }

    /// Add transaction hash to context
    pub fn with_tx_hash(mut self, tx_hash: &str) -> Self {
        self.tx_hash = Some(tx_hash.to_string());
        self
    }

    /// Add block number to context
    pub fn with_block_number(mut self, block_number: u64) -> Self {
        self.block_number = Some(block_number);
        self
    }

    /// Create a tracing span with this context
    pub fn span(&self, name: &str) -> Span {
        let span = span!(
            Level::INFO,
            "relay",
            name = %name,
            operation = field::Empty,
            contract = field::Empty,
            account = field::Empty,
            tx_hash = field::Empty,
            block_number = field::Empty
        );

        if let Some(ref operation) = self.operation {
            span.record("operation", field::display(operation));
        }
        if let Some(ref contract) = self.contract {
            span.record("contract", field::display(contract));
        }
        if let Some(ref account) = self.account {
            span.record("account", field::display(account));
        }
        if let Some(ref tx_hash) = self.tx_hash {
            span.record("tx_hash", field::display(tx_hash));
        }
        if let Some(block_number) = self.block_number {
            span.record("block_number", block_number);
        }

        span
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes the log file on drop and must be held for the
/// lifetime of the program.
pub fn init_logging(
    level: &str,
    format: LogFormat,
    file: Option<&Path>,
) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    let console = match format {
        LogFormat::Json => fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_writer(std::io::stderr)
            .pretty()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Plain => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed(),
    }
    .with_filter(env_filter);

    let (file_layer, guard) = match file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| Error::config(format!("Invalid log file: {}", path.display())))?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(EnvFilter::new("debug"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::config(format!("Failed to initialize logging: {}", e)))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_context_creation() {
        let ctx = LogContext::for_operation("store_header")
            .with_contract("0x00000000000000000000000000000000000000aa")
            .with_account("0x00000000000000000000000000000000000000bb")
            .with_tx_hash("0x01")
            .with_block_number(12_552);

        assert_eq!(ctx.operation.as_deref(), Some("store_header"));
        assert_eq!(ctx.block_number, Some(12_552));
        assert_eq!(ctx.tx_hash.as_deref(), Some("0x01"));

        // a span can be built without a subscriber installed
        let _span = ctx.span("test");
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
