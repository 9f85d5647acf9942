//! Utility functions and helpers

pub mod logging;

use chrono::NaiveDateTime;

use crate::error::{Error, Result};

/// Format accepted by [`parse_time`]
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Decode a hex string, tolerating a `0x` prefix and surrounding whitespace
pub fn parse_hex(s: &str) -> Result<Vec<u8>> {
    let s = s.trim();
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    hex::decode(s).map_err(|e| Error::malformed_input(format!("Invalid hex '{}': {}", s, e)))
}

/// Hex encode with a `0x` prefix
pub fn to_hex_prefixed(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Parse a UTC `YYYY-MM-DD HH:MM:SS` string into seconds since the epoch
pub fn parse_time(s: &str) -> Result<i64> {
    NaiveDateTime::parse_from_str(s.trim(), TIME_FORMAT)
        .map(|t| t.and_utc().timestamp())
        .map_err(|e| Error::malformed_input(format!("Invalid time '{}': {}", s, e)))
}

/// Parse a block timestamp given either as epoch seconds or in
/// [`TIME_FORMAT`]
pub fn parse_timestamp(s: &str) -> Result<u32> {
    let secs = match s.trim().parse::<i64>() {
        Ok(secs) => secs,
        Err(_) => parse_time(s)?,
    };
    u32::try_from(secs)
        .map_err(|_| Error::malformed_input(format!("Timestamp {} does not fit in 32 bits", secs)))
}
