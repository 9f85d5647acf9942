//! Compact nBits target encoding

use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

const MANTISSA_MASK: u32 = 0x00ff_ffff;
const SIGN_BIT: u64 = 0x0080_0000;

/// Decode a compact target: `mantissa * 256^(exponent - 3)`
pub fn target_from_bits(nbits: u32) -> Result<BigUint> {
    let exponent = nbits >> 24;
    let mantissa = nbits & MANTISSA_MASK;

    if exponent < 3 {
        return Err(Error::malformed_input(format!(
            "nBits 0x{:08x} has exponent {} below 3",
            nbits, exponent
        )));
    }

    Ok(BigUint::from(mantissa) << (8 * (exponent - 3)) as usize)
}

/// Encode a target as compact nBits.
///
/// Keeps the three most significant bytes. When the top mantissa bit would
/// be set the mantissa is shifted down a byte so the result never reads as
/// negative.
pub fn compact_from_uint256(value: &BigUint) -> Result<u32> {
    if value.bits() > 256 {
        return Err(Error::malformed_input(format!(
            "Target has {} bits, more than 256",
            value.bits()
        )));
    }

    let mut size = value.bits().div_ceil(8) as u32;
    let mut compact = if size <= 3 {
        low_u64(value) << (8 * (3 - size))
    } else {
        low_u64(&(value >> (8 * (size - 3)) as usize))
    };

    if compact & SIGN_BIT != 0 {
        compact >>= 8;
        size += 1;
    }

    Ok((compact as u32 & MANTISSA_MASK) | (size << 24))
}

fn low_u64(value: &BigUint) -> u64 {
    value.iter_u64_digits().next().unwrap_or(0)
}

/// Difficulty relative to the minimum-difficulty target `0xffff << 208`.
///
/// Advisory only; the float loses precision for very small targets.
pub fn difficulty(nbits: u32) -> Result<f64> {
    let target = target_from_bits(nbits)?;
    if target.is_zero() {
        return Err(Error::malformed_input(format!(
            "nBits 0x{:08x} encodes a zero target",
            nbits
        )));
    }

    let max = BigUint::from(0xffffu32) << 208usize;
    match (max.to_f64(), target.to_f64()) {
        (Some(max), Some(target)) => Ok(max / target),
        _ => Err(Error::malformed_input("Target out of floating point range")),
    }
}

/// Compact target as stored in a header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompactTarget(pub u32);

impl CompactTarget {
    /// Full 256-bit target
    pub fn target(self) -> Result<BigUint> {
        target_from_bits(self.0)
    }

    /// Encode a full target
    pub fn from_target(target: &BigUint) -> Result<Self> {
        compact_from_uint256(target).map(CompactTarget)
    }

    /// See [`difficulty`]
    pub fn difficulty(self) -> Result<f64> {
        difficulty(self.0)
    }
}

impl From<u32> for CompactTarget {
    fn from(value: u32) -> Self {
        CompactTarget(value)
    }
}

impl fmt::Display for CompactTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl FromStr for CompactTarget {
    type Err = Error;

    /// Accepts `0x1d00ffff`, `1d00ffff` (eight hex digits) or a decimal integer
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            u32::from_str_radix(hex, 16)
        } else if s.len() == 8 && s.chars().any(|c| c.is_ascii_alphabetic()) {
            u32::from_str_radix(s, 16)
        } else {
            s.parse::<u32>()
        };

        parsed
            .map(CompactTarget)
            .map_err(|e| Error::malformed_input(format!("Invalid nBits '{}': {}", s, e)))
    }
}

impl Serialize for CompactTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for CompactTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
