//! Bit vectors as consumed and produced by the proof circuits.
//!
//! Circuits take hashes and headers as MSB-first bit arrays and report their
//! outputs as `~out_0 .. ~out_N` entries in a JSON object.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::utils::parse_hex;

/// Expand bytes into bits, most significant bit first
pub fn bytes_to_bits(bytes: &[u8]) -> Vec<u8> {
    bytes
        .iter()
        .flat_map(|byte| (0..8).rev().map(move |shift| (byte >> shift) & 1))
        .collect()
}

/// Render bits as `0`/`1` characters joined by `separator`
pub fn bits_to_string(bits: &[u8], separator: &str) -> String {
    bits.iter()
        .map(|bit| if *bit == 0 { "0" } else { "1" })
        .collect::<Vec<_>>()
        .join(separator)
}

/// Decode a hex string (with or without `0x`) into its bit string and bits
pub fn hex_to_bits(hex: &str) -> Result<(String, Vec<u8>)> {
    let bytes = parse_hex(hex)?;
    let bits = bytes_to_bits(&bytes);
    Ok((bits_to_string(&bits, ""), bits))
}

/// Pack MSB-first bits back into bytes
pub fn bits_to_bytes(bits: &[u8]) -> Result<Vec<u8>> {
    if bits.len() % 8 != 0 {
        return Err(Error::malformed_input(format!(
            "Bit count {} is not a multiple of 8",
            bits.len()
        )));
    }

    bits.chunks(8)
        .map(|chunk| {
            chunk.iter().try_fold(0u8, |acc, bit| match bit {
                0 | 1 => Ok((acc << 1) | bit),
                other => Err(Error::malformed_input(format!("Invalid bit value {}", other))),
            })
        })
        .collect()
}

/// Read a 256-bit circuit output (`~out_0` .. `~out_255`) into 32 bytes
pub fn parse_circuit_output(text: &str) -> Result<[u8; 32]> {
    let value: Value = serde_json::from_str(text)?;
    let object = value
        .as_object()
        .ok_or_else(|| Error::malformed_input("Circuit output must be a JSON object"))?;

    let bits = (0..256)
        .map(|i| {
            let key = format!("~out_{}", i);
            let entry = object
                .get(&key)
                .ok_or_else(|| Error::malformed_input(format!("Missing {}", key)))?;
            let bit = match entry {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.trim().parse::<u64>().ok(),
                _ => None,
            };
            match bit {
                Some(b @ (0 | 1)) => Ok(b as u8),
                _ => Err(Error::malformed_input(format!("{} is not a bit: {}", key, entry))),
            }
        })
        .collect::<Result<Vec<u8>>>()?;

    let bytes = bits_to_bytes(&bits)?;
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(out)
}
