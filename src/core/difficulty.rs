//! Difficulty retargeting
//!
//! Every [`RETARGET_INTERVAL`] blocks the target is scaled by how long the
//! previous interval actually took relative to [`TARGET_TIMESPAN`]. The
//! arithmetic here is exact integer math so the result matches the consensus
//! rule bit for bit.

use num_bigint::BigUint;
use num_traits::One;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::store::HeaderStore;
use super::target::{compact_from_uint256, target_from_bits};
use super::{RETARGET_INTERVAL, TARGET_TIMESPAN};
use crate::error::{Error, Result};

/// Largest target the retarget rule may produce, `2^224 - 1`
pub fn max_target() -> BigUint {
    (BigUint::one() << 224usize) - 1u8
}

/// Whether the block after `prev_block_number` starts a new interval
pub fn is_retarget_boundary(prev_block_number: u64) -> bool {
    prev_block_number % RETARGET_INTERVAL == RETARGET_INTERVAL - 1
}

/// Inputs of one retarget decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifficultyWindow {
    /// Timestamp of the first block of the closing interval
    pub start_time: u32,
    /// Timestamp of the last block of the closing interval
    pub prev_time: u32,
    /// Height of the last block of the closing interval
    pub prev_block_number: u64,
    /// Compact target of the last block
    pub prev_nbits: u32,
}

/// Outcome of a retarget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Retarget {
    /// Compact target for the next block
    pub nbits: u32,
    /// False when `prev_block_number` is not on a boundary
    pub adjusted: bool,
    /// The scaled target exceeded [`max_target`] and was capped
    pub clamped: bool,
    /// `prev_time - start_time`, before clamping
    pub actual_timespan: i64,
    /// Timespan used for scaling
    pub effective_timespan: i64,
}

impl DifficultyWindow {
    /// Build the window closing at `prev_block_number` from a header log
    pub fn from_store(store: &HeaderStore, prev_block_number: u64) -> Result<Self> {
        let prev = store.read_header(to_index(prev_block_number)?)?;
        let first = prev_block_number.saturating_sub(RETARGET_INTERVAL - 1);
        let start = store.read_header(to_index(first)?)?;

        Ok(Self {
            start_time: start.timestamp_u32(),
            prev_time: prev.timestamp_u32(),
            prev_block_number,
            prev_nbits: prev.nbits_u32(),
        })
    }

    /// Apply the retarget rule
    pub fn retarget(&self) -> Result<Retarget> {
        let actual_timespan = i64::from(self.prev_time) - i64::from(self.start_time);

        if !is_retarget_boundary(self.prev_block_number) {
            return Ok(Retarget {
                nbits: self.prev_nbits,
                adjusted: false,
                clamped: false,
                actual_timespan,
                effective_timespan: actual_timespan,
            });
        }

        let effective_timespan =
            actual_timespan.clamp(TARGET_TIMESPAN / 4, TARGET_TIMESPAN * 4);

        // clamp keeps the timespan positive
        let scaled = target_from_bits(self.prev_nbits)? * effective_timespan.unsigned_abs()
            / TARGET_TIMESPAN.unsigned_abs();

        let limit = max_target();
        let clamped = scaled > limit;
        let new_target = if clamped {
            debug!(
                prev_block_number = self.prev_block_number,
                prev_nbits = %format!("0x{:08x}", self.prev_nbits),
                "Retarget exceeded maximum target, clamping"
            );
            limit
        } else {
            scaled
        };

        Ok(Retarget {
            nbits: compact_from_uint256(&new_target)?,
            adjusted: true,
            clamped,
            actual_timespan,
            effective_timespan,
        })
    }
}

/// Compact target of the block after `prev_block_number`
pub fn compute_next_nbits(
    prev_time: u32,
    start_time: u32,
    prev_block_number: u64,
    prev_nbits: u32,
) -> Result<u32> {
    DifficultyWindow {
        start_time,
        prev_time,
        prev_block_number,
        prev_nbits,
    }
    .retarget()
    .map(|r| r.nbits)
}

fn to_index(block_number: u64) -> Result<i64> {
    i64::try_from(block_number)
        .map_err(|_| Error::malformed_input(format!("Block number {} too large", block_number)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::header::BlockHeader;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn window(prev_nbits: u32, prev_time: u32, start_time: u32, prev: u64) -> DifficultyWindow {
        DifficultyWindow {
            start_time,
            prev_time,
            prev_block_number: prev,
            prev_nbits,
        }
    }

    #[test]
    fn test_mainnet_retarget_32256() {
        let r = window(0x1d00ffff, 1_262_152_739, 1_261_130_161, 32_255)
            .retarget()
            .unwrap();
        assert_eq!(r.nbits, 0x1d00d86a);
        assert!(r.adjusted);
        assert!(!r.clamped);
        assert_eq!(r.actual_timespan, 1_022_578);
    }

    #[test]
    fn test_retarget_capped_at_limit() {
        let r = window(0x1d00ffff, 1_233_061_996, 1_231_006_505, 2_015)
            .retarget()
            .unwrap();
        assert_eq!(r.nbits, 0x1d00ffff);
        assert!(r.clamped);
    }

    #[test]
    fn test_timespan_lower_bound() {
        let r = window(0x1c05a3f4, 1_279_297_671, 1_279_008_237, 68_543)
            .retarget()
            .unwrap();
        assert_eq!(r.nbits, 0x1c0168fd);
        assert_eq!(r.effective_timespan, TARGET_TIMESPAN / 4);
        assert!(!r.clamped);
    }

    #[test]
    fn test_timespan_upper_bound() {
        let r = window(0x1c387f6f, 1_269_211_443, 1_263_163_443, 46_367)
            .retarget()
            .unwrap();
        assert_eq!(r.nbits, 0x1d00e1fd);
        assert_eq!(r.effective_timespan, TARGET_TIMESPAN * 4);
    }

    #[test]
    fn test_negative_timespan_clamps_low() {
        let r = window(0x1c05a3f4, 1_000, 2_000, 2_015).retarget().unwrap();
        assert_eq!(r.actual_timespan, -1_000);
        assert_eq!(r.effective_timespan, TARGET_TIMESPAN / 4);
        assert_eq!(r.nbits, 0x1c0168fd);
    }

    #[test]
    fn test_malformed_bits_on_boundary() {
        assert!(compute_next_nbits(10, 0, 2_015, 0x0100ffff).is_err());
        // identity off-boundary never decodes
        assert_eq!(compute_next_nbits(10, 0, 2_014, 0x0100ffff).unwrap(), 0x0100ffff);
    }

    #[test]
    fn test_boundary_at_top_of_range() {
        // u64::MAX % 2016 == 1023
        assert!(!is_retarget_boundary(u64::MAX));
        assert_eq!(compute_next_nbits(10, 0, u64::MAX, 0x1d00ffff).unwrap(), 0x1d00ffff);

        let last_boundary = u64::MAX - 1_024;
        assert!(is_retarget_boundary(last_boundary));
        assert_eq!(
            compute_next_nbits(1_262_152_739, 1_261_130_161, last_boundary, 0x1d00ffff).unwrap(),
            0x1d00d86a
        );
    }

    #[test]
    fn test_window_from_store() {
        let mut store = HeaderStore::default();
        for i in 0..=RETARGET_INTERVAL {
            let mut raw = [0u8; 80];
            raw[68..72].copy_from_slice(&(1_000 + 600 * i as u32).to_le_bytes());
            raw[72..76].copy_from_slice(&0x1d00ffffu32.to_le_bytes());
            store.append(&BlockHeader::from_bytes(i, &raw).unwrap());
        }

        let w = DifficultyWindow::from_store(&store, 2_015).unwrap();
        assert_eq!(w.start_time, 1_000);
        assert_eq!(w.prev_time, 1_000 + 600 * 2_015);
        assert_eq!(w.prev_nbits, 0x1d00ffff);

        assert!(DifficultyWindow::from_store(&store, 2_016).is_err());
    }

    proptest! {
        #[test]
        fn prop_identity_off_boundary(
            prev_time in any::<u32>(),
            start_time in any::<u32>(),
            prev in any::<u64>(),
            nbits in any::<u32>(),
        ) {
            prop_assume!(!is_retarget_boundary(prev));
            prop_assert_eq!(compute_next_nbits(prev_time, start_time, prev, nbits).unwrap(), nbits);
        }

        #[test]
        fn prop_retarget_within_factor_four(
            mantissa in 0x0001_0000u32..0x0080_0000,
            exp in 0x04u32..0x1c,
            span in 0i64..10_000_000,
        ) {
            let nbits = (exp << 24) | mantissa;
            let r = window(nbits, span as u32, 0, 2_015).retarget().unwrap();
            let old = target_from_bits(nbits).unwrap();
            let new = target_from_bits(r.nbits).unwrap();
            prop_assert!(new <= &old * 4u8);
            prop_assert!(&new * 4u8 + (BigUint::one() << (8 * exp as usize)) >= old);
        }
    }
}
