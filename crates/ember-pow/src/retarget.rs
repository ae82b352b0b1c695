//! Rolling difficulty retargeting.
//!
//! Every [`ADJUSTMENT_INTERVAL`] blocks the actual time spent on the last
//! window is compared with the expected `interval × TARGET_BLOCK_TIME_NS`.
//! A window more than 20% too fast raises the difficulty by one bit, more
//! than 20% too slow lowers it by one, anything in between leaves it
//! unchanged. One bit per cycle is coarse but stable.

use tracing::info;

use ember_core::chain::Blockchain;
use ember_core::constants::{
    ADJUSTMENT_INTERVAL, MAX_DIFFICULTY_BITS, MIN_DIFFICULTY_BITS, TARGET_BLOCK_TIME_NS,
};

/// Whether a block at `index` closes an adjustment window.
pub fn should_adjust(index: u64) -> bool {
    index > 0 && index % ADJUSTMENT_INTERVAL == 0
}

/// Compute the next difficulty from the actual window duration.
///
/// `actual_ns` is the time between the window's first and last block;
/// a non-positive value is treated as "too fast". The result is clamped
/// to `[1, 32]` bits.
pub fn next_bits(actual_ns: i64, current: u32) -> u32 {
    let expected_ns = ADJUSTMENT_INTERVAL as i64 * TARGET_BLOCK_TIME_NS;
    let next = if actual_ns <= 0 {
        current + 1
    } else {
        let ratio = expected_ns as f64 / actual_ns as f64;
        if ratio > 1.2 {
            current + 1
        } else if ratio < 0.8 {
            current.saturating_sub(1)
        } else {
            current
        }
    };
    next.clamp(MIN_DIFFICULTY_BITS, MAX_DIFFICULTY_BITS)
}

/// Retarget policy attached to a miner.
#[derive(Clone, Copy, Debug)]
pub struct DifficultyAdjuster {
    enabled: bool,
}

impl DifficultyAdjuster {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Inspect the chain after a block was appended and retarget if its
    /// head closes an adjustment window.
    ///
    /// Returns the new difficulty when an adjustment was evaluated (which
    /// may equal the old one), `None` when disabled or off-cycle.
    pub fn observe(&self, chain: &Blockchain) -> Option<u32> {
        if !self.enabled {
            return None;
        }
        let head = chain.latest();
        if !should_adjust(head.index) {
            return None;
        }

        let window_start = (head.index - ADJUSTMENT_INTERVAL) as usize;
        let start_ts = chain.timestamp_at(window_start)?;
        let actual_ns = head.timestamp - start_ts;
        let current = chain.difficulty();
        let next = next_bits(actual_ns, current);
        if next != current {
            info!(index = head.index, actual_ns, from = current, to = next, "difficulty retarget");
            chain.set_difficulty(next);
        }
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::constants::BASE_SUBSIDY;
    use ember_core::types::Transaction;

    const T: i64 = TARGET_BLOCK_TIME_NS;
    const WINDOW: i64 = ADJUSTMENT_INTERVAL as i64;

    // --- should_adjust ---

    #[test]
    fn adjusts_on_positive_multiples_only() {
        assert!(!should_adjust(0));
        for i in 1..6 {
            assert!(!should_adjust(i));
        }
        assert!(should_adjust(6));
        assert!(!should_adjust(7));
        assert!(should_adjust(12));
        assert!(should_adjust(600));
    }

    // --- next_bits ---

    #[test]
    fn on_pace_window_is_unchanged() {
        assert_eq!(next_bits(WINDOW * T, 10), 10);
    }

    #[test]
    fn half_pace_window_raises_by_one() {
        // Blocks spaced at T/2: actual = expected / 2, ratio 2.0.
        assert_eq!(next_bits(WINDOW * T / 2, 10), 11);
    }

    #[test]
    fn double_pace_window_lowers_by_one() {
        // Blocks spaced at 2T: actual = expected * 2, ratio 0.5.
        assert_eq!(next_bits(WINDOW * T * 2, 10), 9);
    }

    #[test]
    fn band_edges_leave_difficulty_alone() {
        // ratio exactly 1.2 and 0.8 are inside the dead band.
        let expected = WINDOW * T;
        assert_eq!(next_bits(expected * 10 / 12, 10), 10); // ratio 1.2
        assert_eq!(next_bits(expected * 10 / 8, 10), 10); // ratio 0.8
    }

    #[test]
    fn non_positive_actual_counts_as_too_fast() {
        assert_eq!(next_bits(0, 5), 6);
        assert_eq!(next_bits(-1_000, 5), 6);
    }

    #[test]
    fn clamped_to_bounds() {
        assert_eq!(next_bits(1, MAX_DIFFICULTY_BITS), MAX_DIFFICULTY_BITS);
        assert_eq!(next_bits(WINDOW * T * 100, MIN_DIFFICULTY_BITS), MIN_DIFFICULTY_BITS);
    }

    // --- DifficultyAdjuster over a real chain ---

    /// Append a mined coinbase-only block.
    fn grow(chain: &Blockchain) {
        let next = chain.length() as u64;
        let cb = Transaction::coinbase(BASE_SUBSIDY, "m", next);
        let mut block = chain.create_block(vec![cb], "m").unwrap();
        loop {
            block.hash = block.calculate_hash();
            if block.has_valid_pow() {
                break;
            }
            block.nonce += 1;
        }
        chain.add_block(block).unwrap();
    }

    #[test]
    fn disabled_adjuster_never_fires() {
        let adjuster = DifficultyAdjuster::new(false);
        let chain = Blockchain::new(1);
        for _ in 0..ADJUSTMENT_INTERVAL {
            grow(&chain);
            assert_eq!(adjuster.observe(&chain), None);
        }
        assert_eq!(chain.difficulty(), 1);
    }

    #[test]
    fn off_cycle_blocks_do_not_adjust() {
        let adjuster = DifficultyAdjuster::new(true);
        let chain = Blockchain::new(1);
        for _ in 0..(ADJUSTMENT_INTERVAL - 1) {
            grow(&chain);
            assert_eq!(adjuster.observe(&chain), None);
        }
    }

    #[test]
    fn instant_window_raises_difficulty() {
        // Six blocks mined back-to-back are far faster than 10s apiece.
        let adjuster = DifficultyAdjuster::new(true);
        let chain = Blockchain::new(1);
        for _ in 0..ADJUSTMENT_INTERVAL {
            grow(&chain);
            adjuster.observe(&chain);
        }
        assert_eq!(chain.difficulty(), 2);
    }
}
