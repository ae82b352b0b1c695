//! Protocol constants. All monetary values in satoshi (1 EMB = 10^8 satoshi).

pub const COIN: i64 = 100_000_000;

/// Fixed component of the miner reward, before fees (50 EMB).
pub const BASE_SUBSIDY: i64 = 5_000_000_000;

/// Maximum non-coinbase transactions included in a mined block.
pub const MAX_BLOCK_TXS: usize = 10;

/// Difficulty bounds, in leading zero bits of the block hash.
pub const MIN_DIFFICULTY_BITS: u32 = 1;
pub const MAX_DIFFICULTY_BITS: u32 = 32;

/// Blocks between difficulty retargets (when dynamic difficulty is on).
pub const ADJUSTMENT_INTERVAL: u64 = 6;

/// Target spacing between blocks, in nanoseconds (10 s).
pub const TARGET_BLOCK_TIME_NS: i64 = 10_000_000_000;

/// Sentinel recipient of the genesis coinbase.
pub const GENESIS_ADDRESS: &str = "genesis";

/// `prev_hash` of the genesis block: 64 zero hex characters.
pub const GENESIS_PREV_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

pub const DEFAULT_RPC_PORT: u16 = 7732;

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn subsidy_is_fifty_coins() { assert_eq!(BASE_SUBSIDY, 50 * COIN); }
    #[test]
    fn genesis_prev_hash_is_64_zeros() {
        assert_eq!(GENESIS_PREV_HASH.len(), 64);
        assert!(GENESIS_PREV_HASH.chars().all(|c| c == '0'));
    }
    #[test]
    fn difficulty_bounds_ordered() { assert!(MIN_DIFFICULTY_BITS < MAX_DIFFICULTY_BITS); }
}
