//! The append-only blockchain with UTXO state and longest-chain replacement.
//!
//! A single read-write lock guards the block list, the UTXO set, and the
//! current difficulty together; the three are only ever observed in a
//! mutually consistent state. Readers that return blocks clone them, so no
//! internal reference leaks past the lock. The lock is never held across
//! network I/O, and the nonce search runs on a private candidate block.
//!
//! `add_block` connects transactions through a speculative UTXO copy that
//! is swapped in only after the whole block checks out; on any failure the
//! chain and UTXO set are untouched.

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::block::Block;
use crate::constants::{
    BASE_SUBSIDY, GENESIS_ADDRESS, GENESIS_PREV_HASH, MAX_DIFFICULTY_BITS, MIN_DIFFICULTY_BITS,
};
use crate::error::{ChainError, TransactionError};
use crate::types::{Transaction, Utxo};
use crate::utxo::UtxoSet;
use crate::validation;

/// Current Unix time in nanoseconds.
fn now_nanos() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}

/// Everything guarded by the chain lock.
struct ChainInner {
    blocks: Vec<Block>,
    utxo_set: UtxoSet,
    difficulty: u32,
}

/// The blockchain owned by a single miner.
pub struct Blockchain {
    inner: RwLock<ChainInner>,
}

impl Blockchain {
    /// Create a chain containing only the genesis block.
    ///
    /// The genesis block holds a single coinbase paying 0 satoshi to the
    /// `"genesis"` sentinel address. Its hash is set but no proof of work
    /// is required of it.
    pub fn new(difficulty: u32) -> Self {
        let difficulty = difficulty.clamp(MIN_DIFFICULTY_BITS, MAX_DIFFICULTY_BITS);
        let coinbase = Transaction::coinbase(0, GENESIS_ADDRESS, 0);
        let genesis = Block::new(
            0,
            now_nanos(),
            vec![coinbase],
            GENESIS_PREV_HASH.to_string(),
            difficulty,
            GENESIS_ADDRESS.to_string(),
        )
        .expect("genesis has a coinbase");

        let mut utxo_set = UtxoSet::new();
        utxo_set
            .process_transaction(&genesis.transactions[0])
            .expect("genesis coinbase always applies");

        Self {
            inner: RwLock::new(ChainInner {
                blocks: vec![genesis],
                utxo_set,
                difficulty,
            }),
        }
    }

    /// Assemble a candidate block extending the current head.
    ///
    /// The candidate carries the next index, the head's hash, the current
    /// difficulty, and a fresh timestamp. It is not mined and not
    /// appended; the caller runs the nonce search and then [`add_block`].
    ///
    /// [`add_block`]: Blockchain::add_block
    pub fn create_block(
        &self,
        transactions: Vec<Transaction>,
        miner_id: &str,
    ) -> Result<Block, ChainError> {
        let inner = self.inner.read();
        let head = inner.blocks.last().expect("chain never empty");
        Block::new(
            head.index + 1,
            now_nanos(),
            transactions,
            head.hash.clone(),
            inner.difficulty,
            miner_id.to_string(),
        )
        .map_err(|_| ChainError::MissingCoinbase)
    }

    /// Validate and append a block to the head of the chain.
    ///
    /// Rejections, in order: wrong index, wrong `prev_hash`, invalid
    /// header hash, insufficient proof of work, bad Merkle root, and the
    /// per-block transaction/coinbase rules. On failure nothing changes.
    pub fn add_block(&self, block: Block) -> Result<(), ChainError> {
        let mut inner = self.inner.write();
        let head = inner.blocks.last().expect("chain never empty");

        let expected = head.index + 1;
        if block.index != expected {
            return Err(ChainError::InvalidIndex { expected, got: block.index });
        }
        if block.prev_hash != head.hash {
            return Err(ChainError::InvalidPrevHash);
        }
        validate_block_consensus(&block)?;

        // Connect through a speculative copy; swap only on full success.
        let mut utxo_set = inner.utxo_set.clone();
        connect_block(&mut utxo_set, &block)?;

        info!(index = block.index, hash = %block.hash, txs = block.transactions.len(), "appended block");
        inner.utxo_set = utxo_set;
        inner.blocks.push(block);
        Ok(())
    }

    /// Structurally validate the whole chain.
    ///
    /// Genesis is accepted unconditionally; every later block must link to
    /// its predecessor and carry a valid hash and sufficient proof of
    /// work. The per-block UTXO rules are not re-run here — incremental
    /// append and [`replace_chain`](Blockchain::replace_chain) own those.
    pub fn validate_chain(&self) -> Result<(), ChainError> {
        let inner = self.inner.read();
        validate_chain_structure(&inner.blocks)
    }

    /// Longest-chain replacement.
    ///
    /// The candidate must be strictly longer than the local chain and must
    /// validate end to end, including a fresh UTXO rebuild from genesis.
    /// On success the block list and UTXO set are replaced atomically and
    /// the difficulty follows the candidate head.
    pub fn replace_chain(&self, candidate: Vec<Block>) -> Result<(), ChainError> {
        let mut inner = self.inner.write();
        if candidate.len() <= inner.blocks.len() {
            return Err(ChainError::NotLonger {
                current: inner.blocks.len(),
                candidate: candidate.len(),
            });
        }
        validate_chain_structure(&candidate)?;
        let utxo_set = rebuild_utxo(&candidate)?;

        let difficulty = candidate.last().expect("validated non-empty").difficulty;
        info!(
            old_len = inner.blocks.len(),
            new_len = candidate.len(),
            "replacing chain with longer candidate"
        );
        inner.blocks = candidate;
        inner.utxo_set = utxo_set;
        inner.difficulty = difficulty.clamp(MIN_DIFFICULTY_BITS, MAX_DIFFICULTY_BITS);
        Ok(())
    }

    /// Number of blocks, genesis included.
    pub fn length(&self) -> usize {
        self.inner.read().blocks.len()
    }

    /// A clone of the head block.
    pub fn latest(&self) -> Block {
        self.inner.read().blocks.last().expect("chain never empty").clone()
    }

    /// Cloned blocks from `start` (inclusive) to the head.
    pub fn blocks_from(&self, start: usize) -> Vec<Block> {
        let inner = self.inner.read();
        inner.blocks.get(start..).unwrap_or_default().to_vec()
    }

    /// A clone of the block at `index`, if present.
    pub fn block_at(&self, index: usize) -> Option<Block> {
        self.inner.read().blocks.get(index).cloned()
    }

    /// Timestamp of the block at `index`, if present.
    pub fn timestamp_at(&self, index: usize) -> Option<i64> {
        self.inner.read().blocks.get(index).map(|b| b.timestamp)
    }

    /// Balance of an address: the sum of its unspent outputs.
    pub fn balance(&self, address: &str) -> i64 {
        self.inner.read().utxo_set.balance(address)
    }

    /// All unspent outputs owned by an address.
    pub fn utxos_for_address(&self, address: &str) -> Vec<Utxo> {
        self.inner.read().utxo_set.utxos_for_address(address)
    }

    /// Independent snapshot of the UTXO set for speculative validation.
    pub fn utxo_snapshot(&self) -> UtxoSet {
        self.inner.read().utxo_set.clone()
    }

    /// The difficulty new candidate blocks are created with.
    pub fn difficulty(&self) -> u32 {
        self.inner.read().difficulty
    }

    /// Set the difficulty for future candidates, clamped to `[1, 32]`.
    pub fn set_difficulty(&self, bits: u32) {
        let bits = bits.clamp(MIN_DIFFICULTY_BITS, MAX_DIFFICULTY_BITS);
        let mut inner = self.inner.write();
        if inner.difficulty != bits {
            debug!(from = inner.difficulty, to = bits, "difficulty changed");
            inner.difficulty = bits;
        }
    }
}

/// Header self-consistency: hash matches the fields, PoW matches the
/// claimed difficulty, Merkle root matches the transaction ids.
fn validate_block_consensus(block: &Block) -> Result<(), ChainError> {
    if !block.has_valid_hash() {
        return Err(ChainError::InvalidHash);
    }
    if !block.has_valid_pow() {
        return Err(ChainError::InsufficientPow {
            bits: crate::block::leading_zero_bits(&block.hash),
            required: block.difficulty,
        });
    }
    match block.compute_merkle_root() {
        Ok(root) if root == block.merkle_root => Ok(()),
        _ => Err(ChainError::InvalidMerkleRoot),
    }
}

/// Pairwise structural validation over a full block list.
fn validate_chain_structure(blocks: &[Block]) -> Result<(), ChainError> {
    let genesis = blocks.first().ok_or(ChainError::InvalidGenesis)?;
    if genesis.index != 0 || genesis.prev_hash != GENESIS_PREV_HASH {
        return Err(ChainError::InvalidGenesis);
    }

    for window in blocks.windows(2) {
        let (prev, block) = (&window[0], &window[1]);
        if block.index != prev.index + 1 {
            return Err(ChainError::InvalidIndex {
                expected: prev.index + 1,
                got: block.index,
            });
        }
        if block.prev_hash != prev.hash {
            return Err(ChainError::InvalidPrevHash);
        }
        validate_block_consensus(block)?;
    }
    Ok(())
}

/// Apply one block's transactions to a UTXO set, enforcing the per-block
/// coinbase rules.
///
/// Exactly one coinbase, at index 0, processed into the set first so that
/// later transactions in the same block could spend it. Every other
/// transaction must fully validate against the evolving set. Finally the
/// coinbase may claim at most the base subsidy plus the accumulated fees.
fn connect_block(utxo_set: &mut UtxoSet, block: &Block) -> Result<(), ChainError> {
    let Some(first) = block.transactions.first() else {
        return Err(ChainError::MissingCoinbase);
    };
    if !first.is_coinbase() {
        return match block.transactions.iter().position(Transaction::is_coinbase) {
            Some(i) => Err(ChainError::MisplacedCoinbase(i)),
            None => Err(ChainError::MissingCoinbase),
        };
    }
    if block.transactions.iter().skip(1).any(Transaction::is_coinbase) {
        return Err(ChainError::MultipleCoinbase);
    }

    if first.outputs.is_empty() {
        return Err(ChainError::Transaction {
            index: 0,
            source: TransactionError::EmptyInputsOrOutputs,
        });
    }
    if first.id != first.compute_id() {
        return Err(ChainError::Transaction {
            index: 0,
            source: TransactionError::IdMismatch {
                declared: first.id.clone(),
                computed: first.compute_id(),
            },
        });
    }

    let coinbase_value = first.total_output_value().unwrap_or(i64::MAX);
    utxo_set
        .process_transaction(first)
        .map_err(|source| ChainError::Transaction { index: 0, source })?;

    let mut total_fees: i64 = 0;
    for (i, tx) in block.transactions.iter().enumerate().skip(1) {
        let validated = validation::validate_transaction(tx, utxo_set)
            .map_err(|source| ChainError::Transaction { index: i, source })?;
        utxo_set
            .process_transaction(tx)
            .map_err(|source| ChainError::Transaction { index: i, source })?;
        total_fees = total_fees.saturating_add(validated.fee);
    }

    let max_issuance = BASE_SUBSIDY.saturating_add(total_fees);
    if coinbase_value > max_issuance {
        return Err(ChainError::OverIssuance { got: coinbase_value, max: max_issuance });
    }
    Ok(())
}

/// Rebuild the canonical UTXO set by replaying every block from genesis.
///
/// Genesis is applied without the per-block checks; every later block goes
/// through the same connect path as incremental append.
fn rebuild_utxo(blocks: &[Block]) -> Result<UtxoSet, ChainError> {
    let mut utxo_set = UtxoSet::new();
    let (genesis, rest) = blocks.split_first().ok_or(ChainError::InvalidGenesis)?;
    for tx in &genesis.transactions {
        utxo_set
            .process_transaction(tx)
            .map_err(|source| ChainError::Transaction { index: 0, source })?;
    }
    for block in rest {
        connect_block(&mut utxo_set, block)?;
    }
    Ok(utxo_set)
}
