//! Blocks: header hashing, proof-of-work test, serialization, SPV helpers.
//!
//! The block hash covers only the header fields (including the Merkle
//! root, excluding the transaction list), so re-hashing during the nonce
//! search is O(1) in transaction count — that is the point of carrying a
//! Merkle commitment at all.

use serde::{Deserialize, Serialize};

use crate::error::MerkleError;
use crate::merkle::{MerkleProof, MerkleTree};
use crate::types::{Transaction, sha256_hex};

/// Leading zero bits contributed by the first non-zero nibble.
const NIBBLE_LEADING_ZEROS: [u32; 16] = [4, 3, 2, 2, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0];

/// Count the leading zero bits of a lowercase hex string, nibble by
/// nibble. Counting stops at the first non-zero nibble (or at the first
/// character that is not valid hex).
pub fn leading_zero_bits(hash_hex: &str) -> u32 {
    let mut bits = 0;
    for c in hash_hex.chars() {
        match c.to_digit(16) {
            Some(0) => bits += 4,
            Some(nibble) => {
                bits += NIBBLE_LEADING_ZEROS[nibble as usize];
                break;
            }
            None => break,
        }
    }
    bits
}

/// A block: header fields plus the transaction list.
///
/// Field names and order are the wire format. `timestamp` is int64
/// nanoseconds since the Unix epoch; `difficulty` is the number of leading
/// zero bits the hash must carry.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub index: u64,
    pub timestamp: i64,
    pub transactions: Vec<Transaction>,
    pub merkle_root: String,
    pub prev_hash: String,
    pub hash: String,
    pub nonce: i64,
    pub difficulty: u32,
    pub miner_id: String,
}

impl Block {
    /// Assemble a block, computing the Merkle root over the transaction
    /// ids and the initial header hash (nonce 0).
    ///
    /// Fails with [`MerkleError::EmptyTree`] if `transactions` is empty —
    /// every block carries at least its coinbase.
    pub fn new(
        index: u64,
        timestamp: i64,
        transactions: Vec<Transaction>,
        prev_hash: String,
        difficulty: u32,
        miner_id: String,
    ) -> Result<Self, MerkleError> {
        let txids: Vec<&str> = transactions.iter().map(|tx| tx.id.as_str()).collect();
        let merkle_root = crate::merkle::merkle_root(&txids)?;
        let mut block = Self {
            index,
            timestamp,
            transactions,
            merkle_root,
            prev_hash,
            hash: String::new(),
            nonce: 0,
            difficulty,
            miner_id,
        };
        block.hash = block.calculate_hash();
        Ok(block)
    }

    /// Recompute the header hash from the current header fields.
    ///
    /// `SHA-256(index ‖ timestamp ‖ merkle_root ‖ prev_hash ‖ nonce ‖
    /// difficulty ‖ miner_id)`, with numbers in decimal.
    pub fn calculate_hash(&self) -> String {
        let data = format!(
            "{}{}{}{}{}{}{}",
            self.index,
            self.timestamp,
            self.merkle_root,
            self.prev_hash,
            self.nonce,
            self.difficulty,
            self.miner_id
        );
        sha256_hex(&data)
    }

    /// Whether the stored hash matches the header fields.
    pub fn has_valid_hash(&self) -> bool {
        self.hash == self.calculate_hash()
    }

    /// Whether the stored hash meets the block's claimed difficulty.
    pub fn has_valid_pow(&self) -> bool {
        leading_zero_bits(&self.hash) >= self.difficulty
    }

    /// Recompute the Merkle root over the current transaction list.
    pub fn compute_merkle_root(&self) -> Result<String, MerkleError> {
        let txids: Vec<&str> = self.transactions.iter().map(|tx| tx.id.as_str()).collect();
        crate::merkle::merkle_root(&txids)
    }

    /// Generate an SPV inclusion proof for a transaction in this block.
    pub fn generate_spv_proof(&self, txid: &str) -> Result<MerkleProof, MerkleError> {
        let txids: Vec<&str> = self.transactions.iter().map(|tx| tx.id.as_str()).collect();
        MerkleTree::build(&txids)?.generate_proof(txid)
    }

    /// Verify that a transaction is committed by this block's header.
    ///
    /// Generates an inclusion proof and checks it against the header's
    /// Merkle root. Returns `false` when the transaction is absent.
    pub fn verify_transaction_in_block(&self, txid: &str) -> bool {
        match self.generate_spv_proof(txid) {
            Ok(proof) => proof.root == self.merkle_root && proof.verify(),
            Err(_) => false,
        }
    }

    /// Serialize to the wire JSON form.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("block serialization cannot fail")
    }

    /// Deserialize from the wire JSON form.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
