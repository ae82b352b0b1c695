//! SHA-256 Merkle tree for transaction commitment.
//!
//! Leaves are hashed from the raw bytes of each leaf value: hex leaves (the
//! usual case, transaction ids) are decoded first, anything else falls back
//! to its UTF-8 bytes. Internal nodes hash the concatenation of their two
//! children's digests. Odd-length layers are completed by duplicating the
//! last node (Bitcoin's rule).
//!
//! Inclusion proofs carry the sibling digest and a direction bit per level;
//! `true` means the sibling sits on the right of the running hash.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::MerkleError;

/// Hash a leaf value: SHA-256 of its decoded bytes.
///
/// Hex input is decoded to raw bytes first; non-hex input is hashed as-is.
pub fn leaf_hash(leaf: &str) -> [u8; 32] {
    let bytes = hex::decode(leaf).unwrap_or_else(|_| leaf.as_bytes().to_vec());
    Sha256::digest(&bytes).into()
}

/// Hash an internal node: SHA-256 of the two child digests concatenated.
fn node_hash(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Compute the next layer of the tree from the current one.
///
/// Pairs adjacent digests; duplicates the last one when the layer has an
/// odd number of entries.
fn next_layer(layer: &[[u8; 32]]) -> Vec<[u8; 32]> {
    let mut next = Vec::with_capacity(layer.len().div_ceil(2));
    let mut i = 0;
    while i < layer.len() {
        let left = &layer[i];
        let right = if i + 1 < layer.len() { &layer[i + 1] } else { left };
        next.push(node_hash(left, right));
        i += 2;
    }
    next
}

/// Compute the Merkle root over a slice of leaf values (typically tx ids).
///
/// More efficient than building a full [`MerkleTree`] when proofs are not
/// needed. Fails with [`MerkleError::EmptyTree`] for an empty slice.
pub fn merkle_root<S: AsRef<str>>(leaves: &[S]) -> Result<String, MerkleError> {
    if leaves.is_empty() {
        return Err(MerkleError::EmptyTree);
    }
    let mut current: Vec<[u8; 32]> = leaves.iter().map(|l| leaf_hash(l.as_ref())).collect();
    while current.len() > 1 {
        current = next_layer(&current);
    }
    Ok(hex::encode(current[0]))
}

/// Full Merkle tree supporting root computation and proof generation.
///
/// Stores all intermediate layers so that inclusion proofs can be
/// extracted for any leaf.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    /// `layers[0]` = leaf hashes, `layers[last]` = `[root]`.
    layers: Vec<Vec<[u8; 32]>>,
}

impl MerkleTree {
    /// Build a Merkle tree from leaf values.
    ///
    /// Fails with [`MerkleError::EmptyTree`] if no leaves are given.
    pub fn build<S: AsRef<str>>(leaves: &[S]) -> Result<Self, MerkleError> {
        if leaves.is_empty() {
            return Err(MerkleError::EmptyTree);
        }
        let mut layers = Vec::new();
        layers.push(leaves.iter().map(|l| leaf_hash(l.as_ref())).collect::<Vec<_>>());
        while layers.last().expect("at least one layer").len() > 1 {
            let next = next_layer(layers.last().expect("at least one layer"));
            layers.push(next);
        }
        Ok(Self { layers })
    }

    /// The Merkle root as lowercase hex.
    pub fn root(&self) -> String {
        hex::encode(self.layers.last().expect("non-empty tree")[0])
    }

    /// Number of leaves in the tree.
    pub fn leaf_count(&self) -> usize {
        self.layers[0].len()
    }

    /// Generate an inclusion proof for the given leaf value.
    ///
    /// The leaf is located by its hash, so the caller passes the original
    /// transaction id. Fails with [`MerkleError::TransactionNotFound`] if
    /// the hashed id matches no leaf.
    pub fn generate_proof(&self, leaf: &str) -> Result<MerkleProof, MerkleError> {
        let target = leaf_hash(leaf);
        let mut pos = self.layers[0]
            .iter()
            .position(|h| *h == target)
            .ok_or_else(|| MerkleError::TransactionNotFound(leaf.to_string()))?;

        let mut siblings = Vec::new();
        let mut directions = Vec::new();

        // Walk from the leaf layer to just below the root.
        for layer in &self.layers[..self.layers.len() - 1] {
            let sibling_pos = pos ^ 1;
            let sibling = if sibling_pos < layer.len() {
                layer[sibling_pos]
            } else {
                // Odd layer: the last node was duplicated, so it is its own sibling.
                layer[pos]
            };
            siblings.push(hex::encode(sibling));
            directions.push(pos % 2 == 0);
            pos /= 2;
        }

        Ok(MerkleProof {
            tx_hash: hex::encode(target),
            root: self.root(),
            siblings,
            directions,
        })
    }
}

/// Merkle inclusion proof for a single leaf.
///
/// Proves that the leaf whose hash is `tx_hash` belongs to the tree with
/// the given `root`. `directions[i]` is `true` iff `siblings[i]` sits on
/// the right at level `i`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MerkleProof {
    pub tx_hash: String,
    pub root: String,
    pub siblings: Vec<String>,
    pub directions: Vec<bool>,
}

impl MerkleProof {
    /// Verify this proof by recomputing the root from the leaf hash and
    /// sibling path.
    ///
    /// Returns `false` for any malformed field (bad hex, wrong digest
    /// length, mismatched sibling/direction counts) — a proof that cannot
    /// be interpreted does not prove anything.
    pub fn verify(&self) -> bool {
        if self.siblings.len() != self.directions.len() {
            return false;
        }
        let Some(mut current) = decode_digest(&self.tx_hash) else {
            return false;
        };
        for (sibling_hex, sibling_on_right) in self.siblings.iter().zip(&self.directions) {
            let Some(sibling) = decode_digest(sibling_hex) else {
                return false;
            };
            current = if *sibling_on_right {
                node_hash(&current, &sibling)
            } else {
                node_hash(&sibling, &current)
            };
        }
        hex::encode(current) == self.root
    }
}

/// Decode a 64-char hex string into a 32-byte digest.
fn decode_digest(hex_str: &str) -> Option<[u8; 32]> {
    let bytes = hex::decode(hex_str).ok()?;
    bytes.try_into().ok()
}
