//! The unspent transaction output set.
//!
//! Keyed by compound [`OutPoint`] (`txid` + `out_index`). Cloning the set
//! yields an independent snapshot, which is how callers do speculative
//! validation: copy, apply, and either keep the copy or drop it.
//!
//! Not thread-safe — the blockchain owns its set behind its own lock.

use std::collections::HashMap;

use crate::error::TransactionError;
use crate::types::{OutPoint, Transaction, Utxo};

/// Mapping from outpoint to unspent output.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UtxoSet {
    utxos: HashMap<OutPoint, Utxo>,
}

impl UtxoSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a UTXO by outpoint.
    pub fn get(&self, outpoint: &OutPoint) -> Option<&Utxo> {
        self.utxos.get(outpoint)
    }

    /// Whether the outpoint is present and unspent.
    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.utxos.contains_key(outpoint)
    }

    /// Insert a UTXO directly. Used when connecting outputs.
    pub fn insert(&mut self, utxo: Utxo) {
        self.utxos.insert(utxo.outpoint(), utxo);
    }

    /// Apply a transaction: remove every input's UTXO (coinbase excepted),
    /// then create one UTXO per output keyed `(tx.id, index)`.
    ///
    /// All-or-nothing from the caller's viewpoint: input existence is
    /// checked before anything is mutated. There is no rollback beyond
    /// that — callers wanting speculative application clone the set first.
    pub fn process_transaction(&mut self, tx: &Transaction) -> Result<(), TransactionError> {
        if !tx.is_coinbase() {
            for input in &tx.inputs {
                let outpoint = input.outpoint();
                if !self.contains(&outpoint) {
                    return Err(TransactionError::UnknownUtxo(outpoint.to_string()));
                }
            }
            for input in &tx.inputs {
                self.utxos.remove(&input.outpoint());
            }
        }

        for (index, output) in tx.outputs.iter().enumerate() {
            self.insert(Utxo {
                txid: tx.id.clone(),
                out_index: index as i64,
                value: output.value,
                scriptpubkey: output.scriptpubkey.clone(),
            });
        }
        Ok(())
    }

    /// Sum of unspent output values owned by `address`.
    pub fn balance(&self, address: &str) -> i64 {
        self.utxos
            .values()
            .filter(|u| u.scriptpubkey == address)
            .map(|u| u.value)
            .sum()
    }

    /// All UTXOs owned by `address`.
    pub fn utxos_for_address(&self, address: &str) -> Vec<Utxo> {
        self.utxos
            .values()
            .filter(|u| u.scriptpubkey == address)
            .cloned()
            .collect()
    }

    /// Number of unspent outputs in the set.
    pub fn len(&self) -> usize {
        self.utxos.len()
    }

    /// Whether the set holds no outputs.
    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }
}
