//! In-memory pool of pending transactions.
//!
//! An ordered multiset with id-based deduplication. Transactions must be
//! validated by the caller at submission time; entries can still go stale
//! when a conflicting block arrives, and are filtered out again when a
//! block template is assembled. The pool itself is not thread-safe — the
//! node wraps it in a `Mutex`.

use std::collections::HashSet;

use crate::types::Transaction;

/// Ordered pool of pending non-coinbase transactions.
#[derive(Debug, Default)]
pub struct Mempool {
    entries: Vec<Transaction>,
    ids: HashSet<String>,
}

impl Mempool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a transaction. Returns `false` (a no-op) on a duplicate id.
    pub fn add(&mut self, tx: Transaction) -> bool {
        if !self.ids.insert(tx.id.clone()) {
            return false;
        }
        self.entries.push(tx);
        true
    }

    /// Whether a transaction with the given id is pending.
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Remove every entry whose id appears in `txs`.
    ///
    /// Called each time the local chain grows with a block that confirmed
    /// (or conflicted with) pending transactions.
    pub fn remove_confirmed(&mut self, txs: &[Transaction]) {
        let confirmed: HashSet<&str> = txs.iter().map(|tx| tx.id.as_str()).collect();
        self.entries.retain(|tx| !confirmed.contains(tx.id.as_str()));
        for id in confirmed {
            self.ids.remove(id);
        }
    }

    /// Snapshot of the pending transactions, in insertion order.
    pub fn snapshot(&self) -> Vec<Transaction> {
        self.entries.clone()
    }

    /// Number of pending transactions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
