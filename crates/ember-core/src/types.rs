//! Core protocol types: transactions, outpoints, UTXOs.
//!
//! All monetary values are in satoshi (1 EMB = 10^8 satoshi) and all
//! identifiers are lowercase hex strings of SHA-256 digests. Field names
//! are part of the wire format (structural JSON) and must not change.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 of a string, as lowercase hex.
pub fn sha256_hex(data: &str) -> String {
    hex::encode(Sha256::digest(data.as_bytes()))
}

/// Reference to a specific output of a previous transaction.
///
/// This is the identity key of a UTXO.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct OutPoint {
    /// Id of the transaction containing the referenced output.
    pub txid: String,
    /// Index of the output within that transaction.
    pub out_index: i64,
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.out_index)
    }
}

/// A transaction input, spending a previous output.
///
/// For a coinbase the sentinel values are `txid = ""` and `out_index = -1`,
/// and `scriptsig` carries `"coinbase:<height>"` for uniqueness. For a
/// regular input `scriptsig` is the hex ASN.1-DER ECDSA signature over the
/// transaction's canonical signing payload.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TxInput {
    pub txid: String,
    pub out_index: i64,
    pub scriptsig: String,
}

impl TxInput {
    /// Whether this input carries the coinbase sentinel values.
    pub fn is_coinbase_marker(&self) -> bool {
        self.txid.is_empty() && self.out_index == -1
    }

    /// The outpoint this input spends. Meaningless for coinbase inputs.
    pub fn outpoint(&self) -> OutPoint {
        OutPoint {
            txid: self.txid.clone(),
            out_index: self.out_index,
        }
    }
}

/// A transaction output, creating a new UTXO.
///
/// `scriptpubkey` is the recipient's SEC1-hex public key and doubles as
/// the account address.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TxOutput {
    pub value: i64,
    pub scriptpubkey: String,
}

/// A transaction transferring value between addresses.
///
/// The `id` is derived: SHA-256 of the canonical encoding, which excludes
/// `scriptsig` for non-coinbase inputs so the id is stable across signing.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub id: String,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// Build an unsigned transaction from outpoints and outputs, with the
    /// id precomputed. Inputs carry empty scriptsigs until signed.
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        let mut tx = Self {
            id: String::new(),
            inputs,
            outputs,
        };
        tx.id = tx.compute_id();
        tx
    }

    /// Build a coinbase paying `value` to `recipient`, unique per height.
    pub fn coinbase(value: i64, recipient: &str, height: u64) -> Self {
        Self::new(
            vec![TxInput {
                txid: String::new(),
                out_index: -1,
                scriptsig: format!("coinbase:{height}"),
            }],
            vec![TxOutput {
                value,
                scriptpubkey: recipient.to_string(),
            }],
        )
    }

    /// Check if this is a coinbase transaction (single sentinel input).
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].is_coinbase_marker()
    }

    /// The canonical signing payload: every input's `txid` and decimal
    /// `out_index`, in order, followed by every output's decimal `value`
    /// and `scriptpubkey`. Script sigs are excluded, so each owner signs
    /// the same string and inputs can be signed in any order.
    pub fn signing_payload(&self) -> String {
        let mut data = String::new();
        for input in &self.inputs {
            data.push_str(&input.txid);
            data.push_str(&input.out_index.to_string());
        }
        for output in &self.outputs {
            data.push_str(&output.value.to_string());
            data.push_str(&output.scriptpubkey);
        }
        data
    }

    /// Compute the transaction id: SHA-256 of the canonical encoding.
    ///
    /// The canonical encoding is the signing payload, except that coinbase
    /// inputs keep their `scriptsig` (`"coinbase:<height>"`) so coinbases
    /// at different heights get distinct ids.
    pub fn compute_id(&self) -> String {
        let coinbase = self.is_coinbase();
        let mut data = String::new();
        for input in &self.inputs {
            data.push_str(&input.txid);
            data.push_str(&input.out_index.to_string());
            if coinbase {
                data.push_str(&input.scriptsig);
            }
        }
        for output in &self.outputs {
            data.push_str(&output.value.to_string());
            data.push_str(&output.scriptpubkey);
        }
        sha256_hex(&data)
    }

    /// Sum of all output values. Returns `None` on overflow.
    pub fn total_output_value(&self) -> Option<i64> {
        self.outputs
            .iter()
            .try_fold(0i64, |acc, out| acc.checked_add(out.value))
    }

    /// Serialize to the wire JSON form.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("transaction serialization cannot fail")
    }

    /// Deserialize from the wire JSON form.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// An entry in the unspent transaction output set.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Utxo {
    /// Id of the transaction that created this output.
    pub txid: String,
    /// Index of the output within that transaction.
    pub out_index: i64,
    /// Value in satoshi.
    pub value: i64,
    /// Owner's public key (the address).
    pub scriptpubkey: String,
}

impl Utxo {
    /// The identity key of this UTXO.
    pub fn outpoint(&self) -> OutPoint {
        OutPoint {
            txid: self.txid.clone(),
            out_index: self.out_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx() -> Transaction {
        Transaction::new(
            vec![TxInput {
                txid: "aa".repeat(32),
                out_index: 0,
                scriptsig: String::new(),
            }],
            vec![TxOutput {
                value: 5_000_000_000,
                scriptpubkey: "04deadbeef".into(),
            }],
        )
    }

    // --- OutPoint ---

    #[test]
    fn outpoint_display() {
        let op = OutPoint { txid: "ff".repeat(32), out_index: 3 };
        assert!(format!("{op}").ends_with(":3"));
    }

    // --- Coinbase detection ---

    #[test]
    fn coinbase_detection() {
        let cb = Transaction::coinbase(5_000_000_000, "miner", 7);
        assert!(cb.is_coinbase());
        assert!(!sample_tx().is_coinbase());
    }

    #[test]
    fn coinbase_sentinel_fields() {
        let cb = Transaction::coinbase(1, "miner", 42);
        assert_eq!(cb.inputs.len(), 1);
        assert_eq!(cb.inputs[0].txid, "");
        assert_eq!(cb.inputs[0].out_index, -1);
        assert_eq!(cb.inputs[0].scriptsig, "coinbase:42");
    }

    #[test]
    fn two_sentinel_inputs_is_not_coinbase() {
        let marker = TxInput { txid: String::new(), out_index: -1, scriptsig: "x".into() };
        let tx = Transaction::new(
            vec![marker.clone(), marker],
            vec![TxOutput { value: 1, scriptpubkey: "a".into() }],
        );
        assert!(!tx.is_coinbase());
    }

    // --- Canonical payload and id ---

    #[test]
    fn signing_payload_layout() {
        let tx = Transaction::new(
            vec![TxInput { txid: "ab".into(), out_index: 2, scriptsig: "SIG".into() }],
            vec![TxOutput { value: 99, scriptpubkey: "PK".into() }],
        );
        assert_eq!(tx.signing_payload(), "ab299PK");
    }

    #[test]
    fn signing_payload_excludes_scriptsig() {
        let mut tx = sample_tx();
        let before = tx.signing_payload();
        tx.inputs[0].scriptsig = "3045deadbeef".into();
        assert_eq!(tx.signing_payload(), before);
    }

    #[test]
    fn id_stable_across_signing() {
        let mut tx = sample_tx();
        let id = tx.compute_id();
        tx.inputs[0].scriptsig = "3045deadbeef".into();
        assert_eq!(tx.compute_id(), id);
    }

    #[test]
    fn id_changes_with_outputs() {
        let tx1 = sample_tx();
        let mut tx2 = sample_tx();
        tx2.outputs[0].value += 1;
        assert_ne!(tx1.compute_id(), tx2.compute_id());
    }

    #[test]
    fn id_changes_with_inputs() {
        let tx1 = sample_tx();
        let mut tx2 = sample_tx();
        tx2.inputs[0].out_index = 1;
        assert_ne!(tx1.compute_id(), tx2.compute_id());
    }

    #[test]
    fn coinbase_ids_unique_per_height() {
        let a = Transaction::coinbase(5_000_000_000, "miner", 1);
        let b = Transaction::coinbase(5_000_000_000, "miner", 2);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn new_precomputes_id() {
        let tx = sample_tx();
        assert_eq!(tx.id, tx.compute_id());
        assert_eq!(tx.id.len(), 64);
    }

    // --- Output totals ---

    #[test]
    fn total_output_value_sums() {
        let tx = Transaction::new(
            vec![],
            vec![
                TxOutput { value: 100, scriptpubkey: "a".into() },
                TxOutput { value: 200, scriptpubkey: "b".into() },
            ],
        );
        assert_eq!(tx.total_output_value(), Some(300));
    }

    #[test]
    fn total_output_value_overflow_is_none() {
        let tx = Transaction::new(
            vec![],
            vec![
                TxOutput { value: i64::MAX, scriptpubkey: "a".into() },
                TxOutput { value: 1, scriptpubkey: "b".into() },
            ],
        );
        assert_eq!(tx.total_output_value(), None);
    }

    // --- Wire format ---

    #[test]
    fn json_field_names_are_fixed() {
        let tx = sample_tx();
        let json = tx.to_json();
        assert!(json.contains("\"id\""));
        assert!(json.contains("\"inputs\""));
        assert!(json.contains("\"outputs\""));
        assert!(json.contains("\"txid\""));
        assert!(json.contains("\"out_index\""));
        assert!(json.contains("\"scriptsig\""));
        assert!(json.contains("\"value\""));
        assert!(json.contains("\"scriptpubkey\""));
    }

    #[test]
    fn json_roundtrip() {
        let tx = sample_tx();
        let decoded = Transaction::from_json(&tx.to_json()).unwrap();
        assert_eq!(tx, decoded);
    }

    #[test]
    fn coinbase_json_roundtrip() {
        let cb = Transaction::coinbase(5_000_000_001, "miner-key", 9);
        let decoded = Transaction::from_json(&cb.to_json()).unwrap();
        assert_eq!(cb, decoded);
        assert!(decoded.is_coinbase());
    }

    #[test]
    fn from_json_rejects_garbage() {
        assert!(Transaction::from_json("{nope").is_err());
        assert!(Transaction::from_json("{}").is_err());
    }

    // --- Utxo ---

    #[test]
    fn utxo_outpoint_matches_fields() {
        let utxo = Utxo {
            txid: "cd".repeat(32),
            out_index: 4,
            value: 10,
            scriptpubkey: "04ab".into(),
        };
        let op = utxo.outpoint();
        assert_eq!(op.txid, utxo.txid);
        assert_eq!(op.out_index, 4);
    }

    // --- sha256_hex ---

    #[test]
    fn sha256_hex_known_vector() {
        // SHA-256 of the empty string.
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
