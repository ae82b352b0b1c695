//! Transaction validation and signing against a UTXO set.
//!
//! Validation runs four checks: structural sanity, input existence,
//! signature verification under each referenced UTXO's owner key, and
//! value conservation. Coinbase transactions pass trivially here;
//! their per-block placement and reward cap are enforced by the chain.
//!
//! Signing supports multi-owner transactions: the caller supplies a map
//! from owner public key to private key, and each input is signed by the
//! owner of the UTXO it spends.

use std::collections::HashMap;

use crate::crypto;
use crate::error::TransactionError;
use crate::types::Transaction;
use crate::utxo::UtxoSet;

/// Summary of a successfully validated transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedTransaction {
    /// Total value of all spent inputs in satoshi.
    pub total_input: i64,
    /// Total value of all created outputs in satoshi.
    pub total_output: i64,
    /// Miner fee in satoshi (`total_input - total_output`).
    pub fee: i64,
}

/// Context-free structural checks shared by validation and signing.
///
/// Non-empty inputs and outputs, strictly positive output values, and a
/// declared id that matches the canonical encoding.
fn validate_structure(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.inputs.is_empty() || tx.outputs.is_empty() {
        return Err(TransactionError::EmptyInputsOrOutputs);
    }
    for (i, output) in tx.outputs.iter().enumerate() {
        if output.value <= 0 {
            return Err(TransactionError::NonPositiveOutput(i));
        }
    }
    let computed = tx.compute_id();
    if tx.id != computed {
        return Err(TransactionError::IdMismatch {
            declared: tx.id.clone(),
            computed,
        });
    }
    Ok(())
}

/// Validate a transaction against the given UTXO set.
///
/// Coinbase transactions pass trivially with a zero fee (the blockchain
/// layer enforces per-block coinbase rules). For regular transactions:
///
/// 1. Structure: non-empty inputs/outputs, positive values, id integrity.
/// 2. Every referenced `(txid, out_index)` exists in the set.
/// 3. Every `scriptsig` is a valid ECDSA signature over the canonical
///    signing payload under the referenced UTXO's `scriptpubkey`.
/// 4. `Σ inputs ≥ Σ outputs`; the difference is the fee.
pub fn validate_transaction(
    tx: &Transaction,
    utxo_set: &UtxoSet,
) -> Result<ValidatedTransaction, TransactionError> {
    if tx.is_coinbase() {
        let total_output = tx.total_output_value().unwrap_or(0);
        return Ok(ValidatedTransaction {
            total_input: total_output,
            total_output,
            fee: 0,
        });
    }

    validate_structure(tx)?;

    let payload = tx.signing_payload();
    let mut total_input: i64 = 0;

    for (i, input) in tx.inputs.iter().enumerate() {
        let outpoint = input.outpoint();
        let utxo = utxo_set
            .get(&outpoint)
            .ok_or_else(|| TransactionError::UnknownUtxo(outpoint.to_string()))?;

        if input.scriptsig.is_empty() {
            return Err(TransactionError::MissingSignature { index: i });
        }
        if !crypto::verify(&payload, &input.scriptsig, &utxo.scriptpubkey) {
            return Err(TransactionError::SignatureVerifyFailed { index: i });
        }

        total_input = total_input
            .checked_add(utxo.value)
            .ok_or(TransactionError::InsufficientFunds { inputs: i64::MAX, outputs: 0 })?;
    }

    let total_output = tx
        .total_output_value()
        .ok_or(TransactionError::InsufficientFunds { inputs: total_input, outputs: i64::MAX })?;

    if total_input < total_output {
        return Err(TransactionError::InsufficientFunds {
            inputs: total_input,
            outputs: total_output,
        });
    }

    Ok(ValidatedTransaction {
        total_input,
        total_output,
        fee: total_input - total_output,
    })
}

/// Sign every input of a transaction in place.
///
/// For each input, the owner is derived from the referenced UTXO's
/// `scriptpubkey` and the matching private key is looked up in
/// `private_keys` (`owner pubkey → privkey hex`). All owners sign the
/// same canonical payload.
pub fn sign_transaction(
    tx: &mut Transaction,
    utxo_set: &UtxoSet,
    private_keys: &HashMap<String, String>,
) -> Result<(), TransactionError> {
    if tx.is_coinbase() {
        return Err(TransactionError::UnexpectedCoinbase);
    }

    let payload = tx.signing_payload();
    let mut signatures = Vec::with_capacity(tx.inputs.len());

    for input in &tx.inputs {
        let outpoint = input.outpoint();
        let utxo = utxo_set
            .get(&outpoint)
            .ok_or_else(|| TransactionError::UnknownUtxo(outpoint.to_string()))?;
        let owner = &utxo.scriptpubkey;
        let private_hex = private_keys
            .get(owner)
            .ok_or_else(|| TransactionError::MissingPrivateKey(owner.clone()))?;
        let signature = crypto::sign(&payload, private_hex)
            .map_err(|_| TransactionError::MissingPrivateKey(owner.clone()))?;
        signatures.push(signature);
    }

    for (input, signature) in tx.inputs.iter_mut().zip(signatures) {
        input.scriptsig = signature;
    }
    Ok(())
}
