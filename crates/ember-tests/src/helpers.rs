//! Shared test helpers: deterministic chain growth and signed spends.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;

use ember_core::block::Block;
use ember_core::chain::Blockchain;
use ember_core::constants::BASE_SUBSIDY;
use ember_core::crypto::KeyPair;
use ember_core::types::{Transaction, TxInput, TxOutput};
use ember_core::validation;
use ember_node::MinerConfig;

/// A miner config bound to an ephemeral port.
pub fn test_config(miner_id: &str, difficulty: u32, peers: Vec<String>) -> MinerConfig {
    MinerConfig {
        miner_id: miner_id.to_string(),
        port: 0,
        difficulty,
        peers,
        ..Default::default()
    }
}

/// Mine a block directly onto a chain: coinbase for `miner` plus `extra`
/// transactions, with fees credited to the coinbase. Returns the block.
pub fn grow_chain(chain: &Blockchain, miner: &str, extra: Vec<Transaction>) -> Block {
    let utxo = chain.utxo_snapshot();
    let fees: i64 = extra
        .iter()
        .map(|tx| validation::validate_transaction(tx, &utxo).map(|v| v.fee).unwrap_or(0))
        .sum();

    let height = chain.length() as u64;
    let mut txs = vec![Transaction::coinbase(BASE_SUBSIDY + fees, miner, height)];
    txs.extend(extra);

    let candidate = chain.create_block(txs, miner).expect("candidate assembles");
    let mined = ember_pow::mine(&candidate, &AtomicBool::new(false), None).expect("not cancelled");
    chain.add_block(mined.block.clone()).expect("block appends");
    mined.block
}

/// Grow a chain by `count` coinbase-only blocks.
pub fn grow_chain_by(chain: &Blockchain, miner: &str, count: usize) {
    for _ in 0..count {
        grow_chain(chain, miner, vec![]);
    }
}

/// Build a standalone block list of the given total length (genesis
/// included), mined at the given difficulty.
pub fn build_block_list(len: usize, difficulty: u32, miner: &str) -> Vec<Block> {
    let chain = Blockchain::new(difficulty);
    grow_chain_by(&chain, miner, len.saturating_sub(1));
    chain.blocks_from(0)
}

/// Build and sign a transaction spending `txid:0`, owned by `owner`.
pub fn signed_spend(
    chain: &Blockchain,
    txid: &str,
    owner: &KeyPair,
    outputs: Vec<(i64, String)>,
) -> Transaction {
    let utxo = chain.utxo_snapshot();
    let mut tx = Transaction::new(
        vec![TxInput { txid: txid.to_string(), out_index: 0, scriptsig: String::new() }],
        outputs
            .into_iter()
            .map(|(value, scriptpubkey)| TxOutput { value, scriptpubkey })
            .collect(),
    );
    let keys = HashMap::from([(owner.public_hex(), owner.private_hex())]);
    validation::sign_transaction(&mut tx, &utxo, &keys).expect("owner key signs");
    tx
}
