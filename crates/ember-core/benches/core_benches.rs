//! Benchmarks for the hot data-plane paths: Merkle root construction and
//! header hashing (the inner loop of the nonce search).

use criterion::{Criterion, criterion_group, criterion_main};
use sha2::Digest;

use ember_core::block::Block;
use ember_core::merkle::{MerkleTree, merkle_root};
use ember_core::types::Transaction;

fn bench_merkle_root(c: &mut Criterion) {
    let leaves: Vec<String> = (0..256u32)
        .map(|i| hex::encode(sha2::Sha256::digest(i.to_le_bytes())))
        .collect();

    c.bench_function("merkle_root_256", |b| {
        b.iter(|| merkle_root(std::hint::black_box(&leaves)).unwrap())
    });

    c.bench_function("merkle_proof_256", |b| {
        let tree = MerkleTree::build(&leaves).unwrap();
        b.iter(|| tree.generate_proof(std::hint::black_box(&leaves[137])).unwrap())
    });
}

fn bench_header_hash(c: &mut Criterion) {
    let txs: Vec<Transaction> = (0..10)
        .map(|i| Transaction::coinbase(5_000_000_000, "bench-miner", i))
        .collect();
    let mut block =
        Block::new(1, 1_700_000_000_000_000_000, txs, "00".repeat(32), 20, "bench-miner".into())
            .unwrap();

    c.bench_function("header_hash", |b| {
        b.iter(|| {
            block.nonce = block.nonce.wrapping_add(1);
            std::hint::black_box(block.calculate_hash())
        })
    });
}

criterion_group!(benches, bench_merkle_root, bench_header_hash);
criterion_main!(benches);
