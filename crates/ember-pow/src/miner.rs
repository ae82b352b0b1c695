//! The proof-of-work nonce search.
//!
//! Both entry points take a candidate block (header already final apart
//! from nonce and hash) and a cancellation flag that is polled once per
//! nonce, so cancellation latency is a single hash. The candidate is
//! cloned; the caller's block is never mutated.
//!
//! Cancellation is an ordinary outcome, not an error: both miners return
//! `None` when the flag is raised before a hash is found.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;

use tracing::{debug, trace};

use ember_core::block::Block;

/// Attempts between progress callbacks in the sequential miner.
pub const PROGRESS_INTERVAL: u64 = 100_000;

/// Progress observer, called with the attempt count so far.
pub type ProgressFn = dyn Fn(u64) + Sync;

/// A successful nonce search: the mined block with `nonce` and `hash` set.
#[derive(Clone, Debug)]
pub struct MineResult {
    pub block: Block,
    pub nonce: i64,
}

/// Sequential nonce search.
///
/// Starts from a uniformly random `i64` (so concurrent miners on the same
/// candidate do not race over the same nonces) and walks upward with
/// wraparound. `progress` — if supplied — is invoked every
/// [`PROGRESS_INTERVAL`] attempts, for observability only.
pub fn mine(candidate: &Block, cancel: &AtomicBool, progress: Option<&ProgressFn>) -> Option<MineResult> {
    let mut block = candidate.clone();
    let mut nonce: i64 = rand::random();
    let mut attempts: u64 = 0;

    loop {
        if cancel.load(Ordering::Relaxed) {
            debug!(attempts, index = block.index, "nonce search cancelled");
            return None;
        }

        block.nonce = nonce;
        block.hash = block.calculate_hash();
        if block.has_valid_pow() {
            debug!(attempts, nonce, hash = %block.hash, "found valid nonce");
            return Some(MineResult { nonce, block });
        }

        nonce = nonce.wrapping_add(1);
        attempts += 1;
        if attempts % PROGRESS_INTERVAL == 0 {
            trace!(attempts, index = block.index, "still searching");
            if let Some(cb) = progress {
                cb(attempts);
            }
        }
    }
}

/// Parallel nonce search with `workers` cooperating searchers.
///
/// Worker `k` starts at `random + k` and strides by `workers`, so the
/// searchers partition the nonce space modulo the worker count. The first
/// worker to find a valid hash wins a compare-and-swap on a shared `found`
/// flag and publishes its result on a bounded channel; every other worker
/// observes the flag (or the caller's cancellation) and returns. At most
/// one result is ever published, and all workers terminate promptly after
/// success or cancellation.
pub fn mine_parallel(candidate: &Block, cancel: &AtomicBool, workers: usize) -> Option<MineResult> {
    if workers <= 1 {
        return mine(candidate, cancel, None);
    }

    let found = AtomicBool::new(false);
    let found = &found;
    let (result_tx, result_rx) = mpsc::sync_channel::<MineResult>(1);
    let base: i64 = rand::random();
    let stride = workers as i64;

    thread::scope(|scope| {
        for k in 0..workers {
            let mut block = candidate.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                let mut nonce = base.wrapping_add(k as i64);
                loop {
                    if found.load(Ordering::Acquire) || cancel.load(Ordering::Relaxed) {
                        return;
                    }
                    block.nonce = nonce;
                    block.hash = block.calculate_hash();
                    if block.has_valid_pow() {
                        if found
                            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                            .is_ok()
                        {
                            debug!(worker = k, nonce, hash = %block.hash, "worker found valid nonce");
                            let _ = result_tx.send(MineResult { nonce, block });
                        }
                        return;
                    }
                    nonce = nonce.wrapping_add(stride);
                }
            });
        }
        // Drop the dispatcher's sender so recv unblocks once every worker
        // has returned without publishing (cancellation).
        drop(result_tx);
        result_rx.recv().ok()
    })
}
