//! The miner node: mempool, mining loop, broadcast fan-out, and sync.
//!
//! Each miner runs three cooperating activities: the RPC server (one task
//! per connection, handled by jsonrpsee), the mining loop (a dedicated OS
//! thread, since the nonce search is pure CPU), and fire-and-forget
//! broadcast/sync tasks on the tokio runtime. The chain lock is never
//! held across network I/O, and mining works on a private candidate.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use jsonrpsee::server::ServerHandle;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, info_span, warn};

use ember_core::block::Block;
use ember_core::chain::Blockchain;
use ember_core::constants::{BASE_SUBSIDY, MAX_BLOCK_TXS};
use ember_core::error::{ChainError, NodeError};
use ember_core::mempool::Mempool;
use ember_core::types::{Transaction, TxInput, TxOutput};
use ember_core::validation;
use ember_pow::DifficultyAdjuster;

use crate::config::MinerConfig;
use crate::rpc::{
    self, ChainReply, MinerRpcClient, ReceiveBlockReply, StatusReply, SubmitTxReply,
    SubmitTxRequest,
};

/// Block corruption applied just before broadcast.
///
/// Test harness only: exercises the honest receivers' rejection paths.
#[cfg(feature = "testing")]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tamper {
    /// Replace the hash with all zeros (passes PoW, fails the hash check).
    ZeroHash,
    /// Prepend non-zero nibbles to the hash (fails PoW and hash checks).
    CorruptPow,
    /// Point `prev_hash` somewhere else entirely.
    WrongPrevHash,
}

/// A miner node participating in the static peer mesh.
pub struct Miner {
    config: MinerConfig,
    chain: Blockchain,
    mempool: Mutex<Mempool>,
    adjuster: DifficultyAdjuster,
    /// Whether the mining loop should keep producing blocks.
    mining: AtomicBool,
    /// Cancellation flag for the in-flight nonce search.
    cancel_mining: AtomicBool,
    /// Set once by [`stop`](Miner::stop); observed before any dial-out.
    stopped: AtomicBool,
    /// New-block notification channel; fires on every successful append.
    block_notify: broadcast::Sender<Block>,
    /// Runtime handle for broadcast and sync tasks spawned off-loop.
    runtime: tokio::runtime::Handle,
    server: Mutex<Option<ServerHandle>>,
    #[cfg(feature = "testing")]
    tamper: Mutex<Option<Tamper>>,
}

impl Miner {
    /// Create a miner from its configuration.
    ///
    /// Must be called from within a tokio runtime; the miner captures the
    /// runtime handle for its asynchronous broadcast and sync tasks.
    pub fn new(config: MinerConfig) -> Arc<Self> {
        let (block_notify, _) = broadcast::channel(64);
        Arc::new(Self {
            chain: Blockchain::new(config.difficulty),
            mempool: Mutex::new(Mempool::new()),
            adjuster: DifficultyAdjuster::new(config.dynamic_difficulty),
            mining: AtomicBool::new(false),
            cancel_mining: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            block_notify,
            runtime: tokio::runtime::Handle::current(),
            server: Mutex::new(None),
            #[cfg(feature = "testing")]
            tamper: Mutex::new(None),
            config,
        })
    }

    /// This miner's identity (and coinbase recipient address).
    pub fn id(&self) -> &str {
        &self.config.miner_id
    }

    /// The miner's blockchain.
    pub fn chain(&self) -> &Blockchain {
        &self.chain
    }

    /// Subscribe to new-block notifications.
    pub fn subscribe_blocks(&self) -> broadcast::Receiver<Block> {
        self.block_notify.subscribe()
    }

    /// Start serving the RPC surface at the configured bind address.
    ///
    /// Returns the bound address. A bind failure is fatal and propagates.
    pub async fn serve(self: &Arc<Self>) -> Result<SocketAddr, NodeError> {
        let (addr, handle) = rpc::start_rpc_server(&self.config.rpc_addr(), Arc::clone(self)).await?;
        info!(%addr, id = %self.config.miner_id, "RPC server listening");
        *self.server.lock() = Some(handle);
        Ok(addr)
    }

    // --- Mining loop -----------------------------------------------------

    /// Start the mining loop on a dedicated thread. Idempotent while a
    /// loop is already running; refused after [`stop`](Miner::stop).
    pub fn start_mining(self: &Arc<Self>) {
        if self.stopped.load(Ordering::SeqCst) {
            warn!("refusing to mine on a stopped miner");
            return;
        }
        if self.mining.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel_mining.store(false, Ordering::SeqCst);

        let miner = Arc::clone(self);
        std::thread::spawn(move || {
            info!(id = %miner.config.miner_id, threads = miner.config.mining_threads, "mining loop started");
            while miner.mining.load(Ordering::SeqCst) && !miner.stopped.load(Ordering::SeqCst) {
                miner.mine_block_once();
            }
            info!(id = %miner.config.miner_id, "mining loop stopped");
        });
    }

    /// Signal the mining loop to exit and cancel the in-flight search.
    pub fn stop_mining(&self) {
        self.mining.store(false, Ordering::SeqCst);
        self.cancel_mining.store(true, Ordering::SeqCst);
    }

    /// Whether the mining loop is currently enabled.
    pub fn is_mining(&self) -> bool {
        self.mining.load(Ordering::SeqCst)
    }

    /// One pass of the mining loop: assemble a template, search, append.
    fn mine_block_once(self: &Arc<Self>) {
        let _span = info_span!("mine_block", id = %self.config.miner_id).entered();

        // Filter pending transactions in order against a speculative UTXO
        // copy, so the template can never double-spend within itself.
        let pending = self.mempool.lock().snapshot();
        let mut utxo = self.chain.utxo_snapshot();
        let mut accepted: Vec<Transaction> = Vec::new();
        let mut fees: i64 = 0;

        for tx in pending {
            if accepted.len() >= MAX_BLOCK_TXS {
                break;
            }
            match validation::validate_transaction(&tx, &utxo) {
                Ok(validated) => {
                    if utxo.process_transaction(&tx).is_ok() {
                        fees += validated.fee;
                        accepted.push(tx);
                    }
                }
                Err(e) => {
                    debug!(id = %tx.id, error = %e, "skipping stale mempool transaction");
                }
            }
        }

        let next_height = self.chain.length() as u64;
        let coinbase = Transaction::coinbase(BASE_SUBSIDY + fees, &self.config.miner_id, next_height);
        let mut transactions = Vec::with_capacity(1 + accepted.len());
        transactions.push(coinbase);
        transactions.extend(accepted);

        let candidate = match self.chain.create_block(transactions, &self.config.miner_id) {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!(error = %e, "failed to assemble candidate block");
                return;
            }
        };

        let result = if self.config.mining_threads <= 1 {
            ember_pow::mine(&candidate, &self.cancel_mining, None)
        } else {
            ember_pow::mine_parallel(&candidate, &self.cancel_mining, self.config.mining_threads)
        };
        let Some(result) = result else {
            return; // cancelled; the outer loop decides whether to retry
        };

        match self.chain.add_block(result.block.clone()) {
            Ok(()) => {
                self.after_append(&result.block);
                self.broadcast_block(result.block);
            }
            Err(e) => {
                // The chain moved ahead while we mined. Drop the block and
                // let the loop rebuild a template against the new head.
                debug!(error = %e, "discarding mined block");
            }
        }
    }

    /// Book-keeping after a block joined the local chain, whichever path
    /// appended it.
    fn after_append(&self, block: &Block) {
        self.mempool.lock().remove_confirmed(&block.transactions);
        self.adjuster.observe(&self.chain);
        let _ = self.block_notify.send(block.clone());
    }

    // --- RPC operations --------------------------------------------------

    /// Build, sign, validate, pool, and broadcast a new transaction.
    pub fn submit_transaction(self: &Arc<Self>, req: SubmitTxRequest) -> SubmitTxReply {
        if self.stopped.load(Ordering::SeqCst) {
            return SubmitTxReply::fail(NodeError::Stopped.to_string());
        }

        let utxo = self.chain.utxo_snapshot();
        let mut tx = Transaction::new(
            req.inputs
                .into_iter()
                .map(|input| TxInput {
                    txid: input.txid,
                    out_index: input.out_index,
                    scriptsig: String::new(),
                })
                .collect(),
            req.outputs
                .into_iter()
                .map(|output| TxOutput { value: output.value, scriptpubkey: output.scriptpubkey })
                .collect(),
        );

        if let Err(e) = validation::sign_transaction(&mut tx, &utxo, &req.private_keys) {
            return SubmitTxReply::fail(e.to_string());
        }
        if let Err(e) = validation::validate_transaction(&tx, &utxo) {
            return SubmitTxReply::fail(e.to_string());
        }

        let tx_id = tx.id.clone();
        let fresh = self.mempool.lock().add(tx.clone());
        if fresh {
            debug!(id = %tx_id, "transaction pooled");
            self.broadcast_transaction(tx);
        }
        SubmitTxReply::ok(tx_id)
    }

    /// Accept a transaction relayed by a peer. Idempotent on duplicate
    /// ids and never re-broadcasts.
    pub fn receive_transaction(&self, raw: &str) -> SubmitTxReply {
        let tx = match Transaction::from_json(raw) {
            Ok(tx) => tx,
            Err(e) => return SubmitTxReply::fail(format!("malformed transaction: {e}")),
        };
        if tx.is_coinbase() {
            return SubmitTxReply::fail("coinbase cannot enter the mempool");
        }

        let tx_id = tx.id.clone();
        if self.mempool.lock().contains(&tx_id) {
            return SubmitTxReply::ok(tx_id);
        }

        let utxo = self.chain.utxo_snapshot();
        if let Err(e) = validation::validate_transaction(&tx, &utxo) {
            return SubmitTxReply::fail(e.to_string());
        }

        self.mempool.lock().add(tx);
        debug!(id = %tx_id, "transaction accepted from peer");
        SubmitTxReply::ok(tx_id)
    }

    /// Accept a block relayed by a peer.
    ///
    /// Cheap header checks run before the chain lock is touched, so
    /// garbage never contends with the mining loop. A block that fails on
    /// linkage while claiming a higher index than our head hints at a
    /// longer remote chain and schedules an asynchronous full-peer sync.
    pub fn receive_block(self: &Arc<Self>, raw: &str) -> ReceiveBlockReply {
        let block = match Block::from_json(raw) {
            Ok(block) => block,
            Err(e) => return ReceiveBlockReply::fail(format!("malformed block: {e}")),
        };

        if !block.has_valid_hash() {
            return ReceiveBlockReply::fail(ChainError::InvalidHash.to_string());
        }
        if !block.has_valid_pow() {
            return ReceiveBlockReply::fail("insufficient proof of work");
        }

        let index = block.index;
        let appended = block.clone();
        match self.chain.add_block(block) {
            Ok(()) => {
                self.after_append(&appended);
                ReceiveBlockReply::ok()
            }
            Err(e @ (ChainError::InvalidPrevHash | ChainError::InvalidIndex { .. }))
                if index > self.chain.latest().index =>
            {
                debug!(index, error = %e, "block ahead of local head; scheduling sync");
                let miner = Arc::clone(self);
                self.runtime.spawn(async move {
                    miner.sync_with_all_peers().await;
                });
                ReceiveBlockReply::fail(e.to_string())
            }
            Err(e) => ReceiveBlockReply::fail(e.to_string()),
        }
    }

    /// Cloned, serialised blocks from `start` to the head.
    pub fn chain_reply(&self, start: usize) -> ChainReply {
        let blocks = self.chain.blocks_from(start);
        ChainReply {
            length: self.chain.length(),
            blocks: blocks.iter().map(|b| b.to_json()).collect(),
        }
    }

    /// Observability snapshot.
    pub fn status(&self) -> StatusReply {
        StatusReply {
            id: self.config.miner_id.clone(),
            chain_length: self.chain.length(),
            pending_txs: self.mempool.lock().len(),
            peers: self.config.peers.len(),
            mining: self.is_mining(),
            difficulty: self.chain.difficulty(),
        }
    }

    // --- Peer fan-out ----------------------------------------------------

    /// Fan a freshly mined block out to every peer, one task per peer.
    ///
    /// Re-validates the block's transaction commitments first and refuses
    /// to relay a block whose ids or Merkle root are inconsistent.
    /// Connection errors are swallowed: peers may simply be down.
    fn broadcast_block(self: &Arc<Self>, block: Block) {
        if self.stopped.load(Ordering::SeqCst) || self.config.peers.is_empty() {
            return;
        }

        let consistent = block
            .compute_merkle_root()
            .map(|root| root == block.merkle_root)
            .unwrap_or(false)
            && block.transactions.iter().all(|tx| tx.id == tx.compute_id());
        if !consistent {
            warn!(index = block.index, "refusing to broadcast block with inconsistent transactions");
            return;
        }

        #[cfg(feature = "testing")]
        let block = {
            let mut block = block;
            self.apply_tamper(&mut block);
            block
        };

        let raw = block.to_json();
        for peer in self.config.peers.clone() {
            let raw = raw.clone();
            self.runtime.spawn(async move {
                match rpc::peer_client(&peer) {
                    Ok(client) => match client.receive_block(raw).await {
                        Ok(reply) if !reply.success => {
                            debug!(%peer, error = ?reply.error, "peer rejected block");
                        }
                        Ok(_) => {}
                        Err(e) => debug!(%peer, "block broadcast failed: {e}"),
                    },
                    Err(e) => debug!(%peer, "block broadcast failed: {e}"),
                }
            });
        }
    }

    /// Fan a validated transaction out to every peer.
    fn broadcast_transaction(self: &Arc<Self>, tx: Transaction) {
        if self.stopped.load(Ordering::SeqCst) || self.config.peers.is_empty() {
            return;
        }
        let raw = tx.to_json();
        for peer in self.config.peers.clone() {
            let raw = raw.clone();
            self.runtime.spawn(async move {
                match rpc::peer_client(&peer) {
                    Ok(client) => {
                        if let Err(e) = client.receive_transaction(raw).await {
                            debug!(%peer, "transaction broadcast failed: {e}");
                        }
                    }
                    Err(e) => debug!(%peer, "transaction broadcast failed: {e}"),
                }
            });
        }
    }

    // --- Chain sync ------------------------------------------------------

    /// Pull a peer's full chain and attempt longest-chain replacement.
    ///
    /// A candidate that is not longer (or fails validation) is logged and
    /// ignored; only transport and decode problems surface as errors.
    pub async fn sync_with_peer(&self, peer: &str) -> Result<(), NodeError> {
        let client = rpc::peer_client(peer)?;
        let reply = client
            .get_chain(0)
            .await
            .map_err(|e| NodeError::PeerUnreachable(format!("{peer}: {e}")))?;

        let mut blocks = Vec::with_capacity(reply.blocks.len());
        for raw in &reply.blocks {
            blocks
                .push(Block::from_json(raw).map_err(|e| {
                    NodeError::Decode(format!("block from {peer}: {e}"))
                })?);
        }

        match self.chain.replace_chain(blocks) {
            Ok(()) => {
                info!(%peer, length = self.chain.length(), "adopted longer chain from peer");
            }
            Err(e) => debug!(%peer, "keeping local chain: {e}"),
        }
        Ok(())
    }

    /// Sync against every configured peer in turn.
    ///
    /// Invoked at startup and whenever a received block hints that a peer
    /// is ahead. Short-circuits once the miner has been stopped.
    pub async fn sync_with_all_peers(self: &Arc<Self>) {
        for peer in &self.config.peers {
            if self.stopped.load(Ordering::SeqCst) {
                return;
            }
            if let Err(e) = self.sync_with_peer(peer).await {
                warn!(%peer, "sync failed: {e}");
            }
        }
    }

    // --- Shutdown --------------------------------------------------------

    /// Stop the miner: no new outbound connections, mining loop signalled
    /// to exit, RPC listener closed. Per-connection tasks drain naturally.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop_mining();
        if let Some(handle) = self.server.lock().take() {
            let _ = handle.stop();
        }
        info!(id = %self.config.miner_id, "miner stopped");
    }

    /// Whether [`stop`](Miner::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[cfg(feature = "testing")]
impl Miner {
    /// Install (or clear) a corruption applied to broadcast copies only.
    pub fn set_tamper(&self, tamper: Option<Tamper>) {
        *self.tamper.lock() = tamper;
    }

    fn apply_tamper(&self, block: &mut Block) {
        match *self.tamper.lock() {
            None => {}
            Some(Tamper::ZeroHash) => block.hash = "0".repeat(64),
            Some(Tamper::CorruptPow) => block.hash = format!("ffff{}", &block.hash[4..]),
            Some(Tamper::WrongPrevHash) => block.prev_hash = "f".repeat(64),
        }
    }
}
