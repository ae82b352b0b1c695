//! Miner node configuration.
//!
//! All process-level toggles live here and are threaded into
//! [`Miner::new`](crate::node::Miner::new) — there is no hidden global
//! state, so tests can run differently-configured miners side by side.

use ember_core::constants::DEFAULT_RPC_PORT;

/// Configuration for a miner node instance.
#[derive(Debug, Clone)]
pub struct MinerConfig {
    /// This miner's identity. Also the coinbase recipient address, so in
    /// any real deployment it is the operator's public key hex.
    pub miner_id: String,
    /// IP address for the RPC server to bind to.
    pub bind: String,
    /// Port for the RPC server. 0 picks an ephemeral port.
    pub port: u16,
    /// Peer RPC endpoints (e.g. `http://127.0.0.1:7732`). The peer set is
    /// fixed for the lifetime of the process.
    pub peers: Vec<String>,
    /// Initial proof-of-work difficulty in leading zero bits.
    pub difficulty: u32,
    /// Worker threads for the nonce search; 1 mines sequentially.
    pub mining_threads: usize,
    /// Whether to retarget difficulty every adjustment interval.
    pub dynamic_difficulty: bool,
    /// Log level filter string (e.g. "info", "ember_node=debug").
    pub log_level: String,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            miner_id: "ember-miner".to_string(),
            bind: "127.0.0.1".to_string(),
            port: DEFAULT_RPC_PORT,
            peers: Vec::new(),
            difficulty: 6,
            mining_threads: 1,
            dynamic_difficulty: false,
            log_level: "info".to_string(),
        }
    }
}

impl MinerConfig {
    /// Socket address string for the RPC server.
    pub fn rpc_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
