//! Peer/client RPC surface for the miner node.
//!
//! Uses jsonrpsee 0.24 to expose the five canonical operations (submit
//! transaction, receive transaction, receive block, get chain, get status)
//! plus the read-only wallet queries, over a connection-oriented JSON-RPC
//! on TCP. The same `#[rpc(server, client)]` trait also generates the
//! client used for peer dial-out.
//!
//! Validation failures never cross the wire as transport errors: every
//! reply carries `success` and an `error` message instead, so a
//! `success=true` reply always has an empty `error`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use jsonrpsee::core::async_trait;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use serde::{Deserialize, Serialize};

use ember_core::error::NodeError;
use ember_core::types::Utxo;

use crate::node::Miner;

/// Dial/request timeout for peer calls. Broadcasts are best-effort; a
/// slow peer must not stall the caller for long.
pub const PEER_TIMEOUT: Duration = Duration::from_secs(5);

/// A reference to an unspent output to be consumed by a new transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputRef {
    pub txid: String,
    pub out_index: i64,
}

/// A requested output of a new transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSpec {
    pub value: i64,
    pub scriptpubkey: String,
}

/// Arguments for `submittransaction`.
///
/// `private_keys` maps each owner public key (hex) to its private key
/// (hex), allowing transactions that spend outputs of several owners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTxRequest {
    pub inputs: Vec<InputRef>,
    pub outputs: Vec<OutputSpec>,
    pub private_keys: std::collections::HashMap<String, String>,
}

/// Reply for transaction submission and receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTxReply {
    pub success: bool,
    pub tx_id: Option<String>,
    pub error: Option<String>,
}

impl SubmitTxReply {
    pub fn ok(tx_id: String) -> Self {
        Self { success: true, tx_id: Some(tx_id), error: None }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self { success: false, tx_id: None, error: Some(error.into()) }
    }
}

/// Reply for block receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiveBlockReply {
    pub success: bool,
    pub error: Option<String>,
}

impl ReceiveBlockReply {
    pub fn ok() -> Self {
        Self { success: true, error: None }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self { success: false, error: Some(error.into()) }
    }
}

/// Reply for `getchain`: serialised blocks from the requested start index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainReply {
    pub blocks: Vec<String>,
    pub length: usize,
}

/// Reply for `getstatus`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReply {
    pub id: String,
    pub chain_length: usize,
    pub pending_txs: usize,
    pub peers: usize,
    pub mining: bool,
    pub difficulty: u32,
}

/// The miner RPC interface, served to peers and wallet clients alike.
#[rpc(server, client)]
pub trait MinerRpc {
    /// Builds, signs, validates, and broadcasts a new transaction.
    #[method(name = "submittransaction")]
    async fn submit_transaction(&self, req: SubmitTxRequest) -> Result<SubmitTxReply, ErrorObjectOwned>;

    /// Accepts a serialised transaction relayed by a peer. Idempotent on
    /// duplicate ids; does not re-broadcast.
    #[method(name = "receivetransaction")]
    async fn receive_transaction(&self, raw: String) -> Result<SubmitTxReply, ErrorObjectOwned>;

    /// Accepts a serialised block relayed by a peer.
    #[method(name = "receiveblock")]
    async fn receive_block(&self, raw: String) -> Result<ReceiveBlockReply, ErrorObjectOwned>;

    /// Returns cloned, serialised blocks from `start_index` to the head.
    #[method(name = "getchain")]
    async fn get_chain(&self, start_index: u64) -> Result<ChainReply, ErrorObjectOwned>;

    /// Node observability snapshot.
    #[method(name = "getstatus")]
    async fn get_status(&self) -> Result<StatusReply, ErrorObjectOwned>;

    /// Balance of an address: the sum of its unspent outputs.
    #[method(name = "getbalance")]
    async fn get_balance(&self, address: String) -> Result<i64, ErrorObjectOwned>;

    /// All unspent outputs owned by an address.
    #[method(name = "getutxos")]
    async fn get_utxos(&self, address: String) -> Result<Vec<Utxo>, ErrorObjectOwned>;
}

/// Server-side implementation delegating to the [`Miner`].
pub struct RpcServerImpl {
    miner: Arc<Miner>,
}

impl RpcServerImpl {
    pub fn new(miner: Arc<Miner>) -> Self {
        Self { miner }
    }
}

#[async_trait]
impl MinerRpcServer for RpcServerImpl {
    async fn submit_transaction(&self, req: SubmitTxRequest) -> Result<SubmitTxReply, ErrorObjectOwned> {
        Ok(self.miner.submit_transaction(req))
    }

    async fn receive_transaction(&self, raw: String) -> Result<SubmitTxReply, ErrorObjectOwned> {
        Ok(self.miner.receive_transaction(&raw))
    }

    async fn receive_block(&self, raw: String) -> Result<ReceiveBlockReply, ErrorObjectOwned> {
        Ok(self.miner.receive_block(&raw))
    }

    async fn get_chain(&self, start_index: u64) -> Result<ChainReply, ErrorObjectOwned> {
        Ok(self.miner.chain_reply(start_index as usize))
    }

    async fn get_status(&self) -> Result<StatusReply, ErrorObjectOwned> {
        Ok(self.miner.status())
    }

    async fn get_balance(&self, address: String) -> Result<i64, ErrorObjectOwned> {
        Ok(self.miner.chain().balance(&address))
    }

    async fn get_utxos(&self, address: String) -> Result<Vec<Utxo>, ErrorObjectOwned> {
        Ok(self.miner.chain().utxos_for_address(&address))
    }
}

/// Start the RPC server for a miner.
///
/// Returns the bound address (useful with port 0) and the server handle.
/// A bind failure is fatal for the process and is propagated.
pub async fn start_rpc_server(
    addr: &str,
    miner: Arc<Miner>,
) -> Result<(SocketAddr, ServerHandle), NodeError> {
    let server = Server::builder()
        .build(addr)
        .await
        .map_err(|e| NodeError::Bind(e.to_string()))?;
    let local_addr = server.local_addr().map_err(|e| NodeError::Bind(e.to_string()))?;
    let handle = server.start(RpcServerImpl::new(miner).into_rpc());
    Ok((local_addr, handle))
}

/// Build an HTTP client for a peer endpoint with the standard timeout.
pub fn peer_client(endpoint: &str) -> Result<HttpClient, NodeError> {
    HttpClientBuilder::default()
        .request_timeout(PEER_TIMEOUT)
        .build(endpoint)
        .map_err(|e| NodeError::PeerUnreachable(format!("{endpoint}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_constructors() {
        let ok = SubmitTxReply::ok("abc".into());
        assert!(ok.success);
        assert_eq!(ok.tx_id.as_deref(), Some("abc"));
        assert!(ok.error.is_none());

        let fail = SubmitTxReply::fail("boom");
        assert!(!fail.success);
        assert!(fail.tx_id.is_none());
        assert_eq!(fail.error.as_deref(), Some("boom"));

        assert!(ReceiveBlockReply::ok().success);
        assert!(!ReceiveBlockReply::fail("bad").success);
    }

    #[test]
    fn request_shapes_roundtrip() {
        let req = SubmitTxRequest {
            inputs: vec![InputRef { txid: "ab".repeat(32), out_index: 0 }],
            outputs: vec![OutputSpec { value: 10, scriptpubkey: "04aa".into() }],
            private_keys: std::collections::HashMap::from([("pk".into(), "sk".into())]),
        };
        let json = serde_json::to_string(&req).unwrap();
        let decoded: SubmitTxRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.inputs[0].out_index, 0);
        assert_eq!(decoded.outputs[0].value, 10);
        assert_eq!(decoded.private_keys.len(), 1);
    }

    #[test]
    fn success_reply_has_no_error() {
        // A success=true reply with a non-empty error is ill-formed by
        // contract; the constructors make it unrepresentable.
        let ok = SubmitTxReply::ok("id".into());
        assert!(ok.error.is_none());
    }
}
