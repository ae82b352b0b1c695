//! Multi-node tests: longest-chain adoption, catch-up sync, and block
//! propagation across a real RPC mesh on loopback.

use std::time::{Duration, Instant};

use ember_core::crypto::KeyPair;
use ember_node::rpc::{MinerRpcClient, peer_client};
use ember_node::{Miner, MinerConfig};
use ember_tests::helpers::*;

/// Poll every 50 ms until `probe` holds or the deadline passes.
async fn wait_until<F>(seconds: u64, what: &str, probe: F)
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(seconds);
    loop {
        if probe() {
            return;
        }
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

// ======================================================================
// S3: Longest-chain adoption.
// Two disconnected miners diverge; after syncing against the longer
// peer, the shorter one adopts its chain wholesale.
// ======================================================================

#[tokio::test(flavor = "multi_thread")]
async fn longest_chain_adoption_after_sync() {
    let m1 = Miner::new(test_config("m1", 2, vec![]));
    let url1 = format!("http://{}", m1.serve().await.unwrap());

    let m2 = Miner::new(test_config("m2", 2, vec![url1]));
    m2.serve().await.unwrap();

    // Independent chains: 5 blocks on M1, 2 on M2.
    grow_chain_by(m1.chain(), "m1", 5);
    grow_chain_by(m2.chain(), "m2", 2);
    assert_eq!(m1.chain().length(), 6);
    assert_eq!(m2.chain().length(), 3);

    m2.sync_with_all_peers().await;

    assert_eq!(m2.chain().length(), m1.chain().length());
    assert_eq!(m2.chain().blocks_from(0), m1.chain().blocks_from(0));
    m1.stop();
    m2.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_keeps_longer_local_chain() {
    let m1 = Miner::new(test_config("m1", 1, vec![]));
    let url1 = format!("http://{}", m1.serve().await.unwrap());

    let m2 = Miner::new(test_config("m2", 1, vec![url1]));
    m2.serve().await.unwrap();

    grow_chain_by(m1.chain(), "m1", 2);
    grow_chain_by(m2.chain(), "m2", 4);
    let local = m2.chain().blocks_from(0);

    m2.sync_with_all_peers().await;

    // The peer's chain is shorter; ours must be untouched.
    assert_eq!(m2.chain().blocks_from(0), local);
    m1.stop();
    m2.stop();
}

// ======================================================================
// A block far ahead of the local head is rejected but schedules an
// asynchronous catch-up sync against the peer set.
// ======================================================================

#[tokio::test(flavor = "multi_thread")]
async fn ahead_block_triggers_catchup_sync() {
    let m1 = Miner::new(test_config("m1", 1, vec![]));
    let url1 = format!("http://{}", m1.serve().await.unwrap());

    let m2 = Miner::new(test_config("m2", 1, vec![url1]));
    let addr2 = m2.serve().await.unwrap();
    let client2 = peer_client(&format!("http://{addr2}")).unwrap();

    grow_chain_by(m1.chain(), "m1", 4);
    let head = m1.chain().latest();
    assert_eq!(head.index, 4);

    // M2 sits at genesis; the head block cannot attach directly.
    let reply = client2.receive_block(head.to_json()).await.unwrap();
    assert!(!reply.success);

    // But the receipt hinted at a longer remote chain; M2 catches up.
    wait_until(10, "m2 to adopt m1's chain", || m2.chain().length() == 5).await;
    assert_eq!(m2.chain().blocks_from(0), m1.chain().blocks_from(0));
    m1.stop();
    m2.stop();
}

// ======================================================================
// Freshly mined blocks propagate: the producer pushes to its peer, and
// any gap is closed by the peer pulling the longer chain back.
// ======================================================================

#[tokio::test(flavor = "multi_thread")]
async fn mined_blocks_propagate_to_peer() {
    // The listener gets a fixed port so the producer can name it as a
    // peer before the listener exists.
    let listener_port = 47831u16;
    let listener_url = format!("http://127.0.0.1:{listener_port}");

    let producer = Miner::new(test_config("producer", 14, vec![listener_url]));
    let url1 = format!("http://{}", producer.serve().await.unwrap());

    let listener = Miner::new(MinerConfig {
        port: listener_port,
        ..test_config("listener", 14, vec![url1])
    });
    listener.serve().await.unwrap();

    producer.start_mining();
    wait_until(30, "producer to mine three blocks", || producer.chain().length() >= 4).await;
    producer.stop_mining();

    wait_until(15, "listener to converge on producer's chain", || {
        listener.chain().length() == producer.chain().length()
    })
    .await;
    assert_eq!(listener.chain().blocks_from(0), producer.chain().blocks_from(0));
    producer.stop();
    listener.stop();
}

// ======================================================================
// Transactions relayed to a peer are mined there and reflected in both
// nodes once the chain syncs back.
// ======================================================================

#[tokio::test(flavor = "multi_thread")]
async fn transaction_relay_reaches_peer_mempool() {
    let key_a = KeyPair::generate();
    let key_b = KeyPair::generate();

    let relay = Miner::new(test_config("relay", 1, vec![]));
    let relay_addr = relay.serve().await.unwrap();
    let relay_client = peer_client(&format!("http://{relay_addr}")).unwrap();

    // An origin node with the funding block; the relay adopts the same
    // chain so the relayed transaction validates there too.
    let origin = Miner::new(test_config("origin", 1, vec![]));
    let funding = grow_chain(origin.chain(), &key_a.public_hex(), vec![]);
    relay.chain().replace_chain(origin.chain().blocks_from(0)).unwrap();
    assert_eq!(relay.chain().length(), 2);

    let spend = signed_spend(
        origin.chain(),
        &funding.transactions[0].id,
        &key_a,
        vec![(1_000_000_000, key_b.public_hex()), (3_999_999_999, key_a.public_hex())],
    );
    let reply = origin.receive_transaction(&spend.to_json());
    assert!(reply.success);

    // Push the same serialised transaction to the relay, as the origin's
    // broadcast task would.
    let relayed = relay_client.receive_transaction(spend.to_json()).await.unwrap();
    assert!(relayed.success);
    assert_eq!(relay_client.get_status().await.unwrap().pending_txs, 1);

    // Duplicate relay stays idempotent.
    let again = relay_client.receive_transaction(spend.to_json()).await.unwrap();
    assert!(again.success);
    assert_eq!(relay_client.get_status().await.unwrap().pending_txs, 1);

    origin.stop();
    relay.stop();
}
