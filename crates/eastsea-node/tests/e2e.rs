//! End-to-end scenarios from spec.md §8: two real nodes talking over
//! real TCP sockets on loopback, not mocked transports. Ports are
//! spaced far apart per test to tolerate parallel `cargo test` runs.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use eastsea_chain::MempoolConfig;
use eastsea_codec::message::HandshakePayload;
use eastsea_codec::{FrameReader, FrameWriter, Message};
use eastsea_node::{Node, NodeConfig, NodeHandle};
use eastsea_transport::TransportConfig;
use eastsea_types::errors::ChainError;
use eastsea_types::Transaction;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};

fn dht_id_of(key: &str) -> [u8; 20] {
    use sha1::{Digest, Sha1};
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.finalize().into()
}

fn addr(port: u16) -> SocketAddr {
    SocketAddr::new(Ipv4Addr::LOCALHOST.into(), port)
}

fn fast_transport() -> TransportConfig {
    TransportConfig {
        ping_interval: Duration::from_millis(100),
        pong_timeout: Duration::from_millis(150),
        handshake_timeout: Duration::from_secs(2),
        ..TransportConfig::default()
    }
}

async fn wait_until<F>(deadline: Duration, mut poll: F) -> bool
where
    F: FnMut() -> std::pin::Pin<Box<dyn std::future::Future<Output = bool> + Send>>,
{
    let end = Instant::now() + deadline;
    loop {
        if poll().await {
            return true;
        }
        if Instant::now() >= end {
            return false;
        }
        sleep(Duration::from_millis(20)).await;
    }
}

/// spec.md §8 S1: two-node handshake and ping. A listens first; B
/// bootstraps off A. Both should see a single connected peer quickly.
#[tokio::test]
async fn s1_two_node_handshake_and_ping() {
    let mut config_a = NodeConfig::new(addr(21001));
    config_a.transport = fast_transport();
    let node_a = Node::bind(config_a).await.unwrap();
    let run_a = node_a.clone();
    let task_a = tokio::spawn(async move { run_a.run().await });

    let mut config_b = NodeConfig::new(addr(21002));
    config_b.transport = fast_transport();
    config_b.bootstrap_seeds = vec![addr(21001)];
    let node_b = Node::bind(config_b).await.unwrap();
    let run_b = node_b.clone();
    let task_b = tokio::spawn(async move { run_b.run().await });

    let connected = wait_until(Duration::from_secs(2), || {
        let a = node_a.clone();
        let b = node_b.clone();
        Box::pin(async move { a.get_peers().await.len() == 1 && b.get_peers().await.len() == 1 })
    })
    .await;
    assert!(connected, "A and B should both see one connected peer within 2s");

    // Give the keepalive loop one more round trip so both sides log a
    // successful pong before we tear down.
    sleep(Duration::from_millis(250)).await;

    node_a.shutdown().await;
    node_b.shutdown().await;
    task_a.abort();
    task_b.abort();
}

/// spec.md §8 S2: submit a transaction to the leader; once it mines,
/// the follower ingests the broadcast block and both chains validate.
#[tokio::test]
async fn s2_transaction_propagation_and_mining() {
    let mut config_a = NodeConfig::new(addr(21011));
    config_a.transport = fast_transport();
    config_a.slot_duration = Duration::from_millis(80);
    config_a.difficulty = 1;
    let node_a = Node::bind(config_a).await.unwrap();
    let run_a = node_a.clone();
    let task_a = tokio::spawn(async move { run_a.run().await });

    let mut config_b = NodeConfig::new(addr(21012));
    config_b.transport = fast_transport();
    config_b.slot_duration = Duration::from_millis(80);
    config_b.difficulty = 1;
    config_b.bootstrap_seeds = vec![addr(21011)];
    let node_b = Node::bind(config_b).await.unwrap();
    let run_b = node_b.clone();
    let task_b = tokio::spawn(async move { run_b.run().await });

    let connected = wait_until(Duration::from_secs(2), || {
        let a = node_a.clone();
        Box::pin(async move { a.get_peers().await.len() == 1 })
    })
    .await;
    assert!(connected, "A and B must be connected before submitting work");

    let tx = Transaction::new("alice", "bob", 50, 1_700_000_000);
    node_a.submit_transaction(tx.clone()).await.unwrap();

    let a_mined = wait_until(Duration::from_secs(3), || {
        let a = node_a.clone();
        Box::pin(async move { a.get_height().await >= 1 })
    })
    .await;
    assert!(a_mined, "leader should mine within a couple of slots");

    let b_caught_up = wait_until(Duration::from_secs(3), || {
        let a = node_a.clone();
        let b = node_b.clone();
        Box::pin(async move { b.get_height().await >= a.get_height().await })
    })
    .await;
    assert!(b_caught_up, "follower should ingest the broadcast block");

    let block = node_a.get_block(1).await.expect("block 1 should exist");
    assert!(block.transactions.iter().any(|t| t.hash() == tx.hash()));

    node_a.shutdown().await;
    node_b.shutdown().await;
    task_a.abort();
    task_b.abort();
}

/// `submit_transaction` must surface a full mempool as an error rather
/// than returning a hash for a transaction that was never accepted
/// (spec.md §6 RPC contract, §7 `MempoolFull`).
#[tokio::test]
async fn submit_transaction_reports_a_full_mempool_instead_of_masking_it() {
    let mut config = NodeConfig::new(addr(21051));
    config.transport = fast_transport();
    config.mempool = MempoolConfig { max_len: Some(1) };
    let node = Node::bind(config).await.unwrap();

    let first = Transaction::new("alice", "bob", 1, 0);
    node.submit_transaction(first).await.unwrap();

    let second = Transaction::new("carol", "dave", 2, 1);
    let err = node.submit_transaction(second).await.unwrap_err();
    assert_eq!(err, ChainError::MempoolFull { max: 1 });
}

/// spec.md §8 S5: a frame with a bad magic number closes only the
/// offending session; the node keeps running and accepts other peers.
#[tokio::test]
async fn s5_malformed_frame_closes_only_the_offending_session() {
    let mut config_a = NodeConfig::new(addr(21021));
    config_a.transport = fast_transport();
    let node_a = Node::bind(config_a).await.unwrap();
    let run_a = node_a.clone();
    let task_a = tokio::spawn(async move { run_a.run().await });

    // Give the listener a moment to be definitely ready to accept.
    sleep(Duration::from_millis(20)).await;

    let mut bad = TcpStream::connect(addr(21021)).await.unwrap();
    let mut raw = Vec::new();
    raw.extend_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
    raw.push(0x03);
    raw.extend_from_slice(&0u32.to_le_bytes());
    raw.extend_from_slice(&0u32.to_le_bytes());
    bad.write_all(&raw).await.unwrap();

    let offender_gone = wait_until(Duration::from_secs(1), || {
        let a = node_a.clone();
        Box::pin(async move { a.get_peers().await.is_empty() })
    })
    .await;
    assert!(offender_gone, "the malformed session should close within 1s");

    // The node must still be healthy: a well-behaved peer can connect.
    let mut config_b = NodeConfig::new(addr(21022));
    config_b.transport = fast_transport();
    config_b.bootstrap_seeds = vec![addr(21021)];
    let node_b = Node::bind(config_b).await.unwrap();
    let run_b = node_b.clone();
    let task_b = tokio::spawn(async move { run_b.run().await });

    let connected = wait_until(Duration::from_secs(2), || {
        let a = node_a.clone();
        Box::pin(async move { a.get_peers().await.len() == 1 })
    })
    .await;
    assert!(connected, "node A should keep accepting well-behaved peers after the bad frame");

    node_a.shutdown().await;
    node_b.shutdown().await;
    task_a.abort();
    task_b.abort();
}

/// spec.md §8 S6: a peer that stops responding (without a clean TCP
/// close) is reaped after the ping/pong keepalive budget elapses.
#[tokio::test]
async fn s6_unresponsive_peer_is_reaped() {
    let mut config_a = NodeConfig::new(addr(21031));
    config_a.transport = fast_transport();
    let node_a = Node::bind(config_a).await.unwrap();
    let run_a = node_a.clone();
    let task_a = tokio::spawn(async move { run_a.run().await });

    sleep(Duration::from_millis(20)).await;

    // Hand-roll the peer side of the handshake, then go silent. The
    // stream is kept alive (not dropped) so no FIN is ever sent --
    // this is "stopped, not closed".
    let stream = TcpStream::connect(addr(21031)).await.unwrap();
    let (read_half, write_half) = stream.into_split();
    let mut reader = FrameReader::new(read_half);
    let mut writer = FrameWriter::new(write_half);

    let hello = Message::Handshake(HandshakePayload {
        protocol_version: eastsea_codec::PROTOCOL_VERSION,
        node_id: [9u8; 32],
        listen_port: 21032,
        ts: 0,
    });
    writer.write_message(&hello).await.unwrap();

    // A sends its own Handshake unprompted too (either side may see
    // the other's Handshake first, spec.md §4.C) -- drain messages
    // until we see A's Handshake (and ack it) or its HandshakeAck.
    let handshake_done = timeout(Duration::from_secs(1), async {
        loop {
            match reader.read_message().await.unwrap() {
                Some(Message::Handshake(_)) => {
                    writer.write_message(&hello).await.unwrap();
                    return;
                }
                Some(Message::HandshakeAck(_)) => return,
                _ => continue,
            }
        }
    })
    .await;
    assert!(handshake_done.is_ok(), "handshake with A should complete");

    let connected = wait_until(Duration::from_secs(1), || {
        let a = node_a.clone();
        Box::pin(async move { a.get_peers().await.len() == 1 })
    })
    .await;
    assert!(connected, "the hand-rolled peer should register as connected");

    // Never answer another Ping from here on. Keep `reader`/`writer`
    // alive in this scope so the socket stays open.
    let reaped = wait_until(Duration::from_secs(2), || {
        let a = node_a.clone();
        Box::pin(async move { a.get_peers().await.is_empty() })
    })
    .await;
    assert!(reaped, "A should reap the unresponsive peer within its keepalive budget");

    drop(reader);
    drop(writer);
    node_a.shutdown().await;
    task_a.abort();
}

/// spec.md §8 S3: a 4-node chain bootstrap (8000 <- 8001 <- 8002 <- 8003)
/// converges its routing tables, then a store on one end is visible to
/// `find_value` on the other within 5s.
#[tokio::test]
async fn s3_dht_store_and_retrieve_across_four_nodes() {
    let ports = [21041u16, 21042, 21043, 21044];

    let mut config_0 = NodeConfig::new(addr(ports[0]));
    config_0.transport = fast_transport();
    let node_0 = Node::bind(config_0).await.unwrap();
    let run_0 = node_0.clone();
    let task_0 = tokio::spawn(async move { run_0.run().await });

    let mut nodes = vec![node_0];
    let mut tasks = vec![task_0];
    for i in 1..ports.len() {
        let mut config = NodeConfig::new(addr(ports[i]));
        config.transport = fast_transport();
        config.bootstrap_seeds = vec![addr(ports[i - 1])];
        let node = Node::bind(config).await.unwrap();
        let run = node.clone();
        let task = tokio::spawn(async move { run.run().await });
        nodes.push(node);
        tasks.push(task);
    }

    let converged = wait_until(Duration::from_secs(3), || {
        let nodes = nodes.clone();
        Box::pin(async move {
            for n in &nodes {
                if n.dht_table_len().await == 0 {
                    return false;
                }
            }
            true
        })
    })
    .await;
    assert!(converged, "every node's routing table should gain at least one entry");

    let key = dht_id_of("k1");
    nodes[0].dht_store(key, b"v1".to_vec()).await;

    let retrieved = timeout(Duration::from_secs(5), async {
        loop {
            if let Some(value) = nodes[3].dht_find_value(key).await {
                return value;
            }
            sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("find_value on the far node should resolve within 5s");
    assert_eq!(retrieved, b"v1".to_vec());

    for node in &nodes {
        node.shutdown().await;
    }
    for task in tasks {
        task.abort();
    }
}
