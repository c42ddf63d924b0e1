//! # Node Coordinator
//!
//! Binds the transport, DHT, bootstrap client, PoH sequencer, leader
//! schedule, and blockchain into the single event loop described in
//! spec.md §4.I: a slot-clock task drives PoH and mining, a
//! re-announce task keeps bootstrap liveness fresh, and the main loop
//! drains transport events and decoded inbound messages, dispatching
//! each to its owning component. No subsystem ever locks across
//! another's boundary (spec.md §5) — each shared resource (chain, PoH,
//! routing table, peer table) is owned by exactly one `Mutex`/actor.

pub mod bootstrap_service;
pub mod config;
pub mod dht_rpc;
pub mod dht_service;
pub mod rpc;

pub use config::NodeConfig;
pub use rpc::{NodeHandle, NodeInfo, PeerSummary, PohState};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use eastsea_bootstrap::{BootstrapClient, SeedEntry, SeedList};
use eastsea_chain::Blockchain;
use eastsea_codec::Message;
use eastsea_crypto::Hash;
use eastsea_dht::derive_dht_id;
use eastsea_poh::{LeaderSchedule, PohSequencer};
use eastsea_transport::{CloseReason, InboundMessage, Transport, TransportEvent};
use eastsea_types::errors::{ChainError, CoordinatorError, TransportError};
use eastsea_types::{Block, NodeId, Transaction};
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{debug, info, warn};

use crate::bootstrap_service::BootstrapService;
use crate::dht_service::DhtService;

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn now_s() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// The bound node: every subsystem wired together plus the handles the
/// event loop needs to drain (spec.md §4.I).
pub struct Node {
    config: NodeConfig,
    node_id: NodeId,
    self_leader_id: String,
    transport: Arc<Transport>,
    dht: Arc<DhtService>,
    bootstrap: Arc<BootstrapService>,
    chain: Mutex<Blockchain>,
    poh: Mutex<PohSequencer>,
    leader_schedule: Mutex<LeaderSchedule>,
    events_rx: Mutex<mpsc::UnboundedReceiver<TransportEvent>>,
    inbound_rx: Mutex<mpsc::UnboundedReceiver<InboundMessage>>,
    stopping: AtomicBool,
    shutdown_notify: Notify,
}

impl Node {
    /// Bind a listener, wire every subsystem, and return the node
    /// ready for `run()`. Does not yet dial bootstrap seeds or start
    /// the slot clock — that happens once `run()` takes over.
    pub async fn bind(config: NodeConfig) -> Result<Arc<Node>, CoordinatorError> {
        let node_id = NodeId::random();
        let (transport, events_rx, inbound_rx) =
            Transport::bind(config.transport, config.listen_addr, node_id)
                .await
                .map_err(|err| match err {
                    TransportError::Io(io_err) => CoordinatorError::BindFailed(io_err),
                    other => CoordinatorError::ConfigInvalid(other.to_string()),
                })?;
        let transport = Arc::new(transport);

        let local_dht_id = derive_dht_id(config.listen_addr.ip(), config.listen_addr.port());
        let dht = Arc::new(DhtService::new(local_dht_id, transport.clone()));

        let seeds = SeedList::new(config.bootstrap_seeds.iter().copied().map(SeedEntry).collect());
        let bootstrap = Arc::new(BootstrapService::new(BootstrapClient::new(seeds), transport.clone()));

        let chain = Blockchain::with_mempool_config(
            now_s(),
            config.mining_reward,
            config.difficulty,
            config.mempool,
        );
        let genesis_hash = chain.tail().hash;

        let self_leader_id = config
            .leader_id_override
            .clone()
            .unwrap_or_else(|| node_id.to_string());
        let leaders = config
            .leaders
            .clone()
            .unwrap_or_else(|| vec![self_leader_id.clone()]);

        Ok(Arc::new(Node {
            config,
            node_id,
            self_leader_id,
            transport,
            dht,
            bootstrap,
            chain: Mutex::new(chain),
            poh: Mutex::new(PohSequencer::new(genesis_hash)),
            leader_schedule: Mutex::new(LeaderSchedule::new(leaders)),
            events_rx: Mutex::new(events_rx),
            inbound_rx: Mutex::new(inbound_rx),
            stopping: AtomicBool::new(false),
            shutdown_notify: Notify::new(),
        }))
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn is_island(&self) -> bool {
        self.config.bootstrap_seeds.is_empty()
    }

    /// Run the coordinator's event loop until `shutdown()` is called or
    /// every transport event source has drained (spec.md §4.I).
    pub async fn run(self: &Arc<Self>) {
        self.bootstrap.startup().await;

        let slot_task = {
            let node = self.clone();
            tokio::spawn(async move { node.slot_loop().await })
        };
        let reannounce_task = {
            let node = self.clone();
            tokio::spawn(async move { node.reannounce_loop().await })
        };

        let mut events_rx = self.events_rx.lock().await;
        let mut inbound_rx = self.inbound_rx.lock().await;
        loop {
            tokio::select! {
                _ = self.shutdown_notify.notified() => break,
                event = events_rx.recv() => {
                    match event {
                        Some(event) => self.handle_transport_event(event).await,
                        None => break,
                    }
                }
                msg = inbound_rx.recv() => {
                    if let Some(msg) = msg {
                        self.dispatch_inbound(msg).await;
                    }
                }
            }
        }
        drop(events_rx);
        drop(inbound_rx);

        slot_task.abort();
        reannounce_task.abort();
        let _ = slot_task.await;
        let _ = reannounce_task.await;
    }

    /// Graceful shutdown (spec.md §4.I): stop accepting new
    /// connections, signal every session to close, then give the
    /// transport's drain deadline to finish before returning.
    pub async fn shutdown(&self) {
        self.stopping.store(true, Ordering::Relaxed);
        self.transport.shutdown();
        self.shutdown_notify.notify_waiters();
        tokio::time::sleep(eastsea_transport::SHUTDOWN_DRAIN_DEADLINE).await;
    }

    async fn slot_loop(&self) {
        let mut interval = tokio::time::interval(self.config.slot_duration);
        loop {
            interval.tick().await;
            if self.stopping.load(Ordering::Relaxed) {
                return;
            }
            self.slot_tick().await;
        }
    }

    async fn reannounce_loop(&self) {
        if self.is_island() {
            return;
        }
        let mut interval = tokio::time::interval(eastsea_bootstrap::REANNOUNCE_INTERVAL);
        interval.tick().await; // first tick fires immediately; skip it, startup() already announced
        loop {
            interval.tick().await;
            if self.stopping.load(Ordering::Relaxed) {
                return;
            }
            self.bootstrap
                .reannounce(self.node_id, self.transport.local_listen_port())
                .await;
        }
    }

    /// Advance the PoH clock one slot, rotate the leader schedule, and
    /// mine/broadcast a block if this node is the current leader with
    /// a non-empty mempool (spec.md §4.F/§4.G/§4.I).
    async fn slot_tick(&self) {
        {
            let mut poh = self.poh.lock().await;
            for _ in 0..self.config.ticks_per_slot {
                poh.tick();
            }
            poh.record_entry(self.config.ticks_per_slot);
        }

        let is_leader = {
            let mut schedule = self.leader_schedule.lock().await;
            schedule.advance_slot();
            schedule.is_self_leader(&self.self_leader_id)
        };
        if !is_leader {
            return;
        }

        let mempool_empty = { self.chain.lock().await.mempool().is_empty() };
        if mempool_empty {
            return;
        }

        let mined = {
            let mut chain = self.chain.lock().await;
            chain.mine_block(now_s()).map(Clone::clone)
        };
        match mined {
            Ok(block) => {
                {
                    let mut poh = self.poh.lock().await;
                    poh.mix_in(&block.hash);
                    poh.record_entry(1);
                }
                info!(height = block.height, hash = %eastsea_crypto::to_hex(&block.hash), "mined block");
                self.transport.broadcast(Message::Block(Box::new(block))).await;
            }
            Err(err) => warn!(error = %err, "mining failed"),
        }
    }

    async fn handle_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Connected { handle, node_id, addr, inbound } => {
                info!(peer = handle.0, %node_id, %addr, inbound, "peer connected");
                // Only visible to the DHT after the handshake completes
                // (spec.md §9 pointer-graph ordering).
                self.dht.observe(addr, now_ms()).await;
            }
            TransportEvent::Closed { handle, addr, reason } => {
                let level_reason = match reason {
                    CloseReason::LocalShutdown => "local shutdown",
                    CloseReason::VersionMismatch => "version mismatch",
                    CloseReason::HandshakeTimeout => "handshake timeout",
                    CloseReason::Io => "io error",
                    CloseReason::Codec => "codec error",
                    CloseReason::SendQueueFull => "send queue full",
                };
                warn!(peer = handle.0, %addr, reason = level_reason, "peer closed");
                // Removed from the routing table only after transport
                // has fully torn the session down (spec.md §9).
                self.dht.remove(addr).await;
            }
        }
    }

    async fn dispatch_inbound(&self, msg: InboundMessage) {
        match msg.message {
            Message::DhtFindNode(_)
            | Message::DhtFindNodeReply(_)
            | Message::DhtStore(_)
            | Message::DhtFindValue(_)
            | Message::DhtFindValueReply(_) => {
                self.dht.handle_inbound(msg.handle, msg.message).await;
            }
            Message::Block(block) => {
                let mut chain = self.chain.lock().await;
                let height = block.height;
                match chain.ingest_block(*block) {
                    Ok(()) => info!(height, "ingested block from network"),
                    Err(err) => warn!(height, error = %err, "dropped block from network"),
                }
            }
            Message::Transaction(tx) => {
                if let Err(err) = self.accept_transaction(tx).await {
                    warn!(error = %err, "dropped transaction from network");
                }
            }
            Message::BootstrapAnnounce(p) => self.bootstrap.handle_announce(p).await,
            Message::BootstrapPeersReq(p) => self.bootstrap.handle_peers_req(msg.handle, p).await,
            Message::BootstrapPeersRep(p) => self.bootstrap.handle_peers_rep(p).await,
            other => debug!(msg_type = ?other.msg_type(), "no coordinator dispatch target for this message type"),
        }
    }

    /// Submit a transaction into the mempool and mix its hash into the
    /// PoH chain (spec.md §4.F: "transactions accepted in the slot are
    /// mixed in as they arrive").
    async fn accept_transaction(&self, tx: Transaction) -> Result<Hash, ChainError> {
        self.chain.lock().await.add_transaction(tx.clone())?;
        let hash = tx.hash();
        let mut poh = self.poh.lock().await;
        poh.mix_in(&hash);
        poh.record_entry(1);
        Ok(hash)
    }

    /// Iterative FIND_NODE, exposed for callers that need the raw
    /// routing-table lookup rather than the `NodeHandle` RPC surface
    /// (spec.md §8 scenario S3).
    pub async fn dht_find_node(&self, target: eastsea_types::DhtId) -> Vec<eastsea_dht::NodeEntry> {
        self.dht.find_node(target).await
    }

    pub async fn dht_store(&self, key: [u8; 20], value: Vec<u8>) {
        self.dht.store(key, value).await;
    }

    pub async fn dht_find_value(&self, key: [u8; 20]) -> Option<Vec<u8>> {
        self.dht.find_value(key).await
    }

    pub async fn dht_table_len(&self) -> usize {
        self.dht.table_len().await
    }

    /// Pending mempool length, exposed so the CLI can pick exit code 3
    /// ("shutdown-with-pending-work", spec.md §6) instead of reaching
    /// into the chain mutex directly.
    pub async fn mempool_len(&self) -> usize {
        self.chain.lock().await.mempool().pending().len()
    }
}

#[async_trait]
impl NodeHandle for Node {
    async fn get_height(&self) -> u64 {
        self.chain.lock().await.height()
    }

    async fn get_block(&self, height: u64) -> Option<Block> {
        self.chain.lock().await.block_at(height).cloned()
    }

    async fn get_transaction(&self, hash: Hash) -> Option<Transaction> {
        let chain = self.chain.lock().await;
        if let Some(tx) = chain.find_transaction(&hash) {
            return Some(tx.clone());
        }
        chain.mempool().pending().iter().find(|tx| tx.hash() == hash).cloned()
    }

    async fn get_peers(&self) -> Vec<PeerSummary> {
        self.transport
            .all_peers()
            .into_iter()
            .map(|(_, record)| PeerSummary {
                node_id: record.node_id,
                address: record.address,
                connected: record.is_connected(),
            })
            .collect()
    }

    async fn get_node_info(&self) -> NodeInfo {
        NodeInfo {
            node_id: self.node_id,
            listen_addr: self.config.listen_addr,
            peer_count: self.transport.peer_count(),
            running: !self.stopping.load(Ordering::Relaxed),
            height: self.chain.lock().await.height(),
        }
    }

    async fn submit_transaction(&self, tx: Transaction) -> Result<Hash, ChainError> {
        self.accept_transaction(tx).await.map_err(|err| {
            warn!(error = %err, "submit_transaction rejected");
            err
        })
    }

    async fn get_poh_state(&self) -> PohState {
        let snapshot = self.poh.lock().await.snapshot();
        PohState {
            current_hash: snapshot.current_hash,
            tick_count: snapshot.tick_count,
        }
    }
}
