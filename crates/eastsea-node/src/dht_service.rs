//! Wires `eastsea_dht`'s routing table, value store, and FIND_NODE
//! lookup to the transport, and implements the FIND_VALUE iterative
//! search and STORE fan-out that `eastsea_dht` deliberately leaves to
//! the node coordinator (spec.md §4.D).

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use eastsea_codec::message::{
    DhtFindNodeReplyPayload, DhtFindValueReplyPayload, DhtFindValueResult, DhtStorePayload,
};
use eastsea_codec::Message;
use eastsea_dht::{derive_dht_id, find_node as iterative_find_node, NodeEntry, ObserveResult, RoutingTable, ValueStore, ALPHA, K};
use eastsea_transport::{PeerHandle, Transport};
use eastsea_types::DhtId;
use tokio::sync::Mutex;
use tracing::debug;

use crate::dht_rpc::{entry_to_node_info, node_info_to_entry, DhtReply, PendingRpcs, TransportDhtRpc};

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub struct DhtService {
    local_id: DhtId,
    transport: Arc<Transport>,
    table: Mutex<RoutingTable>,
    store: Mutex<ValueStore>,
    rpc: TransportDhtRpc,
    stopping: AtomicBool,
}

impl DhtService {
    pub fn new(local_id: DhtId, transport: Arc<Transport>) -> Self {
        Self {
            local_id,
            rpc: TransportDhtRpc::new(transport.clone()),
            transport,
            table: Mutex::new(RoutingTable::new(local_id)),
            store: Mutex::new(ValueStore::new()),
            stopping: AtomicBool::new(false),
        }
    }

    pub fn pending(&self) -> PendingRpcs {
        self.rpc.pending()
    }

    pub async fn table_len(&self) -> usize {
        self.table.lock().await.len()
    }

    /// Admit a newly connected peer into the routing table (spec.md
    /// §9: visible to the DHT only after `Connected` fires). A full
    /// bucket's oldest entry is challenged with a liveness FIND_NODE
    /// before the newcomer is allowed to displace it (spec.md §4.D
    /// rule 3).
    pub async fn observe(&self, addr: SocketAddr, now: u64) {
        let id = derive_dht_id(addr.ip(), addr.port());
        if id == self.local_id {
            return;
        }
        let outcome = self.table.lock().await.observe(id, addr, now);
        match outcome {
            ObserveResult::NeedsChallenge {
                bucket_index,
                oldest,
                newcomer,
            } => {
                if self.rpc.find_node(&oldest, oldest.id).await.is_some() {
                    self.table.lock().await.keep_oldest(bucket_index, now);
                } else {
                    self.table.lock().await.evict_oldest_and_insert(bucket_index, newcomer);
                }
            }
            ObserveResult::Touched | ObserveResult::Inserted => {}
        }
    }

    /// Drop a peer from the routing table once its session has fully
    /// closed (spec.md §9: removed from the routing table only after
    /// the matching `Closed` event).
    pub async fn remove(&self, addr: SocketAddr) {
        let id = derive_dht_id(addr.ip(), addr.port());
        self.table.lock().await.remove(&id);
    }

    /// Iterative FIND_NODE, per spec.md §4.D.
    pub async fn find_node(&self, target: DhtId) -> Vec<NodeEntry> {
        let table = self.table.lock().await;
        iterative_find_node(&self.rpc, &table, target, K, &self.stopping).await
    }

    /// FIND_NODE on `key`, then fire-and-forget `DhtStore` to the
    /// closest `K` nodes found (spec.md §4.D). The local node also
    /// keeps a copy — trivially the closest possible node to its own
    /// lookups.
    pub async fn store(&self, key: [u8; 20], value: Vec<u8>) {
        self.store.lock().await.put(key, value.clone(), now_ms());
        let closest = self.find_node(DhtId(key)).await;
        for entry in &closest {
            let handle = self.handle_for(entry).await;
            let msg = Message::DhtStore(DhtStorePayload { key, value: value.clone() });
            let _ = self.transport.send_to(handle, msg).await;
        }
    }

    /// Custom iterative FIND_VALUE search, grounded on
    /// `eastsea_dht::lookup::find_node`'s convergence/termination
    /// logic but short-circuiting the moment any queried peer returns
    /// a value instead of a closer node list.
    pub async fn find_value(&self, key: [u8; 20]) -> Option<Vec<u8>> {
        if let Some(value) = self.store.lock().await.get(&key, now_ms()) {
            return Some(value);
        }

        let target = DhtId(key);
        let mut queried: HashSet<DhtId> = HashSet::new();
        let mut candidates: Vec<NodeEntry> = self.table.lock().await.closest(&target, K);
        let mut best_distance = candidates.first().map(|c| target.distance(&c.id));

        loop {
            let to_query: Vec<NodeEntry> = candidates
                .iter()
                .filter(|c| !queried.contains(&c.id))
                .take(ALPHA)
                .cloned()
                .collect();
            if to_query.is_empty() {
                break;
            }
            for c in &to_query {
                queried.insert(c.id);
            }

            let mut merged = candidates.clone();
            for peer in &to_query {
                match self.rpc.find_value(peer, key).await {
                    Some(DhtReply::Value(value)) => return Some(value),
                    Some(DhtReply::Nodes(nodes)) => {
                        for node in nodes {
                            if !merged.iter().any(|m| m.id == node.id) {
                                merged.push(node);
                            }
                        }
                    }
                    None => {}
                }
            }

            merged.sort_by_key(|e| target.distance(&e.id));
            merged.truncate(K.max(ALPHA * 2));
            let new_best = merged.first().map(|c| target.distance(&c.id));
            candidates = merged;

            let converged = matches!((best_distance, new_best), (Some(old), Some(new)) if new >= old);
            best_distance = new_best;

            let all_queried = candidates.iter().take(K).all(|c| queried.contains(&c.id));
            if converged || all_queried {
                break;
            }
        }

        None
    }

    async fn handle_for(&self, entry: &NodeEntry) -> PeerHandle {
        self.transport
            .handle_for_addr(entry.addr)
            .unwrap_or_else(|| self.transport.dial(entry.addr))
    }

    /// Dispatch an inbound DHT-layer message (spec.md §4.B wire
    /// table); every other message type is handled elsewhere in the
    /// coordinator.
    pub async fn handle_inbound(&self, handle: PeerHandle, message: Message) {
        match message {
            Message::DhtFindNode(p) => {
                let nodes = self.table.lock().await.closest(&DhtId(p.target), K);
                let reply = Message::DhtFindNodeReply(DhtFindNodeReplyPayload {
                    rpc_id: p.rpc_id,
                    nodes: nodes.iter().map(entry_to_node_info).collect(),
                });
                let _ = self.transport.send_to(handle, reply).await;
            }
            Message::DhtStore(p) => {
                self.store.lock().await.put(p.key, p.value, now_ms());
            }
            Message::DhtFindValue(p) => {
                let result = {
                    let mut store = self.store.lock().await;
                    match store.get(&p.key, now_ms()) {
                        Some(value) => DhtFindValueResult::Value(value),
                        None => {
                            let nodes = self.table.lock().await.closest(&DhtId(p.key), K);
                            DhtFindValueResult::Nodes(nodes.iter().map(entry_to_node_info).collect())
                        }
                    }
                };
                let reply = Message::DhtFindValueReply(DhtFindValueReplyPayload { rpc_id: p.rpc_id, result });
                let _ = self.transport.send_to(handle, reply).await;
            }
            Message::DhtFindNodeReply(p) => {
                if let Some((_, tx)) = self.rpc.pending().remove(&p.rpc_id) {
                    let entries = p.nodes.iter().map(node_info_to_entry).collect();
                    let _ = tx.send(DhtReply::Nodes(entries));
                }
            }
            Message::DhtFindValueReply(p) => {
                if let Some((_, tx)) = self.rpc.pending().remove(&p.rpc_id) {
                    let reply = match p.result {
                        DhtFindValueResult::Value(v) => DhtReply::Value(v),
                        DhtFindValueResult::Nodes(nodes) => {
                            DhtReply::Nodes(nodes.iter().map(node_info_to_entry).collect())
                        }
                    };
                    let _ = tx.send(reply);
                }
            }
            other => debug!(?other, "dht service received a non-dht message, ignoring"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eastsea_types::NodeId;
    use std::net::{Ipv4Addr, SocketAddr};

    async fn fresh(port: u16) -> (DhtService, SocketAddr) {
        let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), port);
        let (transport, _events, _inbound) = Transport::bind(Default::default(), addr, NodeId::random())
            .await
            .unwrap();
        let local_id = derive_dht_id(addr.ip(), addr.port());
        (DhtService::new(local_id, Arc::new(transport)), addr)
    }

    #[tokio::test]
    async fn observing_a_peer_below_capacity_grows_the_table() {
        let (service, _addr) = fresh(19901).await;
        let peer_addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 19902);
        service.observe(peer_addr, 0).await;
        assert_eq!(service.table_len().await, 1);
    }

    #[tokio::test]
    async fn observing_the_local_address_is_a_no_op() {
        let (service, addr) = fresh(19903).await;
        service.observe(addr, 0).await;
        assert_eq!(service.table_len().await, 0);
    }

    #[tokio::test]
    async fn store_then_find_value_resolves_locally_without_any_peers() {
        let (service, _addr) = fresh(19904).await;
        let key = [7u8; 20];
        service.store(key, b"hello".to_vec()).await;
        assert_eq!(service.find_value(key).await, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn find_value_on_an_unknown_key_with_no_peers_returns_none() {
        let (service, _addr) = fresh(19905).await;
        assert_eq!(service.find_value([9u8; 20]).await, None);
    }
}
