//! The transport's peer table: owns session lifetime and hands out
//! opaque [`PeerHandle`]s so the DHT and bootstrap layers never hold a
//! raw socket or task reference across a suspension point (spec.md §9
//! "cyclic ownership of peer records").

use dashmap::DashMap;
use eastsea_types::{NodeId, PeerRecord, PeerState};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::outbound_queue::OutboundQueue;

/// An opaque, cloneable reference to a session. Consumers resolve
/// `PeerHandle -> PeerRecord` through the table; they never hold a
/// direct pointer across a suspension or lock boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerHandle(pub u64);

pub(crate) struct PeerEntry {
    pub record: PeerRecord,
    pub queue: Arc<OutboundQueue>,
}

/// Shared peer table. A single logical owner (the transport) performs
/// all mutations; readers (DHT, bootstrap, the node coordinator) take
/// a short-lived snapshot via `get`/`connected_peers` (spec.md §5).
#[derive(Default)]
pub struct PeerTable {
    next_handle: AtomicU64,
    entries: DashMap<PeerHandle, PeerEntry>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            entries: DashMap::new(),
        }
    }

    pub fn allocate_handle(&self) -> PeerHandle {
        PeerHandle(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn insert(&self, handle: PeerHandle, record: PeerRecord, queue_capacity: usize) -> Arc<OutboundQueue> {
        let queue = Arc::new(OutboundQueue::new(queue_capacity));
        self.entries.insert(
            handle,
            PeerEntry {
                record,
                queue: queue.clone(),
            },
        );
        queue
    }

    pub fn set_state(&self, handle: PeerHandle, state: PeerState) {
        if let Some(mut entry) = self.entries.get_mut(&handle) {
            entry.record.state = state;
        }
    }

    pub fn touch(&self, handle: PeerHandle, now_ms: u64) {
        if let Some(mut entry) = self.entries.get_mut(&handle) {
            entry.record.last_seen_ms = now_ms;
        }
    }

    pub fn set_last_ping_nonce(&self, handle: PeerHandle, nonce: Option<u64>) {
        if let Some(mut entry) = self.entries.get_mut(&handle) {
            entry.record.last_ping_nonce = nonce;
        }
    }

    pub fn remove(&self, handle: PeerHandle) -> Option<PeerRecord> {
        self.entries.remove(&handle).map(|(_, e)| e.record)
    }

    pub fn get(&self, handle: PeerHandle) -> Option<PeerRecord> {
        self.entries.get(&handle).map(|e| e.record.clone())
    }

    pub(crate) fn queue(&self, handle: PeerHandle) -> Option<Arc<OutboundQueue>> {
        self.entries.get(&handle).map(|e| e.queue.clone())
    }

    pub fn handle_for_node_id(&self, node_id: NodeId) -> Option<PeerHandle> {
        self.entries
            .iter()
            .find(|e| e.record.node_id == node_id)
            .map(|e| *e.key())
    }

    pub fn handle_for_addr(&self, addr: SocketAddr) -> Option<PeerHandle> {
        self.entries
            .iter()
            .find(|e| e.record.address == addr)
            .map(|e| *e.key())
    }

    /// Every peer currently in the `Connected` state.
    pub fn connected_peers(&self) -> Vec<(PeerHandle, PeerRecord)> {
        self.entries
            .iter()
            .filter(|e| e.record.is_connected())
            .map(|e| (*e.key(), e.record.clone()))
            .collect()
    }

    pub fn all_peers(&self) -> Vec<(PeerHandle, PeerRecord)> {
        self.entries.iter().map(|e| (*e.key(), e.record.clone())).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddr};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(Ipv4Addr::LOCALHOST.into(), port)
    }

    #[test]
    fn allocate_handle_never_repeats() {
        let table = PeerTable::new();
        let a = table.allocate_handle();
        let b = table.allocate_handle();
        assert_ne!(a, b);
    }

    #[test]
    fn insert_then_get_round_trips_the_record() {
        let table = PeerTable::new();
        let handle = table.allocate_handle();
        let record = PeerRecord::new(NodeId::random(), addr(1), PeerState::Handshaking, 0);
        table.insert(handle, record.clone(), 16);
        assert_eq!(table.get(handle).unwrap().address, record.address);
    }

    #[test]
    fn connected_peers_excludes_non_connected_states() {
        let table = PeerTable::new();
        let h1 = table.allocate_handle();
        table.insert(h1, PeerRecord::new(NodeId::random(), addr(1), PeerState::Connected, 0), 16);
        let h2 = table.allocate_handle();
        table.insert(h2, PeerRecord::new(NodeId::random(), addr(2), PeerState::Handshaking, 0), 16);

        let connected = table.connected_peers();
        assert_eq!(connected.len(), 1);
        assert_eq!(connected[0].0, h1);
    }

    #[test]
    fn remove_drops_the_entry() {
        let table = PeerTable::new();
        let handle = table.allocate_handle();
        table.insert(handle, PeerRecord::new(NodeId::random(), addr(1), PeerState::Connected, 0), 16);
        assert!(table.remove(handle).is_some());
        assert!(table.get(handle).is_none());
    }
}
