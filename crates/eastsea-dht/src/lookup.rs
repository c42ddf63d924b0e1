//! Iterative FIND_NODE lookup, per spec.md §4.D.
//!
//! The DHT crate never dials a socket itself: the node coordinator
//! wires a `DhtRpc` implementation (backed by `eastsea-transport`)
//! into the lookup coordinator, matching the ports/adapters seam the
//! teacher workspace uses for its `NetworkSocket` port.

use crate::bucket::NodeEntry;
use crate::routing_table::RoutingTable;
use async_trait::async_trait;
use eastsea_types::DhtId;
use std::collections::HashSet;
use std::time::Duration;

/// Parallelism factor for iterative lookups (spec.md §4.D).
pub const ALPHA: usize = 3;

/// Timeout for a single outstanding RPC (spec.md §4.D).
pub const RPC_TIMEOUT: Duration = Duration::from_secs(2);

/// Outbound port: issue a FIND_NODE RPC to `target_addr` asking for
/// nodes close to `target_id`. A timeout or network failure is
/// reported as `None` rather than an error — the lookup treats a
/// non-responding node as simply unproductive (spec.md §4.D failure
/// semantics), never fatal.
#[async_trait]
pub trait DhtRpc: Send + Sync {
    async fn find_node(&self, peer: &NodeEntry, target_id: DhtId) -> Option<Vec<NodeEntry>>;
}

/// Drive an iterative FIND_NODE lookup for `target`, seeded from the
/// routing table's current knowledge. Returns the `K` closest
/// confirmed nodes; never fails — a lookup that exhausts candidates
/// without convergence returns best-so-far (spec.md §4.D).
pub async fn find_node(
    rpc: &dyn DhtRpc,
    table: &RoutingTable,
    target: DhtId,
    k: usize,
    stopping: &std::sync::atomic::AtomicBool,
) -> Vec<NodeEntry> {
    let mut queried: HashSet<DhtId> = HashSet::new();
    let mut candidates: Vec<NodeEntry> = table.closest(&target, k);
    let mut best_distance = candidates.first().map(|c| target.distance(&c.id));

    loop {
        if stopping.load(std::sync::atomic::Ordering::Relaxed) {
            break;
        }

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

        let responses = futures_join_all(rpc, &to_query, target).await;

        let mut merged = candidates.clone();
        for response in responses.into_iter().flatten() {
            for node in response {
                if !merged.iter().any(|m| m.id == node.id) {
                    merged.push(node);
                }
            }
        }
        merged.sort_by_key(|e| target.distance(&e.id));
        merged.truncate(k.max(ALPHA * 2));

        let new_best = merged.first().map(|c| target.distance(&c.id));
        candidates = merged;

        let converged = match (best_distance, new_best) {
            (Some(old), Some(new)) => new >= old,
            _ => false,
        };
        best_distance = new_best;

        let all_queried = candidates.iter().take(k).all(|c| queried.contains(&c.id));
        if converged || all_queried {
            break;
        }
    }

    candidates.truncate(k);
    candidates
}

/// Issue up to `ALPHA` RPCs concurrently and collect their results in
/// the order they were issued (merging is sequential on the caller's
/// side, per spec.md §4.D concurrency contract).
async fn futures_join_all(
    rpc: &dyn DhtRpc,
    targets: &[NodeEntry],
    target_id: DhtId,
) -> Vec<Option<Vec<NodeEntry>>> {
    let futs = targets.iter().map(|peer| async move {
        tokio::time::timeout(RPC_TIMEOUT, rpc.find_node(peer, target_id))
            .await
            .ok()
            .flatten()
    });
    futures::future::join_all(futs).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::{Ipv4Addr, SocketAddr};
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(Ipv4Addr::LOCALHOST.into(), port)
    }

    fn entry(byte: u8, port: u16) -> NodeEntry {
        NodeEntry {
            id: DhtId([byte; 20]),
            addr: addr(port),
            last_seen_ms: 0,
        }
    }

    /// A fake network: each node knows about a fixed set of closer
    /// neighbors, simulating convergence toward the target.
    struct FakeNetwork {
        graph: Mutex<HashMap<DhtId, Vec<NodeEntry>>>,
    }

    #[async_trait]
    impl DhtRpc for FakeNetwork {
        async fn find_node(&self, peer: &NodeEntry, _target_id: DhtId) -> Option<Vec<NodeEntry>> {
            self.graph.lock().unwrap().get(&peer.id).cloned()
        }
    }

    #[tokio::test]
    async fn lookup_converges_and_returns_best_so_far() {
        let target = DhtId([0u8; 20]);
        let a = entry(0x80, 1);
        let b = entry(0x40, 2);
        let c = entry(0x20, 3);

        let mut graph = HashMap::new();
        graph.insert(a.id, vec![b.clone()]);
        graph.insert(b.id, vec![c.clone()]);
        graph.insert(c.id, vec![]);
        let network = FakeNetwork {
            graph: Mutex::new(graph),
        };

        let mut table = RoutingTable::new(DhtId([0xFFu8; 20]));
        table.observe(a.id, a.addr, 0);

        let stopping = AtomicBool::new(false);
        let result = find_node(&network, &table, target, 20, &stopping).await;

        assert!(result.iter().any(|e| e.id == c.id));
    }

    /// A `DhtRpc` that records the distance-to-target of every peer it
    /// is asked to query, in call order, before delegating to a fixed
    /// chain graph.
    struct RecordingNetwork {
        graph: Mutex<HashMap<DhtId, Vec<NodeEntry>>>,
        queried_distances: Mutex<Vec<[u8; 20]>>,
    }

    #[async_trait]
    impl DhtRpc for RecordingNetwork {
        async fn find_node(&self, peer: &NodeEntry, target_id: DhtId) -> Option<Vec<NodeEntry>> {
            self.queried_distances.lock().unwrap().push(target_id.distance(&peer.id));
            self.graph.lock().unwrap().get(&peer.id).cloned()
        }
    }

    /// spec.md §8 property 6: each round's best-known distance to the
    /// target is no worse than the previous round's. A single-branch
    /// chain forces one candidate queried per round, so the call order
    /// this records is exactly the round-by-round best-distance
    /// sequence.
    #[tokio::test]
    async fn lookup_best_distance_is_non_increasing_across_rounds() {
        let target = DhtId([0u8; 20]);
        let a = entry(0x80, 1);
        let b = entry(0x40, 2);
        let c = entry(0x20, 3);
        let d = entry(0x10, 4);

        let mut graph = HashMap::new();
        graph.insert(a.id, vec![b.clone()]);
        graph.insert(b.id, vec![c.clone()]);
        graph.insert(c.id, vec![d.clone()]);
        graph.insert(d.id, vec![]);
        let network = RecordingNetwork {
            graph: Mutex::new(graph),
            queried_distances: Mutex::new(Vec::new()),
        };

        let mut table = RoutingTable::new(DhtId([0xFFu8; 20]));
        table.observe(a.id, a.addr, 0);

        let stopping = AtomicBool::new(false);
        let _ = find_node(&network, &table, target, 20, &stopping).await;

        let distances = network.queried_distances.into_inner().unwrap();
        assert!(distances.len() >= 3, "expected at least 3 queried rounds, got {}", distances.len());
        for pair in distances.windows(2) {
            assert!(pair[0] >= pair[1], "best distance regressed: {:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[tokio::test]
    async fn lookup_on_empty_table_returns_empty_without_hanging() {
        let network = FakeNetwork {
            graph: Mutex::new(HashMap::new()),
        };
        let table = RoutingTable::new(DhtId([0u8; 20]));
        let stopping = AtomicBool::new(false);
        let result = find_node(&network, &table, DhtId([1u8; 20]), 20, &stopping).await;
        assert!(result.is_empty());
    }
}
