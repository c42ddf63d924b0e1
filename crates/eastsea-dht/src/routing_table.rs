//! 160-bucket routing table indexed by XOR-distance bit position, per
//! spec.md §3/§4.D.

use crate::bucket::{InsertOutcome, KBucket, NodeEntry, K};
use eastsea_types::DhtId;
use std::net::SocketAddr;

pub const NUM_BUCKETS: usize = 160;

/// Result of `observe`, mirroring `KBucket::observe` but pre-resolved
/// to the bucket index so the caller (DHT service) knows which bucket
/// to act on for a pending challenge.
#[derive(Debug)]
pub enum ObserveResult {
    Touched,
    Inserted,
    NeedsChallenge { bucket_index: usize, oldest: NodeEntry, newcomer: NodeEntry },
}

/// The local node's routing table. Invariant: no id appears in more
/// than one bucket; a node's bucket is fully determined by its
/// distance to the local id.
pub struct RoutingTable {
    local_id: DhtId,
    buckets: Vec<KBucket>,
}

impl RoutingTable {
    pub fn new(local_id: DhtId) -> Self {
        Self {
            local_id,
            buckets: (0..NUM_BUCKETS).map(|_| KBucket::new()).collect(),
        }
    }

    pub fn local_id(&self) -> DhtId {
        self.local_id
    }

    /// Bucket index a given remote id belongs in, or `None` if it *is*
    /// the local id.
    pub fn bucket_index_for(&self, id: &DhtId) -> Option<usize> {
        self.local_id.bucket_index(id)
    }

    /// Observe a remote node, applying the insertion rule. Observing
    /// the local id itself is a no-op (returns `Touched` for
    /// simplicity; callers should avoid calling this with their own id).
    pub fn observe(&mut self, id: DhtId, addr: SocketAddr, now_ms: u64) -> ObserveResult {
        let Some(idx) = self.bucket_index_for(&id) else {
            return ObserveResult::Touched;
        };
        match self.buckets[idx].observe(id, addr, now_ms) {
            InsertOutcome::Touched => ObserveResult::Touched,
            InsertOutcome::Inserted => ObserveResult::Inserted,
            InsertOutcome::Full { oldest, newcomer } => ObserveResult::NeedsChallenge {
                bucket_index: idx,
                oldest,
                newcomer,
            },
        }
    }

    pub fn keep_oldest(&mut self, bucket_index: usize, now_ms: u64) {
        self.buckets[bucket_index].keep_oldest(now_ms);
    }

    pub fn evict_oldest_and_insert(&mut self, bucket_index: usize, newcomer: NodeEntry) {
        self.buckets[bucket_index].evict_oldest_and_insert(newcomer);
    }

    pub fn remove(&mut self, id: &DhtId) -> Option<NodeEntry> {
        let idx = self.bucket_index_for(id)?;
        self.buckets[idx].remove(id)
    }

    /// The `K` nodes in the table closest to `target`, ordered nearest
    /// first, ties broken by earliest insertion order (spec.md §4.D).
    pub fn closest(&self, target: &DhtId, count: usize) -> Vec<NodeEntry> {
        let mut candidates: Vec<NodeEntry> = self
            .buckets
            .iter()
            .flat_map(|b| b.entries().iter().cloned())
            .collect();
        candidates.sort_by_key(|e| target.distance(&e.id));
        candidates.truncate(count);
        candidates
    }

    /// Total number of known nodes across all buckets.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(KBucket::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks the table-wide uniqueness invariant (spec.md §8 property
    /// 7): every id appears in at most one bucket.
    pub fn assert_unique_invariant(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        for bucket in &self.buckets {
            for entry in bucket.entries() {
                if !seen.insert(entry.id) {
                    return false;
                }
            }
        }
        true
    }
}
