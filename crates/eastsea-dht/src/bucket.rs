//! K-bucket: a bounded, ordered collection of known nodes at one
//! XOR-distance range from the local id, per spec.md §3/§4.D.

use eastsea_types::DhtId;
use std::net::SocketAddr;

/// Default bucket capacity (spec.md §4.D).
pub const K: usize = 20;

/// An entry in a k-bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEntry {
    pub id: DhtId,
    pub addr: SocketAddr,
    pub last_seen_ms: u64,
}

/// Outcome of an insertion attempt, used by the routing table to decide
/// whether a liveness challenge against the bucket's oldest entry is
/// needed (spec.md §4.D rule 3).
#[derive(Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The id was already present; it has been touched (moved to back).
    Touched,
    /// There was room; the entry was appended.
    Inserted,
    /// The bucket is full; the oldest entry (returned) should be
    /// challenged with a ping before the newcomer (also returned) can
    /// be admitted.
    Full { oldest: NodeEntry, newcomer: NodeEntry },
}

/// A single k-bucket. Least-recently-seen at the front, most-recently
/// at the back.
#[derive(Debug, Clone, Default)]
pub struct KBucket {
    entries: Vec<NodeEntry>,
}

impl KBucket {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[NodeEntry] {
        &self.entries
    }

    pub fn contains(&self, id: &DhtId) -> bool {
        self.entries.iter().any(|e| &e.id == id)
    }

    /// Apply the insertion rule from spec.md §4.D:
    /// 1. present → move to back, update addr/last_seen (`Touched`)
    /// 2. room → append (`Inserted`)
    /// 3. full → caller must challenge the oldest entry (`Full`)
    pub fn observe(&mut self, id: DhtId, addr: SocketAddr, now_ms: u64) -> InsertOutcome {
        if let Some(pos) = self.entries.iter().position(|e| e.id == id) {
            let mut entry = self.entries.remove(pos);
            entry.addr = addr;
            entry.last_seen_ms = now_ms;
            self.entries.push(entry);
            return InsertOutcome::Touched;
        }

        let newcomer = NodeEntry {
            id,
            addr,
            last_seen_ms: now_ms,
        };

        if self.entries.len() < K {
            self.entries.push(newcomer);
            InsertOutcome::Inserted
        } else {
            InsertOutcome::Full {
                oldest: self.entries[0].clone(),
                newcomer,
            }
        }
    }

    /// Resolve a pending challenge: the oldest entry replied within the
    /// timeout, so it is kept and moved to the back; the newcomer is
    /// discarded.
    pub fn keep_oldest(&mut self, now_ms: u64) {
        if !self.entries.is_empty() {
            let mut oldest = self.entries.remove(0);
            oldest.last_seen_ms = now_ms;
            self.entries.push(oldest);
        }
    }

    /// Resolve a pending challenge: the oldest entry failed to reply,
    /// so it is evicted and the newcomer takes its place at the back.
    pub fn evict_oldest_and_insert(&mut self, newcomer: NodeEntry) {
        if !self.entries.is_empty() {
            self.entries.remove(0);
        }
        self.entries.push(newcomer);
    }

    pub fn remove(&mut self, id: &DhtId) -> Option<NodeEntry> {
        let pos = self.entries.iter().position(|e| &e.id == id)?;
        Some(self.entries.remove(pos))
    }
}
