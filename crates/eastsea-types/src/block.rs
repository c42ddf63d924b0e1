//! Block record and its hash formula.

use crate::transaction::Transaction;
use eastsea_crypto::{merkle, sha256, Hash};
use serde::{Deserialize, Serialize};

/// Immutable once appended to the chain. `merkle_root` and `hash` are
/// derived fields recomputed by `Block::new`/`Block::recompute_hash`,
/// never set directly by callers outside this module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub timestamp_s: i64,
    pub previous_hash: Hash,
    pub merkle_root: Hash,
    pub transactions: Vec<Transaction>,
    pub nonce: u64,
    pub hash: Hash,
}

impl Block {
    /// Build a block with the derived fields (`merkle_root`, `hash`)
    /// computed from the rest, per spec.md §3.
    pub fn new(
        height: u64,
        timestamp_s: i64,
        previous_hash: Hash,
        transactions: Vec<Transaction>,
        nonce: u64,
    ) -> Self {
        let merkle_root = compute_merkle_root(&transactions);
        let hash = compute_hash(height, timestamp_s, &merkle_root, &previous_hash, nonce);
        Block {
            height,
            timestamp_s,
            previous_hash,
            merkle_root,
            transactions,
            nonce,
            hash,
        }
    }

    /// Recompute `hash` from the block's current fields. Used by
    /// mining (nonce search) and validation (re-deriving the expected
    /// hash to compare against the declared one).
    pub fn recompute_hash(&self) -> Hash {
        compute_hash(
            self.height,
            self.timestamp_s,
            &self.merkle_root,
            &self.previous_hash,
            self.nonce,
        )
    }

    /// The genesis block: height 0, zeroed previous hash, no
    /// transactions (spec.md §4.H).
    pub fn genesis(timestamp_s: i64) -> Self {
        Block::new(0, timestamp_s, [0u8; 32], Vec::new(), 0)
    }

    /// Wire encoding used by the `Block` message payload (spec.md
    /// §4.B). `merkle_root` and `hash` are transmitted rather than
    /// recomputed on decode so the receiver can compare the declared
    /// values against its own recomputation (spec.md §4.H ingest
    /// rule).
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.height.to_le_bytes());
        out.extend_from_slice(&self.timestamp_s.to_le_bytes());
        out.extend_from_slice(&self.previous_hash);
        out.extend_from_slice(&self.merkle_root);
        out.extend_from_slice(&(self.transactions.len() as u32).to_le_bytes());
        for tx in &self.transactions {
            let encoded = tx.encode();
            out.extend_from_slice(&(encoded.len() as u32).to_le_bytes());
            out.extend_from_slice(&encoded);
        }
        out.extend_from_slice(&self.nonce.to_le_bytes());
        out.extend_from_slice(&self.hash);
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let mut offset = 0usize;
        let take = |bytes: &[u8], offset: &mut usize, n: usize| -> Option<Vec<u8>> {
            if bytes.len() < *offset + n {
                return None;
            }
            let slice = bytes[*offset..*offset + n].to_vec();
            *offset += n;
            Some(slice)
        };

        let height = u64::from_le_bytes(take(bytes, &mut offset, 8)?.try_into().ok()?);
        let timestamp_s = i64::from_le_bytes(take(bytes, &mut offset, 8)?.try_into().ok()?);
        let previous_hash: Hash = take(bytes, &mut offset, 32)?.try_into().ok()?;
        let merkle_root: Hash = take(bytes, &mut offset, 32)?.try_into().ok()?;
        let tx_count = u32::from_le_bytes(take(bytes, &mut offset, 4)?.try_into().ok()?) as usize;

        let mut transactions = Vec::with_capacity(tx_count);
        for _ in 0..tx_count {
            let len = u32::from_le_bytes(take(bytes, &mut offset, 4)?.try_into().ok()?) as usize;
            let tx_bytes = take(bytes, &mut offset, len)?;
            let (tx, _) = Transaction::decode(&tx_bytes)?;
            transactions.push(tx);
        }

        let nonce = u64::from_le_bytes(take(bytes, &mut offset, 8)?.try_into().ok()?);
        let hash: Hash = take(bytes, &mut offset, 32)?.try_into().ok()?;

        Some(Block {
            height,
            timestamp_s,
            previous_hash,
            merkle_root,
            transactions,
            nonce,
            hash,
        })
    }
}

fn compute_merkle_root(transactions: &[Transaction]) -> Hash {
    let leaves: Vec<Hash> = transactions.iter().map(|tx| tx.hash()).collect();
    merkle::merkle_root(&leaves)
}

fn compute_hash(
    height: u64,
    timestamp_s: i64,
    merkle_root: &Hash,
    previous_hash: &Hash,
    nonce: u64,
) -> Hash {
    let mut buf = Vec::with_capacity(8 + 8 + 32 + 32 + 8);
    buf.extend_from_slice(&height.to_le_bytes());
    buf.extend_from_slice(&timestamp_s.to_le_bytes());
    buf.extend_from_slice(merkle_root);
    buf.extend_from_slice(previous_hash);
    buf.extend_from_slice(&nonce.to_le_bytes());
    sha256(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_has_zero_previous_hash() {
        let g = Block::genesis(0);
        assert_eq!(g.previous_hash, [0u8; 32]);
        assert_eq!(g.height, 0);
    }

    #[test]
    fn hash_matches_recompute() {
        let tx = Transaction::new("a", "b", 1, 0);
        let b = Block::new(1, 0, [0u8; 32], vec![tx], 7);
        assert_eq!(b.hash, b.recompute_hash());
    }

    #[test]
    fn changing_nonce_changes_hash() {
        let b1 = Block::new(1, 0, [0u8; 32], vec![], 0);
        let b2 = Block::new(1, 0, [0u8; 32], vec![], 1);
        assert_ne!(b1.hash, b2.hash);
    }

    #[test]
    fn encode_decode_round_trips() {
        let tx = Transaction::new("alice", "bob", 50, 10);
        let b = Block::new(3, 100, [9u8; 32], vec![tx], 42);
        let bytes = b.encode();
        let decoded = Block::decode(&bytes).unwrap();
        assert_eq!(decoded, b);
    }
}
