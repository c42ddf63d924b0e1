//! Merkle tree construction over an ordered sequence of leaves.
//!
//! Empty input yields a defined zero-root; a single leaf yields
//! `sha256(leaf)`; an odd level duplicates its last node before
//! pairing, per spec.md §4.A.

use crate::{sha256, Hash};

/// Compute the Merkle root over `leaves` (already-hashed or raw bytes,
/// caller's choice — callers in this workspace pass pre-hashed
/// transaction ids).
pub fn merkle_root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return [0u8; 32];
    }
    if leaves.len() == 1 {
        return sha256(&leaves[0]);
    }

    let mut level: Vec<Hash> = leaves.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            level.push(*level.last().unwrap());
        }
        level = level
            .chunks(2)
            .map(|pair| {
                let mut buf = Vec::with_capacity(64);
                buf.extend_from_slice(&pair[0]);
                buf.extend_from_slice(&pair[1]);
                sha256(&buf)
            })
            .collect();
    }
    level[0]
}

/// A single step of a Merkle inclusion proof: the sibling hash and
/// whether it belongs on the left or right of the running hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofStep {
    pub sibling: Hash,
    pub sibling_is_left: bool,
}

/// Build an inclusion proof for the leaf at `index`. Returns `None` if
/// `index` is out of range.
///
/// Not required by the core RPC contract but cheap to provide given
/// the tree is already built level-by-level; lets `get_transaction`
/// justify inclusion rather than merely reporting it.
pub fn merkle_proof(leaves: &[Hash], index: usize) -> Option<Vec<ProofStep>> {
    if index >= leaves.len() {
        return None;
    }

    let mut proof = Vec::new();
    let mut level: Vec<Hash> = leaves.to_vec();
    let mut idx = index;

    while level.len() > 1 {
        if level.len() % 2 == 1 {
            level.push(*level.last().unwrap());
        }
        let sibling_idx = if idx % 2 == 0 { idx + 1 } else { idx - 1 };
        proof.push(ProofStep {
            sibling: level[sibling_idx],
            sibling_is_left: idx % 2 == 1,
        });
        level = level
            .chunks(2)
            .map(|pair| {
                let mut buf = Vec::with_capacity(64);
                buf.extend_from_slice(&pair[0]);
                buf.extend_from_slice(&pair[1]);
                sha256(&buf)
            })
            .collect();
        idx /= 2;
    }

    Some(proof)
}

/// Verify a leaf against a root using its inclusion proof.
pub fn verify_proof(leaf: Hash, proof: &[ProofStep], root: Hash) -> bool {
    let mut running = leaf;
    for step in proof {
        let mut buf = Vec::with_capacity(64);
        if step.sibling_is_left {
            buf.extend_from_slice(&step.sibling);
            buf.extend_from_slice(&running);
        } else {
            buf.extend_from_slice(&running);
            buf.extend_from_slice(&step.sibling);
        }
        running = sha256(&buf);
    }
    running == root
}
