//! Node and DHT identifiers.

use rand::RngCore;
use std::fmt;

/// A 256-bit opaque node identifier, generated uniformly at random at
/// startup. Equality is bytewise comparison.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct NodeId(pub [u8; 32]);

impl NodeId {
    /// Generate a fresh random `NodeId`.
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        NodeId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", hex::encode(self.0))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// A 160-bit identifier used by the Kademlia layer. Derivation lives in
/// `eastsea-dht` (it needs SHA-1); this crate only defines the shape
/// and the XOR-distance arithmetic every DHT consumer needs.
#[derive(Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct DhtId(pub [u8; 20]);

impl DhtId {
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// XOR distance to `other`, as a 160-bit big-endian unsigned integer
    /// represented by its raw bytes (spec.md §3: "interpreted as a
    /// 160-bit unsigned integer" — callers needing numeric comparison
    /// compare these byte arrays lexicographically, which is
    /// equivalent to big-endian integer comparison).
    pub fn distance(&self, other: &DhtId) -> [u8; 20] {
        let mut out = [0u8; 20];
        for i in 0..20 {
            out[i] = self.0[i] ^ other.0[i];
        }
        out
    }

    /// Index (0..=159) of the most significant bit at which `self` and
    /// `other` differ; this is the k-bucket index per spec.md §3.
    /// Returns `None` if the two ids are identical.
    pub fn bucket_index(&self, other: &DhtId) -> Option<usize> {
        let d = self.distance(other);
        for (byte_idx, byte) in d.iter().enumerate() {
            if *byte != 0 {
                let leading = byte.leading_zeros() as usize;
                return Some(byte_idx * 8 + leading);
            }
        }
        None
    }
}

impl fmt::Debug for DhtId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DhtId({})", hex::encode(self.0))
    }
}

impl fmt::Display for DhtId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_random_is_not_all_zero() {
        // Astronomically unlikely to collide with zero; catches a broken RNG wiring.
        assert_ne!(NodeId::random().0, [0u8; 32]);
    }

    #[test]
    fn dht_distance_is_symmetric() {
        let a = DhtId([0xAA; 20]);
        let b = DhtId([0x55; 20]);
        assert_eq!(a.distance(&b), b.distance(&a));
    }

    #[test]
    fn dht_distance_to_self_is_zero() {
        let a = DhtId([0x12; 20]);
        assert_eq!(a.distance(&a), [0u8; 20]);
        assert_eq!(a.bucket_index(&a), None);
    }

    #[test]
    fn bucket_index_finds_first_differing_bit() {
        let mut a_bytes = [0u8; 20];
        let mut b_bytes = [0u8; 20];
        a_bytes[0] = 0b0000_0000;
        b_bytes[0] = 0b0000_0001; // differ at bit 7 (0-indexed from MSB)
        let a = DhtId(a_bytes);
        let b = DhtId(b_bytes);
        assert_eq!(a.bucket_index(&b), Some(7));
    }
}
