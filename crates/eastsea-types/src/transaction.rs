//! Transaction record.
//!
//! No real signature scheme (spec.md §1 Non-goals): `from`/`to` are
//! opaque address strings, matching the wallet-external design where
//! balance checking and signing happen outside the core.

use serde::{Deserialize, Serialize};

pub type Address = String;

/// Immutable once created. The mempool preserves insertion order and
/// permits duplicates (spec.md §9 open question 1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub from: Address,
    pub to: Address,
    pub amount: u64,
    pub timestamp_s: i64,
}

impl Transaction {
    pub fn new(from: impl Into<Address>, to: impl Into<Address>, amount: u64, timestamp_s: i64) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            amount,
            timestamp_s,
        }
    }

    /// Canonical byte encoding used for hashing and wire transmission.
    /// Length-prefixed strings + little-endian integers, matching the
    /// rest of the wire codec's conventions (spec.md §4.B).
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        encode_string(&mut out, &self.from);
        encode_string(&mut out, &self.to);
        out.extend_from_slice(&self.amount.to_le_bytes());
        out.extend_from_slice(&self.timestamp_s.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<(Self, usize)> {
        let mut offset = 0;
        let from = decode_string(bytes, &mut offset)?;
        let to = decode_string(bytes, &mut offset)?;
        if bytes.len() < offset + 16 {
            return None;
        }
        let amount = u64::from_le_bytes(bytes[offset..offset + 8].try_into().ok()?);
        offset += 8;
        let timestamp_s = i64::from_le_bytes(bytes[offset..offset + 8].try_into().ok()?);
        offset += 8;
        Some((
            Transaction {
                from,
                to,
                amount,
                timestamp_s,
            },
            offset,
        ))
    }

    pub fn hash(&self) -> eastsea_crypto::Hash {
        eastsea_crypto::sha256(&self.encode())
    }
}

pub(crate) fn encode_string(out: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

pub(crate) fn decode_string(bytes: &[u8], offset: &mut usize) -> Option<String> {
    if bytes.len() < *offset + 4 {
        return None;
    }
    let len = u32::from_le_bytes(bytes[*offset..*offset + 4].try_into().ok()?) as usize;
    *offset += 4;
    if bytes.len() < *offset + len {
        return None;
    }
    let s = String::from_utf8(bytes[*offset..*offset + len].to_vec()).ok()?;
    *offset += len;
    Some(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trips() {
        let tx = Transaction::new("alice", "bob", 50, 1_700_000_000);
        let bytes = tx.encode();
        let (decoded, consumed) = Transaction::decode(&bytes).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn hash_is_deterministic() {
        let tx = Transaction::new("alice", "bob", 50, 1);
        assert_eq!(tx.hash(), tx.hash());
    }
}
