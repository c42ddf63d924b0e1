//! TTL'd key-value store backing STORE/FIND_VALUE, per spec.md §4.D.

use std::collections::HashMap;
use std::time::Duration;

/// Default time-to-live for a stored value (spec.md §4.D).
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Interval for the eager background sweep that purges expired
/// entries even when nothing reads them (spec.md §4.D supplement —
/// lazy purge-on-access alone would let dead entries linger
/// indefinitely in a key nobody looks up again).
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct Entry {
    value: Vec<u8>,
    expires_at_ms: u64,
}

/// In-memory store keyed by the 20-byte DHT key space. Not indexed by
/// `DhtId` directly since STORE keys are arbitrary content hashes, not
/// necessarily node ids (spec.md §4.D).
#[derive(Default)]
pub struct ValueStore {
    entries: HashMap<[u8; 20], Entry>,
}

impl ValueStore {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Store a value with the default TTL, overwriting any prior value
    /// for the same key.
    pub fn put(&mut self, key: [u8; 20], value: Vec<u8>, now_ms: u64) {
        self.put_with_ttl(key, value, DEFAULT_TTL, now_ms);
    }

    pub fn put_with_ttl(&mut self, key: [u8; 20], value: Vec<u8>, ttl: Duration, now_ms: u64) {
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at_ms: now_ms.saturating_add(ttl.as_millis() as u64),
            },
        );
    }

    /// Look up a value, lazily evicting it first if it has expired.
    pub fn get(&mut self, key: &[u8; 20], now_ms: u64) -> Option<Vec<u8>> {
        let expired = self
            .entries
            .get(key)
            .map(|e| e.expires_at_ms <= now_ms)
            .unwrap_or(false);
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|e| e.value.clone())
    }

    /// Eagerly purge every expired entry; returns the number removed.
    pub fn sweep(&mut self, now_ms: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at_ms > now_ms);
        before - self.entries.len()
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

    #[test]
    fn put_then_get_returns_the_value() {
        let mut store = ValueStore::new();
        store.put([1u8; 20], b"hello".to_vec(), 0);
        assert_eq!(store.get(&[1u8; 20], 1_000), Some(b"hello".to_vec()));
    }

    #[test]
    fn get_after_ttl_expiry_returns_none_and_evicts() {
        let mut store = ValueStore::new();
        store.put_with_ttl([1u8; 20], b"hello".to_vec(), Duration::from_millis(100), 0);
        assert_eq!(store.get(&[1u8; 20], 101), None);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let mut store = ValueStore::new();
        store.put_with_ttl([1u8; 20], b"a".to_vec(), Duration::from_millis(100), 0);
        store.put_with_ttl([2u8; 20], b"b".to_vec(), Duration::from_millis(10_000), 0);
        let removed = store.sweep(200);
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
        assert!(store.get(&[2u8; 20], 200).is_some());
    }

    #[test]
    fn put_overwrites_existing_value_for_same_key() {
        let mut store = ValueStore::new();
        store.put([1u8; 20], b"first".to_vec(), 0);
        store.put([1u8; 20], b"second".to_vec(), 0);
        assert_eq!(store.get(&[1u8; 20], 0), Some(b"second".to_vec()));
    }
}
