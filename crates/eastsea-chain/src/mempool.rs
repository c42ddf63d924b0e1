//! Pending-transaction buffer, per spec.md §3/§4.H.
//!
//! Ordered, insertion-order-preserving, duplicates permitted (spec.md
//! §9 open question 1 — preserved deliberately, not a bug we fixed).

use eastsea_types::errors::ChainError;
use eastsea_types::Transaction;

/// Optional cap on mempool size. `None` (the default) preserves the
/// spec's unbounded behavior; a configured cap gives the
/// `MempoolFull` error kind named in spec.md §7 a concrete trigger.
#[derive(Debug, Clone, Copy, Default)]
pub struct MempoolConfig {
    pub max_len: Option<usize>,
}

#[derive(Debug, Default)]
pub struct Mempool {
    config: MempoolConfig,
    pending: Vec<Transaction>,
}

impl Mempool {
    pub fn new(config: MempoolConfig) -> Self {
        Self {
            config,
            pending: Vec::new(),
        }
    }

    /// Append `tx` to the pool. No validation beyond structural
    /// well-formedness already enforced by `Transaction`'s type —
    /// balance checking is out of scope for the core (spec.md §4.H).
    pub fn add_transaction(&mut self, tx: Transaction) -> Result<(), ChainError> {
        if let Some(max) = self.config.max_len {
            if self.pending.len() >= max {
                return Err(ChainError::MempoolFull { max });
            }
        }
        self.pending.push(tx);
        Ok(())
    }

    pub fn pending(&self) -> &[Transaction] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drain and return every pending transaction, in insertion order.
    /// Used by mining to seed the next block's transaction list.
    pub fn drain(&mut self) -> Vec<Transaction> {
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_transaction_preserves_insertion_order() {
        let mut pool = Mempool::new(MempoolConfig::default());
        pool.add_transaction(Transaction::new("a", "b", 1, 0)).unwrap();
        pool.add_transaction(Transaction::new("c", "d", 2, 1)).unwrap();
        assert_eq!(pool.pending()[0].from, "a");
        assert_eq!(pool.pending()[1].from, "c");
    }

    #[test]
    fn allows_duplicate_transactions() {
        let mut pool = Mempool::new(MempoolConfig::default());
        let tx = Transaction::new("alice", "bob", 50, 100);
        pool.add_transaction(tx.clone()).unwrap();
        pool.add_transaction(tx.clone()).unwrap();
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.pending()[0], pool.pending()[1]);
    }

    #[test]
    fn drain_empties_the_pool_and_returns_everything_in_order() {
        let mut pool = Mempool::new(MempoolConfig::default());
        pool.add_transaction(Transaction::new("a", "b", 1, 0)).unwrap();
        pool.add_transaction(Transaction::new("c", "d", 2, 1)).unwrap();
        let drained = pool.drain();
        assert_eq!(drained.len(), 2);
        assert!(pool.is_empty());
    }

    #[test]
    fn configured_cap_rejects_once_full() {
        let mut pool = Mempool::new(MempoolConfig { max_len: Some(1) });
        pool.add_transaction(Transaction::new("a", "b", 1, 0)).unwrap();
        let err = pool.add_transaction(Transaction::new("c", "d", 2, 1)).unwrap_err();
        assert_eq!(err, ChainError::MempoolFull { max: 1 });
    }
}
