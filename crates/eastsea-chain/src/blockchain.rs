//! Chain state machine: genesis, mining, validation, and network
//! ingest, per spec.md §4.H.

use crate::mempool::{Mempool, MempoolConfig};
use eastsea_crypto::leading_hex_zeros;
use eastsea_types::errors::ChainError;
use eastsea_types::{Block, Transaction};

/// Reward address for the synthetic reward transaction minted into
/// every mined block (spec.md §4.H step 2).
pub const SYSTEM_ADDRESS: &str = "system";

#[derive(Debug)]
pub struct Blockchain {
    chain: Vec<Block>,
    mempool: Mempool,
    mining_reward: u64,
    difficulty: u32,
}

impl Blockchain {
    /// Create a fresh chain: a genesis block at height 0 plus an empty
    /// mempool (spec.md §4.H).
    pub fn new(genesis_timestamp_s: i64, mining_reward: u64, difficulty: u32) -> Self {
        Self::with_mempool_config(
            genesis_timestamp_s,
            mining_reward,
            difficulty,
            MempoolConfig::default(),
        )
    }

    pub fn with_mempool_config(
        genesis_timestamp_s: i64,
        mining_reward: u64,
        difficulty: u32,
        mempool_config: MempoolConfig,
    ) -> Self {
        Self {
            chain: vec![Block::genesis(genesis_timestamp_s)],
            mempool: Mempool::new(mempool_config),
            mining_reward,
            difficulty,
        }
    }

    pub fn height(&self) -> u64 {
        self.tail().height
    }

    pub fn tail(&self) -> &Block {
        self.chain.last().expect("chain always has a genesis block")
    }

    pub fn block_at(&self, height: u64) -> Option<&Block> {
        self.chain.get(height as usize)
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    /// O(N) scan, as permitted by the RPC contract (spec.md §6).
    pub fn find_transaction(&self, hash: &eastsea_crypto::Hash) -> Option<&Transaction> {
        self.chain
            .iter()
            .flat_map(|b| b.transactions.iter())
            .find(|tx| &tx.hash() == hash)
    }

    pub fn add_transaction(&mut self, tx: Transaction) -> Result<(), ChainError> {
        self.mempool.add_transaction(tx)
    }

    /// Mine a new block from the current mempool (spec.md §4.H):
    /// copy the mempool, append a synthetic reward transaction,
    /// compute the Merkle root, then search nonces until the hash's
    /// leading-hex-zero count meets `difficulty`.
    pub fn mine_block(&mut self, timestamp_s: i64) -> Result<&Block, ChainError> {
        let mut transactions = self.mempool.pending().to_vec();
        transactions.push(Transaction::new(
            SYSTEM_ADDRESS,
            "miner",
            self.mining_reward,
            timestamp_s,
        ));

        let previous_hash = self.tail().hash;
        let height = self.tail().height + 1;

        let mut nonce: u64 = 0;
        loop {
            let candidate = Block::new(height, timestamp_s, previous_hash, transactions.clone(), nonce);
            if leading_hex_zeros(&candidate.hash) >= self.difficulty {
                self.chain.push(candidate);
                self.mempool.drain();
                return Ok(self.tail());
            }
            nonce = nonce.checked_add(1).ok_or(ChainError::MiningGaveUp)?;
        }
    }

    /// Walk heights `1..N-1` verifying linkage and the current-fields
    /// hash formula. Does **not** re-check proof-of-work difficulty —
    /// preserved deliberately (spec.md §9 open question 2): a block
    /// accepted once under a given difficulty validates forever even
    /// if difficulty is later raised.
    pub fn validate_chain(&self) -> bool {
        for i in 1..self.chain.len() {
            let prev = &self.chain[i - 1];
            let cur = &self.chain[i];
            if cur.previous_hash != prev.hash {
                return false;
            }
            if cur.hash != cur.recompute_hash() {
                return false;
            }
        }
        true
    }

    /// Ingest a block received from the network (spec.md §4.H):
    /// reject on height regression or a previous-hash mismatch against
    /// the current tail (no fork/reorg handling, spec.md §9 open
    /// question 4), then verify the declared hash and proof-of-work
    /// before appending and clearing the mempool.
    pub fn ingest_block(&mut self, block: Block) -> Result<(), ChainError> {
        let tail = self.tail();
        if block.height <= tail.height {
            return Err(ChainError::HeightRegression { height: block.height });
        }
        if block.previous_hash != tail.hash {
            return Err(ChainError::InvalidPreviousHash);
        }
        if block.hash != block.recompute_hash() {
            return Err(ChainError::HashMismatch);
        }
        if leading_hex_zeros(&block.hash) < self.difficulty {
            return Err(ChainError::PowNotMet {
                difficulty: self.difficulty,
            });
        }
        self.chain.push(block);
        self.mempool.drain();
        Ok(())
    }
}
