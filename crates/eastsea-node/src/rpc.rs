//! The in-process RPC contract named in spec.md §6, expressed as a
//! plain trait so an out-of-scope JSON-RPC wrapper can sit on top of
//! it without reaching into the coordinator's internals.

use async_trait::async_trait;
use eastsea_crypto::Hash;
use eastsea_types::errors::ChainError;
use eastsea_types::{Block, NodeId, Transaction};
use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSummary {
    pub node_id: NodeId,
    pub address: SocketAddr,
    pub connected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub node_id: NodeId,
    pub listen_addr: SocketAddr,
    pub peer_count: usize,
    pub running: bool,
    pub height: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PohState {
    pub current_hash: Hash,
    pub tick_count: u64,
}

#[async_trait]
pub trait NodeHandle: Send + Sync {
    async fn get_height(&self) -> u64;
    async fn get_block(&self, height: u64) -> Option<Block>;
    async fn get_transaction(&self, hash: Hash) -> Option<Transaction>;
    async fn get_peers(&self) -> Vec<PeerSummary>;
    async fn get_node_info(&self) -> NodeInfo;
    async fn submit_transaction(&self, tx: Transaction) -> Result<Hash, ChainError>;
    async fn get_poh_state(&self) -> PohState;
}
