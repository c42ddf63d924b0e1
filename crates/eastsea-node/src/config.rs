//! Node-level tunables: listen address, bootstrap seeds, slot clock,
//! and mining parameters, per spec.md §4.I and §6.

use std::net::SocketAddr;
use std::time::Duration;

use eastsea_chain::MempoolConfig;
use eastsea_poh::{DEFAULT_SLOT_DURATION, DEFAULT_TICKS_PER_SLOT};
use eastsea_transport::TransportConfig;

/// Default JSON-RPC-style port named in spec.md §6 (the RPC surface
/// itself is out of scope; this is plumbed through for the CLI).
pub const DEFAULT_RPC_PORT: u16 = 8545;

/// Default proof-of-work difficulty (spec.md §6 `--difficulty` flag).
pub const DEFAULT_DIFFICULTY: u32 = 2;

/// Reward minted into the synthetic reward transaction of every mined
/// block (spec.md §4.H).
pub const DEFAULT_MINING_REWARD: u64 = 50;

/// How often the node re-announces itself to a bootstrap seed
/// (spec.md §4.E).
pub const DEFAULT_REANNOUNCE_INTERVAL: Duration = eastsea_bootstrap::REANNOUNCE_INTERVAL;

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub listen_addr: SocketAddr,
    pub bootstrap_seeds: Vec<SocketAddr>,
    pub rpc_port: u16,
    pub transport: TransportConfig,
    pub slot_duration: Duration,
    pub ticks_per_slot: u64,
    pub difficulty: u32,
    pub mining_reward: u64,
    pub mempool: MempoolConfig,
    /// Overrides the self-leader id used by `is_self_leader` (default:
    /// the hex encoding of the node's freshly generated `NodeId`).
    /// Lets a multi-node `--leaders` schedule name this node without
    /// having to predict its randomly generated id up front.
    pub leader_id_override: Option<String>,
    /// The static leader-id round-robin (spec.md §4.G). `None`
    /// defaults to a single-entry schedule naming this node as its own
    /// sole leader, so a solo node always mines when its mempool is
    /// non-empty.
    pub leaders: Option<Vec<String>>,
}

impl NodeConfig {
    /// A node bound to `listen_addr` with every other tunable at its
    /// spec-stated default and no bootstrap seeds (island mode).
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            bootstrap_seeds: Vec::new(),
            rpc_port: DEFAULT_RPC_PORT,
            transport: TransportConfig::default(),
            slot_duration: DEFAULT_SLOT_DURATION,
            ticks_per_slot: DEFAULT_TICKS_PER_SLOT,
            difficulty: DEFAULT_DIFFICULTY,
            mining_reward: DEFAULT_MINING_REWARD,
            mempool: MempoolConfig::default(),
            leader_id_override: None,
            leaders: None,
        }
    }
}
