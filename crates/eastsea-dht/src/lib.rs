//! Kademlia-style distributed hash table, per spec.md §3 and §4.D.
//!
//! This crate owns routing-table bookkeeping, the iterative FIND_NODE
//! lookup, and TTL'd value storage. It never opens a socket: the node
//! coordinator wires an `eastsea-transport`-backed [`lookup::DhtRpc`]
//! implementation in, matching the ports/adapters seam the wider
//! workspace uses for every external collaborator.

pub mod bucket;
pub mod lookup;
pub mod routing_table;
pub mod store;

pub use bucket::{InsertOutcome, NodeEntry, KBucket, K};
pub use lookup::{find_node, DhtRpc, ALPHA, RPC_TIMEOUT};
pub use routing_table::{ObserveResult, RoutingTable, NUM_BUCKETS};
pub use store::{ValueStore, DEFAULT_TTL, SWEEP_INTERVAL};

use eastsea_types::DhtId;
use std::net::IpAddr;

/// Derive a node's `DhtId` from its advertised IP and port, per
/// spec.md §4.D: `sha1(ip_bytes || port_be_bytes)`, truncated/used
/// directly as the 20-byte digest (SHA-1's natural output width).
///
/// Two nodes sharing both IP and port collide by construction — this
/// is a known, accepted limitation (see DESIGN.md, Open Question 3):
/// the spec ties identity to network location rather than a
/// keypair, so co-hosted nodes on the same port are expected to be
/// distinguished by the operator, not by this crate.
pub fn derive_dht_id(ip: IpAddr, port: u16) -> DhtId {
    use sha1::{Digest, Sha1};
    let mut hasher = Sha1::new();
    match ip {
        IpAddr::V4(v4) => hasher.update(v4.octets()),
        IpAddr::V6(v6) => hasher.update(v6.octets()),
    }
    hasher.update(port.to_be_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&digest);
    DhtId(bytes)
}
