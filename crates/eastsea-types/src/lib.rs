//! # Shared Data Model
//!
//! Plain data shapes used across every `eastsea` crate: identifiers,
//! peer bookkeeping, blocks and transactions, and the error taxonomy
//! from spec.md §7. No networking, no consensus logic — just the
//! shapes and their derived-field formulas.

pub mod block;
pub mod errors;
pub mod ids;
pub mod peer;
pub mod transaction;

pub use block::Block;
pub use ids::{DhtId, NodeId};
pub use peer::{PeerRecord, PeerState};
pub use transaction::{Address, Transaction};
