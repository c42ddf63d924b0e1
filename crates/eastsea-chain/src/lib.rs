//! # Blockchain Engine
//!
//! Genesis, mempool, proof-of-work mining, chain validation, and
//! network block ingest, per spec.md §4.H. Pure state machine — no
//! networking; `eastsea-node` drives mining on the slot clock and
//! feeds ingest from decoded `Message::Block` frames.

pub mod blockchain;
pub mod mempool;

pub use blockchain::{Blockchain, SYSTEM_ADDRESS};
pub use mempool::{Mempool, MempoolConfig};
