//! # P2P Transport
//!
//! The session layer between the wire codec and everything that needs
//! to talk to peers: listener/dialer, handshake, keepalive, and a
//! bounded per-peer outbound queue with the backpressure policy from
//! spec.md §5. DHT and bootstrap correlation (matching replies to
//! outstanding RPCs) lives one layer up, in `eastsea-node`.

pub mod config;
pub mod events;
pub mod outbound_queue;
pub mod peer_table;
mod session;
pub mod transport;

pub use config::TransportConfig;
pub use events::{CloseReason, InboundMessage, TransportEvent};
pub use outbound_queue::{OutboundQueue, QueueFull};
pub use peer_table::{PeerHandle, PeerTable};
pub use transport::{Transport, SHUTDOWN_DRAIN_DEADLINE};
