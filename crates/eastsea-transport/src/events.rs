//! Events the transport emits for the node coordinator to dispatch
//! onward (spec.md §4.I, §9 pointer-graph ordering: a peer becomes
//! visible to the DHT only *after* the `Connected` event fires, and is
//! removed from the routing table only *after* the matching `Closed`
//! event).

use crate::peer_table::PeerHandle;
use eastsea_codec::Message;
use eastsea_types::NodeId;
use std::net::SocketAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    VersionMismatch,
    HandshakeTimeout,
    Io,
    Codec,
    SendQueueFull,
    LocalShutdown,
}

#[derive(Debug)]
pub enum TransportEvent {
    Connected {
        handle: PeerHandle,
        node_id: NodeId,
        addr: SocketAddr,
        inbound: bool,
    },
    Closed {
        handle: PeerHandle,
        addr: SocketAddr,
        reason: CloseReason,
    },
}

/// A message decoded from a `Connected` peer, handed to the
/// coordinator for dispatch (spec.md §4.I): DHT message types go to
/// the DHT service, Block/Transaction to the chain, bootstrap types to
/// the bootstrap service. Handshake/Ping/Pong never reach this channel
/// — the transport consumes them itself.
#[derive(Debug)]
pub struct InboundMessage {
    pub handle: PeerHandle,
    pub message: Message,
}
