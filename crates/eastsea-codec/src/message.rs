//! Message-type catalogue and payload (de)serialization, per spec.md
//! §4.B. All integers little-endian; variable-length fields are
//! prefixed by a `u32` count.

use eastsea_types::{Block, Transaction};
use std::net::IpAddr;

use crate::PROTOCOL_VERSION;
use eastsea_types::errors::CodecError;

/// Stable wire values for each message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Handshake = 0x01,
    HandshakeAck = 0x02,
    Ping = 0x03,
    Pong = 0x04,
    Block = 0x10,
    Transaction = 0x11,
    DhtFindNode = 0x20,
    DhtFindNodeReply = 0x21,
    DhtStore = 0x22,
    DhtFindValue = 0x23,
    DhtFindValueReply = 0x24,
    BootstrapAnnounce = 0x30,
    BootstrapPeersReq = 0x31,
    BootstrapPeersRep = 0x32,
}

impl MessageType {
    pub fn from_u8(v: u8) -> Option<Self> {
        use MessageType::*;
        Some(match v {
            0x01 => Handshake,
            0x02 => HandshakeAck,
            0x03 => Ping,
            0x04 => Pong,
            0x10 => Block,
            0x11 => Transaction,
            0x20 => DhtFindNode,
            0x21 => DhtFindNodeReply,
            0x22 => DhtStore,
            0x23 => DhtFindValue,
            0x24 => DhtFindValueReply,
            0x30 => BootstrapAnnounce,
            0x31 => BootstrapPeersReq,
            0x32 => BootstrapPeersRep,
            _ => return None,
        })
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakePayload {
    pub protocol_version: u32,
    pub node_id: [u8; 32],
    pub listen_port: u16,
    pub ts: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingPongPayload {
    pub ts: u64,
    pub nonce: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhtFindNodePayload {
    pub target: [u8; 20],
    pub rpc_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhtNodeInfo {
    pub id: [u8; 20],
    pub addr: std::net::SocketAddr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhtFindNodeReplyPayload {
    pub rpc_id: u64,
    pub nodes: Vec<DhtNodeInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhtStorePayload {
    pub key: [u8; 20],
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhtFindValuePayload {
    pub key: [u8; 20],
    pub rpc_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DhtFindValueResult {
    Value(Vec<u8>),
    Nodes(Vec<DhtNodeInfo>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhtFindValueReplyPayload {
    pub rpc_id: u64,
    pub result: DhtFindValueResult,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapAnnouncePayload {
    pub node_id: [u8; 32],
    pub listen_port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapPeersReqPayload {
    pub max: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapPeersRepPayload {
    pub peers: Vec<std::net::SocketAddr>,
}

/// A fully decoded P2P message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Handshake(HandshakePayload),
    HandshakeAck(HandshakePayload),
    Ping(PingPongPayload),
    Pong(PingPongPayload),
    Block(Box<Block>),
    Transaction(Transaction),
    DhtFindNode(DhtFindNodePayload),
    DhtFindNodeReply(DhtFindNodeReplyPayload),
    DhtStore(DhtStorePayload),
    DhtFindValue(DhtFindValuePayload),
    DhtFindValueReply(DhtFindValueReplyPayload),
    BootstrapAnnounce(BootstrapAnnouncePayload),
    BootstrapPeersReq(BootstrapPeersReqPayload),
    BootstrapPeersRep(BootstrapPeersRepPayload),
}

impl Message {
    pub fn msg_type(&self) -> MessageType {
        match self {
            Message::Handshake(_) => MessageType::Handshake,
            Message::HandshakeAck(_) => MessageType::HandshakeAck,
            Message::Ping(_) => MessageType::Ping,
            Message::Pong(_) => MessageType::Pong,
            Message::Block(_) => MessageType::Block,
            Message::Transaction(_) => MessageType::Transaction,
            Message::DhtFindNode(_) => MessageType::DhtFindNode,
            Message::DhtFindNodeReply(_) => MessageType::DhtFindNodeReply,
            Message::DhtStore(_) => MessageType::DhtStore,
            Message::DhtFindValue(_) => MessageType::DhtFindValue,
            Message::DhtFindValueReply(_) => MessageType::DhtFindValueReply,
            Message::BootstrapAnnounce(_) => MessageType::BootstrapAnnounce,
            Message::BootstrapPeersReq(_) => MessageType::BootstrapPeersReq,
            Message::BootstrapPeersRep(_) => MessageType::BootstrapPeersRep,
        }
    }

    /// Convenience constructor for a fresh outbound handshake.
    pub fn handshake(node_id: [u8; 32], listen_port: u16, ts: u64) -> Self {
        Message::Handshake(HandshakePayload {
            protocol_version: PROTOCOL_VERSION,
            node_id,
            listen_port,
            ts,
        })
    }

    pub fn encode_payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Message::Handshake(p) | Message::HandshakeAck(p) => {
                out.extend_from_slice(&p.protocol_version.to_le_bytes());
                out.extend_from_slice(&p.node_id);
                out.extend_from_slice(&p.listen_port.to_le_bytes());
                out.extend_from_slice(&p.ts.to_le_bytes());
            }
            Message::Ping(p) | Message::Pong(p) => {
                out.extend_from_slice(&p.ts.to_le_bytes());
                out.extend_from_slice(&p.nonce.to_le_bytes());
            }
            Message::Block(b) => out.extend_from_slice(&b.encode()),
            Message::Transaction(t) => out.extend_from_slice(&t.encode()),
            Message::DhtFindNode(p) => {
                out.extend_from_slice(&p.target);
                out.extend_from_slice(&p.rpc_id.to_le_bytes());
            }
            Message::DhtFindNodeReply(p) => {
                out.extend_from_slice(&p.rpc_id.to_le_bytes());
                encode_node_list(&mut out, &p.nodes);
            }
            Message::DhtStore(p) => {
                out.extend_from_slice(&p.key);
                out.extend_from_slice(&(p.value.len() as u32).to_le_bytes());
                out.extend_from_slice(&p.value);
            }
            Message::DhtFindValue(p) => {
                out.extend_from_slice(&p.key);
                out.extend_from_slice(&p.rpc_id.to_le_bytes());
            }
            Message::DhtFindValueReply(p) => {
                out.extend_from_slice(&p.rpc_id.to_le_bytes());
                match &p.result {
                    DhtFindValueResult::Value(v) => {
                        out.push(1);
                        out.extend_from_slice(&(v.len() as u32).to_le_bytes());
                        out.extend_from_slice(v);
                    }
                    DhtFindValueResult::Nodes(nodes) => {
                        out.push(0);
                        encode_node_list(&mut out, nodes);
                    }
                }
            }
            Message::BootstrapAnnounce(p) => {
                out.extend_from_slice(&p.node_id);
                out.extend_from_slice(&p.listen_port.to_le_bytes());
            }
            Message::BootstrapPeersReq(p) => out.extend_from_slice(&p.max.to_le_bytes()),
            Message::BootstrapPeersRep(p) => {
                out.extend_from_slice(&(p.peers.len() as u32).to_le_bytes());
                for addr in &p.peers {
                    encode_socket_addr(&mut out, *addr);
                }
            }
        }
        out
    }

    pub fn decode_payload(msg_type: MessageType, bytes: &[u8]) -> Result<Self, CodecError> {
        let bad = || CodecError::MalformedPayload(msg_type.as_u8());
        Ok(match msg_type {
            MessageType::Handshake | MessageType::HandshakeAck => {
                let mut c = Cursor::new(bytes);
                let p = HandshakePayload {
                    protocol_version: c.take_u32().ok_or_else(bad)?,
                    node_id: c.take_32().ok_or_else(bad)?,
                    listen_port: c.take_u16().ok_or_else(bad)?,
                    ts: c.take_u64().ok_or_else(bad)?,
                };
                if matches!(msg_type, MessageType::Handshake) {
                    Message::Handshake(p)
                } else {
                    Message::HandshakeAck(p)
                }
            }
            MessageType::Ping | MessageType::Pong => {
                let mut c = Cursor::new(bytes);
                let p = PingPongPayload {
                    ts: c.take_u64().ok_or_else(bad)?,
                    nonce: c.take_u64().ok_or_else(bad)?,
                };
                if matches!(msg_type, MessageType::Ping) {
                    Message::Ping(p)
                } else {
                    Message::Pong(p)
                }
            }
            MessageType::Block => {
                let block = Block::decode(bytes).ok_or_else(bad)?;
                Message::Block(Box::new(block))
            }
            MessageType::Transaction => {
                let (tx, _) = Transaction::decode(bytes).ok_or_else(bad)?;
                Message::Transaction(tx)
            }
            MessageType::DhtFindNode => {
                let mut c = Cursor::new(bytes);
                Message::DhtFindNode(DhtFindNodePayload {
                    target: c.take_20().ok_or_else(bad)?,
                    rpc_id: c.take_u64().ok_or_else(bad)?,
                })
            }
            MessageType::DhtFindNodeReply => {
                let mut c = Cursor::new(bytes);
                let rpc_id = c.take_u64().ok_or_else(bad)?;
                let nodes = c.take_node_list().ok_or_else(bad)?;
                Message::DhtFindNodeReply(DhtFindNodeReplyPayload { rpc_id, nodes })
            }
            MessageType::DhtStore => {
                let mut c = Cursor::new(bytes);
                let key = c.take_20().ok_or_else(bad)?;
                let value = c.take_vec_u8().ok_or_else(bad)?;
                Message::DhtStore(DhtStorePayload { key, value })
            }
            MessageType::DhtFindValue => {
                let mut c = Cursor::new(bytes);
                Message::DhtFindValue(DhtFindValuePayload {
                    key: c.take_20().ok_or_else(bad)?,
                    rpc_id: c.take_u64().ok_or_else(bad)?,
                })
            }
            MessageType::DhtFindValueReply => {
                let mut c = Cursor::new(bytes);
                let rpc_id = c.take_u64().ok_or_else(bad)?;
                let tag = c.take_u8().ok_or_else(bad)?;
                let result = if tag == 1 {
                    DhtFindValueResult::Value(c.take_vec_u8().ok_or_else(bad)?)
                } else {
                    DhtFindValueResult::Nodes(c.take_node_list().ok_or_else(bad)?)
                };
                Message::DhtFindValueReply(DhtFindValueReplyPayload { rpc_id, result })
            }
            MessageType::BootstrapAnnounce => {
                let mut c = Cursor::new(bytes);
                Message::BootstrapAnnounce(BootstrapAnnouncePayload {
                    node_id: c.take_32().ok_or_else(bad)?,
                    listen_port: c.take_u16().ok_or_else(bad)?,
                })
            }
            MessageType::BootstrapPeersReq => {
                let mut c = Cursor::new(bytes);
                Message::BootstrapPeersReq(BootstrapPeersReqPayload {
                    max: c.take_u16().ok_or_else(bad)?,
                })
            }
            MessageType::BootstrapPeersRep => {
                let mut c = Cursor::new(bytes);
                let count = c.take_u32().ok_or_else(bad)? as usize;
                let mut peers = Vec::with_capacity(count);
                for _ in 0..count {
                    peers.push(c.take_socket_addr().ok_or_else(bad)?);
                }
                Message::BootstrapPeersRep(BootstrapPeersRepPayload { peers })
            }
        })
    }
}

fn encode_node_list(out: &mut Vec<u8>, nodes: &[DhtNodeInfo]) {
    out.extend_from_slice(&(nodes.len() as u32).to_le_bytes());
    for node in nodes {
        out.extend_from_slice(&node.id);
        encode_socket_addr(out, node.addr);
    }
}

fn encode_socket_addr(out: &mut Vec<u8>, addr: std::net::SocketAddr) {
    match addr.ip() {
        IpAddr::V4(v4) => {
            out.push(4);
            out.extend_from_slice(&v4.octets());
        }
        IpAddr::V6(v6) => {
            out.push(6);
            out.extend_from_slice(&v6.octets());
        }
    }
    out.extend_from_slice(&addr.port().to_le_bytes());
}

/// Tiny cursor over a byte slice; avoids hand-tracking offsets inline
/// for every variable-length payload above.
struct Cursor<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.bytes.len() < self.offset + n {
            return None;
        }
        let slice = &self.bytes[self.offset..self.offset + n];
        self.offset += n;
        Some(slice)
    }

    fn take_u8(&mut self) -> Option<u8> {
        Some(self.take(1)?[0])
    }

    fn take_u16(&mut self) -> Option<u16> {
        Some(u16::from_le_bytes(self.take(2)?.try_into().ok()?))
    }

    fn take_u32(&mut self) -> Option<u32> {
        Some(u32::from_le_bytes(self.take(4)?.try_into().ok()?))
    }

    fn take_u64(&mut self) -> Option<u64> {
        Some(u64::from_le_bytes(self.take(8)?.try_into().ok()?))
    }

    fn take_20(&mut self) -> Option<[u8; 20]> {
        self.take(20)?.try_into().ok()
    }

    fn take_32(&mut self) -> Option<[u8; 32]> {
        self.take(32)?.try_into().ok()
    }

    fn take_vec_u8(&mut self) -> Option<Vec<u8>> {
        let len = self.take_u32()? as usize;
        Some(self.take(len)?.to_vec())
    }

    fn take_socket_addr(&mut self) -> Option<std::net::SocketAddr> {
        let tag = self.take_u8()?;
        let ip = match tag {
            4 => IpAddr::from(<[u8; 4]>::try_from(self.take(4)?).ok()?),
            6 => IpAddr::from(<[u8; 16]>::try_from(self.take(16)?).ok()?),
            _ => return None,
        };
        let port = self.take_u16()?;
        Some(std::net::SocketAddr::new(ip, port))
    }

    fn take_node_list(&mut self) -> Option<Vec<DhtNodeInfo>> {
        let count = self.take_u32()? as usize;
        let mut nodes = Vec::with_capacity(count);
        for _ in 0..count {
            let id = self.take_20()?;
            let addr = self.take_socket_addr()?;
            nodes.push(DhtNodeInfo { id, addr });
        }
        Some(nodes)
    }
}
