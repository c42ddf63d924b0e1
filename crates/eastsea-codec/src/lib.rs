//! # Wire Codec
//!
//! Fixed-header framing, checksum, and the P2P message catalogue from
//! spec.md §4.B. Pure function of bytes — no sockets here; see
//! `eastsea-transport` for the session layer that drives this codec.

pub mod frame;
pub mod message;

pub use eastsea_types::errors::CodecError;
pub use frame::{decode_frame, encode_frame, FrameReader, FrameWriter};
pub use message::{Message, MessageType};

/// Frame magic number identifying a valid `eastsea` frame.
pub const MAGIC: u32 = 0xEA57_5EA0;

/// Maximum payload size: 16 MiB.
pub const MAX_PAYLOAD_BYTES: u32 = 16 * 1024 * 1024;

/// Wire protocol version checked during handshake.
pub const PROTOCOL_VERSION: u32 = 1;
