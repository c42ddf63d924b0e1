//! Error taxonomy shared across layers, per spec.md §7.

use thiserror::Error;

/// Codec-layer errors. Non-fatal: confined to the offending frame.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid magic number")]
    InvalidMagic,
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(u32),
    #[error("checksum mismatch")]
    ChecksumMismatch,
    #[error("truncated frame")]
    TruncatedFrame,
    #[error("unknown message type: {0:#x}")]
    UnknownMessageType(u8),
    #[error("malformed payload for message type {0:#x}")]
    MalformedPayload(u8),
}

/// Transport-layer errors. Close the offending session; the node
/// continues.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection refused: {0}")]
    ConnectRefused(String),
    #[error("handshake timed out")]
    HandshakeTimeout,
    #[error("protocol version mismatch: local={local} remote={remote}")]
    VersionMismatch { local: u32, remote: u32 },
    #[error("peer closed the connection")]
    PeerClosed,
    #[error("send queue full")]
    SendQueueFull,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// DHT-layer errors. Non-fatal: surfaced to the caller with a
/// best-effort result.
#[derive(Debug, Error)]
pub enum DhtError {
    #[error("lookup timed out for target, returning best-so-far")]
    LookupTimeout,
    #[error("store rejected: {0}")]
    StoreRejected(String),
    #[error("value too large: {0} bytes")]
    ValueTooLarge(usize),
}

/// Blockchain-layer errors. The incoming block/transaction is dropped
/// and logged; never tears down the node.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("previous hash does not match chain tail")]
    InvalidPreviousHash,
    #[error("proof of work not met: difficulty {difficulty}")]
    PowNotMet { difficulty: u32 },
    #[error("declared block hash does not match its recomputed contents")]
    HashMismatch,
    #[error("block height {height} is not greater than current tail")]
    HeightRegression { height: u64 },
    #[error("mempool is full (max {max})")]
    MempoolFull { max: usize },
    #[error("mining nonce space exhausted")]
    MiningGaveUp,
}

/// Coordinator-level errors. Abort the process with a non-zero exit
/// code (spec.md §7).
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
    #[error("failed to bind listener: {0}")]
    BindFailed(#[from] std::io::Error),
    #[error("shutdown did not complete within the deadline")]
    ShutdownTimeout,
}
