//! Fixed-header framing over an async byte stream, per spec.md §4.B.
//!
//! `magic: u32 | msg_type: u8 | payload_len: u32 | checksum: u32 | payload`

use eastsea_crypto::sha256;
use eastsea_types::errors::CodecError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::message::{Message, MessageType};
use crate::{MAGIC, MAX_PAYLOAD_BYTES};

const HEADER_LEN: usize = 4 + 1 + 4 + 4;

struct Header {
    msg_type: u8,
    payload_len: u32,
    checksum: u32,
}

fn checksum_of(payload: &[u8]) -> u32 {
    let digest = sha256(payload);
    u32::from_le_bytes(digest[0..4].try_into().unwrap())
}

fn encode_header(header: &Header) -> [u8; HEADER_LEN] {
    let mut buf = [0u8; HEADER_LEN];
    buf[0..4].copy_from_slice(&MAGIC.to_le_bytes());
    buf[4] = header.msg_type;
    buf[5..9].copy_from_slice(&header.payload_len.to_le_bytes());
    buf[9..13].copy_from_slice(&header.checksum.to_le_bytes());
    buf
}

fn decode_header(buf: &[u8; HEADER_LEN]) -> Result<Header, CodecError> {
    let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    if magic != MAGIC {
        return Err(CodecError::InvalidMagic);
    }
    let msg_type = buf[4];
    let payload_len = u32::from_le_bytes(buf[5..9].try_into().unwrap());
    if payload_len > MAX_PAYLOAD_BYTES {
        return Err(CodecError::PayloadTooLarge(payload_len));
    }
    let checksum = u32::from_le_bytes(buf[9..13].try_into().unwrap());
    Ok(Header {
        msg_type,
        payload_len,
        checksum,
    })
}

/// Encode a full frame (header + payload) ready to write to a socket.
pub fn encode_frame(message: &Message) -> Vec<u8> {
    let payload = message.encode_payload();
    let header = Header {
        msg_type: message.msg_type().as_u8(),
        payload_len: payload.len() as u32,
        checksum: checksum_of(&payload),
    };
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&encode_header(&header));
    out.extend_from_slice(&payload);
    out
}

/// Decode a single frame from an in-memory buffer (header + exactly
/// the payload it declares). Used by tests and by `FrameReader`.
pub fn decode_frame(bytes: &[u8]) -> Result<Message, CodecError> {
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::TruncatedFrame);
    }
    let header_buf: [u8; HEADER_LEN] = bytes[0..HEADER_LEN].try_into().unwrap();
    let header = decode_header(&header_buf)?;
    let payload = &bytes[HEADER_LEN..];
    if payload.len() != header.payload_len as usize {
        return Err(CodecError::TruncatedFrame);
    }
    if checksum_of(payload) != header.checksum {
        return Err(CodecError::ChecksumMismatch);
    }
    let msg_type =
        MessageType::from_u8(header.msg_type).ok_or(CodecError::UnknownMessageType(header.msg_type))?;
    Message::decode_payload(msg_type, payload)
}

/// Reads one frame at a time from an async stream. Unknown message
/// types are reported as `Ok(None)` so the caller can log-and-continue
/// per spec.md §4.B ("unknown msg_type is logged and dropped; the
/// session continues") without tearing down the connection.
pub struct FrameReader<R> {
    inner: R,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Read and decode the next frame. Returns `Ok(None)` for a
    /// recognized-but-unknown message type (non-fatal); propagates all
    /// other codec/IO errors, which the transport layer treats as
    /// session-closing per spec.md §4.C.
    pub async fn read_message(&mut self) -> Result<Option<Message>, CodecError> {
        let mut header_buf = [0u8; HEADER_LEN];
        self.inner
            .read_exact(&mut header_buf)
            .await
            .map_err(|_| CodecError::TruncatedFrame)?;
        let header = decode_header(&header_buf)?;

        let mut payload = vec![0u8; header.payload_len as usize];
        self.inner
            .read_exact(&mut payload)
            .await
            .map_err(|_| CodecError::TruncatedFrame)?;

        if checksum_of(&payload) != header.checksum {
            return Err(CodecError::ChecksumMismatch);
        }

        match MessageType::from_u8(header.msg_type) {
            Some(msg_type) => Message::decode_payload(msg_type, &payload).map(Some),
            None => Ok(None),
        }
    }
}

/// Writes frames to an async stream, one at a time. Callers serialize
/// writes to a given peer themselves (spec.md §4.C: "writing to a peer
/// is serialized by an implicit per-peer send mutex").
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn write_message(&mut self, message: &Message) -> std::io::Result<()> {
        let frame = encode_frame(message);
        self.inner.write_all(&frame).await?;
        self.inner.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::PingPongPayload;

    #[test]
    fn encode_decode_round_trips() {
        let msg = Message::Ping(PingPongPayload { ts: 5, nonce: 9 });
        let frame = encode_frame(&msg);
        let decoded = decode_frame(&frame).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let msg = Message::Ping(PingPongPayload { ts: 5, nonce: 9 });
        let mut frame = encode_frame(&msg);
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        assert_eq!(decode_frame(&frame), Err(CodecError::ChecksumMismatch));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let msg = Message::Ping(PingPongPayload { ts: 5, nonce: 9 });
        let mut frame = encode_frame(&msg);
        frame[0] ^= 0xFF;
        assert_eq!(decode_frame(&frame), Err(CodecError::InvalidMagic));
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&MAGIC.to_le_bytes());
        frame.push(0x03);
        frame.extend_from_slice(&(MAX_PAYLOAD_BYTES + 1).to_le_bytes());
        frame.extend_from_slice(&0u32.to_le_bytes());
        assert_eq!(
            decode_frame(&frame),
            Err(CodecError::PayloadTooLarge(MAX_PAYLOAD_BYTES + 1))
        );
    }

    #[tokio::test]
    async fn frame_reader_writer_round_trip_over_a_pipe() {
        let (client, server) = tokio::io::duplex(4096);
        let msg = Message::handshake([1u8; 32], 9000, 42);

        let mut writer = FrameWriter::new(client);
        writer.write_message(&msg).await.unwrap();

        let mut reader = FrameReader::new(server);
        let decoded = reader.read_message().await.unwrap().unwrap();
        assert_eq!(decoded, msg);
    }

    #[tokio::test]
    async fn unknown_message_type_is_logged_and_dropped_not_fatal() {
        let (mut client, server) = tokio::io::duplex(4096);
        let mut raw = Vec::new();
        raw.extend_from_slice(&MAGIC.to_le_bytes());
        raw.push(0xFE); // unknown type
        raw.extend_from_slice(&0u32.to_le_bytes());
        raw.extend_from_slice(&checksum_of(&[]).to_le_bytes());
        client.write_all(&raw).await.unwrap();

        let mut reader = FrameReader::new(server);
        let result = reader.read_message().await.unwrap();
        assert!(result.is_none());
    }
}
