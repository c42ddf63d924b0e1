//! Per-peer session state machine, per spec.md §4.C:
//! `Dialing/Accepted -> Handshaking -> Connected -> Closing -> Closed`.
//!
//! One task owns the read half and drives the state machine; a second
//! task owns the write half and drains the peer's `OutboundQueue`; a
//! third runs the keepalive timer. All three share a `Notify` used to
//! tear the session down together once any of them detects a failure.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use eastsea_codec::message::{HandshakePayload, PingPongPayload};
use eastsea_codec::{FrameReader, FrameWriter, Message, PROTOCOL_VERSION};
use eastsea_types::errors::CodecError;
use eastsea_types::{NodeId, PeerRecord, PeerState};
use rand::RngCore;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Notify};
use tracing::{debug, warn};

use crate::config::TransportConfig;
use crate::events::{CloseReason, InboundMessage, TransportEvent};
use crate::peer_table::{PeerHandle, PeerTable};

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub(crate) struct SessionParams {
    pub handle: PeerHandle,
    pub addr: SocketAddr,
    pub inbound: bool,
    pub local_node_id: NodeId,
    pub local_listen_port: u16,
    pub config: TransportConfig,
}

/// Run one peer session end to end: handshake, then the
/// read/write/keepalive loops until the connection closes for any
/// reason. Never panics on peer misbehavior — every failure maps to a
/// logged, categorized `Closed` event (spec.md §4.C failure semantics).
pub(crate) async fn run(
    stream: TcpStream,
    params: SessionParams,
    table: Arc<PeerTable>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    inbound_tx: mpsc::UnboundedSender<InboundMessage>,
    shutdown: watch::Receiver<bool>,
) {
    let SessionParams {
        handle,
        addr,
        inbound,
        local_node_id,
        local_listen_port,
        config,
    } = params;

    let placeholder = PeerRecord::new(NodeId([0u8; 32]), addr, PeerState::Handshaking, now_ms());
    let queue = table.insert(handle, placeholder, config.queue_capacity);

    let (read_half, write_half) = stream.into_split();
    let mut reader = FrameReader::new(read_half);
    let mut writer = FrameWriter::new(write_half);

    let handshake = tokio::time::timeout(
        config.handshake_timeout,
        perform_handshake(&mut reader, &mut writer, local_node_id, local_listen_port),
    )
    .await;

    let (peer_node_id, peer_listen_port) = match handshake {
        Ok(Ok(result)) => result,
        Ok(Err(reason)) => {
            close(&table, handle, addr, &events_tx, reason).await;
            return;
        }
        Err(_) => {
            close(&table, handle, addr, &events_tx, CloseReason::HandshakeTimeout).await;
            return;
        }
    };

    table.set_state(handle, PeerState::Connected);
    table.touch(handle, now_ms());
    let advertised_addr = SocketAddr::new(addr.ip(), peer_listen_port);
    let _ = events_tx.send(TransportEvent::Connected {
        handle,
        node_id: peer_node_id,
        addr: advertised_addr,
        inbound,
    });

    let closing = Arc::new(Notify::new());
    let (pong_tx, pong_rx) = watch::channel::<Option<u64>>(None);

    let writer_task = tokio::spawn(run_writer(writer, queue.clone(), closing.clone()));
    let keepalive_task = tokio::spawn(run_keepalive(
        handle,
        queue.clone(),
        table.clone(),
        pong_rx,
        config,
        closing.clone(),
        shutdown.clone(),
    ));

    let close_reason = run_reader(
        &mut reader,
        handle,
        &table,
        &queue,
        &pong_tx,
        &inbound_tx,
        config,
        &closing,
        shutdown,
    )
    .await;

    closing.notify_waiters();
    let _ = writer_task.await;
    let _ = keepalive_task.await;

    close(&table, handle, advertised_addr, &events_tx, close_reason).await;
}

async fn close(
    table: &Arc<PeerTable>,
    handle: PeerHandle,
    addr: SocketAddr,
    events_tx: &mpsc::UnboundedSender<TransportEvent>,
    reason: CloseReason,
) {
    table.set_state(handle, PeerState::Closing);
    table.remove(handle);
    let _ = events_tx.send(TransportEvent::Closed { handle, addr, reason });
}

/// Exchange Handshake/HandshakeAck and confirm protocol-version match,
/// per spec.md §4.C. Either side may see the peer's `Handshake` first
/// (and must reply with `HandshakeAck`) or see a `HandshakeAck`
/// directly if the peer already processed our own `Handshake`.
async fn perform_handshake<R, W>(
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
    local_node_id: NodeId,
    local_listen_port: u16,
) -> Result<(NodeId, u16), CloseReason>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let outbound = Message::Handshake(HandshakePayload {
        protocol_version: PROTOCOL_VERSION,
        node_id: *local_node_id.as_bytes(),
        listen_port: local_listen_port,
        ts: now_ms(),
    });
    writer.write_message(&outbound).await.map_err(|_| CloseReason::Io)?;

    loop {
        let decoded = reader.read_message().await;
        let msg = match decoded {
            Ok(Some(msg)) => msg,
            Ok(None) => continue, // unknown type during handshake: logged upstream, keep waiting
            Err(CodecError::UnknownMessageType(_)) => continue,
            Err(_) => return Err(CloseReason::Codec),
        };

        return match msg {
            Message::Handshake(p) => {
                if p.protocol_version != PROTOCOL_VERSION {
                    return Err(CloseReason::VersionMismatch);
                }
                let ack = Message::HandshakeAck(HandshakePayload {
                    protocol_version: PROTOCOL_VERSION,
                    node_id: *local_node_id.as_bytes(),
                    listen_port: local_listen_port,
                    ts: now_ms(),
                });
                writer.write_message(&ack).await.map_err(|_| CloseReason::Io)?;
                Ok((NodeId(p.node_id), p.listen_port))
            }
            Message::HandshakeAck(p) => {
                if p.protocol_version != PROTOCOL_VERSION {
                    return Err(CloseReason::VersionMismatch);
                }
                Ok((NodeId(p.node_id), p.listen_port))
            }
            // Any other message before the handshake completes is a
            // protocol violation (spec.md §8 property 8).
            _ => Err(CloseReason::HandshakeTimeout),
        };
    }
}

async fn run_writer<W>(mut writer: FrameWriter<W>, queue: Arc<crate::outbound_queue::OutboundQueue>, closing: Arc<Notify>)
where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            _ = closing.notified() => return,
            msg = queue.dequeue() => {
                if writer.write_message(&msg).await.is_err() {
                    closing.notify_waiters();
                    return;
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_keepalive(
    handle: PeerHandle,
    queue: Arc<crate::outbound_queue::OutboundQueue>,
    table: Arc<PeerTable>,
    mut pong_rx: watch::Receiver<Option<u64>>,
    config: TransportConfig,
    closing: Arc<Notify>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut consecutive_failures = 0u32;
    loop {
        tokio::select! {
            _ = closing.notified() => return,
            _ = shutdown.changed() => return,
            _ = tokio::time::sleep(config.ping_interval) => {}
        }
        if *shutdown.borrow() {
            return;
        }

        let nonce = rand::thread_rng().next_u64();
        table.set_last_ping_nonce(handle, Some(nonce));
        let ping = Message::Ping(PingPongPayload { ts: now_ms(), nonce });
        if queue.enqueue(ping, config.enqueue_deadline).await.is_err() {
            closing.notify_waiters();
            return;
        }

        let replied = wait_for_pong(&mut pong_rx, nonce, config.pong_timeout, &closing).await;
        if replied {
            consecutive_failures = 0;
            table.set_state(handle, PeerState::Connected);
            table.touch(handle, now_ms());
        } else {
            consecutive_failures += 1;
            table.set_state(handle, PeerState::Unresponsive);
            debug!(peer = handle.0, "ping timed out, marking peer unresponsive");
            if consecutive_failures >= 2 {
                warn!(peer = handle.0, "peer failed a second consecutive ping, closing session");
                closing.notify_waiters();
                return;
            }
        }
    }
}

async fn wait_for_pong(
    pong_rx: &mut watch::Receiver<Option<u64>>,
    nonce: u64,
    timeout: Duration,
    closing: &Notify,
) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if *pong_rx.borrow() == Some(nonce) {
            return true;
        }
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return false;
        }
        tokio::select! {
            _ = closing.notified() => return false,
            _ = tokio::time::sleep(remaining) => return *pong_rx.borrow() == Some(nonce),
            changed = pong_rx.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_reader<R>(
    reader: &mut FrameReader<R>,
    handle: PeerHandle,
    table: &Arc<PeerTable>,
    queue: &Arc<crate::outbound_queue::OutboundQueue>,
    pong_tx: &watch::Sender<Option<u64>>,
    inbound_tx: &mpsc::UnboundedSender<InboundMessage>,
    config: TransportConfig,
    closing: &Notify,
    mut shutdown: watch::Receiver<bool>,
) -> CloseReason
where
    R: AsyncRead + Unpin,
{
    if *shutdown.borrow() {
        return CloseReason::LocalShutdown;
    }

    loop {
        let decoded = tokio::select! {
            _ = closing.notified() => return CloseReason::LocalShutdown,
            _ = shutdown.changed() => return CloseReason::LocalShutdown,
            decoded = reader.read_message() => decoded,
        };

        match decoded {
            Ok(Some(Message::Ping(p))) => {
                let pong = Message::Pong(PingPongPayload { ts: p.ts, nonce: p.nonce });
                if queue.enqueue(pong, config.enqueue_deadline).await.is_err() {
                    return CloseReason::SendQueueFull;
                }
                table.touch(handle, now_ms());
            }
            Ok(Some(Message::Pong(p))) => {
                let _ = pong_tx.send(Some(p.nonce));
                table.touch(handle, now_ms());
            }
            Ok(Some(Message::Handshake(_))) | Ok(Some(Message::HandshakeAck(_))) => {
                warn!(peer = handle.0, "ignoring duplicate handshake on an already-connected session");
            }
            Ok(Some(other)) => {
                table.touch(handle, now_ms());
                if inbound_tx.send(InboundMessage { handle, message: other }).is_err() {
                    return CloseReason::LocalShutdown;
                }
            }
            Ok(None) => {
                debug!(peer = handle.0, "dropped a frame with an unknown message type");
            }
            Err(CodecError::UnknownMessageType(_)) => {}
            Err(_) => return CloseReason::Codec,
        }
    }
}
