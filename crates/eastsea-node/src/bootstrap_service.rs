//! Wires `eastsea_bootstrap`'s pure decision logic to the transport:
//! startup rejoin, inbound peer-list request/response, and periodic
//! re-announce (spec.md §4.E).

use std::net::SocketAddr;
use std::sync::Arc;

use eastsea_bootstrap::{select_peers_to_announce, BootstrapClient, DEFAULT_PEERS_REQUEST_MAX};
use eastsea_codec::message::{BootstrapAnnouncePayload, BootstrapPeersRepPayload, BootstrapPeersReqPayload};
use eastsea_codec::Message;
use eastsea_transport::{PeerHandle, Transport};
use eastsea_types::NodeId;
use tokio::sync::Mutex;
use tracing::debug;

pub struct BootstrapService {
    client: Mutex<BootstrapClient>,
    transport: Arc<Transport>,
}

impl BootstrapService {
    pub fn new(client: BootstrapClient, transport: Arc<Transport>) -> Self {
        Self {
            client: Mutex::new(client),
            transport,
        }
    }

    pub async fn is_island(&self) -> bool {
        self.client.lock().await.is_island()
    }

    /// Dial every configured seed and request its peer list (spec.md
    /// §4.E startup rejoin).
    pub async fn startup(&self) {
        let seeds = self.client.lock().await.seed_addrs();
        for addr in seeds {
            let handle = self.transport.dial(addr);
            let req = Message::BootstrapPeersReq(BootstrapPeersReqPayload {
                max: DEFAULT_PEERS_REQUEST_MAX,
            });
            let _ = self.transport.send_to(handle, req).await;
        }
    }

    /// Re-announce liveness to the next seed in round-robin order
    /// (spec.md §4.E, every `REANNOUNCE_INTERVAL`).
    pub async fn reannounce(&self, node_id: NodeId, listen_port: u16) {
        let target = self.client.lock().await.next_announce_target();
        let Some(addr) = target else {
            return;
        };
        let handle = self
            .transport
            .handle_for_addr(addr)
            .unwrap_or_else(|| self.transport.dial(addr));
        let announce = Message::BootstrapAnnounce(BootstrapAnnouncePayload {
            node_id: *node_id.as_bytes(),
            listen_port,
        });
        let _ = self.transport.send_to(handle, announce).await;
    }

    /// A seed (or any peer) handed back a peer list; admit as many as
    /// the startup dial budget allows (spec.md §4.E).
    pub async fn handle_peers_rep(&self, payload: BootstrapPeersRepPayload) {
        let connected: Vec<SocketAddr> = self
            .transport
            .connected_peers()
            .into_iter()
            .map(|(_, record)| record.address)
            .collect();
        let admitted = {
            let mut client = self.client.lock().await;
            client.admit_startup_dials(payload.peers, |addr| connected.contains(&addr))
        };
        for addr in admitted {
            self.transport.dial(addr);
        }
    }

    /// Answer an inbound `BootstrapPeersReq` with a bounded slice of
    /// currently known peers, excluding the requester itself.
    pub async fn handle_peers_req(&self, handle: PeerHandle, payload: BootstrapPeersReqPayload) {
        let Some(requester) = self.transport.peer_record(handle) else {
            debug!(peer = handle.0, "bootstrap request from a peer with no table entry, ignoring");
            return;
        };
        let known: Vec<SocketAddr> = self
            .transport
            .connected_peers()
            .into_iter()
            .map(|(_, record)| record.address)
            .collect();
        let selected = select_peers_to_announce(&known, requester.address, payload.max);
        let rep = Message::BootstrapPeersRep(BootstrapPeersRepPayload { peers: selected });
        let _ = self.transport.send_to(handle, rep).await;
    }

    /// An inbound `BootstrapAnnounce` only proves liveness; routing
    /// table admission is the DHT service's job, driven off the
    /// `Connected` transport event instead (spec.md §9 ordering).
    pub async fn handle_announce(&self, payload: BootstrapAnnouncePayload) {
        debug!(node_id = %NodeId(payload.node_id), "received bootstrap announce");
    }
}
