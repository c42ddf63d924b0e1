//! Pure decision logic for answering an incoming `BootstrapPeersReq`
//! (spec.md §4.B wire table, §4.E). Kept free of any transport/DHT
//! dependency so the selection policy is exercised by plain unit tests;
//! the node coordinator supplies `known` from its routing table/peer
//! table and sends the result as `BootstrapPeersRep`.

use std::net::SocketAddr;

/// Cap applied to an outgoing `BootstrapPeersRep` regardless of what
/// the requester asked for, so a misbehaving peer can't use `max` to
/// extract an unbounded peer list in one round trip.
pub const MAX_PEERS_PER_REPLY: u16 = 100;

/// Select which known addresses to hand back to a peer requesting
/// `max` entries, excluding the requester's own address.
pub fn select_peers_to_announce(known: &[SocketAddr], requester: SocketAddr, max: u16) -> Vec<SocketAddr> {
    let limit = max.min(MAX_PEERS_PER_REPLY) as usize;
    known.iter().filter(|addr| **addr != requester).take(limit).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(Ipv4Addr::LOCALHOST.into(), port)
    }

    #[test]
    fn excludes_the_requester_own_address() {
        let known = vec![addr(1), addr(2), addr(3)];
        let result = select_peers_to_announce(&known, addr(2), 10);
        assert_eq!(result, vec![addr(1), addr(3)]);
    }

    #[test]
    fn truncates_to_the_requested_max() {
        let known = vec![addr(1), addr(2), addr(3)];
        let result = select_peers_to_announce(&known, addr(99), 2);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn never_exceeds_the_hard_reply_cap_even_if_max_asks_for_more() {
        let known: Vec<SocketAddr> = (0..200u16).map(addr).collect();
        let result = select_peers_to_announce(&known, addr(999), u16::MAX);
        assert_eq!(result.len(), MAX_PEERS_PER_REPLY as usize);
    }
}
