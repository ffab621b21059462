use std::collections::{HashMap, HashSet};

use libp2p::{mdns, Multiaddr, PeerId};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::events::NetEvent;
use crate::peers::PeerDirectory;

/// Handle a single mDNS event.
///
/// Records newly-discovered peers in the [`PeerDirectory`] and emits the
/// appropriate [`NetEvent`] per distinct PeerId. Returns the discovered
/// peers so the swarm loop can decide whether to initiate a connection.
/// Called directly from the swarm event loop to keep that loop thin.
pub fn handle_mdns_event(
    event: mdns::Event,
    directory: &PeerDirectory,
    event_tx: &mpsc::Sender<NetEvent>,
) -> Vec<PeerId> {
    match event {
        mdns::Event::Discovered(list) => {
            // A peer may be reachable on multiple addresses; the first one
            // announced becomes its primary address and we emit one event
            // per peer.
            let mut by_peer: HashMap<PeerId, Multiaddr> = HashMap::new();
            for (peer_id, addr) in list {
                by_peer.entry(peer_id).or_insert(addr);
            }

            let mut found = Vec::new();
            for (peer_id, addr) in by_peer {
                if peer_id == directory.local_peer_id() {
                    continue;
                }
                if directory.on_peer_found(peer_id, addr.clone()) {
                    info!(%peer_id, %addr, "mDNS discovered peer");
                    if let Err(e) = event_tx.try_send(NetEvent::PeerDiscovered { peer_id, addr }) {
                        warn!(%e, "event channel full — dropping PeerDiscovered");
                    }
                } else {
                    debug!(%peer_id, "mDNS re-announced known peer");
                }
                found.push(peer_id);
            }
            found
        }

        mdns::Event::Expired(list) => {
            // Deduplicate: one peer may appear once per expired address.
            let expired: HashSet<PeerId> = list.into_iter().map(|(peer_id, _)| peer_id).collect();
            for peer_id in expired {
                debug!(%peer_id, "mDNS peer expired");
                if let Err(e) = event_tx.try_send(NetEvent::PeerExpired { peer_id }) {
                    warn!(%e, "event channel full — dropping PeerExpired");
                }
            }
            Vec::new()
        }
    }
}
