//! The peer directory: every peer this node has ever discovered, with its
//! last-known address and a connectedness flag.
//!
//! Discovery callbacks and connection-state notifications from the swarm
//! loop write to it; the distribution and reconstruction engines read from
//! it. The flag is a fast path — the transport remains the ground truth and
//! keeps the flag current through connection events.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use libp2p::{Multiaddr, PeerId};

/// Interval between connectedness checks in [`PeerDirectory::wait_for_connection`].
const CONNECT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
struct PeerRecord {
    addr: Multiaddr,
    connected: bool,
}

/// Set of currently-known peers. All operations are brief; the mutex is
/// never held across I/O.
#[derive(Debug)]
pub struct PeerDirectory {
    local: PeerId,
    inner: Mutex<HashMap<PeerId, PeerRecord>>,
}

impl PeerDirectory {
    pub fn new(local: PeerId) -> Self {
        Self {
            local,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Record a discovered peer and its primary address. Idempotent; the
    /// local node itself is ignored. Returns `true` when the peer is new.
    pub fn on_peer_found(&self, peer_id: PeerId, addr: Multiaddr) -> bool {
        if peer_id == self.local {
            return false;
        }
        let mut inner = self.inner.lock().expect("peer directory lock poisoned");
        match inner.entry(peer_id) {
            std::collections::hash_map::Entry::Occupied(mut e) => {
                e.get_mut().addr = addr;
                false
            }
            std::collections::hash_map::Entry::Vacant(e) => {
                e.insert(PeerRecord {
                    addr,
                    connected: false,
                });
                true
            }
        }
    }

    /// Whether this node should initiate the connection to `peer_id`.
    ///
    /// Only the side whose identity string sorts less dials, so both sides
    /// do not race to connect at once. Heuristic, not a protocol guarantee:
    /// a simultaneous connect from the other side is tolerated.
    pub fn should_initiate(&self, peer_id: &PeerId) -> bool {
        self.local.to_string() < peer_id.to_string()
    }

    pub fn on_connected(&self, peer_id: &PeerId) {
        let mut inner = self.inner.lock().expect("peer directory lock poisoned");
        if let Some(rec) = inner.get_mut(peer_id) {
            rec.connected = true;
        }
    }

    pub fn on_disconnected(&self, peer_id: &PeerId) {
        let mut inner = self.inner.lock().expect("peer directory lock poisoned");
        if let Some(rec) = inner.get_mut(peer_id) {
            rec.connected = false;
        }
    }

    pub fn is_connected(&self, peer_id: &PeerId) -> bool {
        let inner = self.inner.lock().expect("peer directory lock poisoned");
        inner.get(peer_id).map(|r| r.connected).unwrap_or(false)
    }

    /// Poll until `peer_id` is connected or `timeout` elapses.
    pub async fn wait_for_connection(&self, peer_id: &PeerId, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.is_connected(peer_id) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(CONNECT_POLL_INTERVAL).await;
        }
    }

    /// Every known peer, whether currently up or not.
    pub fn peers(&self) -> Vec<PeerId> {
        let inner = self.inner.lock().expect("peer directory lock poisoned");
        inner.keys().copied().collect()
    }

    /// Last-known address for a peer, if any.
    pub fn address_of(&self, peer_id: &PeerId) -> Option<Multiaddr> {
        let inner = self.inner.lock().expect("peer directory lock poisoned");
        inner.get(peer_id).map(|r| r.addr.clone())
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.local
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> Multiaddr {
        "/ip4/192.168.1.7/udp/4001/quic-v1".parse().unwrap()
    }

    #[test]
    fn insert_is_idempotent_and_ignores_self() {
        let local = PeerId::random();
        let dir = PeerDirectory::new(local);
        let peer = PeerId::random();

        assert!(!dir.on_peer_found(local, addr()));
        assert!(dir.on_peer_found(peer, addr()));
        assert!(!dir.on_peer_found(peer, addr()));
        assert_eq!(dir.peers(), vec![peer]);
    }

    #[test]
    fn connectedness_flag_tracks_notifications() {
        let dir = PeerDirectory::new(PeerId::random());
        let peer = PeerId::random();
        dir.on_peer_found(peer, addr());

        assert!(!dir.is_connected(&peer));
        dir.on_connected(&peer);
        assert!(dir.is_connected(&peer));
        dir.on_disconnected(&peer);
        assert!(!dir.is_connected(&peer));
    }

    #[test]
    fn initiation_order_is_asymmetric() {
        let a = PeerId::random();
        let b = PeerId::random();
        let dir_a = PeerDirectory::new(a);
        let dir_b = PeerDirectory::new(b);
        // Exactly one side initiates.
        assert_ne!(dir_a.should_initiate(&b), dir_b.should_initiate(&a));
    }

    #[tokio::test]
    async fn wait_for_connection_times_out() {
        let dir = PeerDirectory::new(PeerId::random());
        let peer = PeerId::random();
        dir.on_peer_found(peer, addr());
        assert!(
            !dir.wait_for_connection(&peer, Duration::from_millis(250))
                .await
        );
    }

    #[tokio::test]
    async fn wait_for_connection_sees_flag() {
        let dir = std::sync::Arc::new(PeerDirectory::new(PeerId::random()));
        let peer = PeerId::random();
        dir.on_peer_found(peer, addr());

        let waiter = dir.clone();
        let handle =
            tokio::spawn(async move { waiter.wait_for_connection(&peer, Duration::from_secs(2)).await });
        tokio::time::sleep(Duration::from_millis(150)).await;
        dir.on_connected(&peer);
        assert!(handle.await.unwrap());
    }
}
