use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use libp2p::swarm::dial_opts::DialOpts;
use libp2p::{identify, mdns, swarm::SwarmEvent, Multiaddr, PeerId, SwarmBuilder};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use scatter_types::config::NetConfig;

use crate::behaviour::{MeshBehaviour, MeshBehaviourEvent};
use crate::discovery;
use crate::events::NetEvent;
use crate::peers::PeerDirectory;

// ── SwarmCommand ──────────────────────────────────────────────────────────────

/// Commands sent from the [`crate::ScatterNet`] handle into the running
/// swarm loop. The loop also sends itself `Dial` commands when scheduling
/// connection retries.
#[derive(Debug)]
pub enum SwarmCommand {
    /// (Re-)dial a peer whose address the directory knows.
    Dial { peer_id: PeerId },
    /// Exit the event loop cleanly.
    Shutdown,
}

/// Dial retry schedule after a failed outbound connection to a freshly
/// discovered peer.
const DIAL_BACKOFF: [Duration; 3] = [
    Duration::from_millis(500),
    Duration::from_millis(1000),
    Duration::from_millis(1500),
];

// ── MeshSwarm ─────────────────────────────────────────────────────────────────

/// Owns the [`libp2p::Swarm`] and the shared [`PeerDirectory`].
/// Constructed by [`MeshSwarm::build`] and consumed by [`MeshSwarm::run`].
pub struct MeshSwarm {
    inner: libp2p::Swarm<MeshBehaviour>,
    directory: Arc<PeerDirectory>,
    /// Retries already scheduled per peer; cleared on connection.
    dial_retries: HashMap<PeerId, usize>,
}

impl MeshSwarm {
    /// Construct and configure the swarm via the libp2p `SwarmBuilder` API.
    ///
    /// Transport:  QUIC (TLS 1.3 baked-in — no separate Noise step required)
    /// Behaviour:  mDNS + Identify + raw shard-transfer streams
    /// Listener:   `0.0.0.0:<config.listen_port>` (0 = OS-assigned)
    pub fn build(config: &NetConfig) -> Result<Self> {
        let mut swarm = SwarmBuilder::with_new_identity()
            .with_tokio()
            .with_quic()
            .with_behaviour(|key| {
                let mdns = mdns::tokio::Behaviour::new(
                    mdns::Config::default(),
                    key.public().to_peer_id(),
                )?;

                let identify = identify::Behaviour::new(identify::Config::new(
                    "/scatter/1.0.0".into(),
                    key.public(),
                ));

                let stream = libp2p_stream::Behaviour::new();

                Ok(MeshBehaviour {
                    mdns,
                    identify,
                    stream,
                })
            })?
            .with_swarm_config(|c| {
                // Keep idle QUIC connections alive between shard transfers.
                c.with_idle_connection_timeout(Duration::from_secs(60))
            })
            .build();

        let listen_addr: Multiaddr = format!("/ip4/0.0.0.0/udp/{}/quic-v1", config.listen_port)
            .parse()
            .context("invalid QUIC listen multiaddr")?;

        swarm
            .listen_on(listen_addr)
            .context("failed to bind QUIC listener")?;

        let directory = Arc::new(PeerDirectory::new(*swarm.local_peer_id()));

        Ok(Self {
            inner: swarm,
            directory,
            dial_retries: HashMap::new(),
        })
    }

    pub fn directory(&self) -> Arc<PeerDirectory> {
        Arc::clone(&self.directory)
    }

    pub fn local_peer_id(&self) -> PeerId {
        *self.inner.local_peer_id()
    }

    /// Fresh control handle for opening and accepting transfer streams.
    pub fn control(&self) -> libp2p_stream::Control {
        self.inner.behaviour().stream.new_control()
    }

    /// The core async event loop.
    ///
    /// Runs until a [`SwarmCommand::Shutdown`] is received or `cmd_rx` is
    /// dropped. `cmd_tx` is the loop's own sender, used to schedule delayed
    /// redials.
    pub async fn run(
        mut self,
        event_tx: mpsc::Sender<NetEvent>,
        cmd_tx: mpsc::Sender<SwarmCommand>,
        mut cmd_rx: mpsc::Receiver<SwarmCommand>,
    ) -> Result<()> {
        loop {
            tokio::select! {
                event = self.inner.select_next_some() => {
                    self.handle_swarm_event(event, &event_tx, &cmd_tx);
                }

                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(SwarmCommand::Dial { peer_id }) => self.dial_known_peer(peer_id),
                        Some(SwarmCommand::Shutdown) | None => {
                            info!("swarm event loop shutting down");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    // ── Dialing ───────────────────────────────────────────────────────────────

    fn dial_known_peer(&mut self, peer_id: PeerId) {
        let Some(addr) = self.directory.address_of(&peer_id) else {
            debug!(%peer_id, "dial requested for unknown peer");
            return;
        };
        let opts = DialOpts::peer_id(peer_id).addresses(vec![addr]).build();
        if let Err(e) = self.inner.dial(opts) {
            debug!(%peer_id, %e, "dial not started");
        }
    }

    /// Schedule a redial with backoff after a failed outbound attempt.
    /// Gives up after the schedule is exhausted.
    fn schedule_redial(&mut self, peer_id: PeerId, cmd_tx: &mpsc::Sender<SwarmCommand>) {
        if self.directory.address_of(&peer_id).is_none() {
            return;
        }
        let retries = self.dial_retries.entry(peer_id).or_insert(0);
        if *retries >= DIAL_BACKOFF.len() {
            warn!(%peer_id, "giving up on outbound connection");
            self.dial_retries.remove(&peer_id);
            return;
        }
        let delay = DIAL_BACKOFF[*retries];
        *retries += 1;

        debug!(%peer_id, ?delay, "scheduling redial");
        let tx = cmd_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(SwarmCommand::Dial { peer_id }).await;
        });
    }

    // ── Private event dispatcher ──────────────────────────────────────────────

    fn handle_swarm_event(
        &mut self,
        event: SwarmEvent<MeshBehaviourEvent>,
        event_tx: &mpsc::Sender<NetEvent>,
        cmd_tx: &mpsc::Sender<SwarmCommand>,
    ) {
        match event {
            // ── mDNS ──────────────────────────────────────────────────────────
            SwarmEvent::Behaviour(MeshBehaviourEvent::Mdns(e)) => {
                for peer_id in discovery::handle_mdns_event(e, &self.directory, event_tx) {
                    if self.inner.is_connected(&peer_id) {
                        // Already reachable (the other side connected first).
                        self.directory.on_connected(&peer_id);
                    } else if self.directory.should_initiate(&peer_id) {
                        self.dial_known_peer(peer_id);
                    }
                }
            }

            // ── Identify ──────────────────────────────────────────────────────
            SwarmEvent::Behaviour(MeshBehaviourEvent::Identify(e)) => {
                debug!(?e, "identify event");
            }

            SwarmEvent::Behaviour(_) => {}

            // ── Transport ─────────────────────────────────────────────────────
            SwarmEvent::NewListenAddr { address, .. } => {
                info!(%address, "listening on address");
                if let Err(e) = event_tx.try_send(NetEvent::Listening { addr: address }) {
                    warn!(%e, "event channel full — dropping Listening");
                }
            }

            SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                info!(%peer_id, "connection established");
                self.dial_retries.remove(&peer_id);
                self.directory.on_connected(&peer_id);
                if let Err(e) = event_tx.try_send(NetEvent::PeerConnected { peer_id }) {
                    warn!(%e, "event channel full — dropping PeerConnected");
                }
            }

            SwarmEvent::ConnectionClosed { peer_id, cause, .. } => {
                debug!(%peer_id, ?cause, "connection closed");
                self.directory.on_disconnected(&peer_id);
                if let Err(e) = event_tx.try_send(NetEvent::PeerDisconnected { peer_id }) {
                    warn!(%e, "event channel full — dropping PeerDisconnected");
                }
            }

            SwarmEvent::IncomingConnectionError { error, .. } => {
                warn!(%error, "incoming connection error");
            }

            SwarmEvent::OutgoingConnectionError {
                peer_id: Some(peer_id),
                error,
                ..
            } => {
                warn!(%peer_id, %error, "outgoing connection error");
                self.schedule_redial(peer_id, cmd_tx);
            }

            SwarmEvent::OutgoingConnectionError { error, .. } => {
                warn!(%error, "outgoing connection error (unknown peer)");
            }

            _ => {}
        }
    }
}
