// ── Module declarations ───────────────────────────────────────────────────────

pub mod behaviour;
pub mod discovery;
pub mod events;
pub mod peers;
pub mod swarm;
pub mod transfer;

// ── Public re-exports ─────────────────────────────────────────────────────────

pub use events::NetEvent;
pub use peers::PeerDirectory;
pub use transfer::{
    fetch_max_index, fetch_shard, push_shard, Request, Status, TransferError, ESTABLISH_TIMEOUT,
    TRANSFER_PROTOCOL,
};

/// Re-exported so downstream crates can name peers without a direct libp2p
/// dependency.
pub use libp2p::PeerId;

// ── Imports ───────────────────────────────────────────────────────────────────

use std::sync::Arc;

use anyhow::Result;
use libp2p_stream::{Control, IncomingStreams};
use tokio::sync::mpsc;

use scatter_types::config::NetConfig;

use crate::swarm::{MeshSwarm, SwarmCommand};

/// Internal channel buffer. 256 slots absorbs short bursts without dropping
/// events under normal LAN conditions.
const CHANNEL_CAPACITY: usize = 256;

// ── ScatterNet ────────────────────────────────────────────────────────────────

/// The receiving ends of the networking layer, handed to whoever composes
/// the node: domain events from the swarm loop, and inbound shard-transfer
/// streams to dispatch one task each.
pub struct NetInbound {
    pub events: mpsc::Receiver<NetEvent>,
    pub streams: IncomingStreams,
}

/// Top-level handle to the scatter P2P networking layer.
///
/// Owns the command channel into a background `tokio` task running the
/// [`swarm::MeshSwarm`] event loop. Shard-transfer streams bypass the
/// command channel entirely: the [`Control`] handle opens outbound streams
/// directly against the stream behaviour.
///
/// Cheap to share behind an `Arc`; the inbound halves travel separately in
/// [`NetInbound`].
pub struct ScatterNet {
    cmd_tx: mpsc::Sender<SwarmCommand>,
    control: Control,
    directory: Arc<PeerDirectory>,
    local_peer_id: PeerId,
}

impl ScatterNet {
    /// Build the swarm, register the transfer protocol, and spawn the event
    /// loop task. Returns immediately — the swarm runs concurrently.
    pub async fn new(config: NetConfig) -> Result<(Self, NetInbound)> {
        let mesh = MeshSwarm::build(&config)?;
        let directory = mesh.directory();
        let local_peer_id = mesh.local_peer_id();

        let mut control = mesh.control();
        let streams = control
            .accept(TRANSFER_PROTOCOL)
            .map_err(|e| anyhow::anyhow!("transfer protocol already registered: {e}"))?;

        let (event_tx, event_rx) = mpsc::channel::<NetEvent>(CHANNEL_CAPACITY);
        let (cmd_tx, cmd_rx) = mpsc::channel::<SwarmCommand>(CHANNEL_CAPACITY);

        let loop_cmd_tx = cmd_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = mesh.run(event_tx, loop_cmd_tx, cmd_rx).await {
                tracing::error!(%e, "swarm event loop exited with error");
            }
        });

        Ok((
            Self {
                cmd_tx,
                control,
                directory,
                local_peer_id,
            },
            NetInbound {
                events: event_rx,
                streams,
            },
        ))
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    /// The shared peer directory, updated live by the swarm loop.
    pub fn directory(&self) -> &PeerDirectory {
        &self.directory
    }

    /// Open a fresh shard-transfer stream to `peer_id`, dialing if needed,
    /// bounded by [`ESTABLISH_TIMEOUT`].
    pub async fn open_transfer_stream(
        &self,
        peer_id: PeerId,
    ) -> Result<libp2p::Stream, TransferError> {
        let mut control = self.control.clone();
        match tokio::time::timeout(
            ESTABLISH_TIMEOUT,
            control.open_stream(peer_id, TRANSFER_PROTOCOL),
        )
        .await
        {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(TransferError::Transport(format!(
                "failed to open stream to {peer_id}: {e}"
            ))),
            Err(_) => Err(TransferError::Transport(format!(
                "stream to {peer_id} not established within {ESTABLISH_TIMEOUT:?}"
            ))),
        }
    }

    /// Signal the swarm loop to shut down gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.cmd_tx
            .send(SwarmCommand::Shutdown)
            .await
            .map_err(|_| anyhow::anyhow!("swarm task already stopped"))
    }
}
