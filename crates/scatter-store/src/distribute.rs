//! The distribution engine — the "push" side of shard placement.
//!
//! Placement is deterministic round-robin by shard index over a snapshot of
//! the peer list: shard `i` goes to `peers[i % len]`. One copy per shard,
//! no acknowledgement, no verification that the peer retained it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use scatter_net::{push_shard, PeerId, ScatterNet};
use scatter_types::Shard;

use crate::error::Result;

/// How long a push task waits for a freshly discovered peer's connection
/// before opening the stream anyway (stream opening dials on demand).
const CONNECT_WAIT: Duration = Duration::from_secs(5);

/// Push every shard of a freshly split file to the peers currently known.
///
/// With no peers the file simply stays local — that is not an error.
/// Individual push failures are logged and never abort sibling transfers.
pub async fn scatter_shards(net: Arc<ScatterNet>, shards_dir: PathBuf, shards: Vec<Shard>) {
    let peers = net.directory().peers();
    if peers.is_empty() {
        info!("no peers available — shards stay local only");
        return;
    }

    info!(
        shards = shards.len(),
        peers = peers.len(),
        "distributing shards round-robin"
    );

    let mut tasks = JoinSet::new();
    for (i, shard) in shards.into_iter().enumerate() {
        let peer = peers[i % peers.len()];
        let net = Arc::clone(&net);
        let path = shards_dir.join(&shard.name);

        tasks.spawn(async move {
            match push_one(&net, peer, &shard, &path).await {
                Ok(()) => info!(shard = %shard.name, %peer, "shard pushed"),
                Err(e) => warn!(shard = %shard.name, %peer, %e, "failed to push shard"),
            }
        });
    }

    while tasks.join_next().await.is_some() {}
}

async fn push_one(net: &ScatterNet, peer: PeerId, shard: &Shard, path: &Path) -> Result<()> {
    if !net.directory().is_connected(&peer)
        && !net.directory().wait_for_connection(&peer, CONNECT_WAIT).await
    {
        debug!(%peer, "peer not connected yet — opening stream will dial");
    }

    let data = tokio::fs::read(path).await?;
    let stream = net.open_transfer_stream(peer).await?;
    push_shard(stream, &shard.name, &data).await?;
    Ok(())
}
