//! The node façade: composes the networking layer and the shard store,
//! owns their lifecycle, and registers the inbound stream handler.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;
use tracing::{debug, info};

use scatter_net::{NetEvent, NetInbound, ScatterNet};
use scatter_store::error::Result as StoreResult;
use scatter_store::{distribute, reconstruct, serve, ScatterStore};
use scatter_types::config::{NetConfig, StoreConfig};

pub struct Node {
    net: Arc<ScatterNet>,
    store: Arc<ScatterStore>,
}

impl Node {
    /// Bring the node up: start the swarm, open the store, and spawn the
    /// inbound-stream accept loop and the event logger.
    pub async fn start(net_config: NetConfig, store_config: StoreConfig) -> Result<Self> {
        let (net, inbound) = ScatterNet::new(net_config).await?;
        let store = Arc::new(ScatterStore::new(store_config)?);
        let net = Arc::new(net);

        let NetInbound {
            mut events,
            mut streams,
        } = inbound;

        // Every inbound transfer stream gets its own task.
        let accept_store = Arc::clone(&store);
        tokio::spawn(async move {
            while let Some((peer, stream)) = streams.next().await {
                tokio::spawn(serve::handle_stream(Arc::clone(&accept_store), peer, stream));
            }
            debug!("inbound stream acceptor finished");
        });

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                log_event(&event);
            }
        });

        info!(peer_id = %net.local_peer_id(), "scatter node started");
        Ok(Self { net, store })
    }

    pub fn store(&self) -> &Arc<ScatterStore> {
        &self.store
    }

    /// Split a content-addressed file and scatter its shards across the
    /// currently known peers.
    pub async fn distribute_file(&self, path: &Path) -> StoreResult<()> {
        let shards = self.store.split_and_register(path).await?;
        distribute::scatter_shards(
            Arc::clone(&self.net),
            self.store.config.shards_dir.clone(),
            shards,
        )
        .await;
        Ok(())
    }

    /// Reassemble the file for `digest` from local and peer-held shards.
    /// Returns the path of the merged file.
    pub async fn reconstruct(&self, digest: &str) -> StoreResult<PathBuf> {
        reconstruct::reconstruct(Arc::clone(&self.net), Arc::clone(&self.store), digest).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.net.shutdown().await
    }
}

fn log_event(event: &NetEvent) {
    match event {
        NetEvent::Listening { addr } => info!("LISTENING    {addr}"),
        NetEvent::PeerDiscovered { peer_id, addr } => info!("DISCOVERED   {peer_id}  addr={addr}"),
        NetEvent::PeerExpired { peer_id } => info!("EXPIRED      {peer_id}"),
        NetEvent::PeerConnected { peer_id } => info!("CONNECTED    {peer_id}"),
        NetEvent::PeerDisconnected { peer_id } => info!("DISCONNECTED {peer_id}"),
    }
}
