//! The reconstruction engine — assembling a file from shards held locally
//! and by peers.
//!
//! Both fan-out phases follow the same shape: worker tasks send results
//! through a channel, a single collector task owns the aggregate (the
//! monotone maximum, then the catalogue insertions), the workers are
//! joined, the channel closed, and the collector joined. Merging never
//! starts before the collector has drained.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use scatter_net::{fetch_max_index, fetch_shard, PeerId, ScatterNet, TransferError};
use scatter_types::{shard_name, Shard};

use crate::error::{Result, StoreError};
use crate::manifest::{self, DistributionManifest};
use crate::{codec, ScatterStore};

/// Reassemble the file for `digest` into `<dest_dir>/<digest>`.
///
/// Fails with [`StoreError::NotFound`] when neither this node nor any peer
/// has a single shard, and with [`StoreError::IncompleteReconstruction`]
/// when some index in `[0, max]` could not be fetched — merging a gapped
/// sequence would silently produce a corrupt file.
pub async fn reconstruct(
    net: Arc<ScatterNet>,
    store: Arc<ScatterStore>,
    digest: &str,
) -> Result<PathBuf> {
    // Make the entry exist up front so concurrent insertions below never
    // race on creation.
    store.catalogue.init_if_absent(digest);

    let manifest = load_manifest(&store, digest).await;

    // A manifest recording zero shards means the digest is known and is the
    // empty file. There is no index to discover and nothing to fetch; an
    // index-based discovery would misread this as an unknown digest.
    if manifest.as_ref().is_some_and(|m| m.shard_count == 0) {
        info!(%digest, "zero-shard manifest — merging the empty file");
        return merge_empty(&store, digest).await;
    }

    let max = discover_max_index(&net, &store, digest, manifest.as_ref()).await?;
    info!(%digest, max, "discovered highest shard index");

    fetch_missing(&net, &store, digest, max).await;

    finalize(&store, digest, max).await
}

// ── Phase 1: max-index discovery ──────────────────────────────────────────────

/// Load the distribution manifest written when this node split the file
/// itself, if any.
async fn load_manifest(store: &ScatterStore, digest: &str) -> Option<DistributionManifest> {
    match manifest::read_manifest(&store.config.shards_dir, digest).await {
        Ok(m) => m,
        Err(e) => {
            warn!(%digest, %e, "unreadable distribution manifest — ignoring");
            None
        }
    }
}

/// Highest shard index known locally, from the catalogue or the local
/// distribution manifest.
fn local_max_index(
    store: &ScatterStore,
    digest: &str,
    manifest: Option<&DistributionManifest>,
) -> Option<u64> {
    let from_catalogue = store.catalogue.max_index(digest);
    let from_manifest = manifest.and_then(|m| m.shard_count.checked_sub(1));
    match (from_catalogue, from_manifest) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Seed with the local maximum, then fan `MAX_INDEX` out to every peer. A
/// single collector owns the running maximum; replies arriving in any order
/// keep the greatest seen so far. A slow peer cannot stall discovery beyond
/// the stream-establishment timeout.
async fn discover_max_index(
    net: &Arc<ScatterNet>,
    store: &ScatterStore,
    digest: &str,
    manifest: Option<&DistributionManifest>,
) -> Result<u64> {
    let seed = local_max_index(store, digest, manifest);

    let peers = net.directory().peers();
    if peers.is_empty() {
        debug!(%digest, "no peers known — using local max index");
        return seed.ok_or_else(|| StoreError::NotFound(digest.to_string()));
    }

    let (tx, mut rx) = mpsc::channel::<u64>(peers.len());

    let mut workers = JoinSet::new();
    for peer in peers {
        let net = Arc::clone(net);
        let tx = tx.clone();
        let digest = digest.to_string();
        workers.spawn(async move {
            match query_peer_max(&net, peer, &digest).await {
                Ok(index) => {
                    debug!(%peer, index, "peer reported max index");
                    let _ = tx.send(index).await;
                }
                Err(TransferError::NotFound) => debug!(%peer, "peer has no shards for digest"),
                Err(e) => warn!(%peer, %e, "max-index query failed"),
            }
        });
    }
    drop(tx);

    let collector = tokio::spawn(async move {
        let mut max = seed;
        while let Some(index) = rx.recv().await {
            max = Some(max.map_or(index, |m| m.max(index)));
        }
        max
    });

    while workers.join_next().await.is_some() {}
    let max = collector
        .await
        .map_err(|e| StoreError::Other(format!("max-index collector panicked: {e}")))?;

    max.ok_or_else(|| StoreError::NotFound(digest.to_string()))
}

async fn query_peer_max(
    net: &ScatterNet,
    peer: PeerId,
    digest: &str,
) -> std::result::Result<u64, TransferError> {
    let stream = net.open_transfer_stream(peer).await?;
    fetch_max_index(stream, digest).await
}

// ── Phase 2: fetching missing shards ──────────────────────────────────────────

/// Fetch every index in `[0, max]` the catalogue does not already list.
/// Each fetch task walks the peer list until one peer replies `OK`; the
/// received bytes land in the shards directory and the record flows through
/// the collector into the catalogue. An index no peer can provide is
/// skipped here — [`finalize`] decides whether that is fatal.
async fn fetch_missing(net: &Arc<ScatterNet>, store: &Arc<ScatterStore>, digest: &str, max: u64) {
    let peers = net.directory().peers();

    let (tx, mut rx) = mpsc::channel::<Shard>((max as usize + 1).min(64));

    let mut workers = JoinSet::new();
    for index in 0..=max {
        if store.catalogue.has_index(digest, index) {
            debug!(%digest, index, "already have shard — skipping");
            continue;
        }
        if peers.is_empty() {
            break;
        }

        let net = Arc::clone(net);
        let store = Arc::clone(store);
        let peers = peers.clone();
        let tx = tx.clone();
        let name = shard_name(digest, index);

        workers.spawn(async move {
            if let Some(shard) = fetch_one(&net, &store, &peers, &name, index).await {
                let _ = tx.send(shard).await;
            }
        });
    }
    drop(tx);

    let collector_store = Arc::clone(store);
    let collector_digest = digest.to_string();
    let collector = tokio::spawn(async move {
        while let Some(shard) = rx.recv().await {
            if !collector_store.catalogue.insert(&collector_digest, shard) {
                debug!("duplicate shard receipt dropped");
            }
        }
    });

    while workers.join_next().await.is_some() {}
    let _ = collector.await;
}

/// Try peers in order until one provides the shard. `NOT FOUND` moves on to
/// the next peer; a transport or I/O failure abandons the index.
async fn fetch_one(
    net: &ScatterNet,
    store: &ScatterStore,
    peers: &[PeerId],
    name: &str,
    index: u64,
) -> Option<Shard> {
    for peer in peers {
        let stream = match net.open_transfer_stream(*peer).await {
            Ok(s) => s,
            Err(e) => {
                warn!(%peer, shard = %name, %e, "could not reach peer");
                continue;
            }
        };
        match fetch_shard(stream, name).await {
            Ok(bytes) => {
                let path = store.config.shards_dir.join(name);
                if let Err(e) = tokio::fs::write(&path, &bytes).await {
                    warn!(shard = %name, %e, "failed to store fetched shard");
                    return None;
                }
                info!(shard = %name, %peer, bytes = bytes.len(), "shard fetched");
                return Some(Shard {
                    index,
                    name: name.to_string(),
                    size: bytes.len() as u64,
                });
            }
            Err(TransferError::NotFound) => {
                debug!(%peer, shard = %name, "peer does not have shard");
                continue;
            }
            Err(e) => {
                warn!(%peer, shard = %name, %e, "shard fetch failed");
                return None;
            }
        }
    }
    warn!(shard = %name, "no peer provided the shard");
    None
}

// ── Phase 3: completeness check and merge ─────────────────────────────────────

/// Merge the zero-shard sequence for a digest known to be the empty file.
async fn merge_empty(store: &ScatterStore, digest: &str) -> Result<PathBuf> {
    codec::merge(&[], &store.config.dest_dir, &store.config.shards_dir, digest).await?;
    Ok(store.config.dest_dir.join(digest))
}

/// Snapshot the catalogue entry, refuse gaps, merge.
async fn finalize(store: &ScatterStore, digest: &str, max: u64) -> Result<PathBuf> {
    let shards = store.catalogue.snapshot(digest);
    if shards.is_empty() {
        return Err(StoreError::NotFound(digest.to_string()));
    }

    let missing = missing_indices(&shards, max);
    if !missing.is_empty() {
        return Err(StoreError::IncompleteReconstruction {
            digest: digest.to_string(),
            missing,
        });
    }

    codec::merge(
        &shards,
        &store.config.dest_dir,
        &store.config.shards_dir,
        digest,
    )
    .await?;

    Ok(store.config.dest_dir.join(digest))
}

/// Indices in `[0, max]` absent from a snapshot.
fn missing_indices(sorted_shards: &[Shard], max: u64) -> Vec<u64> {
    let have: std::collections::BTreeSet<u64> = sorted_shards.iter().map(|s| s.index).collect();
    (0..=max).filter(|i| !have.contains(i)).collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use scatter_types::config::StoreConfig;

    fn store_in(dir: &std::path::Path) -> Arc<ScatterStore> {
        Arc::new(
            ScatterStore::new(StoreConfig {
                shards_dir: dir.join("shards"),
                dest_dir: dir.join("out"),
            })
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn zero_shard_manifest_is_the_empty_file_not_an_unknown_digest() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        // Splitting an empty original records shard_count == 0.
        let digest = crate::digest::sha256_hex(b"");
        let original = dir.path().join(&digest);
        tokio::fs::write(&original, b"").await.unwrap();
        store.split_and_register(&original).await.unwrap();

        let manifest = load_manifest(&store, &digest).await.unwrap();
        assert_eq!(manifest.shard_count, 0);
        // Index-based discovery has nothing to offer here.
        assert_eq!(local_max_index(&store, &digest, Some(&manifest)), None);

        let out = merge_empty(&store, &digest).await.unwrap();
        assert_eq!(tokio::fs::read(out).await.unwrap(), Vec::<u8>::new());
    }

    #[tokio::test]
    async fn manifest_raises_the_local_max_index() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        store.catalogue.insert("cafe", Shard::new("cafe", 1, 1));
        let manifest = DistributionManifest {
            digest: "cafe".into(),
            shard_count: 4,
            total_size: 4,
        };

        assert_eq!(local_max_index(&store, "cafe", None), Some(1));
        assert_eq!(local_max_index(&store, "cafe", Some(&manifest)), Some(3));
        assert_eq!(local_max_index(&store, "beef", None), None);
    }

    #[test]
    fn missing_indices_finds_gaps() {
        let shards = vec![
            Shard::new("d", 0, 1),
            Shard::new("d", 2, 1),
            Shard::new("d", 5, 1),
        ];
        assert_eq!(missing_indices(&shards, 5), vec![1, 3, 4]);
        assert_eq!(missing_indices(&shards[..1], 0), Vec::<u64>::new());
    }

    #[tokio::test]
    async fn finalize_merges_a_complete_local_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let data: Vec<u8> = (0..1_600_000u32).map(|i| (i % 239) as u8).collect();
        let digest = crate::digest::sha256_hex(&data);
        let original = dir.path().join(&digest);
        tokio::fs::write(&original, &data).await.unwrap();

        // All shards local: the zero-peer reconstruction path.
        let shards = codec::split(&original, &store.config.shards_dir).await.unwrap();
        let max = shards.len() as u64 - 1;
        store.catalogue.init_if_absent(&digest);
        for shard in shards {
            store.catalogue.insert(&digest, shard);
        }

        let out = finalize(&store, &digest, max).await.unwrap();
        assert_eq!(tokio::fs::read(out).await.unwrap(), data);
    }

    #[tokio::test]
    async fn finalize_reports_not_found_for_empty_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.catalogue.init_if_absent("cafe");

        assert!(matches!(
            finalize(&store, "cafe", 0).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn finalize_refuses_incomplete_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        store.catalogue.insert("cafe", Shard::new("cafe", 0, 1));
        store.catalogue.insert("cafe", Shard::new("cafe", 2, 1));

        match finalize(&store, "cafe", 2).await {
            Err(StoreError::IncompleteReconstruction { missing, .. }) => {
                assert_eq!(missing, vec![1]);
            }
            other => panic!("expected IncompleteReconstruction, got {other:?}"),
        }
    }
}
