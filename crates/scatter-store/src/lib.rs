pub mod catalogue;
pub mod codec;
pub mod digest;
pub mod distribute;
pub mod error;
pub mod manifest;
pub mod reconstruct;
pub mod serve;

pub use catalogue::ShardCatalogue;
pub use codec::SHARD_SIZE;
pub use error::StoreError;
pub use manifest::DistributionManifest;

use std::path::Path;

use tracing::info;

use scatter_types::config::StoreConfig;
use scatter_types::Shard;

use crate::error::Result;

/// Top-level API for the scatter shard storage layer: the shards directory
/// on disk plus the in-memory catalogue describing it.
///
/// The catalogue is this node's only view of the map — the HTTP layer, the
/// engines, and the inbound stream handler all go through it.
pub struct ScatterStore {
    pub config: StoreConfig,
    pub catalogue: ShardCatalogue,
}

impl ScatterStore {
    /// Open (or create) the store's directories.
    pub fn new(config: StoreConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.shards_dir)?;
        std::fs::create_dir_all(&config.dest_dir)?;
        Ok(Self {
            config,
            catalogue: ShardCatalogue::new(),
        })
    }

    /// Split a content-addressed file (its base name is its digest) into
    /// the shards directory, register every shard in the catalogue, and
    /// record the true shard count in a distribution manifest.
    ///
    /// Re-uploading the same file overwrites the shard files with identical
    /// bytes and leaves the catalogue entry unchanged.
    pub async fn split_and_register(&self, file_path: &Path) -> Result<Vec<Shard>> {
        let digest = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StoreError::Other(format!("unusable file name: {}", file_path.display())))?
            .to_string();

        let shards = codec::split(file_path, &self.config.shards_dir).await?;

        self.catalogue.init_if_absent(&digest);
        for shard in &shards {
            self.catalogue.insert(&digest, shard.clone());
        }

        let total_size = shards.iter().map(|s| s.size).sum();
        manifest::write_manifest(
            &self.config.shards_dir,
            &DistributionManifest {
                digest: digest.clone(),
                shard_count: shards.len() as u64,
                total_size,
            },
        )
        .await?;

        info!(%digest, shards = shards.len(), total_size, "file split and registered");
        Ok(shards)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
