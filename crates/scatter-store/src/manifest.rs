//! Local distribution manifests.
//!
//! `MAX_INDEX` replies only reflect what each peer currently holds, so a
//! node reconstructing a file it once split could under-count shards if the
//! highest-index shard went missing from every peer. Recording the true
//! shard count at split time closes that gap for files this node
//! originated. The manifest never travels over the wire.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionManifest {
    /// SHA-256 hex of the whole file.
    pub digest: String,
    /// Number of shards the file splits into.
    pub shard_count: u64,
    /// Original file size in bytes.
    pub total_size: u64,
}

/// `<shards_dir>/<digest>.manifest.json` — the `.json` suffix keeps the
/// name unparseable as a shard, so inbound handlers never mistake it.
pub fn manifest_path(shards_dir: &Path, digest: &str) -> PathBuf {
    shards_dir.join(format!("{digest}.manifest.json"))
}

pub async fn write_manifest(shards_dir: &Path, manifest: &DistributionManifest) -> Result<()> {
    let body = serde_json::to_vec_pretty(manifest)
        .map_err(|e| StoreError::Other(format!("manifest serialization: {e}")))?;
    tokio::fs::write(manifest_path(shards_dir, &manifest.digest), body).await?;
    Ok(())
}

/// Load the manifest for `digest`, or `None` when this node never split the
/// file.
pub async fn read_manifest(
    shards_dir: &Path,
    digest: &str,
) -> Result<Option<DistributionManifest>> {
    let path = manifest_path(shards_dir, digest);
    let data = match tokio::fs::read(&path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let manifest = serde_json::from_slice(&data)
        .map_err(|e| StoreError::Other(format!("manifest deserialization: {e}")))?;
    Ok(Some(manifest))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn manifest_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = DistributionManifest {
            digest: "ab".repeat(32),
            shard_count: 3,
            total_size: 2_621_440,
        };

        write_manifest(dir.path(), &manifest).await.unwrap();
        let loaded = read_manifest(dir.path(), &manifest.digest).await.unwrap();
        assert_eq!(loaded, Some(manifest));
    }

    #[tokio::test]
    async fn missing_manifest_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_manifest(dir.path(), "cafe").await.unwrap(), None);
    }

    #[test]
    fn manifest_filename_never_parses_as_a_shard() {
        let path = manifest_path(Path::new("shards"), "cafe");
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(scatter_types::parse_shard_name(name).is_err());
    }
}
