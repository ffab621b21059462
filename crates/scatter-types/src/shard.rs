//! The shard record and its on-disk / on-wire naming scheme.
//!
//! A shard is named `<digest>.<index>` where `<digest>` is the lower-case
//! hex SHA-256 of the whole file and `<index>` is the zero-based decimal
//! position of the slice. The name doubles as the filename inside the
//! shards directory and as the payload of `GET` / `SHARD` requests — it is
//! always a base name, never a path.

use serde::{Deserialize, Serialize};

/// Metadata for one contiguous slice of a content-addressed file.
///
/// Immutable once created. Every shard listed in the catalogue corresponds
/// to a file of `size` bytes at `<shards_dir>/<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    /// Zero-based position within the original file.
    pub index: u64,
    /// `<digest>.<index>` — catalogue key component and on-disk filename.
    pub name: String,
    /// Payload size in bytes. Equal to the shard size for every shard
    /// except possibly the one with the highest index.
    pub size: u64,
}

impl Shard {
    /// Build a shard record for `digest` at `index`.
    pub fn new(digest: &str, index: u64, size: u64) -> Self {
        Self {
            index,
            name: shard_name(digest, index),
            size,
        }
    }
}

/// Form the canonical shard name `<digest>.<index>`.
pub fn shard_name(digest: &str, index: u64) -> String {
    format!("{digest}.{index}")
}

/// A filename that does not follow the `<digest>.<index>` scheme.
#[derive(Debug, thiserror::Error)]
pub enum ShardNameError {
    #[error("shard name has no index suffix: {0}")]
    MissingIndex(String),

    #[error("shard name has a non-numeric index: {0}")]
    BadIndex(String),
}

/// Split a shard name into its digest and index parts.
///
/// Accepts any `<stem>.<decimal>` shape; callers that received the name
/// from an untrusted peer must still validate that it is path-free.
pub fn parse_shard_name(name: &str) -> Result<(&str, u64), ShardNameError> {
    let (digest, suffix) = name
        .rsplit_once('.')
        .ok_or_else(|| ShardNameError::MissingIndex(name.to_string()))?;
    if digest.is_empty() {
        return Err(ShardNameError::MissingIndex(name.to_string()));
    }
    let index = suffix
        .parse::<u64>()
        .map_err(|_| ShardNameError::BadIndex(name.to_string()))?;
    Ok((digest, index))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
