use std::io;

use scatter_net::TransferError;
use scatter_types::ShardNameError;

/// Crate-local error type for `scatter-store` operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A filename that should have been `<digest>.<index>` was not. The
    /// offending shard is skipped from catalogue updates.
    #[error(transparent)]
    InvalidShardName(#[from] ShardNameError),

    /// No shard for the digest exists locally or on any peer.
    #[error("no shards found for digest {0}")]
    NotFound(String),

    /// Some indices could not be fetched from any peer; merging would
    /// produce a corrupt file.
    #[error("reconstruction of {digest} is missing shard indices {missing:?}")]
    IncompleteReconstruction { digest: String, missing: Vec<u64> },

    /// A merge input that skipped an index.
    #[error("shard sequence has a gap: expected index {expected}, found {found}")]
    ShardGap { expected: u64, found: u64 },

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StoreError>;
