//! Splitting files into shards and merging shards back into files.
//!
//! Split maps the input read-only and hands each shard's byte range to its
//! own blocking task — positional slices, no shared cursor — so a large
//! upload fans out across the thread pool. Merge is deliberately two-phase:
//! shard contents load in parallel, but the output is written sequentially
//! in index order, because parallel writers would race on the file position.

use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinSet;

use scatter_types::{parse_shard_name, shard_name, Shard};

use crate::error::{Result, StoreError};

/// Fixed shard size. Every shard is exactly this many bytes except possibly
/// the one with the highest index.
pub const SHARD_SIZE: u64 = 1024 * 1024;

/// Index encoded in a shard name's `.<N>` suffix.
pub fn shard_index(name: &str) -> Result<u64> {
    let (_, index) = parse_shard_name(name)?;
    Ok(index)
}

/// Split the file at `file_path` into `ceil(size / SHARD_SIZE)` shards
/// inside `shards_dir`, named `<base>.<index>` after the file's base name
/// (which is its digest for content-addressed uploads).
///
/// Shards are processed in parallel and the result vector is filled at
/// index `i` by task `i`. A zero-byte file yields zero shards. On failure
/// partially written shards may remain on disk; there is no rollback.
pub async fn split(file_path: &Path, shards_dir: &Path) -> Result<Vec<Shard>> {
    let base = file_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| StoreError::Other(format!("unusable file name: {}", file_path.display())))?
        .to_string();

    tokio::fs::create_dir_all(shards_dir).await?;

    let size = tokio::fs::metadata(file_path).await?.len();
    let count = size.div_ceil(SHARD_SIZE);
    if count == 0 {
        return Ok(Vec::new());
    }

    let mapped = Arc::new(map_readonly(file_path)?);

    let mut tasks: JoinSet<Result<Shard>> = JoinSet::new();
    for index in 0..count {
        let mapped = Arc::clone(&mapped);
        let dir = shards_dir.to_path_buf();
        let name = shard_name(&base, index);
        tasks.spawn_blocking(move || {
            let start = index * SHARD_SIZE;
            let end = ((index + 1) * SHARD_SIZE).min(size);
            let segment = &mapped[start as usize..end as usize];
            std::fs::write(dir.join(&name), segment)?;
            Ok(Shard {
                index,
                name,
                size: end - start,
            })
        });
    }

    let mut slots: Vec<Option<Shard>> = vec![None; count as usize];
    while let Some(joined) = tasks.join_next().await {
        let shard = joined.map_err(|e| StoreError::Other(format!("shard writer panicked: {e}")))??;
        let slot = shard.index as usize;
        slots[slot] = Some(shard);
    }

    Ok(slots
        .into_iter()
        .map(|s| s.expect("each split task fills exactly its own slot"))
        .collect())
}

/// Merge `sorted_shards` into `<output_dir>/<output_name>`.
///
/// Pre-condition: ascending indices with no gaps from 0 — validated, a gap
/// fails the merge before any byte is written. Zero shards produce an empty
/// output file.
pub async fn merge(
    sorted_shards: &[Shard],
    output_dir: &Path,
    shards_dir: &Path,
    output_name: &str,
) -> Result<()> {
    for (position, shard) in sorted_shards.iter().enumerate() {
        if shard.index != position as u64 {
            return Err(StoreError::ShardGap {
                expected: position as u64,
                found: shard.index,
            });
        }
    }

    tokio::fs::create_dir_all(output_dir).await?;

    // Phase 1: load every shard into memory in parallel.
    let mut tasks: JoinSet<(usize, std::io::Result<Vec<u8>>)> = JoinSet::new();
    for (slot, shard) in sorted_shards.iter().enumerate() {
        let path = shards_dir.join(&shard.name);
        tasks.spawn(async move { (slot, tokio::fs::read(&path).await) });
    }

    let mut buffers: Vec<Option<Vec<u8>>> = vec![None; sorted_shards.len()];
    while let Some(joined) = tasks.join_next().await {
        let (slot, data) =
            joined.map_err(|e| StoreError::Other(format!("shard loader panicked: {e}")))?;
        buffers[slot] = Some(data?);
    }

    // Phase 2: write sequentially in index order.
    let mut out = tokio::fs::File::create(output_dir.join(output_name)).await?;
    for buffer in buffers {
        let buffer = buffer.expect("each loader task fills exactly its own slot");
        out.write_all(&buffer).await?;
    }
    out.flush().await?;
    Ok(())
}

/// Map an existing file read-only.
///
/// The shards directory is write-once per name and uploaded originals are
/// content-addressed, so the mapping cannot observe a concurrent truncation
/// from this process.
fn map_readonly(path: &Path) -> Result<Mmap> {
    let file = std::fs::File::open(path)?;
    // SAFETY: see above — the node never rewrites a file it is splitting.
    let mapped = unsafe { Mmap::map(&file)? };
    Ok(mapped)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
