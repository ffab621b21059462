//! The shard catalogue: one concurrent map from file digest to the shards
//! this node knows about for that file.
//!
//! The catalogue is the single source of truth — the HTTP layer, the
//! reconstruction engine, and the inbound stream handler all mutate the same
//! logical map, and none of them read it directly. Writers serialise on one
//! lock; readers proceed concurrently; the lock is never held across I/O.
//! Not persisted — rebuilt from scratch each node start.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use scatter_types::Shard;

/// Per-digest entry, keyed by shard index. The `BTreeMap` key makes index
/// uniqueness and sorted snapshots structural rather than checked.
type FileEntry = BTreeMap<u64, Shard>;

#[derive(Debug, Default)]
pub struct ShardCatalogue {
    entries: RwLock<HashMap<String, FileEntry>>,
}

impl ShardCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure an entry exists for `digest`, empty if new, so later
    /// insertions from concurrent fetch tasks never race on creation.
    pub fn init_if_absent(&self, digest: &str) {
        let mut entries = self.entries.write().expect("catalogue lock poisoned");
        entries.entry(digest.to_string()).or_default();
    }

    /// Add a shard to the digest's entry. A shard whose index is already
    /// present is silently dropped, keeping the first writer's record.
    /// Returns whether the shard was inserted.
    pub fn insert(&self, digest: &str, shard: Shard) -> bool {
        let mut entries = self.entries.write().expect("catalogue lock poisoned");
        let entry = entries.entry(digest.to_string()).or_default();
        match entry.entry(shard.index) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(shard);
                true
            }
        }
    }

    /// Largest index recorded for `digest`. `None` ⇔ the entry is empty or
    /// absent (encoded as `NOT FOUND` on the wire).
    pub fn max_index(&self, digest: &str) -> Option<u64> {
        let entries = self.entries.read().expect("catalogue lock poisoned");
        entries
            .get(digest)
            .and_then(|entry| entry.keys().next_back().copied())
    }

    pub fn has_index(&self, digest: &str, index: u64) -> bool {
        let entries = self.entries.read().expect("catalogue lock poisoned");
        entries
            .get(digest)
            .map(|entry| entry.contains_key(&index))
            .unwrap_or(false)
    }

    /// Owned copy of the digest's shards, sorted ascending by index, so
    /// downstream code never holds the lock.
    pub fn snapshot(&self, digest: &str) -> Vec<Shard> {
        let entries = self.entries.read().expect("catalogue lock poisoned");
        entries
            .get(digest)
            .map(|entry| entry.values().cloned().collect())
            .unwrap_or_default()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
