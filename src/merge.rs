//! Batch merger (component I): unions every branch's shard for one batch
//! into an in-memory batch-DB, `key -> [(branch, score[, position])]`.
//!
//! Grounded on `original_source/ipk/src/branch_group.cpp` (`merge_batch`).
//! No score combining happens here across branches: each branch's own
//! enumeration already kept the per-key maximum (spec §4.I), so a branch
//! appears at most once per key.

use fxhash::FxHashMap;
use std::path::Path;

use crate::error::Result;
use crate::shard;

/// One branch's contribution to a key in a batch-DB.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchEntry {
    pub branch: u32,
    pub score: f32,
    pub position: Option<u16>,
}

/// The union, for one batch, of every branch's per-key best score. Entries
/// are unique in `branch` per key (spec §3's batch-DB invariant).
#[derive(Debug, Default, Clone)]
pub struct BatchDb {
    entries: FxHashMap<u64, Vec<BatchEntry>>,
}

impl BatchDb {
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of `(key, branch)` entries across all keys.
    pub fn total_entries(&self) -> usize {
        self.entries.values().map(|v| v.len()).sum()
    }

    pub fn get(&self, key: u64) -> Option<&[BatchEntry]> {
        self.entries.get(&key).map(|v| v.as_slice())
    }

    pub fn keys(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &[BatchEntry])> {
        self.entries.iter().map(|(&k, v)| (k, v.as_slice()))
    }

    fn insert(&mut self, key: u64, entry: BatchEntry) {
        self.entries.entry(key).or_default().push(entry);
    }
}

/// Union every `branch_id`'s batch-`batch_idx` shard into one [`BatchDb`].
/// Missing shard files (a branch that never emitted into this batch) are
/// treated as an empty contribution, not an error.
pub fn merge_batch(
    working_dir: &Path,
    branch_ids: &[u32],
    batch_idx: usize,
    keep_positions: bool,
) -> Result<BatchDb> {
    let mut db = BatchDb::new();
    for &branch_id in branch_ids {
        let path = shard::shard_path(working_dir, branch_id, batch_idx);
        if !path.exists() {
            continue;
        }
        let map = shard::read_shard(&path, keep_positions)?;
        for (&key, value) in map.iter() {
            db.insert(
                key,
                BatchEntry {
                    branch: branch_id,
                    score: value.score,
                    position: value.position,
                },
            );
        }
    }
    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch_store::BranchBatchMap;
    use crate::shard::write_shard;
    use tempfile::tempdir;

    #[test]
    fn test_merge_batch_unions_branches() {
        let dir = tempdir().unwrap();

        let mut m0 = BranchBatchMap::new();
        m0.put(10, -0.3, None);
        write_shard(&shard::shard_path(dir.path(), 0, 2), &m0, false).unwrap();

        let mut m1 = BranchBatchMap::new();
        m1.put(10, -0.1, None);
        m1.put(20, -0.5, None);
        write_shard(&shard::shard_path(dir.path(), 1, 2), &m1, false).unwrap();

        let db = merge_batch(dir.path(), &[0, 1], 2, false).unwrap();
        assert_eq!(db.len(), 2);
        let entries = db.get(10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(db.get(20).unwrap().len(), 1);
    }

    #[test]
    fn test_merge_batch_missing_shard_is_not_an_error() {
        let dir = tempdir().unwrap();
        let db = merge_batch(dir.path(), &[0, 1, 2], 0, false).unwrap();
        assert!(db.is_empty());
    }

    #[test]
    fn test_entries_unique_per_branch_per_key() {
        let dir = tempdir().unwrap();
        let mut m0 = BranchBatchMap::new();
        m0.put(7, -0.2, None);
        write_shard(&shard::shard_path(dir.path(), 5, 0), &m0, false).unwrap();

        let db = merge_batch(dir.path(), &[5], 0, false).unwrap();
        let entries = db.get(7).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].branch, 5);
    }
}
