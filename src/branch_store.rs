//! Branch store (component G): per-(branch, batch) hash map from k-mer key
//! to best score, bucketed by `key % N` as enumeration emits k-mers.
//!
//! Grounded on `original_source/ipk/src/branch_group.cpp` (`put`,
//! `kmer_batch`) and `original_source/build/src/branch_group.cpp` (the
//! position-bearing variant).

use fxhash::FxHashMap;

use crate::enumerate::ScoredKmer;

/// One k-mer's stored value: its best score, and optionally the alignment
/// position it was first observed at (spec §3's positioned variant).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoredValue {
    pub score: f32,
    pub position: Option<u16>,
}

/// A per-batch hash map for one original branch's node group. `put` keeps
/// the maximum score ever observed for a key (spec §4.G).
#[derive(Debug, Default, Clone)]
pub struct BranchBatchMap {
    entries: FxHashMap<u64, StoredValue>,
}

impl BranchBatchMap {
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

    pub fn iter(&self) -> impl Iterator<Item = (&u64, &StoredValue)> {
        self.entries.iter()
    }

    pub fn get(&self, key: u64) -> Option<&StoredValue> {
        self.entries.get(&key)
    }

    /// Insert `(key, score[, position])`, keeping the maximum score ever
    /// seen for `key`. A later, lower-scoring insert of the same key is a
    /// no-op; a higher-scoring one replaces both the score and position.
    pub fn put(&mut self, key: u64, score: f32, position: Option<u16>) {
        self.entries
            .entry(key)
            .and_modify(|existing| {
                if score > existing.score {
                    existing.score = score;
                    existing.position = position;
                }
            })
            .or_insert(StoredValue { score, position });
    }
}

/// A group of `num_batches` per-batch maps for one original branch's node
/// group, bucketing every emitted k-mer by `key % num_batches` as it
/// arrives (spec §4.G/§3's batch definition).
#[derive(Debug, Clone)]
pub struct BranchStore {
    batches: Vec<BranchBatchMap>,
}

impl BranchStore {
    pub fn new(num_batches: usize) -> Self {
        Self {
            batches: (0..num_batches).map(|_| BranchBatchMap::new()).collect(),
        }
    }

    pub fn num_batches(&self) -> usize {
        self.batches.len()
    }

    pub fn batch(&self, index: usize) -> &BranchBatchMap {
        &self.batches[index]
    }

    pub fn into_batches(self) -> Vec<BranchBatchMap> {
        self.batches
    }

    /// Bucket index for `key` (spec §3: `K mod N == b`).
    pub fn batch_index(&self, key: u64) -> usize {
        kmer_batch(key, self.batches.len())
    }

    /// Record one emitted k-mer into its bucket, with no position.
    pub fn put(&mut self, kmer: ScoredKmer) {
        let idx = self.batch_index(kmer.key);
        self.batches[idx].put(kmer.key, kmer.score, None);
    }

    /// Record one emitted k-mer with its alignment-column position.
    pub fn put_positioned(&mut self, kmer: ScoredKmer, position: u16) {
        let idx = self.batch_index(kmer.key);
        self.batches[idx].put(kmer.key, kmer.score, Some(position));
    }
}

/// Bucket index for `key` given `n_ranges` batches (spec §3/§4.G).
pub fn kmer_batch(key: u64, n_ranges: usize) -> usize {
    (key % n_ranges as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_keeps_max_score() {
        let mut map = BranchBatchMap::new();
        map.put(7, -1.0, None);
        map.put(7, -2.0, None); // worse score, ignored
        map.put(7, -0.5, None); // better score, kept
        assert_eq!(map.get(7).unwrap().score, -0.5);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_put_replaces_position_with_better_score() {
        let mut map = BranchBatchMap::new();
        map.put(1, -1.0, Some(3));
        map.put(1, -0.1, Some(9));
        let stored = map.get(1).unwrap();
        assert_eq!(stored.score, -0.1);
        assert_eq!(stored.position, Some(9));
    }

    #[test]
    fn test_batch_disjointness() {
        let store = BranchStore::new(32);
        for key in 0u64..1000 {
            assert_eq!(store.batch_index(key), (key % 32) as usize);
        }
    }

    #[test]
    fn test_branch_store_buckets_by_key_mod_n() {
        let mut store = BranchStore::new(4);
        store.put(ScoredKmer { key: 5, score: -0.1 });
        store.put(ScoredKmer { key: 9, score: -0.2 });
        assert_eq!(store.batch(1).len(), 2); // 5 % 4 == 1, 9 % 4 == 1
        assert_eq!(store.batch(0).len(), 0);
    }
}
