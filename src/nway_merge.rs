//! N-way external merger (component K): merges N sorted batch-DBs into the
//! global `filter_value`-ordered stream that becomes the final PKDB.
//!
//! Grounded on `original_source/ipk/src/db_builder.cpp`
//! (`filter_in_ram`'s `std::priority_queue<kmer_fv, ..., std::greater<>>`
//! loop for the in-RAM mode, `merge_stage2`'s `batch_loader` priority queue
//! for the on-disk mode). Both modes share the same min-heap merge shape;
//! only where the `(key, entries)` payload comes from differs.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::Result;
use crate::merge::BatchDb;

/// One branch's entry inside a merged record, independent of the batch it
/// came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergedEntry {
    pub branch: u32,
    pub score: f32,
    pub position: Option<u16>,
}

/// One fully-merged record: a key, its filter value, and every branch
/// entry for it (spec §4.K).
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRecord {
    pub key: u64,
    pub filter_value: f32,
    pub entries: Vec<MergedEntry>,
}

/// Min-heap key: orders ascending by `filter_value`, ties broken by
/// ascending `key` (spec §9's Open Question resolution), then by
/// originating batch for full determinism. `BinaryHeap` is a max-heap, so
/// [`Ord`] is implemented reversed to make `pop()` return the smallest.
#[derive(Debug, Clone, Copy)]
struct HeapKey {
    filter_value: f32,
    key: u64,
    batch_idx: usize,
}

impl PartialEq for HeapKey {
    fn eq(&self, other: &Self) -> bool {
        self.filter_value == other.filter_value && self.key == other.key && self.batch_idx == other.batch_idx
    }
}
impl Eq for HeapKey {}

impl PartialOrd for HeapKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .filter_value
            .total_cmp(&self.filter_value)
            .then_with(|| other.key.cmp(&self.key))
            .then_with(|| other.batch_idx.cmp(&self.batch_idx))
    }
}

/// In-RAM N-way merge (spec §4.K mode (a)): every batch-DB, plus its own
/// ascending-filter-value key order (from [`crate::filter::calc_filter_values`]),
/// coexists in memory. Calls `sink` once per merged record, in globally
/// ascending `filter_value` order.
pub fn merge_in_ram(
    batches: &[(BatchDb, Vec<(u64, f32)>)],
    mut sink: impl FnMut(MergedRecord) -> Result<()>,
) -> Result<()> {
    let mut cursors = vec![0usize; batches.len()];
    let mut heap = BinaryHeap::new();

    for (batch_idx, (_, order)) in batches.iter().enumerate() {
        if let Some(&(key, filter_value)) = order.first() {
            heap.push(HeapKey {
                filter_value,
                key,
                batch_idx,
            });
        }
    }

    while let Some(top) = heap.pop() {
        let (db, order) = &batches[top.batch_idx];
        let entries = db
            .get(top.key)
            .unwrap_or(&[])
            .iter()
            .map(|e| MergedEntry {
                branch: e.branch,
                score: e.score,
                position: e.position,
            })
            .collect();
        sink(MergedRecord {
            key: top.key,
            filter_value: top.filter_value,
            entries,
        })?;

        cursors[top.batch_idx] += 1;
        if let Some(&(next_key, next_fv)) = order.get(cursors[top.batch_idx]) {
            heap.push(HeapKey {
                filter_value: next_fv,
                key: next_key,
                batch_idx: top.batch_idx,
            });
        }
    }

    Ok(())
}

/// `<working_dir>/hashmaps/<batch_idx>.batchdb`: one batch-DB serialized in
/// ascending `filter_value` order, for the on-disk merge mode.
pub fn batch_db_path(working_dir: &Path, batch_idx: usize) -> std::path::PathBuf {
    crate::shard::hashmaps_dir(working_dir).join(format!("{batch_idx}.batchdb"))
}

/// Serialize one batch-DB to disk in the order given by `order` (already
/// sorted ascending by filter value): `key, filter_value, n_entries, then
/// (branch, score[, position])*`.
pub fn write_batch_db(
    path: &Path,
    db: &BatchDb,
    order: &[(u64, f32)],
    keep_positions: bool,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(path)?;
    let mut writer = BufWriter::new(file);
    for &(key, filter_value) in order {
        let entries = db.get(key).unwrap_or(&[]);
        writer.write_all(&key.to_le_bytes())?;
        writer.write_all(&filter_value.to_le_bytes())?;
        writer.write_all(&(entries.len() as u64).to_le_bytes())?;
        for entry in entries {
            writer.write_all(&entry.branch.to_le_bytes())?;
            writer.write_all(&entry.score.to_le_bytes())?;
            if keep_positions {
                let position = entry.position.unwrap_or(0);
                writer.write_all(&position.to_le_bytes())?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}

/// Lazily streams records out of one `.batchdb` file, one at a time,
/// buffering only the current record (spec §4.K: "a lazy loader streams
/// records sequentially with small buffers").
struct BatchLoader {
    reader: BufReader<fs::File>,
    keep_positions: bool,
    current: Option<MergedRecord>,
}

impl BatchLoader {
    fn open(path: &Path, keep_positions: bool) -> Result<Self> {
        let file = fs::File::open(path)?;
        let mut loader = Self {
            reader: BufReader::new(file),
            keep_positions,
            current: None,
        };
        loader.advance()?;
        Ok(loader)
    }

    fn advance(&mut self) -> Result<()> {
        self.current = self.read_one()?;
        Ok(())
    }

    fn read_one(&mut self) -> Result<Option<MergedRecord>> {
        let mut key_buf = [0u8; 8];
        match self.reader.read_exact(&mut key_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let key = u64::from_le_bytes(key_buf);

        let mut fv_buf = [0u8; 4];
        self.reader.read_exact(&mut fv_buf)?;
        let filter_value = f32::from_le_bytes(fv_buf);

        let mut n_buf = [0u8; 8];
        self.reader.read_exact(&mut n_buf)?;
        let n_entries = u64::from_le_bytes(n_buf);

        let mut entries = Vec::with_capacity(n_entries as usize);
        for _ in 0..n_entries {
            let mut branch_buf = [0u8; 4];
            self.reader.read_exact(&mut branch_buf)?;
            let branch = u32::from_le_bytes(branch_buf);

            let mut score_buf = [0u8; 4];
            self.reader.read_exact(&mut score_buf)?;
            let score = f32::from_le_bytes(score_buf);

            let position = if self.keep_positions {
                let mut pos_buf = [0u8; 2];
                self.reader.read_exact(&mut pos_buf)?;
                Some(u16::from_le_bytes(pos_buf))
            } else {
                None
            };

            entries.push(MergedEntry { branch, score, position });
        }

        Ok(Some(MergedRecord {
            key,
            filter_value,
            entries,
        }))
    }
}

/// On-disk N-way merge (spec §4.K mode (b)): each batch-DB was already
/// serialized via [`write_batch_db`]; this streams them with one buffered
/// reader per batch and a min-heap over their current heads, never holding
/// more than one record per batch in memory at a time.
pub fn merge_on_disk(
    paths: &[std::path::PathBuf],
    keep_positions: bool,
    mut sink: impl FnMut(MergedRecord) -> Result<()>,
) -> Result<()> {
    let mut loaders: Vec<BatchLoader> = paths
        .iter()
        .map(|p| BatchLoader::open(p, keep_positions))
        .collect::<Result<_>>()?;

    let mut heap = BinaryHeap::new();
    for (idx, loader) in loaders.iter().enumerate() {
        if let Some(rec) = &loader.current {
            heap.push(HeapKey {
                filter_value: rec.filter_value,
                key: rec.key,
                batch_idx: idx,
            });
        }
    }

    while let Some(top) = heap.pop() {
        let record = loaders[top.batch_idx]
            .current
            .take()
            .expect("heap entry implies a current record");
        loaders[top.batch_idx].advance()?;
        if let Some(rec) = &loaders[top.batch_idx].current {
            heap.push(HeapKey {
                filter_value: rec.filter_value,
                key: rec.key,
                batch_idx: top.batch_idx,
            });
        }
        sink(record)?;
    }

    Ok(())
}
