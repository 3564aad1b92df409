//! Batch sharder (component H): serializes one branch's per-batch hash map
//! to `<workdir>/hashmaps/<branch_postorder_id>_<batch>.hash` (spec §4.H,
//! §6's shard file format).
//!
//! Grounded on `original_source/ipk/src/branch_group.cpp`
//! (`save_group_map`/`load_group_map`, `get_group_map_file`) for the naming
//! scheme and write-then-rename idempotency; the wire layout itself
//! (`u64 n_records` then flat `(key, score[, position])` tuples) is
//! hand-rolled per spec §6 rather than boost::serialization, matching this
//! crate's [`crate::serialize`] module's own bespoke binary layout.

use std::fs;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::branch_store::BranchBatchMap;
use crate::error::{BuildError, Result};

/// `<working_dir>/hashmaps`.
pub fn hashmaps_dir(working_dir: &Path) -> PathBuf {
    working_dir.join("hashmaps")
}

/// `<working_dir>/hashmaps/<branch>_<batch>.hash`.
pub fn shard_path(working_dir: &Path, branch_postorder_id: u32, batch_idx: usize) -> PathBuf {
    hashmaps_dir(working_dir).join(format!("{branch_postorder_id}_{batch_idx}.hash"))
}

/// Write one branch-batch map to its shard file. Writes to a temp file in
/// the same directory and renames into place, so a crash mid-write never
/// leaves a partially-written file at the final path (spec §4.H: "write is
/// all-or-nothing per file").
pub fn write_shard(path: &Path, map: &BranchBatchMap, keep_positions: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("hash.tmp");
    {
        let file = fs::File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&(map.len() as u64).to_le_bytes())?;
        for (&key, value) in map.iter() {
            writer.write_all(&key.to_le_bytes())?;
            writer.write_all(&value.score.to_le_bytes())?;
            if keep_positions {
                let position = value.position.ok_or_else(|| {
                    BuildError::internal("positioned shard write missing a position")
                })?;
                writer.write_all(&position.to_le_bytes())?;
            }
        }
        writer.flush()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Read one branch-batch shard file back into a [`BranchBatchMap`].
pub fn read_shard(path: &Path, keep_positions: bool) -> Result<BranchBatchMap> {
    let file = fs::File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut map = BranchBatchMap::new();
    let n_records = read_u64(&mut reader)?;
    for _ in 0..n_records {
        let key = read_u64(&mut reader)?;
        let score = read_f32(&mut reader)?;
        let position = if keep_positions {
            Some(read_u16(&mut reader)?)
        } else {
            None
        };
        map.put(key, score, position);
    }
    Ok(map)
}

fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_u16<R: Read>(reader: &mut R) -> Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_f32<R: Read>(reader: &mut R) -> Result<f32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

/// Remove the whole `hashmaps/` directory; called once the final PKDB has
/// been written successfully (spec §6: shards are "removed on success").
/// On failure shards are left in place for debugging (spec §7).
pub fn cleanup(working_dir: &Path) -> Result<()> {
    let dir = hashmaps_dir(working_dir);
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_shard_round_trip_unpositioned() {
        let dir = tempdir().unwrap();
        let path = shard_path(dir.path(), 3, 7);

        let mut map = BranchBatchMap::new();
        map.put(42, -0.5, None);
        map.put(100, -1.25, None);

        write_shard(&path, &map, false).unwrap();
        assert!(path.exists());

        let loaded = read_shard(&path, false).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get(42).unwrap().score, -0.5);
        assert_eq!(loaded.get(100).unwrap().score, -1.25);
    }

    #[test]
    fn test_shard_round_trip_positioned() {
        let dir = tempdir().unwrap();
        let path = shard_path(dir.path(), 1, 0);

        let mut map = BranchBatchMap::new();
        map.put(5, -0.1, Some(12));

        write_shard(&path, &map, true).unwrap();
        let loaded = read_shard(&path, true).unwrap();
        assert_eq!(loaded.get(5).unwrap().position, Some(12));
    }

    #[test]
    fn test_cleanup_removes_hashmaps_dir() {
        let dir = tempdir().unwrap();
        let path = shard_path(dir.path(), 0, 0);
        write_shard(&path, &BranchBatchMap::new(), false).unwrap();
        assert!(hashmaps_dir(dir.path()).exists());
        cleanup(dir.path()).unwrap();
        assert!(!hashmaps_dir(dir.path()).exists());
    }

    #[test]
    fn test_shard_path_naming() {
        let p = shard_path(Path::new("/tmp/work"), 12, 5);
        assert_eq!(p, PathBuf::from("/tmp/work/hashmaps/12_5.hash"));
    }
}
