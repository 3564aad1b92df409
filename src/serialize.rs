//! Serialization & format versioning (component L): the binary PKDB layout
//! of spec §6, with a version tag selecting the positioned/unpositioned
//! entry layout and the alphabet.
//!
//! Grounded on `original_source/xpas/include/xpas/serialization.h` (field
//! order: sequence type, tree, k, omega, table size, then
//! `(key, entries_size, entries...)`; version constants
//! `v0_1_x`/`v0_2_WITHOUT_POSITIONS`/`v0_2_WITH_POSITIONS`) and
//! `original_source/ipk/src/db_builder.cpp` (`ipk_header`, written once
//! before the N-way merge streams records).

use std::fs;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{BuildError, Result};
use crate::nway_merge::{MergedEntry, MergedRecord};

/// Bit flags packed into the version tag's low bits (spec §6: "version_tag
/// ... encodes alphabet + positions flag"). The high bits are a protocol
/// generation number so genuinely incompatible future formats can still be
/// rejected outright.
const FLAG_POSITIONS: u32 = 0b01;
const FLAG_AMINO: u32 = 0b10;

/// Current protocol generation ("v0.2", per spec §6's header comment).
const PROTOCOL_V0_2: u32 = 0x0002_0000;

/// Compute the version tag this build will emit.
pub fn version_tag(keep_positions: bool, amino_acid: bool) -> u32 {
    let mut flags = 0;
    if keep_positions {
        flags |= FLAG_POSITIONS;
    }
    if amino_acid {
        flags |= FLAG_AMINO;
    }
    PROTOCOL_V0_2 | flags
}

/// Decode a version tag into `(keep_positions, amino_acid)`. Rejects any
/// tag from a protocol generation this build does not recognize (spec §4.L:
/// "the core must refuse to load databases it cannot interpret").
pub fn decode_version_tag(tag: u32) -> Result<(bool, bool)> {
    let generation = tag & !(FLAG_POSITIONS | FLAG_AMINO);
    if generation != PROTOCOL_V0_2 {
        return Err(BuildError::unsupported(format!(
            "unrecognized PKDB protocol generation in version tag 0x{tag:08x}"
        )));
    }
    Ok((tag & FLAG_POSITIONS != 0, tag & FLAG_AMINO != 0))
}

/// Header fields preceding the record stream (spec §6).
#[derive(Debug, Clone, PartialEq)]
pub struct PkdbHeader {
    pub version_tag: u32,
    pub sequence_type_name: String,
    pub original_tree_newick: String,
    pub k: u64,
    pub omega: f32,
    pub total_keys: u64,
    pub total_entries: u64,
}

fn write_string<W: Write>(writer: &mut W, s: &str) -> Result<()> {
    writer.write_all(&(s.len() as u64).to_le_bytes())?;
    writer.write_all(s.as_bytes())?;
    Ok(())
}

fn read_string<R: Read>(reader: &mut R) -> Result<String> {
    let mut len_buf = [0u8; 8];
    reader.read_exact(&mut len_buf)?;
    let len = u64::from_le_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| BuildError::invalid_input(format!("non-UTF8 string in PKDB: {e}")))
}

/// Writes a key in the width spec §6 mandates for its alphabet: `u32` for
/// DNA, `u64` for amino acids. The pipeline carries every key as `u64`
/// internally (it always fits losslessly — a DNA key is at most 24 bits
/// under `k_max = 12` at 2 bits/code), so only the wire encoding narrows.
fn write_key<W: Write>(writer: &mut W, key: u64, amino_acid: bool) -> Result<()> {
    if amino_acid {
        writer.write_all(&key.to_le_bytes())?;
    } else {
        let narrowed = u32::try_from(key)
            .map_err(|_| BuildError::internal(format!("DNA key {key} does not fit in u32")))?;
        writer.write_all(&narrowed.to_le_bytes())?;
    }
    Ok(())
}

fn read_key<R: Read>(reader: &mut R, amino_acid: bool) -> Result<u64> {
    if amino_acid {
        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    } else {
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf) as u64)
    }
}

/// Streaming writer for the PKDB format: write the header once, then one
/// record at a time as the N-way merge produces them (spec §4.K/§6).
pub struct PkdbWriter<W: Write> {
    writer: W,
    keep_positions: bool,
    amino_acid: bool,
}

impl PkdbWriter<BufWriter<fs::File>> {
    /// Create (or truncate) `path` and write `header`.
    pub fn create(path: &Path, header: &PkdbHeader) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::File::create(path)?;
        let mut writer = Self {
            writer: BufWriter::new(file),
            keep_positions: header.version_tag & FLAG_POSITIONS != 0,
            amino_acid: header.version_tag & FLAG_AMINO != 0,
        };
        writer.write_header(header)?;
        Ok(writer)
    }
}

impl<W: Write> PkdbWriter<W> {
    fn write_header(&mut self, header: &PkdbHeader) -> Result<()> {
        self.writer.write_all(&header.version_tag.to_le_bytes())?;
        write_string(&mut self.writer, &header.sequence_type_name)?;
        write_string(&mut self.writer, &header.original_tree_newick)?;
        self.writer.write_all(&header.k.to_le_bytes())?;
        self.writer.write_all(&header.omega.to_le_bytes())?;
        self.writer.write_all(&header.total_keys.to_le_bytes())?;
        self.writer.write_all(&header.total_entries.to_le_bytes())?;
        Ok(())
    }

    /// Append one merged record in the emission order the caller provides
    /// (the N-way merger already yields ascending `filter_value`; this
    /// writer does not re-sort).
    pub fn write_record(&mut self, record: &MergedRecord) -> Result<()> {
        write_key(&mut self.writer, record.key, self.amino_acid)?;
        self.writer.write_all(&record.filter_value.to_le_bytes())?;
        self.writer
            .write_all(&(record.entries.len() as u64).to_le_bytes())?;
        for entry in &record.entries {
            self.writer.write_all(&entry.branch.to_le_bytes())?;
            self.writer.write_all(&entry.score.to_le_bytes())?;
            if self.keep_positions {
                let position = entry.position.ok_or_else(|| {
                    BuildError::internal("positioned PKDB write missing a position")
                })?;
                self.writer.write_all(&position.to_le_bytes())?;
            }
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// A fully-loaded PKDB (spec §4.L / §6). Intended for tests and the
/// round-trip property; a downstream reader's query API is out of scope
/// (spec §1's Non-goals).
#[derive(Debug, Clone, PartialEq)]
pub struct Pkdb {
    pub header: PkdbHeader,
    pub records: Vec<MergedRecord>,
}

/// Load a whole PKDB file into memory.
pub fn load(path: &Path) -> Result<Pkdb> {
    let file = fs::File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut tag_buf = [0u8; 4];
    reader.read_exact(&mut tag_buf)?;
    let version_tag = u32::from_le_bytes(tag_buf);
    let (keep_positions, amino_acid) = decode_version_tag(version_tag)?;

    let sequence_type_name = read_string(&mut reader)?;
    let original_tree_newick = read_string(&mut reader)?;

    let mut k_buf = [0u8; 8];
    reader.read_exact(&mut k_buf)?;
    let k = u64::from_le_bytes(k_buf);

    let mut omega_buf = [0u8; 4];
    reader.read_exact(&mut omega_buf)?;
    let omega = f32::from_le_bytes(omega_buf);

    let mut total_keys_buf = [0u8; 8];
    reader.read_exact(&mut total_keys_buf)?;
    let total_keys = u64::from_le_bytes(total_keys_buf);

    let mut total_entries_buf = [0u8; 8];
    reader.read_exact(&mut total_entries_buf)?;
    let total_entries = u64::from_le_bytes(total_entries_buf);

    let header = PkdbHeader {
        version_tag,
        sequence_type_name,
        original_tree_newick,
        k,
        omega,
        total_keys,
        total_entries,
    };

    let mut records = Vec::with_capacity(total_keys as usize);
    for _ in 0..total_keys {
        let key = read_key(&mut reader, amino_acid)?;

        let mut fv_buf = [0u8; 4];
        reader.read_exact(&mut fv_buf)?;
        let filter_value = f32::from_le_bytes(fv_buf);

        let mut n_buf = [0u8; 8];
        reader.read_exact(&mut n_buf)?;
        let n_entries = u64::from_le_bytes(n_buf);

        let mut entries = Vec::with_capacity(n_entries as usize);
        for _ in 0..n_entries {
            let mut branch_buf = [0u8; 4];
            reader.read_exact(&mut branch_buf)?;
            let branch = u32::from_le_bytes(branch_buf);

            let mut score_buf = [0u8; 4];
            reader.read_exact(&mut score_buf)?;
            let score = f32::from_le_bytes(score_buf);

            let position = if keep_positions {
                let mut pos_buf = [0u8; 2];
                reader.read_exact(&mut pos_buf)?;
                Some(u16::from_le_bytes(pos_buf))
            } else {
                None
            };

            entries.push(MergedEntry { branch, score, position });
        }

        records.push(MergedRecord {
            key,
            filter_value,
            entries,
        });
    }

    Ok(Pkdb { header, records })
}

/// Save a whole in-memory [`Pkdb`] in one call (used by tests exercising
/// the round-trip property; the pipeline itself streams via
/// [`PkdbWriter`]).
pub fn save(db: &Pkdb, path: &Path) -> Result<()> {
    let mut writer = PkdbWriter::create(path, &db.header)?;
    for record in &db.records {
        writer.write_record(record)?;
    }
    writer.finish()
}
