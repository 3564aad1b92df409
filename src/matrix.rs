//! Posterior-probability matrix (component D): a column-major, per-ancestor
//! matrix of log10 posterior probabilities with a range-max prefix-sum
//! array for O(1) upper-bound queries.
//!
//! Grounded on `original_source/build/src/window.cpp` (`matrix::preprocess`,
//! `matrix::range_max_sum`).

use std::collections::HashMap;

use crate::error::{BuildError, Result};

/// One alignment column: `depth` log10 posterior probabilities, one per
/// alphabet code.
pub type Column = Vec<f32>;

/// A per-ancestor-node posterior-probability matrix. Stored column-major
/// (`columns[j][i]` is the log10 posterior of base `i` at alignment column
/// `j`), since enumeration scans whole columns at a time.
#[derive(Debug, Clone)]
pub struct PpMatrix {
    columns: Vec<Column>,
    /// `best_scores[j]` = sum of per-column maxima over `[0, j)`, so that
    /// `range_max_product(start, len) = best_scores[start+len] - best_scores[start]`.
    best_scores: Vec<f32>,
}

impl PpMatrix {
    /// Build a matrix from its columns and precompute the prefix-max-sum
    /// array. Every column must have the same depth (alphabet size).
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        if let Some(depth) = columns.first().map(|c| c.len()) {
            if columns.iter().any(|c| c.len() != depth) {
                return Err(BuildError::invalid_input(
                    "PP matrix columns have inconsistent depth",
                ));
            }
        }
        let mut matrix = Self {
            columns,
            best_scores: Vec::new(),
        };
        matrix.preprocess();
        Ok(matrix)
    }

    fn preprocess(&mut self) {
        self.best_scores = vec![0.0f32; self.columns.len() + 1];
        let mut running = 0.0f32;
        for (j, column) in self.columns.iter().enumerate() {
            let best = column.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            running += best;
            self.best_scores[j + 1] = running;
        }
    }

    /// Width in alignment columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Depth (alphabet size), or 0 for an empty matrix.
    pub fn depth(&self) -> usize {
        self.columns.first().map_or(0, |c| c.len())
    }

    /// `M[i, j]`: the log10 posterior of base `i` at column `j`.
    pub fn get(&self, i: usize, j: usize) -> f32 {
        self.columns[j][i]
    }

    pub fn column(&self, j: usize) -> &[f32] {
        &self.columns[j]
    }

    /// `(argmax, max)` over the column at `j`.
    pub fn max_at(&self, j: usize) -> (usize, f32) {
        let column = &self.columns[j];
        let mut best_i = 0;
        let mut best = column[0];
        for (i, &v) in column.iter().enumerate().skip(1) {
            if v > best {
                best = v;
                best_i = i;
            }
        }
        (best_i, best)
    }

    /// Upper bound on the score attainable by any k-mer spanning
    /// `[start, start+len)`: the sum of per-column maxima over that range
    /// (a sum in log space is a product in linear space, hence the name).
    pub fn range_max_product(&self, start: usize, len: usize) -> f32 {
        self.best_scores[start + len] - self.best_scores[start]
    }
}

/// An owner for per-node matrices that supports moving a matrix out after
/// its last use (spec §9's "shared read-only PP matrix containers with lazy
/// drop" redesign: workers receive moved matrices, not references).
#[derive(Debug, Default)]
pub struct MatrixStore {
    matrices: HashMap<String, PpMatrix>,
}

impl MatrixStore {
    pub fn new() -> Self {
        Self {
            matrices: HashMap::new(),
        }
    }

    pub fn insert(&mut self, label: impl Into<String>, matrix: PpMatrix) {
        self.matrices.insert(label.into(), matrix);
    }

    pub fn contains(&self, label: &str) -> bool {
        self.matrices.contains_key(label)
    }

    pub fn len(&self) -> usize {
        self.matrices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matrices.is_empty()
    }

    /// Move the matrix for `label` out of the store. Returns `None` if
    /// already taken or never present; callers treat that as
    /// `InconsistentTree` (spec §7) since every AR-mapped label must have a
    /// matrix.
    pub fn take(&mut self, label: &str) -> Option<PpMatrix> {
        self.matrices.remove(label)
    }

    /// Depth (alphabet size) of an arbitrary matrix still in the store,
    /// without removing it. Used once, up front, to size the enumerator's
    /// `bits_per_code` for the whole run — every matrix in a build shares one
    /// alphabet.
    pub fn peek_depth(&self) -> Option<usize> {
        self.matrices.values().next().map(|m| m.depth())
    }
}
