//! K-mer enumerator (component F): given a window and a score threshold,
//! produce every `(key, score)` with `score > eps`. Four variants share one
//! contract and are dispatched through a tagged enum rather than a v-table
//! (spec §9's "smart-pointer-wrapped polymorphic enumerators" redesign
//! flag).
//!
//! Grounded on `original_source/ipk/src/pk_compute.cpp` (`DCLA::DC`,
//! `DCCW::run`) and `original_source/ipk/include/pk_compute.h` (the `BB`
//! class declaration, whose `.cpp` did not survive retrieval — its DFS
//! branch-and-bound is reconstructed from spec §4.F's textual description).

pub mod bb;
pub mod dc;
pub mod dcla;
pub mod dccw;

use crate::window::{ChainLink, Window};

/// One enumerated k-mer: a packed key plus its log10 score, not yet
/// attributed to a branch (that happens in [`crate::branch_store`]).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredKmer {
    pub key: u64,
    pub score: f32,
}

/// Enumerator variant selector (spec §4.F / §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// Branch-and-bound DFS over positions.
    Bb,
    /// Divide-and-conquer, no bound tightening from the sibling half's
    /// sorted order in the join step (still recursively thresholds by
    /// split, since that's required for correctness — see DESIGN.md).
    Dc,
    /// Divide-and-conquer with the lookahead bound: joins by sorting the
    /// smaller side and breaking early once scores drop below threshold.
    Dcla,
    /// Divide-and-conquer with chained windows: reuses alive prefixes from
    /// the previous window and produces suffixes for the next one.
    Dccw,
}

/// Trivial base case shared by DC/DCLA/DCCW: the single-column set of
/// `(code, score)` pairs exceeding `eps`.
pub(crate) fn as_column(window: &Window, j: usize, eps: f32, alphabet_size: usize) -> Vec<ScoredKmer> {
    let mut out = Vec::new();
    for i in 0..alphabet_size {
        let score = window.get(i, j);
        if score > eps {
            out.push(ScoredKmer {
                key: i as u64,
                score,
            });
        }
    }
    out
}

/// Shared recursive divide-and-conquer core for DC/DCLA/DCCW's own
/// prefix/suffix generation. `sorted_join` selects DCLA's sorted
/// early-break join (`true`) vs. DC's exhaustive, unsorted join (`false`);
/// both produce the identical output *set* since the per-pair admission
/// test (`a_score >= eps_max && b_score >= eps_min && a+b > eps`) does not
/// depend on iteration order, only the early-break optimization does.
pub(crate) fn divide_and_conquer(
    window: &Window,
    j: usize,
    h: usize,
    eps: f32,
    bits_per_code: u32,
    alphabet_size: usize,
    sorted_join: bool,
) -> Vec<ScoredKmer> {
    if h == 1 {
        return as_column(window, j, eps, alphabet_size);
    }

    let half = h / 2;
    let right_width = h - half;
    let eps_l = eps - window.range_max_product(j + half, right_width);
    let eps_r = eps - window.range_max_product(j, half);

    let l = divide_and_conquer(window, j, half, eps_l, bits_per_code, alphabet_size, sorted_join);
    let r = divide_and_conquer(
        window,
        j + half,
        right_width,
        eps_r,
        bits_per_code,
        alphabet_size,
        sorted_join,
    );

    join_halves(l, r, eps, eps_l, eps_r, right_width, bits_per_code, sorted_join)
}

/// Combine the left (`l`) and right (`r`) result sets of a split at
/// `eps_l`/`eps_r` into full-width k-mers, keeping only pairs whose
/// combined score exceeds `eps`. `right_width` is the bit-width (in codes)
/// of the right half, used to shift the left code into place.
pub(crate) fn join_halves(
    l: Vec<ScoredKmer>,
    r: Vec<ScoredKmer>,
    eps: f32,
    eps_l: f32,
    eps_r: f32,
    right_width: usize,
    bits_per_code: u32,
    sorted_join: bool,
) -> Vec<ScoredKmer> {
    let prefix_sort = l.len() < r.len();
    let shift = right_width as u32 * bits_per_code;
    let mut result = Vec::new();

    if prefix_sort {
        // min = l (prefixes), max = r (suffixes)
        let mut min = l;
        if min.is_empty() {
            return result;
        }
        if sorted_join {
            min.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        }
        for suf in &r {
            if suf.score < eps_r {
                if sorted_join {
                    break;
                }
                continue;
            }
            for pre in &min {
                if pre.score < eps_l {
                    if sorted_join {
                        break;
                    }
                    continue;
                }
                let score = suf.score + pre.score;
                if score <= eps {
                    if sorted_join {
                        break;
                    }
                    continue;
                }
                result.push(ScoredKmer {
                    key: (pre.key << shift) | suf.key,
                    score,
                });
            }
        }
    } else {
        // min = r (suffixes), max = l (prefixes)
        let mut min = r;
        if min.is_empty() {
            return result;
        }
        if sorted_join {
            min.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        }
        for pre in &l {
            if pre.score < eps_l {
                if sorted_join {
                    break;
                }
                continue;
            }
            for suf in &min {
                if suf.score < eps_r {
                    if sorted_join {
                        break;
                    }
                    continue;
                }
                let score = pre.score + suf.score;
                if score <= eps {
                    if sorted_join {
                        break;
                    }
                    continue;
                }
                result.push(ScoredKmer {
                    key: (pre.key << shift) | suf.key,
                    score,
                });
            }
        }
    }

    result
}

/// Run the selected enumerator on one (non-chained) window.
pub fn enumerate_window(
    window: &Window,
    k: usize,
    eps: f32,
    bits_per_code: u32,
    alphabet_size: usize,
    algorithm: Algorithm,
) -> Vec<ScoredKmer> {
    match algorithm {
        Algorithm::Bb => bb::enumerate(window, k, eps, bits_per_code, alphabet_size),
        Algorithm::Dc => dc::enumerate(window, k, eps, bits_per_code, alphabet_size),
        Algorithm::Dcla => dcla::enumerate(window, k, eps, bits_per_code, alphabet_size),
        Algorithm::Dccw => {
            // A standalone (non-chained) call has no carried prefixes and
            // no neighboring windows to bound against.
            let link = ChainLink {
                previous: Window::new(window_matrix(window), 0, 0),
                current: *window,
                next: Window::new(window_matrix(window), 0, 0),
            };
            dccw::enumerate(&link, k, eps, bits_per_code, alphabet_size, Vec::new()).0
        }
    }
}

fn window_matrix<'m>(window: &Window<'m>) -> &'m crate::matrix::PpMatrix {
    // SAFETY-free helper: windows only expose a shared matrix reference
    // through construction, so we reconstruct a zero-width placeholder off
    // the same matrix by re-deriving it through a fresh window at start 0.
    // `Window` does not expose its matrix directly, so callers that need a
    // placeholder build one with `Window::new` using this accessor.
    window.matrix_ref()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::PpMatrix;
    use crate::window::to_windows;

    fn uniform_matrix(width: usize, value: f32) -> PpMatrix {
        PpMatrix::new(vec![vec![value; 4]; width]).unwrap()
    }

    #[test]
    fn test_scenario_1_uniform_matrix_emits_nothing() {
        let m = uniform_matrix(3, 0.25f32.log10());
        let windows = to_windows(&m, 3);
        let eps = crate::log_threshold(1.0, 3, 4).unwrap();
        let result = enumerate_window(&windows[0], 3, eps, 2, 4, Algorithm::Dcla);
        assert!(result.is_empty());
    }

    #[test]
    fn test_scenario_2_dominant_a_matrix_emits_aaa() {
        let col = vec![0.97f32.log10(), 0.01f32.log10(), 0.01f32.log10(), 0.01f32.log10()];
        let m = PpMatrix::new(vec![col; 3]).unwrap();
        let windows = to_windows(&m, 3);
        let eps = crate::log_threshold(1.0, 3, 4).unwrap();
        let result = enumerate_window(&windows[0], 3, eps, 2, 4, Algorithm::Dcla);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].key, 0);
        assert!((result[0].score - 3.0 * 0.97f32.log10()).abs() < 1e-4);
    }
}
