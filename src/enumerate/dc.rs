//! Naive divide-and-conquer enumerator (spec §4.F, variant DC).
//!
//! Shares [`super::divide_and_conquer`]'s recursive split with DCLA — the
//! per-side thresholds `eps_l`/`eps_r` must still be tightened by the
//! sibling half's best-possible score, or the recursion would discard
//! partial results a correct enumerator has to keep (any prefix only needs
//! `prefix_score + max_possible_suffix > eps`, not `prefix_score > eps`
//! alone). What DC drops relative to DCLA is the join-step optimization:
//! it does not sort the smaller side and does not break out of the inner
//! loop once scores fall below threshold, so it always pays the full
//! `|l| * |r|` join cost. Both still test every pair against the same
//! admission rule, so DC and DCLA emit identical output sets for the same
//! `(window, k, eps)` (spec §8's set-equivalence property) — see
//! DESIGN.md for the full resolution writeup.

use super::{divide_and_conquer, ScoredKmer};
use crate::window::Window;

pub fn enumerate(window: &Window, k: usize, eps: f32, bits_per_code: u32, alphabet_size: usize) -> Vec<ScoredKmer> {
    if k == 0 {
        return Vec::new();
    }
    divide_and_conquer(window, 0, k, eps, bits_per_code, alphabet_size, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enumerate::{bb, dcla};
    use crate::matrix::PpMatrix;
    use crate::window::to_windows;
    use std::collections::HashSet;

    fn as_set(v: &[ScoredKmer]) -> HashSet<(u64, i32)> {
        v.iter().map(|s| (s.key, (s.score * 1000.0).round() as i32)).collect()
    }

    #[test]
    fn test_dc_matches_dcla_and_bb_sets() {
        let columns = vec![
            vec![0.8f32.log10(), 0.1f32.log10(), 0.05f32.log10(), 0.05f32.log10()],
            vec![0.25f32.log10(), 0.25f32.log10(), 0.25f32.log10(), 0.25f32.log10()],
            vec![0.1f32.log10(), 0.1f32.log10(), 0.1f32.log10(), 0.7f32.log10()],
            vec![0.4f32.log10(), 0.4f32.log10(), 0.1f32.log10(), 0.1f32.log10()],
        ];
        let m = PpMatrix::new(columns).unwrap();
        let windows = to_windows(&m, 4);
        let w = &windows[0];
        let eps = -1.2f32;

        let dc_set = as_set(&enumerate(w, 4, eps, 2, 4));
        let dcla_set = as_set(&dcla::enumerate(w, 4, eps, 2, 4));
        let bb_set = as_set(&bb::enumerate(w, 4, eps, 2, 4));
        assert_eq!(dc_set, dcla_set);
        assert_eq!(dc_set, bb_set);
    }
}
