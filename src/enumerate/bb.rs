//! Branch-and-bound enumerator (spec §4.F, variant BB).
//!
//! No standalone `BB::bb` implementation survived in the retrieved
//! `original_source/ipk/src/pk_compute.cpp` — only its class declaration in
//! `pk_compute.h` (`_best_suffix_score`, `bb(i, j, prefix, score, eps)`).
//! Reconstructed here as a DFS over alignment positions, pruning a partial
//! prefix as soon as even its best possible completion cannot exceed `eps`.
//! The per-position suffix bound is exactly [`Window::range_max_product`],
//! so no separate `_best_suffix_score` table is precomputed.

use super::ScoredKmer;
use crate::window::Window;

pub fn enumerate(window: &Window, k: usize, eps: f32, bits_per_code: u32, alphabet_size: usize) -> Vec<ScoredKmer> {
    let mut out = Vec::new();
    if k == 0 {
        return out;
    }
    dfs(window, k, eps, bits_per_code, alphabet_size, 0, 0, 0.0, &mut out);
    out
}

#[allow(clippy::too_many_arguments)]
fn dfs(
    window: &Window,
    k: usize,
    eps: f32,
    bits_per_code: u32,
    alphabet_size: usize,
    j: usize,
    prefix: u64,
    score: f32,
    out: &mut Vec<ScoredKmer>,
) {
    if j == k {
        if score > eps {
            out.push(ScoredKmer { key: prefix, score });
        }
        return;
    }

    let remaining = k - j - 1;
    let best_suffix = if remaining > 0 {
        window.range_max_product(j + 1, remaining)
    } else {
        0.0
    };

    for i in 0..alphabet_size {
        let new_score = score + window.get(i, j);
        if new_score + best_suffix <= eps {
            continue;
        }
        let new_prefix = (prefix << bits_per_code) | i as u64;
        dfs(window, k, eps, bits_per_code, alphabet_size, j + 1, new_prefix, new_score, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::PpMatrix;
    use crate::window::to_windows;

    #[test]
    fn test_bb_matches_brute_force_on_small_window() {
        let columns = vec![
            vec![0.8f32.log10(), 0.1f32.log10(), 0.05f32.log10(), 0.05f32.log10()],
            vec![0.25f32.log10(), 0.25f32.log10(), 0.25f32.log10(), 0.25f32.log10()],
            vec![0.1f32.log10(), 0.1f32.log10(), 0.1f32.log10(), 0.7f32.log10()],
        ];
        let m = PpMatrix::new(columns).unwrap();
        let windows = to_windows(&m, 3);
        let w = &windows[0];
        let eps = -1.0f32;

        let mut expected = Vec::new();
        for a in 0..4u64 {
            for b in 0..4u64 {
                for c in 0..4u64 {
                    let score = w.get(a as usize, 0) + w.get(b as usize, 1) + w.get(c as usize, 2);
                    if score > eps {
                        expected.push((a << 4 | b << 2 | c, score));
                    }
                }
            }
        }

        let got = enumerate(w, 3, eps, 2, 4);
        assert_eq!(got.len(), expected.len());
        for (key, score) in expected {
            let found = got.iter().find(|k| k.key == key).unwrap();
            assert!((found.score - score).abs() < 1e-4);
        }
    }

    #[test]
    fn test_bb_empty_when_k_is_zero() {
        let m = PpMatrix::new(vec![vec![0.0; 4]; 3]).unwrap();
        let windows = to_windows(&m, 3);
        assert!(enumerate(&windows[0], 0, 0.0, 2, 4).is_empty());
    }
}
