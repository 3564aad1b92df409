//! Divide-and-conquer with lookahead (spec §4.F, variant DCLA).
//!
//! Ported from `original_source/ipk/src/pk_compute.cpp`'s `DCLA::DC`: same
//! recursive split as DC, but the join step sorts the smaller side
//! descending and breaks out of both loops as soon as a score drops below
//! its side's threshold, since the sorted order guarantees nothing further
//! in that direction can pass.

use super::{divide_and_conquer, ScoredKmer};
use crate::window::Window;

pub fn enumerate(window: &Window, k: usize, eps: f32, bits_per_code: u32, alphabet_size: usize) -> Vec<ScoredKmer> {
    if k == 0 {
        return Vec::new();
    }
    divide_and_conquer(window, 0, k, eps, bits_per_code, alphabet_size, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::PpMatrix;
    use crate::window::to_windows;

    #[test]
    fn test_dcla_single_column_is_bb_base_case() {
        let m = PpMatrix::new(vec![vec![0.97f32.log10(), 0.01f32.log10(), 0.01f32.log10(), 0.01f32.log10()]])
            .unwrap();
        let windows = to_windows(&m, 1);
        let result = enumerate(&windows[0], 1, -0.5, 2, 4);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].key, 0);
    }

    #[test]
    fn test_dcla_respects_threshold() {
        let columns = vec![vec![0.25f32.log10(); 4]; 4];
        let m = PpMatrix::new(columns).unwrap();
        let windows = to_windows(&m, 4);
        let eps = crate::log_threshold(1.0, 4, 4).unwrap();
        let result = enumerate(&windows[0], 4, eps, 2, 4);
        assert!(result.is_empty());
    }
}
