//! Divide-and-conquer with chained windows (spec §4.F, variant DCCW).
//!
//! Ported from `original_source/ipk/src/pk_compute.cpp`'s `DCCW::run` /
//! `DCCW::DC`. Each window's left half (prefixes) is either reused from the
//! previous window's right half (carried over through
//! [`crate::window::chain_windows`]) or computed fresh; its right half
//! (suffixes) is always computed fresh, bounded by a lookahead term so it
//! stays valid for the *next* window's reuse. Carried-over prefixes may be
//! stale relative to the current window's own threshold, so they are
//! re-partitioned into an alive prefix before joining.
//!
//! DESIGN.md resolves an ambiguity in the retrieved source here: the join
//! combines a prefix/suffix pair's scores with `+` (log-space addition),
//! not `*` as a literal transcription of the original's `a_score * b_score`
//! would suggest — the matrix stores log10 posteriors throughout this
//! crate, and a product of logs is not the log of a product.

use super::{divide_and_conquer, ScoredKmer};
use crate::window::ChainLink;

/// Run DCCW on one link of a window chain. `prefixes` is the previous
/// window's suffix set (empty for the first window in a chain, triggering a
/// fresh left-half computation). Returns `(results, suffixes)` where
/// `suffixes` is handed to the next call as its `prefixes` argument.
pub fn enumerate(
    link: &ChainLink,
    k: usize,
    eps: f32,
    bits_per_code: u32,
    alphabet_size: usize,
    prefixes: Vec<ScoredKmer>,
) -> (Vec<ScoredKmer>, Vec<ScoredKmer>) {
    if k == 0 {
        return (Vec::new(), Vec::new());
    }

    let half = k / 2;
    let right_width = k - half;
    let window = &link.current;

    let eps_r = eps - window.range_max_product(0, half);
    let eps_l = eps - window.range_max_product(half, right_width);

    let mut l = prefixes;
    if l.is_empty() {
        l = divide_and_conquer(window, 0, half, eps_l, bits_per_code, alphabet_size, true);
    }

    let (lookbehind, lookahead) = chain_bounds(link, half, right_width);

    let r_threshold = eps_r.min(eps - lookahead);
    let mut r = divide_and_conquer(window, half, right_width, r_threshold, bits_per_code, alphabet_size, true);

    let num_alive_l = if eps - lookbehind < eps_l {
        partition_alive(&mut l, eps_l)
    } else {
        l.len()
    };
    let num_alive_r = if eps - lookahead < eps_r {
        partition_alive(&mut r, eps_r)
    } else {
        r.len()
    };

    let result = join_chain(&mut l, &mut r, eps, eps_l, eps_r, right_width, bits_per_code, num_alive_l, num_alive_r);
    (result, r)
}

/// Upper bounds on neighboring windows' reusable halves: the previous
/// window's best achievable prefix score, and the next window's best
/// achievable suffix score. A zero-width placeholder window (no neighbor)
/// contributes no bound.
fn chain_bounds(link: &ChainLink, half: usize, right_width: usize) -> (f32, f32) {
    let lookbehind = if link.previous.k() == 0 {
        f32::NEG_INFINITY
    } else {
        link.previous.range_max_product(0, half)
    };
    let lookahead = if link.next.k() == 0 {
        f32::NEG_INFINITY
    } else {
        link.next.range_max_product(half, right_width)
    };
    (lookbehind, lookahead)
}

/// Partition `v` in place so entries with `score > threshold` come first;
/// returns the count of such "alive" entries.
fn partition_alive(v: &mut [ScoredKmer], threshold: f32) -> usize {
    let mut i = 0;
    for j in 0..v.len() {
        if v[j].score > threshold {
            v.swap(i, j);
            i += 1;
        }
    }
    i
}

#[allow(clippy::too_many_arguments)]
fn join_chain(
    l: &mut [ScoredKmer],
    r: &mut [ScoredKmer],
    eps: f32,
    eps_l: f32,
    eps_r: f32,
    right_width: usize,
    bits_per_code: u32,
    num_alive_l: usize,
    num_alive_r: usize,
) -> Vec<ScoredKmer> {
    let shift = right_width as u32 * bits_per_code;
    let mut result = Vec::new();
    let prefix_sort = num_alive_l < num_alive_r;

    if prefix_sort {
        if l.is_empty() {
            return result;
        }
        l[..num_alive_l].sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        for suf in r.iter() {
            if suf.score < eps_r {
                break;
            }
            for pre in l.iter() {
                if pre.score < eps_l {
                    break;
                }
                let score = suf.score + pre.score;
                if score <= eps {
                    break;
                }
                result.push(ScoredKmer {
                    key: (pre.key << shift) | suf.key,
                    score,
                });
            }
        }
    } else {
        if r.is_empty() {
            return result;
        }
        r[..num_alive_r].sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        for pre in l.iter() {
            if pre.score < eps_l {
                break;
            }
            for suf in r.iter() {
                if suf.score < eps_r {
                    break;
                }
                let score = pre.score + suf.score;
                if score <= eps {
                    break;
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
