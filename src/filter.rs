//! Informativeness filter (component J): ranks every key in a batch-DB by
//! a filter value (smaller = more informative) so the top `mu` fraction can
//! be retained.
//!
//! Grounded on `original_source/ipk/src/filter.cpp` (`mif0_filter`,
//! `random_filter`, exact `shannon`/score-sum formulas and the
//! `default_random_engine(42)` seed). MIF1 has no surviving compiled path
//! in the retrieved source; it is built directly from spec §4.J's formula,
//! as a symmetric extension of MIF0's `H(C | B_w=1)` term (see DESIGN.md).
//!
//! Per spec §9's "filter plugin hierarchy" redesign flag: a sum type plus a
//! dispatch function, no trait object.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::merge::BatchDb;

/// Selectable filter variant (spec §4.J / §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    /// Short mutual-information filter (default).
    Mif0,
    /// Full mutual-information filter.
    Mif1,
    /// Fixed-seed uniform random filter, for reproducible baselines.
    Random,
    /// No filtering: every key is retained, filter value 0.
    None,
}

/// Fixed seed for [`FilterKind::Random`], matching the original's
/// `std::default_random_engine generator(42)` (spec §5's determinism
/// requirement).
pub const RANDOM_SEED: u64 = 42;

/// `shannon(p) = -p * log2(p)`, with `shannon(0) = 0` by convention (the
/// limit of `-p*log2(p)` as `p -> 0`).
fn shannon(p: f64) -> f64 {
    if p <= 0.0 {
        0.0
    } else {
        -p * p.log2()
    }
}

/// `min(10^log_score, 1.0)`, clamped per spec §4's underflow/clamp rule.
fn logscore_to_score(log_score: f32) -> f64 {
    (10f64.powf(log_score as f64)).min(1.0)
}

/// Compute `(key, filter_value)` for every key in `db`, sorted ascending by
/// filter value with ties broken by ascending key (spec §9's Open Question
/// resolution for tie-breaking).
pub fn calc_filter_values(
    db: &BatchDb,
    total_num_branches: usize,
    threshold: f32,
    filter: FilterKind,
) -> Vec<(u64, f32)> {
    let mut values: Vec<(u64, f32)> = match filter {
        FilterKind::Mif0 => db
            .iter()
            .map(|(key, entries)| (key, mif0_value(entries, total_num_branches, threshold)))
            .collect(),
        FilterKind::Mif1 => db
            .iter()
            .map(|(key, entries)| (key, mif1_value(entries, total_num_branches, threshold)))
            .collect(),
        FilterKind::Random => random_values(db),
        FilterKind::None => db.keys().map(|key| (key, 0.0f32)).collect(),
    };

    values.sort_by(|a, b| {
        a.1.partial_cmp(&b.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    values
}

fn mif0_value(entries: &[crate::merge::BatchEntry], total_num_branches: usize, threshold: f32) -> f32 {
    let threshold = threshold as f64;
    let num_absent = (total_num_branches - entries.len()) as f64;

    let mut score_sum: f64 = entries.iter().map(|e| logscore_to_score(e.score)).sum();
    score_sum += num_absent * threshold;

    let weighted_threshold = threshold / score_sum;
    let target_threshold = shannon(weighted_threshold);

    let mut hc_bw1 = total_num_branches as f64 * target_threshold;
    for entry in entries {
        let weighted_score = logscore_to_score(entry.score) / score_sum;
        hc_bw1 = hc_bw1 - target_threshold + shannon(weighted_score);
    }

    let hc = (total_num_branches as f64).log2();
    (score_sum * (hc_bw1 - hc)) as f32
}

fn mif1_value(entries: &[crate::merge::BatchEntry], total_num_branches: usize, threshold: f32) -> f32 {
    let threshold = threshold as f64;
    let n = total_num_branches as f64;
    let num_absent = (total_num_branches - entries.len()) as f64;

    let present_scores: Vec<f64> = entries.iter().map(|e| logscore_to_score(e.score)).collect();
    let score_sum: f64 = present_scores.iter().sum::<f64>() + num_absent * threshold;

    let weighted_threshold = threshold / score_sum;
    let target_threshold = shannon(weighted_threshold);
    let mut hc_bw1 = n * target_threshold;
    for &s in &present_scores {
        hc_bw1 = hc_bw1 - target_threshold + shannon(s / score_sum);
    }

    // Symmetric complement: the "absent" mass of each branch,
    // `1 - score`, normalized the same way.
    let complement_sum: f64 = n - score_sum;
    let weighted_complement_threshold = (1.0 - threshold) / complement_sum;
    let complement_target_threshold = shannon(weighted_complement_threshold);
    let mut hc_bw0 = n * complement_target_threshold;
    for &s in &present_scores {
        hc_bw0 = hc_bw0 - complement_target_threshold + shannon((1.0 - s) / complement_sum);
    }

    let hc = n.log2();
    let p1 = score_sum / n;
    let p0 = 1.0 - p1;
    (-hc + p1 * hc_bw1 + p0 * hc_bw0) as f32
}

fn random_values(db: &BatchDb) -> Vec<(u64, f32)> {
    let mut keys: Vec<u64> = db.keys().collect();
    keys.sort_unstable();
    let mut rng = StdRng::seed_from_u64(RANDOM_SEED);
    keys.into_iter()
        .map(|key| (key, rng.gen_range(0.0f32..1.0f32)))
        .collect()
}
