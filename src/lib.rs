//! `ipk-core`: the phylo-k-mer database (PKDB) build pipeline.
//!
//! This crate implements the core of a phylogenetic-placement database
//! builder: given a rooted reference tree and a finished ancestral
//! posterior-probability (PP) matrix (produced elsewhere, e.g. by PhyML or
//! RAxML-NG), it extends the tree with ghost nodes, enumerates every k-mer
//! whose posterior probability on a branch exceeds an implied threshold,
//! batches and filters those k-mers by informativeness, and emits a compact
//! on-disk index. Newick/FASTA parsing, alignment reduction and the CLI
//! front end that drives third-party ACR tools are treated as external
//! collaborators; this crate consumes their finished output.

pub mod branch_store;
pub mod config;
pub mod enumerate;
pub mod error;
pub mod filter;
pub mod logging;
pub mod matrix;
pub mod merge;
pub mod nway_merge;
pub mod pipeline;
pub mod seq;
pub mod serialize;
pub mod shard;
pub mod tree;
pub mod window;

pub use config::BuildConfig;
pub use error::{BuildError, Result};

/// Linear-space score threshold `(omega / |alphabet|)^k` (spec §3, §4.L's
/// "Global `score_threshold` math inline everywhere" redesign flag: every
/// call site goes through this one helper).
///
/// Returns `BuildError::InvalidConfig` if `omega <= 0` or `k == 0`, matching
/// §4's failure semantics.
pub fn score_threshold(omega: f32, k: usize, alphabet_size: usize) -> Result<f32> {
    if omega <= 0.0 || k == 0 {
        return Err(BuildError::invalid_config(format!(
            "score_threshold requires omega > 0 and k > 0, got omega={omega}, k={k}"
        )));
    }
    Ok((omega / alphabet_size as f32).powi(k as i32))
}

/// Log10 of [`score_threshold`]; this is the value every enumerator and
/// filter actually compares scores against, since all scores are carried in
/// log space internally (spec §3's "score vs log score" split).
pub fn log_threshold(omega: f32, k: usize, alphabet_size: usize) -> Result<f32> {
    Ok(score_threshold(omega, k, alphabet_size)?.log10())
}
