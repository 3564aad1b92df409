//! Build configuration for the phylo-k-mer pipeline.
//!
//! Values may be loaded from environment variables (`IPK_*`) or built up
//! programmatically. All fields are validated eagerly in [`BuildConfig::validate`];
//! an invalid configuration never reaches the pipeline.
//!
//! ## Recognized environment variables
//! - `IPK_K` - k-mer length (default: 8)
//! - `IPK_OMEGA` - score threshold parameter (default: 1.5)
//! - `IPK_MU` - filter retention fraction (default: 0.8)
//! - `IPK_NUM_THREADS` - worker pool size (default: 1)
//! - `IPK_NUM_BATCHES` - number of hash-bucket batches (default: 32)
//! - `IPK_ALGORITHM` - one of `bb`, `dc`, `dcla`, `dccw` (default: `dc`)
//! - `IPK_FILTER` - one of `mif0`, `mif1`, `random`, `none` (default: `mif0`)
//! - `IPG_ON_DISK` - "1" to filter on disk instead of in RAM (default: false)

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::enumerate::Algorithm;
use crate::filter::FilterKind;
use crate::seq::{Alphabet, Amino, Dna};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("k-mer length must be in 1..=k_max: {0}")]
    InvalidKmerLength(usize),

    #[error("omega must be > 0, got {0}")]
    InvalidOmega(f32),

    #[error("mu must be in (0, 1], got {0}")]
    InvalidMu(f64),
}

impl FromStr for Algorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bb" => Ok(Algorithm::Bb),
            "dc" => Ok(Algorithm::Dc),
            "dcla" => Ok(Algorithm::Dcla),
            "dccw" => Ok(Algorithm::Dccw),
            other => Err(ConfigError::InvalidValue(
                "IPK_ALGORITHM".to_string(),
                format!("unknown algorithm: {other}"),
            )),
        }
    }
}

impl FromStr for FilterKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mif0" => Ok(FilterKind::Mif0),
            "mif1" => Ok(FilterKind::Mif1),
            "random" => Ok(FilterKind::Random),
            "none" => Ok(FilterKind::None),
            other => Err(ConfigError::InvalidValue(
                "IPK_FILTER".to_string(),
                format!("unknown filter: {other}"),
            )),
        }
    }
}

/// Build-time configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Working directory: shards and intermediate state live under here.
    pub working_dir: PathBuf,
    /// k-mer length.
    pub k: usize,
    /// Score threshold parameter omega.
    pub omega: f32,
    /// Filter retention fraction, used in RAM mode.
    pub mu: f64,
    /// Enumerator variant.
    pub algorithm: Algorithm,
    /// Informativeness filter.
    pub filter: FilterKind,
    /// Number of hash-bucket batches N.
    pub num_batches: usize,
    /// Worker pool size.
    pub num_threads: usize,
    /// Whether entries carry an alignment-column position.
    pub keep_positions: bool,
    /// Whether the input tree is unrooted and must be rerooted.
    pub use_unrooted: bool,
    /// Filter on disk (streamed) instead of in RAM.
    pub on_disk: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("."),
            k: 8,
            omega: 1.5,
            mu: 0.8,
            algorithm: Algorithm::Dc,
            filter: FilterKind::Mif0,
            num_batches: 32,
            num_threads: 1,
            keep_positions: false,
            use_unrooted: false,
            on_disk: false,
        }
    }
}

impl BuildConfig {
    /// Load overrides from `IPK_*` environment variables on top of the
    /// defaults, then validate.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Ok(v) = env::var("IPK_K") {
            cfg.k = v
                .parse()
                .map_err(|_| ConfigError::InvalidValue("IPK_K".into(), v))?;
        }
        if let Ok(v) = env::var("IPK_OMEGA") {
            cfg.omega = v
                .parse()
                .map_err(|_| ConfigError::InvalidValue("IPK_OMEGA".into(), v))?;
        }
        if let Ok(v) = env::var("IPK_MU") {
            cfg.mu = v
                .parse()
                .map_err(|_| ConfigError::InvalidValue("IPK_MU".into(), v))?;
        }
        if let Ok(v) = env::var("IPK_NUM_THREADS") {
            cfg.num_threads = v
                .parse()
                .map_err(|_| ConfigError::InvalidValue("IPK_NUM_THREADS".into(), v))?;
        }
        if let Ok(v) = env::var("IPK_NUM_BATCHES") {
            cfg.num_batches = v
                .parse()
                .map_err(|_| ConfigError::InvalidValue("IPK_NUM_BATCHES".into(), v))?;
        }
        if let Ok(v) = env::var("IPK_ALGORITHM") {
            cfg.algorithm = v.parse()?;
        }
        if let Ok(v) = env::var("IPK_FILTER") {
            cfg.filter = v.parse()?;
        }
        if let Ok(v) = env::var("IPK_ON_DISK") {
            cfg.on_disk = v == "1" || v.eq_ignore_ascii_case("true");
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate all fields, matching the fail-fast failure semantics
    /// required at construction time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Both alphabets share the same k_max, so this can be checked before
        // the pipeline knows which one the input matrices select.
        debug_assert_eq!(Dna::max_kmer_length(), Amino::max_kmer_length());
        let k_max = Dna::max_kmer_length();
        if self.k == 0 || self.k > k_max {
            return Err(ConfigError::InvalidKmerLength(self.k));
        }
        if !(self.omega > 0.0) {
            return Err(ConfigError::InvalidOmega(self.omega));
        }
        if !(self.mu > 0.0 && self.mu <= 1.0) {
            return Err(ConfigError::InvalidMu(self.mu));
        }
        if self.num_batches == 0 {
            return Err(ConfigError::InvalidValue(
                "num_batches".into(),
                "must be > 0".into(),
            ));
        }
        if self.num_threads == 0 {
            return Err(ConfigError::InvalidValue(
                "num_threads".into(),
                "must be > 0".into(),
            ));
        }
        Ok(())
    }
}
