//! Demo CLI front end: exercises [`ipk_core::pipeline::Pipeline`] end to end
//! from files on disk.
//!
//! Grounded on `backend/src/main.rs`'s `match ... { Err(e) => { error!(...);
//! std::process::exit(1) } }` shape for the error-exit path, and
//! `frost_server/src/bin/e2e_deposit_test.rs`'s `#[derive(Parser)]` CLI
//! surface. Reading a directory of PP-matrix files is not part of the core
//! (spec §1 treats ACR tool output as a finished external input) so the
//! loader below is deliberately minimal: every non-root label needs a
//! matrix, and this binary's only job is handing the library well-formed
//! ones.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;

use ipk_core::config::BuildConfig;
use ipk_core::enumerate::Algorithm;
use ipk_core::error::BuildError;
use ipk_core::filter::FilterKind;
use ipk_core::logging::{self, LogLevel};
use ipk_core::matrix::{MatrixStore, PpMatrix};
use ipk_core::pipeline::{Pipeline, PipelineInputs};
use ipk_core::tree::newick;

#[derive(Debug, Parser)]
#[command(name = "build", about = "Build a phylo-k-mer database from a reference tree and PP matrices")]
struct Args {
    /// Newick file for the original (unextended) reference tree.
    #[arg(long)]
    tree: PathBuf,

    /// Newick file for the ACR tool's output tree over the extended topology.
    #[arg(long)]
    ar_tree: PathBuf,

    /// Directory of `<label>.ppm` posterior-probability matrix files, one
    /// per extended-tree node the ACR tool reconstructed.
    #[arg(long)]
    matrices: PathBuf,

    /// Working directory for shards and the final PKDB.
    #[arg(long, default_value = ".")]
    workdir: PathBuf,

    /// k-mer length.
    #[arg(short = 'k', long, default_value_t = 8)]
    k: usize,

    /// Score threshold parameter.
    #[arg(long, default_value_t = 1.5)]
    omega: f32,

    /// Filter retention fraction (RAM mode only).
    #[arg(long, default_value_t = 0.8)]
    mu: f64,

    /// Enumeration algorithm: bb, dc, dcla, dccw.
    #[arg(long, default_value = "dc")]
    algorithm: String,

    /// Informativeness filter: mif0, mif1, random, none.
    #[arg(long, default_value = "mif0")]
    filter: String,

    /// Worker pool size.
    #[arg(long, default_value_t = 1)]
    threads: usize,

    /// Number of hash-bucket batches.
    #[arg(long, default_value_t = 32)]
    num_batches: usize,

    /// Filter on disk (streamed) instead of in RAM.
    #[arg(long, default_value_t = false)]
    on_disk: bool,

    /// Reroot the input tree before extending it.
    #[arg(long, default_value_t = false)]
    use_unrooted: bool,

    /// Keep alignment-column positions in the output entries.
    #[arg(long, default_value_t = false)]
    keep_positions: bool,

    /// Emit JSON logs instead of pretty ones.
    #[arg(long, default_value_t = false)]
    json_logs: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = logging::init_logging(LogLevel::Info, args.json_logs) {
        eprintln!("failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(args) {
        Ok(output) => {
            tracing::info!(
                pkdb = %output.pkdb_path.display(),
                total_keys = output.total_keys,
                total_entries = output.total_entries,
                "build finished"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("build failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> ipk_core::Result<ipk_core::pipeline::PipelineOutput> {
    let config = build_config(&args)?;

    let original_tree = newick::parse(&fs::read_to_string(&args.tree)?)?;
    let ar_tree = newick::parse(&fs::read_to_string(&args.ar_tree)?)?;
    let matrices = load_matrices(&args.matrices)?;

    let pipeline = Pipeline::new(config);
    pipeline.run(PipelineInputs {
        original_tree,
        ar_tree,
        matrices,
    })
}

fn build_config(args: &Args) -> ipk_core::Result<BuildConfig> {
    let algorithm: Algorithm = args
        .algorithm
        .parse()
        .map_err(|e| BuildError::invalid_config(format!("{e}")))?;
    let filter: FilterKind = args
        .filter
        .parse()
        .map_err(|e| BuildError::invalid_config(format!("{e}")))?;

    let config = BuildConfig {
        working_dir: args.workdir.clone(),
        k: args.k,
        omega: args.omega,
        mu: args.mu,
        algorithm,
        filter,
        num_batches: args.num_batches,
        num_threads: args.threads,
        keep_positions: args.keep_positions,
        use_unrooted: args.use_unrooted,
        on_disk: args.on_disk,
    };
    config
        .validate()
        .map_err(|e| BuildError::invalid_config(e.to_string()))?;
    Ok(config)
}

/// Load every `<label>.ppm` file in `dir` into a [`MatrixStore`]. Each file
/// is one whitespace-separated linear-probability row per alignment column;
/// rows are converted to log10 here, once, rather than by every caller.
fn load_matrices(dir: &Path) -> ipk_core::Result<MatrixStore> {
    let mut store = MatrixStore::new();
    let entries = fs::read_dir(dir)?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("ppm") {
            continue;
        }
        let label = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| BuildError::invalid_input(format!("bad matrix file name: {}", path.display())))?
            .to_string();

        let contents = fs::read_to_string(&path)?;
        let mut columns = Vec::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut column = Vec::new();
            for token in line.split_whitespace() {
                let p: f32 = token
                    .parse()
                    .map_err(|_| BuildError::invalid_input(format!("non-numeric value in {}", path.display())))?;
                column.push(p.max(f32::MIN_POSITIVE).log10());
            }
            columns.push(column);
        }
        store.insert(label, PpMatrix::new(columns)?);
    }
    Ok(store)
}
