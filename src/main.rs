//! jdist: exact all-pairs Jaccard distance matrices from k-mer
//! presence/absence tables.
//!
//! Input: TSV feature table (rows = k-mers, columns = samples)
//! Output: TSV symmetric distance matrix

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Arg, ArgAction, Command};
use log::info;

use jdist::{run, ComputeOptions};

fn cli() -> Command {
    Command::new("jdist")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Exact pairwise Jaccard distance matrices from k-mer presence/absence tables")
        .arg(
            Arg::new("input")
                .help("Feature table in TSV format (rows = k-mers, columns = samples)")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("output")
                .help("Output distance matrix in TSV format")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("threads")
                .help("Worker thread count (default: all logical CPUs)")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("block-size")
                .long("block-size")
                .help("Samples per block (default: all samples in one block)")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("low-memory")
                .long("low-memory")
                .help("Re-scan the input per block instead of loading the packed matrix once")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("compress")
                .long("compress")
                .help("zstd-compress the output matrix")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("gpu")
                .long("gpu")
                .help("Compute tiles on the GPU (requires a build with the `cuda` feature)")
                .action(ArgAction::SetTrue),
        )
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env().init();

    // usage problems exit 1, like every other failure
    let m = cli().try_get_matches().unwrap_or_else(|e| {
        let _ = e.print();
        std::process::exit(1);
    });

    let input = m.get_one::<PathBuf>("input").unwrap().clone();
    let output = m.get_one::<PathBuf>("output").unwrap().clone();
    let threads = m
        .get_one::<usize>("threads")
        .copied()
        .unwrap_or_else(num_cpus::get)
        .max(1);
    let block_size = m.get_one::<usize>("block-size").copied();
    if block_size == Some(0) {
        bail!("--block-size must be at least 1");
    }

    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .context("build rayon thread pool")?;
    info!("threads = {threads}");

    let opts = ComputeOptions {
        block_size,
        low_memory: m.get_flag("low-memory"),
        use_gpu: m.get_flag("gpu"),
        compress: m.get_flag("compress"),
    };

    let t0 = Instant::now();
    let summary = run(&input, &output, &opts)
        .with_context(|| format!("computing distance matrix for '{}'", input.display()))?;

    info!(
        "{} of {} samples kept, {} features",
        summary.filtered_samples, summary.original_samples, summary.num_features
    );
    info!("Done → {} ({} ms)", output.display(), t0.elapsed().as_millis());
    Ok(())
}
