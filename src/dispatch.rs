//! Orchestration: strategy selection, block-pair task dispatch, merge, and
//! the missing-pair audit.
//!
//! The set of `B(B+1)/2` block-pair tasks is fixed before dispatch and
//! distributed over the rayon pool (work stealing balances unequal block
//! costs). Tasks return their tiles; all writes into the global matrix
//! happen in a single-threaded reduction afterwards, so no two tasks ever
//! share mutable state and the tile for `(bi, bj)` covers cells `(i, j)`
//! and `(j, i)` in one step.

use std::path::Path;
use std::time::Instant;

use log::{info, warn};
use rayon::prelude::*;

use crate::blocks::{block_pairs, partition, Block};
use crate::error::Result;
use crate::jaccard::jaccard_tile;
use crate::matrix::DistanceMatrix;
use crate::table::{
    filter_empty_samples, load_packed_block, read_catalog, FilteredSamples, SampleCatalog,
};

/// Knobs for a single run.
#[derive(Clone, Debug, Default)]
pub struct ComputeOptions {
    /// Samples per block; `None` means one block holding every sample.
    pub block_size: Option<usize>,
    /// Re-scan the input per block instead of loading the packed matrix
    /// once. Bounds peak memory to the largest pair of blocks at the cost
    /// of repeated I/O.
    pub low_memory: bool,
    /// Compute tiles on the GPU (requires the `cuda` feature).
    pub use_gpu: bool,
    /// zstd-compress the output matrix.
    pub compress: bool,
}

/// Counts reported after a successful run.
#[derive(Clone, Copy, Debug)]
pub struct RunSummary {
    pub original_samples: usize,
    pub filtered_samples: usize,
    pub num_features: usize,
    pub missing_cells: usize,
}

type PairTile = (usize, usize, Vec<f32>);

pub fn compute_distance_matrix(
    input: &Path,
    catalog: &SampleCatalog,
    filtered: &FilteredSamples,
    opts: &ComputeOptions,
) -> Result<DistanceMatrix> {
    let n = filtered.len();
    let block_size = opts.block_size.unwrap_or(n).min(n).max(1);
    let blocks = partition(n, block_size);
    let pairs = block_pairs(blocks.len());
    info!(
        "dispatch: {} samples in {} block(s) of <= {}, {} block-pair task(s)",
        n,
        blocks.len(),
        block_size,
        pairs.len()
    );

    if opts.use_gpu {
        return gpu_matrix(input, catalog, filtered, &blocks, &pairs, opts);
    }

    let t0 = Instant::now();
    let tiles = if opts.low_memory {
        rescan_tiles(input, catalog, filtered, &blocks, &pairs)?
    } else {
        in_memory_tiles(input, catalog, filtered, &blocks, &pairs)?
    };
    info!(
        "computed {} tile(s) in {} ms",
        tiles.len(),
        t0.elapsed().as_millis()
    );

    let mut matrix = DistanceMatrix::new(n);
    for (bi, bj, tile) in tiles {
        matrix.scatter(&blocks[bi], &blocks[bj], &tile);
    }
    Ok(matrix)
}

/// Default strategy: one scan packs every filtered sample, blocks are
/// zero-copy views into that buffer.
fn in_memory_tiles(
    input: &Path,
    catalog: &SampleCatalog,
    filtered: &FilteredSamples,
    blocks: &[Block],
    pairs: &[(usize, usize)],
) -> Result<Vec<PairTile>> {
    let t0 = Instant::now();
    let packed = load_packed_block(input, catalog, &filtered.original_columns)?;
    info!(
        "packed {} samples x {} words in {} ms",
        packed.num_samples(),
        packed.num_words(),
        t0.elapsed().as_millis()
    );

    Ok(pairs
        .par_iter()
        .map(|&(bi, bj)| {
            let a = packed.view(blocks[bi].range());
            let b = packed.view(blocks[bj].range());
            (bi, bj, jaccard_tile(a, b, bi == bj))
        })
        .collect())
}

/// Low-memory strategy: each task re-scans the file for its blocks,
/// reusing the loaded block when `bi == bj`.
fn rescan_tiles(
    input: &Path,
    catalog: &SampleCatalog,
    filtered: &FilteredSamples,
    blocks: &[Block],
    pairs: &[(usize, usize)],
) -> Result<Vec<PairTile>> {
    pairs
        .par_iter()
        .map(|&(bi, bj)| -> Result<PairTile> {
            let cols_i = &filtered.original_columns[blocks[bi].range()];
            let a = load_packed_block(input, catalog, cols_i)?;
            let tile = if bi == bj {
                jaccard_tile(a.as_view(), a.as_view(), true)
            } else {
                let cols_j = &filtered.original_columns[blocks[bj].range()];
                let b = load_packed_block(input, catalog, cols_j)?;
                jaccard_tile(a.as_view(), b.as_view(), false)
            };
            Ok((bi, bj, tile))
        })
        .collect()
}

#[cfg(feature = "cuda")]
fn gpu_matrix(
    input: &Path,
    catalog: &SampleCatalog,
    filtered: &FilteredSamples,
    blocks: &[Block],
    pairs: &[(usize, usize)],
    opts: &ComputeOptions,
) -> Result<DistanceMatrix> {
    if opts.low_memory {
        warn!("--low-memory has no effect on the GPU backend; the packed matrix is uploaded once");
    }
    crate::jaccard_gpu::compute_distance_matrix(input, catalog, filtered, blocks, pairs)
}

#[cfg(not(feature = "cuda"))]
fn gpu_matrix(
    _input: &Path,
    _catalog: &SampleCatalog,
    _filtered: &FilteredSamples,
    _blocks: &[Block],
    _pairs: &[(usize, usize)],
    _opts: &ComputeOptions,
) -> Result<DistanceMatrix> {
    Err(crate::error::JdistError::BackendInit(
        "this binary was built without CUDA support (rebuild with --features cuda)".into(),
    ))
}

/// Full pipeline: catalog -> filter -> compute -> audit -> write.
pub fn run(input: &Path, output: &Path, opts: &ComputeOptions) -> Result<RunSummary> {
    let t0 = Instant::now();

    let catalog = read_catalog(input)?;
    info!(
        "catalog: {} samples, {} features",
        catalog.original_count(),
        catalog.num_features
    );

    let filtered = filter_empty_samples(input, &catalog)?;
    let dropped = catalog.original_count() - filtered.len();
    if dropped > 0 {
        info!(
            "dropped {} all-zero sample(s), {} remain",
            dropped,
            filtered.len()
        );
    }

    let matrix = compute_distance_matrix(input, &catalog, &filtered, opts)?;

    let missing = matrix.missing();
    if missing > 0 {
        warn!(
            "{} of {} cells were never written",
            missing,
            matrix.n() * matrix.n()
        );
    }

    matrix.write_tsv(&filtered.names, output, opts.compress)?;
    info!(
        "wrote {} x {} matrix in {} ms total",
        matrix.n(),
        matrix.n(),
        t0.elapsed().as_millis()
    );

    Ok(RunSummary {
        original_samples: catalog.original_count(),
        filtered_samples: filtered.len(),
        num_features: catalog.num_features,
        missing_cells: missing,
    })
}
