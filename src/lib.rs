//! Exact all-pairs Jaccard distance over k-mer presence/absence tables.
//!
//! A feature table (TSV; rows = k-mers, columns = samples) is packed into
//! per-sample bit vectors; all-zero samples are filtered out; the sample
//! set is split into contiguous blocks and every unordered block-pair is
//! dispatched to a parallel AND/OR-popcount kernel; per-pair tiles are
//! merged into one symmetric distance matrix and written back out as TSV.

pub mod blocks;
pub mod dispatch;
pub mod error;
pub mod jaccard;
#[cfg(feature = "cuda")]
pub mod jaccard_gpu;
pub mod matrix;
pub mod table;

pub use dispatch::{compute_distance_matrix, run, ComputeOptions, RunSummary};
pub use error::{JdistError, Result};
pub use matrix::{DistanceMatrix, UNCOMPUTED};
pub use table::{
    filter_empty_samples, load_packed_block, read_catalog, FilteredSamples, PackedBlock,
    SampleCatalog,
};
