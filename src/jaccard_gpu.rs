//! CUDA compute backend: one NVRTC-compiled popcount kernel, the packed
//! matrix uploaded once, one tile launch per block-pair.
//!
//! The compiled module is shared read-only across launches; each launch
//! binds its arguments through a fresh builder and all launches go through
//! one stream in sequence, so no mutable invocation state is ever shared.

use std::path::Path;

use cudarc::driver::{CudaContext, CudaSlice, LaunchConfig, PushKernelArg};
use cudarc::nvrtc::compile_ptx;
use log::{debug, info};

use crate::blocks::Block;
use crate::error::{JdistError, Result};
use crate::matrix::DistanceMatrix;
use crate::table::{load_packed_block, FilteredSamples, SampleCatalog};

/// One thread per `(i, j)` cell of the tile. Global `i == j` is a
/// self-comparison and its distance is exactly 0.
const KERNEL_SRC: &str = r#"
extern "C" __global__ void jaccard_tile(
    const unsigned long long* __restrict__ words, // [n * num_words], row-major
    int n, int num_words,
    int i0, int j0,
    int bw, int bh,
    float* __restrict__ out // [bw * bh], row-major
){
    const int jj = blockIdx.x * blockDim.x + threadIdx.x;
    const int ii = blockIdx.y * blockDim.y + threadIdx.y;
    if (ii >= bw || jj >= bh) return;

    const int i = i0 + ii;
    const int j = j0 + jj;
    if (i == j) {
        out[(size_t)ii * (size_t)bh + (size_t)jj] = 0.0f;
        return;
    }

    const unsigned long long* wa = words + (size_t)i * (size_t)num_words;
    const unsigned long long* wb = words + (size_t)j * (size_t)num_words;
    unsigned long long inter = 0ULL;
    unsigned long long uni = 0ULL;
    for (int w = 0; w < num_words; ++w) {
        inter += __popcll(wa[w] & wb[w]);
        uni   += __popcll(wa[w] | wb[w]);
    }
    float dist = (uni == 0ULL) ? 1.0f : 1.0f - ((float)inter / (float)uni);
    out[(size_t)ii * (size_t)bh + (size_t)jj] = dist;
}
"#;

fn init_err(e: impl std::fmt::Display) -> JdistError {
    JdistError::BackendInit(e.to_string())
}

fn run_err(e: impl std::fmt::Display) -> JdistError {
    JdistError::BackendRuntime(e.to_string())
}

pub fn compute_distance_matrix(
    input: &Path,
    catalog: &SampleCatalog,
    filtered: &FilteredSamples,
    blocks: &[Block],
    pairs: &[(usize, usize)],
) -> Result<DistanceMatrix> {
    let n = filtered.len();
    if pairs.is_empty() {
        return Ok(DistanceMatrix::new(n));
    }
    let num_words = catalog.num_words();

    let ctx = CudaContext::new(0).map_err(init_err)?;
    let stream = ctx.default_stream();

    // compile once; the NVRTC log rides along on failure
    let ptx = compile_ptx(KERNEL_SRC).map_err(|e| JdistError::BackendBuild(format!("{e:?}")))?;
    let module = ctx
        .load_module(ptx)
        .map_err(|e| JdistError::BackendBuild(e.to_string()))?;
    let func = module
        .load_function("jaccard_tile")
        .map_err(|e| JdistError::BackendBuild(e.to_string()))?;

    let packed = load_packed_block(input, catalog, &filtered.original_columns)?;
    let host_words = packed.as_view().as_words();
    let d_words: CudaSlice<u64> = if host_words.is_empty() {
        // zero-feature table: the kernel never dereferences the buffer
        stream.alloc_zeros(1).map_err(run_err)?
    } else {
        stream.clone_htod(host_words).map_err(run_err)?
    };
    info!("gpu: uploaded {} samples x {} words", n, num_words);

    // reusable scratch sized for the largest tile
    let max_block = blocks.iter().map(Block::len).max().unwrap_or(0);
    let scratch = (max_block * max_block).max(1);
    let mut d_tile: CudaSlice<f32> = stream.alloc_zeros(scratch).map_err(run_err)?;
    let mut h_tile = vec![0.0f32; scratch];

    let n_i32 = n as i32;
    let words_i32 = num_words as i32;

    let mut matrix = DistanceMatrix::new(n);
    for &(bi, bj) in pairs {
        let rows = &blocks[bi];
        let cols = &blocks[bj];
        let bw = rows.len();
        let bh = cols.len();

        let blk = 16usize;
        let cfg = LaunchConfig {
            grid_dim: (
                ((bh + blk - 1) / blk) as u32,
                ((bw + blk - 1) / blk) as u32,
                1,
            ),
            block_dim: (blk as u32, blk as u32, 1),
            shared_mem_bytes: 0,
        };

        let i0 = rows.start as i32;
        let j0 = cols.start as i32;
        let bw_i32 = bw as i32;
        let bh_i32 = bh as i32;

        debug!("gpu: tile ({bi},{bj}) i0={i0} j0={j0} {bw}x{bh}");

        let mut launch = stream.launch_builder(&func);
        launch.arg(&d_words);
        launch.arg(&n_i32);
        launch.arg(&words_i32);
        launch.arg(&i0);
        launch.arg(&j0);
        launch.arg(&bw_i32);
        launch.arg(&bh_i32);
        launch.arg(&mut d_tile);
        unsafe { launch.launch(cfg) }.map_err(run_err)?;

        stream.memcpy_dtoh(&d_tile, &mut h_tile).map_err(run_err)?;
        matrix.scatter(rows, cols, &h_tile[..bw * bh]);
    }
    Ok(matrix)
}
