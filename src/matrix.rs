//! Global distance matrix: sentinel-initialized storage, tile scatter with
//! mirrored writes, missing-cell audit, and the TSV writer.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use rayon::prelude::*;

use crate::blocks::Block;
use crate::error::{JdistError, Result};

/// Placeholder for cells no block-pair task has written yet. Negative, so
/// it is unreachable by any valid distance.
pub const UNCOMPUTED: f32 = -1.0;

pub struct DistanceMatrix {
    n: usize,
    data: Vec<f32>,
}

impl DistanceMatrix {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            data: vec![UNCOMPUTED; n * n],
        }
    }

    pub fn n(&self) -> usize {
        self.n
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f32 {
        self.data[i * self.n + j]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Scatter one `ni x nj` row-major tile into the cells covered by
    /// `(rows, cols)`, writing each cell and its mirror in the same step.
    pub fn scatter(&mut self, rows: &Block, cols: &Block, tile: &[f32]) {
        let nj = cols.len();
        debug_assert_eq!(tile.len(), rows.len() * nj);
        for (ii, gi) in rows.range().enumerate() {
            for (jj, gj) in cols.range().enumerate() {
                let d = tile[ii * nj + jj];
                self.data[gi * self.n + gj] = d;
                self.data[gj * self.n + gi] = d;
            }
        }
    }

    /// Cells still holding the sentinel. Nonzero after a full run means a
    /// partitioning or dispatch bug.
    pub fn missing(&self) -> usize {
        self.data.iter().filter(|&&d| d < 0.0).count()
    }

    /// Serialize as a square TSV matrix: a header row of sample names, then
    /// one named row per sample in the same order. Rows are rendered in
    /// parallel and written sequentially through one buffered writer.
    pub fn write_tsv(&self, names: &[String], path: &Path, compress: bool) -> Result<()> {
        debug_assert_eq!(names.len(), self.n);

        let mut header = String::with_capacity(self.n * 16);
        for name in names {
            header.push('\t');
            header.push_str(name);
        }
        header.push('\n');

        let rows: Vec<String> = (0..self.n)
            .into_par_iter()
            .map(|i| {
                let mut fmt = ryu::Buffer::new();
                let mut line = String::with_capacity(self.n * 12);
                line.push_str(&names[i]);
                for j in 0..self.n {
                    line.push('\t');
                    line.push_str(fmt.format_finite(self.get(i, j)));
                }
                line.push('\n');
                line
            })
            .collect();

        let io_err = |e: std::io::Error| JdistError::io(path, e);
        let file = File::create(path).map_err(io_err)?;
        let mut out: Box<dyn Write> = if compress {
            let mut enc = zstd::Encoder::new(file, 0).map_err(io_err)?;
            let threads = rayon::current_num_threads() as u32;
            if threads > 1 {
                enc.multithread(threads).map_err(io_err)?;
            }
            Box::new(BufWriter::with_capacity(16 << 20, enc.auto_finish()))
        } else {
            Box::new(BufWriter::with_capacity(16 << 20, file))
        };

        out.write_all(header.as_bytes()).map_err(io_err)?;
        for line in &rows {
            out.write_all(line.as_bytes()).map_err(io_err)?;
        }
        out.flush().map_err(io_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_matrix_is_entirely_missing() {
        let m = DistanceMatrix::new(3);
        assert_eq!(m.missing(), 9);
    }

    #[test]
    fn scatter_writes_cell_and_mirror() {
        let mut m = DistanceMatrix::new(4);
        let rows = Block { start: 0, end: 2 };
        let cols = Block { start: 2, end: 4 };
        m.scatter(&rows, &cols, &[0.1, 0.2, 0.3, 0.4]);
        assert_eq!(m.get(0, 2), 0.1);
        assert_eq!(m.get(2, 0), 0.1);
        assert_eq!(m.get(1, 3), 0.4);
        assert_eq!(m.get(3, 1), 0.4);
        // the two cross tiles are written; both diagonal tiles are not
        assert_eq!(m.missing(), 8);
    }

    #[test]
    fn self_pair_scatter_completes_a_one_block_matrix() {
        let mut m = DistanceMatrix::new(2);
        let b = Block { start: 0, end: 2 };
        m.scatter(&b, &b, &[0.0, 0.5, 0.5, 0.0]);
        assert_eq!(m.missing(), 0);
        assert_eq!(m.get(0, 1), 0.5);
        assert_eq!(m.get(1, 0), 0.5);
    }
}
