//! TSV feature-table readers: sample catalog, empty-sample filter, and
//! bit-packed block loading.
//!
//! The table layout is rows = features (k-mers), columns = samples; the
//! first field of every row is the feature identifier. Values are integers,
//! zero = absent, any nonzero = present.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::ops::Range;
use std::path::Path;

use bitvec::vec::BitVec;
use log::debug;

use crate::error::{JdistError, Result};

pub const FIELD_DELIMITER: char = '\t';
pub const BITS_PER_WORD: usize = 64;

/// Packed words needed to hold one presence bit per feature.
pub fn words_per_sample(num_features: usize) -> usize {
    (num_features + BITS_PER_WORD - 1) / BITS_PER_WORD
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).map_err(|e| JdistError::io(path, e))?;
    Ok(BufReader::new(file))
}

fn parse_header(line: &str) -> Vec<String> {
    let mut fields = line.split(FIELD_DELIMITER);
    fields.next(); // feature-id column
    fields
        .map(|s| s.trim_end_matches('\r').to_owned())
        .collect()
}

/// Split a data row into its value fields (feature id discarded) and
/// enforce the width contract: every row carries one value per sample.
fn split_row<'a>(line: &'a str, line_no: usize, expected: usize) -> Result<Vec<&'a str>> {
    let mut fields = line.split(FIELD_DELIMITER);
    fields.next(); // feature id
    let values: Vec<&str> = fields.map(|s| s.trim_end_matches('\r')).collect();
    if values.len() != expected {
        return Err(JdistError::RowWidth {
            line: line_no,
            got: values.len(),
            expected,
        });
    }
    Ok(values)
}

fn parse_cell(raw: &str, line_no: usize, col: usize) -> Result<i64> {
    raw.trim().parse::<i64>().map_err(|_| JdistError::ValueParse {
        line: line_no,
        // 1-based field position in the file; the feature id is field 1
        column: col + 2,
        value: raw.to_owned(),
    })
}

// ---------------- sample catalog (first pass) ----------------

pub struct SampleCatalog {
    /// Sample names in header order.
    pub names: Vec<String>,
    /// Data rows in the file; fixed after this pass, every later pass must
    /// observe exactly this many.
    pub num_features: usize,
}

impl SampleCatalog {
    pub fn original_count(&self) -> usize {
        self.names.len()
    }

    pub fn num_words(&self) -> usize {
        words_per_sample(self.num_features)
    }
}

/// One pass over the file: sample names from the header, then a row count.
/// Data rows are counted, never parsed.
pub fn read_catalog(path: &Path) -> Result<SampleCatalog> {
    let mut lines = open(path)?.lines();
    let header = match lines.next() {
        Some(line) => line.map_err(|e| JdistError::io(path, e))?,
        None => return Err(JdistError::Header { path: path.into() }),
    };
    let names = parse_header(&header);

    let mut num_features = 0usize;
    for line in lines {
        line.map_err(|e| JdistError::io(path, e))?;
        num_features += 1;
    }
    Ok(SampleCatalog {
        names,
        num_features,
    })
}

// ---------------- zero-column filter (second pass) ----------------

/// Surviving samples, in original relative order.
#[derive(Debug)]
pub struct FilteredSamples {
    pub names: Vec<String>,
    /// filtered index -> original header column index; injective and
    /// monotonically increasing.
    pub original_columns: Vec<usize>,
}

impl FilteredSamples {
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Second pass: drop samples whose column is zero on every feature row.
///
/// An all-zero presence vector makes every union with it degenerate, so
/// such samples are removed here rather than special-cased downstream.
pub fn filter_empty_samples(path: &Path, catalog: &SampleCatalog) -> Result<FilteredSamples> {
    let mut lines = open(path)?.lines();
    let header = match lines.next() {
        Some(line) => line.map_err(|e| JdistError::io(path, e))?,
        None => return Err(JdistError::Header { path: path.into() }),
    };
    let header_names = parse_header(&header);
    let original_n = header_names.len();

    let mut ever_nonzero: BitVec = BitVec::repeat(false, original_n);
    let mut rows = 0usize;
    for (idx, line) in lines.enumerate() {
        let line = line.map_err(|e| JdistError::io(path, e))?;
        let line_no = idx + 2; // header is line 1
        let values = split_row(&line, line_no, original_n)?;
        for (col, raw) in values.iter().enumerate() {
            if parse_cell(raw, line_no, col)? != 0 {
                ever_nonzero.set(col, true);
            }
        }
        rows += 1;
    }
    if rows != catalog.num_features {
        return Err(JdistError::FeatureCountMismatch {
            read: rows,
            expected: catalog.num_features,
        });
    }

    let mut names = Vec::new();
    let mut original_columns = Vec::new();
    for (col, name) in header_names.into_iter().enumerate() {
        if ever_nonzero[col] {
            original_columns.push(col);
            names.push(name);
        }
    }
    Ok(FilteredSamples {
        names,
        original_columns,
    })
}

// ---------------- bit-packed block loading (per-block passes) ----------------

/// Presence bitmaps for a set of samples, one flat row of `num_words`
/// 64-bit words per sample. Bit `k % 64` of word `k / 64` encodes
/// "feature k present".
pub struct PackedBlock {
    num_samples: usize,
    num_words: usize,
    words: Vec<u64>,
}

impl PackedBlock {
    pub(crate) fn zeroed(num_samples: usize, num_words: usize) -> Self {
        Self {
            num_samples,
            num_words,
            words: vec![0u64; num_samples * num_words],
        }
    }

    #[inline]
    pub(crate) fn set_bit(&mut self, sample: usize, feature: usize) {
        let word = feature / BITS_PER_WORD;
        let bit = feature % BITS_PER_WORD;
        self.words[sample * self.num_words + word] |= 1u64 << bit;
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    pub fn num_words(&self) -> usize {
        self.num_words
    }

    /// Borrow whole sample rows `range` without copying.
    pub fn view(&self, range: Range<usize>) -> PackedView<'_> {
        PackedView {
            words: &self.words[range.start * self.num_words..range.end * self.num_words],
            num_samples: range.end - range.start,
            num_words: self.num_words,
        }
    }

    pub fn as_view(&self) -> PackedView<'_> {
        self.view(0..self.num_samples)
    }
}

/// A borrowed run of whole sample rows out of a [`PackedBlock`].
#[derive(Clone, Copy)]
pub struct PackedView<'a> {
    words: &'a [u64],
    num_samples: usize,
    num_words: usize,
}

impl<'a> PackedView<'a> {
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    pub fn num_words(&self) -> usize {
        self.num_words
    }

    #[inline]
    pub fn sample_words(&self, sample: usize) -> &'a [u64] {
        &self.words[sample * self.num_words..(sample + 1) * self.num_words]
    }

    /// The flat row-major word buffer, e.g. for a device upload.
    pub fn as_words(&self) -> &'a [u64] {
        self.words
    }
}

/// Re-scan the file and pack presence bits for the requested original
/// columns.
///
/// Peak memory is bounded by `original_columns.len() * num_words` words,
/// at the cost of one full scan per call.
pub fn load_packed_block(
    path: &Path,
    catalog: &SampleCatalog,
    original_columns: &[usize],
) -> Result<PackedBlock> {
    let mut lines = open(path)?.lines();
    let header = lines.next().transpose().map_err(|e| JdistError::io(path, e))?;
    if header.is_none() {
        return Err(JdistError::Header { path: path.into() });
    }

    let expected_width = catalog.original_count();
    let mut block = PackedBlock::zeroed(original_columns.len(), catalog.num_words());

    let mut feature_idx = 0usize;
    for (idx, line) in lines.enumerate() {
        let line = line.map_err(|e| JdistError::io(path, e))?;
        if feature_idx == catalog.num_features {
            // the file grew since the catalog pass; packed capacity is spent
            return Err(JdistError::FeatureCountMismatch {
                read: feature_idx + 1,
                expected: catalog.num_features,
            });
        }
        let line_no = idx + 2;
        let values = split_row(&line, line_no, expected_width)?;
        for (slot, &col) in original_columns.iter().enumerate() {
            if parse_cell(values[col], line_no, col)? != 0 {
                block.set_bit(slot, feature_idx);
            }
        }
        feature_idx += 1;
    }
    if feature_idx != catalog.num_features {
        return Err(JdistError::FeatureCountMismatch {
            read: feature_idx,
            expected: catalog.num_features,
        });
    }
    debug!(
        "packed block: {} samples x {} words",
        block.num_samples, block.num_words
    );
    Ok(block)
}
