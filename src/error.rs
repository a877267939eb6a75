//! Unified error types for the crate using `thiserror`.
//!
//! Every class here is fatal: the pipeline is a one-shot batch computation
//! with no retries or partial-result recovery.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JdistError {
    /// File cannot be opened, read, or written.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The input file has no header line.
    #[error("missing or empty header line in '{path}'")]
    Header { path: PathBuf },

    /// A data cell is not a valid integer.
    #[error("line {line}, field {column}: '{value}' is not a valid integer")]
    ValueParse {
        line: usize,
        column: usize,
        value: String,
    },

    /// A data row's field count differs from the header's sample count.
    #[error("line {line}: row has {got} values, expected {expected}")]
    RowWidth {
        line: usize,
        got: usize,
        expected: usize,
    },

    /// A re-scan of the file observed a different number of feature rows
    /// than the catalog pass recorded.
    #[error("feature count mismatch: read {read} rows, catalog recorded {expected}")]
    FeatureCountMismatch { read: usize, expected: usize },

    /// The compute backend cannot be initialized (no device, no driver,
    /// or the binary was built without GPU support).
    #[error("compute backend init failed: {0}")]
    BackendInit(String),

    /// The compute kernel failed to compile; the message carries the
    /// compiler's diagnostic log.
    #[error("compute kernel build failed: {0}")]
    BackendBuild(String),

    /// A runtime dispatch, allocation, or transfer call failed.
    #[error("compute backend runtime failure: {0}")]
    BackendRuntime(String),
}

pub type Result<T> = std::result::Result<T, JdistError>;

impl JdistError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
