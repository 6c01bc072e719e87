//! Error types for the longtail-data crate.

use std::path::PathBuf;

use thiserror::Error;

/// Error type for data preparation.
#[derive(Debug, Error)]
pub enum DataError {
    /// The data file could not be opened or read.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The CSV reader rejected the file.
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// Path being read.
        path: PathBuf,
        /// Underlying CSV error.
        #[source]
        source: csv::Error,
    },

    /// A required column is absent.
    #[error("Missing column `{column}` in {path}")]
    MissingColumn {
        /// Path being read.
        path: PathBuf,
        /// Name of the missing column.
        column: String,
    },

    /// A cell is not a number.
    #[error("Invalid number `{value}` in {path}, line {line}, column `{column}`")]
    InvalidNumber {
        /// Path being read.
        path: PathBuf,
        /// One-based line number.
        line: u64,
        /// Column name.
        column: String,
        /// Offending cell.
        value: String,
    },

    /// Buffers of a frame disagree on the number of rows or columns.
    #[error("Shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Which buffer was inconsistent.
        context: &'static str,
        /// The expected length.
        expected: usize,
        /// The actual length.
        actual: usize,
    },

    /// The provider has no data for the requested split.
    #[error("Split `{0}` is not available")]
    MissingSplit(String),

    /// A split name is not one of train, valid or test.
    #[error("Unknown split `{0}`")]
    UnknownSplit(String),
}

/// Result type alias for data preparation.
pub type DataResult<T> = Result<T, DataError>;
