//! Error types for sparse assembly and export.

use thiserror::Error;

/// Errors raised while exporting an assembled matrix.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SparseError {
    #[error("Entry ({row}, {col}) outside declared limits {rows}x{cols}")]
    OutOfRange {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Matrix must be compacted before compressed export")]
    NotCompacted,

    #[error("Dimension not declared: {what}")]
    Unbounded { what: &'static str },

    #[error("Invalid sparsity pattern: {message}")]
    Pattern { message: String },
}

pub type SparseResult<T> = Result<T, SparseError>;
