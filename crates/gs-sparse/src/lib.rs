//! Sparse triplet assembly for DAE Jacobians.
//!
//! Many objects contribute `(row, col, value)` entries for the same global
//! Jacobian. The [`SparseMatrixAssembler`] accumulates them, supports row
//! redirection (masking), and consolidates duplicates before export to either
//! a compressed-sparse-column matrix or a dense matrix.

pub mod assembler;
pub mod error;

pub use assembler::{NULL_LOCATION, SparseEntry, SparseMatrixAssembler};
pub use error::{SparseError, SparseResult};
