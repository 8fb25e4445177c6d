//! Error types for solver configuration and structure.
//!
//! Integration failures are not errors: they come back as
//! [`SolveOutcome::Failed`](crate::SolveOutcome::Failed). Everything here is
//! fatal for the current run.

use gs_core::GsError;
use gs_sparse::SparseError;
use thiserror::Error;

use crate::integrator::IntegratorStatus;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("Invalid operation: {what}")]
    InvalidOperation { what: String },

    #[error("Size mismatch for {what}: expected {expected}, got {actual}")]
    SizeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Structural error: {what}")]
    Structural { what: String },

    #[error("Unknown or invalid solver parameter '{name}'")]
    InvalidParameter { name: String },

    #[error("Integrator initialization failed: {status}")]
    Initialization { status: IntegratorStatus },
}

impl SolverError {
    pub(crate) fn invalid_op(what: impl Into<String>) -> Self {
        SolverError::InvalidOperation { what: what.into() }
    }

    pub(crate) fn param(name: &str) -> Self {
        SolverError::InvalidParameter {
            name: name.to_string(),
        }
    }
}

impl From<SparseError> for SolverError {
    fn from(e: SparseError) -> Self {
        SolverError::Structural {
            what: e.to_string(),
        }
    }
}

pub type SolverResult<T> = Result<T, SolverError>;

impl From<SolverError> for GsError {
    fn from(e: SolverError) -> Self {
        match e {
            SolverError::InvalidParameter { .. } => GsError::InvalidArg {
                what: "solver parameter",
            },
            other => GsError::Invariant {
                what: other.to_string(),
            },
        }
    }
}
