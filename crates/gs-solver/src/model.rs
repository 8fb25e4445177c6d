//! Callback contracts between the assembled system and the integrator.

use gs_sparse::SparseMatrixAssembler;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CscMatrix;
use thiserror::Error;

use crate::mode::SolverMode;

/// Point at which residuals, Jacobians and root functions are evaluated.
#[derive(Debug, Clone, Copy)]
pub struct StateData<'a> {
    pub time: f64,
    pub state: &'a [f64],
    pub deriv: &'a [f64],
    /// Derivative scaling `dx'/dx` of the current step, `1/h` for backward Euler.
    pub cj: f64,
}

impl<'a> StateData<'a> {
    pub fn new(time: f64, state: &'a [f64], deriv: &'a [f64]) -> Self {
        Self {
            time,
            state,
            deriv,
            cj: 0.0,
        }
    }

    pub fn with_cj(mut self, cj: f64) -> Self {
        self.cj = cj;
        self
    }
}

/// Failure raised inside a model callback.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CallbackError {
    /// The point is unusable but a smaller step may work.
    #[error("Recoverable callback failure: {0}")]
    Recoverable(String),

    /// The model cannot be evaluated at all.
    #[error("Unrecoverable callback failure: {0}")]
    Fatal(String),
}

/// The assembled system as seen by [`SolverInterface`](crate::SolverInterface).
///
/// Residual rows and Jacobian rows follow the state layout of
/// [`solver_mode`](DaeModel::solver_mode). Jacobian entries are
/// `dF/dx + cj * dF/dx'` and may be assigned more than once per position.
pub trait DaeModel {
    /// Layout of the state vector. The linear-solver field is ignored.
    fn solver_mode(&self) -> SolverMode;

    fn root_count(&self) -> usize;

    fn state_count(&self) -> usize {
        self.solver_mode().state_count()
    }

    /// Fill initial values for `x` and `x'` at time `t`.
    fn guess(&mut self, t: f64, x: &mut [f64], xdot: &mut [f64]);

    fn residual(&mut self, sd: &StateData<'_>, out: &mut [f64]) -> Result<(), CallbackError>;

    fn jacobian(
        &mut self,
        sd: &StateData<'_>,
        jac: &mut SparseMatrixAssembler,
    ) -> Result<(), CallbackError>;

    fn root_test(&mut self, sd: &StateData<'_>, out: &mut [f64]) -> Result<(), CallbackError> {
        let _ = sd;
        out.fill(1.0);
        Ok(())
    }

    /// State rows to hold fixed while masking is enabled.
    fn masked_states(&self) -> Vec<usize> {
        Vec::new()
    }
}

/// Jacobian in the form the linear solver asked for.
#[derive(Debug, Clone)]
pub enum JacobianMatrix {
    Dense(DMatrix<f64>),
    Sparse(CscMatrix<f64>),
}

impl JacobianMatrix {
    pub fn nrows(&self) -> usize {
        match self {
            JacobianMatrix::Dense(m) => m.nrows(),
            JacobianMatrix::Sparse(m) => m.nrows(),
        }
    }

    /// Solve `J dx = rhs`. `None` when the matrix is singular.
    ///
    /// The compressed form is factored densely; nalgebra-sparse ships no
    /// general LU.
    pub fn solve(&self, rhs: &DVector<f64>) -> Option<DVector<f64>> {
        match self {
            JacobianMatrix::Dense(m) => m.clone().lu().solve(rhs),
            JacobianMatrix::Sparse(m) => DMatrix::from(m).lu().solve(rhs),
        }
    }

    pub fn to_dense(&self) -> DMatrix<f64> {
        match self {
            JacobianMatrix::Dense(m) => m.clone(),
            JacobianMatrix::Sparse(m) => DMatrix::from(m),
        }
    }
}

/// What an [`Integrator`](crate::Integrator) calls back into.
pub trait DaeCallbacks {
    fn residual(
        &mut self,
        t: f64,
        x: &[f64],
        xdot: &[f64],
        out: &mut [f64],
    ) -> Result<(), CallbackError>;

    fn jacobian(
        &mut self,
        t: f64,
        x: &[f64],
        xdot: &[f64],
        cj: f64,
    ) -> Result<JacobianMatrix, CallbackError>;

    fn roots(
        &mut self,
        t: f64,
        x: &[f64],
        xdot: &[f64],
        out: &mut [f64],
    ) -> Result<(), CallbackError>;

    /// One flag per state, true for differential entries.
    fn differential(&self) -> &[bool];
}
