//! Hybrid DAE solver front end.
//!
//! This crate drives an implicit integrator over a globally assembled state
//! vector `F(t, x, x') = 0`. Objects contribute residuals and Jacobian entries
//! through [`DaeModel`]; [`SolverInterface`] owns the sparse assembler, the
//! masking of unconstrained rows, retries after recoverable failures, and
//! stops at root-function crossings so discrete logic can run between
//! continuous steps.

pub mod error;
pub mod implicit;
pub mod integrator;
pub mod interface;
pub mod mode;
pub mod model;
pub mod roots;
pub mod stats;

pub use error::{SolverError, SolverResult};
pub use implicit::ImplicitEuler;
pub use integrator::{Integrator, IntegratorStats, IntegratorStatus, StepMode};
pub use interface::{MASK_DIAGONAL, SolveOutcome, SolverInterface, SolverPhase};
pub use mode::{LinearSolverMode, SolverMode};
pub use model::{CallbackError, DaeCallbacks, DaeModel, JacobianMatrix, StateData};
pub use roots::RootDetector;
pub use stats::SolverStats;
