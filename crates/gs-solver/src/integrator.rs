//! Contract for pluggable DAE integrators.

use std::fmt;

use crate::model::DaeCallbacks;

/// How far one `step` call may go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepMode {
    /// Integrate until the stop time, a root or a failure.
    #[default]
    Normal,
    /// Return after exactly one accepted internal step.
    SingleStep,
}

/// Result code of an integrator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntegratorStatus {
    Success,
    RootReturn,
    TooMuchWork,
    TooMuchAccuracy,
    ErrorTestFailure,
    ConvergenceFailure,
    LinearSolveFailure,
    ResidualFailure,
    RootFunctionFailure,
    IllegalInput,
    TooClose,
}

impl IntegratorStatus {
    pub fn description(self) -> &'static str {
        match self {
            IntegratorStatus::Success => "successful return",
            IntegratorStatus::RootReturn => "a root function crossed zero",
            IntegratorStatus::TooMuchWork => {
                "the solver took the maximum number of internal steps without reaching the stop time"
            }
            IntegratorStatus::TooMuchAccuracy => {
                "the solver could not satisfy the accuracy demanded by the tolerances"
            }
            IntegratorStatus::ErrorTestFailure => {
                "error test failures occurred repeatedly or with the minimum step size"
            }
            IntegratorStatus::ConvergenceFailure => {
                "nonlinear convergence failures occurred repeatedly or with the minimum step size"
            }
            IntegratorStatus::LinearSolveFailure => "the linear solver failed to solve the Newton system",
            IntegratorStatus::ResidualFailure => "the residual function failed unrecoverably",
            IntegratorStatus::RootFunctionFailure => "the root function failed",
            IntegratorStatus::IllegalInput => "an input to the solver was illegal",
            IntegratorStatus::TooClose => "the stop time is too close to the current time",
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, IntegratorStatus::Success | IntegratorStatus::RootReturn)
    }

    /// Failures worth retrying from the last good state with a smaller step.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            IntegratorStatus::TooMuchWork
                | IntegratorStatus::ErrorTestFailure
                | IntegratorStatus::ConvergenceFailure
                | IntegratorStatus::LinearSolveFailure
        )
    }
}

impl fmt::Display for IntegratorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Counters accumulated by an integrator since its last `init`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IntegratorStats {
    pub steps: u64,
    pub residual_evals: u64,
    pub jacobian_evals: u64,
    pub nonlinear_iterations: u64,
    pub error_test_failures: u64,
    pub convergence_failures: u64,
    pub root_evals: u64,
    pub last_step: f64,
}

/// A variable-step DAE integrator.
///
/// The integrator owns its copy of `x` and `x'`; callers read them back
/// through [`state`](Integrator::state) and [`derivative`](Integrator::derivative).
pub trait Integrator: Send {
    fn init(
        &mut self,
        cb: &mut dyn DaeCallbacks,
        t0: f64,
        x0: &[f64],
        xdot0: &[f64],
    ) -> IntegratorStatus;

    fn set_tolerances(&mut self, rel: f64, abs: f64);

    fn set_max_step(&mut self, h: f64);

    fn set_min_step(&mut self, h: f64);

    fn set_init_step(&mut self, h: f64);

    /// Internal steps allowed per `step` call.
    fn set_max_steps(&mut self, n: usize);

    /// Declare `count` root functions.
    fn root_init(&mut self, count: usize);

    /// Advance toward `t_stop`. Returns the status and the time reached.
    fn step(
        &mut self,
        cb: &mut dyn DaeCallbacks,
        t_stop: f64,
        mode: StepMode,
    ) -> (IntegratorStatus, f64);

    /// Per root function: +1 rising, -1 falling, 0 no crossing.
    fn root_info(&self) -> &[i8];

    fn time(&self) -> f64;

    fn state(&self) -> &[f64];

    fn derivative(&self) -> &[f64];

    fn stats(&self) -> IntegratorStats;
}
