//! Variable-step backward Euler for residual-form DAEs.

use gs_core::SMALL_TIME;
use nalgebra::DVector;
use tracing::trace;

use crate::integrator::{Integrator, IntegratorStats, IntegratorStatus, StepMode};
use crate::model::{CallbackError, DaeCallbacks};
use crate::roots::RootDetector;

/// Newton iteration settings for one implicit step.
#[derive(Debug, Clone)]
struct NewtonConfig {
    /// Maximum corrector iterations per step attempt.
    max_iterations: usize,
    /// Weighted-norm bound on the last correction.
    correction_tol: f64,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            max_iterations: 6,
            correction_tol: 0.1,
        }
    }
}

enum StepFailure {
    Convergence,
    LinearSolve,
    Residual,
}

/// Backward Euler with Newton corrector, local error control and root
/// localisation by bisection on the linear interpolant of each step.
///
/// The Jacobian `dF/dx + dF/dx' / h` is re-evaluated at every Newton
/// iteration.
#[derive(Debug, Clone)]
pub struct ImplicitEuler {
    t: f64,
    x: Vec<f64>,
    xdot: Vec<f64>,
    h: f64,
    init_step: f64,
    min_step: f64,
    max_step: f64,
    rtol: f64,
    atol: f64,
    max_steps: usize,
    newton: NewtonConfig,
    differential: Vec<bool>,
    roots: RootDetector,
    root_values: Vec<f64>,
    stats: IntegratorStats,
    initialized: bool,
}

impl Default for ImplicitEuler {
    fn default() -> Self {
        Self {
            t: 0.0,
            x: Vec::new(),
            xdot: Vec::new(),
            h: 0.0,
            init_step: 1e-3,
            min_step: 1e-12,
            max_step: f64::INFINITY,
            rtol: 1e-6,
            atol: 1e-8,
            max_steps: 5000,
            newton: NewtonConfig::default(),
            differential: Vec::new(),
            roots: RootDetector::default(),
            root_values: Vec::new(),
            stats: IntegratorStats::default(),
            initialized: false,
        }
    }
}

impl ImplicitEuler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Weighted root-mean-square norm over the differential entries.
    fn wrms(&self, v: &[f64], reference: &[f64], only_differential: bool) -> f64 {
        let mut sum = 0.0;
        let mut n = 0usize;
        for (i, (vi, ri)) in v.iter().zip(reference).enumerate() {
            if only_differential && !self.differential.get(i).copied().unwrap_or(true) {
                continue;
            }
            let w = self.rtol * ri.abs() + self.atol;
            sum += (vi / w).powi(2);
            n += 1;
        }
        if n == 0 { 0.0 } else { (sum / n as f64).sqrt() }
    }

    fn eval_roots(&mut self, cb: &mut dyn DaeCallbacks, t: f64, x: &[f64], xdot: &[f64]) -> bool {
        if self.roots.count() == 0 {
            return true;
        }
        self.stats.root_evals += 1;
        cb.roots(t, x, xdot, &mut self.root_values).is_ok()
    }

    /// Solve `F(t1, x, (x - x_old)/h) = 0` for `x`.
    fn newton_step(
        &mut self,
        cb: &mut dyn DaeCallbacks,
        t1: f64,
        h: f64,
    ) -> Result<(Vec<f64>, Vec<f64>), StepFailure> {
        let n = self.x.len();
        let cj = 1.0 / h;
        let mut x: Vec<f64> = self
            .x
            .iter()
            .zip(&self.xdot)
            .map(|(xi, di)| xi + h * di)
            .collect();
        let mut xdot = vec![0.0; n];
        let mut r = vec![0.0; n];

        for _ in 0..self.newton.max_iterations {
            self.stats.nonlinear_iterations += 1;
            for i in 0..n {
                xdot[i] = (x[i] - self.x[i]) * cj;
            }
            self.stats.residual_evals += 1;
            match cb.residual(t1, &x, &xdot, &mut r) {
                Ok(()) => {}
                Err(CallbackError::Recoverable(_)) => return Err(StepFailure::Convergence),
                Err(CallbackError::Fatal(_)) => return Err(StepFailure::Residual),
            }
            if r.iter().any(|v| !v.is_finite()) {
                return Err(StepFailure::Convergence);
            }

            self.stats.jacobian_evals += 1;
            let jac = match cb.jacobian(t1, &x, &xdot, cj) {
                Ok(j) => j,
                Err(CallbackError::Recoverable(_)) => return Err(StepFailure::LinearSolve),
                Err(CallbackError::Fatal(_)) => return Err(StepFailure::Residual),
            };
            let rhs = -DVector::from_column_slice(&r);
            let dx = jac.solve(&rhs).ok_or(StepFailure::LinearSolve)?;
            if dx.iter().any(|v| !v.is_finite()) {
                return Err(StepFailure::LinearSolve);
            }
            for i in 0..n {
                x[i] += dx[i];
            }
            if self.wrms(dx.as_slice(), &x, false) <= self.newton.correction_tol {
                for i in 0..n {
                    xdot[i] = (x[i] - self.x[i]) * cj;
                }
                return Ok((x, xdot));
            }
        }
        Err(StepFailure::Convergence)
    }

    fn interpolate(&self, x1: &[f64], t0: f64, t1: f64, t: f64) -> Vec<f64> {
        let s = if t1 > t0 { (t - t0) / (t1 - t0) } else { 1.0 };
        self.x
            .iter()
            .zip(x1)
            .map(|(a, b)| a + s * (b - a))
            .collect()
    }
}

impl Integrator for ImplicitEuler {
    fn init(
        &mut self,
        cb: &mut dyn DaeCallbacks,
        t0: f64,
        x0: &[f64],
        xdot0: &[f64],
    ) -> IntegratorStatus {
        if x0.len() != xdot0.len() || !t0.is_finite() || self.min_step > self.max_step {
            return IntegratorStatus::IllegalInput;
        }
        self.t = t0;
        self.x = x0.to_vec();
        self.xdot = xdot0.to_vec();
        self.differential = cb.differential().to_vec();
        self.h = self.init_step.clamp(self.min_step, self.max_step);
        self.stats = IntegratorStats::default();
        self.roots.clear_info();
        self.root_values = vec![0.0; self.roots.count()];
        let (x, xdot) = (self.x.clone(), self.xdot.clone());
        if !self.eval_roots(cb, t0, &x, &xdot) {
            return IntegratorStatus::RootFunctionFailure;
        }
        self.roots.arm(&self.root_values);
        self.initialized = true;
        IntegratorStatus::Success
    }

    fn set_tolerances(&mut self, rel: f64, abs: f64) {
        self.rtol = rel;
        self.atol = abs;
    }

    fn set_max_step(&mut self, h: f64) {
        self.max_step = if h > 0.0 { h } else { f64::INFINITY };
    }

    fn set_min_step(&mut self, h: f64) {
        self.min_step = h.max(0.0);
    }

    fn set_init_step(&mut self, h: f64) {
        if h > 0.0 {
            self.init_step = h;
        }
    }

    fn set_max_steps(&mut self, n: usize) {
        self.max_steps = n.max(1);
    }

    fn root_init(&mut self, count: usize) {
        self.roots.set_root_finding(count);
        self.root_values = vec![0.0; count];
    }

    fn step(
        &mut self,
        cb: &mut dyn DaeCallbacks,
        t_stop: f64,
        mode: StepMode,
    ) -> (IntegratorStatus, f64) {
        if !self.initialized || !t_stop.is_finite() || self.min_step > self.max_step {
            return (IntegratorStatus::IllegalInput, self.t);
        }
        if t_stop < self.t - SMALL_TIME {
            return (IntegratorStatus::IllegalInput, self.t);
        }
        if t_stop - self.t <= SMALL_TIME {
            return (IntegratorStatus::Success, self.t);
        }
        if self.rtol <= f64::EPSILON && self.atol <= f64::EPSILON {
            return (IntegratorStatus::TooMuchAccuracy, self.t);
        }
        self.roots.clear_info();

        let mut taken = 0usize;
        while taken < self.max_steps {
            let h_floor = self.min_step.max(4.0 * f64::EPSILON * self.t.abs().max(1.0));
            let remaining = t_stop - self.t;
            let mut h = self.h.min(self.max_step);
            if h >= remaining * (1.0 - 1e-9) {
                h = remaining;
            }
            if h < self.min_step && h < remaining {
                return (IntegratorStatus::TooClose, self.t);
            }
            let t1 = if h == remaining { t_stop } else { self.t + h };

            let (x1, xdot1) = match self.newton_step(cb, t1, h) {
                Ok(v) => v,
                Err(StepFailure::Residual) => return (IntegratorStatus::ResidualFailure, self.t),
                Err(failure) => {
                    self.stats.convergence_failures += 1;
                    self.h = 0.25 * h;
                    trace!(t = self.t, h = self.h, "implicit step failed, cutting step");
                    if self.h < h_floor {
                        let status = match failure {
                            StepFailure::LinearSolve => IntegratorStatus::LinearSolveFailure,
                            _ => IntegratorStatus::ConvergenceFailure,
                        };
                        return (status, self.t);
                    }
                    continue;
                }
            };

            // Local error: half the gap between predictor and corrector.
            let gap: Vec<f64> = x1
                .iter()
                .zip(&self.x)
                .zip(&self.xdot)
                .map(|((a, x0), d0)| 0.5 * (a - (x0 + h * d0)))
                .collect();
            let err = self.wrms(&gap, &x1, true);
            if err > 1.0 {
                self.stats.error_test_failures += 1;
                self.h = h * (0.9 / err.sqrt()).max(0.2);
                if self.h < h_floor {
                    return (IntegratorStatus::ErrorTestFailure, self.t);
                }
                continue;
            }

            if !self.eval_roots(cb, t1, &x1, &xdot1) {
                return (IntegratorStatus::RootFunctionFailure, self.t);
            }
            if self.roots.crossed(&self.root_values) {
                let t0 = self.t;
                let g1 = self.root_values.clone();
                let located = {
                    let x_base = self.x.clone();
                    let stats = &mut self.stats;
                    self.roots.locate(t0, t1, &g1, |t, out| {
                        let s = (t - t0) / (t1 - t0);
                        let xt: Vec<f64> = x_base
                            .iter()
                            .zip(&x1)
                            .map(|(a, b)| a + s * (b - a))
                            .collect();
                        stats.root_evals += 1;
                        cb.roots(t, &xt, &xdot1, out)
                    })
                };
                let (t_root, g_root) = match located {
                    Ok(v) => v,
                    Err(_) => return (IntegratorStatus::RootFunctionFailure, self.t),
                };
                let x_root = self.interpolate(&x1, t0, t1, t_root);
                self.roots.record(&g_root);
                self.stats.steps += 1;
                self.stats.last_step = t_root - t0;
                self.t = t_root;
                self.x = x_root;
                self.xdot = xdot1;
                return (IntegratorStatus::RootReturn, self.t);
            }
            self.roots.commit(&self.root_values);

            self.stats.steps += 1;
            self.stats.last_step = h;
            self.t = t1;
            self.x = x1;
            self.xdot = xdot1;
            taken += 1;
            let growth = if err > 1e-10 { 0.9 / err.sqrt() } else { 2.0 };
            self.h = (h * growth.clamp(0.5, 2.0)).clamp(self.min_step, self.max_step);

            if t1 >= t_stop {
                return (IntegratorStatus::Success, self.t);
            }
            if mode == StepMode::SingleStep {
                return (IntegratorStatus::Success, self.t);
            }
        }
        (IntegratorStatus::TooMuchWork, self.t)
    }

    fn root_info(&self) -> &[i8] {
        self.roots.root_info()
    }

    fn time(&self) -> f64 {
        self.t
    }

    fn state(&self) -> &[f64] {
        &self.x
    }

    fn derivative(&self) -> &[f64] {
        &self.xdot
    }

    fn stats(&self) -> IntegratorStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::DMatrix;

    use super::*;
    use crate::model::JacobianMatrix;

    /// x' = -k x, plus algebraic y = 2 x, root g = x - threshold.
    struct Decay {
        k: f64,
        threshold: f64,
        flags: Vec<bool>,
    }

    impl Decay {
        fn new(k: f64, threshold: f64) -> Self {
            Self {
                k,
                threshold,
                flags: vec![true, false],
            }
        }
    }

    impl DaeCallbacks for Decay {
        fn residual(&mut self, _t: f64, x: &[f64], xdot: &[f64], out: &mut [f64]) -> Result<(), CallbackError> {
            out[0] = xdot[0] + self.k * x[0];
            out[1] = x[1] - 2.0 * x[0];
            Ok(())
        }

        fn jacobian(&mut self, _t: f64, _x: &[f64], _xdot: &[f64], cj: f64) -> Result<JacobianMatrix, CallbackError> {
            Ok(JacobianMatrix::Dense(DMatrix::from_row_slice(
                2,
                2,
                &[cj + self.k, 0.0, -2.0, 1.0],
            )))
        }

        fn roots(&mut self, _t: f64, x: &[f64], _xdot: &[f64], out: &mut [f64]) -> Result<(), CallbackError> {
            out[0] = x[0] - self.threshold;
            Ok(())
        }

        fn differential(&self) -> &[bool] {
            &self.flags
        }
    }

    fn started(cb: &mut Decay) -> ImplicitEuler {
        let mut ie = ImplicitEuler::new();
        ie.set_tolerances(1e-6, 1e-8);
        ie.root_init(1);
        let k = cb.k;
        assert_eq!(
            ie.init(cb, 0.0, &[1.0, 2.0], &[-k, -2.0 * k]),
            IntegratorStatus::Success
        );
        ie
    }

    #[test]
    fn decay_reaches_stop_time_accurately() {
        let mut cb = Decay::new(1.0, -1.0);
        let mut ie = started(&mut cb);
        let (status, t) = ie.step(&mut cb, 1.0, StepMode::Normal);
        assert_eq!(status, IntegratorStatus::Success);
        assert_eq!(t, 1.0);
        let exact = (-1.0f64).exp();
        assert!((ie.state()[0] - exact).abs() < 5e-3, "x = {}", ie.state()[0]);
        assert!((ie.state()[1] - 2.0 * ie.state()[0]).abs() < 1e-9);
        assert!(ie.stats().steps > 1);
    }

    #[test]
    fn single_step_returns_early() {
        let mut cb = Decay::new(1.0, -1.0);
        let mut ie = started(&mut cb);
        let (status, t) = ie.step(&mut cb, 1.0, StepMode::SingleStep);
        assert_eq!(status, IntegratorStatus::Success);
        assert!(t < 1.0);
        assert_eq!(ie.stats().steps, 1);
    }

    #[test]
    fn stops_at_root_crossing() {
        let mut cb = Decay::new(1.0, 0.5);
        let mut ie = started(&mut cb);
        let (status, t) = ie.step(&mut cb, 2.0, StepMode::Normal);
        assert_eq!(status, IntegratorStatus::RootReturn);
        assert_eq!(ie.root_info(), &[-1]);
        assert!((ie.state()[0] - 0.5).abs() < 1e-6);
        assert!((t - 2f64.ln()).abs() < 1e-2);
    }

    #[test]
    fn too_little_work_allowed() {
        let mut cb = Decay::new(1.0, -1.0);
        let mut ie = started(&mut cb);
        ie.set_max_steps(2);
        ie.set_max_step(0.01);
        let (status, t) = ie.step(&mut cb, 1.0, StepMode::Normal);
        assert_eq!(status, IntegratorStatus::TooMuchWork);
        assert!(t < 0.05);
    }

    #[test]
    fn step_before_init_is_illegal() {
        let mut cb = Decay::new(1.0, -1.0);
        let mut ie = ImplicitEuler::new();
        assert_eq!(
            ie.step(&mut cb, 1.0, StepMode::Normal).0,
            IntegratorStatus::IllegalInput
        );
    }

    #[test]
    fn backwards_stop_time_is_illegal() {
        let mut cb = Decay::new(1.0, -1.0);
        let mut ie = started(&mut cb);
        ie.step(&mut cb, 0.5, StepMode::Normal);
        assert_eq!(
            ie.step(&mut cb, 0.1, StepMode::Normal).0,
            IntegratorStatus::IllegalInput
        );
    }
}
