//! Run counters for a solver interface.

use tracing::info;

use crate::integrator::IntegratorStats;

/// Totals since allocation, surviving integrator re-initialisation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SolverStats {
    pub solver_calls: u64,
    pub retries: u64,
    pub steps: u64,
    pub residual_evals: u64,
    pub jacobian_evals: u64,
    pub nonlinear_iterations: u64,
    pub error_test_failures: u64,
    pub convergence_failures: u64,
    pub root_evals: u64,
    pub roots_found: u64,
    pub last_step: f64,
}

impl SolverStats {
    /// Add the work done between two integrator snapshots.
    ///
    /// A counter that went backwards means the integrator was reset in
    /// between; its `after` value is then the work done since the reset.
    pub fn absorb(&mut self, before: &IntegratorStats, after: &IntegratorStats) {
        fn delta(b: u64, a: u64) -> u64 {
            if a >= b { a - b } else { a }
        }
        self.steps += delta(before.steps, after.steps);
        self.residual_evals += delta(before.residual_evals, after.residual_evals);
        self.jacobian_evals += delta(before.jacobian_evals, after.jacobian_evals);
        self.nonlinear_iterations += delta(before.nonlinear_iterations, after.nonlinear_iterations);
        self.error_test_failures += delta(before.error_test_failures, after.error_test_failures);
        self.convergence_failures += delta(before.convergence_failures, after.convergence_failures);
        self.root_evals += delta(before.root_evals, after.root_evals);
        if after.last_step > 0.0 {
            self.last_step = after.last_step;
        }
    }

    /// Look a counter up by its parameter name.
    pub fn get(&self, name: &str) -> Option<f64> {
        let v = match name {
            "solvercalls" => self.solver_calls as f64,
            "retries" => self.retries as f64,
            "steps" => self.steps as f64,
            "residuals" | "resevals" => self.residual_evals as f64,
            "jacobians" | "jacevals" => self.jacobian_evals as f64,
            "iterations" | "nonlinearits" => self.nonlinear_iterations as f64,
            "errorfailures" => self.error_test_failures as f64,
            "convergencefailures" => self.convergence_failures as f64,
            "rootevals" => self.root_evals as f64,
            "roots" => self.roots_found as f64,
            "laststep" => self.last_step,
            _ => return None,
        };
        Some(v)
    }

    pub fn log(&self, name: &str) {
        info!(
            solver = name,
            calls = self.solver_calls,
            retries = self.retries,
            steps = self.steps,
            residual_evals = self.residual_evals,
            jacobian_evals = self.jacobian_evals,
            nonlinear_iterations = self.nonlinear_iterations,
            error_test_failures = self.error_test_failures,
            convergence_failures = self.convergence_failures,
            root_evals = self.root_evals,
            roots_found = self.roots_found,
            last_step = self.last_step,
            "solver statistics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absorb_handles_reset_counters() {
        let mut s = SolverStats::default();
        let a = IntegratorStats {
            steps: 10,
            ..Default::default()
        };
        let b = IntegratorStats {
            steps: 15,
            ..Default::default()
        };
        s.absorb(&a, &b);
        assert_eq!(s.steps, 5);
        let reset = IntegratorStats {
            steps: 3,
            ..Default::default()
        };
        s.absorb(&b, &reset);
        assert_eq!(s.steps, 8);
        assert_eq!(s.get("steps"), Some(8.0));
        assert_eq!(s.get("nonsense"), None);
    }
}
