//! Lifecycle, parameters and failure handling around an integrator.

use gs_core::{Tolerances, nearly_equal};
use gs_sparse::{NULL_LOCATION, SparseError, SparseMatrixAssembler};
use tracing::{debug, info, warn};

use crate::error::{SolverError, SolverResult};
use crate::implicit::ImplicitEuler;
use crate::integrator::{Integrator, IntegratorStatus, StepMode};
use crate::mode::{LinearSolverMode, SolverMode};
use crate::model::{CallbackError, DaeCallbacks, DaeModel, JacobianMatrix, StateData};
use crate::stats::SolverStats;

/// Diagonal entry placed on a masked Jacobian row.
pub const MASK_DIAGONAL: f64 = 100.0;

/// Where the interface is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SolverPhase {
    Uninitialized,
    Allocated,
    Initialized,
}

/// How a `solve` call ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SolveOutcome {
    /// Reached the stop time, or finished the single requested step.
    ReachedTarget { t: f64 },
    /// Stopped at a root crossing; see [`SolverInterface::get_roots`].
    RootFound { t: f64 },
    /// Integration failed after every retry.
    Failed {
        last_good_time: f64,
        status: IntegratorStatus,
        root_index: Option<usize>,
    },
}

#[derive(Debug, Clone, Default)]
struct MaskSet {
    rows: Vec<usize>,
    held: Vec<f64>,
}

/// Adapts a [`DaeModel`] to the callbacks an integrator expects.
struct ModelCallbacks<'a> {
    model: &'a mut dyn DaeModel,
    assembler: &'a mut SparseMatrixAssembler,
    mask: Option<&'a MaskSet>,
    linear: LinearSolverMode,
    differential: &'a [bool],
    check_missing: &'a mut bool,
    structural: Option<SparseError>,
}

impl DaeCallbacks for ModelCallbacks<'_> {
    fn residual(
        &mut self,
        t: f64,
        x: &[f64],
        xdot: &[f64],
        out: &mut [f64],
    ) -> Result<(), CallbackError> {
        out.fill(0.0);
        self.model.residual(&StateData::new(t, x, xdot), out)?;
        if let Some(mask) = self.mask {
            for (row, held) in mask.rows.iter().zip(&mask.held) {
                out[*row] = MASK_DIAGONAL * (x[*row] - held);
            }
        }
        Ok(())
    }

    fn jacobian(
        &mut self,
        t: f64,
        x: &[f64],
        xdot: &[f64],
        cj: f64,
    ) -> Result<JacobianMatrix, CallbackError> {
        self.assembler.clear();
        let sd = StateData::new(t, x, xdot).with_cj(cj);
        self.model.jacobian(&sd, self.assembler)?;
        if let Some(mask) = self.mask {
            for row in &mask.rows {
                self.assembler.translate_row(*row, NULL_LOCATION);
                self.assembler.assign(*row, *row, MASK_DIAGONAL);
            }
        }
        self.assembler.filter();
        self.assembler.compact();

        if *self.check_missing {
            *self.check_missing = false;
            let missing = self.assembler.find_missing();
            if !missing.is_empty() {
                warn!(rows = ?missing, "Jacobian rows with no entries");
            }
        }

        let exported = match self.linear {
            LinearSolverMode::Dense => self.assembler.to_dense().map(JacobianMatrix::Dense),
            LinearSolverMode::Sparse => self.assembler.to_csc().map(JacobianMatrix::Sparse),
        };
        exported.map_err(|e| {
            let message = e.to_string();
            self.structural = Some(e);
            CallbackError::Fatal(message)
        })
    }

    fn roots(
        &mut self,
        t: f64,
        x: &[f64],
        xdot: &[f64],
        out: &mut [f64],
    ) -> Result<(), CallbackError> {
        self.model.root_test(&StateData::new(t, x, xdot), out)
    }

    fn differential(&self) -> &[bool] {
        self.differential
    }
}

/// Front end over one integrator for one state-vector layout.
///
/// Lifecycle: `allocate` → `initialize` → `solve` repeatedly. A root stops
/// the solve; the caller must then `reinitialize` (after changing objects)
/// or `rearm` before the next `solve`.
pub struct SolverInterface {
    name: String,
    integrator: Box<dyn Integrator>,
    phase: SolverPhase,
    state_count: usize,
    root_count: usize,
    linear: LinearSolverMode,
    tolerance: f64,
    step: f64,
    min_step: Option<f64>,
    max_step: Option<f64>,
    max_retries: u32,
    max_internal_steps: usize,
    use_mask: bool,
    mask: MaskSet,
    assembler: SparseMatrixAssembler,
    mode: SolverMode,
    differential: Vec<bool>,
    roots_found: Vec<usize>,
    root_pending: bool,
    check_missing: bool,
    time: f64,
    stats: SolverStats,
}

impl std::fmt::Debug for SolverInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolverInterface")
            .field("name", &self.name)
            .field("phase", &self.phase)
            .field("state_count", &self.state_count)
            .field("root_count", &self.root_count)
            .field("time", &self.time)
            .finish_non_exhaustive()
    }
}

impl SolverInterface {
    /// Interface over the built-in [`ImplicitEuler`].
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_integrator(name, Box::new(ImplicitEuler::new()))
    }

    pub fn with_integrator(name: impl Into<String>, integrator: Box<dyn Integrator>) -> Self {
        Self {
            name: name.into(),
            integrator,
            phase: SolverPhase::Uninitialized,
            state_count: 0,
            root_count: 0,
            linear: LinearSolverMode::Dense,
            tolerance: 1e-6,
            step: 0.0,
            min_step: None,
            max_step: None,
            max_retries: 4,
            max_internal_steps: 5000,
            use_mask: false,
            mask: MaskSet::default(),
            assembler: SparseMatrixAssembler::new(),
            mode: SolverMode::default(),
            differential: Vec::new(),
            roots_found: Vec::new(),
            root_pending: false,
            check_missing: true,
            time: 0.0,
            stats: SolverStats::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> SolverPhase {
        self.phase
    }

    pub fn is_initialized(&self) -> bool {
        self.phase == SolverPhase::Initialized
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn state_count(&self) -> usize {
        self.state_count
    }

    pub fn root_count(&self) -> usize {
        self.root_count
    }

    pub fn state(&self) -> &[f64] {
        self.integrator.state()
    }

    pub fn derivative(&self) -> &[f64] {
        self.integrator.derivative()
    }

    /// Size the solver for `state_count` states and `root_count` root
    /// functions.
    ///
    /// Changing either size drops back to `Allocated`, so the next `solve`
    /// requires a fresh `initialize`.
    pub fn allocate(&mut self, state_count: usize, root_count: usize) -> SolverResult<()> {
        if state_count == 0 {
            return Err(SolverError::invalid_op("cannot allocate a solver with no states"));
        }
        let same = self.phase != SolverPhase::Uninitialized
            && state_count == self.state_count
            && root_count == self.root_count;
        if same {
            return Ok(());
        }
        self.state_count = state_count;
        self.root_count = root_count;
        self.assembler = SparseMatrixAssembler::with_limits(state_count, state_count);
        self.assembler.reserve(state_count * 4);
        self.integrator.root_init(root_count);
        self.roots_found.clear();
        self.root_pending = false;
        self.phase = SolverPhase::Allocated;
        debug!(solver = %self.name, state_count, root_count, "solver allocated");
        Ok(())
    }

    fn check_sizes(&self, model: &dyn DaeModel) -> SolverResult<()> {
        let states = model.state_count();
        if states != self.state_count {
            return Err(SolverError::SizeMismatch {
                what: "states",
                expected: self.state_count,
                actual: states,
            });
        }
        let roots = model.root_count();
        if roots != self.root_count {
            return Err(SolverError::SizeMismatch {
                what: "root functions",
                expected: self.root_count,
                actual: roots,
            });
        }
        Ok(())
    }

    fn push_params(&mut self) {
        let integrator = &mut self.integrator;
        integrator.set_tolerances(self.tolerance, self.tolerance * 1e-2);
        integrator.set_init_step(self.step);
        integrator.set_min_step(self.min_step.unwrap_or(0.0));
        integrator.set_max_step(self.max_step.unwrap_or(0.0));
        integrator.set_max_steps(self.max_internal_steps);
    }

    fn push_if_initialized(&mut self) {
        if self.is_initialized() {
            self.push_params();
        }
    }

    fn load_mask(&mut self, model: &dyn DaeModel, x: &[f64]) {
        self.mask = MaskSet::default();
        if !self.use_mask {
            return;
        }
        let rows: Vec<usize> = model
            .masked_states()
            .into_iter()
            .filter(|r| *r < self.state_count)
            .collect();
        if !rows.is_empty() {
            info!(solver = %self.name, rows = ?rows, "masking unconstrained rows");
        }
        self.mask.held = rows.iter().map(|r| x[*r]).collect();
        self.mask.rows = rows;
    }

    fn parts<'a>(
        &'a mut self,
        model: &'a mut dyn DaeModel,
    ) -> (&'a mut dyn Integrator, ModelCallbacks<'a>) {
        let mask = if self.use_mask && !self.mask.rows.is_empty() {
            Some(&self.mask)
        } else {
            None
        };
        let cb = ModelCallbacks {
            model,
            assembler: &mut self.assembler,
            mask,
            linear: self.linear,
            differential: &self.differential,
            check_missing: &mut self.check_missing,
            structural: None,
        };
        (self.integrator.as_mut(), cb)
    }

    /// Start integration at `t0` from the model's initial guess.
    pub fn initialize(&mut self, model: &mut dyn DaeModel, t0: f64) -> SolverResult<()> {
        if self.phase == SolverPhase::Uninitialized {
            return Err(SolverError::invalid_op("initialize called before allocate"));
        }
        self.check_sizes(model)?;
        let mut x = vec![0.0; self.state_count];
        let mut xdot = vec![0.0; self.state_count];
        model.guess(t0, &mut x, &mut xdot);
        self.mode = model.solver_mode();
        self.differential = self.mode.differential_flags();
        self.differential.resize(self.state_count, false);
        self.load_mask(model, &x);
        self.start(model, t0, &x, &xdot)?;
        debug!(solver = %self.name, t0, "solver initialized");
        Ok(())
    }

    fn start(
        &mut self,
        model: &mut dyn DaeModel,
        t0: f64,
        x: &[f64],
        xdot: &[f64],
    ) -> SolverResult<()> {
        self.push_params();
        self.check_missing = true;
        let status = {
            let (integrator, mut cb) = self.parts(model);
            integrator.init(&mut cb, t0, x, xdot)
        };
        if status != IntegratorStatus::Success {
            self.phase = SolverPhase::Allocated;
            return Err(SolverError::Initialization { status });
        }
        self.phase = SolverPhase::Initialized;
        self.time = t0;
        self.roots_found.clear();
        self.root_pending = false;
        Ok(())
    }

    /// Re-run initialization at `t` after the model's objects changed.
    pub fn reinitialize(&mut self, model: &mut dyn DaeModel, t: f64) -> SolverResult<()> {
        if !self.is_initialized() {
            return Err(SolverError::invalid_op("reinitialize called before initialize"));
        }
        self.initialize(model, t)
    }

    /// Partition captured at the last (re)initialization.
    pub fn solver_mode(&self) -> &SolverMode {
        &self.mode
    }

    /// Copy the current algebraic states into their block of `paired`, the
    /// state vector of an algebraic-only solve sharing this layout.
    pub fn export_algebraic(&self, paired: &mut [f64]) -> SolverResult<()> {
        if !self.is_initialized() {
            return Err(SolverError::invalid_op(
                "export_algebraic called before initialize",
            ));
        }
        let range = self
            .mode
            .paired_range()
            .ok_or_else(|| SolverError::invalid_op("solver mode has no paired offset"))?;
        let len = paired.len();
        let block = paired.get_mut(range.clone()).ok_or(SolverError::SizeMismatch {
            what: "paired states",
            expected: range.end,
            actual: len,
        })?;
        block.copy_from_slice(&self.integrator.state()[self.mode.algebraic_range()]);
        Ok(())
    }

    /// Acknowledge a found root and continue from the current state.
    pub fn rearm(&mut self, model: &mut dyn DaeModel, t: f64) -> SolverResult<()> {
        if !self.is_initialized() {
            return Err(SolverError::invalid_op("rearm called before initialize"));
        }
        self.check_sizes(model)?;
        let x = self.integrator.state().to_vec();
        let xdot = self.integrator.derivative().to_vec();
        self.start(model, t, &x, &xdot)
    }

    /// Integrate toward `t_stop`.
    pub fn solve(
        &mut self,
        model: &mut dyn DaeModel,
        t_stop: f64,
        mode: StepMode,
    ) -> SolverResult<SolveOutcome> {
        if !self.is_initialized() {
            return Err(SolverError::invalid_op("solve called before initialize"));
        }
        if self.root_pending {
            return Err(SolverError::invalid_op(
                "solve called with an unacknowledged root; reinitialize or rearm first",
            ));
        }
        if !t_stop.is_finite() {
            return Err(SolverError::invalid_op("stop time must be finite"));
        }
        self.check_sizes(model)?;

        let mut retries = 0u32;
        let mut h0 = self.integrator.stats().last_step;
        if h0 <= 0.0 {
            h0 = if self.step > 0.0 { self.step } else { 1e-3 };
        }

        loop {
            self.stats.solver_calls += 1;
            let before = self.integrator.stats();
            let (status, t, structural) = {
                let (integrator, mut cb) = self.parts(model);
                let (status, t) = integrator.step(&mut cb, t_stop, mode);
                (status, t, cb.structural.take())
            };
            let after = self.integrator.stats();
            self.stats.absorb(&before, &after);
            self.time = t;

            if let Some(e) = structural {
                return Err(e.into());
            }

            match status {
                IntegratorStatus::Success => return Ok(SolveOutcome::ReachedTarget { t }),
                IntegratorStatus::RootReturn => {
                    self.roots_found = self
                        .integrator
                        .root_info()
                        .iter()
                        .enumerate()
                        .filter_map(|(i, d)| (*d != 0).then_some(i))
                        .collect();
                    self.root_pending = true;
                    self.stats.roots_found += self.roots_found.len() as u64;
                    debug!(solver = %self.name, t, roots = ?self.roots_found, "root found");
                    return Ok(SolveOutcome::RootFound { t });
                }
                s if s.is_retryable() && retries < self.max_retries => {
                    retries += 1;
                    self.stats.retries += 1;
                    h0 *= 0.5;
                    warn!(
                        solver = %self.name,
                        t,
                        status = %s,
                        retry = retries,
                        step = h0,
                        "integration failed, retrying with a smaller step"
                    );
                    let x = self.integrator.state().to_vec();
                    let xdot = self.integrator.derivative().to_vec();
                    let integrator = self.integrator.as_mut();
                    integrator.set_init_step(h0);
                    if self.min_step.is_some_and(|m| m > h0) {
                        integrator.set_min_step(h0);
                    }
                    let restart = {
                        let (integrator, mut cb) = self.parts(model);
                        integrator.init(&mut cb, t, &x, &xdot)
                    };
                    if restart != IntegratorStatus::Success {
                        return Ok(self.failed(t, restart));
                    }
                }
                s => return Ok(self.failed(t, s)),
            }
        }
    }

    fn failed(&self, t: f64, status: IntegratorStatus) -> SolveOutcome {
        let root_index = self.integrator.root_info().iter().position(|d| *d != 0);
        warn!(solver = %self.name, t, status = %status, "integration failed");
        SolveOutcome::Failed {
            last_good_time: t,
            status,
            root_index,
        }
    }

    /// Root functions that fired at the last `RootFound`.
    pub fn get_roots(&self) -> &[usize] {
        &self.roots_found
    }

    /// Direction per root function at the last `RootFound`.
    pub fn root_info(&self) -> &[i8] {
        self.integrator.root_info()
    }

    pub fn has_pending_root(&self) -> bool {
        self.root_pending
    }

    /// Set the initial step. Unset bounds, or bounds equal to the previous
    /// step, follow the new value.
    pub fn set_step(&mut self, step: f64) {
        let old = self.step;
        let follows =
            |bound: Option<f64>| bound.is_none_or(|m| nearly_equal(m, old, Tolerances::default()));
        if follows(self.min_step) {
            self.min_step = Some(step);
        }
        if follows(self.max_step) {
            self.max_step = Some(step);
        }
        self.step = step;
        self.push_if_initialized();
    }

    pub fn set_min_step(&mut self, min_step: f64) {
        self.min_step = Some(min_step);
        self.push_if_initialized();
    }

    pub fn set_max_step(&mut self, max_step: f64) {
        self.max_step = Some(max_step);
        self.push_if_initialized();
    }

    pub fn set_tolerance(&mut self, tolerance: f64) {
        self.tolerance = tolerance;
        self.push_if_initialized();
    }

    pub fn set_max_retries(&mut self, retries: u32) {
        self.max_retries = retries;
    }

    pub fn set_max_internal_steps(&mut self, steps: usize) {
        self.max_internal_steps = steps;
        self.push_if_initialized();
    }

    pub fn set_linear_mode(&mut self, linear: LinearSolverMode) {
        self.linear = linear;
    }

    /// Enable masking; takes effect at the next (re)initialization.
    pub fn set_masking(&mut self, on: bool) {
        self.use_mask = on;
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn min_step(&self) -> Option<f64> {
        self.min_step
    }

    pub fn max_step(&self) -> Option<f64> {
        self.max_step
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn linear_mode(&self) -> LinearSolverMode {
        self.linear
    }

    pub fn masking(&self) -> bool {
        self.use_mask
    }

    /// Rows currently held by the mask.
    pub fn masked_rows(&self) -> &[usize] {
        &self.mask.rows
    }

    /// Set a numeric parameter by name.
    pub fn set(&mut self, param: &str, value: f64) -> SolverResult<()> {
        if !value.is_finite() {
            return Err(SolverError::param(param));
        }
        match param {
            "step" | "initstep" => self.set_step(value),
            "minstep" => self.set_min_step(value),
            "maxstep" => self.set_max_step(value),
            "tolerance" | "rtol" if value > 0.0 => self.set_tolerance(value),
            "maxretries" if value >= 0.0 => self.set_max_retries(value as u32),
            "maxsteps" if value >= 1.0 => self.set_max_internal_steps(value as usize),
            "mask" => self.set_masking(value != 0.0),
            _ => return Err(SolverError::param(param)),
        }
        Ok(())
    }

    /// Set a text parameter by name.
    pub fn set_text(&mut self, param: &str, value: &str) -> SolverResult<()> {
        match param {
            "mode" | "linearsolver" => self.set_linear_mode(value.parse()?),
            "mask" => {
                let on = match value.trim().to_ascii_lowercase().as_str() {
                    "on" | "true" | "1" | "yes" => true,
                    "off" | "false" | "0" | "no" => false,
                    _ => return Err(SolverError::param(param)),
                };
                self.set_masking(on);
            }
            _ => return Err(SolverError::param(param)),
        }
        Ok(())
    }

    /// Read a parameter or statistic by name.
    pub fn get(&self, param: &str) -> SolverResult<f64> {
        let v = match param {
            "step" | "initstep" => self.step,
            "minstep" => self.min_step.unwrap_or(0.0),
            "maxstep" => self.max_step.unwrap_or(f64::INFINITY),
            "tolerance" | "rtol" => self.tolerance,
            "maxretries" => f64::from(self.max_retries),
            "maxsteps" => self.max_internal_steps as f64,
            "time" => self.time,
            "statecount" => self.state_count as f64,
            "rootcount" => self.root_count as f64,
            other => self.stats.get(other).ok_or_else(|| SolverError::param(other))?,
        };
        Ok(v)
    }

    pub fn stats(&self) -> &SolverStats {
        &self.stats
    }

    /// Emit the accumulated statistics at `info` level.
    pub fn log_solver_stats(&self) {
        self.stats.log(&self.name);
    }
}
