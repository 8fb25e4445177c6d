//! Building a simulation from a `gs-project` file.

use gs_core::Unit;
use gs_events::{Event, TimeSeries};
use gs_project::{
    ConditionDef, EventDef, LinearSolverDef, ObjectKindDef, SimulationFile, SolverDef,
};
use gs_solver::LinearSolverMode;
use tracing::debug;

use crate::devices::{FirstOrderLag, Follower};
use crate::error::{SimError, SimResult};
use crate::object::PhysicalObject;
use crate::relays::{Breaker, Sensor, SensorCondition};
use crate::sim::Simulation;

impl Simulation {
    /// Validate `file` and build a simulation from it.
    pub fn from_config(file: &SimulationFile) -> SimResult<Self> {
        let mut sim = Simulation::new(file.name.clone());
        sim.apply_config(file)?;
        Ok(sim)
    }

    /// Apply solver settings, run window, objects and events from `file`.
    pub fn apply_config(&mut self, file: &SimulationFile) -> SimResult<()> {
        gs_project::validate_file(file).map_err(gs_project::ProjectError::from)?;
        self.apply_solver(&file.solver);

        self.set_start_time(file.time.start_s)?;
        let opts = self.options_mut();
        opts.t_end = file.time.stop_s;
        opts.record_interval = file.time.record_interval_s;

        for def in &file.objects {
            let mut object = build_object(&def.kind, &def.name)?;
            if let Some(user_id) = def.user_id {
                object.meta_mut().user_id = Some(user_id);
            }
            self.add_object(object)?;
        }
        // Parents may be declared after their children.
        for def in &file.objects {
            let Some(parent) = &def.parent else {
                continue;
            };
            let parent_id = self.find(parent).ok_or_else(|| SimError::UnknownObject {
                name: parent.clone(),
            })?;
            let id = self.find(&def.name).ok_or_else(|| SimError::UnknownObject {
                name: def.name.clone(),
            })?;
            self.set_parent(id, parent_id)?;
        }

        for def in &file.events {
            let event = build_event(def)?;
            self.add_event(event)?;
        }
        debug!(
            sim = %self.name(),
            objects = file.objects.len(),
            events = file.events.len(),
            "configuration applied"
        );
        Ok(())
    }

    fn apply_solver(&mut self, def: &SolverDef) {
        let solver = self.solver_mut();
        solver.set_tolerance(def.tolerance);
        if let Some(step) = def.step {
            solver.set_step(step);
        }
        if let Some(min) = def.min_step {
            solver.set_min_step(min);
        }
        if let Some(max) = def.max_step {
            solver.set_max_step(max);
        }
        solver.set_max_retries(def.max_retries);
        solver.set_max_internal_steps(def.max_internal_steps);
        solver.set_linear_mode(match def.linear_solver {
            LinearSolverDef::Dense => LinearSolverMode::Dense,
            LinearSolverDef::Sparse => LinearSolverMode::Sparse,
        });
        solver.set_masking(def.masking);
    }
}

fn build_object(kind: &ObjectKindDef, name: &str) -> SimResult<Box<dyn PhysicalObject>> {
    let object: Box<dyn PhysicalObject> = match kind {
        ObjectKindDef::Lag {
            gain,
            tau_s,
            input,
            initial,
        } => Box::new(
            FirstOrderLag::new(name, *tau_s)?
                .with_gain(*gain)
                .with_input(*input)
                .with_initial(*initial),
        ),
        ObjectKindDef::Follower { source, gain } => {
            Box::new(Follower::new(name, source.clone(), *gain))
        }
        ObjectKindDef::Breaker {
            monitor,
            target,
            limit,
            min_clearing_time_s,
            reclose_time1_s,
            reclose_time2_s,
            recloser_reset_time_s,
            max_reclose_attempts,
            cti_s,
        } => {
            let mut b = Breaker::new(name, monitor.clone(), *limit)?
                .with_reclosing(*max_reclose_attempts, *reclose_time1_s, *reclose_time2_s)
                .with_min_clearing_time(*min_clearing_time_s);
            b.recloser_reset_time = *recloser_reset_time_s;
            if let Some(t) = target {
                b = b.with_target(t.clone());
            }
            if let Some(cti) = cti_s {
                b = b.with_inverse_time(*cti)?;
            }
            Box::new(b)
        }
        ObjectKindDef::Sensor {
            input,
            input_state,
            filters,
            conditions,
        } => {
            let mut s = Sensor::new(name, input.clone()).with_input_state(*input_state);
            for f in filters {
                s = s.with_filter(f.name.clone(), f.tau_s, f.gain)?;
            }
            for c in conditions {
                s = s.with_condition(build_condition(c)?)?;
            }
            Box::new(s)
        }
    };
    Ok(object)
}

fn build_condition(def: &ConditionDef) -> SimResult<SensorCondition> {
    let (object, field) = def.split_target().ok_or(SimError::InvalidArg {
        what: "condition target must be object:field",
    })?;
    let condition = match (def.above, def.below) {
        (Some(level), None) => SensorCondition::above(def.output.clone(), level),
        (None, Some(level)) => SensorCondition::below(def.output.clone(), level),
        _ => {
            return Err(SimError::InvalidArg {
                what: "condition needs exactly one of above or below",
            });
        }
    };
    Ok(condition.sets(object, field, def.value).after(def.delay_s))
}

fn build_event(def: &EventDef) -> SimResult<Event> {
    let (object, field) = def.split_target().ok_or(SimError::InvalidArg {
        what: "event target must be object:field",
    })?;
    let mut event = if let Some(path) = &def.file {
        Event::from_file(path, def.period)?
    } else if !def.times.is_empty() {
        let series = TimeSeries::new(def.times.clone(), def.values.clone())?;
        Event::series(series, def.period)?
    } else {
        let time = def.time.ok_or(SimError::InvalidArg {
            what: "event needs a time",
        })?;
        let value = def.value.ok_or(SimError::InvalidArg {
            what: "event needs a value",
        })?;
        if def.period > 0.0 {
            Event::periodic(time, def.period, value)?
        } else {
            Event::single(time, value)
        }
    };
    if let Some(unit) = &def.unit {
        event = event.with_unit(unit.parse::<Unit>()?);
    }
    if let Some(name) = &def.name {
        event = event.with_name(name.clone());
    }
    Ok(event.on(object, field))
}
