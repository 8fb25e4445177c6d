//! Hybrid simulation runner and result recording.

use std::collections::BTreeMap;

use gs_core::{EventId, IdAllocator, ObjectId, SMALL_TIME, Unit, ensure_finite};
use gs_events::{ChangeCode, Event, EventEngine, ParamTarget, TargetResolver};
use gs_registry::ObjectRegistry;
use gs_solver::{SolveOutcome, SolverInterface, StepMode};
use tracing::{debug, error, info, warn};

use crate::error::{SimError, SimResult};
use crate::object::{ObjectAction, PhysicalObject};
use crate::store::ObjectStore;

/// Options for simulation runs.
#[derive(Clone, Debug)]
pub struct SimOptions {
    /// Final simulation time (seconds)
    pub t_end: f64,
    /// Spacing of recorded samples; zero records every stop of the solver.
    pub record_interval: f64,
    /// Bound on cascaded discrete updates at one instant.
    pub max_discrete_rounds: usize,
    /// Consecutive loop passes allowed without time advancing.
    pub max_stalled_passes: usize,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            t_end: 10.0,
            record_interval: 0.0,
            max_discrete_rounds: 16,
            max_stalled_passes: 100,
        }
    }
}

/// Record of simulation results.
///
/// One channel per object state, named after the object (`name[k]` for
/// objects with several states). Objects that did not exist at a sample are
/// recorded as NaN.
#[derive(Clone, Debug, Default)]
pub struct SimRecord {
    /// Time points (seconds)
    pub t: Vec<f64>,
    pub channels: BTreeMap<String, Vec<f64>>,
    /// Root crossings handled during the run.
    pub roots_found: usize,
    /// Instants at which a discrete change was applied.
    pub discrete_changes: usize,
}

impl SimRecord {
    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    pub fn channel(&self, name: &str) -> Option<&[f64]> {
        self.channels.get(name).map(Vec::as_slice)
    }

    /// Last recorded value of a channel.
    pub fn last(&self, name: &str) -> Option<f64> {
        self.channel(name).and_then(|c| c.last().copied())
    }

    /// Value of a channel at the first sample at or after `time`.
    pub fn value_at(&self, name: &str, time: f64) -> Option<f64> {
        let i = self.t.iter().position(|t| *t + SMALL_TIME >= time)?;
        self.channel(name).map(|c| c[i])
    }

    fn push(&mut self, t: f64, values: Vec<(String, f64)>) {
        let n = self.t.len();
        self.t.push(t);
        for (name, v) in values {
            let column = self
                .channels
                .entry(name)
                .or_insert_with(|| vec![f64::NAN; n]);
            column.push(v);
        }
        for column in self.channels.values_mut() {
            if column.len() == n {
                column.push(f64::NAN);
            }
        }
    }
}

/// A network of objects integrated as one DAE, with scheduled events and
/// root-triggered discrete logic between continuous segments.
///
/// Objects are owned here and referred to everywhere else by [`ObjectId`].
#[derive(Debug)]
pub struct Simulation {
    name: String,
    store: ObjectStore,
    registry: ObjectRegistry,
    ids: IdAllocator,
    events: EventEngine,
    solver: SolverInterface,
    options: SimOptions,
    time: f64,
    structure_changed: bool,
}

impl Simulation {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let solver = SolverInterface::new(format!("{name}_dynamic"));
        Self::with_solver(name, solver)
    }

    pub fn with_solver(name: impl Into<String>, solver: SolverInterface) -> Self {
        Self {
            name: name.into(),
            store: ObjectStore::new(),
            registry: ObjectRegistry::new(),
            ids: IdAllocator::new(),
            events: EventEngine::new(),
            solver,
            options: SimOptions::default(),
            time: 0.0,
            structure_changed: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Move the start time; only allowed before the first run.
    pub fn set_start_time(&mut self, t0: f64) -> SimResult<()> {
        if self.solver.is_initialized() {
            return Err(SimError::InvalidArg {
                what: "start time cannot change after initialization",
            });
        }
        if !t0.is_finite() {
            return Err(SimError::InvalidArg {
                what: "start time must be finite",
            });
        }
        self.time = t0;
        Ok(())
    }

    pub fn options(&self) -> &SimOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut SimOptions {
        &mut self.options
    }

    pub fn solver(&self) -> &SolverInterface {
        &self.solver
    }

    pub fn solver_mut(&mut self) -> &mut SolverInterface {
        &mut self.solver
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    pub fn events(&self) -> &EventEngine {
        &self.events
    }

    pub fn object_count(&self) -> usize {
        self.store.len()
    }

    /// Register `object` and take ownership of it.
    pub fn add_object(&mut self, mut object: Box<dyn PhysicalObject>) -> SimResult<ObjectId> {
        if let Some(parent) = object.meta().parent
            && !self.registry.contains(parent)
        {
            return Err(SimError::UnknownObject {
                name: format!("parent {parent} of {}", object.meta().name),
            });
        }
        let id = self.ids.allocate();
        object.meta_mut().id = Some(id);
        self.registry.try_insert(object.meta(), false)?;
        debug!(sim = %self.name, object = %object.meta().name, kind = object.kind(), id = %id, "object added");
        self.store.insert(id, object);
        self.structure_changed = true;
        Ok(id)
    }

    pub fn add<O: PhysicalObject + 'static>(&mut self, object: O) -> SimResult<ObjectId> {
        self.add_object(Box::new(object))
    }

    /// Register `object` as owned by `parent`.
    pub fn add_child<O: PhysicalObject + 'static>(
        &mut self,
        parent: ObjectId,
        mut object: O,
    ) -> SimResult<ObjectId> {
        object.meta_mut().parent = Some(parent);
        self.add_object(Box::new(object))
    }

    /// Remove `id` and everything it owns. Returns the removed ids.
    ///
    /// Events aimed at removed objects go stale and stop firing.
    pub fn remove_object(&mut self, id: ObjectId) -> SimResult<Vec<ObjectId>> {
        if !self.registry.contains(id) {
            return Err(SimError::UnknownObject {
                name: id.to_string(),
            });
        }
        let mut removed = self.registry.delete_all(id);
        self.registry.remove_id(id);
        removed.push(id);
        for r in &removed {
            self.store.remove(*r);
        }
        debug!(sim = %self.name, removed = ?removed, "objects removed");
        self.structure_changed = true;
        Ok(removed)
    }

    /// Rename `id`; fails without changes if the name is taken.
    pub fn rename(&mut self, id: ObjectId, name: &str) -> SimResult<()> {
        let obj = self.store.get_mut(id).ok_or_else(|| SimError::UnknownObject {
            name: id.to_string(),
        })?;
        let mut meta = obj.meta().clone();
        meta.name = name.to_string();
        self.registry.update_object(&meta)?;
        obj.meta_mut().name = meta.name;
        for event in self.events.iter_mut() {
            if event.target() == Some(id) {
                event.set_target_name(name);
            }
        }
        Ok(())
    }

    /// Register a fresh copy of `id` under `name`.
    pub fn duplicate(&mut self, id: ObjectId, name: &str) -> SimResult<ObjectId> {
        let obj = self.store.get(id).ok_or_else(|| SimError::UnknownObject {
            name: id.to_string(),
        })?;
        let mut copy = obj.clone_object();
        copy.meta_mut().name = name.to_string();
        self.add_object(copy)
    }

    /// Make `parent` the owner of `id`.
    pub fn set_parent(&mut self, id: ObjectId, parent: ObjectId) -> SimResult<()> {
        if id == parent || !self.registry.contains(parent) {
            return Err(SimError::InvalidArg {
                what: "parent must be another registered object",
            });
        }
        let obj = self.store.get_mut(id).ok_or_else(|| SimError::UnknownObject {
            name: id.to_string(),
        })?;
        let meta = obj.meta().clone().with_parent(parent);
        self.registry.update_object(&meta)?;
        obj.meta_mut().parent = Some(parent);
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<ObjectId> {
        self.registry.find(name)
    }

    pub fn find_by_user_id(&self, user_id: u32) -> Vec<ObjectId> {
        self.registry.find_by_user_id(user_id)
    }

    pub fn object(&self, id: ObjectId) -> Option<&dyn PhysicalObject> {
        self.store.get(id)
    }

    /// Mutable access to an object's parameters.
    ///
    /// Changing states or structure through this handle takes effect at the
    /// next initialization.
    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut (dyn PhysicalObject + 'static)> {
        self.store.get_mut(id)
    }

    /// Set a parameter on a named object outside of the event system.
    pub fn set_param(&mut self, name: &str, field: &str, value: f64, unit: Unit) -> SimResult<()> {
        let id = self.find(name).ok_or_else(|| SimError::UnknownObject {
            name: name.to_string(),
        })?;
        let value = ensure_finite(value, "parameter value")?;
        let target = self.store.resolve(id).ok_or_else(|| SimError::UnknownObject {
            name: name.to_string(),
        })?;
        target.set_number(field, value, unit)?;
        if self.solver.is_initialized() {
            self.solver.reinitialize(&mut self.store, self.time)?;
        }
        Ok(())
    }

    /// Current value of `id`'s `k`-th state.
    pub fn state(&self, id: ObjectId, k: usize) -> Option<f64> {
        if !self.solver.is_initialized() {
            return None;
        }
        self.store.state_of(id, k, self.solver.state())
    }

    /// Register `event`, binding its target by name if it has no id yet.
    pub fn add_event(&mut self, mut event: Event) -> SimResult<EventId> {
        if event.target().is_none() {
            let name = event.target_name().to_string();
            let id = self
                .registry
                .find(&name)
                .ok_or(SimError::UnknownObject { name })?;
            let field = event.field().to_string();
            event.set_target(Some(id), &field);
        }
        Ok(self.events.add(event))
    }

    pub fn remove_event(&mut self, id: EventId) -> Option<Event> {
        self.events.remove(id)
    }

    /// Lay out states, size the solver and compute initial conditions at
    /// the current time.
    pub fn initialize(&mut self) -> SimResult<()> {
        self.store.rebuild(&self.registry)?;
        let layout = self.store.layout();
        let (states, roots) = (layout.state_count(), layout.root_count());
        if states == 0 {
            return Err(SimError::InvalidArg {
                what: "simulation has no states to integrate",
            });
        }
        self.solver.allocate(states, roots)?;
        self.solver.initialize(&mut self.store, self.time)?;
        self.store
            .capture(self.solver.state(), self.solver.derivative());
        self.structure_changed = false;
        info!(
            sim = %self.name,
            t0 = self.time,
            states,
            roots,
            objects = self.store.len(),
            events = self.events.len(),
            "simulation initialized"
        );
        Ok(())
    }

    /// Run to `options().t_end`.
    pub fn run(&mut self) -> SimResult<SimRecord> {
        let t_end = self.options.t_end;
        self.run_until(t_end)
    }

    /// Integrate to `t_end`, handling events and root crossings on the way.
    pub fn run_until(&mut self, t_end: f64) -> SimResult<SimRecord> {
        if !t_end.is_finite() || t_end < self.time {
            return Err(SimError::InvalidArg {
                what: "t_end must be finite and not before the current time",
            });
        }
        if !(self.options.record_interval >= 0.0) {
            return Err(SimError::InvalidArg {
                what: "record_interval must be non-negative",
            });
        }
        if self.structure_changed || !self.solver.is_initialized() {
            self.initialize()?;
        }

        let interval = self.options.record_interval;
        let mut record = SimRecord::default();
        if self.discrete_phase(Vec::new(), false)? {
            record.discrete_changes += 1;
        }
        self.sample(&mut record);
        let mut next_sample = self.time + interval;
        let mut stalled = 0usize;

        while self.time < t_end - SMALL_TIME {
            let start = self.time;
            let target = self.next_stop(t_end, next_sample, interval);

            let mut root_hit = false;
            if target > self.time + SMALL_TIME {
                match self
                    .solver
                    .solve(&mut self.store, target, StepMode::Normal)?
                {
                    SolveOutcome::ReachedTarget { t } => self.time = t,
                    SolveOutcome::RootFound { t } => {
                        self.time = t;
                        root_hit = true;
                    }
                    SolveOutcome::Failed {
                        last_good_time,
                        status,
                        ..
                    } => {
                        self.time = last_good_time;
                        error!(sim = %self.name, t = last_good_time, status = %status, "simulation stopped");
                        return Err(SimError::IntegrationFailed {
                            time: last_good_time,
                            status,
                        });
                    }
                }
                self.store
                    .capture(self.solver.state(), self.solver.derivative());
            } else {
                self.time = self.time.max(target);
            }

            let mut actions = Vec::new();
            if root_hit {
                record.roots_found += 1;
                let directions = self.solver.root_info().to_vec();
                let state = self.solver.state().to_vec();
                actions = self.store.root_trigger(self.time, &directions, &state);
            }
            if self.discrete_phase(actions, root_hit)? {
                record.discrete_changes += 1;
            }

            if interval == 0.0 || self.time + SMALL_TIME >= next_sample {
                self.sample(&mut record);
                while interval > 0.0 && next_sample <= self.time + SMALL_TIME {
                    next_sample += interval;
                }
            }

            if self.time > start + SMALL_TIME {
                stalled = 0;
            } else {
                stalled += 1;
                if stalled > self.options.max_stalled_passes {
                    return Err(SimError::Stalled { time: self.time });
                }
            }
        }

        if record.t.last().is_none_or(|t| *t + SMALL_TIME < self.time) {
            self.sample(&mut record);
        }
        self.solver.log_solver_stats();
        info!(
            sim = %self.name,
            t = self.time,
            samples = record.len(),
            roots = record.roots_found,
            changes = record.discrete_changes,
            "run complete"
        );
        Ok(record)
    }

    fn next_stop(&self, t_end: f64, next_sample: f64, interval: f64) -> f64 {
        let mut target = t_end;
        let later = |t: f64| t > self.time + SMALL_TIME;
        if let Some(te) = self.events.next_event_time().filter(|t| later(*t)) {
            target = target.min(te);
        }
        if let Some(tu) = self.store.next_update().filter(|t| later(*t)) {
            target = target.min(tu);
        }
        if interval > 0.0 && later(next_sample) {
            target = target.min(next_sample);
        }
        target
    }

    /// Apply due events, object updates and `actions` at the current time,
    /// then restart the solver if anything changed.
    fn discrete_phase(&mut self, mut actions: Vec<ObjectAction>, root_hit: bool) -> SimResult<bool> {
        let time = self.time;
        let state = self.solver.state().to_vec();
        let mut changed = root_hit;

        for round in 0.. {
            let code = self.events.execute(time, &mut self.store);
            if code == ChangeCode::ExecutionFailure {
                warn!(sim = %self.name, time, "one or more events failed to apply");
            }
            changed |= code != ChangeCode::NotTriggered;
            actions.extend(self.store.update(time, &state).into_iter().map(|(_, a)| a));
            if actions.is_empty() {
                break;
            }
            if round >= self.options.max_discrete_rounds {
                warn!(sim = %self.name, time, pending = actions.len(), "discrete updates did not settle");
                break;
            }
            changed = true;
            for action in std::mem::take(&mut actions) {
                self.apply_action(time, action)?;
            }
        }

        if self.structure_changed {
            self.initialize()?;
        } else if changed {
            self.solver.reinitialize(&mut self.store, time)?;
            self.store
                .capture(self.solver.state(), self.solver.derivative());
        }
        Ok(changed)
    }

    fn apply_action(&mut self, time: f64, action: ObjectAction) -> SimResult<()> {
        match action {
            ObjectAction::SetParam {
                target,
                field,
                value,
            } => match self.store.resolve(target) {
                Some(obj) => {
                    if let Err(e) = obj.set_number(&field, value, Unit::Default) {
                        warn!(sim = %self.name, time, target = %target, field = %field, error = %e, "action rejected");
                    }
                }
                None => warn!(sim = %self.name, time, target = %target, "action target no longer exists"),
            },
            ObjectAction::Schedule(event) => {
                let id = self.add_event(event)?;
                debug!(sim = %self.name, time, event = %id, "event scheduled");
            }
        }
        Ok(())
    }

    fn sample(&self, record: &mut SimRecord) {
        let state = self.solver.state();
        let mut values = Vec::new();
        for (id, slot) in self.store.layout().slots() {
            let Some(obj) = self.store.get(id) else {
                continue;
            };
            let n = slot.state_count();
            for (k, i) in slot.state_indices().enumerate() {
                let name = if n == 1 {
                    obj.meta().name.clone()
                } else {
                    format!("{}[{k}]", obj.meta().name)
                };
                values.push((name, state.get(i).copied().unwrap_or(f64::NAN)));
            }
        }
        record.push(self.time, values);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::FirstOrderLag;

    #[test]
    fn sim_options_defaults() {
        let opts = SimOptions::default();
        assert_eq!(opts.t_end, 10.0);
        assert_eq!(opts.record_interval, 0.0);
    }

    #[test]
    fn record_pads_missing_channels() {
        let mut r = SimRecord::default();
        r.push(0.0, vec![("a".into(), 1.0)]);
        r.push(1.0, vec![("b".into(), 2.0)]);
        assert_eq!(r.channel("a").unwrap().len(), 2);
        assert!(r.channel("a").unwrap()[1].is_nan());
        assert!(r.channel("b").unwrap()[0].is_nan());
        assert_eq!(r.last("b"), Some(2.0));
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut sim = Simulation::new("dup");
        sim.add(FirstOrderLag::new("x", 1.0).unwrap()).unwrap();
        assert!(sim.add(FirstOrderLag::new("x", 1.0).unwrap()).is_err());
        assert_eq!(sim.object_count(), 1);
    }

    #[test]
    fn rename_reindexes() {
        let mut sim = Simulation::new("rename");
        let a = sim.add(FirstOrderLag::new("a", 1.0).unwrap()).unwrap();
        let b = sim.add(FirstOrderLag::new("b", 1.0).unwrap()).unwrap();
        assert!(sim.rename(a, "b").is_err());
        sim.rename(a, "c").unwrap();
        assert_eq!(sim.find("c"), Some(a));
        assert_eq!(sim.find("a"), None);
        assert_eq!(sim.find("b"), Some(b));
        assert_eq!(sim.object(a).unwrap().meta().name, "c");
    }

    #[test]
    fn remove_takes_children_along() {
        let mut sim = Simulation::new("tree");
        let p = sim.add(FirstOrderLag::new("p", 1.0).unwrap()).unwrap();
        let c = sim
            .add_child(p, FirstOrderLag::new("c", 1.0).unwrap())
            .unwrap();
        let keep = sim.add(FirstOrderLag::new("k", 1.0).unwrap()).unwrap();
        let removed = sim.remove_object(p).unwrap();
        assert!(removed.contains(&p) && removed.contains(&c));
        assert!(sim.object(c).is_none());
        assert!(sim.object(keep).is_some());
        assert_eq!(sim.find("c"), None);
    }

    #[test]
    fn duplicate_registers_a_copy() {
        let mut sim = Simulation::new("copy");
        let a = sim
            .add(FirstOrderLag::new("a", 0.3).unwrap().with_gain(4.0))
            .unwrap();
        let b = sim.duplicate(a, "a2").unwrap();
        assert_ne!(a, b);
        assert_eq!(sim.object(b).unwrap().get_number("gain"), Some(4.0));
    }

    #[test]
    fn simulation_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Simulation>();
    }

    #[test]
    fn empty_simulation_cannot_initialize() {
        let mut sim = Simulation::new("empty");
        assert!(matches!(
            sim.initialize(),
            Err(SimError::InvalidArg { .. })
        ));
    }

    #[test]
    fn set_param_between_runs() {
        let mut sim = Simulation::new("params");
        let x = sim.add(FirstOrderLag::new("x", 0.1).unwrap()).unwrap();
        sim.run_until(0.2).unwrap();
        sim.set_param("x", "input", 1.0, Unit::Default).unwrap();
        assert!(sim.set_param("x", "input", f64::NAN, Unit::Default).is_err());
        assert!(matches!(
            sim.set_param("nobody", "input", 1.0, Unit::Default),
            Err(SimError::UnknownObject { .. })
        ));
        sim.run_until(1.5).unwrap();
        assert!((sim.state(x, 0).unwrap() - 1.0).abs() < 1e-2);
    }

    #[test]
    fn removed_event_never_fires() {
        let mut sim = Simulation::new("unschedule");
        let x = sim.add(FirstOrderLag::new("x", 0.1).unwrap()).unwrap();
        let id = sim
            .add_event(Event::single(0.1, 5.0).on("x", "input"))
            .unwrap();
        assert!(sim.remove_event(id).is_some());
        sim.run_until(0.3).unwrap();
        assert_eq!(sim.object(x).unwrap().get_number("input"), Some(0.0));
    }
}
