//! Measurement relay: filtered copies of a monitored state and threshold
//! conditions acting on other objects.

use gs_core::{ObjectMeta, Unit};
use gs_events::{Event, ParamError, ParamTarget};
use gs_registry::ObjectRegistry;
use gs_solver::{CallbackError, StateData};
use gs_sparse::SparseMatrixAssembler;
use tracing::{debug, info, warn};

use crate::error::{SimError, SimResult};
use crate::layout::{Layout, ObjectSizes, Slot};
use crate::object::{ObjectAction, ObjectRef, PhysicalObject, to_native};

/// Name of the unfiltered measurement among a sensor's outputs.
pub const RAW_OUTPUT: &str = "input";

/// First-order filter block: `tau * dy/dt = gain * u - y`.
#[derive(Clone, Debug, PartialEq)]
pub struct SensorFilter {
    pub name: String,
    pub tau: f64,
    pub gain: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    Above,
    Below,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Raw,
    Filter(usize),
}

/// Fires once when `output` passes `level` in the given direction, then
/// re-arms after it crosses back.
#[derive(Clone, Debug)]
pub struct SensorCondition {
    output: String,
    source: Source,
    pub threshold: Threshold,
    pub level: f64,
    target: Option<ObjectRef>,
    field: String,
    value: f64,
    /// Seconds between detection and the action.
    pub delay: f64,
    active: bool,
}

impl SensorCondition {
    pub fn above(output: impl Into<String>, level: f64) -> Self {
        Self::new(output.into(), Threshold::Above, level)
    }

    pub fn below(output: impl Into<String>, level: f64) -> Self {
        Self::new(output.into(), Threshold::Below, level)
    }

    fn new(output: String, threshold: Threshold, level: f64) -> Self {
        Self {
            output,
            source: Source::Raw,
            threshold,
            level,
            target: None,
            field: String::new(),
            value: 0.0,
            delay: 0.0,
            active: false,
        }
    }

    /// Assign `value` to `object:field` when the condition fires.
    pub fn sets(mut self, object: impl Into<String>, field: impl Into<String>, value: f64) -> Self {
        self.target = Some(ObjectRef::new(object));
        self.field = field.into();
        self.value = value;
        self
    }

    pub fn after(mut self, delay: f64) -> Self {
        self.delay = delay;
        self
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Negative while the condition holds.
    fn margin(&self, measured: f64) -> f64 {
        match self.threshold {
            Threshold::Above => self.level - measured,
            Threshold::Below => measured - self.level,
        }
    }
}

/// Watches one state of `input` through a bank of first-order filters.
///
/// Each filter owns one differential state. Each condition owns one root
/// function on either the raw input or a filter output; when it fires the
/// sensor writes the condition's value to its target, immediately or after
/// the condition's delay through a scheduled event.
///
/// Named outputs read through `get_number` reflect the last discrete update.
#[derive(Clone, Debug)]
pub struct Sensor {
    meta: ObjectMeta,
    input: ObjectRef,
    input_state: usize,
    input_index: Option<usize>,
    filter_start: Option<usize>,
    filters: Vec<SensorFilter>,
    conditions: Vec<SensorCondition>,
    sampled: Vec<f64>,
}

impl Sensor {
    pub fn new(name: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            meta: ObjectMeta::new(name),
            input: ObjectRef::new(input),
            input_state: 0,
            input_index: None,
            filter_start: None,
            filters: Vec::new(),
            conditions: Vec::new(),
            sampled: vec![0.0],
        }
    }

    /// Monitor the input's `k`-th state instead of its first.
    pub fn with_input_state(mut self, k: usize) -> Self {
        self.input_state = k;
        self
    }

    pub fn with_filter(mut self, name: impl Into<String>, tau: f64, gain: f64) -> SimResult<Self> {
        let name = name.into();
        if !(tau > 0.0) {
            return Err(SimError::InvalidArg {
                what: "filter tau must be positive",
            });
        }
        if name == RAW_OUTPUT || self.filters.iter().any(|f| f.name == name) {
            return Err(SimError::InvalidArg {
                what: "filter names must be unique",
            });
        }
        self.filters.push(SensorFilter { name, tau, gain });
        self.sampled.push(0.0);
        Ok(self)
    }

    pub fn with_condition(mut self, mut condition: SensorCondition) -> SimResult<Self> {
        condition.source = self.source(&condition.output).ok_or(SimError::InvalidArg {
            what: "condition output must be the input or a filter",
        })?;
        if condition.target.is_none() {
            return Err(SimError::InvalidArg {
                what: "condition needs a target",
            });
        }
        if !(condition.delay >= 0.0) {
            return Err(SimError::InvalidArg {
                what: "condition delay must be non-negative",
            });
        }
        if !condition.level.is_finite() || !condition.value.is_finite() {
            return Err(SimError::InvalidArg {
                what: "condition level and value must be finite",
            });
        }
        self.meta.flags.has_roots = true;
        self.conditions.push(condition);
        Ok(self)
    }

    pub fn filters(&self) -> &[SensorFilter] {
        &self.filters
    }

    pub fn conditions(&self) -> &[SensorCondition] {
        &self.conditions
    }

    fn source(&self, output: &str) -> Option<Source> {
        if output == RAW_OUTPUT {
            return Some(Source::Raw);
        }
        self.filters
            .iter()
            .position(|f| f.name == output)
            .map(Source::Filter)
    }

    fn read(&self, source: Source, state: &[f64], filter_start: Option<usize>) -> Option<f64> {
        match source {
            Source::Raw => self.input_index.map(|i| state[i]),
            Source::Filter(k) => filter_start.map(|s| state[s + k]),
        }
    }

    fn refresh(&mut self, state: &[f64]) {
        if let Some(u) = self.read(Source::Raw, state, None) {
            self.sampled[0] = u;
        }
        if let Some(s) = self.filter_start {
            for k in 0..self.filters.len() {
                self.sampled[k + 1] = state[s + k];
            }
        }
    }

    fn fire(&mut self, k: usize, time: f64) -> Option<ObjectAction> {
        let name = self.meta.name.clone();
        let c = &mut self.conditions[k];
        c.active = true;
        let target = c.target.as_ref()?;
        let Some(id) = target.id() else {
            warn!(sensor = %name, condition = k, "condition target unbound");
            return None;
        };
        info!(
            sensor = %name,
            condition = k,
            time,
            target = %target.name(),
            field = %c.field,
            value = c.value,
            "sensor condition triggered"
        );
        if c.delay > 0.0 {
            let event = Event::single(time + c.delay, c.value)
                .with_name(format!("{name}_condition{k}"))
                .on(target.name().to_string(), c.field.clone())
                .with_target(id, &c.field);
            Some(ObjectAction::Schedule(event))
        } else {
            Some(ObjectAction::SetParam {
                target: id,
                field: c.field.clone(),
                value: c.value,
            })
        }
    }
}

/// `tau` is `tau0`; `tau3` addresses the fourth filter.
fn indexed(field: &str, prefix: &str) -> Option<usize> {
    let rest = field.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some(0)
    } else {
        rest.parse().ok()
    }
}

impl ParamTarget for Sensor {
    fn set_number(&mut self, field: &str, value: f64, unit: Unit) -> Result<(), ParamError> {
        if let Some(k) = indexed(field, "tau") {
            let tau = to_native(field, value, unit, Unit::Second)?;
            let f = self.filters.get_mut(k).ok_or_else(|| ParamError::unknown(field))?;
            if !(tau > 0.0) {
                return Err(ParamError::out_of_range(field, value));
            }
            f.tau = tau;
        } else if let Some(k) = indexed(field, "gain") {
            self.filters
                .get_mut(k)
                .ok_or_else(|| ParamError::unknown(field))?
                .gain = value;
        } else if let Some(k) = indexed(field, "level") {
            if !value.is_finite() {
                return Err(ParamError::out_of_range(field, value));
            }
            self.conditions
                .get_mut(k)
                .ok_or_else(|| ParamError::unknown(field))?
                .level = value;
        } else if let Some(k) = indexed(field, "delay") {
            let delay = to_native(field, value, unit, Unit::Second)?;
            let c = self.conditions.get_mut(k).ok_or_else(|| ParamError::unknown(field))?;
            if !(delay >= 0.0) {
                return Err(ParamError::out_of_range(field, value));
            }
            c.delay = delay;
        } else {
            return Err(ParamError::unknown(field));
        }
        Ok(())
    }

    fn get_number(&self, field: &str) -> Option<f64> {
        if field == RAW_OUTPUT {
            return self.sampled.first().copied();
        }
        if let Some(k) = self.filters.iter().position(|f| f.name == field) {
            return self.sampled.get(k + 1).copied();
        }
        if let Some(k) = indexed(field, "output") {
            // Filter outputs when there are filters, the raw input otherwise.
            return if self.filters.is_empty() {
                self.sampled.first().copied().filter(|_| k == 0)
            } else {
                self.sampled.get(k + 1).copied()
            };
        }
        if let Some(k) = indexed(field, "tau") {
            return self.filters.get(k).map(|f| f.tau);
        }
        if let Some(k) = indexed(field, "gain") {
            return self.filters.get(k).map(|f| f.gain);
        }
        if let Some(k) = indexed(field, "level") {
            return self.conditions.get(k).map(|c| c.level);
        }
        if let Some(k) = indexed(field, "delay") {
            return self.conditions.get(k).map(|c| c.delay);
        }
        if let Some(k) = indexed(field, "active") {
            return self
                .conditions
                .get(k)
                .map(|c| if c.active { 1.0 } else { 0.0 });
        }
        None
    }
}

impl PhysicalObject for Sensor {
    fn meta(&self) -> &ObjectMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }

    fn kind(&self) -> &'static str {
        "sensor"
    }

    fn clone_object(&self) -> Box<dyn PhysicalObject> {
        let mut copy = self.clone();
        copy.meta = self.meta.detached_copy();
        copy.input.unbind();
        copy.input_index = None;
        copy.filter_start = None;
        for c in &mut copy.conditions {
            c.active = false;
            if let Some(t) = c.target.as_mut() {
                t.unbind();
            }
        }
        Box::new(copy)
    }

    fn sizes(&self) -> ObjectSizes {
        ObjectSizes {
            differential: self.filters.len(),
            roots: self.conditions.len(),
            ..Default::default()
        }
    }

    fn bind(&mut self, registry: &ObjectRegistry, layout: &Layout) -> SimResult<()> {
        let input = self.input.resolve(registry)?;
        for c in &mut self.conditions {
            if let Some(t) = c.target.as_mut() {
                t.resolve(registry)?;
            }
        }
        self.input_index = layout.slot(input).and_then(|s| s.state(self.input_state));
        if self.input_index.is_none() {
            warn!(
                sensor = %self.meta.name,
                input = %self.input.name(),
                state = self.input_state,
                "monitored state does not exist; sensor reads zero"
            );
        }
        self.filter_start = match (self.filters.is_empty(), self.meta.id) {
            (false, Some(me)) => layout.slot(me).map(|s| s.differential.start),
            _ => None,
        };
        Ok(())
    }

    fn guess(&self, slot: &Slot, _t: f64, x: &mut [f64], xdot: &mut [f64]) {
        let u = self.input_index.map_or(0.0, |i| x[i]);
        for (k, f) in self.filters.iter().enumerate() {
            let i = slot.differential.start + k;
            x[i] = f.gain * u;
            xdot[i] = 0.0;
        }
    }

    fn residual(&self, slot: &Slot, sd: &StateData<'_>, out: &mut [f64]) -> Result<(), CallbackError> {
        let u = self.input_index.map_or(0.0, |i| sd.state[i]);
        for (k, f) in self.filters.iter().enumerate() {
            let i = slot.differential.start + k;
            out[i] = f.tau * sd.deriv[i] - (f.gain * u - sd.state[i]);
        }
        Ok(())
    }

    fn jacobian(
        &self,
        slot: &Slot,
        sd: &StateData<'_>,
        jac: &mut SparseMatrixAssembler,
    ) -> Result<(), CallbackError> {
        for (k, f) in self.filters.iter().enumerate() {
            let i = slot.differential.start + k;
            jac.assign(i, i, 1.0 + sd.cj * f.tau);
            if let Some(u) = self.input_index {
                jac.assign(i, u, -f.gain);
            }
        }
        Ok(())
    }

    fn root_test(&self, slot: &Slot, sd: &StateData<'_>, out: &mut [f64]) {
        let start = (!slot.differential.is_empty()).then_some(slot.differential.start);
        for (k, c) in self.conditions.iter().enumerate() {
            out[slot.roots.start + k] = self
                .read(c.source, sd.state, start)
                .map_or(1.0, |y| c.margin(y));
        }
    }

    fn root_trigger(&mut self, time: f64, directions: &[i8], state: &[f64]) -> Vec<ObjectAction> {
        self.refresh(state);
        let mut actions = Vec::new();
        for (k, d) in directions.iter().copied().enumerate().take(self.conditions.len()) {
            if d < 0 && !self.conditions[k].active {
                actions.extend(self.fire(k, time));
            } else if d > 0 && self.conditions[k].active {
                debug!(sensor = %self.meta.name, condition = k, time, "sensor condition cleared");
                self.conditions[k].active = false;
            }
        }
        actions
    }

    fn update(&mut self, time: f64, state: &[f64]) -> Vec<ObjectAction> {
        self.refresh(state);
        let mut actions = Vec::new();
        for k in 0..self.conditions.len() {
            let c = &self.conditions[k];
            let holds = self
                .read(c.source, state, self.filter_start)
                .is_some_and(|y| c.margin(y) < 0.0);
            if holds && !c.active {
                actions.extend(self.fire(k, time));
            }
        }
        actions
    }
}
