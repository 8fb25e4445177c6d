//! Overcurrent breaker with automatic reclosing.

use gs_core::{ObjectMeta, SMALL_TIME, Unit, sign};
use gs_events::{Event, ParamError, ParamTarget};
use gs_registry::ObjectRegistry;
use gs_solver::{CallbackError, StateData};
use gs_sparse::SparseMatrixAssembler;
use tracing::{debug, info, warn};

use crate::error::{SimError, SimResult};
use crate::layout::{Layout, ObjectSizes, Slot};
use crate::object::{ObjectAction, ObjectRef, PhysicalObject, as_flag, to_native};

/// Condition index of the overcurrent root function.
pub const OVERCURRENT: usize = 0;

/// Condition index of the accumulated inverse-time root function.
pub const INVERSE_TIME: usize = 1;

/// Position of the breaker contacts and recloser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerMode {
    Closed,
    /// Open with a reclose scheduled.
    Reclosing,
    /// Open and locked out.
    Tripped,
}

/// Watches the first state of `monitor` and opens `target` when its
/// magnitude exceeds `limit`.
///
/// Each trip schedules a reclose after `reclose_time1` (first attempt) or
/// `reclose_time2` (later attempts) until `max_reclose_attempts` is used up;
/// the next trip then locks the breaker out. The attempt counter resets once
/// the breaker has stayed closed for `recloser_reset_time`.
///
/// In inverse-time mode the breaker owns one differential state `a`:
///
/// ```text
/// cti * da/dt = (|I| - limit) / limit    while over the limit
/// cti * da/dt = -a                       otherwise
/// ```
///
/// and trips when `a` reaches 1, so a constant current `I` clears after
/// `cti * limit / (I - limit)` seconds.
#[derive(Clone, Debug)]
pub struct Breaker {
    meta: ObjectMeta,
    monitor: ObjectRef,
    target: Option<ObjectRef>,
    monitor_index: Option<usize>,
    pub limit: f64,
    pub min_clearing_time: f64,
    pub reclose_time1: f64,
    pub reclose_time2: f64,
    pub recloser_reset_time: f64,
    pub max_reclose_attempts: u32,
    /// Time dial of the inverse-time characteristic (seconds).
    pub cti: f64,
    inverse_time: bool,
    accumulator_index: Option<usize>,
    overlimit: bool,
    mode: BreakerMode,
    attempts: u32,
    last_reclose_time: f64,
    clearing_deadline: Option<f64>,
    pending_close: bool,
    pending_trip: bool,
}

impl Breaker {
    pub fn new(name: impl Into<String>, monitor: impl Into<String>, limit: f64) -> SimResult<Self> {
        if !(limit > 0.0) {
            return Err(SimError::InvalidArg {
                what: "breaker limit must be positive",
            });
        }
        let mut meta = ObjectMeta::new(name);
        meta.flags.has_roots = true;
        Ok(Self {
            meta,
            monitor: ObjectRef::new(monitor),
            target: None,
            monitor_index: None,
            limit,
            min_clearing_time: 0.0,
            reclose_time1: 1.0,
            reclose_time2: 5.0,
            recloser_reset_time: 60.0,
            max_reclose_attempts: 0,
            cti: 1.0,
            inverse_time: false,
            accumulator_index: None,
            overlimit: false,
            mode: BreakerMode::Closed,
            attempts: 0,
            last_reclose_time: -gs_core::BIG_NUM,
            clearing_deadline: None,
            pending_close: false,
            pending_trip: false,
        })
    }

    /// Open a different object than the one monitored.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(ObjectRef::new(target));
        self
    }

    pub fn with_reclosing(mut self, attempts: u32, first: f64, later: f64) -> Self {
        self.max_reclose_attempts = attempts;
        self.reclose_time1 = first;
        self.reclose_time2 = later;
        self
    }

    pub fn with_min_clearing_time(mut self, t: f64) -> Self {
        self.min_clearing_time = t;
        self
    }

    /// Trip on the integrated excess current instead of the instantaneous
    /// crossing.
    pub fn with_inverse_time(mut self, cti: f64) -> SimResult<Self> {
        if !(cti > 0.0) {
            return Err(SimError::InvalidArg {
                what: "inverse-time dial must be positive",
            });
        }
        self.inverse_time = true;
        self.cti = cti;
        Ok(self)
    }

    pub fn is_inverse_time(&self) -> bool {
        self.inverse_time
    }

    pub fn mode(&self) -> BreakerMode {
        self.mode
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_locked_out(&self) -> bool {
        self.mode == BreakerMode::Tripped
    }

    fn target_ref(&self) -> &ObjectRef {
        self.target.as_ref().unwrap_or(&self.monitor)
    }

    fn measured(&self, state: &[f64]) -> Option<f64> {
        self.monitor_index.map(|i| state[i].abs())
    }

    fn accumulating(&self) -> bool {
        self.overlimit && self.mode == BreakerMode::Closed
    }

    fn status_action(&self, value: f64) -> Option<ObjectAction> {
        let target = self.target_ref().id()?;
        Some(ObjectAction::SetParam {
            target,
            field: "status".to_string(),
            value,
        })
    }

    /// Condition `condition` was detected at `time`.
    ///
    /// [`OVERCURRENT`] trips the breaker, or starts accumulation in
    /// inverse-time mode where [`INVERSE_TIME`] trips it.
    pub fn condition_triggered(&mut self, condition: usize, time: f64) -> Vec<ObjectAction> {
        let known = condition == OVERCURRENT || (self.inverse_time && condition == INVERSE_TIME);
        if !known {
            debug!(breaker = %self.meta.name, condition, "ignoring unknown condition");
            return Vec::new();
        }
        if self.mode != BreakerMode::Closed {
            return Vec::new();
        }
        if condition == INVERSE_TIME {
            return self.trip_breaker(time);
        }
        if self.inverse_time {
            if !self.overlimit {
                debug!(breaker = %self.meta.name, time, "overcurrent, accumulating");
            }
            self.overlimit = true;
            return Vec::new();
        }
        if self.min_clearing_time > 0.0 {
            let deadline = time + self.min_clearing_time;
            debug!(breaker = %self.meta.name, time, deadline, "overcurrent, clearing timer armed");
            self.clearing_deadline = Some(deadline);
            return Vec::new();
        }
        self.trip_breaker(time)
    }

    /// Open the breaker now and schedule the next reclose, or lock out.
    pub fn trip_breaker(&mut self, time: f64) -> Vec<ObjectAction> {
        self.reset_breaker(time);
        self.clearing_deadline = None;
        self.overlimit = false;
        let mut actions: Vec<ObjectAction> = self.status_action(0.0).into_iter().collect();

        if self.attempts < self.max_reclose_attempts {
            self.attempts += 1;
            self.mode = BreakerMode::Reclosing;
            let delay = if self.attempts == 1 {
                self.reclose_time1
            } else {
                self.reclose_time2
            };
            info!(
                breaker = %self.meta.name,
                time,
                attempt = self.attempts,
                reclose_at = time + delay,
                "breaker tripped"
            );
            if let Some(me) = self.meta.id {
                let event = Event::single(time + delay, 1.0)
                    .with_name(format!("{}_reclose", self.meta.name))
                    .on(self.meta.name.clone(), "reclose")
                    .with_target(me, "reclose");
                actions.push(ObjectAction::Schedule(event));
            }
        } else {
            self.mode = BreakerMode::Tripped;
            warn!(
                breaker = %self.meta.name,
                time,
                attempts = self.attempts,
                "breaker tripped and locked out"
            );
        }
        actions
    }

    /// Clear the attempt counter once the breaker has stayed closed long
    /// enough since the last reclose.
    pub fn reset_breaker(&mut self, time: f64) {
        if self.mode == BreakerMode::Closed
            && self.attempts > 0
            && time - self.last_reclose_time >= self.recloser_reset_time
        {
            debug!(breaker = %self.meta.name, time, "recloser counter reset");
            self.attempts = 0;
        }
    }

    fn close(&mut self, time: f64) -> Vec<ObjectAction> {
        self.mode = BreakerMode::Closed;
        self.overlimit = false;
        self.last_reclose_time = time;
        info!(breaker = %self.meta.name, time, attempt = self.attempts, "breaker reclosed");
        self.status_action(1.0).into_iter().collect()
    }
}

impl ParamTarget for Breaker {
    fn set_number(&mut self, field: &str, value: f64, unit: Unit) -> Result<(), ParamError> {
        match field {
            "limit" => {
                if !(value > 0.0) {
                    return Err(ParamError::out_of_range(field, value));
                }
                self.limit = value;
            }
            "min_clearing_time" | "mct" => {
                self.min_clearing_time = non_negative_seconds(field, value, unit)?;
            }
            "reclose_time1" => self.reclose_time1 = non_negative_seconds(field, value, unit)?,
            "reclose_time2" => self.reclose_time2 = non_negative_seconds(field, value, unit)?,
            "recloser_reset_time" => {
                self.recloser_reset_time = non_negative_seconds(field, value, unit)?;
            }
            "cti" => {
                let cti = to_native(field, value, unit, Unit::Second)?;
                if !(cti > 0.0) {
                    return Err(ParamError::out_of_range(field, value));
                }
                self.cti = cti;
            }
            "max_reclose_attempts" => {
                if !(value >= 0.0 && value.fract() == 0.0 && value <= f64::from(u32::MAX)) {
                    return Err(ParamError::out_of_range(field, value));
                }
                self.max_reclose_attempts = value as u32;
            }
            "reclose" => self.pending_close = self.mode == BreakerMode::Reclosing,
            "status" => {
                if as_flag(field, value)? {
                    self.pending_close = self.mode != BreakerMode::Closed;
                } else {
                    self.pending_trip = self.mode == BreakerMode::Closed;
                }
            }
            _ => return Err(ParamError::unknown(field)),
        }
        Ok(())
    }

    fn get_number(&self, field: &str) -> Option<f64> {
        match field {
            "limit" => Some(self.limit),
            "min_clearing_time" | "mct" => Some(self.min_clearing_time),
            "reclose_time1" => Some(self.reclose_time1),
            "reclose_time2" => Some(self.reclose_time2),
            "recloser_reset_time" => Some(self.recloser_reset_time),
            "max_reclose_attempts" => Some(f64::from(self.max_reclose_attempts)),
            "attempts" => Some(f64::from(self.attempts)),
            "cti" => Some(self.cti),
            "inverse_time" => Some(if self.inverse_time { 1.0 } else { 0.0 }),
            "overlimit" => Some(if self.overlimit { 1.0 } else { 0.0 }),
            "status" => Some(if self.mode == BreakerMode::Closed { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}

fn non_negative_seconds(field: &str, value: f64, unit: Unit) -> Result<f64, ParamError> {
    let v = to_native(field, value, unit, Unit::Second)?;
    if !(v >= 0.0) {
        return Err(ParamError::out_of_range(field, value));
    }
    Ok(v)
}

impl PhysicalObject for Breaker {
    fn meta(&self) -> &ObjectMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }

    fn kind(&self) -> &'static str {
        "breaker"
    }

    fn clone_object(&self) -> Box<dyn PhysicalObject> {
        let mut copy = self.clone();
        copy.meta = self.meta.detached_copy();
        copy.monitor_index = None;
        copy.accumulator_index = None;
        copy.overlimit = false;
        Box::new(copy)
    }

    fn sizes(&self) -> ObjectSizes {
        if self.inverse_time {
            ObjectSizes {
                differential: 1,
                roots: 2,
                ..Default::default()
            }
        } else {
            ObjectSizes {
                roots: 1,
                ..Default::default()
            }
        }
    }

    fn bind(&mut self, registry: &ObjectRegistry, layout: &Layout) -> SimResult<()> {
        let monitor = self.monitor.resolve(registry)?;
        if let Some(target) = self.target.as_mut() {
            target.resolve(registry)?;
        }
        self.monitor_index = layout.slot(monitor).and_then(|s| s.state(0));
        self.accumulator_index = match (self.inverse_time, self.meta.id) {
            (true, Some(me)) => layout.slot(me).and_then(|s| s.state(0)),
            _ => None,
        };
        if self.monitor_index.is_none() {
            warn!(
                breaker = %self.meta.name,
                monitor = %self.monitor.name(),
                "monitored object has no states; breaker is inert"
            );
        }
        Ok(())
    }

    fn guess(&self, slot: &Slot, _t: f64, x: &mut [f64], xdot: &mut [f64]) {
        for i in slot.differential.clone() {
            x[i] = 0.0;
            xdot[i] = 0.0;
        }
    }

    fn residual(&self, slot: &Slot, sd: &StateData<'_>, out: &mut [f64]) -> Result<(), CallbackError> {
        if slot.differential.is_empty() {
            return Ok(());
        }
        let k = slot.differential.start;
        let lag = self.cti * sd.deriv[k];
        out[k] = match (self.accumulating(), self.measured(sd.state)) {
            (true, Some(i)) => lag - (i - self.limit) / self.limit,
            _ => lag + sd.state[k],
        };
        Ok(())
    }

    fn jacobian(
        &self,
        slot: &Slot,
        sd: &StateData<'_>,
        jac: &mut SparseMatrixAssembler,
    ) -> Result<(), CallbackError> {
        if slot.differential.is_empty() {
            return Ok(());
        }
        let k = slot.differential.start;
        match (self.accumulating(), self.monitor_index) {
            (true, Some(m)) => {
                jac.assign(k, k, sd.cj * self.cti);
                jac.assign(k, m, -f64::from(sign(sd.state[m])) / self.limit);
            }
            _ => jac.assign(k, k, 1.0 + sd.cj * self.cti),
        }
        Ok(())
    }

    fn root_test(&self, slot: &Slot, sd: &StateData<'_>, out: &mut [f64]) {
        let r = slot.roots.start;
        out[r] = match (self.mode, self.measured(sd.state)) {
            (BreakerMode::Closed, Some(i)) => self.limit - i,
            _ => 1.0,
        };
        if self.inverse_time && slot.roots.len() > INVERSE_TIME {
            out[r + INVERSE_TIME] = match (self.mode, slot.differential.is_empty()) {
                (BreakerMode::Closed, false) => 1.0 - sd.state[slot.differential.start],
                _ => 1.0,
            };
        }
    }

    fn root_trigger(&mut self, time: f64, directions: &[i8], _state: &[f64]) -> Vec<ObjectAction> {
        let mut actions = Vec::new();
        match directions.get(OVERCURRENT).copied() {
            Some(d) if d < 0 => actions.extend(self.condition_triggered(OVERCURRENT, time)),
            Some(d) if d > 0 => {
                if self.clearing_deadline.take().is_some() {
                    debug!(breaker = %self.meta.name, time, "overcurrent cleared before trip");
                }
                self.overlimit = false;
            }
            _ => {}
        }
        if directions.get(INVERSE_TIME).is_some_and(|d| *d < 0) {
            actions.extend(self.condition_triggered(INVERSE_TIME, time));
        }
        actions
    }

    fn next_update(&self) -> Option<f64> {
        self.clearing_deadline
    }

    fn update(&mut self, time: f64, state: &[f64]) -> Vec<ObjectAction> {
        let mut actions = Vec::new();
        if std::mem::take(&mut self.pending_trip) {
            actions.extend(self.trip_breaker(time));
        }
        if std::mem::take(&mut self.pending_close) {
            if self.mode == BreakerMode::Tripped {
                self.attempts = 0;
            }
            actions.extend(self.close(time));
        }
        if let Some(deadline) = self.clearing_deadline
            && time + SMALL_TIME >= deadline
        {
            self.clearing_deadline = None;
            match self.measured(state) {
                Some(i) if i > self.limit => actions.extend(self.trip_breaker(time)),
                _ => debug!(breaker = %self.meta.name, time, "overcurrent cleared before trip"),
            }
        }
        if self.mode == BreakerMode::Closed
            && self.clearing_deadline.is_none()
            && self.measured(state).is_some_and(|i| i > self.limit)
        {
            actions.extend(self.condition_triggered(OVERCURRENT, time));
        }
        if self.accumulating()
            && self.accumulator_index.is_some_and(|k| state[k] >= 1.0)
        {
            actions.extend(self.condition_triggered(INVERSE_TIME, time));
        }
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gs_core::ObjectId;

    fn bound_breaker(max_attempts: u32) -> Breaker {
        let mut registry = ObjectRegistry::new();
        let mut line = ObjectMeta::new("line");
        line.id = Some(ObjectId::from_index(0));
        registry.insert(&line, false);

        let layout = Layout::build([(
            ObjectId::from_index(0),
            ObjectSizes {
                differential: 1,
                ..Default::default()
            },
        )]);
        let mut b = Breaker::new("brk", "line", 1.0)
            .unwrap()
            .with_reclosing(max_attempts, 0.5, 2.0);
        b.meta_mut().id = Some(ObjectId::from_index(1));
        b.bind(&registry, &layout).unwrap();
        b
    }

    fn scheduled_time(actions: &[ObjectAction]) -> Option<f64> {
        actions.iter().find_map(|a| match a {
            ObjectAction::Schedule(e) => Some(e.trigger_time()),
            _ => None,
        })
    }

    #[test]
    fn trip_opens_target_and_schedules_reclose() {
        let mut b = bound_breaker(2);
        let actions = b.condition_triggered(OVERCURRENT, 1.0);
        assert_eq!(b.mode(), BreakerMode::Reclosing);
        assert_eq!(b.attempts(), 1);
        assert!(actions.contains(&ObjectAction::SetParam {
            target: ObjectId::from_index(0),
            field: "status".into(),
            value: 0.0,
        }));
        assert_eq!(scheduled_time(&actions), Some(1.5));
    }

    #[test]
    fn later_attempts_use_second_reclose_time() {
        let mut b = bound_breaker(2);
        b.condition_triggered(OVERCURRENT, 1.0);
        b.set_number("reclose", 1.0, Unit::Default).unwrap();
        b.update(1.5, &[0.0]);
        assert_eq!(b.mode(), BreakerMode::Closed);
        let actions = b.condition_triggered(OVERCURRENT, 2.0);
        assert_eq!(scheduled_time(&actions), Some(4.0));
    }

    #[test]
    fn lockout_after_attempts_exhausted() {
        let mut b = bound_breaker(2);
        for t in [1.0, 3.0] {
            b.condition_triggered(OVERCURRENT, t);
            b.set_number("reclose", 1.0, Unit::Default).unwrap();
            b.update(t + 0.5, &[0.0]);
        }
        let actions = b.condition_triggered(OVERCURRENT, 5.0);
        assert!(b.is_locked_out());
        assert_eq!(scheduled_time(&actions), None);
        // Locked out: further crossings do nothing.
        assert!(b.condition_triggered(OVERCURRENT, 6.0).is_empty());
    }

    #[test]
    fn counter_resets_after_quiet_period() {
        let mut b = bound_breaker(1);
        b.condition_triggered(OVERCURRENT, 1.0);
        b.set_number("reclose", 1.0, Unit::Default).unwrap();
        b.update(1.5, &[0.0]);
        b.recloser_reset_time = 10.0;
        let actions = b.condition_triggered(OVERCURRENT, 20.0);
        assert_eq!(b.mode(), BreakerMode::Reclosing);
        assert!(scheduled_time(&actions).is_some());
    }

    #[test]
    fn clearing_time_delays_trip() {
        let mut b = bound_breaker(0).with_min_clearing_time(0.1);
        assert!(b.condition_triggered(OVERCURRENT, 1.0).is_empty());
        assert_eq!(b.next_update(), Some(1.1));
        let actions = b.update(1.1, &[1.5]);
        assert!(b.is_locked_out());
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn clearing_cancelled_when_current_drops() {
        let mut b = bound_breaker(0).with_min_clearing_time(0.1);
        b.condition_triggered(OVERCURRENT, 1.0);
        assert!(b.update(1.1, &[0.5]).is_empty());
        assert_eq!(b.mode(), BreakerMode::Closed);
    }

    #[test]
    fn root_function_inactive_when_open() {
        let mut b = bound_breaker(1);
        let slot = Slot {
            roots: 0..1,
            ..Default::default()
        };
        let x = [0.25];
        let xd = [0.0];
        let mut out = [0.0];
        b.root_test(&slot, &StateData::new(0.0, &x, &xd), &mut out);
        assert_eq!(out[0], 0.75);
        b.condition_triggered(OVERCURRENT, 0.0);
        b.root_test(&slot, &StateData::new(0.0, &x, &xd), &mut out);
        assert_eq!(out[0], 1.0);
    }

    #[test]
    fn other_conditions_do_not_trip() {
        let mut b = bound_breaker(1);
        assert!(b.condition_triggered(INVERSE_TIME, 1.0).is_empty());
        assert!(b.condition_triggered(INVERSE_TIME + 1, 1.0).is_empty());
        assert_eq!(b.mode(), BreakerMode::Closed);
    }

    /// Line at global state 0, the breaker's accumulator at state 1.
    fn bound_inverse_breaker(cti: f64) -> (Breaker, Slot) {
        let mut registry = ObjectRegistry::new();
        let mut line = ObjectMeta::new("line");
        line.id = Some(ObjectId::from_index(0));
        registry.insert(&line, false);

        let mut b = Breaker::new("brk", "line", 1.0)
            .unwrap()
            .with_inverse_time(cti)
            .unwrap();
        let layout = Layout::build([
            (
                ObjectId::from_index(0),
                ObjectSizes {
                    differential: 1,
                    ..Default::default()
                },
            ),
            (ObjectId::from_index(1), b.sizes()),
        ]);
        b.meta_mut().id = Some(ObjectId::from_index(1));
        b.bind(&registry, &layout).unwrap();
        let slot = layout.slot(ObjectId::from_index(1)).unwrap().clone();
        (b, slot)
    }

    #[test]
    fn inverse_time_adds_accumulator() {
        let (b, slot) = bound_inverse_breaker(0.2);
        assert!(b.is_inverse_time());
        assert_eq!(slot.differential, 1..2);
        assert_eq!(slot.roots, 0..2);
        assert!(Breaker::new("b", "line", 1.0).unwrap().with_inverse_time(0.0).is_err());
    }

    #[test]
    fn accumulator_integrates_excess_current() {
        let (mut b, slot) = bound_inverse_breaker(0.2);
        let x = [-1.5, 0.4];
        let mut out = [0.0; 2];

        // Below the limit the accumulator relaxes toward zero.
        b.residual(&slot, &StateData::new(0.0, &x, &[0.0, -2.0]), &mut out)
            .unwrap();
        assert!(out[1].abs() < 1e-12);

        assert!(b.condition_triggered(OVERCURRENT, 0.0).is_empty());
        assert_eq!(b.mode(), BreakerMode::Closed);
        assert_eq!(b.get_number("overlimit"), Some(1.0));
        // 0.2 * da/dt = (1.5 - 1) / 1
        b.residual(&slot, &StateData::new(0.0, &x, &[0.0, 2.5]), &mut out)
            .unwrap();
        assert!(out[1].abs() < 1e-12);
    }

    #[test]
    fn accumulator_jacobian_couples_to_monitor() {
        let (mut b, slot) = bound_inverse_breaker(0.2);
        let x = [-1.5, 0.4];
        let xd = [0.0, 0.0];
        let sd = StateData::new(0.0, &x, &xd).with_cj(10.0);

        let mut jac = SparseMatrixAssembler::with_limits(2, 2);
        b.jacobian(&slot, &sd, &mut jac).unwrap();
        let dense = jac.to_dense().unwrap();
        assert_eq!(dense[(1, 1)], 3.0);
        assert_eq!(dense[(1, 0)], 0.0);

        b.condition_triggered(OVERCURRENT, 0.0);
        let mut jac = SparseMatrixAssembler::with_limits(2, 2);
        b.jacobian(&slot, &sd, &mut jac).unwrap();
        let dense = jac.to_dense().unwrap();
        assert_eq!(dense[(1, 1)], 2.0);
        // d|I|/dI is -1 for a negative current.
        assert_eq!(dense[(1, 0)], 1.0);
    }

    #[test]
    fn accumulated_value_root_trips() {
        let (mut b, slot) = bound_inverse_breaker(0.2);
        let x = [1.5, 0.4];
        let xd = [0.0, 0.0];
        let mut out = [0.0; 2];
        b.root_test(&slot, &StateData::new(0.0, &x, &xd), &mut out);
        assert_eq!(out, [-0.5, 0.6]);

        b.root_trigger(0.1, &[-1, 0], &x);
        let actions = b.root_trigger(0.3, &[0, -1], &x);
        assert!(b.is_locked_out());
        assert_eq!(b.get_number("overlimit"), Some(0.0));
        assert!(actions.contains(&ObjectAction::SetParam {
            target: ObjectId::from_index(0),
            field: "status".into(),
            value: 0.0,
        }));

        b.root_test(&slot, &StateData::new(0.3, &x, &xd), &mut out);
        assert_eq!(out, [1.0, 1.0]);
    }

    #[test]
    fn current_drop_stops_accumulation() {
        let (mut b, _) = bound_inverse_breaker(0.2);
        b.root_trigger(0.1, &[-1, 0], &[1.5, 0.0]);
        assert!(b.root_trigger(0.2, &[1, 0], &[0.9, 0.3]).is_empty());
        assert_eq!(b.get_number("overlimit"), Some(0.0));
        assert_eq!(b.mode(), BreakerMode::Closed);
    }

    #[test]
    fn sampled_update_trips_full_accumulator() {
        let (mut b, _) = bound_inverse_breaker(0.2);
        // Over the limit with nothing accumulated yet.
        assert!(b.update(0.0, &[1.5, 0.0]).is_empty());
        assert_eq!(b.get_number("overlimit"), Some(1.0));
        let actions = b.update(0.5, &[1.5, 1.0]);
        assert!(b.is_locked_out());
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn dial_is_settable_in_seconds() {
        let (mut b, _) = bound_inverse_breaker(0.2);
        b.set_number("cti", 500.0, Unit::Millisecond).unwrap();
        assert_eq!(b.get_number("cti"), Some(0.5));
        assert!(b.set_number("cti", -1.0, Unit::Default).is_err());
    }
}
