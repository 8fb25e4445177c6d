//! Timed parameter assignments.

use std::fmt;

use gs_core::{EventId, ObjectId, SMALL_TIME, Unit};
use tracing::{debug, warn};

use crate::error::{EventError, EventResult};
use crate::series::TimeSeries;
use crate::target::{ChangeCode, TargetResolver};

/// How an event chooses its next trigger time.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// Fires once.
    Single,
    /// Walks a time series; `period > 0` loops it.
    Series {
        series: TimeSeries,
        cursor: usize,
        period: f64,
    },
    /// Fires every `period` seconds with a fixed value.
    Periodic { period: f64 },
}

/// Assignment of `value` to `target:field` at `trigger_time`.
///
/// The target is held by id only. An event is armed while it has a target,
/// a field and a future trigger time; a target that can no longer be
/// resolved leaves it permanently disarmed.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    id: Option<EventId>,
    name: String,
    kind: EventKind,
    trigger_time: f64,
    value: f64,
    unit: Unit,
    target: Option<ObjectId>,
    target_name: String,
    field: String,
    source_file: Option<String>,
    exhausted: bool,
    stale: bool,
    armed: bool,
}

impl Event {
    fn with_kind(kind: EventKind, trigger_time: f64, value: f64) -> Self {
        Self {
            id: None,
            name: String::new(),
            kind,
            trigger_time,
            value,
            unit: Unit::Default,
            target: None,
            target_name: String::new(),
            field: String::new(),
            source_file: None,
            exhausted: false,
            stale: false,
            armed: false,
        }
    }

    /// One assignment at `time`.
    pub fn single(time: f64, value: f64) -> Self {
        Self::with_kind(EventKind::Single, time, value)
    }

    /// The same assignment every `period` seconds starting at `start`.
    pub fn periodic(start: f64, period: f64, value: f64) -> EventResult<Self> {
        if !(period > 0.0 && period.is_finite()) {
            return Err(EventError::Invalid {
                what: format!("period must be positive, got {period}"),
            });
        }
        Ok(Self::with_kind(EventKind::Periodic { period }, start, value))
    }

    /// Assignments following `series`; `period > 0` repeats it.
    pub fn series(series: TimeSeries, period: f64) -> EventResult<Self> {
        if series.is_empty() {
            return Err(EventError::Invalid {
                what: "series event needs at least one entry".into(),
            });
        }
        if period < 0.0 || !period.is_finite() {
            return Err(EventError::Invalid {
                what: format!("period must be non-negative, got {period}"),
            });
        }
        let (t0, v0) = (series.time(0), series.value(0));
        Ok(Self::with_kind(
            EventKind::Series {
                series,
                cursor: 0,
                period,
            },
            t0,
            v0,
        ))
    }

    /// Series event read from a `time,value` CSV file.
    pub fn from_file(path: &str, period: f64) -> EventResult<Self> {
        let series = TimeSeries::load_csv(path)?;
        let mut event = Self::series(series, period)?;
        event.source_file = Some(path.to_string());
        Ok(event)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = unit;
        self
    }

    /// Name the target and field without binding an id yet.
    pub fn on(mut self, target_name: impl Into<String>, field: impl Into<String>) -> Self {
        self.target_name = target_name.into();
        self.field = field.into();
        self.refresh_armed();
        self
    }

    /// Bind to `target` and `field` in one go.
    pub fn with_target(mut self, target: ObjectId, field: &str) -> Self {
        self.set_target(Some(target), field);
        self
    }

    /// Rebind the event and re-derive `armed`.
    pub fn set_target(&mut self, target: Option<ObjectId>, field: &str) {
        self.target = target;
        self.field = field.to_string();
        self.stale = false;
        self.refresh_armed();
    }

    /// Label used when describing the target.
    pub fn set_target_name(&mut self, name: impl Into<String>) {
        self.target_name = name.into();
    }

    pub(crate) fn set_id(&mut self, id: EventId) {
        self.id = Some(id);
    }

    pub fn id(&self) -> Option<EventId> {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub fn trigger_time(&self) -> f64 {
        self.trigger_time
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    pub fn target(&self) -> Option<ObjectId> {
        self.target
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// Position within a series; zero for other kinds.
    pub fn cursor(&self) -> usize {
        match &self.kind {
            EventKind::Series { cursor, .. } => *cursor,
            _ => 0,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// True once the target could not be resolved.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// True when the event can never fire again.
    pub fn is_finished(&self) -> bool {
        self.exhausted || self.stale
    }

    /// Due at `time`, within the shared time tolerance.
    pub fn is_due(&self, time: f64) -> bool {
        self.armed && time + SMALL_TIME >= self.trigger_time
    }

    fn refresh_armed(&mut self) {
        self.armed = self.target.is_some() && !self.field.is_empty() && !self.is_finished();
    }

    /// Apply the assignment if due, then advance to the next trigger.
    pub fn trigger(&mut self, time: f64, resolver: &mut dyn TargetResolver) -> ChangeCode {
        if !self.is_due(time) {
            return ChangeCode::NotTriggered;
        }
        let code = self.apply(resolver);
        self.update_trigger(time);
        code
    }

    /// Apply the assignment now, without moving the trigger time.
    pub fn trigger_now(&mut self, resolver: &mut dyn TargetResolver) -> ChangeCode {
        self.apply(resolver)
    }

    fn apply(&mut self, resolver: &mut dyn TargetResolver) -> ChangeCode {
        let Some(id) = self.target else {
            return ChangeCode::NotTriggered;
        };
        if self.stale {
            return ChangeCode::NotTriggered;
        }
        let Some(target) = resolver.resolve(id) else {
            warn!(event = %self, target = %id, "event target no longer exists, disarming");
            self.stale = true;
            self.armed = false;
            return ChangeCode::ExecutionFailure;
        };
        match target.set_number(&self.field, self.value, self.unit) {
            Ok(()) => {
                debug!(event = %self, "event applied");
                ChangeCode::ParameterChange
            }
            Err(err) => {
                warn!(event = %self, error = %err, "event assignment rejected");
                ChangeCode::ExecutionFailure
            }
        }
    }

    /// Advance past the trigger that just fired at `current_time`.
    pub fn update_trigger(&mut self, current_time: f64) {
        let fired = self.trigger_time;
        match &mut self.kind {
            EventKind::Single => {
                self.exhausted = true;
            }
            EventKind::Series {
                series,
                cursor,
                period,
            } => {
                *cursor += 1;
                if *cursor >= series.len() {
                    if *period > 0.0 {
                        let last = series.last_time().unwrap_or(fired);
                        // A long gap since the last entry restarts the loop
                        // relative to the entry that just fired.
                        let shift = if current_time - last > *period {
                            *period + fired
                        } else {
                            *period
                        };
                        series.shift(shift);
                        *cursor = 0;
                    } else {
                        self.exhausted = true;
                    }
                }
                if !self.exhausted {
                    self.trigger_time = series.time(*cursor);
                    self.value = series.value(*cursor);
                }
            }
            EventKind::Periodic { period } => {
                // Always moves at least one period, and past anything that
                // would count as due at `current_time`.
                loop {
                    self.trigger_time += *period;
                    if self.trigger_time > current_time + SMALL_TIME {
                        break;
                    }
                }
            }
        }
        self.refresh_armed();
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = if self.unit == Unit::Default {
            String::new()
        } else {
            format!("({})", self.unit)
        };
        if let Some(file) = &self.source_file {
            return write!(f, "{}:{}{} = <{}>", self.target_name, self.field, unit, file);
        }

        write!(f, "@{}", self.trigger_time)?;
        let mut pending_values = Vec::new();
        match &self.kind {
            EventKind::Periodic { period }
            | EventKind::Series { period, .. }
                if *period > 0.0 =>
            {
                write!(f, "+{}|", period)?;
            }
            EventKind::Series { series, cursor, .. } => {
                for k in (*cursor + 1)..series.len() {
                    write!(f, ",{}", series.time(k))?;
                    pending_values.push(series.value(k));
                }
                write!(f, "|")?;
            }
            _ => write!(f, "|")?,
        }
        write!(f, " {}:{}{} = {}", self.target_name, self.field, unit, self.value)?;
        for v in pending_values {
            write!(f, ",{}", v)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::target::testing::Recorder;
    use crate::target::ParamTarget;

    fn one_target() -> (ObjectId, BTreeMap<ObjectId, Recorder>) {
        let id = ObjectId::from_index(1);
        let mut map = BTreeMap::new();
        map.insert(id, Recorder::default());
        (id, map)
    }

    #[test]
    fn single_fires_once_then_disarms() {
        let (id, mut map) = one_target();
        let mut ev = Event::single(1.0, 3.0).with_target(id, "value");
        assert!(ev.is_armed());
        assert_eq!(ev.trigger(0.5, &mut map), ChangeCode::NotTriggered);
        assert_eq!(ev.trigger(1.0, &mut map), ChangeCode::ParameterChange);
        assert!(!ev.is_armed());
        assert_eq!(ev.trigger(2.0, &mut map), ChangeCode::NotTriggered);
        assert_eq!(map[&id].writes, vec![("value".to_string(), 3.0)]);
    }

    #[test]
    fn trigger_tolerates_small_time_offset() {
        let (id, mut map) = one_target();
        let mut ev = Event::single(1.0, 3.0).with_target(id, "value");
        assert_eq!(
            ev.trigger(1.0 - SMALL_TIME / 2.0, &mut map),
            ChangeCode::ParameterChange
        );
    }

    #[test]
    fn unbound_event_is_not_armed() {
        let ev = Event::single(1.0, 3.0).on("bus1", "value");
        assert!(!ev.is_armed());
        let mut ev = ev;
        ev.set_target(Some(ObjectId::from_index(1)), "");
        assert!(!ev.is_armed());
        ev.set_target(Some(ObjectId::from_index(1)), "value");
        assert!(ev.is_armed());
    }

    #[test]
    fn series_wraps_with_period() {
        let (id, mut map) = one_target();
        let ts = TimeSeries::from_pairs(&[(1.0, 1.0), (2.0, 2.0), (3.0, 3.0)]).unwrap();
        let mut ev = Event::series(ts, 10.0).unwrap().with_target(id, "value");
        for t in [1.0, 2.0, 3.0] {
            assert_eq!(ev.trigger(t, &mut map), ChangeCode::ParameterChange);
        }
        let EventKind::Series { series, cursor, .. } = ev.kind() else {
            panic!("expected series");
        };
        assert_eq!(series.times(), &[11.0, 12.0, 13.0]);
        assert_eq!(*cursor, 0);
        assert_eq!(ev.trigger_time(), 11.0);
        assert!(ev.is_armed());
    }

    #[test]
    fn series_without_period_disarms_when_exhausted() {
        let (id, mut map) = one_target();
        let ts = TimeSeries::from_pairs(&[(1.0, 1.0), (2.0, 2.0)]).unwrap();
        let mut ev = Event::series(ts, 0.0).unwrap().with_target(id, "value");
        ev.trigger(1.0, &mut map);
        assert!(ev.is_armed());
        ev.trigger(2.0, &mut map);
        assert!(!ev.is_armed());
        assert!(ev.is_finished());
        assert_eq!(map[&id].get_number("value"), Some(2.0));
    }

    #[test]
    fn series_overshoot_shifts_by_fired_time() {
        let (id, mut map) = one_target();
        let ts = TimeSeries::from_pairs(&[(1.0, 1.0)]).unwrap();
        let mut ev = Event::series(ts, 2.0).unwrap().with_target(id, "value");
        // Late by more than one period.
        ev.trigger(5.0, &mut map);
        assert_eq!(ev.trigger_time(), 1.0 + 2.0 + 1.0);
    }

    #[test]
    fn periodic_skips_past_current_time() {
        let (id, mut map) = one_target();
        let mut ev = Event::periodic(0.0, 1.0, 2.0)
            .unwrap()
            .with_target(id, "value");
        ev.trigger(3.5, &mut map);
        assert_eq!(ev.trigger_time(), 4.0);
        assert!(ev.is_armed());
    }

    #[test]
    fn periodic_fired_just_early_moves_forward() {
        let (id, mut map) = one_target();
        let mut ev = Event::periodic(1.0, 1.0, 2.0)
            .unwrap()
            .with_target(id, "value");
        let t = 1.0 - SMALL_TIME / 2.0;
        assert_eq!(ev.trigger(t, &mut map), ChangeCode::ParameterChange);
        assert_eq!(ev.trigger_time(), 2.0);
        assert!(!ev.is_due(t));
        assert_eq!(ev.trigger(t, &mut map), ChangeCode::NotTriggered);
        assert_eq!(map[&id].writes.len(), 1);
    }

    #[test]
    fn series_cursor_tracks_position() {
        let ts = TimeSeries::from_pairs(&[(1.0, 1.0), (1.0, 2.0)]).unwrap();
        let (id, mut map) = one_target();
        let mut ev = Event::series(ts, 0.0).unwrap().with_target(id, "value");
        assert_eq!(ev.cursor(), 0);
        ev.trigger(1.0, &mut map);
        assert_eq!(ev.cursor(), 1);
        assert_eq!(Event::single(1.0, 1.0).cursor(), 0);
    }

    #[test]
    fn periodic_rejects_zero_period() {
        assert!(Event::periodic(0.0, 0.0, 1.0).is_err());
    }

    #[test]
    fn rejected_assignment_reports_failure_and_advances() {
        let (id, mut map) = one_target();
        let mut ev = Event::single(1.0, -1.0).with_target(id, "value");
        assert_eq!(ev.trigger(1.0, &mut map), ChangeCode::ExecutionFailure);
        assert!(!ev.is_armed());
        assert!(map[&id].writes.is_empty());
    }

    #[test]
    fn stale_target_disarms_permanently() {
        let mut map: BTreeMap<ObjectId, Recorder> = BTreeMap::new();
        let mut ev = Event::periodic(0.0, 1.0, 1.0)
            .unwrap()
            .with_target(ObjectId::from_index(7), "value");
        assert_eq!(ev.trigger(0.0, &mut map), ChangeCode::ExecutionFailure);
        assert!(ev.is_stale());
        assert!(!ev.is_armed());
        assert_eq!(ev.trigger(5.0, &mut map), ChangeCode::NotTriggered);
        assert_eq!(ev.trigger_now(&mut map), ChangeCode::NotTriggered);
    }

    #[test]
    fn trigger_now_does_not_advance() {
        let (id, mut map) = one_target();
        let mut ev = Event::single(5.0, 4.0).with_target(id, "value");
        assert_eq!(ev.trigger_now(&mut map), ChangeCode::ParameterChange);
        assert_eq!(ev.trigger_time(), 5.0);
        assert!(ev.is_armed());
    }

    #[test]
    fn display_single_event() {
        let ev = Event::single(1.5, 0.0)
            .with_unit(Unit::Megawatt)
            .on("load3", "p");
        assert_eq!(ev.to_string(), "@1.5| load3:p(MW) = 0");
    }

    #[test]
    fn display_periodic_event() {
        let ev = Event::periodic(2.0, 0.5, 1.0).unwrap().on("brk", "status");
        assert_eq!(ev.to_string(), "@2+0.5| brk:status = 1");
    }

    #[test]
    fn display_series_lists_remaining_entries() {
        let ts = TimeSeries::from_pairs(&[(1.0, 4.0), (2.0, 5.0), (3.0, 6.0)]).unwrap();
        let ev = Event::series(ts, 0.0).unwrap().on("gen", "pset");
        assert_eq!(ev.to_string(), "@1,2,3| gen:pset = 4,5,6");
    }
}
