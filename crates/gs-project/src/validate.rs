//! Simulation file validation.

use std::collections::HashSet;

use gs_core::Unit;

use crate::schema::{ConditionDef, EventDef, ObjectKindDef, SimulationFile, SolverDef, TimeDef};

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("Duplicate name: {name} in {context}")]
    DuplicateName { name: String, context: String },

    #[error("Missing reference: {name} in {context}")]
    MissingReference { name: String, context: String },

    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unsupported version: {version}")]
    UnsupportedVersion { version: u32 },
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

pub fn validate_file(file: &SimulationFile) -> Result<(), ValidationError> {
    if file.version > crate::schema::LATEST_VERSION {
        return Err(ValidationError::UnsupportedVersion {
            version: file.version,
        });
    }
    validate_solver(&file.solver)?;
    validate_time(&file.time)?;

    let mut names = HashSet::new();
    for obj in &file.objects {
        if obj.name.is_empty() {
            return Err(invalid("objects.name", "", "object names must not be empty"));
        }
        if !names.insert(obj.name.as_str()) {
            return Err(ValidationError::DuplicateName {
                name: obj.name.clone(),
                context: "objects".to_string(),
            });
        }
    }

    for obj in &file.objects {
        if let Some(parent) = &obj.parent
            && !names.contains(parent.as_str())
        {
            return Err(ValidationError::MissingReference {
                name: parent.clone(),
                context: format!("parent of {}", obj.name),
            });
        }
        match &obj.kind {
            ObjectKindDef::Lag { tau_s, .. } => {
                if !(*tau_s > 0.0) {
                    return Err(invalid("tau_s", tau_s, "time constant must be positive"));
                }
            }
            ObjectKindDef::Follower { source, .. } => {
                if !names.contains(source.as_str()) {
                    return Err(ValidationError::MissingReference {
                        name: source.clone(),
                        context: format!("source of {}", obj.name),
                    });
                }
            }
            ObjectKindDef::Breaker {
                monitor,
                target,
                limit,
                min_clearing_time_s,
                reclose_time1_s,
                reclose_time2_s,
                recloser_reset_time_s,
                cti_s,
                ..
            } => {
                for name in std::iter::once(monitor).chain(target.iter()) {
                    if !names.contains(name.as_str()) {
                        return Err(ValidationError::MissingReference {
                            name: name.clone(),
                            context: format!("breaker {}", obj.name),
                        });
                    }
                }
                if !(*limit > 0.0) {
                    return Err(invalid("limit", limit, "current limit must be positive"));
                }
                for (field, v) in [
                    ("min_clearing_time_s", min_clearing_time_s),
                    ("reclose_time1_s", reclose_time1_s),
                    ("reclose_time2_s", reclose_time2_s),
                    ("recloser_reset_time_s", recloser_reset_time_s),
                ] {
                    if !(*v >= 0.0) {
                        return Err(invalid(field, v, "must be non-negative"));
                    }
                }
                if let Some(cti) = cti_s
                    && !(*cti > 0.0)
                {
                    return Err(invalid("cti_s", cti, "inverse-time dial must be positive"));
                }
            }
            ObjectKindDef::Sensor {
                input,
                filters,
                conditions,
                ..
            } => {
                if !names.contains(input.as_str()) {
                    return Err(ValidationError::MissingReference {
                        name: input.clone(),
                        context: format!("input of sensor {}", obj.name),
                    });
                }
                let mut outputs: HashSet<&str> = HashSet::from(["input"]);
                for f in filters {
                    if !(f.tau_s > 0.0) {
                        return Err(invalid("filters.tau_s", f.tau_s, "time constant must be positive"));
                    }
                    if !outputs.insert(f.name.as_str()) {
                        return Err(ValidationError::DuplicateName {
                            name: f.name.clone(),
                            context: format!("outputs of sensor {}", obj.name),
                        });
                    }
                }
                for c in conditions {
                    validate_condition(c, &outputs, &names, &obj.name)?;
                }
            }
        }
    }

    for event in &file.events {
        validate_event(event)?;
    }
    Ok(())
}

fn validate_condition(
    c: &ConditionDef,
    outputs: &HashSet<&str>,
    names: &HashSet<&str>,
    sensor: &str,
) -> Result<(), ValidationError> {
    if c.above.is_some() == c.below.is_some() {
        return Err(invalid(
            "conditions",
            &c.target,
            "exactly one of above or below is required",
        ));
    }
    if !outputs.contains(c.output.as_str()) {
        return Err(ValidationError::MissingReference {
            name: c.output.clone(),
            context: format!("condition output of sensor {sensor}"),
        });
    }
    let (object, _) = c
        .split_target()
        .ok_or_else(|| invalid("conditions.target", &c.target, "expected object:field"))?;
    if !names.contains(object) {
        return Err(ValidationError::MissingReference {
            name: object.to_string(),
            context: format!("condition target of sensor {sensor}"),
        });
    }
    if !(c.delay_s >= 0.0) {
        return Err(invalid("conditions.delay_s", c.delay_s, "must be non-negative"));
    }
    Ok(())
}

fn validate_solver(solver: &SolverDef) -> Result<(), ValidationError> {
    if !(solver.tolerance > 0.0) {
        return Err(invalid("solver.tolerance", solver.tolerance, "must be positive"));
    }
    for (field, v) in [
        ("solver.step", solver.step),
        ("solver.min_step", solver.min_step),
        ("solver.max_step", solver.max_step),
    ] {
        if let Some(v) = v
            && !(v >= 0.0 && v.is_finite())
        {
            return Err(invalid(field, v, "must be finite and non-negative"));
        }
    }
    if let (Some(lo), Some(hi)) = (solver.min_step, solver.max_step)
        && lo > hi
    {
        return Err(invalid("solver.min_step", lo, "exceeds max_step"));
    }
    if solver.max_internal_steps == 0 {
        return Err(invalid("solver.max_internal_steps", 0, "must be at least 1"));
    }
    Ok(())
}

fn validate_time(time: &TimeDef) -> Result<(), ValidationError> {
    if !time.start_s.is_finite() || !time.stop_s.is_finite() {
        return Err(invalid("time", time.stop_s, "times must be finite"));
    }
    if time.stop_s < time.start_s {
        return Err(invalid("time.stop_s", time.stop_s, "stop precedes start"));
    }
    if !(time.record_interval_s >= 0.0) {
        return Err(invalid(
            "time.record_interval_s",
            time.record_interval_s,
            "must be non-negative",
        ));
    }
    Ok(())
}

fn validate_event(event: &EventDef) -> Result<(), ValidationError> {
    if event.split_target().is_none() {
        return Err(invalid("events.target", &event.target, "expected object:field"));
    }
    if let Some(unit) = &event.unit
        && unit.parse::<Unit>().is_err()
    {
        return Err(invalid("events.unit", unit, "unrecognized unit"));
    }
    if !(event.period >= 0.0 && event.period.is_finite()) {
        return Err(invalid("events.period", event.period, "must be non-negative"));
    }

    let sources = usize::from(event.file.is_some())
        + usize::from(!event.times.is_empty())
        + usize::from(event.time.is_some());
    if sources != 1 {
        return Err(invalid(
            "events",
            &event.target,
            "exactly one of time, times or file is required",
        ));
    }
    if !event.times.is_empty() {
        if event.values.len() != event.times.len() {
            return Err(invalid(
                "events.values",
                event.values.len(),
                "must match the number of times",
            ));
        }
        if event.times.windows(2).any(|w| w[1] < w[0]) {
            return Err(invalid("events.times", &event.target, "times must be non-decreasing"));
        }
    }
    if event.time.is_some() && event.value.is_none() {
        return Err(invalid("events.value", &event.target, "single events need a value"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ObjectDef;

    fn lag(name: &str) -> ObjectDef {
        ObjectDef {
            name: name.into(),
            user_id: None,
            parent: None,
            kind: ObjectKindDef::Lag {
                gain: 1.0,
                tau_s: 0.5,
                input: 1.0,
                initial: 0.0,
            },
        }
    }

    #[test]
    fn duplicate_object_names_rejected() {
        let mut file = SimulationFile::new("dup");
        file.objects = vec![lag("a"), lag("a")];
        assert!(matches!(
            validate_file(&file),
            Err(ValidationError::DuplicateName { .. })
        ));
    }

    #[test]
    fn follower_source_must_exist() {
        let mut file = SimulationFile::new("refs");
        file.objects = vec![ObjectDef {
            name: "y".into(),
            user_id: None,
            parent: None,
            kind: ObjectKindDef::Follower {
                source: "missing".into(),
                gain: 2.0,
            },
        }];
        assert!(matches!(
            validate_file(&file),
            Err(ValidationError::MissingReference { .. })
        ));
    }

    #[test]
    fn event_needs_one_timing_source() {
        let mut file = SimulationFile::new("ev");
        file.events.push(EventDef {
            target: "a:input".into(),
            time: Some(1.0),
            times: vec![2.0],
            values: vec![1.0],
            value: Some(1.0),
            ..Default::default()
        });
        assert!(validate_file(&file).is_err());
        file.events[0].times.clear();
        file.events[0].values.clear();
        validate_file(&file).unwrap();
    }

    #[test]
    fn series_values_must_match_times() {
        let mut file = SimulationFile::new("ev");
        file.events.push(EventDef {
            target: "a:input".into(),
            times: vec![1.0, 2.0],
            values: vec![1.0],
            ..Default::default()
        });
        assert!(validate_file(&file).is_err());
    }

    #[test]
    fn bad_unit_rejected() {
        let mut file = SimulationFile::new("ev");
        file.events.push(EventDef {
            target: "a:input".into(),
            time: Some(1.0),
            value: Some(1.0),
            unit: Some("furlong".into()),
            ..Default::default()
        });
        assert!(validate_file(&file).is_err());
    }

    #[test]
    fn min_step_above_max_step_rejected() {
        let mut file = SimulationFile::new("solver");
        file.solver.min_step = Some(0.1);
        file.solver.max_step = Some(0.01);
        assert!(validate_file(&file).is_err());
    }

    fn sensor(conditions: Vec<ConditionDef>) -> ObjectDef {
        ObjectDef {
            name: "meter".into(),
            user_id: None,
            parent: None,
            kind: ObjectKindDef::Sensor {
                input: "a".into(),
                input_state: 0,
                filters: vec![crate::schema::FilterDef {
                    name: "avg".into(),
                    tau_s: 0.1,
                    gain: 1.0,
                }],
                conditions,
            },
        }
    }

    fn condition(output: &str, target: &str) -> ConditionDef {
        ConditionDef {
            output: output.into(),
            above: Some(1.0),
            below: None,
            target: target.into(),
            value: 0.0,
            delay_s: 0.0,
        }
    }

    #[test]
    fn sensor_conditions_are_checked() {
        let mut file = SimulationFile::new("sensors");
        file.objects = vec![lag("a"), sensor(vec![condition("avg", "a:status")])];
        validate_file(&file).unwrap();

        file.objects[1] = sensor(vec![condition("peak", "a:status")]);
        assert!(matches!(
            validate_file(&file),
            Err(ValidationError::MissingReference { .. })
        ));

        file.objects[1] = sensor(vec![condition("input", "b:status")]);
        assert!(matches!(
            validate_file(&file),
            Err(ValidationError::MissingReference { .. })
        ));

        let mut both = condition("avg", "a:status");
        both.below = Some(0.5);
        file.objects[1] = sensor(vec![both]);
        assert!(validate_file(&file).is_err());

        file.objects[1] = sensor(vec![condition("avg", "a")]);
        assert!(validate_file(&file).is_err());
    }

    #[test]
    fn breaker_dial_must_be_positive() {
        let mut file = SimulationFile::new("brk");
        file.objects = vec![
            lag("a"),
            ObjectDef {
                name: "b".into(),
                user_id: None,
                parent: None,
                kind: ObjectKindDef::Breaker {
                    monitor: "a".into(),
                    target: None,
                    limit: 1.0,
                    min_clearing_time_s: 0.0,
                    reclose_time1_s: 1.0,
                    reclose_time2_s: 5.0,
                    recloser_reset_time_s: 60.0,
                    max_reclose_attempts: 0,
                    cti_s: Some(0.0),
                },
            },
        ];
        assert!(validate_file(&file).is_err());
    }
}
