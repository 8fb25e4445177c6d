//! Simulation file schema definitions.

use serde::{Deserialize, Serialize};

pub const LATEST_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationFile {
    #[serde(default = "default_version")]
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub solver: SolverDef,
    #[serde(default)]
    pub time: TimeDef,
    #[serde(default)]
    pub objects: Vec<ObjectDef>,
    #[serde(default)]
    pub events: Vec<EventDef>,
}

fn default_version() -> u32 {
    LATEST_VERSION
}

impl SimulationFile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            version: LATEST_VERSION,
            name: name.into(),
            solver: SolverDef::default(),
            time: TimeDef::default(),
            objects: Vec::new(),
            events: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LinearSolverDef {
    #[default]
    Dense,
    Sparse,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SolverDef {
    pub tolerance: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_step: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_step: Option<f64>,
    pub max_retries: u32,
    pub max_internal_steps: usize,
    pub linear_solver: LinearSolverDef,
    pub masking: bool,
}

impl Default for SolverDef {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            step: None,
            min_step: None,
            max_step: None,
            max_retries: 4,
            max_internal_steps: 5000,
            linear_solver: LinearSolverDef::Dense,
            masking: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeDef {
    pub start_s: f64,
    pub stop_s: f64,
    /// Spacing of recorded samples; zero records every solver return.
    pub record_interval_s: f64,
}

impl Default for TimeDef {
    fn default() -> Self {
        Self {
            start_s: 0.0,
            stop_s: 10.0,
            record_interval_s: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub kind: ObjectKindDef,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ObjectKindDef {
    /// First-order lag `tau x' = status * gain * input - x`.
    Lag {
        #[serde(default = "one")]
        gain: f64,
        tau_s: f64,
        #[serde(default)]
        input: f64,
        #[serde(default)]
        initial: f64,
    },
    /// Algebraic `y = gain * state(source)`.
    Follower {
        source: String,
        #[serde(default = "one")]
        gain: f64,
    },
    /// Overcurrent breaker watching `monitor` and opening `target`.
    Breaker {
        monitor: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
        limit: f64,
        #[serde(default)]
        min_clearing_time_s: f64,
        #[serde(default = "reclose_time1")]
        reclose_time1_s: f64,
        #[serde(default = "reclose_time2")]
        reclose_time2_s: f64,
        #[serde(default = "recloser_reset_time")]
        recloser_reset_time_s: f64,
        #[serde(default)]
        max_reclose_attempts: u32,
        /// Inverse-time dial; trips on integrated excess current when set.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cti_s: Option<f64>,
    },
    /// Filtered measurement of one state of `input` with threshold actions.
    Sensor {
        input: String,
        #[serde(default)]
        input_state: usize,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        filters: Vec<FilterDef>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        conditions: Vec<ConditionDef>,
    },
}

/// First-order filter `tau y' = gain u - y` inside a sensor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilterDef {
    pub name: String,
    pub tau_s: f64,
    #[serde(default = "one")]
    pub gain: f64,
}

/// Sensor condition: when `output` goes above or below its level, write
/// `value` to `target` (`object:field`) after `delay_s`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConditionDef {
    #[serde(default = "raw_output")]
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub above: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub below: Option<f64>,
    pub target: String,
    pub value: f64,
    #[serde(default)]
    pub delay_s: f64,
}

impl ConditionDef {
    pub fn split_target(&self) -> Option<(&str, &str)> {
        split_object_field(&self.target)
    }
}

fn raw_output() -> String {
    "input".to_string()
}

fn one() -> f64 {
    1.0
}

fn reclose_time1() -> f64 {
    1.0
}

fn reclose_time2() -> f64 {
    5.0
}

fn recloser_reset_time() -> f64 {
    60.0
}

/// A scheduled parameter change.
///
/// Exactly one timing source is used: `file`, `times`, or `time`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct EventDef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `object:field`.
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub times: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<f64>,
    pub period: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl EventDef {
    /// Split `target` into object name and field.
    pub fn split_target(&self) -> Option<(&str, &str)> {
        split_object_field(&self.target)
    }
}

fn split_object_field(target: &str) -> Option<(&str, &str)> {
    let (object, field) = target.rsplit_once(':')?;
    if object.is_empty() || field.is_empty() {
        return None;
    }
    Some((object, field))
}
