//! Parameter contract between events and the objects they modify.

use std::collections::BTreeMap;

use gs_core::{ObjectId, Unit};
use thiserror::Error;

/// Rejection of a parameter assignment at the object boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamError {
    #[error("Unknown parameter '{field}'")]
    UnknownField { field: String },

    #[error("Value {value} out of range for '{field}'")]
    OutOfRange { field: String, value: f64 },

    #[error("Unit {unit} is not valid for '{field}'")]
    BadUnit { field: String, unit: Unit },

    #[error("Invalid text '{value}' for '{field}'")]
    BadText { field: String, value: String },
}

impl ParamError {
    pub fn unknown(field: &str) -> Self {
        ParamError::UnknownField {
            field: field.to_string(),
        }
    }

    pub fn out_of_range(field: &str, value: f64) -> Self {
        ParamError::OutOfRange {
            field: field.to_string(),
            value,
        }
    }
}

/// An object whose named parameters can be changed at run time.
pub trait ParamTarget {
    /// Assign a numeric parameter, `value` expressed in `unit`.
    fn set_number(&mut self, field: &str, value: f64, unit: Unit) -> Result<(), ParamError>;

    /// Assign a text parameter.
    fn set_text(&mut self, field: &str, value: &str) -> Result<(), ParamError> {
        let _ = value;
        Err(ParamError::unknown(field))
    }

    /// Read a numeric parameter in its native unit.
    fn get_number(&self, field: &str) -> Option<f64> {
        let _ = field;
        None
    }
}

/// Outcome of applying an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChangeCode {
    /// Not due or not armed; nothing changed.
    NotTriggered,
    /// A parameter was written.
    ParameterChange,
    /// The target rejected the value or could not be reached.
    ExecutionFailure,
}

/// Weak lookup from an id to a live target.
///
/// Returning `None` means the object is gone; events never hold references.
pub trait TargetResolver {
    fn resolve(&mut self, id: ObjectId) -> Option<&mut dyn ParamTarget>;
}

impl<T: ParamTarget> TargetResolver for BTreeMap<ObjectId, T> {
    fn resolve(&mut self, id: ObjectId) -> Option<&mut dyn ParamTarget> {
        self.get_mut(&id).map(|t| t as &mut dyn ParamTarget)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Records every numeric assignment; rejects negative values and
    /// fields other than `value`/`status`.
    #[derive(Debug, Default, Clone)]
    pub struct Recorder {
        pub writes: Vec<(String, f64)>,
    }

    impl ParamTarget for Recorder {
        fn set_number(&mut self, field: &str, value: f64, unit: Unit) -> Result<(), ParamError> {
            if field != "value" && field != "status" {
                return Err(ParamError::unknown(field));
            }
            if value < 0.0 {
                return Err(ParamError::out_of_range(field, value));
            }
            let _ = unit;
            self.writes.push((field.to_string(), value));
            Ok(())
        }

        fn get_number(&self, field: &str) -> Option<f64> {
            self.writes
                .iter()
                .rev()
                .find(|(f, _)| f == field)
                .map(|(_, v)| *v)
        }
    }
}
