//! First-order lag with an on/off status.

use gs_core::{ObjectMeta, Unit};
use gs_events::{ParamError, ParamTarget};
use gs_solver::{CallbackError, StateData};
use gs_sparse::SparseMatrixAssembler;

use crate::error::{SimError, SimResult};
use crate::layout::{ObjectSizes, Slot};
use crate::object::{PhysicalObject, as_flag, to_native};

/// First-order lag.
///
/// Dynamics: tau * dx/dt = status * gain * input - x.
///
/// Opening the status (a breaker trip) lets the output decay to zero.
#[derive(Clone, Debug)]
pub struct FirstOrderLag {
    meta: ObjectMeta,
    /// Time constant (seconds)
    pub tau: f64,
    pub gain: f64,
    pub input: f64,
    pub initial: f64,
    closed: bool,
}

impl FirstOrderLag {
    pub fn new(name: impl Into<String>, tau: f64) -> SimResult<Self> {
        if !(tau > 0.0) {
            return Err(SimError::InvalidArg {
                what: "tau must be positive",
            });
        }
        Ok(Self {
            meta: ObjectMeta::new(name),
            tau,
            gain: 1.0,
            input: 0.0,
            initial: 0.0,
            closed: true,
        })
    }

    pub fn with_gain(mut self, gain: f64) -> Self {
        self.gain = gain;
        self
    }

    pub fn with_input(mut self, input: f64) -> Self {
        self.input = input;
        self
    }

    pub fn with_initial(mut self, initial: f64) -> Self {
        self.initial = initial;
        self
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Steady-state output for the present parameters.
    pub fn target_value(&self) -> f64 {
        if self.closed { self.gain * self.input } else { 0.0 }
    }
}

impl ParamTarget for FirstOrderLag {
    fn set_number(&mut self, field: &str, value: f64, unit: Unit) -> Result<(), ParamError> {
        match field {
            "tau" => {
                let tau = to_native(field, value, unit, Unit::Second)?;
                if !(tau > 0.0) {
                    return Err(ParamError::out_of_range(field, value));
                }
                self.tau = tau;
            }
            "gain" | "k" => self.gain = value,
            "input" | "u" => self.input = value,
            "initial" | "x0" => self.initial = value,
            "status" => self.closed = as_flag(field, value)?,
            _ => return Err(ParamError::unknown(field)),
        }
        Ok(())
    }

    fn get_number(&self, field: &str) -> Option<f64> {
        match field {
            "tau" => Some(self.tau),
            "gain" | "k" => Some(self.gain),
            "input" | "u" => Some(self.input),
            "initial" | "x0" => Some(self.initial),
            "status" => Some(if self.closed { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}

impl PhysicalObject for FirstOrderLag {
    fn meta(&self) -> &ObjectMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }

    fn kind(&self) -> &'static str {
        "lag"
    }

    fn clone_object(&self) -> Box<dyn PhysicalObject> {
        let mut copy = self.clone();
        copy.meta = self.meta.detached_copy();
        Box::new(copy)
    }

    fn sizes(&self) -> ObjectSizes {
        ObjectSizes {
            differential: 1,
            ..Default::default()
        }
    }

    fn guess(&self, slot: &Slot, _t: f64, x: &mut [f64], xdot: &mut [f64]) {
        let i = slot.differential.start;
        x[i] = self.initial;
        xdot[i] = (self.target_value() - self.initial) / self.tau;
    }

    fn residual(&self, slot: &Slot, sd: &StateData<'_>, out: &mut [f64]) -> Result<(), CallbackError> {
        let i = slot.differential.start;
        out[i] = self.tau * sd.deriv[i] - (self.target_value() - sd.state[i]);
        Ok(())
    }

    fn jacobian(
        &self,
        slot: &Slot,
        sd: &StateData<'_>,
        jac: &mut SparseMatrixAssembler,
    ) -> Result<(), CallbackError> {
        let i = slot.differential.start;
        jac.assign(i, i, 1.0 + sd.cj * self.tau);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot() -> Slot {
        Slot {
            differential: 0..1,
            ..Default::default()
        }
    }

    #[test]
    fn rejects_non_positive_tau() {
        assert!(FirstOrderLag::new("bad", 0.0).is_err());
        let mut lag = FirstOrderLag::new("ok", 1.0).unwrap();
        assert!(lag.set_number("tau", -1.0, Unit::Default).is_err());
        lag.set_number("tau", 500.0, Unit::Millisecond).unwrap();
        assert_eq!(lag.tau, 0.5);
    }

    #[test]
    fn residual_vanishes_at_steady_state() {
        let lag = FirstOrderLag::new("lag", 0.2).unwrap().with_gain(2.0).with_input(1.5);
        let x = [3.0];
        let xdot = [0.0];
        let mut out = [1.0];
        lag.residual(&slot(), &StateData::new(0.0, &x, &xdot), &mut out)
            .unwrap();
        assert!(out[0].abs() < 1e-12);
    }

    #[test]
    fn open_status_drives_target_to_zero() {
        let mut lag = FirstOrderLag::new("lag", 0.2).unwrap().with_input(1.0);
        lag.set_number("status", 0.0, Unit::Default).unwrap();
        assert_eq!(lag.target_value(), 0.0);
        assert_eq!(lag.get_number("status"), Some(0.0));
        assert!(lag.set_number("speed", 1.0, Unit::Default).is_err());
    }

    #[test]
    fn jacobian_diagonal_includes_cj() {
        let lag = FirstOrderLag::new("lag", 0.5).unwrap();
        let x = [0.0];
        let xdot = [0.0];
        let sd = StateData::new(0.0, &x, &xdot).with_cj(10.0);
        let mut jac = SparseMatrixAssembler::with_limits(1, 1);
        lag.jacobian(&slot(), &sd, &mut jac).unwrap();
        assert_eq!(jac.to_dense().unwrap()[(0, 0)], 6.0);
    }
}
