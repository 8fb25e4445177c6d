//! Capability trait shared by every simulated component.

use std::fmt;

use gs_core::{ObjectId, ObjectMeta, Unit};
use gs_events::{Event, ParamError, ParamTarget};
use gs_registry::ObjectRegistry;
use gs_solver::{CallbackError, StateData};
use gs_sparse::SparseMatrixAssembler;

use crate::error::{SimError, SimResult};
use crate::layout::{Layout, ObjectSizes, Slot};

/// A discrete consequence of an object's logic, applied by the simulation.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectAction {
    /// Assign `value` to `field` of `target`.
    SetParam {
        target: ObjectId,
        field: String,
        value: f64,
    },
    /// Register a future event.
    Schedule(Event),
}

/// A reference to another object, written by name and bound to an id once.
///
/// After the first successful bind the id is kept, so renaming the target
/// does not break the link.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRef {
    name: String,
    id: Option<ObjectId>,
}

impl ObjectRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> Option<ObjectId> {
        self.id
    }

    pub fn resolve(&mut self, registry: &ObjectRegistry) -> SimResult<ObjectId> {
        if let Some(id) = self.id
            && registry.contains(id)
        {
            return Ok(id);
        }
        let id = registry.find(&self.name).ok_or_else(|| SimError::UnknownObject {
            name: self.name.clone(),
        })?;
        self.id = Some(id);
        Ok(id)
    }

    /// Forget the bound id, e.g. after copying into another simulation.
    pub fn unbind(&mut self) {
        self.id = None;
    }
}

/// Convert an incoming value to the field's native unit.
pub(crate) fn to_native(field: &str, value: f64, unit: Unit, native: Unit) -> Result<f64, ParamError> {
    gs_core::units::convert(value, unit, native).ok_or_else(|| ParamError::BadUnit {
        field: field.to_string(),
        unit,
    })
}

/// Interpret a numeric flag: zero is off, anything else on.
pub(crate) fn as_flag(field: &str, value: f64) -> Result<bool, ParamError> {
    if !value.is_finite() {
        return Err(ParamError::out_of_range(field, value));
    }
    Ok(value != 0.0)
}

/// Everything the simulation needs from a component.
///
/// Evaluation methods receive the object's [`Slot`] and the global state; the
/// residual and root outputs are global vectors, and an object writes only
/// the rows its slot owns.
pub trait PhysicalObject: ParamTarget + Send + fmt::Debug {
    fn meta(&self) -> &ObjectMeta;

    fn meta_mut(&mut self) -> &mut ObjectMeta;

    /// Short type label, e.g. `lag` or `breaker`.
    fn kind(&self) -> &'static str;

    /// Fresh, unregistered copy carrying the same parameters.
    fn clone_object(&self) -> Box<dyn PhysicalObject>;

    fn sizes(&self) -> ObjectSizes {
        ObjectSizes::default()
    }

    /// Resolve references to other objects before states are evaluated.
    fn bind(&mut self, registry: &ObjectRegistry, layout: &Layout) -> SimResult<()> {
        let _ = (registry, layout);
        Ok(())
    }

    /// Initial values for the object's own states.
    fn guess(&self, slot: &Slot, t: f64, x: &mut [f64], xdot: &mut [f64]) {
        let _ = (slot, t, x, xdot);
    }

    fn residual(&self, slot: &Slot, sd: &StateData<'_>, out: &mut [f64]) -> Result<(), CallbackError> {
        let _ = (slot, sd, out);
        Ok(())
    }

    fn jacobian(
        &self,
        slot: &Slot,
        sd: &StateData<'_>,
        jac: &mut SparseMatrixAssembler,
    ) -> Result<(), CallbackError> {
        let _ = (slot, sd, jac);
        Ok(())
    }

    fn root_test(&self, slot: &Slot, sd: &StateData<'_>, out: &mut [f64]) {
        let _ = (slot, sd, out);
    }

    /// React to root functions of this object that crossed zero.
    ///
    /// `directions` holds one entry per local root function: +1 rising,
    /// -1 falling, 0 not fired.
    fn root_trigger(&mut self, time: f64, directions: &[i8], state: &[f64]) -> Vec<ObjectAction> {
        let _ = (time, directions, state);
        Vec::new()
    }

    /// Next time the object wants `update` called, if any.
    fn next_update(&self) -> Option<f64> {
        None
    }

    /// Discrete update at an event instant.
    fn update(&mut self, time: f64, state: &[f64]) -> Vec<ObjectAction> {
        let _ = (time, state);
        Vec::new()
    }

    /// Global algebraic rows that currently have no constraining equation.
    fn masked_states(&self, slot: &Slot) -> Vec<usize> {
        if self.meta().flags.disconnected {
            slot.algebraic.clone().collect()
        } else {
            Vec::new()
        }
    }
}
