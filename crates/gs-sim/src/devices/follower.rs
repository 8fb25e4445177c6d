//! Algebraic output proportional to another object's first state.

use gs_core::{ObjectMeta, Unit};
use gs_events::{ParamError, ParamTarget};
use gs_registry::ObjectRegistry;
use gs_solver::{CallbackError, StateData};
use gs_sparse::SparseMatrixAssembler;

use crate::error::{SimError, SimResult};
use crate::layout::{Layout, ObjectSizes, Slot};
use crate::object::{ObjectRef, PhysicalObject, as_flag};

/// `y = gain * x_source`, one algebraic state.
///
/// Disconnecting the follower leaves `y` without an equation; the row is
/// then reported as masked and held at its last value.
#[derive(Clone, Debug)]
pub struct Follower {
    meta: ObjectMeta,
    source: ObjectRef,
    source_index: Option<usize>,
    pub gain: f64,
}

impl Follower {
    pub fn new(name: impl Into<String>, source: impl Into<String>, gain: f64) -> Self {
        let mut meta = ObjectMeta::new(name);
        meta.flags.has_algebraic = true;
        Self {
            meta,
            source: ObjectRef::new(source),
            source_index: None,
            gain,
        }
    }

    pub fn source(&self) -> &ObjectRef {
        &self.source
    }

    fn connected(&self) -> Option<usize> {
        if self.meta.flags.disconnected {
            None
        } else {
            self.source_index
        }
    }
}

impl ParamTarget for Follower {
    fn set_number(&mut self, field: &str, value: f64, _unit: Unit) -> Result<(), ParamError> {
        match field {
            "gain" | "k" => self.gain = value,
            "connected" | "status" => self.meta.flags.disconnected = !as_flag(field, value)?,
            _ => return Err(ParamError::unknown(field)),
        }
        Ok(())
    }

    fn get_number(&self, field: &str) -> Option<f64> {
        match field {
            "gain" | "k" => Some(self.gain),
            "connected" | "status" => Some(if self.meta.flags.disconnected { 0.0 } else { 1.0 }),
            _ => None,
        }
    }
}

impl PhysicalObject for Follower {
    fn meta(&self) -> &ObjectMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }

    fn kind(&self) -> &'static str {
        "follower"
    }

    fn clone_object(&self) -> Box<dyn PhysicalObject> {
        let mut copy = self.clone();
        copy.meta = self.meta.detached_copy();
        copy.source_index = None;
        Box::new(copy)
    }

    fn sizes(&self) -> ObjectSizes {
        ObjectSizes {
            algebraic: 1,
            ..Default::default()
        }
    }

    fn bind(&mut self, registry: &ObjectRegistry, layout: &Layout) -> SimResult<()> {
        let id = self.source.resolve(registry)?;
        let index = layout.slot(id).and_then(|s| s.state(0));
        if index.is_none() {
            return Err(SimError::UnknownObject {
                name: format!("{} (no states)", self.source.name()),
            });
        }
        self.source_index = index;
        Ok(())
    }

    fn guess(&self, slot: &Slot, _t: f64, x: &mut [f64], _xdot: &mut [f64]) {
        let i = slot.algebraic.start;
        if let Some(s) = self.connected() {
            x[i] = self.gain * x[s];
        }
    }

    fn residual(&self, slot: &Slot, sd: &StateData<'_>, out: &mut [f64]) -> Result<(), CallbackError> {
        let i = slot.algebraic.start;
        if let Some(s) = self.connected() {
            out[i] = sd.state[i] - self.gain * sd.state[s];
        }
        Ok(())
    }

    fn jacobian(
        &self,
        slot: &Slot,
        _sd: &StateData<'_>,
        jac: &mut SparseMatrixAssembler,
    ) -> Result<(), CallbackError> {
        let i = slot.algebraic.start;
        if let Some(s) = self.connected() {
            jac.assign(i, i, 1.0);
            jac.assign(i, s, -self.gain);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gs_core::ObjectId;

    #[test]
    fn residual_tracks_source() {
        let mut registry = ObjectRegistry::new();
        let src = ObjectId::from_index(0);
        let me = ObjectId::from_index(1);
        let mut meta = ObjectMeta::new("x");
        meta.id = Some(src);
        registry.insert(&meta, false);

        let layout = Layout::build([
            (
                src,
                ObjectSizes {
                    differential: 1,
                    ..Default::default()
                },
            ),
            (
                me,
                ObjectSizes {
                    algebraic: 1,
                    ..Default::default()
                },
            ),
        ]);
        let mut f = Follower::new("y", "x", 3.0);
        f.bind(&registry, &layout).unwrap();
        let slot = layout.slot(me).unwrap().clone();

        let x = [2.0, 6.0];
        let xdot = [0.0, 0.0];
        let mut out = [1.0, 1.0];
        f.residual(&slot, &StateData::new(0.0, &x, &xdot), &mut out)
            .unwrap();
        assert_eq!(out[1], 0.0);
        assert!(f.masked_states(&slot).is_empty());

        f.set_number("connected", 0.0, Unit::Default).unwrap();
        assert_eq!(f.masked_states(&slot), vec![1]);
    }
}
