//! Id-keyed object arena, seen by the solver as one DAE.

use std::collections::BTreeMap;

use gs_core::ObjectId;
use gs_events::{ParamTarget, TargetResolver};
use gs_registry::ObjectRegistry;
use gs_solver::{CallbackError, DaeModel, SolverMode, StateData};
use gs_sparse::SparseMatrixAssembler;
use tracing::trace;

use crate::error::SimResult;
use crate::layout::Layout;
use crate::object::{ObjectAction, PhysicalObject};

/// Owns every object of a simulation.
///
/// States are laid out in id order over the enabled objects. The last
/// accepted solution is kept per object so re-initialisation after a
/// discrete change starts from where integration stopped.
#[derive(Debug, Default)]
pub struct ObjectStore {
    objects: BTreeMap<ObjectId, Box<dyn PhysicalObject>>,
    layout: Layout,
    saved: BTreeMap<ObjectId, Vec<f64>>,
    saved_deriv: BTreeMap<ObjectId, Vec<f64>>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn insert(&mut self, id: ObjectId, object: Box<dyn PhysicalObject>) {
        self.objects.insert(id, object);
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<Box<dyn PhysicalObject>> {
        self.saved.remove(&id);
        self.saved_deriv.remove(&id);
        self.objects.remove(&id)
    }

    pub fn get(&self, id: ObjectId) -> Option<&dyn PhysicalObject> {
        self.objects.get(&id).map(|o| o.as_ref())
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut (dyn PhysicalObject + 'static)> {
        self.objects.get_mut(&id).map(|o| o.as_mut())
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &dyn PhysicalObject)> {
        self.objects.iter().map(|(id, o)| (*id, o.as_ref()))
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Recompute the layout and bind every object against it.
    pub fn rebuild(&mut self, registry: &ObjectRegistry) -> SimResult<()> {
        let layout = Layout::build(
            self.objects
                .iter()
                .filter(|(_, o)| o.meta().flags.enabled)
                .map(|(id, o)| (*id, o.sizes())),
        );
        for obj in self.objects.values_mut() {
            if obj.meta().flags.enabled {
                obj.bind(registry, &layout)?;
            }
        }
        self.layout = layout;
        Ok(())
    }

    /// Remember the solution so the next `guess` resumes from it.
    pub fn capture(&mut self, x: &[f64], xdot: &[f64]) {
        for (id, slot) in self.layout.slots() {
            if slot.state_count() == 0 {
                continue;
            }
            self.saved
                .insert(id, slot.state_indices().map(|i| x[i]).collect());
            self.saved_deriv
                .insert(id, slot.state_indices().map(|i| xdot[i]).collect());
        }
    }

    /// Value of `id`'s `k`-th state in `x`.
    pub fn state_of(&self, id: ObjectId, k: usize, x: &[f64]) -> Option<f64> {
        let i = self.layout.slot(id)?.state(k)?;
        x.get(i).copied()
    }

    /// Earliest requested object update.
    pub fn next_update(&self) -> Option<f64> {
        self.objects
            .values()
            .filter_map(|o| o.next_update())
            .min_by(f64::total_cmp)
    }

    /// Dispatch fired root functions to their owners.
    pub fn root_trigger(&mut self, time: f64, directions: &[i8], state: &[f64]) -> Vec<ObjectAction> {
        let mut actions = Vec::new();
        for (id, slot) in self.layout.slots() {
            let local = &directions[slot.roots.clone()];
            if local.iter().all(|d| *d == 0) {
                continue;
            }
            if let Some(obj) = self.objects.get_mut(&id) {
                trace!(object = %obj.meta().name, time, "root trigger");
                actions.extend(obj.root_trigger(time, local, state));
            }
        }
        actions
    }

    /// Run every object's discrete update at `time`.
    pub fn update(&mut self, time: f64, state: &[f64]) -> Vec<(ObjectId, ObjectAction)> {
        let mut actions = Vec::new();
        for (id, obj) in &mut self.objects {
            if !obj.meta().flags.enabled {
                continue;
            }
            actions.extend(obj.update(time, state).into_iter().map(|a| (*id, a)));
        }
        actions
    }
}

impl TargetResolver for ObjectStore {
    fn resolve(&mut self, id: ObjectId) -> Option<&mut dyn ParamTarget> {
        self.objects
            .get_mut(&id)
            .map(|o| o.as_mut() as &mut dyn ParamTarget)
    }
}

impl DaeModel for ObjectStore {
    fn solver_mode(&self) -> SolverMode {
        self.layout.solver_mode()
    }

    fn root_count(&self) -> usize {
        self.layout.root_count()
    }

    fn guess(&mut self, t: f64, x: &mut [f64], xdot: &mut [f64]) {
        // Saved solutions first, then objects without one; algebraic-only
        // objects last since they usually read differential states.
        let mut fresh = Vec::new();
        for (id, slot) in self.layout.slots() {
            match (self.saved.get(&id), self.saved_deriv.get(&id)) {
                (Some(v), Some(d)) if v.len() == slot.state_count() => {
                    for (k, i) in slot.state_indices().enumerate() {
                        x[i] = v[k];
                        xdot[i] = d[k];
                    }
                }
                _ => fresh.push((id, slot.differential.is_empty())),
            }
        }
        fresh.sort_by_key(|(_, alg_only)| *alg_only);
        for (id, _) in fresh {
            if let (Some(obj), Some(slot)) = (self.objects.get(&id), self.layout.slot(id)) {
                obj.guess(slot, t, x, xdot);
            }
        }
    }

    fn residual(&mut self, sd: &StateData<'_>, out: &mut [f64]) -> Result<(), CallbackError> {
        out.fill(0.0);
        for (id, slot) in self.layout.slots() {
            if let Some(obj) = self.objects.get(&id) {
                obj.residual(slot, sd, out)?;
            }
        }
        Ok(())
    }

    fn jacobian(
        &mut self,
        sd: &StateData<'_>,
        jac: &mut SparseMatrixAssembler,
    ) -> Result<(), CallbackError> {
        for (id, slot) in self.layout.slots() {
            if let Some(obj) = self.objects.get(&id) {
                obj.jacobian(slot, sd, jac)?;
            }
        }
        Ok(())
    }

    fn root_test(&mut self, sd: &StateData<'_>, out: &mut [f64]) -> Result<(), CallbackError> {
        out.fill(1.0);
        for (id, slot) in self.layout.slots() {
            if slot.roots.is_empty() {
                continue;
            }
            if let Some(obj) = self.objects.get(&id) {
                obj.root_test(slot, sd, out);
            }
        }
        Ok(())
    }

    fn masked_states(&self) -> Vec<usize> {
        let mut rows = Vec::new();
        for (id, slot) in self.layout.slots() {
            if let Some(obj) = self.objects.get(&id) {
                rows.extend(obj.masked_states(slot));
            }
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{FirstOrderLag, Follower};
    use gs_core::{ObjectMeta, Unit};

    fn store_with_pair() -> (ObjectStore, ObjectRegistry, ObjectId, ObjectId) {
        let mut registry = ObjectRegistry::new();
        let mut store = ObjectStore::new();
        let a = ObjectId::from_index(0);
        let b = ObjectId::from_index(1);

        let mut y = Follower::new("y", "x", 2.0);
        y.meta_mut().id = Some(a);
        let mut x = FirstOrderLag::new("x", 1.0).unwrap().with_initial(3.0);
        x.meta_mut().id = Some(b);
        registry.insert(y.meta(), false);
        registry.insert(x.meta(), false);
        store.insert(a, Box::new(y));
        store.insert(b, Box::new(x));
        store.rebuild(&registry).unwrap();
        (store, registry, a, b)
    }

    #[test]
    fn guess_fills_differential_before_algebraic() {
        let (mut store, _, a, b) = store_with_pair();
        let n = store.layout().state_count();
        let mut x = vec![0.0; n];
        let mut xd = vec![0.0; n];
        store.guess(0.0, &mut x, &mut xd);
        assert_eq!(store.state_of(b, 0, &x), Some(3.0));
        assert_eq!(store.state_of(a, 0, &x), Some(6.0));
    }

    #[test]
    fn captured_state_wins_over_initial() {
        let (mut store, _, _, b) = store_with_pair();
        let x = vec![5.0, 10.0];
        let xd = vec![0.0, 0.0];
        store.capture(&x, &xd);
        let mut g = vec![0.0; 2];
        let mut gd = vec![0.0; 2];
        store.guess(0.0, &mut g, &mut gd);
        assert_eq!(store.state_of(b, 0, &g), Some(5.0));
    }

    #[test]
    fn resolver_reaches_objects() {
        let (mut store, _, _, b) = store_with_pair();
        let target = store.resolve(b).unwrap();
        target.set_number("input", 4.0, Unit::Default).unwrap();
        assert_eq!(store.get(b).unwrap().get_number("input"), Some(4.0));
        assert!(store.resolve(ObjectId::from_index(9)).is_none());
    }

    #[test]
    fn disabled_objects_take_no_states() {
        let (mut store, registry, _, b) = store_with_pair();
        let mut meta: ObjectMeta = store.get(b).unwrap().meta().clone();
        meta.flags.enabled = false;
        *store.get_mut(b).unwrap().meta_mut() = meta;
        // The follower now references an object without states.
        assert!(store.rebuild(&registry).is_err());
    }
}
