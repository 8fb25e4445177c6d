//! Placement of object states and root functions in the global vectors.

use std::collections::BTreeMap;
use std::ops::Range;

use gs_core::ObjectId;
use gs_solver::SolverMode;

/// How many states and root functions an object contributes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectSizes {
    pub differential: usize,
    pub algebraic: usize,
    pub roots: usize,
}

/// An object's share of the global state and root vectors.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Slot {
    pub differential: Range<usize>,
    pub algebraic: Range<usize>,
    pub roots: Range<usize>,
}

impl Slot {
    /// Global index of the object's `k`-th state, counting differential
    /// states first.
    pub fn state(&self, k: usize) -> Option<usize> {
        let nd = self.differential.len();
        if k < nd {
            Some(self.differential.start + k)
        } else if k - nd < self.algebraic.len() {
            Some(self.algebraic.start + k - nd)
        } else {
            None
        }
    }

    pub fn state_count(&self) -> usize {
        self.differential.len() + self.algebraic.len()
    }

    /// Global state indices in local order.
    pub fn state_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.differential.clone().chain(self.algebraic.clone())
    }
}

/// Global layout: every differential state, then every algebraic state.
#[derive(Debug, Clone, Default)]
pub struct Layout {
    slots: BTreeMap<ObjectId, Slot>,
    diff_size: usize,
    alg_size: usize,
    root_count: usize,
}

impl Layout {
    /// Lay out `objects` in the order given.
    pub fn build(objects: impl IntoIterator<Item = (ObjectId, ObjectSizes)>) -> Self {
        let sized: Vec<(ObjectId, ObjectSizes)> = objects.into_iter().collect();
        let diff_size: usize = sized.iter().map(|(_, s)| s.differential).sum();

        let mut slots = BTreeMap::new();
        let (mut d, mut a, mut r) = (0, diff_size, 0);
        for (id, s) in sized {
            let slot = Slot {
                differential: d..d + s.differential,
                algebraic: a..a + s.algebraic,
                roots: r..r + s.roots,
            };
            d += s.differential;
            a += s.algebraic;
            r += s.roots;
            slots.insert(id, slot);
        }
        Self {
            slots,
            diff_size,
            alg_size: a - diff_size,
            root_count: r,
        }
    }

    pub fn slot(&self, id: ObjectId) -> Option<&Slot> {
        self.slots.get(&id)
    }

    pub fn slots(&self) -> impl Iterator<Item = (ObjectId, &Slot)> {
        self.slots.iter().map(|(id, s)| (*id, s))
    }

    pub fn solver_mode(&self) -> SolverMode {
        SolverMode::new(self.diff_size, self.alg_size)
    }

    pub fn state_count(&self) -> usize {
        self.diff_size + self.alg_size
    }

    pub fn root_count(&self) -> usize {
        self.root_count
    }

    /// The object owning global root `index`, and the local index.
    pub fn root_owner(&self, index: usize) -> Option<(ObjectId, usize)> {
        self.slots
            .iter()
            .find(|(_, s)| s.roots.contains(&index))
            .map(|(id, s)| (*id, index - s.roots.start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes(d: usize, a: usize, r: usize) -> ObjectSizes {
        ObjectSizes {
            differential: d,
            algebraic: a,
            roots: r,
        }
    }

    #[test]
    fn differential_states_come_first() {
        let a = ObjectId::from_index(0);
        let b = ObjectId::from_index(1);
        let layout = Layout::build([(a, sizes(1, 1, 0)), (b, sizes(2, 0, 1))]);

        assert_eq!(layout.state_count(), 4);
        assert_eq!(layout.solver_mode().differential_range(), 0..3);
        let sa = layout.slot(a).unwrap();
        let sb = layout.slot(b).unwrap();
        assert_eq!(sa.differential, 0..1);
        assert_eq!(sa.algebraic, 3..4);
        assert_eq!(sb.differential, 1..3);
        assert_eq!(sa.state(1), Some(3));
        assert_eq!(sa.state(2), None);
        assert_eq!(layout.root_owner(0), Some((b, 0)));
        assert_eq!(layout.root_owner(1), None);
    }
}
