//! Identity and operational flags shared by every simulation object.

use crate::ids::ObjectId;

/// Operational modes of an object, one named boolean per mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OperationalFlags {
    /// Participates in residual/Jacobian/root evaluation.
    pub enabled: bool,
    /// Declares root functions.
    pub has_roots: bool,
    /// Owns algebraic states.
    pub has_algebraic: bool,
    /// Only updated at sample instants, never inside the continuous solve.
    pub sampled_only: bool,
    /// Algebraic rows are unconstrained and should be masked.
    pub disconnected: bool,
    /// Initialize after every other object.
    pub late_initialize: bool,
}

impl Default for OperationalFlags {
    fn default() -> Self {
        Self {
            enabled: true,
            has_roots: false,
            has_algebraic: false,
            sampled_only: false,
            disconnected: false,
            late_initialize: false,
        }
    }
}

/// Identity block embedded in every simulation object.
///
/// `id` is `None` until the object is registered; after that it never changes
/// unless the owning registry is told through `update_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectMeta {
    pub id: Option<ObjectId>,
    pub name: String,
    pub user_id: Option<u32>,
    pub parent: Option<ObjectId>,
    pub flags: OperationalFlags,
}

impl ObjectMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            user_id: None,
            parent: None,
            flags: OperationalFlags::default(),
        }
    }

    pub fn with_user_id(mut self, user_id: u32) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_parent(mut self, parent: ObjectId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Copy for a cloned object: same name and flags, not yet registered.
    pub fn detached_copy(&self) -> Self {
        Self {
            id: None,
            parent: None,
            ..self.clone()
        }
    }
}
