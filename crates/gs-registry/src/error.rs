//! Registry-specific error types.

use gs_core::{GsError, ObjectId};

/// Reasons an index operation was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The object carries no id yet.
    Unregistered { name: String },

    /// Another entry already uses this id.
    DuplicateId { id: ObjectId },

    /// Another entry already uses this name.
    DuplicateName { name: String, holder: ObjectId },

    /// No entry under this id.
    UnknownId { id: ObjectId },
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::Unregistered { name } => {
                write!(f, "Object '{}' has no id", name)
            }
            RegistryError::DuplicateId { id } => {
                write!(f, "Id {} is already registered", id)
            }
            RegistryError::DuplicateName { name, holder } => {
                write!(f, "Name '{}' is already used by object {}", name, holder)
            }
            RegistryError::UnknownId { id } => {
                write!(f, "Id {} is not registered", id)
            }
        }
    }
}

impl std::error::Error for RegistryError {}

impl From<RegistryError> for GsError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownId { id } => GsError::NotFound {
                what: format!("object {}", id),
            },
            other => GsError::Invariant {
                what: other.to_string(),
            },
        }
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;
