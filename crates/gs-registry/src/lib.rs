//! gs-registry: lookup index for simulation objects.
//!
//! The registry never owns objects. It records id, name, user id and parent
//! for every registered object so that names and user ids resolve to ids in
//! logarithmic time, and so that an owner can find everything it transitively
//! owns before dropping it.

pub mod error;
pub mod registry;

pub use error::{RegistryError, RegistryResult};
pub use registry::{Indexed, ObjectRegistry, RegistryEntry};
