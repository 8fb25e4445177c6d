//! Hybrid simulation of networks of dynamic objects.
//!
//! Provides:
//! - `PhysicalObject`, the capability trait every component implements
//! - an id-keyed object store solved as one DAE through `gs-solver`
//! - overcurrent breaker with reclosing, lockout and an inverse-time mode
//! - filtering sensor relay with threshold conditions
//! - first-order lag and algebraic follower demonstration devices
//! - run loop alternating continuous integration with events and root
//!   triggered discrete logic
//! - construction from `gs-project` configuration files

pub mod config;
pub mod devices;
pub mod error;
pub mod layout;
pub mod object;
pub mod relays;
pub mod sim;
pub mod store;

pub use devices::{FirstOrderLag, Follower};
pub use error::{SimError, SimResult};
pub use layout::{Layout, ObjectSizes, Slot};
pub use object::{ObjectAction, ObjectRef, PhysicalObject};
pub use relays::{Breaker, BreakerMode, Sensor, SensorCondition};
pub use sim::{SimOptions, SimRecord, Simulation};
pub use store::ObjectStore;
