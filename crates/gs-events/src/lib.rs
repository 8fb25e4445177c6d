//! gs-events: timed parameter changes for hybrid simulation.
//!
//! - [`ParamTarget`] is the contract events use to change object parameters.
//! - [`Event`] fires once, on a period, or along a [`TimeSeries`].
//! - [`EventEngine`] keeps events in registration order and applies the due
//!   ones at a given time.

pub mod engine;
pub mod error;
pub mod event;
pub mod series;
pub mod target;

pub use engine::EventEngine;
pub use error::{EventError, EventResult};
pub use event::{Event, EventKind};
pub use series::TimeSeries;
pub use target::{ChangeCode, ParamError, ParamTarget, TargetResolver};
