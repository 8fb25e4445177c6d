//! gs-core: shared foundation for gridstep.
//!
//! Contains:
//! - ids (stable compact IDs for simulation objects and events)
//! - numeric (Real + tolerances + time constants)
//! - units (unit tags carried by parameter assignments, uom conversions)
//! - meta (object metadata and operational flags)
//! - error (shared error types)

pub mod error;
pub mod ids;
pub mod meta;
pub mod numeric;
pub mod units;

pub use error::{GsError, GsResult};
pub use ids::*;
pub use meta::{ObjectMeta, OperationalFlags};
pub use numeric::*;
pub use units::Unit;
