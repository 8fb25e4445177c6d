//! Protective relays.

pub mod breaker;
pub mod sensor;

pub use breaker::{Breaker, BreakerMode, INVERSE_TIME, OVERCURRENT};
pub use sensor::{RAW_OUTPUT, Sensor, SensorCondition, SensorFilter, Threshold};
