//! Event construction and loading errors.

use thiserror::Error;

pub type EventResult<T> = Result<T, EventError>;

#[derive(Error, Debug)]
pub enum EventError {
    #[error("Time series is not sorted: t[{index}]={time} after {previous}")]
    Unsorted {
        index: usize,
        time: f64,
        previous: f64,
    },

    #[error("Time series lengths differ: {times} times, {values} values")]
    LengthMismatch { times: usize, values: usize },

    #[error("Non-finite {what} in time series row {row}")]
    NonFinite { what: &'static str, row: usize },

    #[error("Invalid event: {what}")]
    Invalid { what: String },

    #[error("Event file {path}: {message}")]
    File { path: String, message: String },

    #[error(transparent)]
    Csv(#[from] csv::Error),
}
