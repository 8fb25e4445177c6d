use thiserror::Error;

pub type GsResult<T> = Result<T, GsError>;

#[derive(Error, Debug)]
pub enum GsError {
    #[error("Non-finite numeric value for {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Index out of bounds: {what} (index={index}, len={len})")]
    IndexOob {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Invariant violated: {what}")]
    Invariant { what: String },
}
