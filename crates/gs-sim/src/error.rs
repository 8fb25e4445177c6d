//! Error types for simulation assembly and runs.

use gs_solver::IntegratorStatus;
use thiserror::Error;

/// Errors encountered while building or running a simulation.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Unknown object '{name}'")]
    UnknownObject { name: String },

    #[error("Integration failed at t={time}: {status}")]
    IntegrationFailed { time: f64, status: IntegratorStatus },

    #[error("No progress past t={time}")]
    Stalled { time: f64 },

    #[error(transparent)]
    Param(#[from] gs_events::ParamError),

    #[error("Backend error: {message}")]
    Backend { message: String },
}

pub type SimResult<T> = Result<T, SimError>;

impl From<gs_solver::SolverError> for SimError {
    fn from(e: gs_solver::SolverError) -> Self {
        SimError::Backend {
            message: e.to_string(),
        }
    }
}

impl From<gs_events::EventError> for SimError {
    fn from(e: gs_events::EventError) -> Self {
        SimError::Backend {
            message: e.to_string(),
        }
    }
}

impl From<gs_registry::RegistryError> for SimError {
    fn from(e: gs_registry::RegistryError) -> Self {
        SimError::Backend {
            message: e.to_string(),
        }
    }
}

impl From<gs_core::GsError> for SimError {
    fn from(e: gs_core::GsError) -> Self {
        SimError::Backend {
            message: e.to_string(),
        }
    }
}

impl From<gs_project::ProjectError> for SimError {
    fn from(e: gs_project::ProjectError) -> Self {
        SimError::Backend {
            message: e.to_string(),
        }
    }
}
