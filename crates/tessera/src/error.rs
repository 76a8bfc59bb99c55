//! # Simulation Error Types
//!
//! All errors that can occur while configuring or driving a simulation.

use std::path::PathBuf;

use tessera_core::EcsError;
use thiserror::Error;

/// Errors that can occur in the simulation driver.
#[derive(Error, Debug)]
pub enum SimulationError {
    /// A world or system operation failed.
    #[error(transparent)]
    Ecs(#[from] EcsError),

    /// The configuration file could not be read.
    #[error("failed to read configuration {path}: {source}")]
    ConfigRead {
        /// File that was requested.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration is malformed or out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// `update` was called before `load` or after `unload`.
    #[error("simulation is not loaded")]
    NotLoaded,
}

/// Result type for simulation operations.
pub type SimulationResult<T> = Result<T, SimulationError>;
