//! # Simulation Configuration
//!
//! Loaded once at startup from a TOML file:
//!
//! ```toml
//! [world]
//! initial_entity_capacity = 4096
//! initial_stash_capacity = 256
//! live_set_min_holes = 32
//!
//! [simulation]
//! fixed_timestep = 0.016666668
//! max_fixed_steps_per_frame = 8
//! max_delta = 0.1
//! frame_budget_ms = 16.666
//! enable_timing_logs = false
//! ```
//!
//! Every key is optional; missing keys take their default.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tessera_core::WorldConfig;

use crate::error::{SimulationError, SimulationResult};

/// Tick loop settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Seconds simulated per fixed step.
    pub fixed_timestep: f32,
    /// Fixed steps run at most per frame; the backlog beyond that is dropped.
    pub max_fixed_steps_per_frame: u32,
    /// Frame deltas are clamped to this many seconds.
    pub max_delta: f32,
    /// Frames slower than this count as over budget.
    pub frame_budget_ms: f32,
    /// Log a warning for every frame over budget.
    pub enable_timing_logs: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            fixed_timestep: 1.0 / 60.0,
            max_fixed_steps_per_frame: 8,
            max_delta: 0.1,
            frame_budget_ms: 16.666,
            enable_timing_logs: false,
        }
    }
}

/// Complete configuration file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Sizing of the world.
    pub world: WorldConfig,
    /// Tick loop settings.
    pub simulation: LoopConfig,
}

impl SimulationConfig {
    /// Large pre-sizing with timing logs on.
    #[must_use]
    pub fn production() -> Self {
        Self {
            world: WorldConfig::production(),
            simulation: LoopConfig {
                enable_timing_logs: true,
                ..LoopConfig::default()
            },
        }
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::InvalidConfig`] on malformed TOML or
    /// out-of-range values.
    pub fn from_toml_str(source: &str) -> SimulationResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| SimulationError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::ConfigRead`] if the file cannot be read,
    /// otherwise as [`SimulationConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> SimulationResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| SimulationError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&source)?;
        tracing::debug!(path = %path.display(), "loaded simulation config");
        Ok(config)
    }

    /// Serializes back to TOML.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::InvalidConfig`] if a value cannot be represented.
    pub fn to_toml_string(&self) -> SimulationResult<String> {
        toml::to_string_pretty(self).map_err(|e| SimulationError::InvalidConfig(e.to_string()))
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::InvalidConfig`] naming the first bad key.
    pub fn validate(&self) -> SimulationResult<()> {
        let sim = &self.simulation;
        if !(sim.fixed_timestep.is_finite() && sim.fixed_timestep > 0.0) {
            return Err(SimulationError::InvalidConfig(format!(
                "simulation.fixed_timestep must be positive, got {}",
                sim.fixed_timestep
            )));
        }
        if sim.max_fixed_steps_per_frame == 0 {
            return Err(SimulationError::InvalidConfig(
                "simulation.max_fixed_steps_per_frame must be at least 1".to_string(),
            ));
        }
        if !(sim.max_delta.is_finite() && sim.max_delta > 0.0) {
            return Err(SimulationError::InvalidConfig(format!(
                "simulation.max_delta must be positive, got {}",
                sim.max_delta
            )));
        }
        Ok(())
    }
}
