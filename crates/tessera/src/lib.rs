//! # Tessera
//!
//! Simulation driver on top of [`tessera_core`]:
//! - TOML configuration for the world and the tick loop
//! - A frame / fixed-step / late-frame loop over the built-in system groups
//! - Frame statistics with a printed summary
//! - A particle demo used by the `tessera_headless` binary
//!
//! ```rust
//! use tessera::{demo, Simulation, SimulationConfig};
//!
//! # fn main() -> tessera::SimulationResult<()> {
//! let config = SimulationConfig::default();
//! let mut simulation = Simulation::from_builder(demo::builder(42), &config)?;
//! simulation.load()?;
//! for _ in 0..10 {
//!     simulation.update(1.0 / 60.0)?;
//! }
//! assert_eq!(simulation.frame_count(), 10);
//! simulation.unload()?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod demo;
pub mod error;
pub mod simulation;

pub use config::{LoopConfig, SimulationConfig};
pub use error::{SimulationError, SimulationResult};
pub use simulation::{FrameStats, FrameStatsAccumulator, Simulation};
