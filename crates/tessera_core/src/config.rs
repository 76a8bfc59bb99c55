//! # World Configuration
//!
//! Sizing knobs for a [`World`](crate::World). Loaded once at startup, usually
//! as the `[world]` table of the simulation config file.

use serde::{Deserialize, Serialize};

/// Configuration for a world.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Entity slots reserved up front.
    pub initial_entity_capacity: usize,
    /// Slots reserved per component stash when it is first created.
    pub initial_stash_capacity: usize,
    /// Holes a live set tolerates before it considers compacting.
    pub live_set_min_holes: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            initial_entity_capacity: 1024,
            initial_stash_capacity: 64,
            live_set_min_holes: 32,
        }
    }
}

impl WorldConfig {
    /// Large pre-sizing for long-running simulations.
    #[must_use]
    pub const fn production() -> Self {
        Self {
            initial_entity_capacity: 65_536,
            initial_stash_capacity: 4096,
            live_set_min_holes: 256,
        }
    }
}
