//! # Tessera Core
//!
//! Single-threaded Entity Component System runtime:
//! - Generational entity handles with O(1) stale-handle detection
//! - Sparse-set component storage with disposal hooks
//! - Incrementally maintained live entity sets driven by component bitsets
//! - Ordered system groups with deferred command buffers
//!
//! ## Example
//!
//! ```rust
//! use tessera_core::{Component, World};
//!
//! #[derive(Debug, Default, PartialEq)]
//! struct Health(u32);
//! impl Component for Health {}
//!
//! let mut world = World::new();
//! let wounded = world.query().enabled::<Health>().as_set();
//!
//! let e = world.create_entity(true).unwrap();
//! world.set(e, Health(40), true).unwrap();
//! assert!(world.set_entities(wounded).contains(e));
//!
//! world.set_enabled::<Health>(e, false).unwrap();
//! assert!(world.set_entities(wounded).is_empty());
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod ecs;
pub mod error;
pub mod serialize;

pub use config::WorldConfig;
pub use ecs::{
    Command, CommandBuffer, Component, ComponentTypeId, ComponentTypeInfo, DefaultSystemGroup,
    DynamicEntitySet, Entity, FixedRenderSystemGroup, FixedSimulationSystemGroup,
    FrameRenderSystemGroup, FrameSimulationSystemGroup, GroupState, LateFrameRenderSystemGroup,
    LateFrameSimulationSystemGroup, LiveSet, QueryBuilder, SetIteration, SetIterationSystem,
    Subscription, System, SystemGroup, SystemGroupLabel, SystemOrdering, SystemRegistration,
    World, WorldBuilder,
};
pub use error::{EcsError, EcsResult};
pub use serialize::{ByteBuffer, ComponentSerializer, PodComponent};
