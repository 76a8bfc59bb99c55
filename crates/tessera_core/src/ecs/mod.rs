//! # Entity Component System
//!
//! Sparse-set ECS with incrementally maintained live entity sets.
//!
//! ## Design Philosophy
//!
//! - Entity ids are slot indices with generation counters
//! - One sparse/dense stash per component type, O(1) set/get/remove
//! - Queries are compiled to bitsets and kept up to date per change, never rescanned
//! - Systems run in ordered groups; structural changes from iteration go through command buffers

mod bitset;
pub mod command;
mod component;
mod entity;
pub mod events;
pub mod group;
mod query;
pub mod registry;
mod sparse;
mod stash;
pub mod system;
mod world;

pub use bitset::{Bitset, Ones};
pub use command::{
    Command, CommandBuffer, DestroyCommand, EnsureAddedAndDisabledCommand, RemoveCommand,
    SetCommand, SetEnabledCommand,
};
pub use component::{
    component_type_id, component_type_info, registered_component_count, reset_type_registry,
    type_registry_epoch, Component, ComponentTypeId, ComponentTypeInfo,
};
pub use entity::{Entity, EntityAllocator, EntityInfo};
pub use events::{EntityDestroyedHandler, ResetHook, Subscription, WorldDestroyedHandler};
pub use group::{
    DefaultSystemGroup, FixedRenderSystemGroup, FixedSimulationSystemGroup,
    FrameRenderSystemGroup, FrameSimulationSystemGroup, GroupState, LateFrameRenderSystemGroup,
    LateFrameSimulationSystemGroup, SystemGroup, SystemGroupLabel,
};
pub use query::{DynamicEntitySet, LiveSet, QueryBuilder, QueryMask};
pub use registry::{SystemRegistration, WorldBuilder};
pub use sparse::SparseArray;
pub use stash::{ErasedStash, Stash};
pub use system::{SetIteration, SetIterationSystem, System, SystemKey, SystemOrdering};
pub use world::World;
