//! # Systems
//!
//! A system is a stateful unit of logic driven through the phases of its
//! [`SystemGroup`](super::SystemGroup):
//!
//! ```text
//! setup:    pre_setup (all) -> setup (all)
//! run:      pre_run (all) -> run (all) -> flush command buffers -> post_run (all)
//! cleanup:  pre_cleanup (all) -> cleanup (all)
//! reset:    reset (all)
//! ```
//!
//! Every phase method defaults to a no-op, so a system implements only the
//! capabilities it needs.

use std::any::{type_name, TypeId};
use std::fmt;

use super::command::CommandBuffer;
use super::component::short_type_name;
use super::query::DynamicEntitySet;
use super::world::World;
use crate::error::EcsResult;

/// A unit of logic executed by a system group.
#[allow(unused_variables)]
pub trait System: 'static {
    /// Name used in logs and ordering errors.
    fn name(&self) -> &'static str {
        short_type_name(type_name::<Self>())
    }

    /// Runs once before any system's `setup`.
    ///
    /// # Errors
    ///
    /// Any error aborts the phase.
    fn pre_setup(&mut self, world: &mut World) -> EcsResult<()> {
        Ok(())
    }

    /// Runs once when the group is set up.
    ///
    /// # Errors
    ///
    /// Any error aborts the phase.
    fn setup(&mut self, world: &mut World) -> EcsResult<()> {
        Ok(())
    }

    /// Runs every tick before any system's `run`.
    ///
    /// # Errors
    ///
    /// Any error aborts the tick.
    fn pre_run(&mut self, world: &mut World, delta: f32) -> EcsResult<()> {
        Ok(())
    }

    /// Runs every tick.
    ///
    /// # Errors
    ///
    /// Any error aborts the tick.
    fn run(&mut self, world: &mut World, delta: f32) -> EcsResult<()> {
        Ok(())
    }

    /// Runs every tick after command buffers were flushed.
    ///
    /// # Errors
    ///
    /// Any error aborts the tick.
    fn post_run(&mut self, world: &mut World, delta: f32) -> EcsResult<()> {
        Ok(())
    }

    /// Runs once before any system's `cleanup`.
    ///
    /// # Errors
    ///
    /// Any error aborts the phase.
    fn pre_cleanup(&mut self, world: &mut World) -> EcsResult<()> {
        Ok(())
    }

    /// Runs once when the group is torn down.
    ///
    /// # Errors
    ///
    /// Any error aborts the phase.
    fn cleanup(&mut self, world: &mut World) -> EcsResult<()> {
        Ok(())
    }

    /// Runs when the world is reset.
    ///
    /// # Errors
    ///
    /// Any error aborts the phase.
    fn reset(&mut self, world: &mut World) -> EcsResult<()> {
        Ok(())
    }

    /// The buffer flushed at the group synchronization point, if any.
    fn commands(&mut self) -> Option<&mut CommandBuffer> {
        None
    }
}

/// Identity of a system type, used by ordering constraints.
#[derive(Clone, Copy)]
pub struct SystemKey {
    type_id: TypeId,
    name: &'static str,
}

impl SystemKey {
    /// Key of the system type `S`.
    #[must_use]
    pub fn of<S: System>() -> Self {
        Self {
            type_id: TypeId::of::<S>(),
            name: short_type_name(type_name::<S>()),
        }
    }

    /// Short type name of the system.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for SystemKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for SystemKey {}

impl std::hash::Hash for SystemKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for SystemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Declared before/after constraints of one system.
#[derive(Clone, Debug, Default)]
pub struct SystemOrdering {
    /// Systems this one must run before.
    pub before: Vec<SystemKey>,
    /// Systems this one must run after.
    pub after: Vec<SystemKey>,
}

impl SystemOrdering {
    /// No constraints.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run before `S`.
    #[must_use]
    pub fn before<S: System>(mut self) -> Self {
        self.before.push(SystemKey::of::<S>());
        self
    }

    /// Run after `S`.
    #[must_use]
    pub fn after<S: System>(mut self) -> Self {
        self.after.push(SystemKey::of::<S>());
        self
    }

    /// Checks if no constraint is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }
}

/// Per-entity logic over a live set.
///
/// Wrap in [`SetIterationSystem`] to get a [`System`] that iterates the set
/// every tick with a command buffer for structural changes.
#[allow(unused_variables)]
pub trait SetIteration: 'static {
    /// Runs once before any system's `setup`.
    ///
    /// # Errors
    ///
    /// Any error aborts the phase.
    fn pre_setup(&mut self, world: &mut World) -> EcsResult<()> {
        Ok(())
    }

    /// Runs once when the group is set up.
    ///
    /// # Errors
    ///
    /// Any error aborts the phase.
    fn setup(&mut self, world: &mut World) -> EcsResult<()> {
        Ok(())
    }

    /// Runs before the iteration.
    ///
    /// # Errors
    ///
    /// Any error aborts the tick.
    fn pre_iterate(&mut self, world: &mut World, delta: f32) -> EcsResult<()> {
        Ok(())
    }

    /// Runs for each entity in the live set.
    ///
    /// # Errors
    ///
    /// Any error aborts the tick.
    fn iterate_entity(
        &mut self,
        world: &mut World,
        commands: &mut CommandBuffer,
        entity: super::Entity,
        delta: f32,
    ) -> EcsResult<()>;

    /// Runs after command buffers were flushed.
    ///
    /// # Errors
    ///
    /// Any error aborts the tick.
    fn post_iterate(&mut self, world: &mut World, delta: f32) -> EcsResult<()> {
        Ok(())
    }

    /// Runs once before any system's `cleanup`.
    ///
    /// # Errors
    ///
    /// Any error aborts the phase.
    fn pre_cleanup(&mut self, world: &mut World) -> EcsResult<()> {
        Ok(())
    }

    /// Runs once when the group is torn down.
    ///
    /// # Errors
    ///
    /// Any error aborts the phase.
    fn cleanup(&mut self, world: &mut World) -> EcsResult<()> {
        Ok(())
    }

    /// Runs when the world is reset.
    ///
    /// # Errors
    ///
    /// Any error aborts the phase.
    fn reset(&mut self, world: &mut World) -> EcsResult<()> {
        Ok(())
    }
}

/// System that iterates a live set each tick.
///
/// Structural changes go through the owned command buffer, which the group
/// flushes after every system has run. Cleanup releases the live set; a
/// cleaned-up system no longer iterates.
pub struct SetIterationSystem<L: SetIteration> {
    logic: L,
    set: DynamicEntitySet,
    commands: CommandBuffer,
    released: bool,
}

impl<L: SetIteration> SetIterationSystem<L> {
    /// Wraps `logic` to iterate `set`.
    #[must_use]
    pub fn new(set: DynamicEntitySet, logic: L) -> Self {
        Self {
            logic,
            set,
            commands: CommandBuffer::new(),
            released: false,
        }
    }

    /// The iterated set.
    #[must_use]
    pub const fn set(&self) -> DynamicEntitySet {
        self.set
    }

    /// The wrapped logic.
    #[must_use]
    pub fn logic(&self) -> &L {
        &self.logic
    }

    /// The wrapped logic, mutably.
    pub fn logic_mut(&mut self) -> &mut L {
        &mut self.logic
    }
}

impl<L: SetIteration> System for SetIterationSystem<L> {
    fn name(&self) -> &'static str {
        short_type_name(type_name::<L>())
    }

    fn pre_setup(&mut self, world: &mut World) -> EcsResult<()> {
        self.logic.pre_setup(world)
    }

    fn setup(&mut self, world: &mut World) -> EcsResult<()> {
        self.logic.setup(world)
    }

    fn pre_run(&mut self, world: &mut World, delta: f32) -> EcsResult<()> {
        self.logic.pre_iterate(world, delta)
    }

    fn run(&mut self, world: &mut World, delta: f32) -> EcsResult<()> {
        if self.released {
            return Ok(());
        }
        let Self { logic, set, commands, .. } = self;
        world.for_each_in(*set, |world, entity| {
            logic.iterate_entity(world, commands, entity, delta)
        })
    }

    fn post_run(&mut self, world: &mut World, delta: f32) -> EcsResult<()> {
        self.logic.post_iterate(world, delta)
    }

    fn pre_cleanup(&mut self, world: &mut World) -> EcsResult<()> {
        self.logic.pre_cleanup(world)
    }

    fn cleanup(&mut self, world: &mut World) -> EcsResult<()> {
        self.commands.clear();
        if !self.released {
            world.release_set(self.set);
            self.released = true;
        }
        self.logic.cleanup(world)
    }

    fn reset(&mut self, world: &mut World) -> EcsResult<()> {
        self.logic.reset(world)
    }

    fn commands(&mut self) -> Option<&mut CommandBuffer> {
        Some(&mut self.commands)
    }
}
