//! # Command Buffers
//!
//! Deferred structural mutation.
//!
//! A system iterating a live set must not change set membership under its
//! own feet. Structural requests (destroy, add, remove, enable) are recorded
//! in the system's [`CommandBuffer`] and replayed against the world at the
//! group synchronization point, after every system's run phase and before
//! post-run.
//!
//! ## Invariants
//! - Commands execute in enqueue order.
//! - The buffer is empty after every flush, successful or not.
//! - A command whose target died before the flush (typically destroyed by an
//!   earlier command in the same flush) is skipped.

use std::any::type_name;
use std::marker::PhantomData;

use super::component::{short_type_name, Component};
use super::entity::Entity;
use super::world::World;
use crate::error::EcsResult;

/// A deferred operation against one entity.
pub trait Command: 'static {
    /// Applies the operation.
    ///
    /// # Errors
    ///
    /// Propagates the world error raised by the operation.
    fn execute(self: Box<Self>, world: &mut World, entity: Entity) -> EcsResult<()>;

    /// Name used in logs.
    fn name(&self) -> &'static str {
        short_type_name(type_name::<Self>())
    }
}

/// Destroys the target entity.
#[derive(Clone, Copy, Debug, Default)]
pub struct DestroyCommand;

impl Command for DestroyCommand {
    fn execute(self: Box<Self>, world: &mut World, entity: Entity) -> EcsResult<()> {
        world.destroy(entity);
        Ok(())
    }
}

/// Adds or overwrites a component.
#[derive(Clone, Debug)]
pub struct SetCommand<T: Component> {
    /// Value to store.
    pub value: T,
    /// Enabled state if the component is newly added.
    pub enable_if_added: bool,
}

impl<T: Component> Command for SetCommand<T> {
    fn execute(self: Box<Self>, world: &mut World, entity: Entity) -> EcsResult<()> {
        world.set(entity, self.value, self.enable_if_added)
    }
}

/// Removes a component if present.
#[derive(Debug)]
pub struct RemoveCommand<T: Component>(PhantomData<fn() -> T>);

impl<T: Component> Default for RemoveCommand<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T: Component> Command for RemoveCommand<T> {
    fn execute(self: Box<Self>, world: &mut World, entity: Entity) -> EcsResult<()> {
        world.try_remove::<T>(entity);
        Ok(())
    }
}

/// Enables or disables a component the entity already has.
#[derive(Debug)]
pub struct SetEnabledCommand<T: Component> {
    enabled: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Component> SetEnabledCommand<T> {
    /// Creates the command.
    #[must_use]
    pub const fn new(enabled: bool) -> Self {
        Self {
            enabled,
            _marker: PhantomData,
        }
    }
}

impl<T: Component> Command for SetEnabledCommand<T> {
    fn execute(self: Box<Self>, world: &mut World, entity: Entity) -> EcsResult<()> {
        world.set_enabled::<T>(entity, self.enabled)
    }
}

/// Adds a default `T` in the disabled state, or disables an existing one.
#[derive(Debug)]
pub struct EnsureAddedAndDisabledCommand<T: Component + Default>(PhantomData<fn() -> T>);

impl<T: Component + Default> Default for EnsureAddedAndDisabledCommand<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T: Component + Default> Command for EnsureAddedAndDisabledCommand<T> {
    fn execute(self: Box<Self>, world: &mut World, entity: Entity) -> EcsResult<()> {
        world.ensure_added_and_disabled::<T>(entity)
    }
}

/// Ordered queue of deferred commands.
#[derive(Default)]
pub struct CommandBuffer {
    queue: Vec<(Entity, Box<dyn Command>)>,
}

impl CommandBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pending commands.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Checks if nothing is pending.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Appends a command.
    pub fn enqueue<C: Command>(&mut self, entity: Entity, command: C) -> &mut Self {
        self.queue.push((entity, Box::new(command)));
        self
    }

    /// Appends an already boxed command.
    pub fn enqueue_boxed(&mut self, entity: Entity, command: Box<dyn Command>) -> &mut Self {
        self.queue.push((entity, command));
        self
    }

    /// Queues a destroy.
    pub fn destroy(&mut self, entity: Entity) -> &mut Self {
        self.enqueue(entity, DestroyCommand)
    }

    /// Queues a set.
    pub fn set<T: Component>(&mut self, entity: Entity, value: T, enable_if_added: bool) -> &mut Self {
        self.enqueue(entity, SetCommand { value, enable_if_added })
    }

    /// Queues a removal.
    pub fn remove<T: Component>(&mut self, entity: Entity) -> &mut Self {
        self.enqueue(entity, RemoveCommand::<T>::default())
    }

    /// Queues an enable/disable.
    pub fn set_enabled<T: Component>(&mut self, entity: Entity, enabled: bool) -> &mut Self {
        self.enqueue(entity, SetEnabledCommand::<T>::new(enabled))
    }

    /// Queues an ensure-added-and-disabled.
    pub fn ensure_added_and_disabled<T: Component + Default>(&mut self, entity: Entity) -> &mut Self {
        self.enqueue(entity, EnsureAddedAndDisabledCommand::<T>::default())
    }

    /// Drops every pending command without applying it.
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Applies every pending command in order and empties the buffer.
    ///
    /// Returns the number of commands applied.
    ///
    /// # Errors
    ///
    /// Stops at the first failing command. The remaining commands are dropped.
    pub fn flush(&mut self, world: &mut World) -> EcsResult<usize> {
        let mut applied = 0;
        for (entity, command) in self.queue.drain(..) {
            if !world.is_alive(entity) {
                tracing::debug!(command = command.name(), %entity, "skipping command for dead entity");
                continue;
            }
            command.execute(world, entity)?;
            applied += 1;
        }
        Ok(applied)
    }
}

impl std::fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBuffer")
            .field("pending", &self.queue.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Health(u32);
    impl Component for Health {}

    #[test]
    fn test_flush_applies_in_order_and_clears() {
        let mut world = World::new();
        let e = world.create_entity(true).unwrap();

        let mut buffer = CommandBuffer::new();
        buffer.set(e, Health(1), true).set(e, Health(2), true);
        buffer.set_enabled::<Health>(e, false);
        assert_eq!(buffer.len(), 3);
        assert!(world.try_get::<Health>(e).is_none(), "nothing applied before flush");

        assert_eq!(buffer.flush(&mut world).unwrap(), 3);
        assert!(buffer.is_empty());
        assert_eq!(world.get::<Health>(e).unwrap(), &Health(2));
        assert!(!world.is_enabled::<Health>(e).unwrap());
    }

    #[test]
    fn test_commands_after_destroy_are_skipped() {
        let mut world = World::new();
        let e = world.create_entity(true).unwrap();

        let mut buffer = CommandBuffer::new();
        buffer.destroy(e).set(e, Health(9), true).remove::<Health>(e);
        assert_eq!(buffer.flush(&mut world).unwrap(), 1);
        assert!(!world.is_alive(e));
    }

    #[test]
    fn test_failing_command_drops_remainder() {
        let mut world = World::new();
        let e = world.create_entity(true).unwrap();

        let mut buffer = CommandBuffer::new();
        // Health is absent, so enabling it fails
        buffer.set_enabled::<Health>(e, true).set(e, Health(3), true);
        assert!(buffer.flush(&mut world).is_err());
        assert!(buffer.is_empty());
        assert!(world.try_get::<Health>(e).is_none());
    }

    #[test]
    fn test_ensure_added_and_disabled() {
        let mut world = World::new();
        let e = world.create_entity(true).unwrap();

        let mut buffer = CommandBuffer::new();
        buffer.ensure_added_and_disabled::<Health>(e);
        buffer.flush(&mut world).unwrap();
        assert!(world.has::<Health>(e).unwrap());
        assert!(!world.is_enabled::<Health>(e).unwrap());
    }
}
