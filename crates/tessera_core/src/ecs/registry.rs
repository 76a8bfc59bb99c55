//! # System Registration
//!
//! Systems are registered explicitly with a [`WorldBuilder`]. Each
//! registration names the target group and ordering constraints and carries
//! a factory that builds the system against the new world, so a system can
//! register its live sets while it is being constructed.
//!
//! ```rust
//! use tessera_core::{
//!     EcsResult, FixedSimulationSystemGroup, System, SystemRegistration, World, WorldBuilder,
//! };
//!
//! struct Physics;
//! impl System for Physics {}
//!
//! struct Collisions;
//! impl System for Collisions {}
//!
//! # fn main() -> EcsResult<()> {
//! let world = WorldBuilder::new()
//!     .register(SystemRegistration::new(|_: &mut World| Collisions)
//!         .in_group::<FixedSimulationSystemGroup>()
//!         .after::<Physics>())
//!     .register(SystemRegistration::new(|_: &mut World| Physics)
//!         .in_group::<FixedSimulationSystemGroup>())
//!     .build()?;
//!
//! let group = world.group::<FixedSimulationSystemGroup>().unwrap();
//! assert_eq!(group.system_names(), vec!["Physics", "Collisions"]);
//! # Ok(())
//! # }
//! ```

use std::fmt;

use super::group::{DefaultSystemGroup, SystemGroup, SystemGroupLabel};
use super::system::{System, SystemKey, SystemOrdering};
use super::world::World;
use crate::config::WorldConfig;
use crate::error::EcsResult;

type SystemFactory = Box<dyn FnOnce(&mut World) -> EcsResult<Box<dyn System>>>;
type GroupAccessor = for<'w> fn(&'w mut World) -> &'w mut SystemGroup;

/// One system to instantiate when the world is built.
pub struct SystemRegistration {
    key: SystemKey,
    group_name: &'static str,
    group: GroupAccessor,
    ordering: SystemOrdering,
    factory: SystemFactory,
}

impl SystemRegistration {
    /// Registers a system built by an infallible factory, in the default group.
    pub fn new<S: System>(factory: impl FnOnce(&mut World) -> S + 'static) -> Self {
        Self::try_new(move |world| Ok(factory(world)))
    }

    /// Registers a system built by a fallible factory, in the default group.
    pub fn try_new<S: System>(factory: impl FnOnce(&mut World) -> EcsResult<S> + 'static) -> Self {
        Self {
            key: SystemKey::of::<S>(),
            group_name: DefaultSystemGroup::name(),
            group: World::get_or_create_group::<DefaultSystemGroup>,
            ordering: SystemOrdering::new(),
            factory: Box::new(move |world| Ok(Box::new(factory(world)?) as Box<dyn System>)),
        }
    }

    /// Registers a default-constructed system.
    #[must_use]
    pub fn of<S: System + Default>() -> Self {
        Self::new(|_| S::default())
    }

    /// Places the system in group `G`.
    #[must_use]
    pub fn in_group<G: SystemGroupLabel>(mut self) -> Self {
        self.group_name = G::name();
        self.group = World::get_or_create_group::<G>;
        self
    }

    /// Runs the system before `S` when both share a group.
    #[must_use]
    pub fn before<S: System>(mut self) -> Self {
        self.ordering = self.ordering.before::<S>();
        self
    }

    /// Runs the system after `S` when both share a group.
    #[must_use]
    pub fn after<S: System>(mut self) -> Self {
        self.ordering = self.ordering.after::<S>();
        self
    }

    /// Name of the target group.
    #[must_use]
    pub const fn group_name(&self) -> &'static str {
        self.group_name
    }

    fn install(self, world: &mut World) -> EcsResult<()> {
        let system = (self.factory)(world)?;
        tracing::debug!(system = self.key.name(), group = self.group_name, "registered system");
        (self.group)(world).add_boxed(self.key, system, self.ordering);
        Ok(())
    }
}

impl fmt::Debug for SystemRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemRegistration")
            .field("system", &self.key)
            .field("group", &self.group_name)
            .field("ordering", &self.ordering)
            .finish_non_exhaustive()
    }
}

/// Builds a world together with its systems.
#[derive(Debug, Default)]
pub struct WorldBuilder {
    config: WorldConfig,
    registrations: Vec<SystemRegistration>,
}

impl WorldBuilder {
    /// Starts with the default configuration and no systems.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the world configuration.
    #[must_use]
    pub fn with_config(mut self, config: WorldConfig) -> Self {
        self.config = config;
        self
    }

    /// Adds a system registration.
    #[must_use]
    pub fn register(mut self, registration: SystemRegistration) -> Self {
        self.registrations.push(registration);
        self
    }

    /// Number of registrations collected so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Checks if no system was registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Creates the world, instantiates every system in registration order
    /// and sorts every group.
    ///
    /// # Errors
    ///
    /// Fails if a factory fails or a group has an ordering cycle.
    pub fn build(self) -> EcsResult<World> {
        let mut world = World::with_config(self.config);
        for registration in self.registrations {
            registration.install(&mut world)?;
        }
        world.sort_system_groups()?;
        Ok(world)
    }
}
