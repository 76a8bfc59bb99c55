//! # Particle Demo
//!
//! A small particle field used by the headless binary and the integration
//! tests.
//!
//! - `Spawner` (frame simulation) emits particles at a steady rate; every
//!   fifth particle starts with its velocity disabled and never moves.
//! - `Movement` (fixed simulation) integrates positions of particles with an
//!   enabled velocity.
//! - `Aging` (fixed simulation, after movement) counts lifetimes down and
//!   destroys expired particles through its command buffer.
//! - `Census` (late frame render) publishes population counts as a singleton.

use bytemuck::{Pod, Zeroable};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tessera_core::{
    CommandBuffer, Component, DynamicEntitySet, EcsResult, Entity, FixedSimulationSystemGroup,
    FrameSimulationSystemGroup, LateFrameRenderSystemGroup, PodComponent, SetIteration,
    SetIterationSystem, System, SystemRegistration, World, WorldBuilder,
};

/// Particle position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Position {
    /// X coordinate.
    pub x: f32,
    /// Y coordinate.
    pub y: f32,
}

impl Component for Position {}
impl PodComponent for Position {}

/// Particle velocity in units per second.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Velocity {
    /// X component.
    pub x: f32,
    /// Y component.
    pub y: f32,
}

impl Component for Velocity {}
impl PodComponent for Velocity {}

/// Seconds a particle has left.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Lifetime(pub f32);

impl Component for Lifetime {}

/// Spawner settings, read every frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpawnRate {
    /// Particles per second.
    pub per_second: f32,
    /// Lifetime given to new particles.
    pub lifetime: f32,
    /// Speed given to new particles.
    pub speed: f32,
    /// Stop spawning once this many particles are alive.
    pub max_alive: usize,
}

impl Default for SpawnRate {
    fn default() -> Self {
        Self {
            per_second: 600.0,
            lifetime: 2.0,
            speed: 4.0,
            max_alive: 10_000,
        }
    }
}

impl Component for SpawnRate {}

/// Population counts published at the end of every frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CensusReport {
    /// Particles alive.
    pub alive: usize,
    /// Particles with an enabled velocity.
    pub moving: usize,
    /// Particles spawned since load.
    pub spawned: u64,
    /// Particles expired since load.
    pub expired: u64,
}

impl Component for CensusReport {}

/// Emits particles at [`SpawnRate::per_second`].
pub struct Spawner {
    rng: StdRng,
    seed: u64,
    pending: f32,
    spawned: u64,
    alive: DynamicEntitySet,
}

impl Spawner {
    /// Creates a spawner counting live particles through `alive`.
    #[must_use]
    pub fn new(seed: u64, alive: DynamicEntitySet) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed,
            pending: 0.0,
            spawned: 0,
            alive,
        }
    }

    fn spawn(&mut self, world: &mut World, rate: &SpawnRate) -> EcsResult<Entity> {
        let angle = self.rng.gen_range(0.0..std::f32::consts::TAU);
        let particle = world.create_entity(true)?;
        world.set(particle, Position::default(), true)?;
        let moving = self.spawned % 5 != 4;
        world.set(
            particle,
            Velocity {
                x: angle.cos() * rate.speed,
                y: angle.sin() * rate.speed,
            },
            moving,
        )?;
        world.set(particle, Lifetime(rate.lifetime), true)?;
        self.spawned += 1;
        Ok(particle)
    }
}

impl System for Spawner {
    fn setup(&mut self, world: &mut World) -> EcsResult<()> {
        if !world.has_singleton::<SpawnRate>() {
            world.set_singleton(SpawnRate::default());
        }
        world.set_singleton(CensusReport::default());
        Ok(())
    }

    fn run(&mut self, world: &mut World, delta: f32) -> EcsResult<()> {
        let rate = *world.get_singleton::<SpawnRate>()?;
        self.pending += rate.per_second * delta;
        let mut alive = world.set_entities(self.alive).len();
        while self.pending >= 1.0 {
            self.pending -= 1.0;
            if alive >= rate.max_alive {
                continue;
            }
            self.spawn(world, &rate)?;
            alive += 1;
        }
        world.get_singleton_mut::<CensusReport>()?.spawned = self.spawned;
        Ok(())
    }

    fn reset(&mut self, _: &mut World) -> EcsResult<()> {
        self.rng = StdRng::seed_from_u64(self.seed);
        self.pending = 0.0;
        self.spawned = 0;
        Ok(())
    }
}

/// Integrates positions of moving particles.
#[derive(Debug, Default)]
pub struct Movement;

impl SetIteration for Movement {
    fn iterate_entity(
        &mut self,
        world: &mut World,
        _: &mut CommandBuffer,
        entity: Entity,
        delta: f32,
    ) -> EcsResult<()> {
        let velocity = *world.get::<Velocity>(entity)?;
        world.with_mut(entity, |position: &mut Position| {
            position.x += velocity.x * delta;
            position.y += velocity.y * delta;
        })
    }
}

/// Counts lifetimes down and destroys expired particles.
#[derive(Debug, Default)]
pub struct Aging {
    expired: u64,
}

impl SetIteration for Aging {
    fn iterate_entity(
        &mut self,
        world: &mut World,
        commands: &mut CommandBuffer,
        entity: Entity,
        delta: f32,
    ) -> EcsResult<()> {
        let lifetime = world.get_mut::<Lifetime>(entity)?;
        lifetime.0 -= delta;
        if lifetime.0 <= 0.0 {
            commands.destroy(entity);
            self.expired += 1;
        }
        Ok(())
    }

    fn post_iterate(&mut self, world: &mut World, _: f32) -> EcsResult<()> {
        world.get_singleton_mut::<CensusReport>()?.expired = self.expired;
        Ok(())
    }

    fn reset(&mut self, _: &mut World) -> EcsResult<()> {
        self.expired = 0;
        Ok(())
    }
}

/// Publishes [`CensusReport`] counts.
pub struct Census {
    alive: DynamicEntitySet,
    moving: DynamicEntitySet,
}

impl System for Census {
    fn run(&mut self, world: &mut World, _: f32) -> EcsResult<()> {
        let alive = world.set_entities(self.alive).len();
        let moving = world.set_entities(self.moving).len();
        let report = world.get_singleton_mut::<CensusReport>()?;
        report.alive = alive;
        report.moving = moving;
        tracing::trace!(alive, moving, "census");
        Ok(())
    }
}

fn particles(world: &mut World) -> DynamicEntitySet {
    world.query().with::<Position>().with::<Lifetime>().as_set()
}

fn moving_particles(world: &mut World) -> DynamicEntitySet {
    world.query().with::<Position>().enabled::<Velocity>().as_set()
}

/// Registrations of the particle systems.
#[must_use]
pub fn registrations(seed: u64) -> Vec<SystemRegistration> {
    vec![
        SystemRegistration::new(move |world: &mut World| Spawner::new(seed, particles(world)))
            .in_group::<FrameSimulationSystemGroup>(),
        SystemRegistration::new(|world: &mut World| {
            SetIterationSystem::new(world.query().with::<Lifetime>().as_set(), Aging::default())
        })
        .in_group::<FixedSimulationSystemGroup>()
        .after::<SetIterationSystem<Movement>>(),
        SystemRegistration::new(|world: &mut World| SetIterationSystem::new(moving_particles(world), Movement))
            .in_group::<FixedSimulationSystemGroup>(),
        SystemRegistration::new(|world: &mut World| Census {
            alive: particles(world),
            moving: moving_particles(world),
        })
        .in_group::<LateFrameRenderSystemGroup>(),
    ]
}

/// A world builder with every particle system registered.
#[must_use]
pub fn builder(seed: u64) -> WorldBuilder {
    registrations(seed)
        .into_iter()
        .fold(WorldBuilder::new(), WorldBuilder::register)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aging_runs_after_movement() {
        let world = builder(7).build().unwrap();
        let names = world
            .group::<FixedSimulationSystemGroup>()
            .unwrap()
            .system_names();
        assert_eq!(names, vec!["Movement", "Aging"]);
    }

    #[test]
    fn test_every_fifth_particle_is_still() {
        let mut world = builder(7).build().unwrap();
        world.setup_system_groups().unwrap();
        world.set_singleton(SpawnRate {
            per_second: 10.0,
            ..SpawnRate::default()
        });
        world.run_group::<FrameSimulationSystemGroup>(1.0).unwrap();
        world.run_group::<LateFrameRenderSystemGroup>(1.0).unwrap();

        let report = *world.get_singleton::<CensusReport>().unwrap();
        assert_eq!(report.alive, 10);
        assert_eq!(report.moving, 8);
        assert_eq!(report.spawned, 10);
    }

    #[test]
    fn test_spawner_respects_cap() {
        let mut world = builder(1).build().unwrap();
        world.setup_system_groups().unwrap();
        world.set_singleton(SpawnRate {
            per_second: 100.0,
            max_alive: 12,
            ..SpawnRate::default()
        });
        world.run_group::<FrameSimulationSystemGroup>(1.0).unwrap();
        assert_eq!(world.entity_count(), 12);
    }

    #[test]
    fn test_position_serializes_as_pod() {
        let mut world = World::new();
        let e = world.create_entity(true).unwrap();
        world.set(e, Position { x: 1.0, y: 2.0 }, true).unwrap();
        let bytes = world.serialize_component::<Position>(e).unwrap();
        assert_eq!(bytes.len(), 8);
    }
}
