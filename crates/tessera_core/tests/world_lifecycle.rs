//! Integration tests for the world lifecycle: handles, live sets, groups,
//! command buffers and teardown.
//!
//! Run with: cargo test --package tessera_core --test world_lifecycle

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use tessera_core::{
    CommandBuffer, Component, DynamicEntitySet, EcsError, EcsResult, Entity,
    FixedSimulationSystemGroup, FrameSimulationSystemGroup, GroupState, SetIteration,
    SetIterationSystem, System, SystemOrdering, World,
};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}
impl Component for Position {}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Velocity {
    x: f32,
    y: f32,
}
impl Component for Velocity {}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Sleeping;
impl Component for Sleeping {}

struct Resource {
    disposed: Rc<Cell<u32>>,
}
impl Component for Resource {
    const DISPOSABLE: bool = true;

    fn dispose(&mut self) {
        self.disposed.set(self.disposed.get() + 1);
    }
}

/// Tiny deterministic generator so the sequences are reproducible.
struct Lcg(u64);

impl Lcg {
    fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
        self.0 >> 33
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next_u64() % n as u64) as usize
    }
}

fn moving_matches(world: &World, e: Entity) -> bool {
    world.is_entity_enabled(e).unwrap()
        && world.is_enabled::<Position>(e).unwrap()
        && world.has::<Velocity>(e).unwrap()
        && !world.has::<Sleeping>(e).unwrap()
}

fn assert_set_consistent(world: &World, set: DynamicEntitySet) {
    let actual: HashSet<Entity> = world.set_entities(set).iter().collect();
    let expected: HashSet<Entity> = world.iter_entities().filter(|&e| moving_matches(world, e)).collect();
    assert_eq!(actual, expected);
    assert_eq!(world.set_entities(set).len(), expected.len());
}

// ============================================================================
// HANDLES
// ============================================================================

#[test]
fn stale_handles_never_come_back() {
    let mut world = World::new();
    let mut rng = Lcg(7);
    let mut alive: Vec<Entity> = Vec::new();
    let mut dead: Vec<Entity> = Vec::new();

    for _ in 0..2_000 {
        if alive.is_empty() || rng.below(3) != 0 {
            alive.push(world.create_entity(true).unwrap());
        } else {
            let e = alive.swap_remove(rng.below(alive.len()));
            world.destroy(e);
            dead.push(e);
        }
    }

    assert_eq!(world.entity_count(), alive.len());
    assert!(alive.iter().all(|&e| world.is_alive(e)));
    assert!(dead.iter().all(|&e| !world.is_alive(e)));
    for &e in &dead {
        assert_eq!(world.has::<Position>(e), Err(EcsError::EntityNotAlive { entity: e }));
    }
}

#[test]
fn fixed_id_creation_distinguishes_errors() {
    let mut world = World::new();
    let e = world.create_entity(true).unwrap();
    assert_eq!(
        world.create_entity_with_id_and_generation(e.id, e.generation, true),
        Err(EcsError::DuplicateCreation { entity: e })
    );
    assert_eq!(
        world.create_entity_with_id_and_generation(e.id, e.generation + 1, true),
        Err(EcsError::IdInUse { id: e.id, generation: e.generation + 1 })
    );

    let far = world.create_entity_with_id_and_generation(100, 2, true).unwrap();
    assert_eq!(far, Entity::new(100, 2));
    // Gap slots are reused before the table grows again
    let next = world.create_entity(true).unwrap();
    assert!(next.id < 100);
}

// ============================================================================
// COMPONENTS
// ============================================================================

#[test]
fn set_get_has_remove_roundtrip() {
    let mut world = World::new();
    let e = world.create_entity(true).unwrap();

    world.set(e, Position { x: 1.0, y: -1.0 }, true).unwrap();
    assert!(world.has::<Position>(e).unwrap());
    assert_eq!(*world.get::<Position>(e).unwrap(), Position { x: 1.0, y: -1.0 });

    world.remove::<Position>(e).unwrap();
    assert!(!world.has::<Position>(e).unwrap());
    assert!(matches!(
        world.get::<Position>(e),
        Err(EcsError::ComponentNotPresent { .. })
    ));
}

#[test]
fn disposal_runs_exactly_once() {
    let first = Rc::new(Cell::new(0));
    let second = Rc::new(Cell::new(0));
    let mut world = World::new();
    let e = world.create_entity(true).unwrap();

    world.set(e, Resource { disposed: Rc::clone(&first) }, true).unwrap();
    world.remove::<Resource>(e).unwrap();
    assert_eq!(first.get(), 1);

    world.set(e, Resource { disposed: Rc::clone(&second) }, true).unwrap();
    assert_eq!(first.get(), 1, "re-adding leaves the old instance alone");

    world.destroy(e);
    assert_eq!(first.get(), 1);
    assert_eq!(second.get(), 1);

    drop(world);
    assert_eq!(second.get(), 1, "teardown does not dispose twice");
}

// ============================================================================
// LIVE SETS
// ============================================================================

#[test]
fn live_set_matches_brute_force_after_every_mutation() {
    let mut world = World::new();
    let moving = world
        .query()
        .enabled::<Position>()
        .with::<Velocity>()
        .without::<Sleeping>()
        .as_set();
    let mut rng = Lcg(42);
    let mut alive: Vec<Entity> = Vec::new();

    for _ in 0..3_000 {
        let op = rng.below(10);
        if alive.is_empty() || op == 0 {
            alive.push(world.create_entity(rng.below(8) != 0).unwrap());
        } else {
            let index = rng.below(alive.len());
            let e = alive[index];
            match op {
                1 => {
                    world.destroy(e);
                    alive.swap_remove(index);
                }
                2 => world.set(e, Position::default(), rng.below(2) == 0).unwrap(),
                3 => world.set(e, Velocity::default(), true).unwrap(),
                4 => world.set(e, Sleeping, true).unwrap(),
                5 => {
                    world.try_remove::<Position>(e);
                }
                6 => {
                    world.try_remove::<Velocity>(e);
                }
                7 => {
                    world.try_remove::<Sleeping>(e);
                }
                8 => {
                    let enabled = rng.below(2) == 0;
                    if world.has::<Position>(e).unwrap() {
                        world.set_enabled::<Position>(e, enabled).unwrap();
                    }
                }
                _ => {
                    let enabled = !world.is_entity_enabled(e).unwrap();
                    world.set_entity_enabled(e, enabled).unwrap();
                }
            }
        }
        assert_set_consistent(&world, moving);
    }
}

#[test]
fn enabling_moves_between_sets_without_leaving_presence_set() {
    let mut world = World::new();
    let present = world.query().with::<Position>().as_set();
    let active = world.query().enabled::<Position>().as_set();

    let e = world.create_entity(true).unwrap();
    world.set(e, Position { x: 0.0, y: 0.0 }, true).unwrap();

    world.set_enabled::<Position>(e, false).unwrap();
    assert!(!world.set_entities(active).contains(e));
    assert!(world.set_entities(present).contains(e));

    world.set_enabled::<Position>(e, true).unwrap();
    assert!(world.set_entities(active).contains(e));
    assert!(world.set_entities(present).contains(e));
    assert_eq!(world.set_entities(present).iter().collect::<Vec<_>>(), vec![e]);
}

#[test]
fn untouched_members_keep_their_order() {
    let mut world = World::new();
    let set = world.query().with::<Position>().as_set();
    let entities: Vec<Entity> = (0..100)
        .map(|_| {
            let e = world.create_entity(true).unwrap();
            world.set(e, Position::default(), true).unwrap();
            e
        })
        .collect();

    for e in entities.iter().step_by(3) {
        world.remove::<Position>(*e).unwrap();
    }
    let expected: Vec<Entity> = entities
        .iter()
        .enumerate()
        .filter(|(i, _)| i % 3 != 0)
        .map(|(_, e)| *e)
        .collect();
    assert_eq!(world.set_entities(set).iter().collect::<Vec<_>>(), expected);
}

// ============================================================================
// SYSTEMS AND COMMAND BUFFERS
// ============================================================================

struct Reaper {
    visited: Rc<RefCell<Vec<Entity>>>,
}

impl SetIteration for Reaper {
    fn iterate_entity(
        &mut self,
        world: &mut World,
        commands: &mut CommandBuffer,
        entity: Entity,
        _delta: f32,
    ) -> EcsResult<()> {
        self.visited.borrow_mut().push(entity);
        assert!(world.is_alive(entity), "destroy is deferred until flush");
        commands.destroy(entity);
        Ok(())
    }
}

#[test]
fn deferred_destroy_does_not_disturb_iteration() {
    let visited = Rc::new(RefCell::new(Vec::new()));
    let mut world = World::new();
    let doomed = world.query().with::<Position>().as_set();
    let entities: Vec<Entity> = (0..10)
        .map(|_| {
            let e = world.create_entity(true).unwrap();
            world.set(e, Position::default(), true).unwrap();
            e
        })
        .collect();

    world
        .get_or_create_group::<FrameSimulationSystemGroup>()
        .add(SetIterationSystem::new(doomed, Reaper { visited: Rc::clone(&visited) }));
    world.run_group::<FrameSimulationSystemGroup>(0.016).unwrap();

    assert_eq!(*visited.borrow(), entities);
    assert_eq!(world.entity_count(), 0);
    assert!(world.set_entities(doomed).is_empty());
}

struct Step;

impl SetIteration for Step {
    fn iterate_entity(
        &mut self,
        world: &mut World,
        _commands: &mut CommandBuffer,
        entity: Entity,
        delta: f32,
    ) -> EcsResult<()> {
        let velocity = *world.get::<Velocity>(entity)?;
        world.with_mut::<Position, _>(entity, |p| {
            p.x += velocity.x * delta;
            p.y += velocity.y * delta;
        })
    }
}

#[test]
fn set_iteration_system_moves_entities() {
    let mut world = World::new();
    let movers = world.query().with::<Position>().with::<Velocity>().as_set();
    let e = world.create_entity(true).unwrap();
    world.set(e, Position::default(), true).unwrap();
    world.set(e, Velocity { x: 2.0, y: -1.0 }, true).unwrap();

    world
        .get_or_create_group::<FixedSimulationSystemGroup>()
        .add(SetIterationSystem::new(movers, Step));
    world.setup_system_groups().unwrap();
    for _ in 0..4 {
        world.run_group::<FixedSimulationSystemGroup>(0.5).unwrap();
    }
    assert_eq!(*world.get::<Position>(e).unwrap(), Position { x: 4.0, y: -2.0 });
}

/// Records each phase call into a shared log.
struct PhaseLog {
    name: &'static str,
    log: Rc<RefCell<Vec<String>>>,
    commands: CommandBuffer,
}

impl PhaseLog {
    fn new(name: &'static str, log: &Rc<RefCell<Vec<String>>>) -> Self {
        Self {
            name,
            log: Rc::clone(log),
            commands: CommandBuffer::new(),
        }
    }

    fn record(&self, phase: &str) {
        self.log.borrow_mut().push(format!("{}:{phase}", self.name));
    }
}

struct First(PhaseLog);
struct Second(PhaseLog);

macro_rules! phase_logging_system {
    ($ty:ident) => {
        impl System for $ty {
            fn setup(&mut self, _world: &mut World) -> EcsResult<()> {
                self.0.record("setup");
                Ok(())
            }

            fn pre_run(&mut self, _world: &mut World, _delta: f32) -> EcsResult<()> {
                self.0.record("pre_run");
                Ok(())
            }

            fn run(&mut self, world: &mut World, _delta: f32) -> EcsResult<()> {
                self.0.record("run");
                let e = world.create_entity(true)?;
                self.0.commands.set(e, Sleeping, true);
                Ok(())
            }

            fn post_run(&mut self, world: &mut World, _delta: f32) -> EcsResult<()> {
                let flushed = world.query().with::<Sleeping>().as_set();
                let count = world.set_entities(flushed).len();
                world.release_set(flushed);
                self.0.record(&format!("post_run({count})"));
                Ok(())
            }

            fn cleanup(&mut self, _world: &mut World) -> EcsResult<()> {
                self.0.record("cleanup");
                Ok(())
            }

            fn commands(&mut self) -> Option<&mut CommandBuffer> {
                Some(&mut self.0.commands)
            }
        }
    };
}

phase_logging_system!(First);
phase_logging_system!(Second);

#[test]
fn group_phases_run_in_order_with_flush_between_run_and_post_run() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut world = World::new();
    world
        .get_or_create_group::<FrameSimulationSystemGroup>()
        .add_with(Second(PhaseLog::new("second", &log)), SystemOrdering::new().after::<First>())
        .add(First(PhaseLog::new("first", &log)));

    world.setup_system_groups().unwrap();
    world.run_group::<FrameSimulationSystemGroup>(0.016).unwrap();
    world.destroy_world();

    assert_eq!(
        *log.borrow(),
        vec![
            "first:setup",
            "second:setup",
            "first:pre_run",
            "second:pre_run",
            "first:run",
            "second:run",
            "first:post_run(2)",
            "second:post_run(2)",
            "first:cleanup",
            "second:cleanup",
        ]
    );
}

#[test]
fn disabled_system_is_skipped() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut world = World::new();
    let group = world.get_or_create_group::<FrameSimulationSystemGroup>();
    group.add(First(PhaseLog::new("first", &log)));
    group.add(Second(PhaseLog::new("second", &log)));
    assert!(group.set_system_enabled::<First>(false));

    world.run_group::<FrameSimulationSystemGroup>(0.016).unwrap();
    assert_eq!(
        *log.borrow(),
        vec!["second:pre_run", "second:run", "second:post_run(1)"]
    );
}

struct A;
impl System for A {}
struct B;
impl System for B {}
struct C;
impl System for C {}

#[test]
fn after_chain_sorts_to_c_b_a() {
    let mut world = World::new();
    world
        .get_or_create_group::<FrameSimulationSystemGroup>()
        .add_with(A, SystemOrdering::new().after::<B>())
        .add_with(B, SystemOrdering::new().after::<C>())
        .add(C);
    world.setup_system_groups().unwrap();

    let group = world.group::<FrameSimulationSystemGroup>().unwrap();
    assert_eq!(group.system_names(), vec!["C", "B", "A"]);
    assert_eq!(group.state(), GroupState::Sorted);
}

#[test]
fn cycle_fails_the_run() {
    let mut world = World::new();
    world
        .get_or_create_group::<FrameSimulationSystemGroup>()
        .add_with(A, SystemOrdering::new().before::<B>())
        .add_with(B, SystemOrdering::new().before::<A>());
    let err = world.run_group::<FrameSimulationSystemGroup>(0.016).unwrap_err();
    assert!(matches!(err, EcsError::OrderingConflict { .. }));
}

struct Spawner {
    spawned: bool,
}

impl System for Spawner {
    fn run(&mut self, world: &mut World, _delta: f32) -> EcsResult<()> {
        if !self.spawned {
            self.spawned = true;
            world.get_or_create_group::<FrameSimulationSystemGroup>().add(C);
        }
        Ok(())
    }
}

#[test]
fn systems_added_while_running_join_after_the_run() {
    let mut world = World::new();
    world
        .get_or_create_group::<FrameSimulationSystemGroup>()
        .add(Spawner { spawned: false });
    world.run_group::<FrameSimulationSystemGroup>(0.016).unwrap();

    let group = world.group::<FrameSimulationSystemGroup>().unwrap();
    assert_eq!(group.system_names(), vec!["Spawner", "C"]);
    assert_eq!(group.state(), GroupState::Unsorted);
}

#[test]
fn missing_group_run_is_a_no_op() {
    let mut world = World::new();
    world.run_group::<FixedSimulationSystemGroup>(0.016).unwrap();
    assert!(world.group::<FixedSimulationSystemGroup>().is_none());
}

// ============================================================================
// TEARDOWN
// ============================================================================

#[test]
fn teardown_order_and_reentrancy() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut world = World::new();
    world
        .get_or_create_group::<FrameSimulationSystemGroup>()
        .add(First(PhaseLog::new("first", &log)));
    let e = world.create_entity(true).unwrap();

    let events = Rc::clone(&log);
    world.on_entity_destroyed(move |world, entity| {
        events.borrow_mut().push(format!("destroyed:{}", entity.id));
        world.destroy_world();
        assert!(world.create_entity(true).is_err());
    });
    let events = Rc::clone(&log);
    world.on_world_destroyed(move |world| {
        events.borrow_mut().push(format!("world_destroyed:{}", world.entity_count()));
    });

    world.destroy_world();
    world.destroy_world();
    assert!(!world.is_alive(e));
    assert_eq!(
        *log.borrow(),
        vec![
            "first:cleanup".to_string(),
            format!("destroyed:{}", e.id),
            "world_destroyed:0".to_string(),
        ]
    );
    assert_eq!(
        world.group::<FrameSimulationSystemGroup>().map(|g| g.state()),
        Some(GroupState::TornDown)
    );
}

struct Collapse(PhaseLog);

impl System for Collapse {
    fn run(&mut self, world: &mut World, _delta: f32) -> EcsResult<()> {
        world.destroy_world();
        self.0.record("run");
        Ok(())
    }

    fn cleanup(&mut self, _world: &mut World) -> EcsResult<()> {
        self.0.record("cleanup");
        Ok(())
    }
}

#[test]
fn destroy_world_from_running_system_cleans_up_its_group() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut world = World::new();
    world
        .get_or_create_group::<FrameSimulationSystemGroup>()
        .add(Collapse(PhaseLog::new("collapse", &log)));

    world.run_group::<FrameSimulationSystemGroup>(0.016).unwrap();
    assert!(world.is_destroyed());
    assert_eq!(*log.borrow(), vec!["collapse:run", "collapse:cleanup"]);
    assert_eq!(
        world.group::<FrameSimulationSystemGroup>().map(|g| g.state()),
        Some(GroupState::TornDown)
    );

    drop(world);
    assert_eq!(log.borrow().len(), 2, "cleanup runs exactly once");
}

#[test]
fn destroy_world_from_destroyed_handler_delivers_entity_events_first() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut world = World::new();
    let a = world.create_entity(true).unwrap();
    let b = world.create_entity(true).unwrap();

    let events = Rc::clone(&log);
    let subscription = world.on_entity_destroyed(move |world, entity| {
        events.borrow_mut().push(format!("entity:{}", entity.id));
        world.destroy_world();
    });
    let events = Rc::clone(&log);
    world.on_world_destroyed(move |_| events.borrow_mut().push("world".to_string()));

    world.destroy(a);
    assert_eq!(
        *log.borrow(),
        vec![format!("entity:{}", a.id), format!("entity:{}", b.id), "world".to_string()]
    );
    assert!(world.is_destroyed());
    assert!(
        !world.unsubscribe_entity_destroyed(subscription),
        "handlers are not restored on a destroyed world"
    );

    drop(world);
    assert_eq!(log.borrow().len(), 3);
}

#[test]
fn set_iteration_cleanup_releases_its_live_set() {
    let mut world = World::new();
    let set = world.query().with::<Position>().enabled::<Velocity>().as_set();
    world
        .get_or_create_group::<FixedSimulationSystemGroup>()
        .add(SetIterationSystem::new(set, Step));
    let e = world.create_entity(true).unwrap();
    world.set(e, Position::default(), true).unwrap();
    world.set(e, Velocity { x: 1.0, y: 0.0 }, true).unwrap();
    assert!(world.set_entities(set).contains(e));

    world.setup_system_groups().unwrap();
    world.cleanup_system_groups().unwrap();
    assert!(world.set_entities(set).is_empty(), "released sets read as empty");

    world.run_group::<FixedSimulationSystemGroup>(1.0).unwrap();
    assert_eq!(*world.get::<Position>(e).unwrap(), Position::default());
}
