//! # System Groups
//!
//! An ordered sequence of systems sharing a phase contract: set up once,
//! run every tick, cleaned up on teardown.
//!
//! ## Ordering
//!
//! Systems declare "run before X" / "run after Y" constraints. [`SystemGroup::sort`]
//! performs a topological sort (Kahn's algorithm) over the constraint graph,
//! restricted to systems actually present in the group. Ties are broken by the
//! current position, so unconstrained systems keep their declaration order and
//! the result is deterministic. Cycles are reported as
//! [`EcsError::OrderingConflict`].
//!
//! ## Lifecycle
//!
//! ```text
//! Unsorted --sort--> Sorted --run--> Running --cleanup--> TornDown
//!     ^                                 |
//!     +------ add / remove system ------+
//! ```

use std::any::type_name;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::component::short_type_name;
use super::system::{System, SystemKey, SystemOrdering};
use super::world::World;
use crate::error::{EcsError, EcsResult};

/// Marker type naming a system group.
pub trait SystemGroupLabel: 'static {
    /// Name used in logs and errors.
    fn name() -> &'static str {
        short_type_name(type_name::<Self>())
    }
}

/// Group for systems registered without an explicit group.
pub struct DefaultSystemGroup;
impl SystemGroupLabel for DefaultSystemGroup {}

/// Per-frame simulation logic.
pub struct FrameSimulationSystemGroup;
impl SystemGroupLabel for FrameSimulationSystemGroup {}

/// Per-frame presentation logic, after frame simulation.
pub struct FrameRenderSystemGroup;
impl SystemGroupLabel for FrameRenderSystemGroup {}

/// Fixed-timestep simulation logic.
pub struct FixedSimulationSystemGroup;
impl SystemGroupLabel for FixedSimulationSystemGroup {}

/// Fixed-timestep presentation logic.
pub struct FixedRenderSystemGroup;
impl SystemGroupLabel for FixedRenderSystemGroup {}

/// Simulation logic at the end of the frame.
pub struct LateFrameSimulationSystemGroup;
impl SystemGroupLabel for LateFrameSimulationSystemGroup {}

/// Presentation logic at the end of the frame.
pub struct LateFrameRenderSystemGroup;
impl SystemGroupLabel for LateFrameRenderSystemGroup {}

/// Lifecycle state of a group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupState {
    /// Membership changed since the last sort.
    Unsorted,
    /// Sorted, not run yet.
    Sorted,
    /// Has run at least once.
    Running,
    /// Cleaned up.
    TornDown,
}

struct SystemEntry {
    key: SystemKey,
    system: Box<dyn System>,
    ordering: SystemOrdering,
    enabled: bool,
}

/// Ordered collection of systems.
pub struct SystemGroup {
    name: &'static str,
    entries: Vec<SystemEntry>,
    state: GroupState,
}

impl SystemGroup {
    /// Creates an empty group.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Vec::new(),
            state: GroupState::Unsorted,
        }
    }

    /// Group name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> GroupState {
        self.state
    }

    /// Number of systems.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks if the group has no systems.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// System names in execution order.
    #[must_use]
    pub fn system_names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.system.name()).collect()
    }

    /// Appends a system without ordering constraints.
    pub fn add<S: System>(&mut self, system: S) -> &mut Self {
        self.add_with(system, SystemOrdering::new())
    }

    /// Appends a system with ordering constraints.
    pub fn add_with<S: System>(&mut self, system: S, ordering: SystemOrdering) -> &mut Self {
        self.add_boxed(SystemKey::of::<S>(), Box::new(system), ordering)
    }

    /// Appends an already boxed system under `key`.
    pub fn add_boxed(&mut self, key: SystemKey, system: Box<dyn System>, ordering: SystemOrdering) -> &mut Self {
        self.entries.push(SystemEntry {
            key,
            system,
            ordering,
            enabled: true,
        });
        self.state = GroupState::Unsorted;
        self
    }

    /// Removes the system of type `S`. Returns `true` if it was present.
    pub fn remove<S: System>(&mut self) -> bool {
        let key = SystemKey::of::<S>();
        match self.entries.iter().position(|e| e.key == key) {
            Some(pos) => {
                self.entries.remove(pos);
                self.state = GroupState::Unsorted;
                true
            }
            None => false,
        }
    }

    /// Checks whether a system of type `S` is present.
    #[must_use]
    pub fn has<S: System>(&self) -> bool {
        let key = SystemKey::of::<S>();
        self.entries.iter().any(|e| e.key == key)
    }

    /// Enables or disables the system of type `S`. Disabled systems skip the run phase.
    ///
    /// Returns `false` if no such system is present.
    pub fn set_system_enabled<S: System>(&mut self, enabled: bool) -> bool {
        let key = SystemKey::of::<S>();
        match self.entries.iter_mut().find(|e| e.key == key) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Whether the system of type `S` is enabled, if present.
    #[must_use]
    pub fn is_system_enabled<S: System>(&self) -> Option<bool> {
        let key = SystemKey::of::<S>();
        self.entries.iter().find(|e| e.key == key).map(|e| e.enabled)
    }

    /// Orders the systems by their before/after constraints.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::OrderingConflict`] if the constraints form a cycle.
    /// The current order is left untouched in that case.
    pub fn sort(&mut self) -> EcsResult<()> {
        let count = self.entries.len();
        let position = |key: &SystemKey| self.entries.iter().position(|e| e.key == *key);

        // Edge a -> b means a runs before b.
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); count];
        let mut in_degree = vec![0usize; count];
        let mut add_edge = |from: usize, to: usize| {
            if from != to && !successors[from].contains(&to) {
                successors[from].push(to);
                in_degree[to] += 1;
            }
        };

        for (index, entry) in self.entries.iter().enumerate() {
            for target in entry.ordering.before.iter().filter_map(position) {
                add_edge(index, target);
            }
            for target in entry.ordering.after.iter().filter_map(position) {
                add_edge(target, index);
            }
        }

        // Kahn's algorithm, lowest current index first.
        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &degree)| degree == 0)
            .map(|(index, _)| Reverse(index))
            .collect();
        let mut order = Vec::with_capacity(count);

        while let Some(Reverse(index)) = ready.pop() {
            order.push(index);
            for &next in &successors[index] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        if order.len() < count {
            let systems: Vec<&'static str> = in_degree
                .iter()
                .enumerate()
                .filter(|(_, &degree)| degree > 0)
                .map(|(index, _)| self.entries[index].system.name())
                .collect();
            tracing::warn!(group = self.name, ?systems, "system ordering cycle");
            return Err(EcsError::OrderingConflict {
                group: self.name,
                systems,
            });
        }

        let mut slots: Vec<Option<SystemEntry>> = self.entries.drain(..).map(Some).collect();
        self.entries
            .extend(order.into_iter().filter_map(|index| slots[index].take()));
        self.state = GroupState::Sorted;
        tracing::debug!(group = self.name, order = ?self.system_names(), "sorted system group");
        Ok(())
    }

    fn ensure_sorted(&mut self) -> EcsResult<()> {
        if self.state == GroupState::Unsorted {
            self.sort()?;
        }
        Ok(())
    }

    /// Runs `pre_setup` then `setup` across all systems.
    ///
    /// # Errors
    ///
    /// Fails on an ordering conflict or the first system error.
    pub fn setup(&mut self, world: &mut World) -> EcsResult<()> {
        self.ensure_sorted()?;
        for entry in &mut self.entries {
            entry.system.pre_setup(world)?;
        }
        for entry in &mut self.entries {
            entry.system.setup(world)?;
        }
        Ok(())
    }

    /// Runs one tick: `pre_run`, `run`, command flush, `post_run`.
    ///
    /// Disabled systems skip all three run phases; their pending commands
    /// are still flushed.
    ///
    /// # Errors
    ///
    /// Fails on an ordering conflict or the first system or command error.
    pub fn run(&mut self, world: &mut World, delta: f32) -> EcsResult<()> {
        self.ensure_sorted()?;
        self.state = GroupState::Running;

        for entry in self.entries.iter_mut().filter(|e| e.enabled) {
            entry.system.pre_run(world, delta)?;
        }
        for entry in self.entries.iter_mut().filter(|e| e.enabled) {
            entry.system.run(world, delta)?;
        }
        for entry in &mut self.entries {
            if let Some(commands) = entry.system.commands() {
                commands.flush(world)?;
            }
        }
        for entry in self.entries.iter_mut().filter(|e| e.enabled) {
            entry.system.post_run(world, delta)?;
        }
        Ok(())
    }

    /// Runs `pre_cleanup` then `cleanup` across all systems.
    ///
    /// # Errors
    ///
    /// Fails on the first system error.
    pub fn cleanup(&mut self, world: &mut World) -> EcsResult<()> {
        for entry in &mut self.entries {
            entry.system.pre_cleanup(world)?;
        }
        for entry in &mut self.entries {
            entry.system.cleanup(world)?;
        }
        self.state = GroupState::TornDown;
        Ok(())
    }

    /// Runs `reset` across all systems.
    ///
    /// # Errors
    ///
    /// Fails on the first system error.
    pub fn reset(&mut self, world: &mut World) -> EcsResult<()> {
        for entry in &mut self.entries {
            entry.system.reset(world)?;
        }
        Ok(())
    }

    /// Moves every system of `other` to the end of this group.
    pub(crate) fn absorb(&mut self, other: Self) {
        if other.entries.is_empty() {
            return;
        }
        self.entries.extend(other.entries);
        self.state = GroupState::Unsorted;
    }
}

impl std::fmt::Debug for SystemGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemGroup")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("systems", &self.system_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct A;
    impl System for A {}
    struct B;
    impl System for B {}
    struct C;
    impl System for C {}
    struct D;
    impl System for D {}

    #[test]
    fn test_after_chain_resolves() {
        let mut group = SystemGroup::new("test");
        group.add_with(A, SystemOrdering::new().after::<B>());
        group.add_with(B, SystemOrdering::new().after::<C>());
        group.add(C);

        group.sort().unwrap();
        assert_eq!(group.system_names(), vec!["C", "B", "A"]);
        assert_eq!(group.state(), GroupState::Sorted);
    }

    #[test]
    fn test_before_and_stable_ties() {
        let mut group = SystemGroup::new("test");
        group.add(A);
        group.add(B);
        group.add_with(C, SystemOrdering::new().before::<A>());
        group.add(D);

        group.sort().unwrap();
        assert_eq!(group.system_names(), vec!["B", "C", "A", "D"]);
    }

    #[test]
    fn test_missing_targets_are_ignored() {
        let mut group = SystemGroup::new("test");
        group.add_with(A, SystemOrdering::new().after::<D>());
        group.add(B);

        group.sort().unwrap();
        assert_eq!(group.system_names(), vec!["A", "B"]);
    }

    #[test]
    fn test_cycle_is_ordering_conflict() {
        let mut group = SystemGroup::new("cyclic");
        group.add_with(A, SystemOrdering::new().after::<B>());
        group.add_with(B, SystemOrdering::new().after::<A>());
        group.add(C);

        let err = group.sort().unwrap_err();
        match err {
            EcsError::OrderingConflict { group: name, systems } => {
                assert_eq!(name, "cyclic");
                assert_eq!(systems, vec!["A", "B"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(group.system_names(), vec!["A", "B", "C"], "order untouched");
        assert_eq!(group.state(), GroupState::Unsorted);
    }

    #[test]
    fn test_membership_changes_mark_unsorted() {
        let mut group = SystemGroup::new("test");
        group.add(A);
        group.sort().unwrap();
        assert!(group.has::<A>());
        assert!(!group.has::<B>());

        group.add(B);
        assert_eq!(group.state(), GroupState::Unsorted);
        group.sort().unwrap();
        assert!(group.remove::<A>());
        assert!(!group.remove::<A>());
        assert_eq!(group.state(), GroupState::Unsorted);
        assert_eq!(group.len(), 1);
    }

    #[test]
    fn test_enable_flag() {
        let mut group = SystemGroup::new("test");
        group.add(A);
        assert_eq!(group.is_system_enabled::<A>(), Some(true));
        assert!(group.set_system_enabled::<A>(false));
        assert_eq!(group.is_system_enabled::<A>(), Some(false));
        assert!(!group.set_system_enabled::<B>(false));
        assert_eq!(group.is_system_enabled::<B>(), None);
    }
}
