//! # World
//!
//! The world owns everything: the entity registry, one stash per component
//! type, the registered live sets, the system groups and the event
//! subscribers.
//!
//! ## Change propagation
//!
//! ```text
//! set / remove / set_enabled::<T>(e)
//!        |
//!        v
//!   stash<T> + entity bits     (membership, enabled)
//!        |
//!        v
//!   queries_by_type[T]  ->  refresh(e) on each interested live set
//! ```
//!
//! Entity creation, destruction and entity-level enable changes re-test every
//! live set, since a set with an empty `with` mask can match an entity that
//! has no components at all.
//!
//! ## Teardown
//!
//! [`World::destroy_world`] cleans up every group, destroys every entity,
//! disposes every stash and then notifies `WorldDestroyed` subscribers. It
//! runs at most once; `Drop` calls it too.
//!
//! Called from inside a running group, that group is cleaned up as soon as
//! its run returns. Called from an `EntityDestroyed` subscriber, the pending
//! destruction events are delivered before `WorldDestroyed`.

use std::any::{type_name, TypeId};
use std::collections::{HashMap, VecDeque};
use std::fmt;

use super::component::{
    component_type_id, component_type_info, short_type_name, type_registry_epoch, Component,
    ComponentTypeId, ComponentTypeInfo,
};
use super::entity::{Entity, EntityAllocator, EntityInfo};
use super::events::{
    EntityDestroyedHandler, HandlerList, ResetHook, Subscription, WorldDestroyedHandler,
};
use super::group::{GroupState, SystemGroup, SystemGroupLabel};
use super::query::{DynamicEntitySet, LiveSet, QueryBuilder, QueryMask, QueryState};
use super::stash::{ErasedStash, Stash};
use crate::config::WorldConfig;
use crate::error::{EcsError, EcsResult};

static EMPTY_SET: LiveSet = LiveSet::empty();

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WorldState {
    Alive,
    Destroying,
    Destroyed,
}

struct GroupSlot {
    name: &'static str,
    /// `None` while the group is taken out to run.
    group: Option<SystemGroup>,
    /// Systems added while the group was running.
    pending: Option<SystemGroup>,
    /// Teardown reached the group while it was taken out.
    cleanup_pending: bool,
}

/// Container for entities, components, live sets and system groups.
pub struct World {
    config: WorldConfig,
    entities: EntityAllocator,
    /// Indexed by component type id.
    stashes: Vec<Option<Box<dyn ErasedStash>>>,
    queries: Vec<Option<QueryState>>,
    free_queries: Vec<u32>,
    /// Component type id -> indices of queries whose mask mentions it.
    queries_by_type: Vec<Vec<u32>>,
    groups: Vec<GroupSlot>,
    group_index: HashMap<TypeId, usize>,
    entity_destroyed: HandlerList<EntityDestroyedHandler>,
    world_destroyed: HandlerList<WorldDestroyedHandler>,
    reset_hooks: HandlerList<ResetHook>,
    /// Destroyed entities whose event has not been delivered yet.
    destroyed_queue: VecDeque<Entity>,
    state: WorldState,
    /// Teardown started inside an `EntityDestroyed` dispatch; the outermost
    /// delivery loop finishes it.
    teardown_deferred: bool,
    /// Reused snapshot buffer for `for_each_in`.
    scratch: Vec<Entity>,
    registry_epoch: u64,
}

impl World {
    /// Creates an empty world with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    /// Creates an empty world.
    #[must_use]
    pub fn with_config(config: WorldConfig) -> Self {
        Self {
            entities: EntityAllocator::with_capacity(config.initial_entity_capacity),
            config,
            stashes: Vec::new(),
            queries: Vec::new(),
            free_queries: Vec::new(),
            queries_by_type: Vec::new(),
            groups: Vec::new(),
            group_index: HashMap::new(),
            entity_destroyed: HandlerList::default(),
            world_destroyed: HandlerList::default(),
            reset_hooks: HandlerList::default(),
            destroyed_queue: VecDeque::new(),
            state: WorldState::Alive,
            teardown_deferred: false,
            scratch: Vec::new(),
            registry_epoch: type_registry_epoch(),
        }
    }

    /// The configuration this world was built with.
    #[must_use]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Checks whether [`World::destroy_world`] has started.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.state != WorldState::Alive
    }

    // ------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------

    /// Creates an entity with no components.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::WorldDestroyed`] once teardown has started.
    pub fn create_entity(&mut self, enabled: bool) -> EcsResult<Entity> {
        if self.state != WorldState::Alive {
            return Err(EcsError::WorldDestroyed);
        }
        let entity = self.entities.allocate(enabled);
        self.refresh_all_queries(entity);
        tracing::trace!(%entity, enabled, "created entity");
        Ok(entity)
    }

    /// Creates an entity at an exact id and generation, e.g. when restoring
    /// a snapshot or mirroring a remote world.
    ///
    /// # Errors
    ///
    /// - [`EcsError::DuplicateCreation`] if that exact entity is alive.
    /// - [`EcsError::IdInUse`] if the slot is alive under another generation,
    ///   or `id` is the reserved null id.
    /// - [`EcsError::WorldDestroyed`] once teardown has started.
    pub fn create_entity_with_id_and_generation(
        &mut self,
        id: u32,
        generation: u32,
        enabled: bool,
    ) -> EcsResult<Entity> {
        if self.state != WorldState::Alive {
            return Err(EcsError::WorldDestroyed);
        }
        if id == Entity::NULL.id {
            return Err(EcsError::IdInUse { id, generation });
        }
        match self.entities.allocate_at(id, generation, enabled) {
            Ok(entity) => {
                self.refresh_all_queries(entity);
                tracing::trace!(%entity, enabled, "created entity at fixed id");
                Ok(entity)
            }
            Err(current) if current.generation == generation => {
                Err(EcsError::DuplicateCreation { entity: current })
            }
            Err(_) => Err(EcsError::IdInUse { id, generation }),
        }
    }

    /// Destroys an entity. Dead or stale handles are ignored.
    ///
    /// Every component is removed through its disposal path, then the slot
    /// is recycled under a new generation, then `EntityDestroyed` subscribers
    /// are notified. Entities destroyed from inside a subscriber are queued
    /// and delivered before the outermost call returns.
    pub fn destroy(&mut self, entity: Entity) {
        let Some(info) = self.entities.info(entity) else {
            return;
        };
        let components: Vec<usize> = info.membership.ones().collect();
        for index in components {
            self.detach(entity, ComponentTypeId(index as u32));
        }

        self.entities.free(entity);
        for state in self.queries.iter_mut().flatten() {
            state.set.remove(entity.id);
        }
        tracing::trace!(%entity, "destroyed entity");

        if self.entity_destroyed.is_empty() && !self.entity_destroyed.is_dispatching() {
            return;
        }
        self.destroyed_queue.push_back(entity);
        if !self.entity_destroyed.is_dispatching() {
            self.deliver_destroyed_events();
        }
    }

    fn deliver_destroyed_events(&mut self) {
        let mut handlers = self.entity_destroyed.begin_dispatch();
        while let Some(entity) = self.destroyed_queue.pop_front() {
            for (subscription, handler) in &mut handlers {
                if !self.entity_destroyed.is_cancelled(*subscription) {
                    handler(self, entity);
                }
            }
        }
        self.entity_destroyed.end_dispatch(handlers);
        if std::mem::take(&mut self.teardown_deferred) {
            self.finish_teardown();
        }
    }

    /// Checks if an entity handle is alive.
    #[inline]
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// Number of alive entities.
    #[inline]
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.alive_count()
    }

    /// Iterates over alive entities in id order.
    pub fn iter_entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities.iter_alive()
    }

    /// Reads the entity-level enabled flag.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::EntityNotAlive`] for dead handles.
    pub fn is_entity_enabled(&self, entity: Entity) -> EcsResult<bool> {
        Ok(self.live_info(entity)?.enabled)
    }

    /// Sets the entity-level enabled flag. Disabled entities leave every live set.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::EntityNotAlive`] for dead handles.
    pub fn set_entity_enabled(&mut self, entity: Entity, enabled: bool) -> EcsResult<()> {
        let info = self
            .entities
            .info_mut(entity)
            .ok_or(EcsError::EntityNotAlive { entity })?;
        if info.enabled != enabled {
            info.enabled = enabled;
            self.refresh_all_queries(entity);
        }
        Ok(())
    }

    #[inline]
    fn live_info(&self, entity: Entity) -> EcsResult<&EntityInfo> {
        self.entities
            .info(entity)
            .ok_or(EcsError::EntityNotAlive { entity })
    }

    // ------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------

    /// Adds or overwrites a component.
    ///
    /// A newly added component starts enabled or disabled per
    /// `enable_if_added`. Overwriting keeps the current enabled state and
    /// does not touch any live set.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::EntityNotAlive`] for dead handles.
    pub fn set<T: Component>(&mut self, entity: Entity, value: T, enable_if_added: bool) -> EcsResult<()> {
        self.live_info(entity)?;
        let id = component_type_id::<T>();
        let added = self.stash_or_create::<T>().set(entity.id, value);
        if added {
            if let Some(info) = self.entities.info_mut(entity) {
                info.membership.insert(id.index());
                info.enabled_components.assign(id.index(), enable_if_added);
            }
            self.refresh_queries_for(entity, id);
        }
        Ok(())
    }

    /// Gets a component.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityNotAlive`] or [`EcsError::ComponentNotPresent`].
    pub fn get<T: Component>(&self, entity: Entity) -> EcsResult<&T> {
        self.live_info(entity)?;
        self.stash::<T>()
            .and_then(|stash| stash.get(entity.id))
            .ok_or_else(|| not_present::<T>(entity))
    }

    /// Gets a component mutably. Mutation in place never affects live sets.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityNotAlive`] or [`EcsError::ComponentNotPresent`].
    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> EcsResult<&mut T> {
        self.live_info(entity)?;
        self.stash_mut::<T>()
            .and_then(|stash| stash.get_mut(entity.id))
            .ok_or_else(|| not_present::<T>(entity))
    }

    /// Runs `f` on a component borrowed mutably for the duration of the call.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityNotAlive`] or [`EcsError::ComponentNotPresent`].
    pub fn with_mut<T: Component, R>(&mut self, entity: Entity, f: impl FnOnce(&mut T) -> R) -> EcsResult<R> {
        self.get_mut::<T>(entity).map(f)
    }

    /// Gets a component, or `None` if the entity is dead or lacks it.
    #[must_use]
    pub fn try_get<T: Component>(&self, entity: Entity) -> Option<&T> {
        if !self.entities.is_alive(entity) {
            return None;
        }
        self.stash::<T>()?.get(entity.id)
    }

    /// Gets a component mutably, or `None` if the entity is dead or lacks it.
    pub fn try_get_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        if !self.entities.is_alive(entity) {
            return None;
        }
        self.stash_mut::<T>()?.get_mut(entity.id)
    }

    /// Checks if the entity has a component, enabled or not.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::EntityNotAlive`] for dead handles.
    pub fn has<T: Component>(&self, entity: Entity) -> EcsResult<bool> {
        let info = self.live_info(entity)?;
        Ok(info.membership.contains(component_type_id::<T>().index()))
    }

    /// Removes a component through its disposal path.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityNotAlive`] or [`EcsError::ComponentNotPresent`].
    pub fn remove<T: Component>(&mut self, entity: Entity) -> EcsResult<()> {
        self.live_info(entity)?;
        if self.detach(entity, component_type_id::<T>()) {
            Ok(())
        } else {
            Err(not_present::<T>(entity))
        }
    }

    /// Removes a component if present. Returns `true` if one was removed.
    pub fn try_remove<T: Component>(&mut self, entity: Entity) -> bool {
        self.entities.is_alive(entity) && self.detach(entity, component_type_id::<T>())
    }

    /// Enables or disables a component the entity has.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityNotAlive`] or [`EcsError::ComponentNotPresent`].
    pub fn set_enabled<T: Component>(&mut self, entity: Entity, enabled: bool) -> EcsResult<()> {
        let id = component_type_id::<T>();
        let info = self
            .entities
            .info_mut(entity)
            .ok_or(EcsError::EntityNotAlive { entity })?;
        if !info.membership.contains(id.index()) {
            return Err(not_present::<T>(entity));
        }
        if info.enabled_components.assign(id.index(), enabled) {
            self.refresh_queries_for(entity, id);
        }
        Ok(())
    }

    /// Checks if a component is present and enabled. Absent components read as disabled.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::EntityNotAlive`] for dead handles.
    pub fn is_enabled<T: Component>(&self, entity: Entity) -> EcsResult<bool> {
        let info = self.live_info(entity)?;
        Ok(info.enabled_components.contains(component_type_id::<T>().index()))
    }

    /// Adds a default `T` in the disabled state, or disables the existing one.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::EntityNotAlive`] for dead handles.
    pub fn ensure_added_and_disabled<T: Component + Default>(&mut self, entity: Entity) -> EcsResult<()> {
        if self.has::<T>(entity)? {
            self.set_enabled::<T>(entity, false)
        } else {
            self.set(entity, T::default(), false)
        }
    }

    /// Registry records of every component the entity has, by type id.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::EntityNotAlive`] for dead handles.
    pub fn get_component_types(&self, entity: Entity) -> EcsResult<Vec<ComponentTypeInfo>> {
        let info = self.live_info(entity)?;
        Ok(info
            .membership
            .ones()
            .filter_map(|index| component_type_info(ComponentTypeId(index as u32)))
            .collect())
    }

    /// Removes component `id` from a live entity and notifies interested sets.
    fn detach(&mut self, entity: Entity, id: ComponentTypeId) -> bool {
        let removed = self
            .stashes
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .is_some_and(|stash| stash.remove_id(entity.id));
        if removed {
            if let Some(info) = self.entities.info_mut(entity) {
                info.membership.remove(id.index());
                info.enabled_components.remove(id.index());
            }
            self.refresh_queries_for(entity, id);
        }
        removed
    }

    // ------------------------------------------------------------------
    // Singletons
    // ------------------------------------------------------------------

    /// Stores the world-level value of `T`, disposing any previous one.
    pub fn set_singleton<T: Component>(&mut self, value: T) {
        self.stash_or_create::<T>().world_set(value);
    }

    /// Gets the world-level value of `T`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::SingletonNotPresent`] if it was never set.
    pub fn get_singleton<T: Component>(&self) -> EcsResult<&T> {
        self.stash::<T>()
            .and_then(Stash::world_get)
            .ok_or(EcsError::SingletonNotPresent {
                component: short_type_name(type_name::<T>()),
            })
    }

    /// Gets the world-level value of `T` mutably.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::SingletonNotPresent`] if it was never set.
    pub fn get_singleton_mut<T: Component>(&mut self) -> EcsResult<&mut T> {
        self.stash_mut::<T>()
            .and_then(Stash::world_get_mut)
            .ok_or(EcsError::SingletonNotPresent {
                component: short_type_name(type_name::<T>()),
            })
    }

    /// Checks if the world-level value of `T` is set.
    #[must_use]
    pub fn has_singleton<T: Component>(&self) -> bool {
        self.stash::<T>().is_some_and(Stash::world_has)
    }

    /// Disposes and drops the world-level value of `T`. Returns `true` if one existed.
    pub fn remove_singleton<T: Component>(&mut self) -> bool {
        self.stash_mut::<T>().is_some_and(Stash::world_remove)
    }

    // ------------------------------------------------------------------
    // Stashes
    // ------------------------------------------------------------------

    /// Read access to the stash of `T`, if any value of `T` was ever stored.
    ///
    /// # Panics
    ///
    /// Panics if the component type registry was reset after this world was
    /// created and the index of `T` now belongs to another type.
    #[must_use]
    pub fn stash<T: Component>(&self) -> Option<&Stash<T>> {
        let id = component_type_id::<T>();
        let erased = self.stashes.get(id.index())?.as_deref()?;
        match erased.as_any().downcast_ref::<Stash<T>>() {
            Some(stash) => Some(stash),
            None => self.stash_type_mismatch(type_name::<T>()),
        }
    }

    fn stash_mut<T: Component>(&mut self) -> Option<&mut Stash<T>> {
        let id = component_type_id::<T>();
        let epoch = self.registry_epoch;
        let erased = self.stashes.get_mut(id.index())?.as_deref_mut()?;
        match erased.as_any_mut().downcast_mut::<Stash<T>>() {
            Some(stash) => Some(stash),
            None => stash_type_mismatch(type_name::<T>(), epoch),
        }
    }

    fn stash_or_create<T: Component>(&mut self) -> &mut Stash<T> {
        let index = component_type_id::<T>().index();
        if index >= self.stashes.len() {
            self.stashes.resize_with(index + 1, || None);
        }
        let capacity = self.config.initial_stash_capacity;
        let epoch = self.registry_epoch;
        let erased = self.stashes[index]
            .get_or_insert_with(|| Box::new(Stash::<T>::new(capacity)) as Box<dyn ErasedStash>);
        match erased.as_any_mut().downcast_mut::<Stash<T>>() {
            Some(stash) => stash,
            None => stash_type_mismatch(type_name::<T>(), epoch),
        }
    }

    fn stash_type_mismatch(&self, component: &'static str) -> ! {
        stash_type_mismatch(component, self.registry_epoch)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Starts building a query.
    pub fn query(&mut self) -> QueryBuilder<'_> {
        QueryBuilder::new(self)
    }

    /// Registers a mask and seeds its live set from the current entities.
    pub(crate) fn register_set(&mut self, mask: QueryMask) -> DynamicEntitySet {
        let mut state = QueryState {
            mask,
            set: LiveSet::new(self.config.live_set_min_holes),
        };
        for entity in self.entities.iter_alive() {
            if let Some(info) = self.entities.info(entity) {
                state.refresh(entity, info);
            }
        }
        let types = state.mask.component_types();
        let seeded = state.set.len();

        let index = match self.free_queries.pop() {
            Some(index) => {
                self.queries[index as usize] = Some(state);
                index
            }
            None => {
                self.queries.push(Some(state));
                (self.queries.len() - 1) as u32
            }
        };
        for id in types {
            if id.index() >= self.queries_by_type.len() {
                self.queries_by_type.resize_with(id.index() + 1, Vec::new);
            }
            self.queries_by_type[id.index()].push(index);
        }
        tracing::debug!(set = index, seeded, "registered live set");
        DynamicEntitySet(index)
    }

    /// Current members of a live set. Released handles read as empty.
    #[must_use]
    pub fn set_entities(&self, set: DynamicEntitySet) -> &LiveSet {
        match self.queries.get(set.0 as usize) {
            Some(Some(state)) => &state.set,
            _ => &EMPTY_SET,
        }
    }

    /// Runs `f` on each member of a live set.
    ///
    /// Iterates a snapshot taken on entry, so `f` may change membership
    /// freely. Members destroyed before their turn are skipped.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first error from `f`.
    pub fn for_each_in<F>(&mut self, set: DynamicEntitySet, mut f: F) -> EcsResult<()>
    where
        F: FnMut(&mut World, Entity) -> EcsResult<()>,
    {
        let mut snapshot = std::mem::take(&mut self.scratch);
        snapshot.clear();
        if let Some(Some(state)) = self.queries.get(set.0 as usize) {
            snapshot.extend(state.set.iter());
        }

        let mut result = Ok(());
        for &entity in &snapshot {
            if !self.entities.is_alive(entity) {
                continue;
            }
            if let Err(error) = f(self, entity) {
                result = Err(error);
                break;
            }
        }

        snapshot.clear();
        self.scratch = snapshot;
        result
    }

    /// Unregisters a live set. Returns `false` if the handle was already released.
    ///
    /// The handle must not be used afterwards; its slot may be reassigned to
    /// the next registered set.
    pub fn release_set(&mut self, set: DynamicEntitySet) -> bool {
        let Some(state) = self.queries.get_mut(set.0 as usize).and_then(Option::take) else {
            return false;
        };
        for id in state.mask.component_types() {
            if let Some(interested) = self.queries_by_type.get_mut(id.index()) {
                interested.retain(|&index| index != set.0);
            }
        }
        self.free_queries.push(set.0);
        tracing::debug!(set = set.0, "released live set");
        true
    }

    fn refresh_queries_for(&mut self, entity: Entity, component: ComponentTypeId) {
        let Some(info) = self.entities.info(entity) else {
            return;
        };
        let Some(interested) = self.queries_by_type.get(component.index()) else {
            return;
        };
        for &index in interested {
            if let Some(Some(state)) = self.queries.get_mut(index as usize) {
                state.refresh(entity, info);
            }
        }
    }

    fn refresh_all_queries(&mut self, entity: Entity) {
        let Some(info) = self.entities.info(entity) else {
            return;
        };
        for state in self.queries.iter_mut().flatten() {
            state.refresh(entity, info);
        }
    }

    // ------------------------------------------------------------------
    // System groups
    // ------------------------------------------------------------------

    /// Gets the group labelled `G`, creating it empty on first use.
    ///
    /// Systems added while `G` is running are merged into it once the run
    /// returns.
    pub fn get_or_create_group<G: SystemGroupLabel>(&mut self) -> &mut SystemGroup {
        let index = match self.group_index.get(&TypeId::of::<G>()) {
            Some(&index) => index,
            None => {
                self.groups.push(GroupSlot {
                    name: G::name(),
                    group: Some(SystemGroup::new(G::name())),
                    pending: None,
                    cleanup_pending: false,
                });
                let index = self.groups.len() - 1;
                self.group_index.insert(TypeId::of::<G>(), index);
                tracing::debug!(group = G::name(), "created system group");
                index
            }
        };
        let slot = &mut self.groups[index];
        let name = slot.name;
        match &mut slot.group {
            Some(group) => group,
            None => slot.pending.get_or_insert_with(|| SystemGroup::new(name)),
        }
    }

    /// Gets the group labelled `G`, if it exists and is not running.
    #[must_use]
    pub fn group<G: SystemGroupLabel>(&self) -> Option<&SystemGroup> {
        let index = *self.group_index.get(&TypeId::of::<G>())?;
        self.groups[index].group.as_ref()
    }

    /// Names of all groups in creation order.
    #[must_use]
    pub fn group_names(&self) -> Vec<&'static str> {
        self.groups.iter().map(|slot| slot.name).collect()
    }

    /// Takes group `index` out of the world for the duration of `f`.
    ///
    /// A group that is already taken out (re-entrant call) is skipped.
    fn with_group_taken<F>(&mut self, index: usize, f: F) -> EcsResult<()>
    where
        F: FnOnce(&mut SystemGroup, &mut World) -> EcsResult<()>,
    {
        let Some(mut group) = self.groups[index].group.take() else {
            return Ok(());
        };
        let result = f(&mut group, self);
        if let Some(pending) = self.groups[index].pending.take() {
            group.absorb(pending);
        }
        if std::mem::take(&mut self.groups[index].cleanup_pending) {
            if let Err(error) = cleanup_once(&mut group, self) {
                tracing::warn!(group = group.name(), %error, "deferred group cleanup failed during teardown");
            }
        }
        self.groups[index].group = Some(group);
        result
    }

    /// Sorts every group by its ordering constraints.
    ///
    /// # Errors
    ///
    /// Returns the first [`EcsError::OrderingConflict`].
    pub fn sort_system_groups(&mut self) -> EcsResult<()> {
        for index in 0..self.groups.len() {
            self.with_group_taken(index, |group, _| group.sort())?;
        }
        Ok(())
    }

    /// Sets up every group in creation order.
    ///
    /// # Errors
    ///
    /// Stops at the first ordering conflict or system error.
    pub fn setup_system_groups(&mut self) -> EcsResult<()> {
        let mut index = 0;
        while index < self.groups.len() {
            self.with_group_taken(index, |group, world| group.setup(world))?;
            index += 1;
        }
        Ok(())
    }

    /// Runs one tick of the group labelled `G`. Missing groups are a no-op.
    ///
    /// # Errors
    ///
    /// Propagates the first ordering conflict, system or command error.
    pub fn run_group<G: SystemGroupLabel>(&mut self, delta: f32) -> EcsResult<()> {
        match self.group_index.get(&TypeId::of::<G>()) {
            Some(&index) => self.with_group_taken(index, |group, world| group.run(world, delta)),
            None => Ok(()),
        }
    }

    /// Cleans up every group not already torn down, in creation order.
    ///
    /// # Errors
    ///
    /// Stops at the first system error.
    pub fn cleanup_system_groups(&mut self) -> EcsResult<()> {
        for index in 0..self.groups.len() {
            self.with_group_taken(index, cleanup_once)?;
        }
        Ok(())
    }

    /// Resets every group in creation order.
    ///
    /// # Errors
    ///
    /// Stops at the first system error.
    pub fn reset_system_groups(&mut self) -> EcsResult<()> {
        for index in 0..self.groups.len() {
            self.with_group_taken(index, |group, world| group.reset(world))?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Events and lifecycle
    // ------------------------------------------------------------------

    /// Subscribes to entity destruction.
    pub fn on_entity_destroyed(&mut self, handler: impl FnMut(&mut World, Entity) + 'static) -> Subscription {
        self.entity_destroyed.subscribe(Box::new(handler))
    }

    /// Cancels an entity destruction subscription.
    pub fn unsubscribe_entity_destroyed(&mut self, subscription: Subscription) -> bool {
        self.entity_destroyed.unsubscribe(subscription)
    }

    /// Subscribes to world teardown.
    pub fn on_world_destroyed(&mut self, handler: impl FnMut(&mut World) + 'static) -> Subscription {
        self.world_destroyed.subscribe(Box::new(handler))
    }

    /// Cancels a world teardown subscription.
    pub fn unsubscribe_world_destroyed(&mut self, subscription: Subscription) -> bool {
        self.world_destroyed.unsubscribe(subscription)
    }

    /// Registers a hook run by [`World::reset`] before the groups are reset.
    pub fn when_reset(&mut self, hook: impl FnMut(&mut World) + 'static) -> Subscription {
        self.reset_hooks.subscribe(Box::new(hook))
    }

    /// Removes a reset hook.
    pub fn remove_reset_hook(&mut self, subscription: Subscription) -> bool {
        self.reset_hooks.unsubscribe(subscription)
    }

    /// Runs the reset hooks, then resets every group.
    ///
    /// # Errors
    ///
    /// Stops at the first system error.
    pub fn reset(&mut self) -> EcsResult<()> {
        let mut hooks = self.reset_hooks.begin_dispatch();
        for (subscription, hook) in &mut hooks {
            if !self.reset_hooks.is_cancelled(*subscription) {
                hook(self);
            }
        }
        self.reset_hooks.end_dispatch(hooks);
        tracing::debug!("world reset");
        self.reset_system_groups()
    }

    /// Tears the world down. Later calls, including re-entrant ones from
    /// subscribers, do nothing.
    ///
    /// Group cleanup errors are logged and do not stop the teardown.
    pub fn destroy_world(&mut self) {
        if self.state != WorldState::Alive {
            return;
        }
        self.state = WorldState::Destroying;
        tracing::debug!(
            entities = self.entities.alive_count(),
            groups = self.groups.len(),
            "destroying world"
        );

        for index in 0..self.groups.len() {
            if self.groups[index].group.is_none() {
                // Running right now; cleaned up once its run returns.
                self.groups[index].cleanup_pending = true;
                continue;
            }
            if let Err(error) = self.with_group_taken(index, cleanup_once) {
                tracing::warn!(group = self.groups[index].name, %error, "group cleanup failed during teardown");
            }
        }

        let alive: Vec<Entity> = self.entities.iter_alive().collect();
        for entity in alive {
            self.destroy(entity);
        }
        for stash in self.stashes.iter_mut().flatten() {
            stash.clear();
        }
        for state in self.queries.iter_mut().flatten() {
            state.set.clear();
        }

        if self.entity_destroyed.is_dispatching() {
            self.teardown_deferred = true;
            return;
        }
        self.finish_teardown();
    }

    /// Notifies `WorldDestroyed` subscribers and closes every handler list.
    fn finish_teardown(&mut self) {
        let mut handlers = self.world_destroyed.begin_dispatch();
        for (subscription, handler) in &mut handlers {
            if !self.world_destroyed.is_cancelled(*subscription) {
                handler(self);
            }
        }
        self.world_destroyed.end_dispatch(handlers);

        self.entity_destroyed.close();
        self.world_destroyed.close();
        self.reset_hooks.close();
        self.state = WorldState::Destroyed;
        tracing::debug!("world destroyed");
    }
}

fn cleanup_once(group: &mut SystemGroup, world: &mut World) -> EcsResult<()> {
    if group.state() == GroupState::TornDown {
        return Ok(());
    }
    group.cleanup(world)
}

fn not_present<T: Component>(entity: Entity) -> EcsError {
    EcsError::ComponentNotPresent {
        entity,
        component: short_type_name(type_name::<T>()),
    }
}

#[cold]
#[inline(never)]
fn stash_type_mismatch(component: &'static str, world_epoch: u64) -> ! {
    panic!(
        "stash for {component} holds another type: type registry epoch is {} but this world was created at epoch {world_epoch}",
        type_registry_epoch()
    )
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for World {
    fn drop(&mut self) {
        self.destroy_world();
    }
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("entities", &self.entities.alive_count())
            .field("stashes", &self.stashes.iter().flatten().count())
            .field("live_sets", &self.queries.iter().flatten().count())
            .field("groups", &self.group_names())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
