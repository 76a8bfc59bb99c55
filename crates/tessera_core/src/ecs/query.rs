//! # Queries and Live Entity Sets
//!
//! A query is compiled once into three bitsets:
//!
//! ```text
//! with:     components that must be present
//! enabled:  components that must be present AND enabled
//! without:  components that must be absent
//! ```
//!
//! [`QueryBuilder::as_set`] registers the mask with the world and returns a
//! [`DynamicEntitySet`] handle. From then on the world re-tests one entity
//! against the mask on every structural change touching a relevant component
//! type, so the set is never rebuilt from scratch.
//!
//! ## Ordering
//!
//! Iteration follows insertion order. Removal leaves a hole that is skipped;
//! holes are compacted in place once they outnumber live members, so the
//! relative order of members that never left the set is preserved.

use super::bitset::Bitset;
use super::component::{component_type_id, Component, ComponentTypeId};
use super::entity::{Entity, EntityInfo};
use super::world::World;

const ABSENT: u32 = u32::MAX;

/// Compiled component mask.
#[derive(Clone, Debug, Default)]
pub struct QueryMask {
    /// Required-present component types.
    pub with: Bitset,
    /// Required-absent component types.
    pub without: Bitset,
    /// Required-enabled component types.
    pub enabled: Bitset,
}

impl QueryMask {
    /// Tests an entity record against the mask.
    ///
    /// Entity-level disabled entities never match.
    #[inline]
    #[must_use]
    pub fn matches(&self, info: &EntityInfo) -> bool {
        info.alive
            && info.enabled
            && self.with.is_subset_of(&info.membership)
            && self.enabled.is_subset_of(&info.enabled_components)
            && self.without.is_disjoint(&info.membership)
    }

    /// Checks whether a change to `component` can affect the outcome.
    #[inline]
    #[must_use]
    pub fn involves(&self, component: ComponentTypeId) -> bool {
        let index = component.index();
        self.with.contains(index) || self.without.contains(index) || self.enabled.contains(index)
    }

    /// Every component type the mask mentions, ascending.
    #[must_use]
    pub fn component_types(&self) -> Vec<ComponentTypeId> {
        let mut all = self.with.clone();
        for index in self.without.ones().chain(self.enabled.ones()) {
            all.insert(index);
        }
        all.ones().map(|i| ComponentTypeId(i as u32)).collect()
    }
}

/// Fluent query construction bound to a world.
///
/// ```rust
/// use tessera_core::{Component, World};
///
/// struct Position;
/// impl Component for Position {}
/// struct Frozen;
/// impl Component for Frozen {}
///
/// let mut world = World::new();
/// let movers = world.query().enabled::<Position>().without::<Frozen>().as_set();
/// assert!(world.set_entities(movers).is_empty());
/// ```
pub struct QueryBuilder<'w> {
    world: &'w mut World,
    mask: QueryMask,
}

impl<'w> QueryBuilder<'w> {
    pub(crate) fn new(world: &'w mut World) -> Self {
        Self {
            world,
            mask: QueryMask::default(),
        }
    }

    /// Requires `T` to be present.
    #[must_use]
    pub fn with<T: Component>(self) -> Self {
        self.with_id(component_type_id::<T>())
    }

    /// Requires `T` to be absent.
    #[must_use]
    pub fn without<T: Component>(self) -> Self {
        self.without_id(component_type_id::<T>())
    }

    /// Requires `T` to be present and enabled.
    #[must_use]
    pub fn enabled<T: Component>(self) -> Self {
        self.enabled_id(component_type_id::<T>())
    }

    /// Requires the component type `id` to be present.
    #[must_use]
    pub fn with_id(mut self, id: ComponentTypeId) -> Self {
        self.mask.with.insert(id.index());
        self
    }

    /// Requires the component type `id` to be absent.
    #[must_use]
    pub fn without_id(mut self, id: ComponentTypeId) -> Self {
        self.mask.without.insert(id.index());
        self
    }

    /// Requires the component type `id` to be present and enabled.
    #[must_use]
    pub fn enabled_id(mut self, id: ComponentTypeId) -> Self {
        self.mask.with.insert(id.index());
        self.mask.enabled.insert(id.index());
        self
    }

    /// The mask compiled so far.
    #[must_use]
    pub fn mask(&self) -> &QueryMask {
        &self.mask
    }

    /// Registers the query with the world and returns its live set.
    pub fn as_set(self) -> DynamicEntitySet {
        self.world.register_set(self.mask)
    }
}

/// Handle to a live set registered with a [`World`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DynamicEntitySet(pub(crate) u32);

/// Order-preserving set of entities with O(1) insert and remove.
#[derive(Clone, Debug, Default)]
pub struct LiveSet {
    /// Members in insertion order; `None` marks a hole.
    slots: Vec<Option<Entity>>,
    /// Entity id -> slot index, or `ABSENT`.
    positions: Vec<u32>,
    /// Number of members.
    len: usize,
    /// Holes tolerated before compaction is considered.
    min_holes: usize,
}

impl LiveSet {
    /// Empty set that never compacts.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            slots: Vec::new(),
            positions: Vec::new(),
            len: 0,
            min_holes: 0,
        }
    }

    /// Creates an empty set that compacts once it has more than `min_holes`
    /// holes and holes outnumber members.
    #[must_use]
    pub fn new(min_holes: usize) -> Self {
        Self {
            min_holes,
            ..Self::default()
        }
    }

    /// Number of members.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Checks if the set has no members.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Checks membership of an exact handle.
    #[inline]
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.slot_of(entity.id)
            .is_some_and(|slot| self.slots[slot] == Some(entity))
    }

    #[inline]
    fn slot_of(&self, id: u32) -> Option<usize> {
        match self.positions.get(id as usize) {
            Some(&slot) if slot != ABSENT => Some(slot as usize),
            _ => None,
        }
    }

    /// Adds an entity. Returns `true` if it was not a member.
    pub fn insert(&mut self, entity: Entity) -> bool {
        if let Some(slot) = self.slot_of(entity.id) {
            let changed = self.slots[slot] != Some(entity);
            self.slots[slot] = Some(entity);
            return changed;
        }
        let id = entity.id as usize;
        if id >= self.positions.len() {
            self.positions.resize((id + 1).next_power_of_two(), ABSENT);
        }
        self.positions[id] = self.slots.len() as u32;
        self.slots.push(Some(entity));
        self.len += 1;
        true
    }

    /// Removes whatever entity occupies slot id `id`. Returns `true` if present.
    pub fn remove(&mut self, id: u32) -> bool {
        let Some(slot) = self.slot_of(id) else {
            return false;
        };
        self.slots[slot] = None;
        self.positions[id as usize] = ABSENT;
        self.len -= 1;

        let holes = self.slots.len() - self.len;
        if holes > self.min_holes && holes > self.len {
            self.compact();
        }
        true
    }

    /// Removes every member, keeping capacity.
    pub fn clear(&mut self) {
        for entity in self.slots.drain(..).flatten() {
            self.positions[entity.id as usize] = ABSENT;
        }
        self.len = 0;
    }

    fn compact(&mut self) {
        self.slots.retain(Option::is_some);
        for (slot, entity) in self.slots.iter().enumerate() {
            if let Some(entity) = entity {
                self.positions[entity.id as usize] = slot as u32;
            }
        }
    }

    /// Iterates over members in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.slots.iter().filter_map(|slot| *slot)
    }
}

/// World-side bookkeeping of one registered query.
#[derive(Debug)]
pub(crate) struct QueryState {
    pub(crate) mask: QueryMask,
    pub(crate) set: LiveSet,
}

impl QueryState {
    /// Re-tests one entity and updates membership. Returns `true` on change.
    #[inline]
    pub(crate) fn refresh(&mut self, entity: Entity, info: &EntityInfo) -> bool {
        if self.mask.matches(info) {
            self.set.insert(entity)
        } else {
            self.set.remove(entity.id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_set_preserves_order() {
        let mut set = LiveSet::new(0);
        for id in 0..6 {
            set.insert(Entity::new(id, 0));
        }
        assert!(set.remove(1));
        assert!(set.remove(4));
        assert!(!set.remove(4));

        let ids: Vec<u32> = set.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![0, 2, 3, 5]);

        set.insert(Entity::new(1, 1));
        let ids: Vec<u32> = set.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![0, 2, 3, 5, 1], "re-added member goes last");
    }

    #[test]
    fn test_live_set_compaction_keeps_order() {
        let mut set = LiveSet::new(2);
        for id in 0..10 {
            set.insert(Entity::new(id, 0));
        }
        for id in [0, 2, 4, 6, 8, 9] {
            set.remove(id);
        }
        assert_eq!(set.len(), 4);
        let ids: Vec<u32> = set.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 3, 5, 7]);
        assert!(set.contains(Entity::new(7, 0)));
        assert!(!set.contains(Entity::new(7, 1)), "generation must match");

        assert!(set.remove(3));
        assert!(set.insert(Entity::new(3, 1)));
        let ids: Vec<u32> = set.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 5, 7, 3]);
    }

    #[test]
    fn test_mask_matching() {
        let mut info = EntityInfo {
            alive: true,
            enabled: true,
            ..EntityInfo::default()
        };
        info.membership.insert(0);
        info.membership.insert(1);
        info.enabled_components.insert(0);

        let mut mask = QueryMask::default();
        mask.with.insert(0);
        assert!(mask.matches(&info));

        mask.enabled.insert(1);
        assert!(!mask.matches(&info), "component 1 is disabled");
        info.enabled_components.insert(1);
        assert!(mask.matches(&info));

        mask.without.insert(2);
        assert!(mask.matches(&info));
        info.membership.insert(2);
        assert!(!mask.matches(&info));

        info.membership.remove(2);
        info.enabled = false;
        assert!(!mask.matches(&info), "disabled entities never match");

        assert!(mask.involves(ComponentTypeId(2)));
        assert!(!mask.involves(ComponentTypeId(3)));
        assert_eq!(
            mask.component_types(),
            vec![ComponentTypeId(0), ComponentTypeId(1), ComponentTypeId(2)]
        );
    }
}
