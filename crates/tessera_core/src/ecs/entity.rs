//! # Entity Management
//!
//! Entities are lightweight handles consisting of:
//! - An id indexing a fixed registry slot
//! - A generation counter for safe slot reuse
//!
//! The registry keeps one [`EntityInfo`] per slot. Destroying an entity bumps
//! the slot generation, so every handle taken before the destroy is detected
//! as stale in O(1) even after the id has been handed out again.

use std::fmt;

use super::bitset::Bitset;

/// Handle to an entity in a [`World`](super::World).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    /// Index of the registry slot.
    pub id: u32,
    /// Generation of the slot when this handle was issued.
    pub generation: u32,
}

impl Entity {
    /// Null/invalid entity. Never alive in any world.
    pub const NULL: Self = Self {
        id: u32::MAX,
        generation: 0,
    };

    /// Creates a handle from its parts.
    #[inline]
    #[must_use]
    pub const fn new(id: u32, generation: u32) -> Self {
        Self { id, generation }
    }

    /// Checks if this is the null handle.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.id == u32::MAX
    }

    /// Packs the handle into a single `u64`.
    ///
    /// - Lower 32 bits: id
    /// - Upper 32 bits: generation
    #[inline]
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        ((self.generation as u64) << 32) | (self.id as u64)
    }

    /// Unpacks a handle produced by [`Entity::to_bits`].
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self {
            id: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Entity(null)")
        } else {
            write!(f, "Entity({}v{})", self.id, self.generation)
        }
    }
}

/// Per-slot registry record.
#[derive(Clone, Debug, Default)]
pub struct EntityInfo {
    /// Current generation of the slot.
    pub generation: u32,
    /// Whether the slot holds a live entity.
    pub alive: bool,
    /// Entity-level enabled flag.
    pub enabled: bool,
    /// Which component types the entity has.
    pub membership: Bitset,
    /// Which of those components are enabled.
    pub enabled_components: Bitset,
}

impl EntityInfo {
    /// Handle for the current occupant of this slot.
    #[inline]
    #[must_use]
    pub const fn handle(&self, id: u32) -> Entity {
        Entity::new(id, self.generation)
    }
}

/// Slot table plus free pool.
///
/// Freed ids are reused LIFO before the table grows.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    /// All slots ever created.
    slots: Vec<EntityInfo>,
    /// Ids of slots that are not alive.
    free: Vec<u32>,
    /// Number of alive entities.
    alive_count: usize,
}

impl EntityAllocator {
    /// Creates an allocator with room for `capacity` slots.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            alive_count: 0,
        }
    }

    /// Number of alive entities.
    #[inline]
    #[must_use]
    pub const fn alive_count(&self) -> usize {
        self.alive_count
    }

    /// Number of slots in the table (alive or free).
    #[inline]
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Claims a free slot, or appends a new one.
    pub fn allocate(&mut self, enabled: bool) -> Entity {
        let id = match self.free.pop() {
            Some(id) => id,
            None => {
                let id = u32::try_from(self.slots.len()).unwrap_or(u32::MAX - 1);
                self.slots.push(EntityInfo::default());
                id
            }
        };
        let info = &mut self.slots[id as usize];
        info.alive = true;
        info.enabled = enabled;
        self.alive_count += 1;
        info.handle(id)
    }

    /// Claims the slot `id` with an exact generation.
    ///
    /// Grows the table with free slots if `id` is past the end. Returns the
    /// current occupant if the slot is alive.
    pub fn allocate_at(&mut self, id: u32, generation: u32, enabled: bool) -> Result<Entity, Entity> {
        let index = id as usize;
        if index >= self.slots.len() {
            let first_new = self.slots.len();
            self.slots.resize_with(index + 1, EntityInfo::default);
            // New slots other than `id` become free, lowest id reused first.
            for free_id in (first_new..index).rev() {
                self.free.push(free_id as u32);
            }
        } else if self.slots[index].alive {
            return Err(self.slots[index].handle(id));
        } else if let Some(pos) = self.free.iter().position(|&f| f == id) {
            self.free.remove(pos);
        }

        let info = &mut self.slots[index];
        info.generation = generation;
        info.alive = true;
        info.enabled = enabled;
        self.alive_count += 1;
        Ok(info.handle(id))
    }

    /// Frees a live slot, bumping its generation.
    ///
    /// The caller is responsible for having removed every component first.
    pub fn free(&mut self, entity: Entity) {
        let info = &mut self.slots[entity.id as usize];
        debug_assert!(info.alive, "freeing a dead slot");
        info.alive = false;
        info.enabled = false;
        info.generation = info.generation.wrapping_add(1);
        info.membership.clear();
        info.enabled_components.clear();
        self.alive_count -= 1;
        self.free.push(entity.id);
    }

    /// Checks if an entity is alive.
    #[inline]
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.slots
            .get(entity.id as usize)
            .is_some_and(|info| info.alive && info.generation == entity.generation)
    }

    /// Gets the slot record of a live entity.
    #[inline]
    #[must_use]
    pub fn info(&self, entity: Entity) -> Option<&EntityInfo> {
        self.slots
            .get(entity.id as usize)
            .filter(|info| info.alive && info.generation == entity.generation)
    }

    /// Gets the mutable slot record of a live entity.
    #[inline]
    pub fn info_mut(&mut self, entity: Entity) -> Option<&mut EntityInfo> {
        self.slots
            .get_mut(entity.id as usize)
            .filter(|info| info.alive && info.generation == entity.generation)
    }

    /// Iterates over all alive entities in id order.
    pub fn iter_alive(&self) -> impl Iterator<Item = Entity> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, info)| info.alive)
            .map(|(id, info)| info.handle(id as u32))
    }
}
